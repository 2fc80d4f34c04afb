// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "compute-admin")]
#[command(about = "Operator tooling for workbench runtimes, apps and disks")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML configuration file (defaults come from the environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check whether the control plane is healthy
    Health,
    /// Manage runtimes
    Runtimes {
        #[command(subcommand)]
        command: RuntimesSubcommand,
    },
    /// Manage apps
    Apps {
        #[command(subcommand)]
        command: AppsSubcommand,
    },
    /// Inspect persistent disks
    Disks {
        #[command(subcommand)]
        command: DisksSubcommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum RuntimesSubcommand {
    /// List runtimes in a billing project
    List {
        /// Google project ID
        #[arg(long)]
        project: String,
        /// Include deleted runtimes
        #[arg(long)]
        include_deleted: bool,
        /// List with the service identity instead of the end user
        #[arg(long)]
        as_service: bool,
    },
    /// Stop every running runtime created by a user
    StopAll {
        /// Email of the runtime creator
        #[arg(long)]
        user: String,
    },
    /// Delete one runtime
    Delete {
        #[arg(long)]
        project: String,
        #[arg(long)]
        name: String,
        /// Delete the attached persistent disk as well
        #[arg(long)]
        delete_disk: bool,
        #[arg(long)]
        as_service: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum AppsSubcommand {
    /// List apps in a billing project
    List {
        #[arg(long)]
        project: String,
        #[arg(long)]
        as_service: bool,
    },
    /// Delete every deletable app created by a user (Cromwell excluded, disks kept)
    DeleteAll {
        #[arg(long)]
        user: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum DisksSubcommand {
    /// List disks in a billing project
    List {
        #[arg(long)]
        project: String,
        #[arg(long)]
        as_service: bool,
    },
    /// Show the current disk for each slot
    Current {
        #[arg(long)]
        project: String,
    },
}
