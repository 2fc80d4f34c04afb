use crate::cli::{AppsSubcommand, Command, DisksSubcommand, RuntimesSubcommand};
use anyhow::{bail, Result};
use compute_orchestrator::{App, ComputeClient, PersistentDisk, Runtime};
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Run `command` against `client`, writing results to `out`.
pub async fn execute_command(
    command: &Command,
    client: &ComputeClient,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Health => {
            let healthy = client.get_control_plane_health().await;
            writeln!(out, "{}", if healthy { "healthy" } else { "unhealthy" })?;
            if !healthy {
                bail!("control plane is unhealthy");
            }
        }
        Command::Runtimes { command } => handle_runtimes(command, client, json, out).await?,
        Command::Apps { command } => handle_apps(command, client, json, out).await?,
        Command::Disks { command } => handle_disks(command, client, json, out).await?,
    }
    Ok(())
}

async fn handle_runtimes(
    command: &RuntimesSubcommand,
    client: &ComputeClient,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        RuntimesSubcommand::List {
            project,
            include_deleted,
            as_service,
        } => {
            let runtimes = if *as_service {
                client.list_runtimes_by_project_as_service(project).await?
            } else {
                client
                    .list_runtimes_by_project(project, *include_deleted)
                    .await?
            };
            print_runtimes(&runtimes, json, out)
        }
        RuntimesSubcommand::StopAll { user } => {
            let stopped = client.stop_all_runtimes_for_user(user).await?;
            info!(user = %user, stopped, "bulk stop finished");
            writeln!(out, "Stopped {stopped} runtime(s) for {user}")?;
            Ok(())
        }
        RuntimesSubcommand::Delete {
            project,
            name,
            delete_disk,
            as_service,
        } => {
            if *as_service {
                client
                    .delete_runtime_as_service(project, name, *delete_disk)
                    .await?;
            } else {
                client.delete_runtime(project, name, *delete_disk).await?;
            }
            writeln!(out, "Deletion requested for {project}/{name}")?;
            Ok(())
        }
    }
}

async fn handle_apps(
    command: &AppsSubcommand,
    client: &ComputeClient,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        AppsSubcommand::List {
            project,
            as_service,
        } => {
            let apps = if *as_service {
                client.list_apps_by_project_as_service(project).await?
            } else {
                client.list_apps_by_project(project, false).await?
            };
            print_apps(&apps, json, out)
        }
        AppsSubcommand::DeleteAll { user } => {
            let deleted = client.delete_user_apps_as_service(user).await?;
            writeln!(out, "Deleted {deleted} app(s) for {user}")?;
            Ok(())
        }
    }
}

async fn handle_disks(
    command: &DisksSubcommand,
    client: &ComputeClient,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        DisksSubcommand::List {
            project,
            as_service,
        } => {
            let disks = if *as_service {
                client.list_disks_by_project_as_service(project).await?
            } else {
                client.list_disks_by_project(project, false).await?
            };
            print_disks(&disks, json, out)
        }
        DisksSubcommand::Current { project } => {
            let reconciliation = client.find_current_disks(project).await?;
            if let Some(extra) = &reconciliation.anomaly {
                writeln!(
                    out,
                    "warning: {} active disks found, expected at most {}",
                    extra.len(),
                    compute_orchestrator::DiskReconciler::slot_count()
                )?;
            }
            print_disks(&reconciliation.current, json, out)
        }
    }
}

fn print_json<T: Serialize>(value: &T, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn print_runtimes(runtimes: &[Runtime], json: bool, out: &mut dyn Write) -> Result<()> {
    if json {
        return print_json(&runtimes, out);
    }
    writeln!(out, "{:<32} {:<10} {:<32}", "NAME", "STATUS", "CREATOR")?;
    for runtime in runtimes {
        writeln!(
            out,
            "{:<32} {:<10} {:<32}",
            runtime.runtime_name,
            format!("{:?}", runtime.status),
            runtime.audit_info.creator
        )?;
    }
    Ok(())
}

fn print_apps(apps: &[App], json: bool, out: &mut dyn Write) -> Result<()> {
    if json {
        return print_json(&apps, out);
    }
    writeln!(
        out,
        "{:<32} {:<10} {:<14} {:<32}",
        "NAME", "TYPE", "STATUS", "CREATOR"
    )?;
    for app in apps {
        let app_type = app
            .resolved_app_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<32} {:<10} {:<14} {:<32}",
            app.app_name,
            app_type,
            format!("{:?}", app.status),
            app.audit_info.creator
        )?;
    }
    Ok(())
}

fn print_disks(disks: &[PersistentDisk], json: bool, out: &mut dyn Write) -> Result<()> {
    if json {
        return print_json(&disks, out);
    }
    writeln!(
        out,
        "{:<36} {:<10} {:<10} {:>8} {:<25}",
        "NAME", "SLOT", "STATUS", "SIZE_GB", "CREATED"
    )?;
    for disk in disks {
        let slot = disk
            .app_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "runtime".to_string());
        writeln!(
            out,
            "{:<36} {:<10} {:<10} {:>8} {:<25}",
            disk.name,
            slot,
            format!("{:?}", disk.status),
            disk.size_gb,
            disk.created_at().to_rfc3339()
        )?;
    }
    Ok(())
}
