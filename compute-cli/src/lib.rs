pub mod cli;
pub mod commands;

pub use cli::Args;
pub use commands::execute_command;
