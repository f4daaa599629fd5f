//! Vidify CLI - Command-line interface
//!
//! Runs feed simulations and prints the effective configuration.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use vidify_core::VidifyError;
use vidify_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "vidify")]
#[command(about = "A bandwidth-constrained video preloading simulator")]
struct Cli {
    /// Console log level (the trace file always records everything)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the per-run trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Warning: {}", e.user_message());
    }

    match commands::handle_command(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<VidifyError>() {
                Some(vidify_error) => eprintln!("Error: {}", vidify_error.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
