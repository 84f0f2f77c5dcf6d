//! Top-level CLI entry point. Grounded in the teacher's `cli/app.rs`
//! (`run()`: parse args, init logging, load config, dispatch).

use clap::Parser;
use tracing::{error, info};

use crate::cli::args::{CliArgs, Commands};
use crate::cli::demo::{cmd_cancel, cmd_resume, cmd_run};
use crate::cli::runtime::{init_logging, load_config, LoadedConfig};
use crate::errors::CliResult;

pub async fn run() -> CliResult<()> {
    let cli = CliArgs::parse();
    init_logging(&cli.log_level, cli.debug)?;

    info!("starting browseragent v{}", env!("CARGO_PKG_VERSION"));

    let LoadedConfig { config, .. } = load_config(cli.config.as_ref())?;

    let outcome = match cli.command {
        Commands::Run(args) => cmd_run(args, &config).await,
        Commands::Cancel(args) => cmd_cancel(args).await,
        Commands::Resume(args) => cmd_resume(args).await,
    };

    match &outcome {
        Ok(()) => info!("command completed successfully"),
        Err(err) => error!("command failed: {err}"),
    }

    outcome
}
