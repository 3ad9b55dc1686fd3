//! flockman entry point.

use clap::Parser;
use log::info;

use flockman::cli::{self, Cli, Command};
use flockman::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let cfg = Config::load(args.config.as_deref(), &args.overrides())?;

    // RUST_LOG wins over the configured level
    let default_level = if cfg.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match &args.command {
        Command::Serve(_) => {
            info!("Starting flockman with config: {:?}", cfg);
            cli::serve(&cfg).await
        }
        Command::Service(command) => cli::run_service_command(&cfg, command),
    }
}
