//! Command-line surface: `serve` and `service add|rm|ls`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api;
use crate::config::{Config, Overrides};
use crate::registry::Registry;
use crate::runtime::DockerGateway;
use crate::updater::Updater;

#[derive(Debug, Parser)]
#[command(name = "flockman", version)]
#[command(about = "flockman is responsible for updating your docker swarm services")]
#[command(long_about = "flockman exposes an API to trigger image updates of docker swarm \
services; services are registered through this CLI and stored in a SQLite database.")]
pub struct Cli {
    /// Registry database path
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Additional TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the API server for updating services
    Serve(ServeArgs),
    /// Manage services registered in the database
    #[command(subcommand)]
    Service(ServiceCommand),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Docker host
    #[arg(short = 'S', long = "docker")]
    pub docker_host: Option<String>,

    /// Listen host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum ServiceCommand {
    /// Register a service by its name and print its token
    Add { name: String },
    /// Remove a service by its name
    Rm { name: String },
    /// List all registered services
    Ls,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            database: self.database.clone(),
            ..Default::default()
        };
        if let Command::Serve(args) = &self.command {
            overrides.docker_host = args.docker_host.clone();
            overrides.host = args.host.clone();
            overrides.port = args.port;
            overrides.debug = args.debug;
        }
        overrides
    }
}

pub fn run_service_command(cfg: &Config, command: &ServiceCommand) -> anyhow::Result<()> {
    let registry = Registry::open(&cfg.database)?;
    match command {
        ServiceCommand::Add { name } => {
            let token = registry.register(name)?;
            println!("{token}");
        }
        ServiceCommand::Rm { name } => registry.remove(name)?,
        ServiceCommand::Ls => {
            println!("{:<32}  {}", "SERVICE_NAME", "TOKEN");
            for service in registry.list()? {
                println!("{:<32}  {}", service.service_name, service.token);
            }
        }
    }
    Ok(())
}

/// Runs the API server until SIGINT/SIGTERM, then drains in-flight requests
/// for at most `shutdown_grace_secs`.
pub async fn serve(cfg: &Config) -> anyhow::Result<()> {
    let registry = Registry::open(&cfg.database)?;
    let gateway = DockerGateway::connect(&cfg.docker_host, cfg.docker_timeout_secs)?;
    let updater = Arc::new(Updater::new(registry, Arc::new(gateway)));

    let addr = cfg.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("flockman {} listening on {}", api::VERSION, listener.local_addr()?);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, api::router(updater)).with_graceful_shutdown(async move {
        let _ = shutdown_rx.changed().await;
    });
    let mut task = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut task => {
            return match joined {
                Ok(result) => result.map_err(Into::into),
                Err(join) => Err(anyhow::anyhow!(join)),
            };
        }
        _ = shutdown_signal() => {
            info!("Shutting down server...");
        }
    }

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(cfg.shutdown_grace_secs);
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(Ok(()))) => {
            info!("Server exited gracefully");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(join)) => Err(anyhow::anyhow!(join)),
        Err(_) => {
            warn!("In-flight requests still running after {:?}, forcing shutdown", grace);
            task.abort();
            Err(anyhow::anyhow!("server forced to shutdown"))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
