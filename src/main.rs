//! dcrawl binary: `dcrawl coordinator` and `dcrawl worker`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dcrawl::config::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dcrawl")]
#[command(about = "Distributed single-domain web crawler")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "dcrawl.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator (frontier, worker registry, HTTP control API)
    Coordinator,

    /// Run a worker crawling against a coordinator
    Worker {
        /// Coordinator IP address
        #[arg(short, long)]
        server: Option<String>,

        /// Coordinator port
        #[arg(short, long)]
        port: Option<u16>,

        /// Hostname of the site to crawl
        #[arg(long)]
        hostname: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Coordinator => {
            info!(
                listen = %config.coordinator.listen_addr,
                http = %config.coordinator.http_listen_addr,
                "starting coordinator"
            );
            dcrawl::coordinator::run(config.coordinator).await
        }
        Commands::Worker {
            server,
            port,
            hostname,
        } => {
            if let Some(server) = server {
                config.worker.server = server;
            }
            if let Some(port) = port {
                config.worker.port = port;
            }
            if let Some(hostname) = hostname {
                config.worker.hostname = hostname;
            }
            info!(
                server = %config.worker.server,
                port = config.worker.port,
                hostname = %config.worker.hostname,
                "starting worker"
            );
            dcrawl::worker::run(config.worker).await
        }
    }
}
