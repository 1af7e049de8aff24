use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tschnode::{logging, Config, Controller, LoggingInstaller};

#[derive(Parser, Debug)]
#[command(name = "tschnode")]
#[command(about = "TSCH track controller daemon")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "TSCHNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Write a default configuration and exit
    #[arg(long)]
    init: bool,

    /// Log level, overriding the configured one
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        let config = Config::create_default(args.config)?;
        println!("Configuration written to {}", config.config_path().display());
        return Ok(());
    }

    let config = Config::load(args.config)?;
    logging::init(&config.logging, args.log_level.as_deref())?;

    info!("Starting tschnode v{}", env!("CARGO_PKG_VERSION"));

    let controller = Controller::new(config, Arc::new(LoggingInstaller)).await?;
    controller.run().await
}
