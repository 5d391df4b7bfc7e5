use clap::Parser;
use rospool::config::Config;
use rospool::poller::Poller;
use rospool::pool::ConnectionManager;
use rospool::session::ApiConnector;
use rospool::{Result, RosPoolError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rospool")]
#[command(about = "Polls RouterOS devices over pooled API sessions", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error), overrides config
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json), overrides config
    #[arg(long)]
    log_format: Option<String>,

    /// Poll every target once, print the results as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle config generation
    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        println!("Edit the file and run: rospool --config {:?}", config_path);
        return Ok(());
    }

    // Load configuration before logging so the file can pick the format
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    config.validate()?;

    init_logging(&config.logging.level, &config.logging.format)?;

    info!("rospool v{} starting", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => info!("Loaded configuration from: {:?}", path),
        None => info!("No configuration file specified, using defaults"),
    }
    info!(targets = config.targets.len(), modules = config.modules.len(), "configuration ready");

    let manager = Arc::new(ConnectionManager::new(
        Arc::new(ApiConnector),
        config.pool.clone(),
    ));
    let poller = Poller::new(Arc::clone(&manager), &config);

    if args.once {
        let results = poller.poll_all().await;
        manager.shutdown().await;

        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &results).map_err(std::io::Error::from)?;
        writeln!(stdout)?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.poller.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Handle Ctrl+C for graceful shutdown
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
            _ = ticker.tick() => {
                poller.poll_all().await;
                for stats in manager.stats().await {
                    debug!(
                        target_name = %stats.target,
                        total = stats.total,
                        in_use = stats.in_use,
                        idle_healthy = stats.idle_healthy,
                        idle_unhealthy = stats.idle_unhealthy,
                        "pool stats"
                    );
                }
            }
        }
    }

    manager.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(level)
        .map_err(|e| RosPoolError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        "json" => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer()).init(),
    }

    Ok(())
}
