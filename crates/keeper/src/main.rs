use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use apy_keeper::{create_example_config, Keeper, KeeperConfig};

#[derive(Parser, Debug)]
#[command(name = "apy-keeper")]
#[command(about = "Estimates lending-venue APY and publishes it to keeper contracts")]
struct Args {
    /// Path to keeper configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: String,

    /// Write an example configuration to the config path and exit
    #[arg(long)]
    write_example_config: bool,

    /// Override the configured update interval (seconds)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Dry run mode - record snapshots but don't publish
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if args.write_example_config {
        create_example_config(&args.config)
            .with_context(|| format!("writing example config to {}", args.config))?;
        info!("Wrote example configuration to {}", args.config);
        return Ok(());
    }

    info!("Starting APY keeper");

    if args.dry_run {
        warn!("Running in DRY RUN mode - no updates will be published");
    }

    // Load configuration
    let config = KeeperConfig::load(&args.config).with_context(|| format!("loading {}", args.config))?;
    let interval = args.interval.map(Duration::from_secs).unwrap_or_else(|| config.poll_interval());

    info!(
        rpc_url = %config.rpc_url,
        venues = config.enabled_venues().len(),
        interval_secs = interval.as_secs(),
        wire_decimals = config.wire_decimals,
        "Loaded configuration"
    );

    let mut keeper = Keeper::from_config(&config, args.dry_run).context("initializing keeper")?;

    if let Err(e) = keeper.health_check().await {
        warn!("Initial health check failed: {}", e);
    }

    info!("Keeper initialized successfully");

    if args.once {
        let published = keeper.update_all_venues().await?;
        info!("Single cycle finished: {} venues published", published);
        return Ok(());
    }

    // Start main update loop
    let mut interval_timer = time::interval(interval);
    let mut iteration = 0u64;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received after {} iterations", iteration);
                break;
            }
        }
        iteration += 1;

        debug!("Starting keeper iteration {}", iteration);

        let result = tokio::select! {
            result = keeper.update_all_venues() => result,
            _ = &mut shutdown => {
                warn!("Shutdown signal received during iteration {}, abandoning cycle", iteration);
                break;
            }
        };

        match result {
            Ok(published) => {
                if published > 0 {
                    info!("Iteration {}: published {} venues", iteration, published);
                } else {
                    debug!("Iteration {}: nothing published", iteration);
                }
            }
            Err(e) => {
                error!("Error in keeper iteration {}: {}", iteration, e);
                // Continue running even if individual iterations fail
            }
        }

        // Basic health check every 24 iterations
        if iteration % 24 == 0 {
            info!("Keeper health check - iteration {}", iteration);
            if let Err(e) = keeper.health_check().await {
                warn!("Health check warning: {}", e);
            }
        }
    }

    Ok(())
}
