//! crosspost-send - Queue dispatch daemon
//!
//! Polls the queue on an interval and publishes everything due. Each tick
//! claims its entries atomically, so running a second daemon against the
//! same database is safe, just unnecessary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use libcrosspost::{Config, ConnectionManager, Database, Dispatcher, Result};
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "crosspost-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
crosspost-send - Background daemon for scheduled publishing

DESCRIPTION:
    crosspost-send is a long-running daemon that watches the publish queue
    and delivers due entries to their platforms. It refreshes credentials
    before each publish, retries transient failures with exponential
    backoff, and records terminal outcomes on the parent post.

    Entries left in flight by an unclean shutdown are returned to the
    queue at startup.

USAGE:
    # Run in foreground (logs to stderr)
    crosspost-send

    # Run with custom poll interval
    crosspost-send --poll-interval 10

    # Process due entries once and exit
    crosspost-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight publishes finish)

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml

    [dispatch]
    poll_interval = 30      # seconds between polls
    max_attempts = 5        # publish attempts before abandoning
    retry_base_delay = 30   # seconds, doubled per attempt
    retry_max_delay = 3600  # backoff ceiling

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due entries once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libcrosspost::logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("daemon failed: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(Config::load()?);
    let db = Database::new(&config.database.path).await?;
    let connections = Arc::new(ConnectionManager::new(db.clone(), config.clone()));
    let dispatcher = Dispatcher::new(db.clone(), connections, &config);

    info!("crosspost-send daemon starting");

    // return anything a crashed run left in flight to the queue
    let recovered = db.recover_stalled_entries().await?;
    if recovered > 0 {
        info!("recovered {} stalled entries", recovered);
    }

    if cli.once {
        let dispatched = dispatcher.tick().await?;
        info!("processed {} entries once, exiting", dispatched);
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.dispatch.poll_interval);
    info!("poll interval: {}s", poll_interval);

    run_daemon_loop(&dispatcher, poll_interval, shutdown).await;

    info!("crosspost-send daemon stopped");
    Ok(())
}

#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libcrosspost::CrosspostError::InvalidInput(format!("signal setup failed: {}", e))
    })?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

async fn run_daemon_loop(dispatcher: &Dispatcher, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested, stopping daemon loop");
            break;
        }

        match dispatcher.tick().await {
            Ok(0) => {}
            Ok(dispatched) => info!("dispatched {} entries", dispatched),
            Err(e) => error!("dispatch tick failed: {}", e),
        }

        // sleep until the next poll, checking for shutdown every second
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
