//! crosspost-api - HTTP surface for connections and posts
//!
//! Serves the authorization initiation/callback endpoints and the post
//! submission/listing API. Operator authentication is handled upstream;
//! this service trusts the account id installed on each request by the
//! auth gateway.

use std::sync::Arc;

use clap::Parser;
use libcrosspost::{Config, ConnectionManager, Database, Result};
use tracing::info;

mod handlers;

use handlers::AppState;

#[derive(Parser, Debug)]
#[command(name = "crosspost-api")]
#[command(version)]
#[command(about = "HTTP API for connections and post scheduling")]
#[command(long_about = "\
crosspost-api - HTTP API for connections and post scheduling

DESCRIPTION:
    Serves the OAuth connection endpoints (initiation and provider
    callback) and the post submission API. Publishing itself is done by
    the crosspost-send daemon; this service only writes the queue.

USAGE:
    # Run with the configured bind address
    crosspost-api

    # Override the bind address
    crosspost-api --bind 0.0.0.0:9090

ROUTES:
    POST   /api/connections/{platform}/initiate
    GET    /auth/callback/{platform}
    GET    /api/connections
    DELETE /api/connections/{platform}
    POST   /api/posts
    GET    /api/posts

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml
    Override with the CROSSPOST_CONFIG environment variable.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Listen address (overrides config)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libcrosspost::logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(Config::load()?);
    let db = Database::new(&config.database.path).await?;
    let connections = Arc::new(ConnectionManager::new(db.clone(), config.clone()));

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState {
        db,
        config,
        connections,
    };

    let app = handlers::router(state);

    info!("crosspost-api listening on {}", bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| libcrosspost::CrosspostError::InvalidInput(format!("bind {}: {}", bind, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| libcrosspost::CrosspostError::InvalidInput(format!("server: {}", e)))?;

    Ok(())
}
