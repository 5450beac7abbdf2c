// Draft relay entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (missing ENDPOINT is fatal here)
// 3. Open the pick ledger / connection registry database
// 4. Wire transport, broadcaster, and sequence assigner
// 5. Spawn the WebSocket edge task
// 6. Run the application loop until the edge dies or ctrl-c

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use draftrelay::app::{self, AppState};
use draftrelay::config;
use draftrelay::handlers::DraftHandlers;
use draftrelay::store::Database;
use draftrelay::transport::GatewayTransport;
use draftrelay::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Draft relay starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: listening on {}:{}, push gateway {}",
        config.bind, config.port, config.endpoint
    );

    // 3. Open the database backing both the pick ledger and the connection
    //    registry
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. Wire the components
    let transport = Arc::new(GatewayTransport::new(&config.endpoint));
    let handlers = Arc::new(DraftHandlers::new(db.clone(), db.clone(), transport));

    let state = AppState {
        config: config.clone(),
        handlers,
        registry: db,
    };

    // 5. Spawn the WebSocket edge task
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let bind = config.bind.clone();
    let port = config.port;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(&bind, port, ws_tx).await {
            error!("WebSocket edge error: {e}");
        }
    });

    // 6. Run the application loop until the edge shuts down or ctrl-c
    tokio::select! {
        result = app::run(ws_rx, state) => {
            if let Err(e) = result {
                error!("Application loop error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // The edge loops forever; abort it on the way out.
    ws_handle.abort();

    info!("Draft relay shut down cleanly");
    Ok(())
}

/// Initialize tracing to stderr, filtered by RUST_LOG with an info default.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("draftrelay=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
