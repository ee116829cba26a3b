//! # rollcall-server
//!
//! HTTP bridge for the rollcall attendance system.
//!
//! This binary provides:
//! - REST API for session check-in and late/absence reasons
//! - Bridge endpoints for device location and geofence callbacks
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package rollcall-server
//!
//! # Production
//! ROLLCALL_ENV=production ./rollcall-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use rollcall_core::Config;
use rollcall_server::api::create_router;
use rollcall_server::logging;
use rollcall_server::state::AppState;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(&logging::LogProfile::from_env())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting rollcall-server");

    let config_path = std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("Invalid server bind address")?;

    let state = AppState::new(config)?.shared();
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
