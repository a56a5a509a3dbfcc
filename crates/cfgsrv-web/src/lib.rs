//! Config value query server
//!
//! Serves the files of a mounted ConfigServer backing store over HTTP, with
//! tower middleware for tracing and compression. Values are read from disk on
//! every request.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

pub mod error;
pub mod routes;
mod server;
pub mod validation;
pub mod values;

pub use error::{AppError, ErrorResponse};
pub use server::run_server;
pub use validation::{ValidationError, ValidationResult};
pub use values::{ValueDirectory, ValueError};

/// Default directory the backing store is mounted at.
pub const DEFAULT_CONFIG_DIR: &str = "/var/lib/config-server";

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding one file per key
    pub config_dir: PathBuf,
    /// Address to bind to (e.g., "0.0.0.0:80")
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            bind_address: "0.0.0.0:80".to_string(),
        }
    }
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Values being served.
    pub values: Arc<ValueDirectory>,
}

impl AppState {
    /// State serving the values under `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            values: Arc::new(ValueDirectory::new(config_dir)),
        }
    }
}

/// Create the application router with middleware.
pub fn create_router(config: &ServerConfig) -> Router {
    info!(directory = %config.config_dir.display(), "Creating router");

    routes::create_router()
        .with_state(AppState::new(config.config_dir.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
}

/// Web server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value directory does not exist
    #[error("Config directory {0} does not exist")]
    MissingDirectory(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
