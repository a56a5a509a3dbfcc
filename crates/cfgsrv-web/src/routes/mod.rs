//! HTTP routes
//!
//! ## Route Structure
//!
//! - `GET /health` - Health check endpoint
//! - `GET /key/{key}` - Raw stored value of one key
//! - `POST /config` - Query every stored value
//! - `POST /config/{key}` - Query the stored value of one key

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub mod health;
pub mod keys;
pub mod query;

/// Create the router with all endpoints registered.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/key/{key}", get(keys::get_key))
        .route("/key/{key}/", get(keys::get_key))
        .route("/config", post(query::query_all))
        .route("/config/{key}", post(query::query_key))
}
