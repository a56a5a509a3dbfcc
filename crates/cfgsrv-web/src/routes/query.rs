//! Structured queries: POST /config, POST /config/{key}
//!
//! The body is `{"query": "<JMESPath expression>"}`; a missing `query`
//! selects everything.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::AppState;
use crate::error::{AppError, Result};
use crate::validation::validate_key;
use crate::values::SELECT_ALL;

/// Request body of a query.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default = "select_all")]
    query: String,
}

fn select_all() -> String {
    SELECT_ALL.to_string()
}

/// POST /config - Matches of the query in every stored value
pub async fn query_all(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Map<String, Value>>> {
    let matches = state.values.query(request.query).await?;
    Ok(Json(matches))
}

/// POST /config/{key} - Match of the query in one stored value
pub async fn query_key(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Map<String, Value>>> {
    validate_key(&key).map_err(|err| AppError::NotFound(err.to_string()))?;

    let matches = state.values.query_key(&key, request.query).await?;
    Ok(Json(matches))
}
