//! Single value lookup: GET /key/{key}

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::error::{AppError, Result};
use crate::validation::validate_key;

/// GET /key/{key} - Stored JSON of one key, byte for byte
pub async fn get_key(Path(key): Path<String>, State(state): State<AppState>) -> Result<Response> {
    validate_key(&key).map_err(|err| AppError::NotFound(err.to_string()))?;

    let bytes = state.values.read_raw(&key).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}
