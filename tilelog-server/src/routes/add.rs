//! The write endpoint: `POST /add`

use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use std::sync::Arc;
use tilelog_core::Entry;

/// Accept one raw entry body and respond with its assigned index as ASCII
/// decimal once the entry's batch has been integrated.
///
/// Returns 400 for oversized bodies, 503 with `Retry-After` while the queue
/// is saturated, and 500 for integration failures.
pub async fn add(State(state): State<Arc<AppState>>, body: Bytes) -> Result<String> {
    if body.len() > state.config.max_entry_size {
        return Err(ServerError::bad_request(format!(
            "entry is {} bytes, limit {}",
            body.len(),
            state.config.max_entry_size
        )));
    }
    let entry = Entry::new(body.to_vec())
        .map_err(|e| ServerError::bad_request(e.to_string()))?;

    let index = state.appender.add(entry).await?;
    tracing::debug!(index, "entry integrated");
    Ok(index.to_string())
}
