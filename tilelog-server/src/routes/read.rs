//! The read endpoints: checkpoint, tiles, and entry bundles
//!
//! Byte pass-throughs from storage. Complete tiles and bundles are
//! immutable and cached aggressively; partial objects are superseded as the
//! tree grows and must not be cached.

use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tilelog_core::layout;

/// Cache header for objects that can never change.
const CACHE_IMMUTABLE: &str = "public, max-age=31536000, immutable";
/// Cache header for partial objects.
// TODO: let operators configure a short TTL here instead of no-store.
const CACHE_PARTIAL: &str = "no-store";
/// The checkpoint advances with every integration.
const CACHE_CHECKPOINT: &str = "no-cache";

/// `GET /checkpoint`: the latest signed note, or 404 while the log is
/// empty.
pub async fn checkpoint(State(state): State<Arc<AppState>>) -> Result<Response> {
    let note = state.reader.read_checkpoint().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, CACHE_CHECKPOINT),
        ],
        note,
    )
        .into_response())
}

/// `GET /tile/<level>/<N>[.p/<W>]` and `GET /tile/entries/<N>[.p/<W>]`:
/// raw object bytes.
pub async fn tile(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response> {
    let (bytes, is_complete) = if let Some(rest) = path.strip_prefix("entries/") {
        let (index, partial) = layout::parse_entries_path(rest)
            .map_err(|e| ServerError::bad_request(e.to_string()))?;
        let bytes = state.reader.read_entry_bundle(index, partial).await?;
        (bytes, partial == 0)
    } else {
        let (level, index, partial) = layout::parse_tile_path(&path)
            .map_err(|e| ServerError::bad_request(e.to_string()))?;
        let bytes = state.reader.read_tile(level, index, partial).await?;
        (bytes, partial == 0)
    };

    let cache = if is_complete { CACHE_IMMUTABLE } else { CACHE_PARTIAL };
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CACHE_CONTROL, cache),
        ],
        bytes,
    )
        .into_response())
}
