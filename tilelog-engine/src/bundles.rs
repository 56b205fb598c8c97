//! Entry bundle writing
//!
//! Packs a batch of assigned entries into their bundles: the trailing
//! partial bundle (if the batch starts mid-bundle) is read back, extended,
//! and rewritten; fresh bundles are built from scratch. Bundles are written
//! before tiles and state so a published checkpoint never references entry
//! bytes that are not yet durable.

use crate::error::{EngineError, Result};
use tilelog_core::layout::ENTRY_BUNDLE_WIDTH;
use tilelog_core::{Entry, EntryBundle};
use tilelog_storage::LogStorage;

/// Write the bundles covering entries assigned `[start, start + len)`.
pub(crate) async fn write_bundles(
    storage: &dyn LogStorage,
    start: u64,
    entries: &[Entry],
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let end = start + entries.len() as u64;
    let first_bundle = start / ENTRY_BUNDLE_WIDTH;
    let last_bundle = (end - 1) / ENTRY_BUNDLE_WIDTH;

    let mut cursor = 0usize;
    for bundle_index in first_bundle..=last_bundle {
        let tail = start % ENTRY_BUNDLE_WIDTH;
        let mut bundle = if bundle_index == first_bundle && tail != 0 {
            let bytes = storage.get_entry_bundle(bundle_index, tail).await?;
            let bundle = EntryBundle::from_bytes(&bytes)?;
            if bundle.len() as u64 != tail {
                return Err(EngineError::invariant(format!(
                    "bundle {bundle_index} holds {} entries, expected {tail}",
                    bundle.len()
                )));
            }
            bundle
        } else {
            EntryBundle::new()
        };

        while !bundle.is_full() && cursor < entries.len() {
            bundle.push(entries[cursor].data());
            cursor += 1;
        }
        let partial = if bundle.is_full() { 0 } else { bundle.len() as u64 };
        storage
            .put_entry_bundle(bundle_index, partial, &bundle.to_bytes())
            .await?;
        tracing::debug!(index = bundle_index, entries = bundle.len(), "wrote entry bundle");
    }
    debug_assert_eq!(cursor, entries.len());
    Ok(())
}
