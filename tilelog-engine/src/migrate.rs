//! Migration copier
//!
//! Copies a source log into local storage by pulling its entry bundles and
//! re-deriving everything else: workers fetch and store bundle bytes in any
//! order while an integration driver folds each contiguous prefix into the
//! local tile grid. Only bundles cross the wire, so the final root
//! comparison checks both the source log and the copy itself.
//!
//! Tiles are written as integration proceeds, but the state record is
//! CAS-published exactly once, after the recomputed root has been checked
//! against the source's. On a mismatch the copier fails fatally and no
//! checkpoint is published; the tiles already written sit at unreferenced
//! addresses. Per-bundle fetch+store is wrapped in bounded exponential
//! backoff to ride out transient source or storage failures.

use crate::error::{EngineError, Result};
use crate::integrate::TreeBuilder;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tilelog_core::layout::{self, ENTRY_BUNDLE_WIDTH};
use tilelog_core::{
    empty_root, leaf_hash, sign_note, Checkpoint, CheckpointSigner, EntryBundle, Hash,
};
use tilelog_storage::{LogStorage, TreeState};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// Attempts per bundle before the copier gives up.
const MAX_COPY_ATTEMPTS: u32 = 10;
/// First retry delay; doubles per attempt up to [`MAX_RETRY_DELAY`].
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);
/// How long the integration driver waits when it runs out of contiguous
/// bundles to fold in.
const INTEGRATE_POLL: Duration = Duration::from_millis(50);

/// Fetches entry bundles from the source log.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Fetch the bundle published at `(index, partial)`.
    async fn fetch_entry_bundle(&self, index: u64, partial: u64) -> Result<Vec<u8>>;
}

/// Parameters for one migration run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Parallel copy workers.
    pub workers: usize,
    /// Size of the source log.
    pub source_size: u64,
    /// Root the source advertises at `source_size`.
    pub source_root: Hash,
}

/// Copy `[local_size, source_size)` from the source into local storage,
/// integrate, verify the resulting root against `source_root`, and publish
/// a locally signed checkpoint at the source size.
///
/// Blocks until the copy completes or fails. A local log larger than the
/// source is refused; a local trailing partial bundle is overwritten with
/// the source's authoritative bytes for that range. The migration is the
/// log's single writer for its duration: a concurrent writer advancing the
/// state surfaces as a CAS conflict at publish time.
pub async fn migrate(
    storage: Arc<dyn LogStorage>,
    origin: impl Into<String>,
    signers: Vec<Arc<dyn CheckpointSigner>>,
    fetcher: Arc<dyn BundleFetcher>,
    options: MigrateOptions,
) -> Result<()> {
    let origin = origin.into();
    let prev = storage.get_state().await?;
    let target_size = prev.as_ref().map_or(0, |s| s.size);
    if target_size > options.source_size {
        return Err(EngineError::invariant(format!(
            "local size {target_size} > source size {}",
            options.source_size
        )));
    }
    tracing::info!(
        from = target_size,
        to = options.source_size,
        root = %hex::encode(options.source_root),
        "starting migration"
    );

    let local_root = if target_size == options.source_size {
        prev.as_ref().map_or_else(empty_root, |s| s.root)
    } else {
        let copied = Arc::new(AtomicU64::new(0));
        let copy = copy_bundles(
            storage.clone(),
            fetcher,
            target_size,
            options.source_size,
            options.workers.max(1),
            copied,
        );
        let integrate = integrate_copied(storage.as_ref(), target_size, options.source_size);
        let ((), root) = futures::try_join!(copy, integrate)?;
        root
    };

    if local_root != options.source_root {
        return Err(EngineError::RootMismatch {
            local: hex::encode(local_root),
            source_root: hex::encode(options.source_root),
        });
    }

    if target_size < options.source_size {
        let checkpoint = Checkpoint {
            origin,
            size: options.source_size,
            root: local_root,
        };
        let signer_refs: Vec<&dyn CheckpointSigner> = signers.iter().map(|s| s.as_ref()).collect();
        let note = sign_note(&checkpoint, &signer_refs)?;
        let next = TreeState {
            size: options.source_size,
            root: local_root,
            checkpoint: note,
        };
        storage.put_state(prev.as_ref(), &next).await?;
    }
    tracing::info!(size = options.source_size, "migration complete");
    Ok(())
}

/// Fan the bundle addresses out to `workers` copy tasks.
async fn copy_bundles(
    storage: Arc<dyn LogStorage>,
    fetcher: Arc<dyn BundleFetcher>,
    from: u64,
    source_size: u64,
    workers: usize,
    copied: Arc<AtomicU64>,
) -> Result<()> {
    let (todo_tx, todo_rx) = mpsc::channel::<layout::BundleAddress>(workers);
    let todo_rx = Arc::new(Mutex::new(todo_rx));

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    tasks.spawn(async move {
        for addr in layout::bundle_range(from, source_size, source_size) {
            if todo_tx.send(addr).await.is_err() {
                break;
            }
        }
        Ok(())
    });
    for _ in 0..workers {
        let todo_rx = todo_rx.clone();
        let storage = storage.clone();
        let fetcher = fetcher.clone();
        let copied = copied.clone();
        tasks.spawn(async move {
            loop {
                let addr = { todo_rx.lock().await.recv().await };
                let Some(addr) = addr else {
                    return Ok(());
                };
                copy_one(storage.as_ref(), fetcher.as_ref(), addr).await?;
                let n = copied.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(bundles = n, index = addr.index, "copied entry bundle");
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| EngineError::internal(format!("copy worker panicked: {e}")))??;
    }
    Ok(())
}

/// Fetch and store one bundle, retrying transient failures with capped
/// exponential backoff.
async fn copy_one(
    storage: &dyn LogStorage,
    fetcher: &dyn BundleFetcher,
    addr: layout::BundleAddress,
) -> Result<()> {
    let mut delay = INITIAL_RETRY_DELAY;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = async {
            let bytes = fetcher.fetch_entry_bundle(addr.index, addr.partial).await?;
            storage.put_entry_bundle(addr.index, addr.partial, &bytes).await?;
            Ok(())
        }
        .await;
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_COPY_ATTEMPTS && !is_fatal(&e) => {
                tracing::warn!(
                    index = addr.index,
                    partial = addr.partial,
                    attempt,
                    error = %e,
                    "bundle copy failed, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Errors that retrying cannot fix.
fn is_fatal(e: &EngineError) -> bool {
    matches!(
        e,
        EngineError::Invariant(_) | EngineError::RootMismatch { .. } | EngineError::InvalidEntry(_)
    )
}

/// Fold contiguous copied bundles into the tile grid until the tree reaches
/// `source_size`, then return the recomputed root. Bundles may land in any
/// order; only the contiguous prefix beyond the current size is integrated.
/// Tiles are flushed as they accumulate; the state record is left alone.
async fn integrate_copied(
    storage: &dyn LogStorage,
    from: u64,
    source_size: u64,
) -> Result<Hash> {
    let mut builder = TreeBuilder::new(storage, from);
    loop {
        let size = builder.size();
        if size == source_size {
            builder.flush().await?;
            return builder.root().await;
        }

        let mut hashes: Vec<Hash> = Vec::new();
        let mut next = size;
        for addr in layout::bundle_range(size, source_size, source_size) {
            match storage.get_entry_bundle(addr.index, addr.partial).await {
                Ok(bytes) => {
                    let bundle = EntryBundle::from_bytes(&bytes)?;
                    let expected = match addr.partial {
                        0 => ENTRY_BUNDLE_WIDTH,
                        w => w,
                    };
                    if bundle.len() as u64 != expected {
                        return Err(EngineError::invariant(format!(
                            "source bundle {} holds {} entries, expected {expected}",
                            addr.index,
                            bundle.len()
                        )));
                    }
                    let skip = (next - addr.index * ENTRY_BUNDLE_WIDTH) as usize;
                    for data in &bundle.entries()[skip..] {
                        hashes.push(leaf_hash(data));
                    }
                    next = addr.index * ENTRY_BUNDLE_WIDTH + bundle.len() as u64;
                }
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e.into()),
            }
        }

        if hashes.is_empty() {
            // Workers haven't delivered the next contiguous bundle yet.
            tokio::time::sleep(INTEGRATE_POLL).await;
            continue;
        }
        builder.append_leaves(&hashes).await?;
        builder.flush().await?;
        builder.compact();
        tracing::info!(
            integrated = builder.size(),
            source = source_size,
            "migration integration progress"
        );
    }
}
