//! Migration copier scenarios: full copies, resumed copies, root
//! mismatches, and the copy accounting the layout math promises.

mod common;

use async_trait::async_trait;
use common::{entries, signers, verifier, TestStorage, ORIGIN};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tilelog_core::{open_note, Hash};
use tilelog_engine::{
    migrate, BundleFetcher, EngineError, MigrateOptions, Result, Sequencer,
};
use tilelog_storage::{LogStorage, MemoryLogStorage};

/// Build a source log of `n` entries, returning its storage and root.
async fn source_log(n: u64) -> (Arc<MemoryLogStorage>, Hash) {
    let storage = Arc::new(MemoryLogStorage::new());
    let sequencer = Sequencer::new(storage.clone(), "source.example/log", signers());
    let mut at = 0;
    while at < n {
        let chunk = (n - at).min(300);
        sequencer.append_batch(&entries(at..at + chunk)).await.unwrap();
        at += chunk;
    }
    let root = storage
        .get_state()
        .await
        .unwrap()
        .map(|s| s.root)
        .unwrap_or_else(tilelog_core::empty_root);
    (storage, root)
}

/// Fetches bundles straight out of a source log's storage, counting calls
/// and optionally failing the first few.
#[derive(Debug)]
struct SourceFetcher {
    storage: Arc<MemoryLogStorage>,
    fetches: AtomicU64,
    fail_first: AtomicU32,
}

impl SourceFetcher {
    fn new(storage: Arc<MemoryLogStorage>) -> Self {
        Self {
            storage,
            fetches: AtomicU64::new(0),
            fail_first: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl BundleFetcher for SourceFetcher {
    async fn fetch_entry_bundle(&self, index: u64, partial: u64) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failures = self.fail_first.load(Ordering::SeqCst);
        if failures > 0 {
            self.fail_first.store(failures - 1, Ordering::SeqCst);
            return Err(EngineError::storage("injected fetch failure"));
        }
        Ok(self.storage.get_entry_bundle(index, partial).await?)
    }
}

#[tokio::test]
async fn test_migrate_exact_match() {
    // S5: 1000 leaves copy over as ceil(1000/256) = 4 bundle writes and the
    // local root lands on the source's.
    let (source, root) = source_log(1000).await;
    let target = Arc::new(TestStorage::new());
    let fetcher = Arc::new(SourceFetcher::new(source));

    migrate(
        target.clone(),
        ORIGIN,
        signers(),
        fetcher.clone(),
        MigrateOptions {
            workers: 3,
            source_size: 1000,
            source_root: root,
        },
    )
    .await
    .unwrap();

    assert_eq!(target.bundle_puts(), 4);
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 4);

    let state = target.get_state().await.unwrap().unwrap();
    assert_eq!(state.size, 1000);
    assert_eq!(state.root, root);
    // The local log signs its own checkpoint over the verified root.
    let checkpoint = open_note(&state.checkpoint, &verifier()).unwrap();
    assert_eq!(checkpoint.size, 1000);
    assert_eq!(checkpoint.root, root);
}

#[tokio::test]
async fn test_migrate_root_mismatch_publishes_nothing() {
    // S6: the copy proceeds, the mismatch is fatal, and no local state is
    // published.
    let (source, root) = source_log(500).await;
    let mut wrong_root = root;
    wrong_root[0] ^= 0xff;

    let target = Arc::new(TestStorage::new());
    let err = migrate(
        target.clone(),
        ORIGIN,
        signers(),
        Arc::new(SourceFetcher::new(source)),
        MigrateOptions {
            workers: 2,
            source_size: 500,
            source_root: wrong_root,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, EngineError::RootMismatch { .. }), "{err:?}");
    // Bundles and tiles were copied, but the state record was never set.
    assert!(target.bundle_puts() > 0);
    assert_eq!(target.get_state().await.unwrap(), None);
}

#[tokio::test]
async fn test_migrate_resumes_and_overwrites_partial_tail() {
    // A target already holding a prefix (with a trailing partial bundle)
    // resumes from its own size; the source's bytes overwrite the tail
    // bundle address it republishes.
    let (source, root) = source_log(700).await;

    // Local log with the same first 300 entries.
    let target = Arc::new(TestStorage::new());
    let sequencer = Sequencer::new(target.clone(), ORIGIN, signers());
    sequencer.append_batch(&entries(0..300)).await.unwrap();

    migrate(
        target.clone(),
        ORIGIN,
        signers(),
        Arc::new(SourceFetcher::new(source.clone())),
        MigrateOptions {
            workers: 2,
            source_size: 700,
            source_root: root,
        },
    )
    .await
    .unwrap();

    let state = target.get_state().await.unwrap().unwrap();
    assert_eq!(state.size, 700);
    assert_eq!(state.root, root);

    // Bundle 1 (covering the old 300-entry tail) now matches the source's
    // published bytes for the full bundle.
    let local = target.get_entry_bundle(1, 0).await.unwrap();
    let sources = source.get_entry_bundle(1, 0).await.unwrap();
    assert_eq!(local, sources);
}

#[tokio::test]
async fn test_migrate_refuses_shrinking() {
    let (source, root) = source_log(100).await;
    let target = Arc::new(TestStorage::new());
    let sequencer = Sequencer::new(target.clone(), ORIGIN, signers());
    sequencer.append_batch(&entries(0..200)).await.unwrap();

    let err = migrate(
        target.clone(),
        ORIGIN,
        signers(),
        Arc::new(SourceFetcher::new(source)),
        MigrateOptions {
            workers: 2,
            source_size: 100,
            source_root: root,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Invariant(_)), "{err:?}");
}

#[tokio::test]
async fn test_migrate_retries_transient_fetch_failures() {
    let (source, root) = source_log(600).await;
    let fetcher = Arc::new(SourceFetcher::new(source));
    fetcher.fail_first.store(2, Ordering::SeqCst);

    let target = Arc::new(TestStorage::new());
    migrate(
        target.clone(),
        ORIGIN,
        signers(),
        fetcher.clone(),
        MigrateOptions {
            workers: 2,
            source_size: 600,
            source_root: root,
        },
    )
    .await
    .unwrap();

    // 3 bundles, plus one retry per injected failure.
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 5);
    assert_eq!(target.get_state().await.unwrap().unwrap().size, 600);
}

#[tokio::test]
async fn test_migrate_noop_when_sizes_match() {
    let (source, root) = source_log(256).await;
    let target = Arc::new(TestStorage::new());
    migrate(
        target.clone(),
        ORIGIN,
        signers(),
        Arc::new(SourceFetcher::new(source.clone())),
        MigrateOptions {
            workers: 2,
            source_size: 256,
            source_root: root,
        },
    )
    .await
    .unwrap();
    let puts_after_first = target.bundle_puts();

    // Second run has nothing to copy and verifies the existing root.
    let fetcher = Arc::new(SourceFetcher::new(source));
    migrate(
        target.clone(),
        ORIGIN,
        signers(),
        fetcher.clone(),
        MigrateOptions {
            workers: 2,
            source_size: 256,
            source_root: root,
        },
    )
    .await
    .unwrap();
    assert_eq!(target.bundle_puts(), puts_after_first);
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
}
