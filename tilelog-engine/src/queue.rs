//! Batching and dedup queue
//!
//! Admission path for new entries. Submissions buffer in a bounded channel
//! and flush as one batch when the buffer reaches `max_batch_size` or the
//! oldest buffered entry reaches `max_batch_age`; a single worker drains
//! flushed batches and drives integration, so the buffer keeps filling while
//! a batch is being integrated.
//!
//! Every in-flight entry (buffered or integrating) is tracked in an
//! identity-keyed map. A duplicate submission receives a clone of the
//! original's future and is not buffered again; the map entry is cleared
//! only after the batch completes and every waiter has been resolved, so
//! duplicates arriving mid-integration still collapse. A failed batch
//! resolves all of its waiters with the same error, after which the entry
//! may be resubmitted.

use crate::error::{EngineError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tilelog_core::Entry;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A cloneable single-shot future resolving to the entry's assigned index,
/// or to the shared error that failed its batch.
pub type IndexFuture = Shared<BoxFuture<'static, Result<u64>>>;

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Flush when this many entries are buffered.
    pub max_batch_size: usize,
    /// Flush when the oldest buffered entry is this old.
    pub max_batch_age: Duration,
    /// Admission cap: entries buffered beyond this are rejected with
    /// [`EngineError::Overloaded`] so callers can back off.
    pub max_pending: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 256,
            max_batch_age: Duration::from_millis(250),
            max_pending: 1024,
        }
    }
}

/// Integration callback: receives a flushed batch in submission order and
/// returns the index assigned to its first entry.
pub(crate) type BatchFn =
    Arc<dyn Fn(Vec<Entry>) -> BoxFuture<'static, Result<u64>> + Send + Sync>;

struct QueueItem {
    entry: Entry,
    done: oneshot::Sender<Result<u64>>,
}

type InFlightMap = Arc<Mutex<HashMap<Vec<u8>, IndexFuture>>>;

/// The admission queue. Owns the batcher and worker tasks; dropping the
/// queue aborts them and resolves still-pending futures with
/// [`EngineError::QueueClosed`].
pub(crate) struct Queue {
    in_flight: InFlightMap,
    buf_tx: mpsc::Sender<QueueItem>,
    batcher: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl Queue {
    pub(crate) fn new(options: QueueOptions, flush: BatchFn) -> Self {
        let in_flight: InFlightMap = Arc::new(Mutex::new(HashMap::new()));
        let (buf_tx, buf_rx) = mpsc::channel(options.max_pending.max(1));
        // Capacity 1: the batcher hands a flushed batch straight to the
        // worker and goes back to filling the next one.
        let (work_tx, work_rx) = mpsc::channel(1);

        let batcher = tokio::spawn(run_batcher(buf_rx, work_tx, options));
        let worker = tokio::spawn(run_worker(work_rx, in_flight.clone(), flush));

        Self {
            in_flight,
            buf_tx,
            batcher,
            worker,
        }
    }

    /// Queue an entry, returning its index future. Duplicates of an
    /// in-flight identity share the original's future.
    pub(crate) fn add(&self, entry: Entry) -> IndexFuture {
        let key = entry.identity().to_vec();

        let (tx, rx) = oneshot::channel();
        let future: IndexFuture = async move {
            rx.await
                .unwrap_or(Err(EngineError::QueueClosed))
        }
        .boxed()
        .shared();

        {
            let mut map = self.in_flight.lock().expect("mutex poisoned");
            if let Some(existing) = map.get(&key) {
                return existing.clone();
            }
            map.insert(key.clone(), future.clone());
        }

        if let Err(send_err) = self.buf_tx.try_send(QueueItem { entry, done: tx }) {
            // Admission failed: withdraw the dedup entry and resolve the
            // future (covering any duplicate that grabbed it meanwhile).
            self.in_flight.lock().expect("mutex poisoned").remove(&key);
            let err = match &send_err {
                mpsc::error::TrySendError::Full(_) => EngineError::Overloaded,
                mpsc::error::TrySendError::Closed(_) => EngineError::QueueClosed,
            };
            let item = match send_err {
                mpsc::error::TrySendError::Full(item)
                | mpsc::error::TrySendError::Closed(item) => item,
            };
            let _ = item.done.send(Err(err));
        }
        future
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.batcher.abort();
        self.worker.abort();
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").finish_non_exhaustive()
    }
}

/// Collect buffered items into batches and emit them on size/age triggers.
async fn run_batcher(
    mut buf_rx: mpsc::Receiver<QueueItem>,
    work_tx: mpsc::Sender<Vec<QueueItem>>,
    options: QueueOptions,
) {
    let mut batch: Vec<QueueItem> = Vec::new();
    let mut deadline = Instant::now();
    loop {
        if batch.is_empty() {
            match buf_rx.recv().await {
                Some(item) => {
                    deadline = Instant::now() + options.max_batch_age;
                    batch.push(item);
                }
                None => break,
            }
        } else {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if work_tx.send(std::mem::take(&mut batch)).await.is_err() {
                        return;
                    }
                }
                item = buf_rx.recv() => match item {
                    Some(item) => batch.push(item),
                    None => break,
                },
            }
        }
        if batch.len() >= options.max_batch_size {
            if work_tx.send(std::mem::take(&mut batch)).await.is_err() {
                return;
            }
        }
    }
    // Admission side closed: flush what remains.
    if !batch.is_empty() {
        let _ = work_tx.send(batch).await;
    }
}

/// Drain flushed batches, drive integration, resolve and clear waiters.
async fn run_worker(
    mut work_rx: mpsc::Receiver<Vec<QueueItem>>,
    in_flight: InFlightMap,
    flush: BatchFn,
) {
    while let Some(items) = work_rx.recv().await {
        let entries: Vec<Entry> = items.iter().map(|i| i.entry.clone()).collect();
        let count = entries.len();
        let result = flush(entries).await;
        match &result {
            Ok(start) => tracing::debug!(start, count, "batch integrated"),
            Err(e) => tracing::warn!(count, error = %e, "batch failed"),
        }

        let mut map = in_flight.lock().expect("mutex poisoned");
        for (offset, item) in items.into_iter().enumerate() {
            let resolved = match &result {
                Ok(start) => Ok(start + offset as u64),
                Err(e) => Err(e.clone()),
            };
            let _ = item.done.send(resolved);
            map.remove(item.entry.identity());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A flush function assigning contiguous indices, optionally failing.
    fn counting_flush(
        next: Arc<AtomicU64>,
        fail_batches: Arc<Mutex<u32>>,
        batches: Arc<Mutex<Vec<usize>>>,
    ) -> BatchFn {
        Arc::new(move |entries: Vec<Entry>| {
            let next = next.clone();
            let fail_batches = fail_batches.clone();
            let batches = batches.clone();
            async move {
                batches.lock().unwrap().push(entries.len());
                {
                    let mut fails = fail_batches.lock().unwrap();
                    if *fails > 0 {
                        *fails -= 1;
                        return Err(EngineError::storage("injected failure"));
                    }
                }
                Ok(next.fetch_add(entries.len() as u64, Ordering::SeqCst))
            }
            .boxed()
        })
    }

    fn test_queue(options: QueueOptions) -> (Queue, Arc<Mutex<Vec<usize>>>, Arc<Mutex<u32>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let fails = Arc::new(Mutex::new(0));
        let queue = Queue::new(
            options,
            counting_flush(Arc::new(AtomicU64::new(0)), fails.clone(), batches.clone()),
        );
        (queue, batches, fails)
    }

    fn fast_options() -> QueueOptions {
        QueueOptions {
            max_batch_size: 4,
            max_batch_age: Duration::from_millis(20),
            max_pending: 8,
        }
    }

    #[tokio::test]
    async fn test_indices_are_dense_and_ordered() {
        let (queue, _, _) = test_queue(fast_options());
        let futures: Vec<IndexFuture> = (0u64..10)
            .map(|i| queue.add(Entry::new(i.to_be_bytes().to_vec()).unwrap()))
            .collect();
        let mut indices = Vec::new();
        for f in futures {
            indices.push(f.await.unwrap());
        }
        assert_eq!(indices, (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_duplicates_share_one_index() {
        let (queue, batches, _) = test_queue(fast_options());
        let entry = Entry::new(b"same".to_vec()).unwrap();
        let f1 = queue.add(entry.clone());
        let f2 = queue.add(entry.clone());
        let f3 = queue.add(entry);

        let (i1, i2, i3) = (f1.await.unwrap(), f2.await.unwrap(), f3.await.unwrap());
        assert_eq!(i1, i2);
        assert_eq!(i2, i3);
        // Exactly one slot consumed.
        assert_eq!(batches.lock().unwrap().iter().sum::<usize>(), 1);
    }

    #[tokio::test]
    async fn test_distinct_identities_are_not_collapsed() {
        let (queue, _, _) = test_queue(fast_options());
        let a = queue.add(Entry::with_identity(b"same".to_vec(), b"ka".to_vec()).unwrap());
        let b = queue.add(Entry::with_identity(b"same".to_vec(), b"kb".to_vec()).unwrap());
        assert_ne!(a.await.unwrap(), b.await.unwrap());
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_full_batches() {
        let (queue, batches, _) = test_queue(fast_options());
        let futures: Vec<IndexFuture> = (0u64..8)
            .map(|i| queue.add(Entry::new(i.to_be_bytes().to_vec()).unwrap()))
            .collect();
        for f in futures {
            f.await.unwrap();
        }
        // max_batch_size = 4: two full batches.
        assert_eq!(*batches.lock().unwrap(), vec![4, 4]);
    }

    #[tokio::test]
    async fn test_age_trigger_flushes_short_batch() {
        let (queue, batches, _) = test_queue(fast_options());
        let f = queue.add(Entry::new(b"lonely".to_vec()).unwrap());
        assert_eq!(f.await.unwrap(), 0);
        assert_eq!(*batches.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_cleared() {
        let (queue, _, fails) = test_queue(fast_options());
        *fails.lock().unwrap() = 1;

        let entry = Entry::new(b"doomed".to_vec()).unwrap();
        let f1 = queue.add(entry.clone());
        let f2 = queue.add(entry.clone());

        let e1 = f1.await.unwrap_err();
        let e2 = f2.await.unwrap_err();
        assert_eq!(e1, e2);
        assert_eq!(e1, EngineError::storage("injected failure"));

        // The identity is free again and integrates cleanly.
        let f3 = queue.add(entry);
        assert_eq!(f3.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overload_rejects_admission() {
        // A flush function that never completes: the worker wedges on the
        // first batch and everything behind it piles up until the buffer
        // rejects admission.
        let stuck: BatchFn = Arc::new(|_| futures::future::pending().boxed());
        let queue = Queue::new(
            QueueOptions {
                max_batch_size: 1,
                max_batch_age: Duration::from_millis(1),
                max_pending: 2,
            },
            stuck,
        );

        // Capacity ahead of the buffer: one batch in the worker, one in the
        // hand-off channel, one in the batcher's hand, two buffered.
        let mut futures = Vec::new();
        for i in 0u64..6 {
            futures.push(queue.add(Entry::new(i.to_be_bytes().to_vec()).unwrap()));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let overflow = futures.pop().unwrap();
        assert_eq!(overflow.await.unwrap_err(), EngineError::Overloaded);
    }
}
