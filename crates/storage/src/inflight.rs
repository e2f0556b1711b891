//! Per-key coordination of concurrent range reads (single-flight).
//!
//! ```text
//! reader A ──miss──> start read(key) ──┐
//! reader B ──miss──> join  read(key) ──┼──> one range request ──> same result
//! reader C ──miss──> join  read(key) ──┘
//! ```
//!
//! The read itself is stored as a `Shared` future, so it keeps running as
//! long as any waiter polls it; the table lock is held only for the map
//! lookup. Each entry counts its waiters and is dropped with the last one,
//! whether that waiter finished or was cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::error::CacheError;
use crate::record_store::CacheKey;

/// Result of a shared range read.
pub type ReadResult = Result<Arc<Vec<u8>>, CacheError>;

type SharedRead = Shared<BoxFuture<'static, ReadResult>>;

struct PendingRead {
    /// Tags which registration the entry belongs to.
    generation: u64,
    read: SharedRead,
    waiters: usize,
}

/// In-flight range reads keyed by `(asset_space, path, version)`.
#[derive(Default)]
pub struct InFlightReads {
    pending: Mutex<HashMap<CacheKey, PendingRead>>,
    next_generation: AtomicU64,
    started: AtomicU64,
    coalesced: AtomicU64,
}

impl InFlightReads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `read` for `key`, or join the read already in flight for it.
    ///
    /// All callers for the same key receive the same result, success or
    /// error.
    ///
    /// # Arguments
    /// * `key` - Key identifying the read
    /// * `read` - Creates the read future; only called if nothing is in flight
    pub async fn run<F, Fut>(&self, key: &CacheKey, read: F) -> ReadResult
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = ReadResult> + Send + 'static,
    {
        let (generation, shared): (u64, SharedRead) = {
            let mut pending = self.pending.lock();
            match pending.get_mut(key) {
                Some(entry) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    entry.waiters += 1;
                    (entry.generation, entry.read.clone())
                }
                None => {
                    self.started.fetch_add(1, Ordering::Relaxed);
                    let generation: u64 = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let shared: SharedRead = read().boxed().shared();
                    pending.insert(
                        key.clone(),
                        PendingRead {
                            generation,
                            read: shared.clone(),
                            waiters: 1,
                        },
                    );
                    (generation, shared)
                }
            }
        };

        let mut waiter: Waiter<'_> = Waiter {
            table: self,
            key,
            generation,
            finished: false,
        };
        let result: ReadResult = shared.await;
        waiter.finished = true;

        result
    }

    /// Number of reads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Reads actually started.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Callers that joined a read already in flight.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

/// One caller's registration on a pending read.
struct Waiter<'a> {
    table: &'a InFlightReads,
    key: &'a CacheKey,
    generation: u64,
    finished: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut pending = self.table.pending.lock();
        let remove: bool = match pending.get_mut(self.key) {
            Some(entry) if entry.generation == self.generation => {
                entry.waiters = entry.waiters.saturating_sub(1);
                // First finisher unregisters; a later read for the key starts fresh.
                self.finished || entry.waiters == 0
            }
            _ => false,
        };
        if remove {
            pending.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_reads_share_one_call() {
        let table: Arc<InFlightReads> = Arc::new(InFlightReads::new());
        let calls: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let key: CacheKey = CacheKey::new("g", "a", 1);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table: Arc<InFlightReads> = table.clone();
            let calls: Arc<AtomicUsize> = calls.clone();
            let key: CacheKey = key.clone();
            handles.push(tokio::spawn(async move {
                table
                    .run(&key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Arc::new(b"bytes".to_vec()))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_slice(), b"bytes");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(table.started(), 1);
        assert_eq!(table.coalesced(), 7);
        assert_eq!(table.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared_and_not_cached() {
        let table: InFlightReads = InFlightReads::new();
        let key: CacheKey = CacheKey::new("g", "a", 1);

        let first: ReadResult = table
            .run(&key, || async {
                Err(CacheError::RangeReadFailed {
                    path: "a".into(),
                    message: "boom".into(),
                })
            })
            .await;
        assert!(first.is_err());

        let second: ReadResult = table
            .run(&key, || async { Ok(Arc::new(vec![1u8])) })
            .await;
        assert_eq!(second.unwrap().as_slice(), &[1u8]);
        assert_eq!(table.started(), 2);
    }

    #[tokio::test]
    async fn test_different_versions_do_not_coalesce() {
        let table: InFlightReads = InFlightReads::new();
        let v1: ReadResult = table
            .run(&CacheKey::new("g", "a", 1), || async { Ok(Arc::new(b"old".to_vec())) })
            .await;
        let v2: ReadResult = table
            .run(&CacheKey::new("g", "a", 2), || async { Ok(Arc::new(b"new".to_vec())) })
            .await;
        assert_eq!(v1.unwrap().as_slice(), b"old");
        assert_eq!(v2.unwrap().as_slice(), b"new");
    }

    #[tokio::test]
    async fn test_cancelled_reads_are_unregistered() {
        let table: InFlightReads = InFlightReads::new();

        for version in 0..5u64 {
            let key: CacheKey = CacheKey::new("g", "a", version);
            let cancelled = tokio::time::timeout(
                Duration::from_millis(5),
                table.run(&key, || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Arc::new(Vec::new()))
                }),
            )
            .await;
            assert!(cancelled.is_err());
        }

        assert_eq!(table.in_flight(), 0);
        assert_eq!(table.started(), 5);
    }

    #[tokio::test]
    async fn test_read_survives_one_cancelled_waiter() {
        let table: Arc<InFlightReads> = Arc::new(InFlightReads::new());
        let key: CacheKey = CacheKey::new("g", "a", 1);

        let slow = {
            let table: Arc<InFlightReads> = table.clone();
            let key: CacheKey = key.clone();
            tokio::spawn(async move {
                table
                    .run(&key, || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(Arc::new(b"bytes".to_vec()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let impatient = tokio::time::timeout(
            Duration::from_millis(5),
            table.run(&key, || async { Ok(Arc::new(Vec::new())) }),
        )
        .await;
        assert!(impatient.is_err());
        assert_eq!(table.in_flight(), 1);

        assert_eq!(slow.await.unwrap().unwrap().as_slice(), b"bytes");
        assert_eq!(table.started(), 1);
        assert_eq!(table.in_flight(), 0);
    }
}
