//! Single-flight extraction cache.
//!
//! One map entry per video id. The first request for an id claims the
//! entry and spawns a detached task that runs the extractor and settles a
//! watch channel; every request for that id, the claimant included, waits
//! on the channel instead of spawning its own subprocess. The extraction
//! is not tied to any request future, so a claimant whose connection
//! closes mid-extraction leaves the subprocess running for the waiters.
//! Success leaves a `Ready` entry pointing at the cached file. Failure
//! removes the entry so the next request retries from scratch.
//!
//! Eviction is LRU over `Ready` entries, measured by last serve, bounded
//! by `cache_capacity`. In-flight entries are never evicted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::error::{EnsembleError, EnsembleResult};
use crate::extract::extractor::AudioExtractor;
use crate::state::ExtractionConfig;
use crate::track::validate_video_id;

/// A cached, fully-extracted audio file.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    pub path: Arc<PathBuf>,
    pub len: u64,
}

/// Clone-material result shared with waiters over the watch channel.
type Outcome = Result<AudioHandle, String>;

enum Entry {
    Pending(watch::Receiver<Option<Outcome>>),
    Ready { handle: AudioHandle, last_served: u64 },
}

enum Claim {
    Ready(AudioHandle),
    Wait(watch::Receiver<Option<Outcome>>),
    Run(watch::Sender<Option<Outcome>>),
}

pub struct ExtractionCache {
    entries: DashMap<String, Entry>,
    extractor: Arc<dyn AudioExtractor>,
    cache_dir: PathBuf,
    capacity: usize,
    // Monotonic tick stamped onto Ready entries at each serve
    clock: AtomicU64,
}

impl ExtractionCache {
    /// Creates the cache, ensuring the cache directory exists.
    pub fn new(
        config: &ExtractionConfig,
        extractor: Arc<dyn AudioExtractor>,
    ) -> EnsembleResult<Self> {
        std::fs::create_dir_all(&config.cache_dir).map_err(|e| {
            EnsembleError::Internal(format!(
                "failed to create cache dir {}: {}",
                config.cache_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            entries: DashMap::new(),
            extractor,
            cache_dir: config.cache_dir.clone(),
            capacity: config.cache_capacity,
            clock: AtomicU64::new(1),
        })
    }

    /// Resolves a video id to a cached audio file, extracting if needed.
    ///
    /// Concurrent calls for the same id share a single extraction; a call
    /// that arrives mid-extraction waits for its settlement rather than
    /// failing fast. Dropping a caller never cancels the extraction.
    pub async fn resolve(self: &Arc<Self>, video_id: &str) -> EnsembleResult<AudioHandle> {
        validate_video_id(video_id)?;
        let key = video_id.to_string();

        loop {
            let claim = match self.entries.entry(key.clone()) {
                MapEntry::Occupied(mut occ) => match occ.get_mut() {
                    Entry::Ready {
                        handle,
                        last_served,
                    } => {
                        *last_served = self.tick();
                        Claim::Ready(handle.clone())
                    }
                    Entry::Pending(rx) => Claim::Wait(rx.clone()),
                },
                MapEntry::Vacant(vac) => {
                    let (tx, rx) = watch::channel(None);
                    vac.insert(Entry::Pending(rx));
                    Claim::Run(tx)
                }
            };

            match claim {
                Claim::Ready(handle) => return Ok(handle),
                Claim::Wait(rx) => match self.await_settlement(&key, rx).await {
                    Some(outcome) => return into_result(&key, outcome),
                    // Producer vanished without settling; claim again
                    None => continue,
                },
                Claim::Run(tx) => {
                    // The claimant only starts the extraction; it then
                    // waits on the channel like everyone else.
                    let waiter = tx.subscribe();
                    self.run_extraction(key.clone(), tx);
                    match self.await_settlement(&key, waiter).await {
                        Some(outcome) => return into_result(&key, outcome),
                        None => continue,
                    }
                }
            }
        }
    }

    /// Resolves several ids concurrently, returning per-id outcomes in
    /// input order. Single-flight applies per id exactly as in `resolve`.
    pub async fn resolve_batch(
        self: &Arc<Self>,
        video_ids: &[String],
    ) -> Vec<(String, EnsembleResult<AudioHandle>)> {
        let pending = video_ids
            .iter()
            .map(|id| async move { (id.clone(), self.resolve(id).await) });
        futures::future::join_all(pending).await
    }

    /// Number of cached entries, in-flight included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawns the extraction for a freshly claimed entry.
    ///
    /// The task owns the subprocess lifetime: it survives the claimant's
    /// request future and settles the channel for whoever is still
    /// listening.
    fn run_extraction(self: &Arc<Self>, key: String, tx: watch::Sender<Option<Outcome>>) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = cache.perform(&key).await;
            match &outcome {
                Ok(handle) => {
                    // Transition before waking waiters so their re-reads
                    // see Ready, never a stale Pending
                    cache.entries.insert(
                        key.clone(),
                        Entry::Ready {
                            handle: handle.clone(),
                            last_served: cache.tick(),
                        },
                    );
                    cache.evict_over_capacity();
                }
                Err(cause) => {
                    log::warn!("[Cache] Extraction failed for {}: {}", key, cause);
                    cache.entries.remove(&key);
                }
            }
            let _ = tx.send(Some(outcome));
        });
    }

    async fn await_settlement(
        &self,
        key: &str,
        mut rx: watch::Receiver<Option<Outcome>>,
    ) -> Option<Outcome> {
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return Some(outcome);
            }
            if rx.changed().await.is_err() {
                // The extraction task died without settling (panic). Clear
                // the orphaned entry so someone can retry.
                self.entries.remove_if(key, |_, e| match e {
                    Entry::Pending(r) => r.has_changed().is_err(),
                    Entry::Ready { .. } => false,
                });
                return None;
            }
        }
    }

    async fn perform(&self, video_id: &str) -> Outcome {
        // Warm start: a file left by a previous process run is reused
        let cached_path = self.cache_dir.join(format!("{video_id}.mp3"));
        if let Ok(meta) = tokio::fs::metadata(&cached_path).await {
            if meta.is_file() && meta.len() > 0 {
                log::debug!("[Cache] Reusing on-disk file for {}", video_id);
                return Ok(AudioHandle {
                    path: Arc::new(cached_path),
                    len: meta.len(),
                });
            }
        }

        let path = self
            .extractor
            .extract(video_id, &self.cache_dir)
            .await
            .map_err(|e| e.to_string())?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| format!("extracted file unreadable: {}", e))?;
        log::info!(
            "[Cache] Extracted {} ({} bytes) -> {}",
            video_id,
            meta.len(),
            path.display()
        );
        Ok(AudioHandle {
            path: Arc::new(path),
            len: meta.len(),
        })
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Drops least-recently-served `Ready` entries until under capacity.
    fn evict_over_capacity(&self) {
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter_map(|e| match e.value() {
                    Entry::Ready { last_served, .. } => Some((e.key().clone(), *last_served)),
                    Entry::Pending(_) => None,
                })
                .min_by_key(|(_, served)| *served);

            let Some((key, served)) = victim else {
                // Everything in flight; nothing evictable right now
                return;
            };
            let removed = self.entries.remove_if(&key, |_, e| {
                matches!(e, Entry::Ready { last_served, .. } if *last_served == served)
            });
            if let Some((key, Entry::Ready { handle, .. })) = removed {
                log::info!("[Cache] Evicting {} ({})", key, handle.path.display());
                let path = Arc::clone(&handle.path);
                tokio::spawn(async move {
                    if let Err(e) = tokio::fs::remove_file(path.as_ref()).await {
                        log::warn!("[Cache] Failed to remove {}: {}", path.display(), e);
                    }
                });
            }
        }
    }
}

fn into_result(video_id: &str, outcome: Outcome) -> EnsembleResult<AudioHandle> {
    outcome.map_err(|cause| EnsembleError::Extraction {
        video_id: video_id.to_string(),
        cause,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Extractor that writes a small file after a short pause.
    struct FakeExtractor {
        calls: AtomicUsize,
        fail_first: bool,
        delay: Duration,
    }

    impl FakeExtractor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: false,
                delay: Duration::from_millis(20),
            }
        }

        fn failing_first() -> Self {
            Self {
                fail_first: true,
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AudioExtractor for FakeExtractor {
        async fn extract(&self, video_id: &str, dest_dir: &Path) -> EnsembleResult<PathBuf> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail_first && call == 0 {
                return Err(EnsembleError::Extraction {
                    video_id: video_id.to_string(),
                    cause: "simulated failure".to_string(),
                });
            }
            let path = dest_dir.join(format!("{video_id}.mp3"));
            tokio::fs::write(&path, b"mp3-bytes").await.map_err(|e| {
                EnsembleError::Internal(format!("test write failed: {}", e))
            })?;
            Ok(path)
        }
    }

    fn cache_with(
        dir: &Path,
        capacity: usize,
        extractor: Arc<FakeExtractor>,
    ) -> Arc<ExtractionCache> {
        let config = ExtractionConfig {
            cache_dir: dir.to_path_buf(),
            cache_capacity: capacity,
            ..ExtractionConfig::default()
        };
        Arc::new(ExtractionCache::new(&config, extractor).unwrap())
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new());
        let cache = cache_with(dir.path(), 8, Arc::clone(&extractor));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(
                async move { cache.resolve("abc12345678").await },
            ));
        }
        for task in tasks {
            let handle = task.await.unwrap().unwrap();
            assert_eq!(handle.len, 9);
        }
        assert_eq!(extractor.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failure_is_not_cached_and_retry_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::failing_first());
        let cache = cache_with(dir.path(), 8, Arc::clone(&extractor));

        let err = cache.resolve("abc12345678").await.unwrap_err();
        assert!(matches!(err, EnsembleError::Extraction { .. }));
        assert!(cache.is_empty());

        let handle = cache.resolve("abc12345678").await.unwrap();
        assert_eq!(handle.len, 9);
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn waiters_observe_the_shared_failure() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::failing_first());
        let cache = cache_with(dir.path(), 8, Arc::clone(&extractor));

        let c1 = Arc::clone(&cache);
        let first = tokio::spawn(async move { c1.resolve("abc12345678").await });
        // Give the first request time to claim the entry
        tokio::time::sleep(Duration::from_millis(5)).await;
        let c2 = Arc::clone(&cache);
        let second = tokio::spawn(async move { c2.resolve("abc12345678").await });

        assert!(first.await.unwrap().is_err());
        assert!(second.await.unwrap().is_err());
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn extraction_outlives_a_vanished_claimant() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor {
            delay: Duration::from_millis(80),
            ..FakeExtractor::new()
        });
        let cache = cache_with(dir.path(), 8, Arc::clone(&extractor));

        let claimant = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.resolve("abc12345678").await }
        });
        // Let the claimant stake the entry and start the extraction
        tokio::time::sleep(Duration::from_millis(10)).await;
        claimant.abort();

        // A later waiter still gets the outcome of that one extraction
        let handle = cache.resolve("abc12345678").await.unwrap();
        assert_eq!(handle.len, 9);
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn existing_file_on_disk_skips_extraction() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc12345678.mp3"), b"warm").unwrap();
        let extractor = Arc::new(FakeExtractor::new());
        let cache = cache_with(dir.path(), 8, Arc::clone(&extractor));

        let handle = cache.resolve("abc12345678").await.unwrap();
        assert_eq!(handle.len, 4);
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn least_recently_served_entry_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new());
        let cache = cache_with(dir.path(), 2, Arc::clone(&extractor));

        cache.resolve("aaaaaaaaaa1").await.unwrap();
        cache.resolve("aaaaaaaaaa2").await.unwrap();
        // Touch the first so the second becomes the LRU victim
        cache.resolve("aaaaaaaaaa1").await.unwrap();
        cache.resolve("aaaaaaaaaa3").await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.resolve("aaaaaaaaaa1").await.is_ok());
        assert_eq!(extractor.calls(), 3);

        // The evicted file is eventually deleted from disk
        let evicted = dir.path().join("aaaaaaaaaa2.mp3");
        for _ in 0..50 {
            if !evicted.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!evicted.exists());
    }

    #[tokio::test]
    async fn batch_reports_per_id_outcomes_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new());
        let cache = cache_with(dir.path(), 8, Arc::clone(&extractor));

        let ids = vec![
            "aaaaaaaaaa1".to_string(),
            "not-an-id".to_string(),
            "aaaaaaaaaa2".to_string(),
        ];
        let results = cache.resolve_batch(&ids).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "aaaaaaaaaa1");
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(EnsembleError::Validation(_))));
        assert!(results[2].1.is_ok());
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_video_id_is_rejected_before_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new());
        let cache = cache_with(dir.path(), 8, Arc::clone(&extractor));

        let err = cache.resolve("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, EnsembleError::Validation(_)));
        assert_eq!(extractor.calls(), 0);
        assert!(cache.is_empty());
    }
}
