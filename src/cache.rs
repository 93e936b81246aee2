use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{FALLBACK_GENERATING, FALLBACK_UNAVAILABLE};

/// In-memory cache for the single AI-generated market prediction.
///
/// Reads never block on generation: a stale or empty cache returns the best
/// available payload immediately and the caller kicks off a background
/// refresh. The `in_flight` flag is the only synchronization point for
/// refresh coordination — `try_begin_refresh` is a compare-and-swap, so two
/// requests racing on a stale cache can never start two jobs.
pub struct PredictionCache {
    entry: Mutex<CacheEntry>,
    in_flight: AtomicBool,
}

#[derive(Default)]
struct CacheEntry {
    /// None until the first refresh job completes. After that, always the
    /// output of the most recently *completed* job (success or fallback).
    content: Option<String>,
    generated_at: Option<Instant>,
}

/// Result of a cache read. `payload` is always usable; `needs_refresh` tells
/// the caller whether to attempt starting a background job.
#[derive(Debug)]
pub struct CacheRead {
    pub payload: String,
    pub needs_refresh: bool,
}

/// Terminal state of a refresh job. Both are normal completion.
#[derive(Debug)]
pub enum RefreshOutcome {
    Generated(String),
    Failed,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self {
            entry: Mutex::new(CacheEntry::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Read the current prediction. Fresh content is returned as-is with no
    /// side effects; stale or missing content returns the previous payload
    /// (or the fixed fallback) flagged for refresh. Never blocks on
    /// generation, never fails.
    pub fn read(&self, staleness: Duration) -> CacheRead {
        let entry = self.lock_entry();
        match (&entry.content, entry.generated_at) {
            (Some(content), Some(at)) if at.elapsed() < staleness => CacheRead {
                payload: content.clone(),
                needs_refresh: false,
            },
            (Some(content), _) => CacheRead {
                payload: content.clone(),
                needs_refresh: true,
            },
            _ => CacheRead {
                payload: FALLBACK_GENERATING.to_string(),
                needs_refresh: true,
            },
        }
    }

    /// Claim the refresh slot. Returns true for exactly one caller while no
    /// job is in flight; everyone else gets false and serves stale content.
    pub fn try_begin_refresh(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record the outcome of a refresh job. A failure caches the fixed
    /// fallback payload with a fresh timestamp, so retries are suppressed for
    /// a full staleness window. `in_flight` is cleared last — after the entry
    /// mutex is released — so a new refresh can only start once the fields
    /// are consistent.
    pub fn complete(&self, outcome: RefreshOutcome) {
        {
            let mut entry = self.lock_entry();
            entry.content = Some(match outcome {
                RefreshOutcome::Generated(text) => text,
                RefreshOutcome::Failed => FALLBACK_UNAVAILABLE.to_string(),
            });
            entry.generated_at = Some(Instant::now());
        }
        self.in_flight.store(false, Ordering::Release);
    }

    /// Age of the cached prediction, for the health endpoint.
    pub fn age(&self) -> Option<Duration> {
        self.lock_entry().generated_at.map(|at| at.elapsed())
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn lock_entry(&self) -> std::sync::MutexGuard<'_, CacheEntry> {
        // A panicked holder can only have been between two field writes;
        // the entry is still structurally valid, so recover the guard.
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rewind `generated_at` so tests can construct a stale cache.
    #[cfg(test)]
    pub fn backdate(&self, age: Duration) {
        let mut entry = self.lock_entry();
        entry.generated_at = Some(Instant::now() - age);
    }
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn empty_cache_returns_fallback_and_wants_refresh() {
        let cache = PredictionCache::new();
        let read = cache.read(WINDOW);
        assert_eq!(read.payload, FALLBACK_GENERATING);
        assert!(read.needs_refresh);
        assert!(!cache.in_flight());
    }

    #[test]
    fn fresh_content_is_returned_without_refresh() {
        let cache = PredictionCache::new();
        cache.try_begin_refresh();
        cache.complete(RefreshOutcome::Generated("forecast".to_string()));

        let read = cache.read(WINDOW);
        assert_eq!(read.payload, "forecast");
        assert!(!read.needs_refresh);
    }

    #[test]
    fn repeated_reads_within_window_are_identical() {
        let cache = PredictionCache::new();
        cache.try_begin_refresh();
        cache.complete(RefreshOutcome::Generated("forecast".to_string()));

        let first = cache.read(WINDOW).payload;
        for _ in 0..10 {
            assert_eq!(cache.read(WINDOW).payload, first);
        }
    }

    #[test]
    fn stale_content_is_served_while_flagging_refresh() {
        let cache = PredictionCache::new();
        cache.try_begin_refresh();
        cache.complete(RefreshOutcome::Generated("old forecast".to_string()));
        cache.backdate(Duration::from_secs(400));

        let read = cache.read(WINDOW);
        assert_eq!(read.payload, "old forecast", "stale content still served");
        assert!(read.needs_refresh);
    }

    #[test]
    fn content_aged_10s_is_still_fresh() {
        let cache = PredictionCache::new();
        cache.try_begin_refresh();
        cache.complete(RefreshOutcome::Generated("forecast".to_string()));
        cache.backdate(Duration::from_secs(10));

        let read = cache.read(WINDOW);
        assert_eq!(read.payload, "forecast");
        assert!(!read.needs_refresh);
    }

    #[test]
    fn only_one_caller_wins_the_refresh_slot() {
        let cache = PredictionCache::new();
        assert!(cache.try_begin_refresh());
        assert!(!cache.try_begin_refresh());
        assert!(cache.in_flight());
    }

    #[test]
    fn completion_releases_the_refresh_slot() {
        let cache = PredictionCache::new();
        assert!(cache.try_begin_refresh());
        cache.complete(RefreshOutcome::Generated("forecast".to_string()));
        assert!(!cache.in_flight());
        assert!(cache.try_begin_refresh());
    }

    #[test]
    fn failure_caches_fallback_with_fresh_timestamp() {
        let cache = PredictionCache::new();
        cache.try_begin_refresh();
        cache.complete(RefreshOutcome::Failed);

        assert!(!cache.in_flight());
        let read = cache.read(WINDOW);
        assert_eq!(read.payload, FALLBACK_UNAVAILABLE);
        // Failure satisfies the staleness window — no immediate retry.
        assert!(!read.needs_refresh);
        assert!(cache.age().unwrap() < Duration::from_secs(1));
    }

    #[test]
    fn concurrent_stale_readers_start_exactly_one_refresh() {
        let cache = Arc::new(PredictionCache::new());
        cache.try_begin_refresh();
        cache.complete(RefreshOutcome::Generated("old forecast".to_string()));
        cache.backdate(Duration::from_secs(400));

        let started = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let started = Arc::clone(&started);
                std::thread::spawn(move || {
                    let read = cache.read(WINDOW);
                    assert_eq!(read.payload, "old forecast");
                    if read.needs_refresh && cache.try_begin_refresh() {
                        started.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight());
    }
}
