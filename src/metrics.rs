//! Bucketed sliding-window failure tracking.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::state::State;

/// One fixed time slice of the rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Successes recorded in this slice.
    pub success_count: u64,
    /// Failures recorded in this slice.
    pub failure_count: u64,
    /// Unix-epoch millisecond the slice began at.
    pub bucket_start_time: u64,
}

/// Fixed ring of buckets covering the rolling window.
///
/// A recording lands in slot `(now / bucket_duration) % bucket_count`; a
/// slot left over from an earlier pass of the ring is cleared before the
/// increment. Memory and metrics cost are O(bucket count) regardless of
/// request rate.
pub(crate) struct SlidingWindow {
    buckets: Mutex<SmallVec<[Bucket; 16]>>,
    window_ms: u64,
    bucket_ms: u64,
}

impl SlidingWindow {
    pub(crate) fn new(window_ms: u64, bucket_count: usize) -> Self {
        let bucket_ms = (window_ms / bucket_count as u64).max(1);
        Self {
            buckets: Mutex::new(SmallVec::from_elem(Bucket::default(), bucket_count)),
            window_ms,
            bucket_ms,
        }
    }

    pub(crate) fn bucket_duration_ms(&self) -> u64 {
        self.bucket_ms
    }

    pub(crate) fn record_success(&self, now_ms: u64) {
        self.bucket_at(now_ms, |bucket| bucket.success_count += 1);
    }

    pub(crate) fn record_failure(&self, now_ms: u64) {
        self.bucket_at(now_ms, |bucket| bucket.failure_count += 1);
    }

    fn bucket_at(&self, now_ms: u64, update: impl FnOnce(&mut Bucket)) {
        let mut buckets = self.buckets.lock();
        let index = ((now_ms / self.bucket_ms) as usize) % buckets.len();
        let start = now_ms - (now_ms % self.bucket_ms);

        let bucket = &mut buckets[index];
        if now_ms.saturating_sub(bucket.bucket_start_time) >= self.bucket_ms {
            *bucket = Bucket {
                bucket_start_time: start,
                ..Bucket::default()
            };
        }
        update(bucket);
    }

    /// Sums `(successes, failures)` over buckets still inside the window.
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn totals(&self, now_ms: u64) -> (u64, u64) {
        let buckets = self.buckets.lock();
        // Signed so that early-lifetime buckets (start near zero) count
        // while the window has not yet fully elapsed.
        let cutoff = now_ms as i64 - self.window_ms as i64;
        buckets
            .iter()
            .filter(|b| b.bucket_start_time as i64 > cutoff)
            .fold((0, 0), |(s, f), b| (s + b.success_count, f + b.failure_count))
    }

    pub(crate) fn reset(&self) {
        let mut buckets = self.buckets.lock();
        buckets.iter_mut().for_each(|b| *b = Bucket::default());
    }

    pub(crate) fn snapshot(&self) -> Vec<Bucket> {
        self.buckets.lock().to_vec()
    }

    /// Loads a persisted ring. Extra buckets are dropped and missing slots
    /// stay empty, so a snapshot taken under a different bucket count still
    /// restores without faulting.
    pub(crate) fn restore(&self, saved: &[Bucket]) {
        let mut buckets = self.buckets.lock();
        let len = buckets.len();
        buckets.iter_mut().for_each(|b| *b = Bucket::default());
        for (slot, bucket) in buckets.iter_mut().zip(saved.iter().take(len)) {
            *slot = *bucket;
        }
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Live metrics computed from the bucket ring.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerMetrics {
    /// Current state, after deferred transition evaluation.
    pub state: State,
    /// Requests recorded inside the rolling window.
    pub total_requests: u64,
    /// Failures recorded inside the rolling window.
    pub failed_requests: u64,
    /// Successes recorded inside the rolling window.
    pub successful_requests: u64,
    /// Failure percentage over the window, 0 when idle.
    pub failure_rate: f64,
    /// Unix-epoch ms of the last recorded failure.
    pub last_failure_time: Option<u64>,
    /// Unix-epoch ms of the last recorded success.
    pub last_success_time: Option<u64>,
}
