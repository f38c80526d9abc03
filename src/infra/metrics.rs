//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention. All
//! counter updates are lock-free; the per-denomination tally is the one
//! mutex-guarded map, touched only on a successful recognition.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Recognition latency bucket boundaries (milliseconds). The recognition
/// service blocks for up to its own internal timeout, so the scale is
/// seconds, not microseconds.
/// Buckets: ≤250, ≤500, ≤1000, ≤2000, ≤3000, ≤4000, ≤5000, ≤6000, ≤8000, ≤10000, >10000
const BUCKET_BOUNDS: [u64; 10] = [250, 500, 1000, 2000, 3000, 4000, 5000, 6000, 8000, 10000];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [250, 500, 1000, 2000, 3000, 4000, 5000, 6000, 8000, 10000, 20000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the cashier loop
pub struct Metrics {
    /// Sensing cycles entered (monotonic)
    cycles_total: AtomicU64,
    /// Cycles skipped because both hand poses were stale (monotonic)
    stale_cycles_total: AtomicU64,
    /// Cycles that selected Wait (monotonic)
    wait_cycles_total: AtomicU64,
    /// Banknotes successfully collected and recognised (monotonic)
    collects_total: AtomicU64,
    /// Recognition attempts that returned the sentinel or failed (monotonic)
    recognition_failures_total: AtomicU64,
    /// Banknotes handed back as change (monotonic)
    dispenses_total: AtomicU64,
    /// Actions abandoned on a planner fault (monotonic)
    planner_faults_total: AtomicU64,
    /// Cycles failed on pose/recognition service unavailability (monotonic)
    service_errors_total: AtomicU64,
    /// Sessions started (monotonic)
    sessions_total: AtomicU64,
    /// Sessions that ended aborted (monotonic)
    sessions_aborted_total: AtomicU64,
    /// Recognition latency histogram buckets (reset on report)
    recognition_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of recognition latencies in milliseconds (reset on report)
    recognition_sum_ms: AtomicU64,
    /// Max recognition latency (reset on report)
    recognition_max_ms: AtomicU64,
    /// Recognitions since last report (reset on report)
    recognitions_since_report: AtomicU64,
    /// Count of recognised banknotes per denomination (monotonic)
    recognised_by_value: Mutex<FxHashMap<i64, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            stale_cycles_total: AtomicU64::new(0),
            wait_cycles_total: AtomicU64::new(0),
            collects_total: AtomicU64::new(0),
            recognition_failures_total: AtomicU64::new(0),
            dispenses_total: AtomicU64::new(0),
            planner_faults_total: AtomicU64::new(0),
            service_errors_total: AtomicU64::new(0),
            sessions_total: AtomicU64::new(0),
            sessions_aborted_total: AtomicU64::new(0),
            recognition_buckets: Default::default(),
            recognition_sum_ms: AtomicU64::new(0),
            recognition_max_ms: AtomicU64::new(0),
            recognitions_since_report: AtomicU64::new(0),
            recognised_by_value: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn record_cycle(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_cycle(&self) {
        self.stale_cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait_cycle(&self) {
        self.wait_cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful collect with the recognised denomination
    pub fn record_collect(&self, value: i64) {
        self.collects_total.fetch_add(1, Ordering::Relaxed);
        *self.recognised_by_value.lock().entry(value).or_insert(0) += 1;
    }

    pub fn record_recognition_failure(&self) {
        self.recognition_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long the blocking recognition call took
    pub fn record_recognition_latency(&self, latency_ms: u64) {
        self.recognition_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.recognition_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.recognitions_since_report.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.recognition_max_ms, latency_ms);
    }

    pub fn record_dispense(&self) {
        self.dispenses_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_planner_fault(&self) {
        self.planner_faults_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_service_error(&self) {
        self.service_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_aborted(&self) {
        self.sessions_aborted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Produce a snapshot for reporting; interval histogram state is reset.
    pub fn report(&self) -> MetricsSummary {
        let buckets = swap_buckets(&self.recognition_buckets);
        let recognitions = self.recognitions_since_report.swap(0, Ordering::Relaxed);
        let sum_ms = self.recognition_sum_ms.swap(0, Ordering::Relaxed);
        let max_ms = self.recognition_max_ms.swap(0, Ordering::Relaxed);
        let avg_ms = if recognitions > 0 { sum_ms / recognitions } else { 0 };

        let mut denominations: Vec<(i64, u64)> =
            self.recognised_by_value.lock().iter().map(|(k, v)| (*k, *v)).collect();
        denominations.sort_unstable();

        MetricsSummary {
            cycles: self.cycles_total.load(Ordering::Relaxed),
            stale_cycles: self.stale_cycles_total.load(Ordering::Relaxed),
            wait_cycles: self.wait_cycles_total.load(Ordering::Relaxed),
            collects: self.collects_total.load(Ordering::Relaxed),
            recognition_failures: self.recognition_failures_total.load(Ordering::Relaxed),
            dispenses: self.dispenses_total.load(Ordering::Relaxed),
            planner_faults: self.planner_faults_total.load(Ordering::Relaxed),
            service_errors: self.service_errors_total.load(Ordering::Relaxed),
            sessions: self.sessions_total.load(Ordering::Relaxed),
            sessions_aborted: self.sessions_aborted_total.load(Ordering::Relaxed),
            recognitions_in_interval: recognitions,
            recognition_avg_ms: avg_ms,
            recognition_max_ms: max_ms,
            recognition_p95_ms: percentile_from_buckets(&buckets, 0.95),
            denominations,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent snapshot of the counters for one reporting interval
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cycles: u64,
    pub stale_cycles: u64,
    pub wait_cycles: u64,
    pub collects: u64,
    pub recognition_failures: u64,
    pub dispenses: u64,
    pub planner_faults: u64,
    pub service_errors: u64,
    pub sessions: u64,
    pub sessions_aborted: u64,
    pub recognitions_in_interval: u64,
    pub recognition_avg_ms: u64,
    pub recognition_max_ms: u64,
    pub recognition_p95_ms: u64,
    pub denominations: Vec<(i64, u64)>,
}

impl MetricsSummary {
    pub fn log(&self) {
        let denominations = self
            .denominations
            .iter()
            .map(|(value, count)| format!("{value}x{count}"))
            .collect::<Vec<_>>()
            .join(",");

        info!(
            cycles = %self.cycles,
            stale_cycles = %self.stale_cycles,
            wait_cycles = %self.wait_cycles,
            collects = %self.collects,
            recognition_failures = %self.recognition_failures,
            dispenses = %self.dispenses,
            planner_faults = %self.planner_faults,
            service_errors = %self.service_errors,
            sessions = %self.sessions,
            sessions_aborted = %self.sessions_aborted,
            recognition_avg_ms = %self.recognition_avg_ms,
            recognition_max_ms = %self.recognition_max_ms,
            recognition_p95_ms = %self.recognition_p95_ms,
            denominations = %denominations,
            "metrics_summary"
        );
    }
}
