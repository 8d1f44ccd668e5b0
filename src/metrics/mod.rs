use crate::session::{FailureReason, Outcome, SampleRecord};
use metrics_util::AtomicBucket;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

mod report;
pub mod thresholds;

pub use thresholds::{Thresholds, Violation};

/// Concurrent sink for completed samples.
///
/// `record` is a lock-free append, so thousands of units can report at once
/// without contending on a mutex. Statistics are only derived when a
/// [`MetricsSnapshot`] is taken.
pub struct Metrics {
    samples: AtomicBucket<SampleRecord>,
    abandoned: AtomicU64,
}

pub type SharedMetrics = Arc<Metrics>;

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples: AtomicBucket::new(),
            abandoned: AtomicU64::new(0),
        }
    }

    pub fn record(&self, sample: SampleRecord) {
        self.samples.push(sample);
    }

    /// Units that never reached a natural end before the drain timeout.
    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    /// Summarises everything recorded so far. Samples pushed while the
    /// snapshot is being taken may or may not be included.
    ///
    /// `window` is the wall time throughput is measured against.
    pub fn snapshot(&self, window: Duration) -> MetricsSnapshot {
        let mut durations = Vec::new();
        let mut successes = 0;
        let mut failures = 0;
        let mut failure_reasons = BTreeMap::new();

        self.samples.data_with(|block: &[SampleRecord]| {
            for sample in block {
                durations.push(sample.duration);
                match &sample.outcome {
                    Outcome::Success => successes += 1,
                    Outcome::Failure(reason) => {
                        failures += 1;
                        *failure_reasons.entry(reason.clone()).or_insert(0) += 1;
                    }
                }
            }
        });

        let completed = successes + failures;
        let throughput = if window.is_zero() {
            None
        } else {
            Some(completed as f64 / window.as_secs_f64())
        };

        MetricsSnapshot {
            successes,
            failures,
            abandoned: self.abandoned.load(Ordering::Relaxed),
            failure_reasons,
            latency: LatencySummary::from_durations(durations),
            throughput,
            window,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub abandoned: u64,
    pub failure_reasons: BTreeMap<FailureReason, u64>,
    /// `None` when nothing has completed yet.
    pub latency: Option<LatencySummary>,
    /// Completed samples per second over `window`; `None` for an empty window.
    pub throughput: Option<f64>,
    pub window: Duration,
}

impl MetricsSnapshot {
    /// Successes plus failures. Abandoned units are not part of this.
    pub fn completed(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn success_rate(&self) -> Option<f64> {
        match self.completed() {
            0 => None,
            total => Some(self.successes as f64 * 100.0 / total as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub min: Duration,
    pub mean: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LatencySummary {
    pub fn from_durations(mut durations: Vec<Duration>) -> Option<Self> {
        durations.sort_unstable();

        let min = *durations.first()?;
        let max = *durations.last()?;
        let total_nanos: u128 = durations.iter().map(Duration::as_nanos).sum();
        let mean_nanos = total_nanos / durations.len() as u128;

        Some(Self {
            min,
            mean: Duration::from_nanos(mean_nanos as u64),
            max,
            p50: percentile(&durations, 50)?,
            p95: percentile(&durations, 95)?,
            p99: percentile(&durations, 99)?,
        })
    }
}

/// Nearest-rank percentile over an ascending slice: the value at index
/// `floor(n * pct / 100)`, clamped to the last element.
pub fn percentile(sorted: &[Duration], pct: u32) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let index = (sorted.len() * pct as usize / 100).min(sorted.len() - 1);
    Some(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionKind, UnitId};
    use tokio::time::Instant;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    fn sample(duration_ms: u64, outcome: Outcome) -> SampleRecord {
        SampleRecord {
            unit: UnitId(0),
            kind: SessionKind::ClientRequest,
            started_at: Instant::now(),
            duration: Duration::from_millis(duration_ms),
            outcome,
        }
    }

    #[test]
    fn nearest_rank_median() {
        let sorted = ms(&[10, 20, 30, 40, 100]);
        assert_eq!(percentile(&sorted, 50), Some(Duration::from_millis(30)));
        assert_eq!(percentile(&sorted, 99), Some(Duration::from_millis(100)));
        assert_eq!(percentile(&sorted, 100), Some(Duration::from_millis(100)));
    }

    #[test]
    fn empty_set_has_no_percentile() {
        assert_eq!(percentile(&[], 50), None);
        assert_eq!(LatencySummary::from_durations(Vec::new()), None);
    }

    #[test]
    fn summary_sorts_before_ranking() {
        let summary = LatencySummary::from_durations(ms(&[100, 30, 10, 40, 20])).unwrap();
        assert_eq!(summary.min, Duration::from_millis(10));
        assert_eq!(summary.max, Duration::from_millis(100));
        assert_eq!(summary.mean, Duration::from_millis(40));
        assert_eq!(summary.p50, Duration::from_millis(30));
        assert_eq!(summary.p95, Duration::from_millis(100));
    }

    #[test]
    fn snapshot_counts_outcomes_and_reasons() {
        let metrics = Metrics::new();
        metrics.record(sample(10, Outcome::Success));
        metrics.record(sample(20, Outcome::Success));
        metrics.record(sample(30, Outcome::Failure(FailureReason::Status(500))));
        metrics.record(sample(40, Outcome::Failure(FailureReason::Status(500))));
        metrics.record_abandoned(3);

        let snapshot = metrics.snapshot(Duration::from_secs(2));

        assert_eq!(snapshot.successes, 2);
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.abandoned, 3);
        assert_eq!(snapshot.failure_reasons[&FailureReason::Status(500)], 2);
        assert_eq!(snapshot.throughput, Some(2.0));
        assert_eq!(snapshot.success_rate(), Some(50.0));
    }

    #[test]
    fn empty_snapshot_reports_no_data() {
        let snapshot = Metrics::new().snapshot(Duration::ZERO);
        assert_eq!(snapshot.latency, None);
        assert_eq!(snapshot.throughput, None);
        assert_eq!(snapshot.success_rate(), None);
    }

    #[test]
    #[ntest::timeout(10000)]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: u64 = 8;
        const PER_PRODUCER: u64 = 5_000;

        let metrics = Metrics::new();
        std::thread::scope(|scope| {
            for producer in 0..PRODUCERS {
                let metrics = &metrics;
                scope.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let outcome = if (producer + i) % 4 == 0 {
                            Outcome::Failure(FailureReason::Connect)
                        } else {
                            Outcome::Success
                        };
                        metrics.record(sample(i % 50, outcome));
                    }
                });
            }
        });

        let snapshot = metrics.snapshot(Duration::from_secs(1));
        assert_eq!(snapshot.completed(), PRODUCERS * PER_PRODUCER);
    }
}
