use crate::metrics::SharedMetrics;
use crate::scheduler::{DrainReport, Scheduler};
use std::time::Duration;
use tracing::{error, info, warn};

/// Ends a run: closes the scheduler, waits a bounded grace period and books
/// anything still running as abandoned.
pub struct ShutdownCoordinator {
    scheduler: Scheduler,
    metrics: SharedMetrics,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(scheduler: Scheduler, metrics: SharedMetrics, grace: Duration) -> Self {
        Self {
            scheduler,
            metrics,
            grace,
        }
    }

    pub async fn shutdown(&self) -> DrainReport {
        info!(
            "Shutting down: waiting up to {:?} for {} outstanding units",
            self.grace,
            self.scheduler.outstanding()
        );

        let report = self.scheduler.drain(self.grace).await;
        if report.abandoned > 0 {
            warn!(
                "{} of {} units abandoned after {:?}",
                report.abandoned, report.submitted, report.waited
            );
            self.metrics.record_abandoned(report.abandoned);
        } else {
            info!(
                "All {} units finished within {:?}",
                report.submitted, report.waited
            );
        }
        report
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed this never
/// resolves, so the caller keeps running until its own deadline.
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::session::{FailureReason, Outcome, Session, SessionKind};
    use std::sync::Arc;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(5000)]
    async fn every_unit_is_accounted_for() {
        let scheduler = Scheduler::new();
        let metrics = Arc::new(Metrics::new());
        let total = 60;

        for n in 0..total {
            let metrics = metrics.clone();
            scheduler
                .submit(move |id| async move {
                    let session = Session::begin(id, SessionKind::ServerExchange);
                    let work = match n % 3 {
                        0 => Duration::from_millis(20),
                        1 => Duration::from_millis(40),
                        _ => Duration::from_secs(600),
                    };
                    time::sleep(work).await;
                    let outcome = if n % 3 == 0 {
                        Outcome::Success
                    } else {
                        Outcome::Failure(FailureReason::Write)
                    };
                    metrics.record(session.finish(outcome));
                })
                .unwrap();
        }

        let grace = Duration::from_secs(1);
        let coordinator = ShutdownCoordinator::new(scheduler, metrics.clone(), grace);
        let report = coordinator.shutdown().await;
        let snapshot = metrics.snapshot(Duration::from_secs(1));

        assert_eq!(report.abandoned, 20);
        assert_eq!(snapshot.successes, 20);
        assert_eq!(snapshot.failures, 20);
        assert_eq!(snapshot.abandoned, 20);
        assert_eq!(
            snapshot.successes + snapshot.failures + snapshot.abandoned,
            total
        );
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn short_grace_does_not_block() {
        let scheduler = Scheduler::new();
        let metrics = Arc::new(Metrics::new());
        for _ in 0..3 {
            scheduler
                .submit(|_| time::sleep(Duration::from_secs(3600)))
                .unwrap();
        }

        let coordinator = ShutdownCoordinator::new(scheduler, metrics, Duration::from_millis(50));
        let report = coordinator.shutdown().await;

        assert_eq!(report.abandoned, 3);
        assert!(report.waited < Duration::from_secs(1));
        assert!(logs_contain("3 of 3 units abandoned"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(60000)]
    async fn units_finishing_at_the_deadline_are_counted_once() {
        let total = 500;
        for round in 0..30 {
            let scheduler = Scheduler::new();
            let metrics = Arc::new(Metrics::new());
            for _ in 0..total {
                let metrics = metrics.clone();
                scheduler
                    .submit(move |id| async move {
                        let session = Session::begin(id, SessionKind::ServerExchange);
                        time::sleep(Duration::from_millis(20)).await;
                        metrics.record(session.finish(Outcome::Success));
                        // Keeps the worker busy past the grace period.
                        std::thread::sleep(Duration::from_micros(200));
                    })
                    .unwrap();
            }

            let grace = Duration::from_millis(20);
            let report = ShutdownCoordinator::new(scheduler, metrics.clone(), grace)
                .shutdown()
                .await;
            let snapshot = metrics.snapshot(Duration::from_secs(1));

            assert_eq!(snapshot.abandoned, report.abandoned, "round {round}");
            assert_eq!(
                snapshot.successes + snapshot.abandoned,
                total,
                "round {round}"
            );
        }
    }
}
