use crate::config::LoadTestConfig;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::ramp::{RampController, RampReport};
use crate::scheduler::{DrainReport, Scheduler};
use crate::session::client::{self, RequestSettings};
use crate::shutdown::ShutdownCoordinator;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: MetricsSnapshot,
    pub ramp: Option<RampReport>,
    pub drain: DrainReport,
    /// `stop` fired before the run reached its deadline.
    pub interrupted: bool,
}

/// Ramps users up, holds them until the deadline, then drains. Resolving
/// `stop` ends the run early.
pub async fn load_test<S>(config: &LoadTestConfig, stop: S) -> Result<RunOutcome>
where
    S: Future<Output = ()>,
{
    config.validate()?;
    let settings = Arc::new(config.request_settings()?);
    let schedule = config.schedule();

    info!("==========================================");
    info!("Target: {}", settings.target);
    info!("Users: {}", schedule.users());
    info!("Ramp-up: {:?}", schedule.ramp());
    info!("Hold: {:?}", schedule.hold());
    info!("==========================================");

    let scheduler = Scheduler::new();
    let metrics = Arc::new(Metrics::new());
    let deadline = Instant::now() + schedule.total();
    let controller = RampController::new(schedule, config.poll_interval());

    let ramp = {
        let scheduler = scheduler.clone();
        let metrics = metrics.clone();
        let closed = scheduler.closed_signal();
        tokio::spawn(async move {
            controller
                .run(&scheduler, |id| {
                    let settings = settings.clone();
                    let metrics = metrics.clone();
                    let closed = closed.clone();
                    async move {
                        let http = client::http_client();
                        client::run_user(id, http, &settings, &metrics, deadline, closed).await;
                    }
                })
                .await
        })
    };

    let coordinator = ShutdownCoordinator::new(scheduler, metrics.clone(), config.drain_grace());
    let (ramp, drain, interrupted) = hold_then_drain(ramp, deadline, stop, coordinator).await?;

    Ok(RunOutcome {
        snapshot: metrics.snapshot(schedule.total()),
        ramp,
        drain,
        interrupted,
    })
}

/// Waits for the ramp and the deadline, or for `stop`, then drains. The
/// drain runs even when the ramp task failed; its error is returned after.
async fn hold_then_drain<S>(
    ramp: JoinHandle<RampReport>,
    deadline: Instant,
    stop: S,
    coordinator: ShutdownCoordinator,
) -> Result<(Option<RampReport>, DrainReport, bool)>
where
    S: Future<Output = ()>,
{
    let finished = async {
        let report = ramp.await?;
        if report.stopped_early {
            warn!("Only {} users were launched", report.launched);
        } else {
            info!("Maintaining {} users until the end of the run", report.launched);
        }
        time::sleep_until(deadline).await;
        anyhow::Ok(report)
    };

    let (ramp, interrupted) = tokio::select! {
        report = finished => (Some(report), false),
        _ = stop => {
            warn!("Stopping the run early");
            (None, true)
        }
    };
    if let Some(Err(e)) = &ramp {
        error!("Ramp failed, draining users: {}", e);
    }

    let drain = coordinator.shutdown().await;
    Ok((ramp.transpose()?, drain, interrupted))
}

#[derive(Debug, Clone)]
pub struct BurstOutcome {
    pub snapshot: MetricsSnapshot,
    pub drain: DrainReport,
    pub elapsed: Duration,
}

/// Fires `requests` single requests at once, each on its own unit, and
/// waits up to `grace` for all of them.
pub async fn burst(
    settings: RequestSettings,
    requests: u32,
    grace: Duration,
) -> Result<BurstOutcome> {
    let scheduler = Scheduler::new();
    let metrics = Arc::new(Metrics::new());
    let settings = Arc::new(settings);
    let http = client::http_client();
    let started = Instant::now();

    info!("Sending {} concurrent requests to {}", requests, settings.target);
    for _ in 0..requests {
        let http = http.clone();
        let settings = settings.clone();
        let metrics = metrics.clone();
        scheduler.submit(move |id| async move {
            client::request_once(id, &http, &settings, &metrics).await;
        })?;
    }

    let drain = ShutdownCoordinator::new(scheduler, metrics.clone(), grace)
        .shutdown()
        .await;
    let elapsed = started.elapsed();

    Ok(BurstOutcome {
        snapshot: metrics.snapshot(elapsed),
        drain,
        elapsed,
    })
}
