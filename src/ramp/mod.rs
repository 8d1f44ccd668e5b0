use crate::scheduler::{Scheduler, SchedulerError};
use crate::session::UnitId;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Polling finer than this buys nothing; launches are integer counts anyway.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Linear ramp from zero to `users` over `ramp`, then a constant `hold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSchedule {
    users: u32,
    ramp: Duration,
    hold: Duration,
}

impl RampSchedule {
    pub fn new(users: u32, ramp: Duration, hold: Duration) -> Self {
        Self { users, ramp, hold }
    }

    pub fn users(&self) -> u32 {
        self.users
    }

    pub fn ramp(&self) -> Duration {
        self.ramp
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    /// Ramp plus hold: the full length of a run.
    pub fn total(&self) -> Duration {
        self.ramp + self.hold
    }

    /// How many users should have been launched `elapsed` into the run:
    /// `floor(users * elapsed / ramp)`, reaching `users` at the end of the ramp.
    pub fn launched_by(&self, elapsed: Duration) -> u32 {
        if elapsed >= self.ramp {
            return self.users;
        }
        let target = self.users as u128 * elapsed.as_nanos() / self.ramp.as_nanos();
        target.min(self.users as u128) as u32
    }
}

/// Live count of users launched so far, readable while the ramp runs.
#[derive(Debug, Clone, Default)]
pub struct RampProgress(Arc<AtomicU32>);

impl RampProgress {
    pub fn launched(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampReport {
    pub launched: u32,
    /// The scheduler closed before every user could be launched.
    pub stopped_early: bool,
}

pub struct RampController {
    schedule: RampSchedule,
    poll_interval: Duration,
    progress: RampProgress,
}

impl RampController {
    pub fn new(schedule: RampSchedule, poll_interval: Duration) -> Self {
        if poll_interval < MIN_POLL_INTERVAL {
            warn!(
                "Poll interval {:?} is below {:?}, using the minimum",
                poll_interval, MIN_POLL_INTERVAL
            );
        }
        Self {
            schedule,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            progress: RampProgress::default(),
        }
    }

    pub fn schedule(&self) -> RampSchedule {
        self.schedule
    }

    pub fn progress(&self) -> RampProgress {
        self.progress.clone()
    }

    /// Launches users through `scheduler` following the schedule and returns
    /// once all of them are running, which is at the end of the ramp window
    /// at the latest. Users left over by timer jitter are launched in one
    /// final catch-up.
    pub async fn run<F, Fut>(&self, scheduler: &Scheduler, mut user: F) -> RampReport
    where
        F: FnMut(UnitId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let users = self.schedule.users;
        let start = Instant::now();
        let ramp_end = start + self.schedule.ramp;
        let mut launched = 0;

        info!("Ramping up to {} users over {:?}", users, self.schedule.ramp);

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while launched < users {
            interval.tick().await;
            let now = Instant::now();
            if now >= ramp_end {
                break;
            }

            let target = self.schedule.launched_by(now - start);
            if let Err(e) = self.launch(scheduler, &mut user, &mut launched, target) {
                return self.stopped(launched, e);
            }
        }

        if launched < users {
            debug!("Catching up {} users at the end of the ramp", users - launched);
            if let Err(e) = self.launch(scheduler, &mut user, &mut launched, users) {
                return self.stopped(launched, e);
            }
        }

        info!("Ramp-up complete. {} users running", launched);
        RampReport {
            launched,
            stopped_early: false,
        }
    }

    fn launch<F, Fut>(
        &self,
        scheduler: &Scheduler,
        user: &mut F,
        launched: &mut u32,
        target: u32,
    ) -> Result<(), SchedulerError>
    where
        F: FnMut(UnitId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let target = target.min(self.schedule.users);
        if target <= *launched {
            return Ok(());
        }

        while *launched < target {
            scheduler.submit(|id| user(id))?;
            *launched += 1;
            self.progress.0.store(*launched, Ordering::Release);
        }
        info!("Users started: {}/{}", launched, self.schedule.users);
        Ok(())
    }

    fn stopped(&self, launched: u32, e: SchedulerError) -> RampReport {
        warn!("Ramp stopped after {} users: {}", launched, e);
        RampReport {
            launched,
            stopped_early: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_count_is_monotonic_and_complete() {
        for users in [1, 3, 7, 100, 1_000] {
            for ramp_ms in [1, 99, 1_000, 10_000] {
                let ramp = Duration::from_millis(ramp_ms);
                let schedule = RampSchedule::new(users, ramp, Duration::ZERO);
                let mut previous = 0;
                for step in 0..=ramp_ms + 10 {
                    let now = schedule.launched_by(Duration::from_millis(step));
                    assert!(now >= previous, "users={users} ramp={ramp_ms} step={step}");
                    assert!(now <= users);
                    previous = now;
                }
                assert_eq!(schedule.launched_by(Duration::from_millis(ramp_ms)), users);
            }
        }
    }

    #[test]
    fn launch_count_is_floor_of_linear_ramp() {
        let schedule = RampSchedule::new(100, Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(schedule.launched_by(Duration::ZERO), 0);
        assert_eq!(schedule.launched_by(Duration::from_millis(99)), 0);
        assert_eq!(schedule.launched_by(Duration::from_millis(100)), 1);
        assert_eq!(schedule.launched_by(Duration::from_secs(5)), 50);
        assert_eq!(schedule.launched_by(Duration::from_secs(60)), 100);
        assert_eq!(schedule.total(), Duration::from_secs(15));
    }

    #[test]
    fn zero_ramp_launches_everyone_at_once() {
        let schedule = RampSchedule::new(10, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(schedule.launched_by(Duration::ZERO), 10);
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let schedule = RampSchedule::new(1, Duration::from_secs(1), Duration::ZERO);
        let controller = RampController::new(schedule, Duration::from_millis(10));
        assert_eq!(controller.poll_interval, MIN_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10000)]
    async fn launches_along_the_ramp() {
        let schedule = RampSchedule::new(100, Duration::from_secs(10), Duration::from_secs(5));
        let controller = RampController::new(schedule, Duration::from_millis(100));
        let progress = controller.progress();
        let scheduler = Scheduler::new();
        let deadline = Instant::now() + schedule.total();
        let start = Instant::now();

        let ramp = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                controller
                    .run(&scheduler, |_| time::sleep_until(deadline))
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert_eq!(progress.launched(), 0);

        time::sleep_until(start + Duration::from_secs(5)).await;
        let halfway = progress.launched();
        assert!((49..=51).contains(&halfway), "launched {halfway} at 5s");

        let report = ramp.await.unwrap();
        assert_eq!(report.launched, 100);
        assert!(!report.stopped_early);
        assert!(start.elapsed() <= Duration::from_secs(10) + MIN_POLL_INTERVAL);
        assert_eq!(scheduler.outstanding(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn uneven_ramp_catches_up_shortfall() {
        let schedule = RampSchedule::new(7, Duration::from_millis(150), Duration::ZERO);
        let controller = RampController::new(schedule, Duration::from_millis(100));
        let scheduler = Scheduler::new();

        let report = controller.run(&scheduler, |_| async {}).await;

        assert_eq!(report.launched, 7);
        assert_eq!(scheduler.submitted(), 7);
    }

    #[tokio::test]
    async fn stops_when_scheduler_closes() {
        let schedule = RampSchedule::new(10, Duration::ZERO, Duration::ZERO);
        let controller = RampController::new(schedule, Duration::from_millis(100));
        let scheduler = Scheduler::new();
        scheduler.close();

        let report = controller.run(&scheduler, |_| async {}).await;

        assert_eq!(report.launched, 0);
        assert!(report.stopped_early);
    }
}
