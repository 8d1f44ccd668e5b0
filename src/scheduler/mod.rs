use crate::session::UnitId;
use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{self, Handle, Runtime};
use tokio::sync::{Notify, watch};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is draining and no longer accepts work")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub submitted: u64,
    /// Units stopped by the abort after the timeout elapsed.
    pub abandoned: u64,
    pub waited: Duration,
}

/// Builds the fixed pool of worker threads every unit is multiplexed onto.
pub fn build_runtime(worker_threads: Option<usize>) -> std::io::Result<Runtime> {
    let workers = worker_threads
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(4);
    debug!("Building runtime with {} worker threads", workers);

    runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .thread_name("ripple-worker")
        .enable_all()
        .build()
}

struct Inner {
    handle: Handle,
    accepting: AtomicBool,
    aborting: AtomicBool,
    closed: watch::Sender<bool>,
    next_id: AtomicU64,
    outstanding: AtomicUsize,
    abandoned: AtomicU64,
    in_flight: DashMap<UnitId, AbortHandle>,
    idle: Notify,
}

impl Inner {
    fn release(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Runs submitted units as tasks on the runtime's worker pool.
///
/// A unit that awaits I/O or a timer gives its worker thread back, so the
/// number of outstanding units is bounded by memory, not by threads.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Must be called from inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                accepting: AtomicBool::new(true),
                aborting: AtomicBool::new(false),
                closed: watch::channel(false).0,
                next_id: AtomicU64::new(0),
                outstanding: AtomicUsize::new(0),
                abandoned: AtomicU64::new(0),
                in_flight: DashMap::new(),
                idle: Notify::new(),
            }),
        }
    }

    /// Starts `unit` on its own task and returns immediately.
    ///
    /// The closure receives the id assigned to the unit. Rejected with
    /// [`SchedulerError::Closed`] once a drain has begun.
    pub fn submit<F, Fut>(&self, unit: F) -> Result<UnitId, SchedulerError>
    where
        F: FnOnce(UnitId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Counted before the intake check so a concurrent drain either sees
        // this unit or makes the check fail.
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        if !self.inner.accepting.load(Ordering::SeqCst) {
            self.inner.release();
            return Err(SchedulerError::Closed);
        }

        let id = UnitId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (abort, registration) = AbortHandle::new_pair();
        self.inner.in_flight.insert(id, abort.clone());
        if self.inner.aborting.load(Ordering::SeqCst) {
            abort.abort();
        }

        let done = Completion {
            inner: self.inner.clone(),
            id,
            aborted: false,
        };
        let work = Abortable::new(unit(id), registration);
        self.inner.handle.spawn(async move {
            let mut done = done;
            if work.await.is_err() {
                debug!("Unit {} aborted", id);
                done.aborted = true;
            }
        });
        Ok(id)
    }

    /// Stops intake. Later submissions are rejected.
    pub fn close(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.closed.send_replace(true);
    }

    /// Flips to `true` when intake closes. Long-running units watch this to
    /// wind down at their next natural stopping point.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.inner.closed.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        !self.inner.accepting.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> u64 {
        self.inner.next_id.load(Ordering::Relaxed)
    }

    /// Closes intake and waits up to `timeout` for outstanding units to
    /// finish on their own. Whatever is left is aborted at its next await
    /// point; only units the abort actually stopped count as abandoned.
    /// Returns once no unit is outstanding.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        self.close();
        let started = Instant::now();

        if !self.wait_idle(Some(started + timeout)).await {
            self.inner.aborting.store(true, Ordering::SeqCst);
            let leftovers: Vec<AbortHandle> = self
                .inner
                .in_flight
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            warn!(
                "{} units still running after {:?}, abandoning them",
                leftovers.len(),
                timeout
            );
            for handle in &leftovers {
                handle.abort();
            }
            self.wait_idle(None).await;
        }

        DrainReport {
            submitted: self.submitted(),
            abandoned: self.inner.abandoned.load(Ordering::SeqCst),
            waited: started.elapsed(),
        }
    }

    /// True once nothing is outstanding, false if `deadline` passed first.
    async fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.outstanding() == 0 {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if time::timeout_at(deadline, idle).await.is_err() {
                        return self.outstanding() == 0;
                    }
                }
                None => idle.await,
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Dropped when a unit's task ends, however it ends.
struct Completion {
    inner: Arc<Inner>,
    id: UnitId,
    aborted: bool,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.id);
        if self.aborted {
            self.inner.abandoned.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.release();
    }
}
