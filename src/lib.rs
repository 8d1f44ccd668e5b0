//! Lightweight-task connection server and load generator.
//!
//! Every inbound connection and every simulated user runs as its own task on a
//! small, fixed pool of worker threads. Outcomes and latencies from all of
//! them flow into one lock-free [`metrics::Metrics`] sink.

pub mod acceptor;
pub mod config;
pub mod harness;
pub mod metrics;
pub mod ramp;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod telemetry;
pub mod wire;

pub use acceptor::{Acceptor, AcceptorExit};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use ramp::{RampController, RampSchedule};
pub use scheduler::{Scheduler, SchedulerError};
pub use shutdown::ShutdownCoordinator;
