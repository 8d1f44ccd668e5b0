use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub mod client;
pub mod server;

/// Monotonic identity handed out by the scheduler on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    ServerExchange,
    ClientRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureReason {
    Read,
    Write,
    Timeout,
    Connect,
    Status(u16),
    Request,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Read => write!(f, "read"),
            FailureReason::Write => write!(f, "write"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::Connect => write!(f, "connect"),
            FailureReason::Status(code) => write!(f, "status:{}", code),
            FailureReason::Request => write!(f, "request"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(FailureReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Everything that can go wrong inside a single exchange or request cycle.
///
/// These never leave the unit that produced them; they are folded into an
/// [`Outcome::Failure`] carrying the matching [`FailureReason`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("connection closed before a request line arrived")]
    EmptyRequest,
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(String),
}

impl SessionError {
    pub fn reason(&self) -> FailureReason {
        match self {
            SessionError::Read(_) | SessionError::EmptyRequest => FailureReason::Read,
            SessionError::Write(_) => FailureReason::Write,
            SessionError::Timeout(_) => FailureReason::Timeout,
            SessionError::Connect(_) => FailureReason::Connect,
            SessionError::Status(code) => FailureReason::Status(*code),
            SessionError::Request(_) => FailureReason::Request,
        }
    }
}

/// Immutable result of one completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub unit: UnitId,
    pub kind: SessionKind,
    pub started_at: Instant,
    pub duration: Duration,
    pub outcome: Outcome,
}

/// An in-progress session. Consumed by [`Session::finish`], so each session
/// yields exactly one [`SampleRecord`].
#[derive(Debug)]
pub struct Session {
    id: UnitId,
    kind: SessionKind,
    started_at: Instant,
}

impl Session {
    pub fn begin(id: UnitId, kind: SessionKind) -> Self {
        Self {
            id,
            kind,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn finish(self, outcome: Outcome) -> SampleRecord {
        SampleRecord {
            unit: self.id,
            kind: self.kind,
            started_at: self.started_at,
            duration: self.started_at.elapsed(),
            outcome,
        }
    }
}

pub(crate) fn worker_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}
