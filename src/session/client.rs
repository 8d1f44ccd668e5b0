use super::{Outcome, Session, SessionError, SessionKind, UnitId};
use crate::metrics::Metrics;
use http::{Method, Request, Uri, header};
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::debug;

pub type HttpClient = Client<HttpConnector, Empty<Bytes>>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Pause between two requests of one simulated user, drawn uniformly from
/// `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    min: Duration,
    max: Duration,
}

impl ThinkTime {
    pub fn fixed(pause: Duration) -> Self {
        Self {
            min: pause,
            max: pause,
        }
    }

    /// Bounds are swapped if given in the wrong order.
    pub fn between(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::rng().random_range(self.min..=self.max)
    }
}

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub target: Uri,
    pub expected_status: u16,
    pub timeout: Duration,
    pub think_time: ThinkTime,
}

/// One simulated user: issues requests back to back, separated by the think
/// time, until `deadline` or until `closed` flips. Failed requests are
/// recorded and the loop goes on.
///
/// A request already in flight when `closed` flips is allowed to finish.
pub async fn run_user(
    id: UnitId,
    client: HttpClient,
    settings: &RequestSettings,
    metrics: &Metrics,
    deadline: Instant,
    mut closed: watch::Receiver<bool>,
) -> u64 {
    let mut requests = 0;
    while Instant::now() < deadline && !*closed.borrow() {
        request_once(id, &client, settings, metrics).await;
        requests += 1;

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            _ = time::sleep(settings.think_time.sample().min(remaining)) => {}
            Ok(()) = closed.changed() => {}
        }
    }
    debug!("User {} finished after {} requests", id, requests);
    requests
}

/// Sends a single request and records how it went.
pub async fn request_once(
    id: UnitId,
    client: &HttpClient,
    settings: &RequestSettings,
    metrics: &Metrics,
) -> Outcome {
    let session = Session::begin(id, SessionKind::ClientRequest);

    let outcome = match send(client, settings).await {
        Ok(()) => Outcome::Success,
        Err(e) => {
            debug!("Request from user {} failed: {}", id, e);
            Outcome::Failure(e.reason())
        }
    };

    metrics.record(session.finish(outcome.clone()));
    outcome
}

async fn send(client: &HttpClient, settings: &RequestSettings) -> Result<(), SessionError> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(settings.target.clone())
        .header(header::USER_AGENT, concat!("ripple/", env!("CARGO_PKG_VERSION")))
        .body(Empty::new())
        .map_err(|e| SessionError::Request(e.to_string()))?;

    let response = time::timeout(settings.timeout, client.request(request))
        .await
        .map_err(|_| SessionError::Timeout(settings.timeout))?
        .map_err(|e| {
            if e.is_connect() {
                SessionError::Connect(e.to_string())
            } else {
                SessionError::Request(e.to_string())
            }
        })?;

    let status = response.status().as_u16();
    if status != settings.expected_status {
        return Err(SessionError::Status(status));
    }
    Ok(())
}
