use super::{Outcome, Session, SessionError, SessionKind, UnitId, worker_name};
use crate::metrics::Metrics;
use crate::wire::{self, RequestLine};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time;
use tracing::debug;

/// Longest request line read before answering anyway.
pub const MAX_REQUEST_LINE: u64 = 8 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ExchangeSettings {
    /// Stand-in for a downstream call made while handling the request.
    pub dependency_delay: Duration,
    pub read_timeout: Duration,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            dependency_delay: Duration::from_millis(100),
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// Handles one accepted connection and records its outcome.
///
/// The stream is owned for the whole exchange and dropped on return, so the
/// connection is released on every path.
pub async fn serve<S>(
    id: UnitId,
    stream: S,
    settings: ExchangeSettings,
    metrics: &Metrics,
) -> Outcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = Session::begin(id, SessionKind::ServerExchange);

    let outcome = match exchange(id, stream, &settings).await {
        Ok(()) => Outcome::Success,
        Err(e) => {
            debug!("Exchange {} failed: {}", id, e);
            Outcome::Failure(e.reason())
        }
    };

    metrics.record(session.finish(outcome.clone()));
    outcome
}

async fn exchange<S>(
    id: UnitId,
    mut stream: S,
    settings: &ExchangeSettings,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = Vec::new();
    {
        let mut reader = BufReader::new(&mut stream).take(MAX_REQUEST_LINE);
        let n = time::timeout(settings.read_timeout, reader.read_until(b'\n', &mut line))
            .await
            .map_err(|_| SessionError::Timeout(settings.read_timeout))?
            .map_err(SessionError::Read)?;
        if n == 0 {
            return Err(SessionError::EmptyRequest);
        }
    }

    let request = RequestLine::parse(&String::from_utf8_lossy(&line));
    debug!("Request {}: {} [worker: {}]", id, request, worker_name());

    time::sleep(settings.dependency_delay).await;

    stream
        .write_all(wire::response())
        .await
        .map_err(SessionError::Write)?;
    stream.flush().await.map_err(SessionError::Write)?;

    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown after response {} failed: {}", id, e);
    }
    Ok(())
}
