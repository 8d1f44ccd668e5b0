use crate::metrics::SharedMetrics;
use crate::scheduler::Scheduler;
use crate::session::server::{self, ExchangeSettings};
use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time;
use tracing::{debug, error, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorExit {
    /// The stop signal fired.
    Stopped,
    /// The scheduler refused new work.
    Rejected,
}

pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Opens the listening socket. Failure here is fatal for the server.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self> {
        let listener =
            listen(addr, backlog).with_context(|| format!("failed to listen on {}", addr))?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `stop` resolves, handing each one to the
    /// scheduler as a server exchange. Never waits on the exchanges
    /// themselves.
    pub async fn run<F>(
        self,
        scheduler: Scheduler,
        metrics: SharedMetrics,
        settings: ExchangeSettings,
        stop: F,
    ) -> AcceptorExit
    where
        F: Future<Output = ()>,
    {
        info!("Listening on {}", self.local_addr);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;

                _ = &mut stop => {
                    info!("Stop requested, closing listener on {}", self.local_addr);
                    return AcceptorExit::Stopped;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        debug!("New connection from {}", peer);
                        let metrics = metrics.clone();
                        let submitted = scheduler.submit(move |id| async move {
                            server::serve(id, socket, settings, &metrics).await;
                        });
                        if let Err(e) = submitted {
                            warn!("Dropping connection from {}: {}", peer, e);
                            return AcceptorExit::Rejected;
                        }
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    let listener = TcpListener::from_std(socket.into())?;
    Ok(listener)
}
