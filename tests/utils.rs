use ripple::session::server::ExchangeSettings;
use ripple::{Acceptor, AcceptorExit, Metrics, Scheduler, SharedMetrics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[allow(unused)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub scheduler: Scheduler,
    pub metrics: SharedMetrics,
    stop: Option<oneshot::Sender<()>>,
    accept_loop: JoinHandle<AcceptorExit>,
}

#[allow(unused)]
impl TestServer {
    pub async fn start(dependency_delay: Duration) -> Self {
        let acceptor = Acceptor::bind("127.0.0.1:0".parse().unwrap(), 1024).unwrap();
        let addr = acceptor.local_addr();
        let scheduler = Scheduler::new();
        let metrics = Arc::new(Metrics::new());
        let settings = ExchangeSettings {
            dependency_delay,
            read_timeout: Duration::from_secs(5),
        };
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let accept_loop = tokio::spawn(acceptor.run(
            scheduler.clone(),
            metrics.clone(),
            settings,
            async move {
                let _ = stop_rx.await;
            },
        ));

        Self {
            addr,
            scheduler,
            metrics,
            stop: Some(stop_tx),
            accept_loop,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub async fn stop(mut self) -> AcceptorExit {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.accept_loop.await.unwrap()
    }
}
