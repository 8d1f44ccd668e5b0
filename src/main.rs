use anyhow::Result;
use clap::Parser;
use ripple::config::ServerConfig;
use ripple::{Acceptor, Metrics, Scheduler, ShutdownCoordinator, scheduler, shutdown, telemetry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ripple", about = "Serves every connection on its own lightweight task")]
struct Args {
    /// TOML file with server settings.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    /// Simulated downstream latency per request, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init("ripple=info,info");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            ServerConfig::from_file(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.listen_addr.set_port(port);
    }
    if let Some(delay_ms) = args.delay_ms {
        config.dependency_delay_ms = delay_ms;
    }
    if args.workers.is_some() {
        config.worker_threads = args.workers;
    }

    let runtime = scheduler::build_runtime(config.worker_threads)?;
    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfig) -> Result<()> {
    let acceptor = Acceptor::bind(config.listen_addr, config.backlog)?;
    let addr = acceptor.local_addr();

    info!("===========================================");
    info!("Ripple server started on {}", addr);
    info!("Simulated dependency delay: {}ms", config.dependency_delay_ms);
    info!("Try: curl http://localhost:{}", addr.port());
    info!("Press Ctrl+C to stop");
    info!("===========================================");

    let scheduler = Scheduler::new();
    let metrics = Arc::new(Metrics::new());
    let started = Instant::now();

    let exit = acceptor
        .run(
            scheduler.clone(),
            metrics.clone(),
            config.exchange_settings(),
            shutdown::interrupted(),
        )
        .await;
    info!("Acceptor closed: {:?}", exit);

    ShutdownCoordinator::new(scheduler, metrics.clone(), config.drain_grace())
        .shutdown()
        .await;

    println!("{}", metrics.snapshot(started.elapsed()));
    Ok(())
}
