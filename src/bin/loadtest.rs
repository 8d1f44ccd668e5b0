use anyhow::{Result, bail};
use clap::Parser;
use ripple::config::LoadTestConfig;
use ripple::{harness, scheduler, shutdown, telemetry};
use std::path::PathBuf;
use tracing::{error, info};

/// Ramps simulated users up against a target and reports latency statistics
#[derive(Parser, Debug)]
#[command(name = "loadtest")]
struct Args {
    /// TOML file with load test settings.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    users: Option<u32>,
    /// Seconds to ramp from zero to the full user count.
    #[arg(long)]
    ramp_up: Option<u64>,
    /// Seconds to keep all users running after the ramp.
    #[arg(long)]
    hold: Option<u64>,
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init("ripple=info,loadtest=info,warn");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            LoadTestConfig::from_file(path)?
        }
        None => LoadTestConfig::default(),
    };
    if let Some(url) = args.url {
        config.target_url = url;
    }
    if let Some(users) = args.users {
        config.users = users;
    }
    if let Some(ramp_up) = args.ramp_up {
        config.ramp_up_secs = ramp_up;
    }
    if let Some(hold) = args.hold {
        config.hold_secs = hold;
    }
    if args.workers.is_some() {
        config.worker_threads = args.workers;
    }
    config.validate()?;

    let runtime = scheduler::build_runtime(config.worker_threads)?;
    let outcome = runtime.block_on(harness::load_test(&config, shutdown::interrupted()))?;

    println!("{}", outcome.snapshot);

    if outcome.interrupted {
        bail!("load test interrupted");
    }

    let violations = config.thresholds.check(&outcome.snapshot);
    for violation in &violations {
        error!("Threshold violated: {}", violation);
    }
    if !violations.is_empty() {
        bail!("{} threshold(s) violated", violations.len());
    }
    Ok(())
}
