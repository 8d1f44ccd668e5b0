use anyhow::Result;
use clap::Parser;
use ripple::config::LoadTestConfig;
use ripple::{harness, scheduler, telemetry};
use std::time::Duration;

/// Sends a batch of concurrent one-shot requests and reports how long they took
#[derive(Parser, Debug)]
#[command(name = "burst")]
struct Args {
    #[arg(long, default_value = "http://localhost:8080/")]
    url: String,
    #[arg(long, default_value_t = 100)]
    requests: u32,
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    /// Seconds to wait for stragglers before giving up on them.
    #[arg(long, default_value_t = 60)]
    grace: u64,
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init("ripple=info,burst=info,warn");

    let config = LoadTestConfig {
        target_url: args.url,
        request_timeout_ms: args.timeout_ms,
        ..Default::default()
    };
    config.validate()?;
    let settings = config.request_settings()?;

    let runtime = scheduler::build_runtime(args.workers)?;
    let outcome = runtime.block_on(harness::burst(
        settings,
        args.requests,
        Duration::from_secs(args.grace),
    ))?;

    println!("{}", outcome.snapshot);
    println!("Total time: {:.2?}", outcome.elapsed);
    if args.requests > 0 {
        println!(
            "Average time per request: {:.2?}",
            outcome.elapsed / args.requests
        );
    }
    Ok(())
}
