use super::{LatencySummary, MetricsSnapshot};
use std::fmt;
use std::time::Duration;

const RULE: &str = "==========================================";

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Results")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Total Requests: {}", self.completed())?;
        writeln!(f, "Successful: {}", self.successes)?;
        writeln!(f, "Failed: {}", self.failures)?;
        for (reason, count) in &self.failure_reasons {
            writeln!(f, "  {}: {}", reason, count)?;
        }
        writeln!(f, "Abandoned: {}", self.abandoned)?;
        match self.success_rate() {
            Some(rate) => writeln!(f, "Success Rate: {:.2}%", rate)?,
            None => writeln!(f, "Success Rate: n/a")?,
        }
        writeln!(f)?;

        match &self.latency {
            Some(latency) => write!(f, "{}", latency)?,
            None => writeln!(f, "Response Times: no data")?,
        }
        writeln!(f)?;

        match self.throughput {
            Some(rps) => writeln!(
                f,
                "Throughput: {:.2} req/sec (over {:.0?})",
                rps, self.window
            )?,
            None => writeln!(f, "Throughput: n/a")?,
        }
        write!(f, "{}", RULE)
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Response Times (ms):")?;
        writeln!(f, "  Min: {:.2}", millis(self.min))?;
        writeln!(f, "  Max: {:.2}", millis(self.max))?;
        writeln!(f, "  Avg: {:.2}", millis(self.mean))?;
        writeln!(f, "  P50: {:.2}", millis(self.p50))?;
        writeln!(f, "  P95: {:.2}", millis(self.p95))?;
        writeln!(f, "  P99: {:.2}", millis(self.p99))
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::Metrics;
    use std::time::Duration;

    #[test]
    fn empty_report_says_no_data() {
        let text = Metrics::new().snapshot(Duration::ZERO).to_string();
        assert!(text.contains("Total Requests: 0"));
        assert!(text.contains("Response Times: no data"));
        assert!(text.contains("Throughput: n/a"));
    }
}
