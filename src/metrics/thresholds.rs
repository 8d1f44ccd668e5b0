use super::MetricsSnapshot;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Pass/fail limits checked against the final snapshot of a run.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Percentage, 0-100.
    pub min_success_rate: Option<f64>,
    pub max_mean_ms: Option<u64>,
    pub max_p95_ms: Option<u64>,
    pub max_p99_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    SuccessRate { actual: f64, min: f64 },
    Latency { stat: &'static str, actual: Duration, max: Duration },
    NoData,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::SuccessRate { actual, min } => {
                write!(f, "success rate {:.2}% is below {:.2}%", actual, min)
            }
            Violation::Latency { stat, actual, max } => {
                write!(f, "{} latency {:?} exceeds {:?}", stat, actual, max)
            }
            Violation::NoData => write!(f, "no requests completed"),
        }
    }
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn check(&self, snapshot: &MetricsSnapshot) -> Vec<Violation> {
        if self.is_empty() {
            return Vec::new();
        }
        let (Some(rate), Some(latency)) = (snapshot.success_rate(), snapshot.latency) else {
            return vec![Violation::NoData];
        };

        let mut violations = Vec::new();
        if let Some(min) = self.min_success_rate {
            if rate < min {
                violations.push(Violation::SuccessRate { actual: rate, min });
            }
        }

        let limits = [
            ("mean", latency.mean, self.max_mean_ms),
            ("p95", latency.p95, self.max_p95_ms),
            ("p99", latency.p99, self.max_p99_ms),
        ];
        for (stat, actual, max_ms) in limits {
            let Some(max_ms) = max_ms else { continue };
            let max = Duration::from_millis(max_ms);
            if actual > max {
                violations.push(Violation::Latency { stat, actual, max });
            }
        }
        violations
    }
}
