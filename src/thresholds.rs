//! Pass/fail criteria over the aggregate results of a run.

use std::fmt;

use crate::checks::{CheckCategory, CheckSummary};
use crate::metrics::RequestSummary;

/// Quality gates a finished run is judged against.
#[derive(Clone, Debug, PartialEq)]
pub struct Thresholds {
    /// Failed requests must stay strictly below this fraction.
    pub max_failed_request_rate: f64,
    /// Which percentile of request durations is bounded, as a fraction.
    pub duration_percentile: f64,
    /// The bounded percentile must stay strictly below this many milliseconds.
    pub max_duration_ms: usize,
    /// Each category's check pass rate must be strictly above its minimum.
    pub min_check_rates: Vec<(CheckCategory, f64)>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            max_failed_request_rate: 0.01,
            duration_percentile: 0.95,
            max_duration_ms: 600,
            min_check_rates: vec![
                (CheckCategory::LoginSuccess, 0.95),
                (CheckCategory::BookSuccess, 0.95),
            ],
        }
    }
}

/// The result of evaluating one threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdResult {
    /// Human readable name, ie `checks{type:login_success}`.
    pub name: String,
    /// The criterion, ie `rate>0.95`.
    pub criterion: String,
    /// The measured value, `None` when there was nothing to measure.
    pub observed: Option<f64>,
    /// Whether the criterion held, or there was nothing to measure.
    pub passed: bool,
}

impl fmt::Display for ThresholdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "✓" } else { "✗" };
        match self.observed {
            Some(observed) => write!(
                f,
                " {} {:<32} {:<12} observed {:.4}",
                mark, self.name, self.criterion, observed
            ),
            None => write!(
                f,
                " {} {:<32} {:<12} no samples",
                mark, self.name, self.criterion
            ),
        }
    }
}

impl Thresholds {
    /// Evaluate every threshold.
    ///
    /// A threshold without samples passes: a run that never reached the books
    /// endpoint is caught by the login category, not by the books category.
    pub fn evaluate(&self, requests: &RequestSummary, checks: &CheckSummary) -> Vec<ThresholdResult> {
        let mut results = Vec::new();

        let failed_rate = requests.failed_rate();
        results.push(ThresholdResult {
            name: "http_req_failed".to_string(),
            criterion: format!("rate<{}", self.max_failed_request_rate),
            observed: failed_rate,
            passed: failed_rate.map_or(true, |rate| rate < self.max_failed_request_rate),
        });

        let aggregate = requests.aggregate();
        let duration = match aggregate.count() {
            0 => None,
            _ => Some(aggregate.percentile(self.duration_percentile)),
        };
        results.push(ThresholdResult {
            name: "http_req_duration".to_string(),
            criterion: format!(
                "p({})<{}",
                (self.duration_percentile * 100.0).round(),
                self.max_duration_ms
            ),
            observed: duration.map(|ms| ms as f64),
            passed: duration.map_or(true, |ms| ms < self.max_duration_ms),
        });

        for (category, min_rate) in &self.min_check_rates {
            let rate = checks.pass_rate(*category);
            results.push(ThresholdResult {
                name: format!("checks{{type:{}}}", category),
                criterion: format!("rate>{}", min_rate),
                observed: rate,
                passed: rate.map_or(true, |rate| rate > *min_rate),
            });
        }

        for result in results.iter().filter(|result| !result.passed) {
            warn!("threshold crossed: {}", result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckRegistry};
    use crate::metrics::RequestStats;

    fn requests(rows: &[(&str, RequestStats)]) -> RequestSummary {
        RequestSummary {
            requests: rows
                .iter()
                .map(|(name, stats)| (name.to_string(), stats.clone()))
                .collect(),
        }
    }

    fn healthy_run() -> (RequestSummary, CheckRegistry) {
        let checks = CheckRegistry::new();
        for _ in 0..200 {
            checks.record(Check::LoginStatus200.outcome(true));
            checks.record(Check::BookContainsGenre.outcome(true));
        }
        let requests = requests(&[
            ("POST /api/public/login", RequestStats::uniform(40, 200, 200)),
            ("GET /api/books", RequestStats::uniform(80, 200, 200)),
        ]);
        (requests, checks)
    }

    #[test]
    fn healthy_run_passes() {
        let (requests, checks) = healthy_run();
        let results = Thresholds::default().evaluate(&requests, &checks.snapshot());
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|result| result.passed));
        assert_eq!(results[1].observed, Some(80.0));
        assert_eq!(results[1].criterion, "p(95)<600");
        assert_eq!(results[2].name, "checks{type:login_success}");
    }

    #[test]
    fn failed_requests_cross_threshold() {
        let (mut requests, checks) = healthy_run();
        requests.requests.insert(
            "POST /api/public/login".to_string(),
            RequestStats::uniform(40, 401, 5),
        );
        let results = Thresholds::default().evaluate(&requests, &checks.snapshot());
        assert!(!results[0].passed);
        assert!(results[1..].iter().all(|result| result.passed));
    }

    #[test]
    fn slow_requests_cross_threshold() {
        let requests = requests(&[("GET /api/books", RequestStats::uniform(900, 200, 10))]);
        let results = Thresholds::default().evaluate(&requests, &CheckRegistry::new().snapshot());
        assert!(!results[1].passed);
        assert_eq!(results[1].observed, Some(900.0));
    }

    #[test]
    fn check_rate_is_strictly_above_minimum() {
        let (requests, checks) = healthy_run();
        // 200 passes, 10 failures: 95.2% passes, still above 95%.
        for _ in 0..10 {
            checks.record(Check::BookStatus200.outcome(false));
        }
        let results = Thresholds::default().evaluate(&requests, &checks.snapshot());
        assert!(results[3].passed);

        // 200 passes, 11 failures: below 95%.
        checks.record(Check::BookStatus200.outcome(false));
        let results = Thresholds::default().evaluate(&requests, &checks.snapshot());
        assert!(!results[3].passed);
        assert!(results[2].passed);
    }

    #[test]
    fn nothing_measured_passes() {
        let results = Thresholds::default()
            .evaluate(&RequestSummary::default(), &CheckRegistry::new().snapshot());
        assert!(results.iter().all(|result| result.passed && result.observed.is_none()));
    }
}
