//! End of run summary: checks, request durations and threshold verdicts.
//!
//! Goose renders the HTML report on its own; this is what gets printed
//! next to it, and what decides the exit status.

use chrono::prelude::*;
use goose::metrics::GooseMetrics;
use std::fmt;

use crate::checks::CheckSummary;
use crate::metrics::RequestSummary;
use crate::thresholds::{ThresholdResult, Thresholds};
use crate::workload::Driver;

/// Everything known about a finished run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// When the thresholds were evaluated.
    pub finished: DateTime<Local>,
    /// Pass and fail counts of every check that ran.
    pub checks: CheckSummary,
    /// Request metrics collected by Goose.
    pub requests: RequestSummary,
    /// One result per threshold, in evaluation order.
    pub thresholds: Vec<ThresholdResult>,
}

impl RunOutcome {
    /// Snapshot the driver's checks, and judge them together with the request
    /// metrics Goose returned against the driver's thresholds.
    pub fn evaluate(driver: &Driver, metrics: &GooseMetrics) -> Self {
        RunOutcome::new(
            driver.checks().snapshot(),
            RequestSummary::from_metrics(metrics),
            &driver.config().thresholds,
        )
    }

    /// Judge already collected results against `thresholds`.
    pub fn new(checks: CheckSummary, requests: RequestSummary, thresholds: &Thresholds) -> Self {
        let thresholds = thresholds.evaluate(&requests, &checks);
        RunOutcome {
            finished: Local::now(),
            checks,
            requests,
            thresholds,
        }
    }

    /// True when every threshold passed.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|threshold| threshold.passed)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.checks)?;
        write!(fmt, "{}", self.requests)?;
        writeln!(
            fmt,
            "\n === THRESHOLDS ===\n ------------------------------------------------------------------------------"
        )?;
        for threshold in &self.thresholds {
            writeln!(fmt, "{}", threshold)?;
        }
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {} at {}",
            if self.passed() {
                "PASSED"
            } else {
                "FAILED: thresholds crossed"
            },
            self.finished.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckRegistry};
    use crate::metrics::RequestStats;

    fn login_requests(status_code: u16) -> RequestSummary {
        RequestSummary {
            requests: [(
                "POST /api/public/login".to_string(),
                RequestStats::uniform(25, status_code, 1),
            )]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn passing_run() {
        let checks = CheckRegistry::new();
        checks.record(Check::LoginStatus200.outcome(true));

        let outcome = RunOutcome::new(
            checks.snapshot(),
            login_requests(200),
            &Thresholds::default(),
        );
        assert!(outcome.passed());
        let rendered = outcome.to_string();
        assert!(rendered.contains("=== THRESHOLDS ==="));
        assert!(rendered.contains("PASSED"));
    }

    #[test]
    fn failing_run() {
        let checks = CheckRegistry::new();
        checks.record(Check::LoginStatus200.outcome(false));

        let outcome = RunOutcome::new(
            checks.snapshot(),
            login_requests(401),
            &Thresholds::default(),
        );
        assert!(!outcome.passed());
        assert!(outcome.to_string().contains("FAILED"));
    }

    #[test]
    fn empty_goose_metrics() {
        let outcome = RunOutcome::new(
            CheckRegistry::new().snapshot(),
            RequestSummary::from_metrics(&GooseMetrics::default()),
            &Thresholds::default(),
        );
        assert!(outcome.requests.requests.is_empty());
        assert!(outcome.passed());
    }
}
