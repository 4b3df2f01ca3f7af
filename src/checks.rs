//! Labelled boolean assertions about responses, and their aggregate pass rates.
//!
//! Goose decides whether a request failed; checks answer the narrower question
//! the load test cares about ("did the login hand out a token?", "does the body
//! mention the genre?"). Every [`Check`] belongs to a [`CheckCategory`], and the
//! thresholds are expressed per category.
//!
//! The [`CheckRegistry`] is shared by all users. Each check has its own pair of
//! atomic counters, so recording never takes a lock.

use num_format::{Locale, ToFormattedString};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{EnumIter, IntoStaticStr};

/// Groups of checks sharing a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CheckCategory {
    LoginSuccess,
    BookSuccess,
}
impl CheckCategory {
    pub fn name(self) -> &'static str {
        self.into()
    }
}
impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Every check the load test can record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, strum_macros::EnumCount)]
pub enum Check {
    /// Login answered 200.
    LoginStatus200,
    /// Login answered 200, or 401 which is tolerated.
    ///
    /// Stands in for a separate "401 Unauthorized" check, which would fail on
    /// every successful login.
    LoginStatus200Or401,
    /// Login answered at all, whatever the status.
    LoginResponded,
    /// Login answered 200 with an `Authorization` header.
    LoginToken,
    /// Books query answered 200.
    BookStatus200,
    /// Books query body contains the requested genre.
    BookContainsGenre,
}

impl Check {
    pub fn label(self) -> &'static str {
        match self {
            Check::LoginStatus200 => "POST /login - Success 200",
            Check::LoginStatus200Or401 => "POST /login - Success 200 or 401",
            Check::LoginResponded => "POST /login - Responded",
            Check::LoginToken => "POST /login - Contains Token",
            Check::BookStatus200 => "GET /books - Valid Book Status 200",
            Check::BookContainsGenre => "GET /books - Book Contains Genre",
        }
    }

    pub fn category(self) -> CheckCategory {
        match self {
            Check::LoginStatus200
            | Check::LoginStatus200Or401
            | Check::LoginResponded
            | Check::LoginToken => CheckCategory::LoginSuccess,
            Check::BookStatus200 | Check::BookContainsGenre => CheckCategory::BookSuccess,
        }
    }

    /// Pair this check with an outcome.
    pub fn outcome(self, passed: bool) -> CheckResult {
        CheckResult {
            check: self,
            passed,
        }
    }
}

/// The outcome of one check against one response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub check: Check,
    pub passed: bool,
}
impl CheckResult {
    pub fn label(&self) -> &'static str {
        self.check.label()
    }

    pub fn category(&self) -> CheckCategory {
        self.check.category()
    }
}

/// Run-wide pass/fail counters for every [`Check`].
#[derive(Debug)]
pub struct CheckRegistry {
    passes: [AtomicUsize; Check::COUNT],
    fails: [AtomicUsize; Check::COUNT],
}

impl Default for CheckRegistry {
    fn default() -> Self {
        CheckRegistry {
            passes: std::array::from_fn(|_| AtomicUsize::new(0)),
            fails: std::array::from_fn(|_| AtomicUsize::new(0)),
        }
    }
}

impl CheckRegistry {
    pub fn new() -> Self {
        CheckRegistry::default()
    }

    pub fn record(&self, result: CheckResult) {
        let counters = if result.passed {
            &self.passes
        } else {
            &self.fails
        };
        counters[result.check as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Record several outcomes, returning true if all of them passed.
    pub fn record_all(&self, results: &[CheckResult]) -> bool {
        results.iter().fold(true, |all_passed, result| {
            self.record(*result);
            all_passed && result.passed
        })
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> CheckSummary {
        let rows = Check::iter()
            .map(|check| CheckCount {
                check,
                passes: self.passes[check as usize].load(Ordering::Relaxed),
                fails: self.fails[check as usize].load(Ordering::Relaxed),
            })
            .filter(|count| count.total() > 0)
            .collect();
        CheckSummary { rows }
    }
}

/// Counters of one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckCount {
    pub check: Check,
    pub passes: usize,
    pub fails: usize,
}
impl CheckCount {
    pub fn total(&self) -> usize {
        self.passes + self.fails
    }
}

/// Point-in-time copy of a [`CheckRegistry`], listing only checks that ran.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub rows: Vec<CheckCount>,
}

impl CheckSummary {
    pub fn count(&self, check: Check) -> Option<&CheckCount> {
        self.rows.iter().find(|row| row.check == check)
    }

    /// Passes and total of all checks in a category.
    pub fn category_totals(&self, category: CheckCategory) -> (usize, usize) {
        self.rows
            .iter()
            .filter(|row| row.check.category() == category)
            .fold((0, 0), |(passes, total), row| {
                (passes + row.passes, total + row.total())
            })
    }

    /// Fraction of passing checks in a category, `None` if none ran.
    pub fn pass_rate(&self, category: CheckCategory) -> Option<f64> {
        match self.category_totals(category) {
            (_, 0) => None,
            (passes, total) => Some(passes as f64 / total as f64),
        }
    }
}

impl fmt::Display for CheckSummary {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return Ok(());
        }

        writeln!(
            fmt,
            "\n === CHECKS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<40} | {:>14} | {:>14} | {:>4}",
            "Check", "# passes", "# fails", "pass"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for category in CheckCategory::iter() {
            let rows: Vec<&CheckCount> = self
                .rows
                .iter()
                .filter(|row| row.check.category() == category)
                .collect();
            if rows.is_empty() {
                continue;
            }
            writeln!(fmt, " {}", category)?;
            for row in rows {
                writeln!(
                    fmt,
                    "   {:<38} | {:>14} | {:>14} | {:>3}%",
                    row.check.label(),
                    row.passes.to_formatted_string(&Locale::en),
                    row.fails.to_formatted_string(&Locale::en),
                    row.passes * 100 / row.total(),
                )?;
            }
        }
        Ok(())
    }
}
