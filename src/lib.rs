//! # books-loadtest
//!
//! A [Goose](https://docs.rs/goose/) load test for the book catalog API.
//!
//! Every simulated user logs in with a random user from a CSV fixture, asks
//! the API for books of a random genre taken from a second CSV fixture, and
//! checks that the answer is a `200` whose body mentions that genre. Goose
//! schedules the users along a staged ramp, aggregates request metrics and
//! renders the HTML report. This crate adds the checks, the fixtures and the
//! threshold verdict evaluated once the attack finishes.
//!
//! ## Running
//!
//! ```bash
//! USERS=300 SUMMARY_NAME=Smoke.html BOOKS_API_HOST=http://localhost:8080 \
//!     cargo run --release
//! ```
//!
//! Any Goose run-time option can still be passed on the command line, and
//! wins over the defaults derived from the environment. The ramp comes from
//! `STAGES` unless the command line shapes the load itself:
//!
//! ```bash
//! cargo run --release -- --host http://localhost:8081 --test-plan "10,5s;10,30s;0,5s"
//! cargo run --release -- --users 50 --hatch-rate 5 --run-time 1m
//! ```
//!
//! The process exits with [`THRESHOLD_EXIT_CODE`] when any threshold is
//! violated.

#[macro_use]
extern crate log;

pub mod checks;
pub mod config;
pub mod fixtures;
pub mod metrics;
pub mod profile;
pub mod report;
pub mod thresholds;
pub mod workload;

use goose::config::GooseConfiguration;
use goose::prelude::*;
use gumdrop::Options;
use std::sync::Arc;
use std::{fmt, io};

use crate::config::DriverConfig;
use crate::fixtures::Fixtures;
use crate::report::RunOutcome;
use crate::workload::{Driver, WorkloadShape};

/// Exit status signalling that the load test ran but broke at least one threshold.
pub const THRESHOLD_EXIT_CODE: i32 = 99;

/// An enumeration of all errors the load test can return.
#[derive(Debug)]
pub enum LoadTestError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`csv::Error`](https://docs.rs/csv/*/csv/struct.Error.html).
    Csv(csv::Error),
    /// Wraps a [`GooseError`](https://docs.rs/goose/*/goose/enum.GooseError.html).
    Goose(GooseError),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// A fixture file contained no data rows.
    EmptyFixture {
        /// Where the fixture was read from.
        source: String,
    },
    /// A fixture file lacks a column the load test needs.
    MissingColumn {
        /// Where the fixture was read from.
        source: String,
        /// The missing column name.
        column: String,
    },
    /// Invalid option or value specified.
    InvalidOption {
        /// The invalid option.
        option: String,
        /// The invalid value.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// The ramp profile can't be run.
    InvalidProfile {
        /// An optional explanation of the error.
        detail: String,
    },
    /// The one-time login of a single-session run failed.
    SetupLogin {
        /// Status code returned by the login endpoint, if any.
        status: Option<u16>,
        /// An optional explanation of the error.
        detail: String,
    },
}
/// Implement a helper to provide a text description of all possible types of errors.
impl LoadTestError {
    fn describe(&self) -> &str {
        match *self {
            LoadTestError::Io(_) => "io::Error",
            LoadTestError::Csv(_) => "csv::Error",
            LoadTestError::Goose(_) => "goose::GooseError",
            LoadTestError::Reqwest(_) => "reqwest::Error",
            LoadTestError::EmptyFixture { .. } => "fixture has no data rows",
            LoadTestError::MissingColumn { .. } => "fixture is missing a required column",
            LoadTestError::InvalidOption { .. } => "invalid option or value specified",
            LoadTestError::InvalidProfile { .. } => "invalid load profile",
            LoadTestError::SetupLogin { .. } => "setup login failed",
        }
    }
}

impl fmt::Display for LoadTestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadTestError::Io(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Csv(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Goose(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Reqwest(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::EmptyFixture { ref source } => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::MissingColumn {
                ref source,
                ref column,
            } => write!(
                f,
                "LoadTestError: {} ({}: `{}`)",
                self.describe(),
                source,
                column
            ),
            LoadTestError::InvalidOption {
                ref option,
                ref value,
                ref detail,
            } => write!(
                f,
                "LoadTestError: {} ({}={:?}: {})",
                self.describe(),
                option,
                value,
                detail
            ),
            LoadTestError::InvalidProfile { ref detail } => {
                write!(f, "LoadTestError: {} ({})", self.describe(), detail)
            }
            LoadTestError::SetupLogin { status, ref detail } => match status {
                Some(status) => write!(
                    f,
                    "LoadTestError: {} (status {}: {})",
                    self.describe(),
                    status,
                    detail
                ),
                None => write!(f, "LoadTestError: {} ({})", self.describe(), detail),
            },
        }
    }
}

// Define the lower level source of this error, if any.
impl std::error::Error for LoadTestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoadTestError::Io(ref source) => Some(source),
            LoadTestError::Csv(ref source) => Some(source),
            LoadTestError::Goose(ref source) => Some(source),
            LoadTestError::Reqwest(ref source) => Some(source),
            _ => None,
        }
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for LoadTestError {
    fn from(err: io::Error) -> LoadTestError {
        LoadTestError::Io(err)
    }
}

/// Auto-convert CSV errors.
impl From<csv::Error> for LoadTestError {
    fn from(err: csv::Error) -> LoadTestError {
        LoadTestError::Csv(err)
    }
}

/// Auto-convert Goose errors.
impl From<GooseError> for LoadTestError {
    fn from(err: GooseError) -> LoadTestError {
        LoadTestError::Goose(err)
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> LoadTestError {
        LoadTestError::Reqwest(err)
    }
}

/// Load the fixtures, build a [`GooseAttack`] from the command line and run it.
pub async fn run(config: DriverConfig) -> Result<RunOutcome, LoadTestError> {
    let fixtures = Fixtures::load(&config.users_csv, &config.books_csv)?;
    let attack = configure_attack(GooseConfiguration::parse_args_default_or_exit(), &config)?;
    let driver = Driver::new(config, fixtures);
    run_attack(attack, driver).await
}

/// Whether the command line already decides how users are started and stopped.
///
/// Goose refuses a test plan combined with any of these options.
fn shapes_load(configuration: &GooseConfiguration) -> bool {
    configuration.users.is_some()
        || configuration.hatch_rate.is_some()
        || !configuration.startup_time.is_empty()
        || !configuration.run_time.is_empty()
        || configuration.iterations > 0
}

/// Build a [`GooseAttack`] from a parsed command line, with the
/// environment-derived defaults applied.
///
/// Options given on the command line take precedence, as with any Goose default.
/// The ramp profile is only applied when the command line sets none of
/// `--users`, `--hatch-rate`, `--startup-time`, `--run-time` or `--iterations`.
pub fn configure_attack(
    configuration: GooseConfiguration,
    config: &DriverConfig,
) -> Result<GooseAttack, LoadTestError> {
    config.profile.validate(config.users)?;

    let report_path = config.report_path();
    if let Some(parent) = report_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let report_file = report_path.to_string_lossy().into_owned();
    let shaped_by_command_line = shapes_load(&configuration);
    let iterates = configuration.iterations > 0;

    let attack = GooseAttack::initialize_with_config(configuration)?
        .set_default(GooseDefault::Host, config.base_url.as_str())?
        .set_default(GooseDefault::ReportFile, report_file.as_str())?;

    if shaped_by_command_line {
        info!(
            "load shaped by the command line, {} users unless set, report in {}",
            config.users, report_file
        );
        let attack = attack.set_default(GooseDefault::Users, config.users)?;
        // Goose resets metrics once all users are running unless iterating; the
        // thresholds cover the whole run, like the checks.
        if iterates {
            return Ok(*attack);
        }
        return Ok(*attack.set_default(GooseDefault::NoResetMetrics, true)?);
    }

    let test_plan = config.profile.to_test_plan();
    info!(
        "ramping to {} users with test plan \"{}\", report in {}",
        config.users, test_plan, report_file
    );
    Ok(*attack.set_default(GooseDefault::TestPlan, test_plan.as_str())?)
}

/// Register the driver's scenario on an already configured attack, run it, and
/// evaluate the thresholds.
///
/// A single-session run logs in before any user starts, and aborts if that fails.
pub async fn run_attack(attack: GooseAttack, driver: Driver) -> Result<RunOutcome, LoadTestError> {
    let driver = Arc::new(driver);

    let scenario = match driver.config().shape {
        WorkloadShape::PerIteration => workload::scenario(Arc::clone(&driver)),
        WorkloadShape::SingleSession => {
            let token = driver.establish_session().await?;
            workload::session_scenario(Arc::clone(&driver), token)
        }
    };

    let goose_metrics = attack.register_scenario(scenario).execute().await?;

    Ok(RunOutcome::evaluate(&driver, &goose_metrics))
}
