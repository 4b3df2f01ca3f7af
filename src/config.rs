//! Load test configuration, read from the environment.
//!
//! The environment variables mirror the knobs the load test has always exposed:
//!  - `USERS`: target number of concurrent users (default `3000`)
//!  - `SUMMARY_NAME`: file name of the HTML report (default `Summary.html`)
//!  - `BOOKS_API_HOST`: base url of the books API (default `http://books-api:8081`)
//!  - `USERS_CSV` / `BOOKS_CSV`: fixture paths
//!  - `LOGIN_POLICY`: `strict`, `tolerate-unauthorized` or `token-only`
//!  - `WORKLOAD`: `per-iteration` or `single-session`
//!  - `STAGES`: explicit ramp in Goose test plan syntax, ie `"300,10s;3000,30s;0,10s"`
//!
//! Everything Goose itself can configure stays on the Goose command line.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::profile::LoadProfile;
use crate::thresholds::Thresholds;
use crate::workload::{LoginPolicy, WorkloadShape};
use crate::LoadTestError;

/// Default number of users at full load.
pub const DEFAULT_USERS: usize = 3000;
/// Default file name of the HTML report.
pub const DEFAULT_SUMMARY_NAME: &str = "Summary.html";
/// Default books API base url.
pub const DEFAULT_BASE_URL: &str = "http://books-api:8081";
/// Default users fixture.
pub const DEFAULT_USERS_CSV: &str = "fixtures/user_data.csv";
/// Default books fixture.
pub const DEFAULT_BOOKS_CSV: &str = "fixtures/books_data.csv";
/// Directory the HTML report is always written to.
pub const REPORT_DIR: &str = "reports";

/// Pauses inserted into each iteration to shape the offered load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    /// After a successful login, before querying books.
    pub after_login: Duration,
    /// After a login that doesn't allow the iteration to continue.
    pub after_failed_login: Duration,
    /// At the end of every iteration.
    pub end_of_iteration: Duration,
}
impl Pacing {
    /// No pauses at all, useful against a mock server.
    pub fn none() -> Self {
        Pacing {
            after_login: Duration::ZERO,
            after_failed_login: Duration::ZERO,
            end_of_iteration: Duration::ZERO,
        }
    }
}
impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            after_login: Duration::from_millis(500),
            after_failed_login: Duration::from_secs(1),
            end_of_iteration: Duration::from_secs(1),
        }
    }
}

/// Everything the workload driver needs to know about a run.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Target number of concurrent users.
    pub users: usize,
    /// File name of the HTML report, written into [`REPORT_DIR`].
    pub summary_name: String,
    /// Base url of the books API.
    pub base_url: String,
    /// Path of the users fixture.
    pub users_csv: PathBuf,
    /// Path of the books fixture.
    pub books_csv: PathBuf,
    /// How login responses are judged.
    pub login_policy: LoginPolicy,
    /// One query per iteration, or every book in one session.
    pub shape: WorkloadShape,
    /// Ramp of concurrent users.
    pub profile: LoadProfile,
    /// Pauses within an iteration.
    pub pacing: Pacing,
    /// Pass/fail criteria for the finished run.
    pub thresholds: Thresholds,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            users: DEFAULT_USERS,
            summary_name: DEFAULT_SUMMARY_NAME.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            users_csv: PathBuf::from(DEFAULT_USERS_CSV),
            books_csv: PathBuf::from(DEFAULT_BOOKS_CSV),
            login_policy: LoginPolicy::default(),
            shape: WorkloadShape::default(),
            profile: LoadProfile::standard(DEFAULT_USERS),
            pacing: Pacing::default(),
            thresholds: Thresholds::default(),
        }
    }
}

impl DriverConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, LoadTestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup, unset or empty keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoadTestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = DriverConfig::default();

        if let Some(users) = get("USERS") {
            config.users = parse_option("USERS", &users)?;
            if config.users == 0 {
                return Err(LoadTestError::InvalidOption {
                    option: "USERS".to_string(),
                    value: users,
                    detail: "at least one user is required".to_string(),
                });
            }
        }
        if let Some(summary_name) = get("SUMMARY_NAME") {
            config.summary_name = summary_name;
        }
        if let Some(base_url) = get("BOOKS_API_HOST") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(path) = get("USERS_CSV") {
            config.users_csv = PathBuf::from(path);
        }
        if let Some(path) = get("BOOKS_CSV") {
            config.books_csv = PathBuf::from(path);
        }
        if let Some(policy) = get("LOGIN_POLICY") {
            config.login_policy = parse_option("LOGIN_POLICY", &policy)?;
        }
        if let Some(shape) = get("WORKLOAD") {
            config.shape = parse_option("WORKLOAD", &shape)?;
        }
        config.profile = match get("STAGES") {
            Some(stages) => stages.parse()?,
            None => LoadProfile::standard(config.users),
        };

        Ok(config)
    }

    /// Where Goose writes the HTML report.
    pub fn report_path(&self) -> PathBuf {
        PathBuf::from(REPORT_DIR).join(&self.summary_name)
    }
}

fn parse_option<T: FromStr>(option: &str, value: &str) -> Result<T, LoadTestError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| LoadTestError::InvalidOption {
            option: option.to_string(),
            value: value.to_string(),
            detail: format!("unable to parse {}", option),
        })
}
