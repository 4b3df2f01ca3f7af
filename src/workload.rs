//! The load test itself: log in, query books by genre, check the answers.
//!
//! Two workload shapes are supported:
//!  - [`WorkloadShape::PerIteration`]: every iteration logs in a random user and
//!    queries one random genre.
//!  - [`WorkloadShape::SingleSession`]: one login before the attack starts, then
//!    every iteration queries every book of the fixture with that token.
//!
//! How a login response is judged is up to the [`LoginPolicy`].

use goose::goose::GooseRequest;
use goose::prelude::*;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, EnumString};

use crate::checks::{Check, CheckRegistry, CheckResult};
use crate::config::DriverConfig;
use crate::fixtures::{Fixtures, UserRecord};
use crate::LoadTestError;

/// Public login endpoint.
pub const LOGIN_PATH: &str = "/api/public/login";
/// Books search endpoint.
pub const BOOKS_PATH: &str = "/api/books";

/// Timeout of the one-time login of a single-session run.
const SETUP_TIMEOUT: Duration = Duration::from_secs(60);

/// How a login response is judged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LoginPolicy {
    /// Only a 200 carrying an `Authorization` header is a successful login.
    #[default]
    Strict,
    /// A 401 is an expected answer: it passes the status check, but the
    /// iteration still stops without querying books.
    TolerateUnauthorized,
    /// Any answer carrying an `Authorization` header is a successful login.
    TokenOnly,
}

/// What to do after a login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Continue with this bearer token.
    Authenticated(String),
    /// Stop the iteration, the answer was expected.
    Tolerated,
    /// Stop the iteration, the login failed.
    Rejected,
}

/// Checks recorded for a login response, and what follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginEvaluation {
    /// Checks to record, in order.
    pub checks: Vec<CheckResult>,
    /// Whether the iteration goes on to query books.
    pub outcome: LoginOutcome,
}

impl LoginPolicy {
    /// Judge a login response.
    ///
    /// `status` is `None` when no response was received, `token` is the bearer
    /// token extracted from the `Authorization` header.
    pub fn evaluate(self, status: Option<u16>, token: Option<&str>) -> LoginEvaluation {
        let ok = status == Some(200);
        let authenticated = |passed: bool| match (passed, token) {
            (true, Some(token)) => LoginOutcome::Authenticated(token.to_string()),
            _ => LoginOutcome::Rejected,
        };

        match self {
            LoginPolicy::Strict => {
                let has_token = ok && token.is_some();
                LoginEvaluation {
                    checks: vec![
                        Check::LoginStatus200.outcome(ok),
                        Check::LoginToken.outcome(has_token),
                    ],
                    outcome: authenticated(has_token),
                }
            }
            LoginPolicy::TolerateUnauthorized => {
                let unauthorized = status == Some(401);
                let mut checks = vec![Check::LoginStatus200Or401.outcome(ok || unauthorized)];
                if ok {
                    checks.push(Check::LoginToken.outcome(token.is_some()));
                }
                let outcome = if unauthorized {
                    LoginOutcome::Tolerated
                } else {
                    authenticated(ok)
                };
                LoginEvaluation { checks, outcome }
            }
            LoginPolicy::TokenOnly => {
                let responded = status.is_some();
                let has_token = responded && token.is_some();
                LoginEvaluation {
                    checks: vec![
                        Check::LoginResponded.outcome(responded),
                        Check::LoginToken.outcome(has_token),
                    ],
                    outcome: authenticated(has_token),
                }
            }
        }
    }
}

/// Which requests make up one iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum WorkloadShape {
    /// Log in and query one random genre every iteration.
    #[default]
    PerIteration,
    /// Log in once for the whole run, query every book every iteration.
    SingleSession,
}

/// Extract the bearer token from an `Authorization` header value.
///
/// The API may or may not prefix the token with `Bearer`; the prefix is removed so
/// it isn't doubled when the token is sent back. A bare `Bearer` carries no token.
pub fn bearer_token(header_value: &str) -> Option<String> {
    let value = header_value.trim_start();
    let token = match value.get(..6) {
        Some(scheme)
            if scheme.eq_ignore_ascii_case("bearer")
                && value[6..].chars().next().map_or(true, char::is_whitespace) =>
        {
            &value[6..]
        }
        _ => value,
    };
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Path and query string asking for the books of one genre.
pub fn books_path(genre: &str) -> String {
    format!("{}?genre={}", BOOKS_PATH, urlencoding::encode(genre))
}

/// Checks recorded for a books query response.
pub fn evaluate_books(status: Option<u16>, body: Option<&str>, genre: &str) -> [CheckResult; 2] {
    [
        Check::BookStatus200.outcome(status == Some(200)),
        Check::BookContainsGenre.outcome(body.is_some_and(|body| body.contains(genre))),
    ]
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> From<&'a UserRecord> for LoginRequest<'a> {
    fn from(user: &'a UserRecord) -> Self {
        LoginRequest {
            username: &user.username,
            password: &user.password,
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Shared state of the load test: configuration, fixtures, and run-wide checks.
///
/// Request metrics are left to Goose.
#[derive(Debug)]
pub struct Driver {
    config: DriverConfig,
    fixtures: Fixtures,
    checks: CheckRegistry,
}

impl Driver {
    /// Create a driver with an empty check registry.
    pub fn new(config: DriverConfig, fixtures: Fixtures) -> Self {
        Driver {
            config,
            fixtures,
            checks: CheckRegistry::new(),
        }
    }

    /// The configuration the driver was created with.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The fixtures requests are drawn from.
    pub fn fixtures(&self) -> &Fixtures {
        &self.fixtures
    }

    /// Checks recorded so far by all users.
    pub fn checks(&self) -> &CheckRegistry {
        &self.checks
    }

    /// Log in once, outside of Goose, for a single-session run.
    ///
    /// Any login the policy doesn't authenticate aborts the run. The login's
    /// checks are recorded, but as Goose isn't running yet it doesn't appear in
    /// the request metrics.
    pub async fn establish_session(&self) -> Result<String, LoadTestError> {
        let credentials = self.fixtures.pick(&mut rand::rng()).0;
        let url = format!("{}{}", self.config.base_url, LOGIN_PATH);
        info!("logging in {} for a single session", credentials.username);

        let client = reqwest::Client::builder().timeout(SETUP_TIMEOUT).build()?;
        let (status, token) = match client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&LoginRequest::from(credentials))
            .send()
            .await
        {
            Ok(response) => (
                Some(response.status().as_u16()),
                token_from_headers(response.headers()),
            ),
            Err(e) => {
                warn!("setup login to {} failed: {}", url, e);
                (None, None)
            }
        };
        debug!("setup login answered {:?}", status);

        let evaluation = self.config.login_policy.evaluate(status, token.as_deref());
        self.checks.record_all(&evaluation.checks);
        match evaluation.outcome {
            LoginOutcome::Authenticated(token) => Ok(token),
            LoginOutcome::Tolerated | LoginOutcome::Rejected => Err(LoadTestError::SetupLogin {
                status,
                detail: format!(
                    "{} could not log in with the {} login policy",
                    credentials.username, self.config.login_policy
                ),
            }),
        }
    }

    /// One iteration of the per-iteration workload.
    pub async fn run_iteration(&self, user: &mut GooseUser) -> TransactionResult {
        let (credentials, book) = self.fixtures.pick(&mut rand::rng());

        let token = match self.login(user, credentials).await {
            Ok(Some(token)) => token,
            stopped => {
                pause(self.config.pacing.after_failed_login).await;
                return stopped.map(|_| ());
            }
        };
        pause(self.config.pacing.after_login).await;

        let result = self.query_books(user, &token, &book.genre).await;
        pause(self.config.pacing.end_of_iteration).await;
        result
    }

    /// One iteration of the single-session workload: every book, in fixture order.
    pub async fn run_session_iteration(&self, user: &mut GooseUser, token: &str) -> TransactionResult {
        let mut result = Ok(());
        for book in self.fixtures.books() {
            if let Err(e) = self.query_books(user, token, &book.genre).await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        pause(self.config.pacing.end_of_iteration).await;
        result
    }

    /// Log in, returning the token if the iteration may continue.
    ///
    /// A rejected login is flagged on the Goose request and returned as an error; a
    /// tolerated one returns `Ok(None)`.
    async fn login(
        &self,
        user: &mut GooseUser,
        credentials: &UserRecord,
    ) -> Result<Option<String>, Box<TransactionError>> {
        let request_builder = user
            .get_request_builder(&GooseMethod::Post, LOGIN_PATH)?
            .header(ACCEPT, "application/json")
            .json(&LoginRequest::from(credentials));
        let goose_request = GooseRequest::builder()
            .method(GooseMethod::Post)
            .path(LOGIN_PATH)
            .name(LOGIN_PATH)
            .set_request_builder(request_builder)
            .build();
        let mut goose = user.request(goose_request).await?;

        let (status, token) = match &goose.response {
            Ok(response) => (
                Some(response.status().as_u16()),
                token_from_headers(response.headers()),
            ),
            Err(_) => (None, None),
        };

        let evaluation = self.config.login_policy.evaluate(status, token.as_deref());
        self.checks.record_all(&evaluation.checks);
        match evaluation.outcome {
            LoginOutcome::Authenticated(token) => Ok(Some(token)),
            LoginOutcome::Tolerated => {
                debug!("{}: tolerated status {:?}", credentials.username, status);
                Ok(None)
            }
            LoginOutcome::Rejected => {
                let tag = format!("login rejected for {}", credentials.username);
                user.set_failure(&tag, &mut goose.request, None, None)
                    .map(|_| None)
            }
        }
    }

    /// Query the books of one genre and check the answer.
    async fn query_books(&self, user: &mut GooseUser, token: &str, genre: &str) -> TransactionResult {
        let path = books_path(genre);
        let request_builder = user
            .get_request_builder(&GooseMethod::Get, &path)?
            .bearer_auth(token)
            .header(ACCEPT, "application/json");
        let goose_request = GooseRequest::builder()
            .method(GooseMethod::Get)
            .path(path.as_str())
            .name(BOOKS_PATH)
            .set_request_builder(request_builder)
            .build();
        let mut goose = user.request(goose_request).await?;

        let (status, body) = match goose.response {
            Ok(response) => {
                let status = response.status().as_u16();
                (Some(status), response.text().await.ok())
            }
            Err(e) => {
                debug!("{} failed: {}", path, e);
                (None, None)
            }
        };

        if self
            .checks
            .record_all(&evaluate_books(status, body.as_deref(), genre))
        {
            Ok(())
        } else {
            let tag = format!("books of genre {:?} failed checks", genre);
            user.set_failure(&tag, &mut goose.request, None, body.as_deref())
        }
    }
}

/// The per-iteration scenario.
pub fn scenario(driver: Arc<Driver>) -> Scenario {
    let closure: TransactionFunction = Arc::new(move |user| {
        let driver = Arc::clone(&driver);
        Box::pin(async move { driver.run_iteration(user).await })
    });

    Scenario::new("BooksByGenre")
        .register_transaction(Transaction::new(closure).set_name("login and query books"))
}

/// The single-session scenario, reusing `token` for every request.
pub fn session_scenario(driver: Arc<Driver>, token: String) -> Scenario {
    let token: Arc<str> = token.into();
    let closure: TransactionFunction = Arc::new(move |user| {
        let driver = Arc::clone(&driver);
        let token = Arc::clone(&token);
        Box::pin(async move { driver.run_session_iteration(user, &token).await })
    });

    Scenario::new("AllBooksOneSession")
        .register_transaction(Transaction::new(closure).set_name("query every book"))
}
