// Not all helpers are used by every test file.
#![allow(dead_code)]

use gumdrop::Options;
use httpmock::{Method::POST, Mock, MockServer};

use books_loadtest::config::{DriverConfig, Pacing};
use books_loadtest::fixtures::Fixtures;
use books_loadtest::report::RunOutcome;
use books_loadtest::workload::{Driver, LOGIN_PATH};
use books_loadtest::LoadTestError;
use goose::config::GooseConfiguration;
use goose::GooseAttack;

pub const USERS_CSV: &str = "username,password\nmanuel@gmail.com,Manuelino123!\n";
pub const BOOKS_CSV: &str = "isbn,title,genre\n\
    9780261102385,The Lord of the Rings,Fantasy\n";

/// The token the mock login endpoint hands out.
pub const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.manuel.signature";

/// Configure Goose to run `users` users, hatched as fast as allowed, each running
/// `iterations` iterations against the mock server.
pub fn build_configuration(server: &MockServer, users: usize, iterations: usize) -> GooseConfiguration {
    let server_url = server.base_url();
    let users = users.to_string();
    let iterations = iterations.to_string();
    let configuration: Vec<&str> = vec![
        "--host",
        server_url.as_str(),
        "--users",
        users.as_str(),
        "--hatch-rate",
        users.as_str(),
        "--iterations",
        iterations.as_str(),
    ];

    GooseConfiguration::parse_args_default(&configuration)
        .expect("failed to parse options and generate a configuration")
}

/// Driver configuration pointing at the mock server, without any pauses.
pub fn driver_config(server: &MockServer) -> DriverConfig {
    DriverConfig {
        base_url: server.base_url(),
        pacing: Pacing::none(),
        ..DriverConfig::default()
    }
}

pub fn fixtures(users_csv: &str, books_csv: &str) -> Fixtures {
    Fixtures::from_readers(users_csv.as_bytes(), books_csv.as_bytes())
        .expect("failed to load fixtures")
}

/// Login endpoint accepting the fixture user, and handing out [`TOKEN`].
pub fn mock_login(server: &MockServer) -> Mock {
    server.mock(|when, then| {
        when.method(POST)
            .path(LOGIN_PATH)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({
                "username": "manuel@gmail.com",
                "password": "Manuelino123!",
            }));
        then.status(200).header("Authorization", TOKEN);
    })
}

/// Run a complete load test, returning the driver's outcome.
pub async fn run_load_test(
    server: &MockServer,
    config: DriverConfig,
    fixtures: Fixtures,
    users: usize,
    iterations: usize,
) -> Result<RunOutcome, LoadTestError> {
    let attack = GooseAttack::initialize_with_config(build_configuration(server, users, iterations))
        .expect("failed to initialize goose attack");
    books_loadtest::run_attack(attack, Driver::new(config, fixtures)).await
}
