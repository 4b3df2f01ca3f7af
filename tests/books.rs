use httpmock::{Method::GET, MockServer};
use serial_test::serial;

mod common;

use books_loadtest::checks::Check;
use books_loadtest::workload::BOOKS_PATH;

#[tokio::test]
#[serial]
// Genres are percent-encoded in the query string and arrive intact.
async fn test_genre_is_url_encoded() {
    let server = MockServer::start();
    let login = common::mock_login(&server);
    let books = server.mock(|when, then| {
        when.method(GET)
            .path(BOOKS_PATH)
            .query_param("genre", "Science Fiction & Fantasy");
        then.status(200)
            .body(r#"[{"title":"Hyperion","genre":"Science Fiction & Fantasy"}]"#);
    });

    let outcome = common::run_load_test(
        &server,
        common::driver_config(&server),
        common::fixtures(
            common::USERS_CSV,
            "title,genre\nHyperion,Science Fiction & Fantasy\n",
        ),
        1,
        2,
    )
    .await
    .unwrap();

    assert_eq!(login.hits(), 2);
    assert_eq!(books.hits(), 2);
    assert_eq!(
        outcome.checks.count(Check::BookContainsGenre).unwrap().passes,
        2
    );
}

#[tokio::test]
#[serial]
// A 200 whose body doesn't mention the genre fails only the genre check.
async fn test_body_without_genre() {
    let server = MockServer::start();
    common::mock_login(&server);
    let books = server.mock(|when, then| {
        when.method(GET).path(BOOKS_PATH);
        then.status(200).body("[]");
    });

    let outcome = common::run_load_test(
        &server,
        common::driver_config(&server),
        common::fixtures(common::USERS_CSV, common::BOOKS_CSV),
        1,
        2,
    )
    .await
    .unwrap();

    assert_eq!(books.hits(), 2);
    let status = outcome.checks.count(Check::BookStatus200).unwrap();
    assert_eq!((status.passes, status.fails), (2, 0));
    let genre = outcome.checks.count(Check::BookContainsGenre).unwrap();
    assert_eq!((genre.passes, genre.fails), (0, 2));
    assert!(!outcome.passed());
}

#[tokio::test]
#[serial]
// Several users share the same fixtures and all of their checks are aggregated.
async fn test_concurrent_users_aggregate() {
    let server = MockServer::start();
    let login = common::mock_login(&server);
    let books = server.mock(|when, then| {
        when.method(GET).path(BOOKS_PATH);
        then.status(200)
            .body(r#"[{"genre":"Fantasy"},{"genre":"Science Fiction"}]"#);
    });

    let outcome = common::run_load_test(
        &server,
        common::driver_config(&server),
        common::fixtures(
            common::USERS_CSV,
            "genre\nFantasy\nScience Fiction\n",
        ),
        4,
        5,
    )
    .await
    .unwrap();

    assert_eq!(login.hits(), 20);
    assert_eq!(books.hits(), 20);
    let genre = outcome.checks.count(Check::BookContainsGenre).unwrap();
    assert_eq!((genre.passes, genre.fails), (20, 0));
    let aggregate = outcome.requests.aggregate();
    assert_eq!(aggregate.count(), 40);
    assert!(outcome.passed());
}
