//! CSV fixtures that parameterise every request.
//!
//! Both fixtures are read once, before the attack starts, and are then shared
//! read-only by every [`GooseUser`](goose::goose::GooseUser) through an `Arc`.
//! A fixture without data rows, or without the columns the load test needs, is
//! rejected up front so users never select from an empty pool.

use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::LoadTestError;

/// Credentials used to log in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
}

/// A book from the catalog; only the genre drives requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookRecord {
    pub genre: String,
    /// All other columns of the row, by header name.
    pub details: BTreeMap<String, String>,
}

/// Immutable snapshot of both fixtures. Both collections are guaranteed non-empty.
#[derive(Clone, Debug)]
pub struct Fixtures {
    users: Arc<[UserRecord]>,
    books: Arc<[BookRecord]>,
}

impl Fixtures {
    /// Load both fixtures from disk.
    pub fn load(users_csv: &Path, books_csv: &Path) -> Result<Self, LoadTestError> {
        let users = read_users(&users_csv.display().to_string(), File::open(users_csv)?)?;
        let books = read_books(&books_csv.display().to_string(), File::open(books_csv)?)?;
        info!(
            "loaded {} users from {} and {} books from {}",
            users.len(),
            users_csv.display(),
            books.len(),
            books_csv.display()
        );
        Ok(Fixtures {
            users: users.into(),
            books: books.into(),
        })
    }

    /// Load both fixtures from any readers, ie in-memory CSV.
    pub fn from_readers<U: io::Read, B: io::Read>(users: U, books: B) -> Result<Self, LoadTestError> {
        Ok(Fixtures {
            users: read_users("users", users)?.into(),
            books: read_books("books", books)?.into(),
        })
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    pub fn books(&self) -> &[BookRecord] {
        &self.books
    }

    /// Pick one user and one book, uniformly and with replacement.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> (&UserRecord, &BookRecord) {
        let user = &self.users[rng.random_range(0..self.users.len())];
        let book = &self.books[rng.random_range(0..self.books.len())];
        (user, book)
    }
}

fn read_users<R: io::Read>(source: &str, reader: R) -> Result<Vec<UserRecord>, LoadTestError> {
    read_rows(source, reader, &["username", "password"])?
        .into_iter()
        .map(|mut row| {
            Ok(UserRecord {
                username: take_column(source, &mut row, "username")?,
                password: take_column(source, &mut row, "password")?,
            })
        })
        .collect()
}

fn read_books<R: io::Read>(source: &str, reader: R) -> Result<Vec<BookRecord>, LoadTestError> {
    read_rows(source, reader, &["genre"])?
        .into_iter()
        .map(|mut row| {
            let genre = take_column(source, &mut row, "genre")?;
            Ok(BookRecord {
                genre,
                details: row.into_iter().collect(),
            })
        })
        .collect()
}

/// Read every data row as a header-name to value map.
fn read_rows<R: io::Read>(
    source: &str,
    reader: R,
    required: &[&str],
) -> Result<Vec<HashMap<String, String>>, LoadTestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if let Some(missing) = required
        .iter()
        .find(|column| !headers.iter().any(|header| header == **column))
    {
        return Err(LoadTestError::MissingColumn {
            source: source.to_string(),
            column: missing.to_string(),
        });
    }

    let rows = reader
        .deserialize::<HashMap<String, String>>()
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Err(LoadTestError::EmptyFixture {
            source: source.to_string(),
        });
    }
    debug!("read {} rows from {}", rows.len(), source);
    Ok(rows)
}

fn take_column(
    source: &str,
    row: &mut HashMap<String, String>,
    column: &str,
) -> Result<String, LoadTestError> {
    row.remove(column).ok_or_else(|| LoadTestError::MissingColumn {
        source: source.to_string(),
        column: column.to_string(),
    })
}
