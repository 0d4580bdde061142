//! Opening physical database connections by URL.
//!
//! A `Driver` turns a connection URL into a live `rusqlite::Connection`. Drivers are
//! a compile-time registry rather than anything loaded dynamically; the trait exists
//! so the pool can be handed an alternative implementation (tests inject a counting
//! driver to observe how many physical connections get opened).

use rusqlite::Connection;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No registered driver accepts the URL {0:?}.")]
    NoDriver(String),
    #[error("Unable to open database connection: {0}")]
    Open(#[from] rusqlite::Error),
}

/// Credentials passed through to the driver. The bundled SQLite driver has no use
/// for them, but the seam carries them so a server-backed driver could.
#[derive(Debug, Clone, Default)]
pub struct Props {
    pub username: Option<String>,
    pub password: Option<String>,
}

pub trait Driver: Send + Sync {
    /// True if this driver understands the URL scheme.
    fn accepts_url(&self, url: &str) -> bool;

    /// Opens a new physical connection. Callers are expected to check
    /// `accepts_url` first; drivers may fail on a foreign URL.
    fn connect(&self, url: &str, props: &Props) -> Result<Connection, Error>;
}

/// Driver for `sqlite:` URLs. `sqlite::memory:` (or a bare `sqlite:`) opens a
/// private in-memory database; anything else names a file path.
pub struct SqliteDriver;

const SQLITE_SCHEME: &str = "sqlite:";

impl Driver for SqliteDriver {
    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(SQLITE_SCHEME)
    }

    fn connect(&self, url: &str, _props: &Props) -> Result<Connection, Error> {
        let rest = url
            .strip_prefix(SQLITE_SCHEME)
            .ok_or_else(|| Error::NoDriver(String::from(url)))?;
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        debug!(url, "opening sqlite connection");
        let conn = if rest.is_empty() || rest == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(rest)?
        };
        // Concurrent pooled connections against one file otherwise fail fast
        // with SQLITE_BUSY.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }
}

lazy_static::lazy_static! {
    static ref DRIVERS: Vec<Box<dyn Driver>> = vec![Box::new(SqliteDriver)];
}

/// Opens a connection through whichever registered driver accepts the URL.
pub fn connect(url: &str, props: &Props) -> Result<Connection, Error> {
    match DRIVERS.iter().find(|d| d.accepts_url(url)) {
        Some(driver) => driver.connect(url, props),
        None => Err(Error::NoDriver(String::from(url))),
    }
}

/// The registered driver for a URL, as an owned handle the pool can keep.
pub fn driver_for(url: &str) -> Option<Box<dyn Driver>> {
    if SqliteDriver.accepts_url(url) {
        Some(Box::new(SqliteDriver))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_scheme_is_routed() {
        assert!(SqliteDriver.accepts_url("sqlite::memory:"));
        assert!(SqliteDriver.accepts_url("sqlite:/tmp/x.db"));
        assert!(!SqliteDriver.accepts_url("postgres://x"));
    }

    #[test]
    fn connect_in_memory() {
        let conn = connect("sqlite::memory:", &Props::default()).unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |r| r.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        let err = connect("oracle:thin", &Props::default()).unwrap_err();
        assert!(matches!(err, Error::NoDriver(_)));
    }
}
