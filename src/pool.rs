//! A fixed-capacity connection pool with blocking, retrying acquisition.
//!
//! The pool hands out wrappers around physical connections, up to a configured
//! maximum. Returning a wrapper (by dropping it or calling `close`) parks the
//! physical connection for reuse; physical connections are never proactively
//! closed once opened. When the pool is full, an acquirer sleeps and rescans a
//! bounded number of times before failing, so the worst-case wait is
//! `max_attempts * retry_wait`.
//!
//! Every checkout and checkin takes one mutex over the slot list, serializing
//! acquisition process-wide. That is a deliberate simplification; this pool is
//! meant for a single-process deployment with modest connection counts, not as
//! a high-throughput scheduler.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::driver::{self, Driver, Props};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unable to obtain a connection after {attempts} attempts.")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Driver(#[from] driver::Error),
}

/// URL scheme that routes a caller to the pool instead of a concrete driver.
const POOL_SCHEME: &str = "pool:";

struct Slot {
    id: u32,
    /// The parked physical connection, or `None` while it is checked out.
    conn: Option<Connection>,
}

struct PoolInner {
    driver: Box<dyn Driver>,
    url: String,
    props: Props,
    cfg: PoolConfig,
    slots: Mutex<Vec<Slot>>,
}

impl PoolInner {
    fn lock_slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        // A panic while holding this short critical section leaves nothing to
        // salvage, so poisoning is treated as fatal.
        self.slots.lock().expect("pool slot list poisoned")
    }

    fn park(&self, id: u32, conn: Connection) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.iter_mut().find(|s| s.id == id) {
            debug!(id, "connection returned to pool");
            slot.conn = Some(conn);
        }
    }
}

/// A snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub free: usize,
    pub used: usize,
    pub max: usize,
}

#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Builds a pool over the driver registered for `cfg.url`.
    pub fn new(cfg: PoolConfig, props: Props) -> Result<Pool, Error> {
        let d = driver::driver_for(&cfg.url)
            .ok_or_else(|| driver::Error::NoDriver(cfg.url.clone()))?;
        Ok(Self::with_driver(cfg, props, d))
    }

    /// Builds a pool over an explicit driver, bypassing the registry.
    pub fn with_driver(cfg: PoolConfig, props: Props, d: Box<dyn Driver>) -> Pool {
        Pool {
            inner: Arc::new(PoolInner {
                driver: d,
                url: cfg.url.clone(),
                props,
                cfg,
                slots: Mutex::new(Vec::new()),
            }),
        }
    }

    /// True if the URL names the pool rather than a concrete driver.
    pub fn accepts_url(url: &str) -> bool {
        url.starts_with(POOL_SCHEME)
    }

    /// Checks out a connection, reusing a parked one when possible and opening
    /// a new physical connection while below capacity. At capacity, sleeps
    /// `retry_wait` between rescans and fails after `max_attempts` of them.
    pub fn acquire(&self) -> Result<PooledConnection, Error> {
        let mut attempts = 0u32;
        loop {
            {
                let mut slots = self.inner.lock_slots();
                for slot in slots.iter_mut() {
                    if let Some(conn) = slot.conn.take() {
                        debug!(id = slot.id, "reusing pooled connection");
                        return Ok(PooledConnection::new(self.inner.clone(), slot.id, conn));
                    }
                }
                if slots.len() < self.inner.cfg.max_connections {
                    let conn = self.inner.driver.connect(&self.inner.url, &self.inner.props)?;
                    let id = slots.len() as u32;
                    slots.push(Slot { id, conn: None });
                    debug!(id, "opened new physical connection");
                    return Ok(PooledConnection::new(self.inner.clone(), id, conn));
                }
            }
            attempts += 1;
            warn!(attempts, "no pooled connections available");
            if attempts >= self.inner.cfg.max_attempts {
                return Err(Error::Exhausted { attempts });
            }
            std::thread::sleep(self.inner.cfg.retry_wait());
        }
    }

    pub fn status(&self) -> PoolStatus {
        let slots = self.inner.lock_slots();
        let free = slots.iter().filter(|s| s.conn.is_some()).count();
        PoolStatus {
            size: slots.len(),
            free,
            used: slots.len() - free,
            max: self.inner.cfg.max_connections,
        }
    }
}

/// A checked-out connection. Dropping it (or calling `close`) returns the
/// physical connection to the pool; the physical connection itself stays open
/// for the life of the process.
///
/// Statements prepared through this wrapper borrow it, so a connection cannot
/// be recycled while a statement or row cursor built on it is still alive.
pub struct PooledConnection {
    inner: Arc<PoolInner>,
    id: u32,
    conn: Option<Connection>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("conn", &self.conn.is_some())
            .finish()
    }
}

impl PooledConnection {
    fn new(inner: Arc<PoolInner>, id: u32, conn: Connection) -> PooledConnection {
        PooledConnection {
            inner,
            id,
            conn: Some(conn),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the connection to the pool for reuse.
    pub fn close(self) {}

    /// Prepares a statement, logging the SQL text.
    pub fn prepare(&self, sql: &str) -> rusqlite::Result<rusqlite::Statement<'_>> {
        debug!(id = self.id, sql, "preparing statement");
        self.deref().prepare(sql)
    }

    /// Executes a statement that returns no rows, logging the SQL text.
    pub fn execute_sql<P: rusqlite::Params>(&self, sql: &str, params: P) -> rusqlite::Result<usize> {
        debug!(id = self.id, sql, "executing update");
        self.deref().execute(sql, params)
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.inner.park(self.id, conn);
        }
    }
}
