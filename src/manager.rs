//! Row-level CRUD over SQL, plus cached schema introspection.
//!
//! `DatabaseManager` owns the connection pool, a per-table cache of column
//! metadata, and the per-table id counters. It is built once from configuration
//! at the application's composition root and shared from there; nothing in it is
//! process-global.
//!
//! Schema metadata is read once per table with `PRAGMA table_info` and cached for
//! the life of the process; a schema change requires a restart to be noticed.
//!
//! Id assignment is a process-local high-water mark: the counter for a table is
//! seeded from `SELECT MAX(pk)` on first use and incremented in memory after
//! that. Within one process the issued ids are strictly increasing and never
//! repeat. Two processes writing the same table WILL collide; deployments that
//! need that must move id assignment into the database itself.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use itertools::Itertools;
use rusqlite::Connection;
use tracing::debug;

use crate::codec;
use crate::column::ColumnInfo;
use crate::config::Config;
use crate::driver::{self, Props};
use crate::pool::{Pool, PoolStatus, PooledConnection};
use crate::row::{self, TableRow};
use crate::rows::TableRowIterator;
use crate::script;
use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Pool(#[from] crate::pool::Error),
    #[error(transparent)]
    Driver(#[from] driver::Error),
    #[error(transparent)]
    Codec(#[from] codec::Error),
    #[error(transparent)]
    Row(#[from] row::Error),
    #[error("Table {0} does not exist.")]
    UnknownTable(String),
    #[error("Table {0} has no primary key column.")]
    NoPrimaryKey(String),
    #[error("Column {table}.{column} has unsupported declared type {declared:?}.")]
    UnsupportedColumnType {
        table: String,
        column: String,
        declared: String,
    },
    #[error("Column {column} holds a {actual} value but is declared {expected}.")]
    ColumnTypeMismatch {
        column: String,
        expected: SqlType,
        actual: SqlType,
    },
    #[error("The row does not belong to a table.")]
    RowHasNoTable,
    #[error("The primary key of the {0} row is null.")]
    NullPrimaryKey(String),
}

/// The canonical form of a table name.
pub fn canonicalize(table: &str) -> String {
    table.to_lowercase()
}

pub struct DatabaseManager {
    pool: Pool,
    props: Props,
    db_url: String,
    info: Mutex<HashMap<String, Vec<ColumnInfo>>>,
    ids: Mutex<HashMap<String, i64>>,
}

impl DatabaseManager {
    pub fn new(cfg: Config) -> Result<DatabaseManager, Error> {
        let props = Props {
            username: cfg.db.username.clone(),
            password: cfg.db.password.clone(),
        };
        let pool = Pool::new(cfg.pool, props.clone())?;
        Ok(DatabaseManager {
            pool,
            props,
            db_url: cfg.db.url,
            info: Mutex::new(HashMap::new()),
            ids: Mutex::new(HashMap::new()),
        })
    }

    /// Checks a connection out of the pool for callers that need to run several
    /// statements against one connection.
    pub fn connection(&self) -> Result<PooledConnection, Error> {
        Ok(self.pool.acquire()?)
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    ////////////////////////////////////////
    // Queries
    ////////////////////////////////////////

    /// Runs a query and maps the results. When `table` is given, result columns
    /// are decoded using that table's declared column types; otherwise they are
    /// classified by storage class alone.
    pub fn query(
        &self,
        table: Option<&str>,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<TableRowIterator, Error> {
        let conn = self.pool.acquire()?;
        self.run_query(&conn, table, sql, params)
    }

    /// The single row result of the query, or `None`. If more than one row
    /// results, only the first is returned.
    pub fn query_single(
        &self,
        table: Option<&str>,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<TableRow>, Error> {
        let it = self.query(table, sql, params)?;
        Ok(it.into_vec().into_iter().next())
    }

    /// Runs an insert, update or delete statement, returning the number of rows
    /// affected.
    pub fn update_query(&self, sql: &str, params: &[SqlValue]) -> Result<usize, Error> {
        let conn = self.pool.acquire()?;
        debug!(sql, "running update");
        let bound: Vec<_> = params.iter().map(codec::encode).collect();
        let mut stmt = conn.prepare(sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter(bound))?)
    }

    ////////////////////////////////////////
    // Row-level CRUD
    ////////////////////////////////////////

    /// Creates a new row in the table, assigns it a fresh primary key, and
    /// inserts it.
    pub fn create(&self, table: &str) -> Result<TableRow, Error> {
        let table = canonicalize(table);
        let conn = self.pool.acquire()?;
        let names = self
            .column_info_on(&conn, &table)?
            .iter()
            .map(|c| String::from(c.name()))
            .collect();
        let mut row = TableRow::new(&table, names);
        self.insert_on(&conn, &mut row)?;
        Ok(row)
    }

    /// Finds a row by its primary key.
    pub fn find(&self, table: &str, id: i64) -> Result<Option<TableRow>, Error> {
        let table = canonicalize(table);
        let conn = self.pool.acquire()?;
        let pk = self.primary_key_info_on(&conn, &table)?;
        self.find_by_unique_on(&conn, &table, pk.name(), &SqlValue::Int(id))
    }

    /// Finds a row by a unique column value. If multiple rows match, one is
    /// returned.
    pub fn find_by_unique(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<Option<TableRow>, Error> {
        let table = canonicalize(table);
        let conn = self.pool.acquire()?;
        self.find_by_unique_on(&conn, &table, column, value)
    }

    /// Inserts the row, assigning its primary key first.
    pub fn insert(&self, row: &mut TableRow) -> Result<(), Error> {
        let conn = self.pool.acquire()?;
        self.insert_on(&conn, row)
    }

    /// Writes every non-key column of the row back to the table. Returns the
    /// number of rows affected (1 or 0). If the update fails the values in the
    /// row are not reverted.
    pub fn update(&self, row: &TableRow) -> Result<usize, Error> {
        let table = canonicalize(row.table().ok_or(Error::RowHasNoTable)?);
        let conn = self.pool.acquire()?;
        let info = self.column_info_on(&conn, &table)?;
        let pk = primary_key_of(&info, &table)?.clone();
        let non_pk: Vec<ColumnInfo> = info.into_iter().filter(|c| !c.is_primary_key()).collect();
        let assignments = non_pk.iter().map(|c| format!("{} = ?", c.name())).join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table,
            assignments,
            pk.name()
        );
        let mut columns = non_pk;
        columns.push(pk);
        self.execute_bound(&conn, &sql, &columns, row)
    }

    /// Deletes a row by primary key. Returns the number of rows deleted.
    pub fn delete(&self, table: &str, id: i64) -> Result<usize, Error> {
        let table = canonicalize(table);
        let conn = self.pool.acquire()?;
        let pk = self.primary_key_info_on(&conn, &table)?;
        self.delete_by_value_on(&conn, &table, pk.name(), &SqlValue::Int(id))
    }

    /// Deletes all rows with the given column value. Returns the number of rows
    /// deleted.
    pub fn delete_by_value(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<usize, Error> {
        let table = canonicalize(table);
        let conn = self.pool.acquire()?;
        self.delete_by_value_on(&conn, &table, column, value)
    }

    /// Deletes the row via its primary key.
    pub fn delete_row(&self, row: &TableRow) -> Result<usize, Error> {
        let table = canonicalize(row.table().ok_or(Error::RowHasNoTable)?);
        let conn = self.pool.acquire()?;
        let pk = self.primary_key_info_on(&conn, &table)?;
        match row.int_column(pk.name()) {
            Some(id) => self.delete_by_value_on(&conn, &table, pk.name(), &SqlValue::Int(id)),
            None => Err(Error::NullPrimaryKey(table)),
        }
    }

    ////////////////////////////////////////
    // Schema metadata
    ////////////////////////////////////////

    /// Metadata for every column of the table, cached for the process lifetime.
    pub fn column_info(&self, table: &str) -> Result<Vec<ColumnInfo>, Error> {
        let table = canonicalize(table);
        let conn = self.pool.acquire()?;
        self.column_info_on(&conn, &table)
    }

    /// The names of all columns of the table.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .column_info(table)?
            .iter()
            .map(|c| String::from(c.name()))
            .collect())
    }

    /// The name of the table's primary key column.
    pub fn primary_key_column(&self, table: &str) -> Result<String, Error> {
        let table = canonicalize(table);
        let conn = self.pool.acquire()?;
        Ok(String::from(
            self.primary_key_info_on(&conn, &table)?.name(),
        ))
    }

    ////////////////////////////////////////
    // Script loading
    ////////////////////////////////////////

    /// Loads an SQL schema script, best effort, and returns how many statements
    /// were applied. Runs on a pooled connection when the configured database
    /// URL routes to the pool, and on a direct driver connection otherwise.
    pub fn load_script(&self, sql: &str) -> Result<usize, Error> {
        if Pool::accepts_url(&self.db_url) {
            let conn = self.pool.acquire()?;
            Ok(script::load_sql(&conn, sql))
        } else {
            let conn = driver::connect(&self.db_url, &self.props)?;
            Ok(script::load_sql(&conn, sql))
        }
    }

    ////////////////////////////////////////
    // Internals
    ////////////////////////////////////////

    fn run_query(
        &self,
        conn: &Connection,
        table: Option<&str>,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<TableRowIterator, Error> {
        debug!(sql, "running query");
        let table = table.map(canonicalize);
        let types: Option<HashMap<String, SqlType>> = match &table {
            Some(t) => Some(
                self.column_info_on(conn, t)?
                    .iter()
                    .map(|c| (String::from(c.name()), c.sql_type()))
                    .collect(),
            ),
            None => None,
        };
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| String::from(*s)).collect();
        let bound: Vec<_> = params.iter().map(codec::encode).collect();
        let mut raw = stmt.query(rusqlite::params_from_iter(bound))?;
        let mut out = Vec::new();
        while let Some(r) = raw.next()? {
            let mut row = match &table {
                Some(t) => TableRow::new(t, names.clone()),
                None => TableRow::anonymous(names.clone()),
            };
            for (i, name) in names.iter().enumerate() {
                let value = match types.as_ref().and_then(|m| m.get(name)) {
                    Some(ty) => codec::decode(r.get_ref(i)?, *ty)?,
                    None => codec::decode_untyped(r.get_ref(i)?)?,
                };
                row.set(name, value)?;
            }
            out.push(row);
        }
        Ok(TableRowIterator::new(out))
    }

    fn find_by_unique_on(
        &self,
        conn: &Connection,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<Option<TableRow>, Error> {
        let sql = format!("SELECT * FROM {} WHERE {} = ?", table, column);
        let it = self.run_query(conn, Some(table), &sql, std::slice::from_ref(value))?;
        Ok(it.into_vec().into_iter().next())
    }

    fn delete_by_value_on(
        &self,
        conn: &Connection,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<usize, Error> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", table, column);
        debug!(sql = sql.as_str(), "running update");
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter([codec::encode(value)]))?)
    }

    fn insert_on(&self, conn: &Connection, row: &mut TableRow) -> Result<(), Error> {
        let table = canonicalize(row.table().ok_or(Error::RowHasNoTable)?);
        let info = self.column_info_on(conn, &table)?;
        let pk = primary_key_of(&info, &table)?;
        let id = self.assign_id(conn, &table, pk.name())?;
        row.set_int(pk.name(), id)?;
        let columns = info.iter().map(|c| c.name()).join(", ");
        let placeholders = info.iter().map(|_| "?").join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table, columns, placeholders
        );
        self.execute_bound(conn, &sql, &info, row)?;
        Ok(())
    }

    /// Executes `sql` with one parameter per entry of `columns`, bound from the
    /// row's values in order. A value whose type does not match its column's
    /// declared type is a programmer error and is rejected.
    fn execute_bound(
        &self,
        conn: &Connection,
        sql: &str,
        columns: &[ColumnInfo],
        row: &TableRow,
    ) -> Result<usize, Error> {
        debug!(sql, "running update");
        let mut bound = Vec::with_capacity(columns.len());
        for c in columns {
            let value = row.get(c.name()).unwrap_or(&SqlValue::Null);
            if let Some(actual) = value.sql_type() {
                if actual != c.sql_type() {
                    return Err(Error::ColumnTypeMismatch {
                        column: String::from(c.name()),
                        expected: c.sql_type(),
                        actual,
                    });
                }
            }
            bound.push(codec::encode(value));
        }
        let mut stmt = conn.prepare(sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter(bound))?)
    }

    /// Issues the next primary key for the table: strictly increasing within
    /// this process, seeded once from the current maximum in the table.
    fn assign_id(&self, conn: &Connection, table: &str, pk: &str) -> Result<i64, Error> {
        let mut ids = self.ids.lock().expect("id counter poisoned");
        let next = match ids.get(table) {
            Some(hwm) => hwm + 1,
            None => {
                let sql = format!("SELECT MAX({}) FROM {}", pk, table);
                let max: Option<i64> = conn.query_row(&sql, [], |r| r.get(0))?;
                max.unwrap_or(0) + 1
            }
        };
        ids.insert(String::from(table), next);
        Ok(next)
    }

    fn column_info_on(&self, conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, Error> {
        {
            let cache = self.info.lock().expect("column info cache poisoned");
            if let Some(info) = cache.get(table) {
                return Ok(info.clone());
            }
        }
        let info = retrieve_column_info(conn, table)?;
        let mut cache = self.info.lock().expect("column info cache poisoned");
        Ok(cache.entry(String::from(table)).or_insert(info).clone())
    }

    fn primary_key_info_on(&self, conn: &Connection, table: &str) -> Result<ColumnInfo, Error> {
        let info = self.column_info_on(conn, table)?;
        Ok(primary_key_of(&info, table)?.clone())
    }
}

/// The first primary key column of the table. Tables are assumed to have a
/// single-column key; with a composite key only the first column is used.
fn primary_key_of<'a>(info: &'a [ColumnInfo], table: &str) -> Result<&'a ColumnInfo, Error> {
    info.iter()
        .find(|c| c.is_primary_key())
        .ok_or_else(|| Error::NoPrimaryKey(String::from(table)))
}

fn retrieve_column_info(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, Error> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let name: String = r.get("name")?;
        let declared: String = r.get("type")?;
        let pk: i64 = r.get("pk")?;
        let ty = SqlType::from_str(&declared).map_err(|_| Error::UnsupportedColumnType {
            table: String::from(table),
            column: name.clone(),
            declared,
        })?;
        out.push(ColumnInfo::new(&name, ty, pk > 0));
    }
    if out.is_empty() {
        return Err(Error::UnknownTable(String::from(table)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::config::{DbConfig, PoolConfig};

    const SCHEMA: &str = "\
CREATE TABLE item (
  item_id integer PRIMARY KEY,
  title varchar(64),
  active boolean,
  created timestamp
);
";

    // A single-connection pool over one in-memory database: every operation
    // reuses the same physical connection, so state is shared across calls.
    fn test_manager() -> DatabaseManager {
        let cfg = Config {
            db: DbConfig::default(),
            pool: PoolConfig {
                url: String::from("sqlite::memory:"),
                max_connections: 1,
                retry_wait_ms: 5,
                max_attempts: 2,
            },
        };
        let m = DatabaseManager::new(cfg).expect("manager should build");
        m.load_script(SCHEMA).expect("schema should load");
        m
    }

    #[test]
    fn create_issues_strictly_increasing_ids() {
        let m = test_manager();
        let a = m.create("item").unwrap();
        let b = m.create("item").unwrap();
        let c = m.create("item").unwrap();
        assert_eq!(a.int_column("item_id"), Some(1));
        assert_eq!(b.int_column("item_id"), Some(2));
        assert_eq!(c.int_column("item_id"), Some(3));
    }

    #[test]
    fn id_counter_seeds_from_existing_rows() {
        let m = test_manager();
        m.update_query(
            "INSERT INTO item (item_id, title) VALUES (10, 'seeded')",
            &[],
        )
        .unwrap();
        let row = m.create("item").unwrap();
        assert_eq!(row.int_column("item_id"), Some(11));
    }

    #[test]
    fn insert_then_find_round_trips_all_column_types() {
        let m = test_manager();
        let mut row = m.create("item").unwrap();
        let created = NaiveDate::from_ymd_opt(2014, 7, 1)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap();
        row.set_text("title", "archive record").unwrap();
        row.set_bool("active", true).unwrap();
        row.set_timestamp("created", created).unwrap();
        m.update(&row).unwrap();

        let id = row.int_column("item_id").unwrap();
        let found = m.find("item", id).unwrap().expect("row should exist");
        assert_eq!(found, row);
        assert_eq!(found.text_column("title"), Some("archive record"));
        assert_eq!(found.bool_column("active"), Some(true));
        assert_eq!(found.timestamp_column("created"), Some(created));
    }

    #[test]
    fn find_missing_row_returns_none() {
        let m = test_manager();
        assert!(m.find("item", 999).unwrap().is_none());
    }

    #[test]
    fn find_by_unique_matches_column_value() {
        let m = test_manager();
        let mut row = m.create("item").unwrap();
        row.set_text("title", "unique title").unwrap();
        m.update(&row).unwrap();
        let found = m
            .find_by_unique("item", "title", &SqlValue::from("unique title"))
            .unwrap()
            .expect("row should exist");
        assert_eq!(found.int_column("item_id"), row.int_column("item_id"));
        assert!(m
            .find_by_unique("item", "title", &SqlValue::from("no such"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_removes_the_row() {
        let m = test_manager();
        let row = m.create("item").unwrap();
        let id = row.int_column("item_id").unwrap();
        assert_eq!(m.delete("item", id).unwrap(), 1);
        assert!(m.find("item", id).unwrap().is_none());
        assert_eq!(m.delete("item", id).unwrap(), 0);
    }

    #[test]
    fn delete_row_requires_a_primary_key() {
        let m = test_manager();
        let names = m.column_names("item").unwrap();
        let row = TableRow::new("item", names);
        assert!(matches!(
            m.delete_row(&row),
            Err(Error::NullPrimaryKey(_))
        ));
    }

    #[test]
    fn update_rejects_mismatched_value_types() {
        let m = test_manager();
        let mut row = m.create("item").unwrap();
        row.set_int("title", 5).unwrap();
        assert!(matches!(
            m.update(&row),
            Err(Error::ColumnTypeMismatch { .. })
        ));
    }

    #[test]
    fn anonymous_query_classifies_by_storage_class() {
        let m = test_manager();
        m.create("item").unwrap();
        let row = m
            .query_single(None, "SELECT COUNT(*) AS n FROM item", &[])
            .unwrap()
            .expect("count row");
        assert!(row.table().is_none());
        assert_eq!(row.int_column("n"), Some(1));
    }

    #[test]
    fn column_metadata_is_introspected_and_cached() {
        let m = test_manager();
        let info = m.column_info("ITEM").unwrap();
        assert_eq!(info.len(), 4);
        assert_eq!(
            info[0],
            ColumnInfo::new("item_id", SqlType::Int, true)
        );
        assert_eq!(m.primary_key_column("item").unwrap(), "item_id");
        // Second lookup is served from the cache.
        let again = m.column_info("item").unwrap();
        assert_eq!(info, again);
    }

    #[test]
    fn unsupported_declared_type_is_reported() {
        let m = test_manager();
        m.load_script("CREATE TABLE bad (bad_id integer PRIMARY KEY, price real);")
            .unwrap();
        assert!(matches!(
            m.column_info("bad"),
            Err(Error::UnsupportedColumnType { .. })
        ));
    }

    #[test]
    fn unknown_table_is_reported() {
        let m = test_manager();
        assert!(matches!(
            m.column_info("nonexistent"),
            Err(Error::UnknownTable(_))
        ));
    }
}
