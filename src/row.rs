//! Provides the generic row value holder used by query results and by row-level writes.
//!
//! A row is an ordered mapping from column name to a nullable `SqlValue`. A row built
//! for a table carries that table's name and column set; a row built from an ad-hoc
//! query carries whatever columns the statement produced. Setting a column that the
//! row does not have is an error. SQL NULL is represented as `SqlValue::Null`, so
//! typed getters return `None` both for NULL and for an absent column.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::sql_value::SqlValue;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("The row has no column named {0}.")]
    NoSuchColumn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    table: Option<String>,
    columns: Vec<String>,
    values: HashMap<String, SqlValue>,
}

impl TableRow {
    /// A row belonging to `table`, with every column initially NULL.
    pub fn new(table: &str, columns: Vec<String>) -> TableRow {
        let values = columns
            .iter()
            .map(|c| (c.clone(), SqlValue::Null))
            .collect();
        TableRow {
            table: Some(String::from(table)),
            columns,
            values,
        }
    }

    /// A row with no owning table, as produced by ad-hoc queries.
    pub fn anonymous(columns: Vec<String>) -> TableRow {
        let values = columns
            .iter()
            .map(|c| (c.clone(), SqlValue::Null))
            .collect();
        TableRow {
            table: None,
            columns,
            values,
        }
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// The stored value, or `None` if the row has no such column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// True when the column holds SQL NULL. A column the row does not have is
    /// reported as NULL as well, matching the typed getters.
    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.values.get(column), None | Some(SqlValue::Null))
    }

    pub fn set(&mut self, column: &str, value: SqlValue) -> Result<(), Error> {
        match self.values.get_mut(column) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::NoSuchColumn(String::from(column))),
        }
    }

    pub fn set_null(&mut self, column: &str) -> Result<(), Error> {
        self.set(column, SqlValue::Null)
    }

    pub fn set_bool(&mut self, column: &str, v: bool) -> Result<(), Error> {
        self.set(column, SqlValue::Bool(v))
    }

    pub fn set_int(&mut self, column: &str, v: i64) -> Result<(), Error> {
        self.set(column, SqlValue::Int(v))
    }

    pub fn set_text(&mut self, column: &str, v: &str) -> Result<(), Error> {
        self.set(column, SqlValue::Text(String::from(v)))
    }

    pub fn set_date(&mut self, column: &str, v: NaiveDate) -> Result<(), Error> {
        self.set(column, SqlValue::Date(v))
    }

    pub fn set_time(&mut self, column: &str, v: NaiveTime) -> Result<(), Error> {
        self.set(column, SqlValue::Time(v))
    }

    pub fn set_timestamp(&mut self, column: &str, v: NaiveDateTime) -> Result<(), Error> {
        self.set(column, SqlValue::Timestamp(v))
    }

    pub fn bool_column(&self, column: &str) -> Option<bool> {
        match self.values.get(column) {
            Some(SqlValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn int_column(&self, column: &str) -> Option<i64> {
        match self.values.get(column) {
            Some(SqlValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text_column(&self, column: &str) -> Option<&str> {
        match self.values.get(column) {
            Some(SqlValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn date_column(&self, column: &str) -> Option<NaiveDate> {
        match self.values.get(column) {
            Some(SqlValue::Date(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn time_column(&self, column: &str) -> Option<NaiveTime> {
        match self.values.get(column) {
            Some(SqlValue::Time(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn timestamp_column(&self, column: &str) -> Option<NaiveDateTime> {
        match self.values.get(column) {
            Some(SqlValue::Timestamp(v)) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for TableRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{}: ", table)?;
        }
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.values.get(c) {
                Some(v) => write!(f, "{}={}", c, v)?,
                None => write!(f, "{}=?", c)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> TableRow {
        TableRow::new(
            "item",
            vec![String::from("item_id"), String::from("title")],
        )
    }

    #[test]
    fn columns_start_null() {
        let r = row();
        assert!(r.is_null("item_id"));
        assert!(r.is_null("title"));
        assert_eq!(r.int_column("item_id"), None);
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut r = row();
        r.set_int("item_id", 42).unwrap();
        r.set_text("title", "first").unwrap();
        assert_eq!(r.int_column("item_id"), Some(42));
        assert_eq!(r.text_column("title"), Some("first"));
        assert!(!r.is_null("item_id"));
        r.set_null("title").unwrap();
        assert!(r.is_null("title"));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let mut r = row();
        assert_eq!(
            r.set_int("missing", 1),
            Err(Error::NoSuchColumn(String::from("missing")))
        );
        assert_eq!(r.get("missing"), None);
    }

    #[test]
    fn getter_with_wrong_type_returns_none() {
        let mut r = row();
        r.set_text("title", "x").unwrap();
        assert_eq!(r.int_column("title"), None);
    }
}
