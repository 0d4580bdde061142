//! Defines an enum of all the possible values that a column can hold.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use enum_as_inner::EnumAsInner;

use crate::sql_type::SqlType;

#[derive(Debug, Clone, PartialEq, EnumAsInner)]
/// Can hold any value that can be stored in a table column, or `Null`.
/// The non-null variants correspond one to one with `sql_type::SqlType`.
pub enum SqlValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Null,
}

impl SqlValue {
    /// The column type this value belongs to, or `None` for `Null`, which is
    /// acceptable in a column of any type.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            SqlValue::Bool(_) => Some(SqlType::Bool),
            SqlValue::Int(_) => Some(SqlType::Int),
            SqlValue::Text(_) => Some(SqlType::Text),
            SqlValue::Date(_) => Some(SqlType::Date),
            SqlValue::Time(_) => Some(SqlType::Time),
            SqlValue::Timestamp(_) => Some(SqlType::Timestamp),
            SqlValue::Null => None,
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Bool(x) => x.fmt(f),
            SqlValue::Int(x) => x.fmt(f),
            SqlValue::Text(x) => x.fmt(f),
            SqlValue::Date(x) => x.fmt(f),
            SqlValue::Time(x) => x.fmt(f),
            SqlValue::Timestamp(x) => x.fmt(f),
            SqlValue::Null => "NULL".fmt(f),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(String::from(v))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

#[test]
fn test_sql_type_classification() {
    assert_eq!(SqlValue::Int(7).sql_type(), Some(SqlType::Int));
    assert_eq!(SqlValue::from("x").sql_type(), Some(SqlType::Text));
    assert_eq!(SqlValue::Null.sql_type(), None);
}
