//! Conversion between `SqlValue` and the storage classes SQLite actually keeps on disk.
//!
//! SQLite stores only NULL, INTEGER, REAL, TEXT and BLOB. Booleans travel as
//! INTEGER 0/1, and dates, times and timestamps travel as TEXT in fixed formats.
//! Decoding therefore needs the declared column type to recover the intended
//! value; without one, only the storage class is available and only integer,
//! text and NULL results can be classified. REAL and BLOB are unsupported
//! everywhere and are reported as errors rather than silently coerced.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{Value, ValueRef};

use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
// Some writers use the T separator; accept it when decoding.
const TIMESTAMP_FORMAT_T: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unsupported storage class {0} in result column.")]
    UnsupportedStorageClass(&'static str),
    #[error("Column of type {expected} holds a {found} storage class value.")]
    StorageClassMismatch {
        expected: SqlType,
        found: &'static str,
    },
    #[error("Unable to parse {text:?} as a {expected} value.")]
    Parse { expected: SqlType, text: String },
    #[error("Result column text is not valid UTF-8.")]
    InvalidText(#[from] std::str::Utf8Error),
}

fn storage_class(v: &ValueRef) -> &'static str {
    match v {
        ValueRef::Null => "NULL",
        ValueRef::Integer(_) => "INTEGER",
        ValueRef::Real(_) => "REAL",
        ValueRef::Text(_) => "TEXT",
        ValueRef::Blob(_) => "BLOB",
    }
}

fn text_of(v: ValueRef, expected: SqlType) -> Result<String, Error> {
    match v {
        ValueRef::Text(bytes) => Ok(String::from(std::str::from_utf8(bytes)?)),
        ValueRef::Real(_) | ValueRef::Blob(_) => {
            Err(Error::UnsupportedStorageClass(storage_class(&v)))
        }
        other => Err(Error::StorageClassMismatch {
            expected,
            found: storage_class(&other),
        }),
    }
}

/// Decodes a raw column value according to the column's declared type.
pub fn decode(v: ValueRef, ty: SqlType) -> Result<SqlValue, Error> {
    if let ValueRef::Null = v {
        return Ok(SqlValue::Null);
    }
    match ty {
        SqlType::Bool => match v {
            ValueRef::Integer(i) => Ok(SqlValue::Bool(i != 0)),
            other => Err(Error::StorageClassMismatch {
                expected: ty,
                found: storage_class(&other),
            }),
        },
        SqlType::Int => match v {
            ValueRef::Integer(i) => Ok(SqlValue::Int(i)),
            other => Err(Error::StorageClassMismatch {
                expected: ty,
                found: storage_class(&other),
            }),
        },
        SqlType::Text => Ok(SqlValue::Text(text_of(v, ty)?)),
        SqlType::Date => {
            let text = text_of(v, ty)?;
            NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .map(SqlValue::Date)
                .map_err(|_| Error::Parse {
                    expected: ty,
                    text,
                })
        }
        SqlType::Time => {
            let text = text_of(v, ty)?;
            NaiveTime::parse_from_str(&text, TIME_FORMAT)
                .map(SqlValue::Time)
                .map_err(|_| Error::Parse {
                    expected: ty,
                    text,
                })
        }
        SqlType::Timestamp => {
            let text = text_of(v, ty)?;
            NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT_T))
                .map(SqlValue::Timestamp)
                .map_err(|_| Error::Parse {
                    expected: ty,
                    text,
                })
        }
    }
}

/// Decodes a raw column value with no declared type available, as happens for
/// computed columns in ad-hoc queries. Classification is by storage class alone.
pub fn decode_untyped(v: ValueRef) -> Result<SqlValue, Error> {
    match v {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(i) => Ok(SqlValue::Int(i)),
        ValueRef::Text(bytes) => Ok(SqlValue::Text(String::from(std::str::from_utf8(bytes)?))),
        other => Err(Error::UnsupportedStorageClass(storage_class(&other))),
    }
}

/// Encodes a value for binding to a statement parameter.
pub fn encode(v: &SqlValue) -> Value {
    match v {
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Date(d) => Value::Text(d.format(DATE_FORMAT).to_string()),
        SqlValue::Time(t) => Value::Text(t.format(TIME_FORMAT).to_string()),
        SqlValue::Timestamp(ts) => Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        SqlValue::Null => Value::Null,
    }
}
