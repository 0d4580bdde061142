//! Defines an enum of the supported column types and routines for conversion from declared SQL type names.
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// These are the column types a table may declare and a row value may carry.
/// Notes:
///   - Booleans are stored as integer 0/1 by SQLite; the declared type keeps them distinct.
///   - Declared type aliases like `varchar(64)` for `text` are accepted in schemas, with
///     any length suffix ignored.
///   - Real, blob and array columns are deliberately not supported.
pub enum SqlType {
    Bool,
    Int,
    Text,
    Date,
    Time,
    Timestamp,
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Bool => "boolean".fmt(f),
            SqlType::Int => "integer".fmt(f),
            SqlType::Text => "text".fmt(f),
            SqlType::Date => "date".fmt(f),
            SqlType::Time => "time".fmt(f),
            SqlType::Timestamp => "timestamp".fmt(f),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unsupported declared column type: {0}.")]
    UnsupportedDeclaredType(String),
}

impl FromStr for SqlType {
    type Err = Error;

    /// Parses a declared column type as it appears in a CREATE TABLE statement or in
    /// `PRAGMA table_info` output. Length suffixes (`varchar(64)`) and trailing
    /// qualifiers (`timestamp with time zone`) are stripped before matching.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let base = s
            .split(|c| c == '(' || c == ' ')
            .next()
            .unwrap_or("")
            .to_lowercase();
        match base.as_str() {
            "bool" | "boolean" | "bit" => Ok(SqlType::Bool),
            "int" | "integer" | "int4" | "serial" => Ok(SqlType::Int),
            "text" | "string" | "varchar" | "char" => Ok(SqlType::Text),
            "date" => Ok(SqlType::Date),
            "time" => Ok(SqlType::Time),
            "timestamp" | "datetime" => Ok(SqlType::Timestamp),
            _ => Err(Error::UnsupportedDeclaredType(String::from(s))),
        }
    }
}

#[test]
fn test_from_str_aliases() {
    assert_eq!(SqlType::from_str("INTEGER"), Ok(SqlType::Int));
    assert_eq!(SqlType::from_str("varchar(64)"), Ok(SqlType::Text));
    assert_eq!(SqlType::from_str("BIT"), Ok(SqlType::Bool));
    assert_eq!(
        SqlType::from_str("timestamp with time zone"),
        Ok(SqlType::Timestamp)
    );
    assert_eq!(SqlType::from_str("datetime"), Ok(SqlType::Timestamp));
}

#[test]
fn test_from_str_rejects_unsupported() {
    assert!(SqlType::from_str("real").is_err());
    assert!(SqlType::from_str("blob").is_err());
    assert!(SqlType::from_str("numeric(10,2)").is_err());
}
