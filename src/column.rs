//! Describes one column of a database table.

use crate::sql_type::SqlType;

/// Metadata for a single table column: its name, its declared type, and whether
/// it is the table's primary key. Two `ColumnInfo` values are equal exactly when
/// all three fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnInfo {
    name: String,
    sql_type: SqlType,
    primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: &str, sql_type: SqlType, primary_key: bool) -> ColumnInfo {
        ColumnInfo {
            name: String::from(name),
            sql_type,
            primary_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}
