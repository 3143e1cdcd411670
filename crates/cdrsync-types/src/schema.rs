//! Destination table schema descriptors.
//!
//! A [`TableSchema`] is an ordered list of typed columns plus the merge key.
//! Every row handed to the destination is a `Vec<Option<String>>` in the
//! descriptor's column order, each value already in the canonical text form
//! of its [`ColumnType`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Auxiliary last-write timestamp column present on every destination table.
pub const INSERTED_AT_COLUMN: &str = "inserted_at";

/// Merge key column of the call table.
pub const CALL_KEY_COLUMN: &str = "unique_key";

/// Maximum identifier length accepted by PostgreSQL.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Logical type of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Integer,
    Date,
    Timestamp,
}

impl ColumnType {
    /// PostgreSQL type used for this column in DDL and casts.
    #[must_use]
    pub fn pg_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "BIGINT",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// One named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered column layout of a destination table and its merge key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
    key_index: usize,
}

impl TableSchema {
    /// Build a descriptor, validating identifiers, uniqueness, and the key.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid column or key.
    pub fn new(columns: Vec<ColumnSpec>, key_column: &str) -> Result<Self, String> {
        if columns.is_empty() {
            return Err("schema must define at least one column".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for col in &columns {
            validate_identifier(&col.name)?;
            if col.name == INSERTED_AT_COLUMN {
                return Err(format!("column name '{INSERTED_AT_COLUMN}' is reserved"));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(format!("duplicate column '{}'", col.name));
            }
        }
        let key_index = columns
            .iter()
            .position(|c| c.name == key_column)
            .ok_or_else(|| format!("key column '{key_column}' is not part of the schema"))?;
        Ok(Self { columns, key_index })
    }

    /// All-text layout for raw passthrough when no descriptor is configured.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TableSchema::new`].
    pub fn wide_text<I, S>(names: I, key_column: &str) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = names
            .into_iter()
            .map(|n| ColumnSpec::new(n, ColumnType::Text))
            .collect();
        Self::new(columns, key_column)
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    #[must_use]
    pub fn key_column(&self) -> &str {
        &self.columns[self.key_index].name
    }

    #[must_use]
    pub fn key_index(&self) -> usize {
        self.key_index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Whether every column is `text`.
    #[must_use]
    pub fn is_wide_text(&self) -> bool {
        self.columns.iter().all(|c| c.column_type == ColumnType::Text)
    }
}

/// Fixed layout of the normalized call table.
#[must_use]
pub fn call_table_schema() -> TableSchema {
    use ColumnType::{Date, Integer, Text, Timestamp};
    let columns = vec![
        ColumnSpec::new("call_date", Date),
        ColumnSpec::new("call_hour", Text),
        ColumnSpec::new("call_timestamp", Timestamp),
        ColumnSpec::new("clid", Text),
        ColumnSpec::new("src", Text),
        ColumnSpec::new("dst", Text),
        ColumnSpec::new("dcontext", Text),
        ColumnSpec::new("channel", Text),
        ColumnSpec::new("dstchannel", Text),
        ColumnSpec::new("lastapp", Text),
        ColumnSpec::new("duration", Integer),
        ColumnSpec::new("disposition", Text),
        ColumnSpec::new("uniqueid", Text),
        ColumnSpec::new("calltype", Text),
        ColumnSpec::new(CALL_KEY_COLUMN, Text),
    ];
    let key_index = columns.len() - 1;
    TableSchema { columns, key_index }
}

/// PostgreSQL identifier validation for configured table and column names.
///
/// # Errors
///
/// Returns a message when the name is empty, too long, or not a plain
/// `[A-Za-z_][A-Za-z0-9_]*` identifier.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("identifier must not be empty".to_string());
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier '{}' exceeds PostgreSQL maximum length of {} bytes (got {})",
            name,
            MAX_IDENTIFIER_LEN,
            name.len()
        ));
    }

    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(format!(
                "identifier '{name}' must start with a letter or underscore"
            ));
        }
    }

    for ch in chars {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            return Err(format!("identifier '{name}' contains invalid character '{ch}'"));
        }
    }

    Ok(())
}
