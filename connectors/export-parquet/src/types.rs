//! PostgreSQL -> Arrow type mapping for exported columns.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

/// Exported column with its PostgreSQL origin and Arrow target.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportColumn {
    pub name: String,
    pub pg_type: String,
    pub arrow_type: DataType,
    pub nullable: bool,
    /// The SELECT reads this column as `col::text`.
    pub needs_cast: bool,
}

impl ExportColumn {
    #[must_use]
    pub fn new(name: &str, pg_type: &str, nullable: bool) -> Self {
        let (arrow_type, needs_cast) = resolve(pg_type);
        Self {
            name: name.to_string(),
            pg_type: pg_type.to_string(),
            arrow_type,
            nullable,
            needs_cast,
        }
    }
}

/// Resolve a `data_type` from `information_schema.columns`.
///
/// Types without a native decoder are read as text.
#[must_use]
pub fn resolve(pg_type: &str) -> (DataType, bool) {
    match pg_type {
        "smallint" | "int2" => (DataType::Int16, false),
        "integer" | "int4" => (DataType::Int32, false),
        "bigint" | "int8" => (DataType::Int64, false),
        "real" | "float4" => (DataType::Float32, false),
        "double precision" | "float8" => (DataType::Float64, false),
        "boolean" | "bool" => (DataType::Boolean, false),
        "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "name" => {
            (DataType::Utf8, false)
        }
        "date" => (DataType::Date32, false),
        "timestamp" | "timestamp without time zone" => {
            (DataType::Timestamp(TimeUnit::Microsecond, None), false)
        }
        "timestamp with time zone" | "timestamptz" => (
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        _ => (DataType::Utf8, true),
    }
}

#[must_use]
pub fn arrow_schema(columns: &[ExportColumn]) -> Arc<Schema> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(&c.name, c.arrow_type.clone(), c.nullable))
        .collect();
    Arc::new(Schema::new(fields))
}
