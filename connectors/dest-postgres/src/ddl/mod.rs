//! DDL: first-run bootstrap, key-column migration, and staging tables.

mod staging;

use cdrsync_types::schema::INSERTED_AT_COLUMN;
use cdrsync_types::TableSchema;
use pg_escape::quote_identifier;
use tokio_postgres::Client;
use tracing::info;

use crate::client::{format_pg_error, Target};

pub use self::staging::{is_staging_table_for, staging_table_name, StagingKind};
pub(crate) use self::staging::{drop_staging, provision, sweep};

/// SQL expression that fills a newly added column on existing rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backfill {
    pub column: String,
    pub expression: String,
}

impl Backfill {
    pub fn new(column: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            expression: expression.into(),
        }
    }
}

pub(crate) fn create_table_sql(target: &Target, schema: &TableSchema) -> String {
    let mut defs: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.pg_type()))
        .collect();
    defs.push(format!(
        "{} TIMESTAMP DEFAULT now()",
        quote_identifier(INSERTED_AT_COLUMN)
    ));
    defs.push(format!(
        "PRIMARY KEY ({})",
        quote_identifier(schema.key_column())
    ));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        target.qualified(),
        defs.join(", ")
    )
}

/// Create the target schema and table when missing.
pub(crate) async fn bootstrap(
    client: &Client,
    target: &Target,
    schema: &TableSchema,
) -> Result<(), String> {
    let create_schema = format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        quote_identifier(&target.schema)
    );
    client
        .execute(&create_schema, &[])
        .await
        .map_err(|e| format_pg_error(&format!("Failed to create schema '{}'", target.schema), &e))?;

    let ddl = create_table_sql(target, schema);
    client
        .execute(&ddl, &[])
        .await
        .map_err(|e| format_pg_error(&format!("CREATE TABLE failed for {target}"), &e))?;
    info!(table = %target, columns = schema.len(), "created destination table");
    Ok(())
}

fn unique_index_name(table: &str, key: &str) -> String {
    let name = format!("{table}_{key}_uidx");
    if name.len() > cdrsync_types::schema::MAX_IDENTIFIER_LEN {
        format!("{table}_uidx")
    } else {
        name
    }
}

pub(crate) fn migration_statements(
    target: &Target,
    schema: &TableSchema,
    missing: &[&str],
    backfills: &[Backfill],
) -> Vec<String> {
    let qualified = target.qualified();
    let mut stmts = Vec::new();
    for name in missing {
        let pg_type = if *name == INSERTED_AT_COLUMN {
            "TIMESTAMP DEFAULT now()"
        } else {
            schema
                .position(name)
                .map_or("TEXT", |i| schema.columns()[i].column_type.pg_type())
        };
        stmts.push(format!(
            "ALTER TABLE {qualified} ADD COLUMN IF NOT EXISTS {} {pg_type}",
            quote_identifier(name)
        ));
    }
    for fill in backfills.iter().filter(|b| missing.contains(&b.column.as_str())) {
        let column = quote_identifier(&fill.column);
        stmts.push(format!(
            "UPDATE {qualified} SET {column} = {} WHERE {column} IS NULL",
            fill.expression
        ));
    }
    let key = schema.key_column();
    stmts.push(format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {qualified} ({})",
        quote_identifier(&unique_index_name(&target.table, key)),
        quote_identifier(key)
    ));
    stmts
}

/// Bring a legacy table up to `schema` in one transaction: add the missing
/// columns, backfill them, and enforce key uniqueness.
///
/// Every statement is idempotent; any failure rolls the whole step back.
pub(crate) async fn migrate(
    client: &Client,
    target: &Target,
    schema: &TableSchema,
    missing: &[&str],
    backfills: &[Backfill],
) -> Result<(), String> {
    let stmts = migration_statements(target, schema, missing, backfills);

    client
        .execute("BEGIN", &[])
        .await
        .map_err(|e| format_pg_error("Migration BEGIN failed", &e))?;

    for sql in &stmts {
        if let Err(e) = client.execute(sql.as_str(), &[]).await {
            let _ = client.execute("ROLLBACK", &[]).await;
            return Err(format_pg_error(
                &format!("Migration of {target} failed on `{sql}`"),
                &e,
            ));
        }
    }

    if let Err(e) = client.execute("COMMIT", &[]).await {
        let _ = client.execute("ROLLBACK", &[]).await;
        return Err(format_pg_error("Migration COMMIT failed", &e));
    }

    info!(table = %target, added = ?missing, "migrated destination table");
    Ok(())
}
