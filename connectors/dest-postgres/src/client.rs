//! PostgreSQL client connection and validation helpers.

use cdrsync_types::SyncError;
use pg_escape::quote_identifier;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, error};

use crate::config::Config;

/// Render a driver error with the server-side diagnostics when present.
pub(crate) fn format_pg_error(prefix: &str, error: &tokio_postgres::Error) -> String {
    if let Some(db_error) = error.as_db_error() {
        let detail = db_error.detail().unwrap_or("n/a");
        let hint = db_error.hint().unwrap_or("n/a");
        format!(
            "{prefix}: {} (sqlstate={} severity={} detail={} hint={})",
            db_error.message(),
            db_error.code().code(),
            db_error.severity(),
            detail,
            hint
        )
    } else {
        format!("{prefix}: {error}")
    }
}

/// Connect to PostgreSQL; the connection driver runs on a spawned task.
///
/// # Errors
///
/// Returns a `transient_db` error when the connection cannot be established.
pub async fn connect(config: &Config) -> Result<Client, SyncError> {
    let mut pg = PgConfig::new();
    pg.host(&config.host);
    pg.port(config.port);
    pg.user(&config.user);
    if !config.password.is_empty() {
        pg.password(config.password.expose_secret());
    }
    pg.dbname(&config.database);
    pg.application_name("cdrsync");

    let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
        SyncError::transient_db(
            "CONNECTION_FAILED",
            format_pg_error(
                &format!(
                    "Connection to {}:{}/{} failed",
                    config.host, config.port, config.database
                ),
                &e,
            ),
        )
    })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "PostgreSQL connection error");
        }
    });

    debug!(host = %config.host, port = config.port, database = %config.database, "connected to PostgreSQL");
    Ok(client)
}

/// Validate connectivity and report whether the target schema exists.
///
/// # Errors
///
/// Returns a `transient_db` error when the connection or test query fails.
pub async fn validate(config: &Config) -> Result<String, SyncError> {
    let client = connect(config).await?;

    client.query_one("SELECT 1", &[]).await.map_err(|e| {
        SyncError::transient_db(
            "CONNECTION_TEST_FAILED",
            format_pg_error("Connection test failed", &e),
        )
    })?;

    let version: String = client
        .query_one("SHOW server_version_num", &[])
        .await
        .map_err(|e| {
            SyncError::transient_db("CONNECTION_TEST_FAILED", format_pg_error("Version probe failed", &e))
        })?
        .get(0);

    let schema_exists = client
        .query_opt(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name = $1",
            &[&config.schema],
        )
        .await
        .map_err(|e| {
            SyncError::transient_db("CONNECTION_TEST_FAILED", format_pg_error("Schema probe failed", &e))
        })?
        .is_some();

    let mut message = if schema_exists {
        format!(
            "Connected to {}:{}/{} (schema: {})",
            config.host, config.port, config.database, config.schema
        )
    } else {
        format!(
            "Connected to {}:{}/{} (schema '{}' does not exist, will be created)",
            config.host, config.port, config.database, config.schema
        )
    };
    if version.parse::<u32>().is_ok_and(|v| v < 150_000) {
        message.push_str(&format!(
            "; server_version_num {version} is below 150000, MERGE is unavailable"
        ));
    }
    Ok(message)
}

/// Schema-qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub schema: String,
    pub table: String,
}

impl Target {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// `"schema"."table"` with identifier quoting.
    #[must_use]
    pub fn qualified(&self) -> String {
        qualify(&self.schema, &self.table)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

pub(crate) fn qualify(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// Total rows currently in `target`.
///
/// # Errors
///
/// Returns a `transient_db` error when the count query fails.
pub async fn count_rows(client: &Client, target: &Target) -> Result<u64, SyncError> {
    let sql = format!("SELECT COUNT(*) FROM {}", target.qualified());
    let row = client.query_one(&sql, &[]).await.map_err(|e| {
        SyncError::transient_db(
            "COUNT_FAILED",
            format_pg_error(&format!("Row count failed for {target}"), &e),
        )
    })?;
    let count: i64 = row.get(0);
    Ok(u64::try_from(count).unwrap_or_default())
}
