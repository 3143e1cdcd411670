pub mod api;
mod container;

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use cdrsync_engine::config::{parse_config_str, JobConfig};
use tokio_postgres::{Client, NoTls};
use wiremock::MockServer;

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct HarnessContext {
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_db: String,
    pub postgres_user: String,
    pub postgres_pass: String,
}

pub async fn bootstrap() -> Result<HarnessContext> {
    let postgres_port = container::shared_postgres_port()?;
    Ok(HarnessContext {
        postgres_host: "127.0.0.1".to_string(),
        postgres_port,
        postgres_db: "postgres".to_string(),
        postgres_user: "postgres".to_string(),
        postgres_pass: "postgres".to_string(),
    })
}

/// What a test wants in its job file beyond the database section.
#[derive(Debug, Clone, Default)]
pub struct JobSpec<'a> {
    pub calls_url: Option<&'a str>,
    pub raw_url: Option<&'a str>,
    /// YAML list body for `raw.columns`, already indented.
    pub raw_columns: Option<&'a str>,
    pub export_table: Option<&'a str>,
}

impl HarnessContext {
    pub async fn connect(&self) -> Result<Client> {
        let conn_str = format!(
            "host={} port={} user={} password={} dbname={}",
            self.postgres_host,
            self.postgres_port,
            self.postgres_user,
            self.postgres_pass,
            self.postgres_db
        );
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
            .await
            .context("failed to connect to test postgres")?;
        tokio::spawn(async move {
            let _ = connection.await;
        });
        Ok(client)
    }

    /// Fresh, empty schema name for one test. The jobs create it on first
    /// use.
    #[must_use]
    pub fn allocate_schema(&self, test_name: &str) -> String {
        let id = NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed);
        format!("e2e_{}_{id}", sanitize_identifier(test_name))
    }

    pub async fn drop_schema(&self, schema: &str) -> Result<()> {
        let client = self.connect().await?;
        client
            .execute(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"), &[])
            .await
            .with_context(|| format!("failed to drop schema {schema}"))?;
        Ok(())
    }

    /// Render and parse a job file for `schema`.
    pub fn job_config(&self, schema: &str, spec: &JobSpec<'_>) -> Result<JobConfig> {
        let mut yaml = format!(
            "database:
  host: {host}
  port: {port}
  user: {user}
  password: {pass}
  database: {db}
  schema: {schema}
",
            host = self.postgres_host,
            port = self.postgres_port,
            user = self.postgres_user,
            pass = self.postgres_pass,
            db = self.postgres_db,
        );
        if let Some(url) = spec.calls_url {
            yaml.push_str(&format!(
                "calls:
  source:
    url: {url}
    auth:
      type: basic
      username: reporter
      password: secret
  table: cdr_calls
  chunk_rows: 2
"
            ));
        }
        if let Some(url) = spec.raw_url {
            yaml.push_str(&format!(
                "raw:
  source:
    url: {url}
    page_delay_ms: 0
    auth:
      type: bearer
      token: t0ken
  table: cdr_raw
"
            ));
            if let Some(columns) = spec.raw_columns {
                yaml.push_str("  columns:\n");
                yaml.push_str(columns);
            }
        }
        if let Some(table) = spec.export_table {
            yaml.push_str(&format!(
                "export:
  table: {table}
  parquet:
    compression: zstd
    row_group_size: 2
  store:
    bucket: cdr-exports
    key: exports/{table}.parquet
    endpoint_url: http://127.0.0.1:1
"
            ));
        }
        parse_config_str(&yaml).context("failed to parse generated job config")
    }

    pub async fn count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.connect().await?;
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM \"{schema}\".\"{table}\""), &[])
            .await
            .with_context(|| format!("failed to count {schema}.{table}"))?;
        Ok(row.get(0))
    }

    pub async fn table_names(&self, schema: &str) -> Result<Vec<String>> {
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 ORDER BY table_name",
                &[&schema],
            )
            .await
            .context("failed to list tables")?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    pub async fn column_types(&self, schema: &str, table: &str) -> Result<Vec<(String, String)>> {
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await
            .context("failed to list columns")?;
        Ok(rows.iter().map(|r| (r.get(0), r.get(1))).collect())
    }
}

/// Mock CDR API server.
pub async fn mock_api() -> MockServer {
    MockServer::start().await
}

fn sanitize_identifier(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
