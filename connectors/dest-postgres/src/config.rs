use cdrsync_types::SensitiveString;
use serde::Deserialize;

/// PostgreSQL connection config from the job YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: SensitiveString,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

impl Config {
    /// Collect every problem with this section, prefixed by `section`.
    #[must_use]
    pub fn problems(&self, section: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.host.trim().is_empty() {
            problems.push(format!("{section}.host must not be empty"));
        }
        if self.port == 0 {
            problems.push(format!("{section}.port must be greater than 0"));
        }
        if self.user.trim().is_empty() {
            problems.push(format!("{section}.user must not be empty"));
        }
        if self.database.trim().is_empty() {
            problems.push(format!("{section}.database must not be empty"));
        }
        if let Err(e) = cdrsync_types::schema::validate_identifier(&self.schema) {
            problems.push(format!("{section}.schema: {e}"));
        }
        problems
    }
}
