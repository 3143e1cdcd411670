//! Business-rule exclusions for the call table.

use serde::Deserialize;
use serde_json::Value;

use super::value::scalar_text;

fn default_excluded_contexts() -> Vec<String> {
    vec!["HangupCall".to_string()]
}

fn default_excluded_apps() -> Vec<String> {
    vec!["Congestion".to_string()]
}

fn default_excluded_dispositions() -> Vec<String> {
    vec!["FAILED".to_string()]
}

fn default_blocked_destinations() -> Vec<String> {
    vec!["s".to_string(), "*65".to_string()]
}

fn default_blocked_sources() -> Vec<String> {
    vec!["start".to_string(), "anonymous".to_string()]
}

/// Exact-match exclusion lists applied to each source record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusinessFilters {
    /// Matched against `dcontext`.
    #[serde(default = "default_excluded_contexts")]
    pub excluded_contexts: Vec<String>,
    /// Matched against `lastapp`.
    #[serde(default = "default_excluded_apps")]
    pub excluded_apps: Vec<String>,
    #[serde(default = "default_excluded_dispositions")]
    pub excluded_dispositions: Vec<String>,
    /// Matched against `dst`.
    #[serde(default = "default_blocked_destinations")]
    pub blocked_destinations: Vec<String>,
    /// Matched against `src`.
    #[serde(default = "default_blocked_sources")]
    pub blocked_sources: Vec<String>,
}

impl Default for BusinessFilters {
    fn default() -> Self {
        Self {
            excluded_contexts: default_excluded_contexts(),
            excluded_apps: default_excluded_apps(),
            excluded_dispositions: default_excluded_dispositions(),
            blocked_destinations: default_blocked_destinations(),
            blocked_sources: default_blocked_sources(),
        }
    }
}

impl BusinessFilters {
    /// Name of the first source field whose value is on an exclusion list.
    #[must_use]
    pub fn rejection(&self, record: &serde_json::Map<String, Value>) -> Option<&'static str> {
        let checks: [(&'static str, &[String]); 5] = [
            ("dcontext", &self.excluded_contexts),
            ("lastapp", &self.excluded_apps),
            ("disposition", &self.excluded_dispositions),
            ("dst", &self.blocked_destinations),
            ("src", &self.blocked_sources),
        ];
        checks.into_iter().find_map(|(field, list)| {
            let value = record.get(field).and_then(scalar_text)?;
            list.iter().any(|x| *x == value).then_some(field)
        })
    }
}
