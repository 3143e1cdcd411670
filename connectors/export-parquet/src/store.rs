//! Versioned object-store publishing.
//!
//! Publishing a file purges every stored version (and delete marker) of the
//! destination key first, then uploads the new object, so the bucket keeps a
//! single current copy of the export.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use cdrsync_types::{SensitiveString, SyncError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// S3-compatible destination of the exported file.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    /// Fixed object key the export is published under.
    pub key: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services; enables path-style access.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<SensitiveString>,
    #[serde(default)]
    pub secret_access_key: Option<SensitiveString>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl ObjectStoreConfig {
    #[must_use]
    pub fn problems(&self, section: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.bucket.trim().is_empty() {
            problems.push(format!("{section}.bucket must not be empty"));
        }
        if self.key.trim().is_empty() {
            problems.push(format!("{section}.key must not be empty"));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            problems.push(format!(
                "{section}.access_key_id and {section}.secret_access_key must be set together"
            ));
        }
        problems
    }
}

/// One stored version or delete marker of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub version_id: String,
    pub is_delete_marker: bool,
}

/// Object store operations needed to publish a single-version artifact.
#[allow(async_fn_in_trait)]
pub trait VersionedStore {
    /// Every version and delete marker of exactly `key`.
    async fn list_versions(&self, key: &str) -> Result<Vec<StoredVersion>, String>;

    async fn delete_version(&self, key: &str, version_id: &str) -> Result<(), String>;

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), String>;
}

/// What [`publish`] did before and including the upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub key: String,
    pub versions_found: usize,
    pub versions_deleted: usize,
    pub version_failures: usize,
    /// Listing failed; the upload was attempted without purging.
    pub listing_failed: bool,
}

/// Purge every version of `key`, then upload `path` under it.
///
/// # Errors
///
/// Only the upload failing is an error; listing and per-version delete
/// failures are logged and counted.
pub async fn publish<S: VersionedStore>(
    store: &S,
    key: &str,
    path: &Path,
) -> Result<PublishOutcome, SyncError> {
    let mut outcome = PublishOutcome {
        key: key.to_string(),
        ..PublishOutcome::default()
    };

    match store.list_versions(key).await {
        Ok(versions) => {
            outcome.versions_found = versions.len();
            for version in &versions {
                match store.delete_version(key, &version.version_id).await {
                    Ok(()) => {
                        outcome.versions_deleted += 1;
                        debug!(key, version_id = %version.version_id, delete_marker = version.is_delete_marker, "deleted object version");
                    }
                    Err(e) => {
                        outcome.version_failures += 1;
                        warn!(key, version_id = %version.version_id, error = %e, "failed to delete object version");
                    }
                }
            }
            info!(
                key,
                found = outcome.versions_found,
                deleted = outcome.versions_deleted,
                failed = outcome.version_failures,
                "purged previous object versions"
            );
        }
        Err(e) => {
            outcome.listing_failed = true;
            warn!(key, error = %e, "failed to list object versions, uploading without purge");
        }
    }

    store
        .put_file(key, path)
        .await
        .map_err(|e| SyncError::storage("UPLOAD_FAILED", format!("upload of {key} failed: {e}")))?;
    info!(key, "uploaded export");
    Ok(outcome)
}

/// [`VersionedStore`] backed by an S3-compatible bucket.
pub struct S3Store {
    client: S3Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(config: &ObjectStoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let creds = aws_sdk_s3::config::Credentials::new(
                access_key.expose_secret(),
                secret_key.expose_secret(),
                None,
                None,
                "cdrsync",
            );
            loader = loader.credentials_provider(creds);
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }
}

impl VersionedStore for S3Store {
    async fn list_versions(&self, key: &str) -> Result<Vec<StoredVersion>, String> {
        let mut found = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_object_versions()
                .bucket(&self.bucket)
                .prefix(key)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(|e| DisplayErrorContext(&e).to_string())?;

            for v in resp.versions() {
                if v.key() == Some(key) {
                    if let Some(id) = v.version_id() {
                        found.push(StoredVersion {
                            version_id: id.to_string(),
                            is_delete_marker: false,
                        });
                    }
                }
            }
            for m in resp.delete_markers() {
                if m.key() == Some(key) {
                    if let Some(id) = m.version_id() {
                        found.push(StoredVersion {
                            version_id: id.to_string(),
                            is_delete_marker: true,
                        });
                    }
                }
            }

            if resp.is_truncated() != Some(true) {
                break;
            }
            key_marker = resp.next_key_marker().map(str::to_string);
            version_marker = resp.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() && version_marker.is_none() {
                break;
            }
        }
        Ok(found)
    }

    async fn delete_version(&self, key: &str, version_id: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .version_id(version_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| DisplayErrorContext(&e).to_string())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), String> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/vnd.apache.parquet")
            .body(body)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| DisplayErrorContext(&e).to_string())
    }
}
