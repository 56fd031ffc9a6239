//! Pre-migration snapshot of the whole cluster to an S3 repository.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, instrument};

use protosync_search::IndexService;
use protosync_shared::{ProtoSyncError, Result, SnapshotConfig};

/// S3 credentials for the snapshot repository.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &"***")
            .field("secret_key", &"***")
            .finish()
    }
}

impl S3Credentials {
    /// Read credentials from the env vars named in `config`.
    pub fn from_env(config: &SnapshotConfig) -> Result<Self> {
        Ok(Self {
            access_key: non_empty_env(&config.access_key_env)?,
            secret_key: non_empty_env(&config.secret_key_env)?,
        })
    }
}

fn non_empty_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ProtoSyncError::config(format!(
            "snapshot requested but the {name} environment variable is not set"
        ))),
    }
}

/// Repository registration body for `config`.
fn repository_body(config: &SnapshotConfig, credentials: &S3Credentials) -> Result<Value> {
    let (Some(bucket), Some(region)) = (&config.bucket, &config.region) else {
        return Err(ProtoSyncError::config(
            "snapshot requested but [snapshot] bucket and region are not configured",
        ));
    };

    Ok(json!({
        "type": "s3",
        "settings": {
            "bucket": bucket,
            "region": region,
            "access_key": credentials.access_key,
            "secret_key": credentials.secret_key,
            "base_path": config.base_path,
        }
    }))
}

/// Register the repository and snapshot everything, named by Unix time.
///
/// Returns the snapshot name.
#[instrument(skip_all, fields(repository = %config.repository))]
pub async fn create_pre_migration_snapshot<S: IndexService>(
    service: &S,
    config: &SnapshotConfig,
    credentials: &S3Credentials,
) -> Result<String> {
    let body = repository_body(config, credentials)?;
    service.create_repository(&config.repository, &body).await?;

    let snapshot = Utc::now().timestamp().to_string();
    info!(%snapshot, "creating pre-migration snapshot");
    service.create_snapshot(&config.repository, &snapshot).await?;

    Ok(snapshot)
}
