//! Named external collaborators (spec.md §6): the object store and the
//! subscription/quota provider. Neither is implemented here — HTTP, auth,
//! billing, and upload validation are explicitly out of scope — but the
//! contracts the core consumes from them live in this module so the
//! pipeline runner and worker pool can depend on a trait rather than a
//! concrete backend.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store I/O error: {0}")]
    Io(String),
}

/// `put`/`get`/`delete`/`stat` over content blobs (input uploads, output
/// artifacts). Keys are opaque content-derived references.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, local_path: &Path) -> Result<String, ObjectStoreError>;
    async fn get(&self, object_ref: &str, dest_path: &Path) -> Result<(), ObjectStoreError>;
    async fn delete(&self, object_ref: &str) -> Result<(), ObjectStoreError>;
    async fn stat(&self, object_ref: &str) -> Result<ObjectStat, ObjectStoreError>;
}

#[derive(Debug, Clone)]
pub struct ObjectStat {
    pub size_bytes: u64,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PlanLimits {
    pub max_duration_s: f64,
    pub max_monthly_jobs: u32,
}

/// `plan_limits`/`record_usage`, consumed by the worker pool's pre-flight
/// quota check (§4.10) before a job enters the pipeline runner.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn plan_limits(&self, user_id: &str) -> Result<PlanLimits, SubscriptionError>;
    async fn subscription_tier(&self, user_id: &str) -> Result<String, SubscriptionError>;
    async fn record_usage(&self, user_id: &str, job_id: &str, duration_s: f64) -> Result<(), SubscriptionError>;
}

/// A fixed-limits provider useful for local/manual operation (the
/// `censorctl` CLI) where no real billing system is wired in.
pub struct StaticSubscriptionProvider {
    pub tier: String,
    pub limits: PlanLimits,
}

impl Default for StaticSubscriptionProvider {
    fn default() -> Self {
        Self {
            tier: "free".to_string(),
            limits: PlanLimits {
                max_duration_s: 3600.0,
                max_monthly_jobs: 1000,
            },
        }
    }
}

#[async_trait]
impl SubscriptionProvider for StaticSubscriptionProvider {
    async fn plan_limits(&self, _user_id: &str) -> Result<PlanLimits, SubscriptionError> {
        Ok(self.limits)
    }

    async fn subscription_tier(&self, _user_id: &str) -> Result<String, SubscriptionError> {
        Ok(self.tier.clone())
    }

    async fn record_usage(&self, _user_id: &str, _job_id: &str, _duration_s: f64) -> Result<(), SubscriptionError> {
        Ok(())
    }
}

/// A local-filesystem object store: `put` copies into a content-addressed
/// path, `get` copies back out. Sufficient for the CLI and for tests;
/// production deployments would swap in an S3-backed implementation
/// without the core depending on it.
pub struct FilesystemObjectStore {
    root: std::path::PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, local_path: &Path) -> Result<String, ObjectStoreError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| ObjectStoreError::Io(e.to_string()))?;
        let digest = sha256_hex(&bytes);
        let dest = self.root.join(&digest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStoreError::Io(e.to_string()))?;
        }
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| ObjectStoreError::Io(e.to_string()))?;
        Ok(digest)
    }

    async fn get(&self, object_ref: &str, dest_path: &Path) -> Result<(), ObjectStoreError> {
        let src = self.root.join(object_ref);
        if !src.exists() {
            return Err(ObjectStoreError::NotFound(object_ref.to_string()));
        }
        tokio::fs::copy(&src, dest_path)
            .await
            .map(|_| ())
            .map_err(|e| ObjectStoreError::Io(e.to_string()))
    }

    async fn delete(&self, object_ref: &str) -> Result<(), ObjectStoreError> {
        let path = self.root.join(object_ref);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ObjectStoreError::Io(e.to_string())),
        }
    }

    async fn stat(&self, object_ref: &str) -> Result<ObjectStat, ObjectStoreError> {
        let path = self.root.join(object_ref);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ObjectStoreError::NotFound(object_ref.to_string()))?;
        Ok(ObjectStat {
            size_bytes: meta.len(),
            content_type: "application/octet-stream".to_string(),
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
