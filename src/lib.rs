//! censorly — multi-tenant video profanity detection and censoring.
//!
//! The core pipeline: extract audio (C5) → transcribe (C6) → classify
//! segments with a hybrid regex + ML detector (C1-C4) → map to abusive
//! intervals (C7) → censor by beep/mute/cut (C8). Around this, a job
//! registry (C10) and bounded-concurrency worker pool (C11) run the
//! pipeline (C9) for many tenants concurrently. HTTP, auth, billing, and
//! upload validation are out of scope here — see `external` for the
//! collaborator contracts this core consumes instead.

pub mod asr;
pub mod detection;
pub mod external;
pub mod job;
pub mod media;
pub mod segment_mapper;
pub mod storage;
pub mod text_norm;
pub mod wordlist;
pub mod workspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use asr::WhisperEngine;
use detection::{ClassifierHandle, CompiledPatternSet, EnsemblePolicy, HybridDetector};
use external::{FilesystemObjectStore, ObjectStore, StaticSubscriptionProvider, SubscriptionProvider};
use job::{
    Job, JobConfig, JobErrorKind, JobFilter, JobInput, JobRegistry, JobState, PipelineRunner, WorkerPool,
    WorkerPoolConfig,
};
use media::FfmpegTool;
use storage::Database;
use wordlist::Wordlist;

/// Default job expiry relative to `created_at`, used by `submit` and by
/// `sweep_expired` callers (spec.md §3 "expires_at").
pub const DEFAULT_JOB_TTL_HOURS: i64 = 72;

/// Everything the public API needs to drive the pipeline: the job
/// registry, a shared detector/ASR engine, and the external collaborators.
/// Construct once per process; cheap to clone (all fields are `Arc`s or
/// cloneable handles).
#[derive(Clone)]
pub struct Service {
    pub registry: Arc<JobRegistry>,
    pub object_store: Arc<dyn ObjectStore>,
    runner: Arc<PipelineRunner>,
}

pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub wordlist_path: PathBuf,
    pub classifier_artifact: Option<PathBuf>,
    pub classifier_threshold: f32,
    pub ensemble_policy: EnsemblePolicy,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub object_store_root: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("censorly");
        Self {
            db_path: data_dir.join("jobs.sqlite3"),
            wordlist_path: data_dir.join("wordlist.json"),
            classifier_artifact: None,
            classifier_threshold: 0.5,
            ensemble_policy: EnsemblePolicy::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            object_store_root: data_dir.join("objects"),
        }
    }
}

impl Service {
    /// Wires up storage, the wordlist, the (optional) ML classifier, and
    /// the ASR engine. Wordlist load failure is fatal to the process
    /// (spec.md §7); classifier load failure is not — the detector
    /// degrades per its own documented rules.
    pub async fn initialize(config: ServiceConfig) -> Result<Self> {
        let db = Database::new(&config.db_path).await.context("open job database")?;
        db.migrate().await.context("run job registry migrations")?;
        let registry = Arc::new(JobRegistry::new(db));

        let wordlist = Wordlist::load_or_seed(&config.wordlist_path)
            .map_err(|e| anyhow::anyhow!("fatal: wordlist load failed: {e}"))?;
        let patterns = CompiledPatternSet::build(&wordlist);

        let classifier = match &config.classifier_artifact {
            Some(path) => ClassifierHandle::load(path, config.classifier_threshold),
            None => ClassifierHandle::disabled(config.classifier_threshold),
        };

        let detector = Arc::new(HybridDetector::new(patterns, classifier, config.ensemble_policy));
        if detector.detector_unavailable() {
            tracing::warn!("ensemble policy requires ML but no classifier is loaded; ml_only jobs will fail");
        }

        let ffmpeg = FfmpegTool::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone());
        let asr: Arc<dyn asr::AsrEngine> = Arc::new(WhisperEngine::new(asr::WhisperConfig::default()));
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(FilesystemObjectStore::new(config.object_store_root.clone()));

        let runner = Arc::new(PipelineRunner {
            ffmpeg,
            asr,
            detector,
            object_store: Arc::clone(&object_store),
            registry: Arc::clone(&registry),
        });

        Ok(Self {
            registry,
            object_store,
            runner,
        })
    }

    /// Spawn a worker pool backed by this service's registry and pipeline.
    pub fn spawn_workers(
        &self,
        pool_config: WorkerPoolConfig,
        subscriptions: Arc<dyn SubscriptionProvider>,
        worker_count: usize,
    ) -> Arc<WorkerPool> {
        let pool = Arc::new(WorkerPool::new(
            pool_config,
            Arc::clone(&self.registry),
            Arc::clone(&self.runner),
            subscriptions,
        ));
        for i in 0..worker_count {
            let pool = Arc::clone(&pool);
            tokio::spawn(pool.run(format!("worker-{i}")));
        }
        pool
    }

    pub fn default_subscriptions() -> Arc<dyn SubscriptionProvider> {
        Arc::new(StaticSubscriptionProvider::default())
    }

    /// `submit(user_id, input_ref, config) → job_id` (spec.md §6). Rejects
    /// invalid configs before anything reaches the registry.
    pub async fn submit(&self, user_id: &str, input: JobInput, config: JobConfig) -> Result<String, JobErrorKind> {
        config.validate()?;
        self.registry
            .submit(user_id, input, config, DEFAULT_JOB_TTL_HOURS)
            .await
            .map_err(|_| JobErrorKind::InternalError)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        self.registry.get(job_id).await
    }

    pub async fn list_jobs(&self, user_id: &str, filter: JobFilter) -> Result<Vec<Job>> {
        self.registry.list(user_id, filter).await
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
        self.registry.cancel(job_id).await
    }

    /// `fetch_artifact(job_id) → byte stream` (spec.md §6). Artifacts are
    /// never exposed for failed/cancelled jobs.
    pub async fn fetch_artifact(&self, job_id: &str, dest_path: &Path) -> Result<()> {
        let job = self
            .registry
            .get(job_id)
            .await?
            .context("job not found")?;
        if job.state != JobState::Completed {
            anyhow::bail!("artifact unavailable: job is not completed");
        }
        let output_ref = job
            .result
            .context("completed job missing result")?
            .output_ref;
        self.object_store
            .get(&output_ref, dest_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to fetch artifact: {e}"))
    }
}

/// Initialize process-wide structured logging (`RUST_LOG`-driven). Call
/// once at process start (the `censorctl` binary and any embedding host).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
