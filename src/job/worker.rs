//! C11 — Worker Pool: bounded-concurrency executor that claims jobs,
//! isolates a per-job workspace, enforces quotas and timeouts, and always
//! tears down the workspace (spec.md §4.10).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::asr::Quality;
use crate::external::SubscriptionProvider;
use crate::job::pipeline::PipelineRunner;
use crate::job::registry::JobRegistry;
use crate::job::types::{Job, JobErrorKind, JobErrorRecord};
use crate::media::CancelToken;
use crate::workspace::JobWorkspace;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub max_concurrent_jobs: usize,
    pub job_timeout: Duration,
    pub idle_poll_interval: Duration,
    pub workspace_root: PathBuf,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            job_timeout: Duration::from_secs(3600),
            idle_poll_interval: Duration::from_secs(1),
            workspace_root: std::env::temp_dir().join("censorly-jobs"),
        }
    }
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    registry: Arc<JobRegistry>,
    runner: Arc<PipelineRunner>,
    subscriptions: Arc<dyn SubscriptionProvider>,
    semaphore: Arc<Semaphore>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        registry: Arc<JobRegistry>,
        runner: Arc<PipelineRunner>,
        subscriptions: Arc<dyn SubscriptionProvider>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            registry,
            runner,
            subscriptions,
            semaphore,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<tokio::sync::Notify> {
        self.shutdown.clone()
    }

    /// The main worker loop: attempt `claim_next`, sleep with jitter if
    /// idle, otherwise spawn a bounded-concurrency job task.
    pub async fn run(self: Arc<Self>, worker_id: String) {
        loop {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let claimed = self.registry.claim_next(&worker_id).await;
            let job = match claimed {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    let jitter_ms: u64 = rand::thread_rng().gen_range(0..250);
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.idle_poll_interval + Duration::from_millis(jitter_ms)) => {}
                        _ = self.shutdown.notified() => return,
                    }
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "claim_next failed");
                    tokio::time::sleep(self.config.idle_poll_interval).await;
                    continue;
                }
            };

            let pool = Arc::clone(&self);
            tokio::spawn(async move {
                pool.run_one(job).await;
                drop(permit);
            });
        }
    }

    async fn run_one(&self, job: Job) {
        info!(job_id = %job.job_id, "claimed job");

        if let Err(kind) = self.preflight_quota(&job).await {
            self.fail(&job, kind, "quota check failed before pipeline start").await;
            return;
        }

        let workspace = match JobWorkspace::create(&self.config.workspace_root, &job.job_id) {
            Ok(ws) => ws,
            Err(e) => {
                self.fail(&job, JobErrorKind::InternalError, &format!("workspace create failed: {e}"))
                    .await;
                return;
            }
        };

        let cancel = CancelToken::new();
        let quality = Quality::for_subscription_tier(
            &self
                .subscriptions
                .subscription_tier(&job.user_id)
                .await
                .unwrap_or_else(|_| "free".to_string()),
        );

        let cancel_watch = cancel.clone();
        let job_id = job.job_id.clone();
        let registry_watch = Arc::clone(&self.registry);
        let watch_handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
                match registry_watch.cancel_requested(&job_id).await {
                    Ok(true) => {
                        cancel_watch.cancel();
                        return;
                    }
                    Ok(false) => {}
                    Err(_) => return,
                }
            }
        });

        // Race the timeout against the runner future itself rather than
        // against a `tokio::time::timeout` wrapper: dropping the future on
        // timeout would abandon any in-flight ffmpeg child process without
        // ever observing `cancel`, orphaning it. Instead flip `cancel` and
        // keep polling the same future so `run_to_completion`'s own
        // cancellation check gets a chance to kill the child and return.
        let run_future = self.runner.run(&job, workspace.path(), quality, &cancel);
        tokio::pin!(run_future);

        let (result, timed_out) = tokio::select! {
            res = &mut run_future => (res, false),
            _ = tokio::time::sleep(self.config.job_timeout) => {
                cancel.cancel();
                (run_future.await, true)
            }
        };

        watch_handle.abort();

        if timed_out {
            self.fail(&job, JobErrorKind::Timeout, "job exceeded the per-job wall clock timeout")
                .await;
        } else {
            match result {
                Ok(summary) => {
                    if let Err(e) = self.registry.complete(&job.job_id, summary).await {
                        error!(job_id = %job.job_id, error = %e, "failed to persist completion");
                    }
                }
                Err(error_record) => {
                    if error_record.kind == JobErrorKind::Cancelled {
                        self.registry.finalize_cancelled(&job.job_id).await.ok();
                    } else {
                        self.fail(&job, error_record.kind, &error_record.detail).await;
                    }
                }
            }
        }

        if let Err(e) = workspace.close() {
            warn!(job_id = %job.job_id, error = %e, "workspace cleanup failed");
        }
    }

    async fn preflight_quota(&self, job: &Job) -> Result<(), JobErrorKind> {
        let limits = self
            .subscriptions
            .plan_limits(&job.user_id)
            .await
            .map_err(|_| JobErrorKind::InternalError)?;

        if let Some(duration) = job.input.duration_s {
            if duration > limits.max_duration_s {
                return Err(JobErrorKind::QuotaExceeded);
            }
        }
        Ok(())
    }

    async fn fail(&self, job: &Job, kind: JobErrorKind, detail: &str) {
        let record = JobErrorRecord {
            kind,
            detail: detail.to_string(),
        };
        if let Err(e) = self.registry.fail(&job.job_id, record).await {
            error!(job_id = %job.job_id, error = %e, "failed to persist job failure");
        }
    }
}
