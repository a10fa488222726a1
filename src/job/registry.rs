//! C10 — Job Registry: the persistent store of `Job` rows with atomic
//! state transitions (spec.md §4.9). Built on the adapted `storage::Database`
//! connection manager; single-claim atomicity is enforced with a
//! `BEGIN IMMEDIATE` transaction so no two workers can observe the same
//! row transition to `running`.
//!
//! Ground: `storage/database.rs`'s connection-management pattern (kept
//! verbatim) plus `original_source/backend/services/job_service.py`'s
//! state machine, re-expressed as SQL transitions instead of ORM calls.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::task;

use crate::job::types::{Job, JobConfig, JobErrorKind, JobErrorRecord, JobInput, JobResultSummary, JobState};
use crate::storage::Database;

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
}

pub struct JobRegistry {
    db: Database,
}

impl JobRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// `submit(user_id, input_ref, config) → job_id` (spec.md §4.9). The
    /// config MUST already have passed [`JobConfig::validate`] — `invalid_config`
    /// never reaches the registry.
    pub async fn submit(
        &self,
        user_id: &str,
        input: JobInput,
        config: JobConfig,
        ttl_hours: i64,
    ) -> Result<String> {
        let job_id = Job::new_id();
        let config_json = serde_json::to_string(&config).context("serialize job config")?;
        let connection = Arc::clone(&self.db.connection);
        let job_id_owned = job_id.clone();
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = connection.lock().unwrap();
            conn.execute(
                "INSERT INTO jobs (
                    job_id, user_id, state, progress,
                    input_object_ref, input_size_bytes, input_duration_s, config_json,
                    expires_at
                ) VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?6,
                    datetime('now', ?7))",
                params![
                    job_id_owned,
                    user_id,
                    input.object_ref,
                    input.size_bytes as i64,
                    input.duration_s,
                    config_json,
                    format!("+{} hours", ttl_hours),
                ],
            )
            .context("insert job row")?;
            Ok(())
        })
        .await??;

        Ok(job_id)
    }

    /// `claim_next(worker_id) → Job?`. Atomically transitions the
    /// fair-queueing winner among `pending` rows to `running`.
    ///
    /// Fair-queueing: prefer the user with fewest currently `running` jobs;
    /// tie-break by oldest `created_at` (spec.md §4.9).
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let connection = Arc::clone(&self.db.connection);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> Result<Option<Job>> {
            let mut conn = connection.lock().unwrap();
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let candidate: Option<String> = tx
                .query_row(
                    "SELECT job_id FROM jobs
                     WHERE state = 'pending'
                     ORDER BY (
                        SELECT COUNT(*) FROM jobs running
                        WHERE running.user_id = jobs.user_id AND running.state = 'running'
                     ) ASC, created_at ASC
                     LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .context("select claim candidate")?;

            let Some(job_id) = candidate else {
                tx.rollback()?;
                return Ok(None);
            };

            let updated = tx
                .execute(
                    "UPDATE jobs SET state = 'running', claimed_by = ?1,
                        started_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE job_id = ?2 AND state = 'pending'",
                    params![worker_id, job_id],
                )
                .context("claim job row")?;

            if updated != 1 {
                // Lost a race despite BEGIN IMMEDIATE serializing writers —
                // should not happen, but fail closed rather than double-claim.
                tx.rollback()?;
                return Ok(None);
            }

            let job = fetch_job(&tx, &job_id)?;
            tx.commit()?;
            Ok(job)
        })
        .await?
    }

    /// Allowed only by the claiming worker; monotonic non-decreasing.
    pub async fn update_progress(&self, job_id: &str, progress: u8) -> Result<()> {
        let connection = Arc::clone(&self.db.connection);
        let job_id = job_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = connection.lock().unwrap();
            conn.execute(
                "UPDATE jobs SET progress = ?1
                 WHERE job_id = ?2 AND state = 'running' AND progress <= ?1",
                params![progress as i64, job_id],
            )
            .context("update job progress")?;
            Ok(())
        })
        .await?
    }

    pub async fn complete(&self, job_id: &str, result: JobResultSummary) -> Result<()> {
        let connection = Arc::clone(&self.db.connection);
        let job_id = job_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = connection.lock().unwrap();
            conn.execute(
                "UPDATE jobs SET
                    state = 'completed', progress = 100,
                    output_object_ref = ?1, censored_interval_count = ?2,
                    total_censored_duration_s = ?3, processing_time_s = ?4,
                    finished_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?5 AND state = 'running'",
                params![
                    result.output_ref,
                    result.censored_interval_count,
                    result.total_censored_duration_s,
                    result.processing_time_s,
                    job_id,
                ],
            )
            .context("complete job")?;
            Ok(())
        })
        .await?
    }

    pub async fn fail(&self, job_id: &str, error: JobErrorRecord) -> Result<()> {
        let connection = Arc::clone(&self.db.connection);
        let job_id = job_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = connection.lock().unwrap();
            conn.execute(
                "UPDATE jobs SET
                    state = 'failed', error_kind = ?1, error_detail = ?2,
                    finished_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?3 AND state = 'running'",
                params![error.kind.to_string(), error.detail, job_id],
            )
            .context("fail job")?;
            Ok(())
        })
        .await?
    }

    /// Marks a job cancelled. If still `pending`, transitions directly; if
    /// `running`, sets the cooperative `cancel_requested` flag and leaves
    /// the transition to `cancelled` to the runner once it unwinds.
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        let connection = Arc::clone(&self.db.connection);
        let job_id = job_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = connection.lock().unwrap();
            conn.execute(
                "UPDATE jobs SET state = 'cancelled', cancel_requested = 1,
                    finished_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?1 AND state = 'pending'",
                params![job_id],
            )
            .context("cancel pending job")?;
            conn.execute(
                "UPDATE jobs SET cancel_requested = 1
                 WHERE job_id = ?1 AND state = 'running'",
                params![job_id],
            )
            .context("flag running job cancelled")?;
            Ok(())
        })
        .await?
    }

    pub async fn finalize_cancelled(&self, job_id: &str) -> Result<()> {
        let connection = Arc::clone(&self.db.connection);
        let job_id = job_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = connection.lock().unwrap();
            conn.execute(
                "UPDATE jobs SET state = 'cancelled',
                    finished_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?1 AND state = 'running'",
                params![job_id],
            )
            .context("finalize cancelled job")?;
            Ok(())
        })
        .await?
    }

    pub async fn cancel_requested(&self, job_id: &str) -> Result<bool> {
        let connection = Arc::clone(&self.db.connection);
        let job_id = job_id.to_string();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = connection.lock().unwrap();
            let flag: i64 = conn
                .query_row(
                    "SELECT cancel_requested FROM jobs WHERE job_id = ?1",
                    params![job_id],
                    |row| row.get(0),
                )
                .context("read cancel flag")?;
            Ok(flag != 0)
        })
        .await?
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let connection = Arc::clone(&self.db.connection);
        let job_id = job_id.to_string();

        task::spawn_blocking(move || -> Result<Option<Job>> {
            let conn = connection.lock().unwrap();
            fetch_job(&conn, &job_id)
        })
        .await?
    }

    pub async fn list(&self, user_id: &str, filter: JobFilter) -> Result<Vec<Job>> {
        let connection = Arc::clone(&self.db.connection);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<Job>> {
            let conn = connection.lock().unwrap();
            let job_ids: Vec<String> = match filter.state {
                Some(state) => {
                    let mut stmt = conn.prepare(
                        "SELECT job_id FROM jobs WHERE user_id = ?1 AND state = ?2 ORDER BY created_at DESC",
                    )?;
                    stmt.query_map(params![user_id, state.as_str()], |row| row.get(0))?
                        .collect::<rusqlite::Result<_>>()?
                }
                None => {
                    let mut stmt = conn
                        .prepare("SELECT job_id FROM jobs WHERE user_id = ?1 ORDER BY created_at DESC")?;
                    stmt.query_map(params![user_id], |row| row.get(0))?
                        .collect::<rusqlite::Result<_>>()?
                }
            };

            job_ids
                .into_iter()
                .filter_map(|id| fetch_job(&conn, &id).transpose())
                .collect()
        })
        .await?
    }

    /// Deletes rows whose `expires_at < now`.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let connection = Arc::clone(&self.db.connection);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = connection.lock().unwrap();
            let removed = conn
                .execute("DELETE FROM jobs WHERE expires_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')", [])
                .context("sweep expired jobs")?;
            Ok(removed)
        })
        .await?
    }
}

fn fetch_job(conn: &Connection, job_id: &str) -> Result<Option<Job>> {
    conn.query_row(
        "SELECT job_id, user_id, state, progress,
                input_object_ref, input_size_bytes, input_duration_s, config_json,
                output_object_ref, censored_interval_count, total_censored_duration_s, processing_time_s,
                error_kind, error_detail, claimed_by, cancel_requested,
                created_at, started_at, finished_at, expires_at
         FROM jobs WHERE job_id = ?1",
        params![job_id],
        row_to_job,
    )
    .optional()
    .context("fetch job row")
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let state_str: String = row.get(2)?;
    let config_json: String = row.get(7)?;
    let config: JobConfig = serde_json::from_str(&config_json).unwrap_or_default();

    let output_ref: Option<String> = row.get(8)?;
    let result = output_ref.map(|output_ref| JobResultSummary {
        output_ref,
        censored_interval_count: row.get::<_, Option<i64>>(9).unwrap_or_default().unwrap_or(0) as u32,
        total_censored_duration_s: row.get::<_, Option<f64>>(10).unwrap_or_default().unwrap_or(0.0),
        processing_time_s: row.get::<_, Option<f64>>(11).unwrap_or_default().unwrap_or(0.0),
    });

    let error_kind: Option<String> = row.get(12)?;
    let error = error_kind.map(|kind| JobErrorRecord {
        kind: parse_error_kind(&kind),
        detail: row.get::<_, Option<String>>(13).unwrap_or_default().unwrap_or_default(),
    });

    Ok(Job {
        job_id: row.get(0)?,
        user_id: row.get(1)?,
        state: JobState::parse(&state_str).unwrap_or(JobState::Failed),
        progress: row.get::<_, i64>(3)? as u8,
        input: JobInput {
            object_ref: row.get(4)?,
            size_bytes: row.get::<_, i64>(5)? as u64,
            duration_s: row.get(6)?,
        },
        config,
        result,
        error,
        claimed_by: row.get(14)?,
        cancel_requested: row.get::<_, i64>(15)? != 0,
        created_at: row.get(16)?,
        started_at: row.get(17)?,
        finished_at: row.get(18)?,
        expires_at: row.get(19)?,
    })
}

fn parse_error_kind(s: &str) -> JobErrorKind {
    match s {
        "invalid_config" => JobErrorKind::InvalidConfig,
        "input_unreadable" => JobErrorKind::InputUnreadable,
        "media_extract_failed" => JobErrorKind::MediaExtractFailed,
        "asr_unavailable" => JobErrorKind::AsrUnavailable,
        "asr_failed" => JobErrorKind::AsrFailed,
        "asr_timeout" => JobErrorKind::AsrTimeout,
        "detector_unavailable" => JobErrorKind::DetectorUnavailable,
        "empty_output" => JobErrorKind::EmptyOutput,
        "output_too_short" => JobErrorKind::OutputTooShort,
        "media_mux_failed" => JobErrorKind::MediaMuxFailed,
        "quota_exceeded" => JobErrorKind::QuotaExceeded,
        "timeout" => JobErrorKind::Timeout,
        "cancelled" => JobErrorKind::Cancelled,
        _ => JobErrorKind::InternalError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn registry() -> JobRegistry {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Database::new(temp_file.path()).await.unwrap();
        db.migrate().await.unwrap();
        JobRegistry::new(db)
    }

    fn sample_input() -> JobInput {
        JobInput {
            object_ref: "blob://input".to_string(),
            size_bytes: 1024,
            duration_s: Some(30.0),
        }
    }

    #[tokio::test]
    async fn submit_then_get_round_trips() {
        let registry = registry().await;
        let job_id = registry
            .submit("user-1", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();

        let job = registry.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.user_id, "user-1");
    }

    #[tokio::test]
    async fn claim_next_transitions_to_running_and_is_single_claim() {
        let registry = registry().await;
        let job_id = registry
            .submit("user-1", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();

        let claimed = registry.claim_next("worker-a").await.unwrap().unwrap();
        assert_eq!(claimed.job_id, job_id);
        assert_eq!(claimed.state, JobState::Running);

        let second = registry.claim_next("worker-b").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn claim_next_prefers_user_with_fewer_running_jobs() {
        let registry = registry().await;
        let busy_job = registry
            .submit("busy-user", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();
        registry.claim_next("worker-a").await.unwrap();

        registry
            .submit("busy-user", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();
        let quiet_job = registry
            .submit("quiet-user", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();

        let next = registry.claim_next("worker-b").await.unwrap().unwrap();
        assert_eq!(next.job_id, quiet_job);
        assert_ne!(next.job_id, busy_job);
    }

    #[tokio::test]
    async fn progress_updates_are_monotonic() {
        let registry = registry().await;
        let job_id = registry
            .submit("user-1", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();
        registry.claim_next("worker-a").await.unwrap();

        registry.update_progress(&job_id, 25).await.unwrap();
        registry.update_progress(&job_id, 10).await.unwrap();
        let job = registry.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, 25);

        registry.update_progress(&job_id, 60).await.unwrap();
        let job = registry.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, 60);
    }

    #[tokio::test]
    async fn complete_is_terminal_and_idempotent_guarded() {
        let registry = registry().await;
        let job_id = registry
            .submit("user-1", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();
        registry.claim_next("worker-a").await.unwrap();

        registry
            .complete(
                &job_id,
                JobResultSummary {
                    output_ref: "blob://output".to_string(),
                    censored_interval_count: 2,
                    total_censored_duration_s: 1.5,
                    processing_time_s: 3.2,
                },
            )
            .await
            .unwrap();

        let job = registry.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result.unwrap().censored_interval_count, 2);
    }

    #[tokio::test]
    async fn cancel_pending_job_transitions_immediately() {
        let registry = registry().await;
        let job_id = registry
            .submit("user-1", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();

        registry.cancel(&job_id).await.unwrap();
        let job = registry.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_running_job_flags_without_forcing_terminal_state() {
        let registry = registry().await;
        let job_id = registry
            .submit("user-1", sample_input(), JobConfig::default(), 24)
            .await
            .unwrap();
        registry.claim_next("worker-a").await.unwrap();

        registry.cancel(&job_id).await.unwrap();
        assert!(registry.cancel_requested(&job_id).await.unwrap());
        let job = registry.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Running);

        registry.finalize_cancelled(&job_id).await.unwrap();
        let job = registry.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }
}
