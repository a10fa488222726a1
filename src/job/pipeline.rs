//! C9 — Pipeline Runner: the deterministic per-job stage machine
//! (spec.md §4.8). `init → audio_extracted → transcribed → segmented →
//! censored → finalized`, with checkpointed progress and cooperative
//! cancellation between stages and after subprocess steps.

use std::sync::Arc;
use std::time::Instant;

use crate::asr::AsrEngine;
use crate::detection::HybridDetector;
use crate::external::ObjectStore;
use crate::job::registry::JobRegistry;
use crate::job::types::{Job, JobErrorKind, JobErrorRecord, JobResultSummary, LanguageTag};
use crate::media::{CancelToken, CensorOperator, CensoringPlan, FfmpegTool, MediaError};
use crate::segment_mapper::{self, SegmentMapperConfig};
use crate::asr::{AsrError, Quality};

pub struct PipelineRunner {
    pub ffmpeg: FfmpegTool,
    pub asr: Arc<dyn AsrEngine>,
    pub detector: Arc<HybridDetector>,
    pub object_store: Arc<dyn ObjectStore>,
    pub registry: Arc<JobRegistry>,
}

const PROGRESS_START: u8 = 5;
const PROGRESS_TRANSCRIBED: u8 = 25;
const PROGRESS_SEGMENTED: u8 = 60;
const PROGRESS_CENSORED: u8 = 85;
const PROGRESS_DONE: u8 = 100;

impl PipelineRunner {
    /// Run one job to completion inside `workspace`. Never panics: all
    /// failure paths return a `JobErrorRecord` for the caller (the worker
    /// pool) to persist via `JobRegistry::fail`.
    pub async fn run(
        &self,
        job: &Job,
        workspace: &std::path::Path,
        quality: Quality,
        cancel: &CancelToken,
    ) -> Result<JobResultSummary, JobErrorRecord> {
        let started = Instant::now();

        if self.detector.detector_unavailable() {
            return Err(JobErrorRecord {
                kind: JobErrorKind::DetectorUnavailable,
                detail: "ensemble policy requires the ML classifier but none is loaded".to_string(),
            });
        }

        self.registry
            .update_progress(&job.job_id, PROGRESS_START)
            .await
            .ok();

        let input_path = workspace.join("input.mp4");
        self.object_store
            .get(&job.input.object_ref, &input_path)
            .await
            .map_err(|e| internal_error(format!("failed to fetch input: {e}")))?;

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let input_duration_s = self
            .ffmpeg
            .probe_duration_s(&input_path)
            .await
            .map_err(media_error_to_job_error)?;

        let wav_path = workspace.join("audio.wav");
        self.ffmpeg
            .extract_audio_wav(&input_path, &wav_path, cancel)
            .await
            .map_err(media_error_to_job_error)?;

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let language_hints: Vec<String> = job
            .config
            .languages
            .iter()
            .filter(|tag| **tag != LanguageTag::Auto)
            .map(|tag| tag.as_str().to_string())
            .collect();

        let transcript = self
            .asr
            .transcribe(&wav_path, quality, &language_hints)
            .await
            .map_err(asr_error_to_job_error)?;

        self.registry
            .update_progress(&job.job_id, PROGRESS_TRANSCRIBED)
            .await
            .ok();

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let mapper_config = SegmentMapperConfig {
            threshold: job.config.threshold,
            merge_gap_s: 0.12,
            padding_before_s: job.config.padding_before_s,
            padding_after_s: job.config.padding_after_s,
        };
        let intervals = segment_mapper::map_segments(
            &transcript.segments,
            &self.detector,
            &mapper_config,
            input_duration_s,
        );

        self.registry
            .update_progress(&job.job_id, PROGRESS_SEGMENTED)
            .await
            .ok();

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let total_censored_duration_s: f64 = intervals.iter().map(|i| i.end_s - i.start_s).sum();
        let censored_interval_count = intervals.len() as u32;

        let plan = CensoringPlan {
            intervals,
            mode: job.config.mode,
        };

        let censor_op = CensorOperator::new(&self.ffmpeg);
        let output_path = censor_op
            .censor(&input_path, &plan, workspace, cancel)
            .await
            .map_err(media_error_to_job_error)?;

        self.registry
            .update_progress(&job.job_id, PROGRESS_CENSORED)
            .await
            .ok();

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let output_ref = self
            .object_store
            .put(&output_path)
            .await
            .map_err(|e| internal_error(format!("failed to store output artifact: {e}")))?;

        self.registry
            .update_progress(&job.job_id, PROGRESS_DONE)
            .await
            .ok();

        Ok(JobResultSummary {
            output_ref,
            censored_interval_count,
            total_censored_duration_s,
            processing_time_s: started.elapsed().as_secs_f64(),
        })
    }
}

fn cancelled() -> JobErrorRecord {
    JobErrorRecord {
        kind: JobErrorKind::Cancelled,
        detail: "job cancelled during pipeline execution".to_string(),
    }
}

fn internal_error(detail: String) -> JobErrorRecord {
    JobErrorRecord {
        kind: JobErrorKind::InternalError,
        detail,
    }
}

fn media_error_to_job_error(e: MediaError) -> JobErrorRecord {
    let kind = match &e {
        MediaError::ExtractFailed(_) => JobErrorKind::MediaExtractFailed,
        MediaError::ProbeFailed(_) => JobErrorKind::InputUnreadable,
        MediaError::MuxFailed(_) => JobErrorKind::MediaMuxFailed,
        MediaError::EmptyOutput => JobErrorKind::EmptyOutput,
        MediaError::OutputTooShort => JobErrorKind::OutputTooShort,
        MediaError::Cancelled => JobErrorKind::Cancelled,
    };
    JobErrorRecord {
        kind,
        detail: e.to_string(),
    }
}

fn asr_error_to_job_error(e: AsrError) -> JobErrorRecord {
    let kind = match &e {
        AsrError::Unavailable(_) => JobErrorKind::AsrUnavailable,
        AsrError::Failed(_) => JobErrorKind::AsrFailed,
        AsrError::Timeout(_) => JobErrorKind::AsrTimeout,
    };
    JobErrorRecord {
        kind,
        detail: e.to_string(),
    }
}
