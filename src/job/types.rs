//! C10/C9 shared types: `Job`, `JobConfig`, state machine, and the
//! enumerated error kinds (spec.md §3, §6, §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::detection::EnsemblePolicy;
use crate::media::CensorMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

/// Recognized language tags (spec.md §6). `Auto` defers detection to C6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanguageTag {
    English,
    Hindi,
    Hinglish,
    HindiDevanagari,
    HindiUrduScript,
    Auto,
}

impl LanguageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageTag::English => "english",
            LanguageTag::Hindi => "hindi",
            LanguageTag::Hinglish => "hinglish",
            LanguageTag::HindiDevanagari => "hindi-devanagari",
            LanguageTag::HindiUrduScript => "hindi-urdu-script",
            LanguageTag::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "english" => Some(LanguageTag::English),
            "hindi" => Some(LanguageTag::Hindi),
            "hinglish" => Some(LanguageTag::Hinglish),
            "hindi-devanagari" => Some(LanguageTag::HindiDevanagari),
            "hindi-urdu-script" => Some(LanguageTag::HindiUrduScript),
            "auto" => Some(LanguageTag::Auto),
            _ => None,
        }
    }
}

/// Recognized submit-time options (spec.md §6). Validated eagerly by
/// [`JobConfig::validate`]; an invalid config never reaches the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub mode: CensorMode,
    #[serde(default = "JobConfig::default_threshold")]
    pub threshold: f32,
    #[serde(default = "JobConfig::default_languages")]
    pub languages: Vec<LanguageTag>,
    #[serde(default = "JobConfig::default_padding")]
    pub padding_before_s: f64,
    #[serde(default = "JobConfig::default_padding")]
    pub padding_after_s: f64,
    #[serde(default)]
    pub ensemble_policy: EnsemblePolicy,
}

impl JobConfig {
    fn default_threshold() -> f32 {
        0.3
    }

    fn default_languages() -> Vec<LanguageTag> {
        vec![LanguageTag::Auto]
    }

    fn default_padding() -> f64 {
        0.05
    }

    /// Eager validation at submit time (spec.md §7: `invalid_config` never
    /// reaches the runner).
    pub fn validate(&self) -> Result<(), JobErrorKind> {
        if !(0.1..=1.0).contains(&self.threshold) {
            return Err(JobErrorKind::InvalidConfig);
        }
        if self.padding_before_s < 0.0 || self.padding_after_s < 0.0 {
            return Err(JobErrorKind::InvalidConfig);
        }
        if self.languages.is_empty() {
            return Err(JobErrorKind::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            mode: CensorMode::default(),
            threshold: Self::default_threshold(),
            languages: Self::default_languages(),
            padding_before_s: Self::default_padding(),
            padding_after_s: Self::default_padding(),
            ensemble_policy: EnsemblePolicy::default(),
        }
    }
}

/// Stable error-kind strings surfaced to users (spec.md §7). `Display`
/// yields exactly the enumerated wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    #[error("invalid_config")]
    InvalidConfig,
    #[error("input_unreadable")]
    InputUnreadable,
    #[error("media_extract_failed")]
    MediaExtractFailed,
    #[error("asr_unavailable")]
    AsrUnavailable,
    #[error("asr_failed")]
    AsrFailed,
    #[error("asr_timeout")]
    AsrTimeout,
    #[error("detector_unavailable")]
    DetectorUnavailable,
    #[error("empty_output")]
    EmptyOutput,
    #[error("output_too_short")]
    OutputTooShort,
    #[error("media_mux_failed")]
    MediaMuxFailed,
    #[error("quota_exceeded")]
    QuotaExceeded,
    #[error("timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("internal_error")]
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobErrorRecord {
    pub kind: JobErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub object_ref: String,
    pub size_bytes: u64,
    pub duration_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultSummary {
    pub output_ref: String,
    pub censored_interval_count: u32,
    pub total_censored_duration_s: f64,
    pub processing_time_s: f64,
}

/// The central entity (spec.md §3). Rows are exclusively owned by the Job
/// Registry; the Pipeline Runner receives a short-lived mutable handle for
/// progress updates during `running` and never writes other fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub user_id: String,
    pub input: JobInput,
    pub config: JobConfig,
    pub state: JobState,
    pub progress: u8,
    pub result: Option<JobResultSummary>,
    pub error: Option<JobErrorRecord>,
    pub claimed_by: Option<String>,
    pub cancel_requested: bool,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub expires_at: String,
}

impl Job {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.mode, CensorMode::Beep { frequency_hz: 1000.0 });
        assert_eq!(config.threshold, 0.3);
        assert_eq!(config.languages, vec![LanguageTag::Auto]);
        assert_eq!(config.padding_before_s, 0.05);
        assert_eq!(config.padding_after_s, 0.05);
        assert_eq!(config.ensemble_policy, EnsemblePolicy::FastFirst);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn threshold_out_of_range_is_invalid() {
        let mut config = JobConfig::default();
        config.threshold = 0.05;
        assert_eq!(config.validate().unwrap_err(), JobErrorKind::InvalidConfig);
    }

    #[test]
    fn negative_padding_is_invalid() {
        let mut config = JobConfig::default();
        config.padding_before_s = -0.1;
        assert_eq!(config.validate().unwrap_err(), JobErrorKind::InvalidConfig);
    }

    #[test]
    fn error_kind_display_matches_wire_string() {
        assert_eq!(JobErrorKind::DetectorUnavailable.to_string(), "detector_unavailable");
        assert_eq!(JobErrorKind::EmptyOutput.to_string(), "empty_output");
    }

    #[test]
    fn job_state_round_trips_through_str() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
    }
}
