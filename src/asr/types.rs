//! ASR adapter types (C6 contract, spec.md §4.5).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Requested transcription quality, mapped from the job's subscription
/// tier by the pipeline runner (never chosen by the adapter itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl Quality {
    /// `free→base`, `basic→medium`, `pro→large`, `enterprise→large` (§4.5).
    pub fn for_subscription_tier(tier: &str) -> Self {
        match tier {
            "free" => Quality::Base,
            "basic" => Quality::Medium,
            "pro" | "enterprise" => Quality::Large,
            _ => Quality::Base,
        }
    }

    pub fn model_filename(&self) -> &'static str {
        match self {
            Quality::Tiny => "ggml-tiny.bin",
            Quality::Base => "ggml-base.bin",
            Quality::Small => "ggml-small.bin",
            Quality::Medium => "ggml-medium.bin",
            Quality::Large => "ggml-large-v3.bin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start_s: f64,
    pub end_s: f64,
}

/// Produced by C6, consumed by C7. Immutable after creation (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: u64,
    pub text: String,
    pub start_s: f64,
    pub end_s: f64,
    pub words: Vec<Word>,
    pub language_guess: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Error)]
pub enum AsrError {
    #[error("asr engine not installed or model artifact missing: {0}")]
    Unavailable(String),
    #[error("asr engine failed: {0}")]
    Failed(String),
    #[error("asr timed out after {0}s")]
    Timeout(u64),
}
