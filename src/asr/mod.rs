//! ASR adapter (C6): a pluggable interface over an external speech-to-text
//! engine, producing timestamped transcript segments.

pub mod types;
pub mod whisper;

pub use types::{AsrError, Quality, Transcript, TranscriptSegment, Word};
pub use whisper::{WhisperConfig, WhisperEngine};

use async_trait::async_trait;
use std::path::Path;

/// Capability boundary consumed by the pipeline runner (§6 "ASR engine").
/// `WhisperEngine` is the only first-party implementation; the trait exists
/// so tests can substitute a fake transcriber.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    async fn transcribe(
        &self,
        wav_path: &Path,
        quality: Quality,
        language_hints: &[String],
    ) -> Result<Transcript, AsrError>;
}

#[async_trait]
impl AsrEngine for WhisperEngine {
    async fn transcribe(
        &self,
        wav_path: &Path,
        quality: Quality,
        language_hints: &[String],
    ) -> Result<Transcript, AsrError> {
        WhisperEngine::transcribe(self, wav_path, quality, language_hints).await
    }
}
