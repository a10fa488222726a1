//! C6 — ASR Adapter: whisper.cpp-backed transcription producing
//! timestamped segments and, where available, word-level timestamps.
//!
//! Ground: `diarization/embedder.rs`'s lazy-session-load pattern and
//! `original_source/modules/transcribe.py`'s segment/word dict shape.

use crate::asr::types::{AsrError, Quality, Transcript, TranscriptSegment, Word};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Configuration resolved once at engine construction.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub models_dir: PathBuf,
    pub num_threads: i32,
    pub timeout_s: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            models_dir: dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("censorly")
                .join("models"),
            num_threads: 4,
            timeout_s: 600,
        }
    }
}

/// Loaded whisper.cpp contexts, keyed by quality tier, loaded lazily and
/// cached for the process lifetime. Each `WhisperContext` is `Send + Sync`
/// internally; state objects are created per call.
pub struct WhisperEngine {
    config: WhisperConfig,
    contexts: Mutex<HashMap<Quality, std::sync::Arc<WhisperContext>>>,
    // whisper.cpp's `full` is not safely reentrant per-context; serialize
    // calls into the same context with this lock (teacher's
    // `context_cache: Mutex<...>` pattern in the original engine).
    call_lock: AsyncMutex<()>,
}

impl WhisperEngine {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            config,
            contexts: Mutex::new(HashMap::new()),
            call_lock: AsyncMutex::new(()),
        }
    }

    fn model_path(&self, quality: Quality) -> PathBuf {
        self.config.models_dir.join(quality.model_filename())
    }

    fn load_context(&self, quality: Quality) -> Result<std::sync::Arc<WhisperContext>, AsrError> {
        let mut contexts = self.contexts.lock().expect("whisper context cache lock poisoned");
        if let Some(ctx) = contexts.get(&quality) {
            return Ok(ctx.clone());
        }

        let path = self.model_path(quality);
        if !path.exists() {
            return Err(AsrError::Unavailable(format!(
                "model artifact missing at {}",
                path.display()
            )));
        }

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(&path.to_string_lossy(), params)
            .map_err(|e| AsrError::Failed(format!("failed to load model: {e}")))?;
        let ctx = std::sync::Arc::new(ctx);
        contexts.insert(quality, ctx.clone());
        Ok(ctx)
    }

    /// Transcribe `wav_path` (mono 16 kHz PCM, produced by C5) at the
    /// requested `quality`, optionally constrained to `language_hints`.
    /// `language_hints` of `["auto"]` or empty lets the engine detect.
    pub async fn transcribe(
        &self,
        wav_path: &Path,
        quality: Quality,
        language_hints: &[String],
    ) -> Result<Transcript, AsrError> {
        let ctx = self.load_context(quality)?;
        let samples = read_wav_mono_f32(wav_path)
            .map_err(|e| AsrError::Failed(format!("failed to read wav: {e}")))?;

        let language = resolve_language_hint(language_hints);
        let num_threads = self.config.num_threads;
        let timeout = Duration::from_secs(self.config.timeout_s);

        let _permit = self.call_lock.lock().await;
        let result = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || run_full(ctx, samples, language, num_threads)),
        )
        .await
        .map_err(|_| AsrError::Timeout(timeout.as_secs()))?
        .map_err(|e| AsrError::Failed(format!("asr worker task panicked: {e}")))??;

        Ok(result)
    }
}

fn resolve_language_hint(hints: &[String]) -> Option<String> {
    match hints.first().map(String::as_str) {
        None | Some("auto") => None,
        Some(lang) => Some(lang.to_string()),
    }
}

fn run_full(
    ctx: std::sync::Arc<WhisperContext>,
    samples: Vec<f32>,
    language: Option<String>,
    num_threads: i32,
) -> Result<Transcript, AsrError> {
    let mut state = ctx
        .create_state()
        .map_err(|e| AsrError::Failed(format!("failed to create inference state: {e}")))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_n_threads(num_threads);
    params.set_translate(false);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_token_timestamps(true);
    if let Some(lang) = &language {
        params.set_language(Some(lang.as_str()));
    }

    state
        .full(params, &samples)
        .map_err(|e| AsrError::Failed(format!("inference failed: {e}")))?;

    let detected_language = state.full_lang_id_from_state().ok();
    let language_tag = detected_language
        .map(|id| whisper_rs::WhisperContext::lang_str(id).to_string())
        .or(language)
        .unwrap_or_else(|| "unknown".to_string());

    let num_segments = state
        .full_n_segments()
        .map_err(|e| AsrError::Failed(format!("failed to read segment count: {e}")))?;

    let mut segments = Vec::with_capacity(num_segments as usize);
    for i in 0..num_segments {
        let text = state
            .full_get_segment_text(i)
            .map_err(|e| AsrError::Failed(format!("failed to read segment text: {e}")))?;
        let t0 = state.full_get_segment_t0(i).unwrap_or(0);
        let t1 = state.full_get_segment_t1(i).unwrap_or(0);

        let mut words = Vec::new();
        if let Ok(n_tokens) = state.full_n_tokens(i) {
            for j in 0..n_tokens {
                if let Ok(token_data) = state.full_get_token_data(i, j) {
                    let token_text = state.full_get_token_text(i, j).unwrap_or_default();
                    let trimmed = token_text.trim();
                    if trimmed.is_empty() || trimmed.starts_with('[') {
                        continue;
                    }
                    words.push(Word {
                        text: trimmed.to_string(),
                        start_s: token_data.t0 as f64 / 100.0,
                        end_s: token_data.t1 as f64 / 100.0,
                    });
                }
            }
        }

        segments.push(TranscriptSegment {
            id: i as u64,
            text: text.trim().to_string(),
            start_s: t0 as f64 / 100.0,
            end_s: t1 as f64 / 100.0,
            words,
            language_guess: None,
        });
    }

    Ok(Transcript {
        language: language_tag,
        segments,
    })
}

fn read_wav_mono_f32(path: &Path) -> Result<Vec<f32>, hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    debug!(sample_rate = spec.sample_rate, channels = spec.channels, "reading wav for asr");

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()?,
    };

    if spec.channels > 1 {
        warn!(channels = spec.channels, "wav is not mono; downmixing by averaging channels");
        let channels = spec.channels as usize;
        return Ok(samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect());
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_explicit_language_hint() {
        assert_eq!(resolve_language_hint(&["hi".to_string()]), Some("hi".to_string()));
    }

    #[test]
    fn auto_and_empty_hints_mean_detect() {
        assert_eq!(resolve_language_hint(&["auto".to_string()]), None);
        assert_eq!(resolve_language_hint(&[]), None);
    }

    #[tokio::test]
    async fn missing_model_artifact_yields_unavailable() {
        let config = WhisperConfig {
            models_dir: std::env::temp_dir().join("censorly-test-missing-models"),
            ..Default::default()
        };
        let engine = WhisperEngine::new(config);
        let err = engine
            .transcribe(Path::new("/nonexistent/audio.wav"), Quality::Base, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AsrError::Unavailable(_)));
    }
}
