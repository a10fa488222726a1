//! C5 — Audio Extractor and supporting ffmpeg subprocess helpers: probing,
//! extraction, trimming/concat, and final re-mux.
//!
//! Ground: `original_source/backend/utils/ffmpeg_tools.py`
//! (`extract_audio`, `merge_audio_to_video`, `cut_scenes`) adapted to
//! `tokio::process::Command` in the async-subprocess-with-cancellation
//! style of `ffui_core/engine/job_runner_process_execute.rs`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media_extract_failed: {0}")]
    ExtractFailed(String),
    #[error("media_probe_failed: {0}")]
    ProbeFailed(String),
    #[error("media_mux_failed: {0}")]
    MuxFailed(String),
    #[error("empty_output: censoring plan removes the entire input")]
    EmptyOutput,
    #[error("output_too_short: result duration below the 1 second floor")]
    OutputTooShort,
    #[error("job cancelled during media processing")]
    Cancelled,
}

/// Cooperative cancellation flag shared with the pipeline runner. Checked
/// between subprocess invocations and used to kill an in-flight one.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

/// Thin wrapper over the `ffmpeg`/`ffprobe` binaries on `PATH`. A single
/// instance is shared across a job run.
pub struct FfmpegTool {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegTool {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub async fn probe_duration_s(&self, input: &Path) -> Result<f64, MediaError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MediaError::ProbeFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(MediaError::ProbeFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| MediaError::ProbeFailed(format!("failed to parse ffprobe json: {e}")))?;
        parsed
            .format
            .duration
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| MediaError::ProbeFailed("duration missing from ffprobe output".into()))
    }

    /// Extract mono 16 kHz PCM WAV from `input` into `output`, the format
    /// the ASR engine (C6) requires. Writes to a temp path and renames on
    /// success so partial files never appear at the final path (§4.5
    /// atomic-overwrite requirement).
    pub async fn extract_audio_wav(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<(), MediaError> {
        self.extract_audio_wav_with_args(input, output, cancel, &["-ac", "1", "-ar", "16000"])
            .await
    }

    /// Extract PCM WAV from `input` at its native sample rate and channel
    /// count. Used by the censor path: mute/beep mode must "preserve
    /// sample rate and channel count" when replacing samples, unlike the
    /// downmixed-to-mono-16kHz copy the ASR engine consumes.
    pub async fn extract_audio_wav_native(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<(), MediaError> {
        self.extract_audio_wav_with_args(input, output, cancel, &[]).await
    }

    async fn extract_audio_wav_with_args(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
        extra_args: &[&str],
    ) -> Result<(), MediaError> {
        let tmp = tmp_sibling(output, "extract");
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
        ];
        args.extend(extra_args.iter().map(|s| s.to_string()));
        args.push(tmp.to_string_lossy().to_string());

        self.run_to_completion(&args, cancel)
            .await
            .map_err(MediaError::ExtractFailed)?;

        std::fs::rename(&tmp, output).map_err(|e| {
            MediaError::ExtractFailed(format!("failed to finalize extracted audio: {e}"))
        })
    }

    /// Re-mux `video_track` (video stream only, stream-copied) with
    /// `audio_track` (re-encoded AAC) into `output`.
    pub async fn remux_audio(
        &self,
        video_track: &Path,
        audio_track: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<(), MediaError> {
        let tmp = tmp_sibling(output, "remux");
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            video_track.to_string_lossy().to_string(),
            "-i".to_string(),
            audio_track.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-shortest".to_string(),
            tmp.to_string_lossy().to_string(),
        ];

        self.run_to_completion(&args, cancel)
            .await
            .map_err(MediaError::MuxFailed)?;

        std::fs::rename(&tmp, output)
            .map_err(|e| MediaError::MuxFailed(format!("failed to finalize mux: {e}")))
    }

    /// Stream-copy-extract `[start_s, end_s)` of `input` into `output`,
    /// used by cut-mode censoring.
    pub async fn extract_segment(
        &self,
        input: &Path,
        start_s: f64,
        end_s: f64,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<(), MediaError> {
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{start_s:.3}"),
            "-to".to_string(),
            format!("{end_s:.3}"),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
            output.to_string_lossy().to_string(),
        ];
        self.run_to_completion(&args, cancel)
            .await
            .map_err(MediaError::MuxFailed)
    }

    /// Concatenate the stream-copied segment files at `segment_paths`
    /// (already in order) into `output` using ffmpeg's concat demuxer.
    pub async fn concat_segments(
        &self,
        segment_paths: &[PathBuf],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<(), MediaError> {
        let list_path = tmp_sibling(output, "concat-list").with_extension("txt");
        let list_contents: String = segment_paths
            .iter()
            .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
            .collect();
        std::fs::write(&list_path, list_contents)
            .map_err(|e| MediaError::MuxFailed(format!("failed to write concat list: {e}")))?;

        let tmp = tmp_sibling(output, "concat");
        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            tmp.to_string_lossy().to_string(),
        ];

        let result = self.run_to_completion(&args, cancel).await;
        let _ = std::fs::remove_file(&list_path);
        result.map_err(MediaError::MuxFailed)?;

        std::fs::rename(&tmp, output)
            .map_err(|e| MediaError::MuxFailed(format!("failed to finalize concat: {e}")))
    }

    async fn run_to_completion(&self, args: &[String], cancel: &CancelToken) -> Result<(), String> {
        if cancel.is_cancelled() {
            return Err("job cancelled before subprocess start".to_string());
        }

        debug!(?args, "spawning ffmpeg");
        let mut child: Child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn ffmpeg: {e}"))?;

        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status.map_err(|e| format!("ffmpeg wait failed: {e}"))?;
                    if status.success() {
                        return Ok(());
                    }
                    let mut stderr_buf = String::new();
                    if let Some(mut stderr) = child.stderr.take() {
                        use tokio::io::AsyncReadExt;
                        let _ = stderr.read_to_string(&mut stderr_buf).await;
                    }
                    return Err(format!("ffmpeg exited with {status}: {stderr_buf}"));
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {
                    if cancel.is_cancelled() {
                        warn!("cancellation requested, killing ffmpeg subprocess");
                        let _ = child.kill().await;
                        return Err("job cancelled while ffmpeg was running".to_string());
                    }
                }
            }
        }
    }
}

fn tmp_sibling(output: &Path, tag: &str) -> PathBuf {
    let file_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    output.with_file_name(format!(".{file_name}.{tag}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_sibling_is_hidden_and_tagged() {
        let out = PathBuf::from("/tmp/job123/result.mp4");
        let tmp = tmp_sibling(&out, "extract");
        assert_eq!(tmp, PathBuf::from("/tmp/job123/.result.mp4.extract.tmp"));
    }

    #[test]
    fn cancel_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
