//! C8 — Censor Operator: mute/beep/cut censoring over a source video and
//! an `AbusiveInterval` plan.
//!
//! Ground: `original_source/backend/utils/ffmpeg_tools.py`'s
//! `create_beep_sound`/`apply_beep`/`apply_mute`/`cut_scenes`, translated
//! from pydub sample manipulation to direct PCM editing via `hound`.

use crate::media::ffmpeg::{CancelToken, FfmpegTool, MediaError};
use crate::segment_mapper::{complement, AbusiveInterval};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CensorMode {
    Mute,
    Beep { frequency_hz: f32 },
    Cut,
}

impl Default for CensorMode {
    fn default() -> Self {
        CensorMode::Beep { frequency_hz: 1000.0 }
    }
}

#[derive(Debug, Clone)]
pub struct CensoringPlan {
    pub intervals: Vec<AbusiveInterval>,
    pub mode: CensorMode,
}

const BEEP_GAIN: f32 = 0.501_187_f32; // -6 dB relative to full scale
const FADE_MS: f64 = 10.0;

pub struct CensorOperator<'a> {
    ffmpeg: &'a FfmpegTool,
}

impl<'a> CensorOperator<'a> {
    pub fn new(ffmpeg: &'a FfmpegTool) -> Self {
        Self { ffmpeg }
    }

    pub async fn censor(
        &self,
        video_path: &Path,
        plan: &CensoringPlan,
        workspace: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf, MediaError> {
        match plan.mode {
            CensorMode::Mute => self.censor_audio_replace(video_path, &plan.intervals, None, workspace, cancel).await,
            CensorMode::Beep { frequency_hz } => {
                self.censor_audio_replace(video_path, &plan.intervals, Some(frequency_hz), workspace, cancel).await
            }
            CensorMode::Cut => self.censor_cut(video_path, &plan.intervals, workspace, cancel).await,
        }
    }

    async fn censor_audio_replace(
        &self,
        video_path: &Path,
        intervals: &[AbusiveInterval],
        beep_frequency_hz: Option<f32>,
        workspace: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf, MediaError> {
        let extracted_wav = workspace.join("extracted.wav");
        self.ffmpeg.extract_audio_wav_native(video_path, &extracted_wav, cancel).await?;

        let censored_wav = workspace.join("censored.wav");
        replace_intervals_in_wav(&extracted_wav, &censored_wav, intervals, beep_frequency_hz)
            .map_err(|e| MediaError::MuxFailed(format!("failed to edit audio samples: {e}")))?;

        let output = workspace.join("output.mp4");
        self.ffmpeg.remux_audio(video_path, &censored_wav, &output, cancel).await?;

        let duration = self.ffmpeg.probe_duration_s(&output).await?;
        if duration < 1.0 {
            return Err(MediaError::OutputTooShort);
        }
        Ok(output)
    }

    async fn censor_cut(
        &self,
        video_path: &Path,
        intervals: &[AbusiveInterval],
        workspace: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf, MediaError> {
        let total_duration = self.ffmpeg.probe_duration_s(video_path).await?;
        let keep_ranges = complement(intervals, total_duration);
        if keep_ranges.is_empty() {
            return Err(MediaError::EmptyOutput);
        }

        let mut segment_paths = Vec::with_capacity(keep_ranges.len());
        for (i, (start, end)) in keep_ranges.iter().enumerate() {
            let segment_path = workspace.join(format!("segment_{i:04}.mp4"));
            self.ffmpeg
                .extract_segment(video_path, *start, *end, &segment_path, cancel)
                .await?;
            segment_paths.push(segment_path);
        }

        let output = workspace.join("output.mp4");
        if segment_paths.len() == 1 {
            std::fs::rename(&segment_paths[0], &output)
                .map_err(|e| MediaError::MuxFailed(format!("failed to finalize single-segment cut: {e}")))?;
        } else {
            self.ffmpeg.concat_segments(&segment_paths, &output, cancel).await?;
        }

        let duration = self.ffmpeg.probe_duration_s(&output).await?;
        info!(kept_ranges = keep_ranges.len(), output_duration_s = duration, "cut censoring complete");
        if duration < 1.0 {
            return Err(MediaError::OutputTooShort);
        }
        Ok(output)
    }
}

/// Rewrite `input` to `output`, replacing samples within each interval with
/// either silence (`beep_frequency_hz: None`) or a faded sine tone.
fn replace_intervals_in_wav(
    input: &Path,
    output: &Path,
    intervals: &[AbusiveInterval],
    beep_frequency_hz: Option<f32>,
) -> Result<(), hound::Error> {
    let mut reader = hound::WavReader::open(input)?;
    let spec = reader.spec();
    let mut samples: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;

    // Samples are interleaved per frame (one per channel); all indexing
    // below is in frames and expanded to the sample range spanning every
    // channel, so stereo/multi-channel audio is edited correctly instead
    // of only touching every Nth (left-channel) sample.
    let channels = spec.channels as usize;
    let frame_count = samples.len() / channels.max(1);
    let sample_rate = spec.sample_rate as f64;

    for interval in intervals {
        let start_frame = (interval.start_s * sample_rate).round().max(0.0) as usize;
        let end_frame = ((interval.end_s * sample_rate).round() as usize).min(frame_count);
        if start_frame >= end_frame {
            continue;
        }
        let start_idx = start_frame * channels;
        let end_idx = end_frame * channels;

        match beep_frequency_hz {
            None => {
                for s in &mut samples[start_idx..end_idx] {
                    *s = 0;
                }
            }
            Some(freq) => {
                let n_frames = end_frame - start_frame;
                let fade_samples = ((FADE_MS / 1000.0) * sample_rate) as usize;
                for (frame_i, frame) in samples[start_idx..end_idx].chunks_mut(channels).enumerate() {
                    let t = frame_i as f64 / sample_rate;
                    let raw = (2.0 * std::f64::consts::PI * freq as f64 * t).sin() as f32;
                    let envelope = fade_envelope(frame_i, n_frames, fade_samples);
                    let amplitude = raw * BEEP_GAIN * envelope;
                    let value = (amplitude * i16::MAX as f32) as i16;
                    for s in frame {
                        *s = value;
                    }
                }
            }
        }
    }

    let mut writer = hound::WavWriter::create(output, spec)?;
    for s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()
}

/// Linear fade-in/out envelope over `fade_samples` at each end of an
/// `n`-sample-long tone.
fn fade_envelope(i: usize, n: usize, fade_samples: usize) -> f32 {
    if fade_samples == 0 || n == 0 {
        return 1.0;
    }
    let fade_samples = fade_samples.min(n / 2).max(1);
    if i < fade_samples {
        i as f32 / fade_samples as f32
    } else if i >= n - fade_samples {
        (n - i) as f32 / fade_samples as f32
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_silence_wav(path: &Path, seconds: f64, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * sample_rate as f64) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn mute_zeroes_out_interval_samples() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_silence_wav(&input, 2.0, 16000);

        let intervals = vec![AbusiveInterval {
            start_s: 0.5,
            end_s: 1.0,
            confidence: 1.0,
            matched_words: vec![],
            max_severity: None,
        }];
        replace_intervals_in_wav(&input, &output, &intervals, None).unwrap();

        let mut reader = hound::WavReader::open(&output).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 32000);
        assert_eq!(samples[8000], 0);
    }

    #[test]
    fn beep_fades_to_zero_at_interval_edges() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_silence_wav(&input, 1.0, 16000);

        let intervals = vec![AbusiveInterval {
            start_s: 0.2,
            end_s: 0.5,
            confidence: 1.0,
            matched_words: vec![],
            max_severity: None,
        }];
        replace_intervals_in_wav(&input, &output, &intervals, Some(1000.0)).unwrap();

        let mut reader = hound::WavReader::open(&output).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let start_idx = (0.2 * 16000.0) as usize;
        assert_eq!(samples[start_idx], 0);
    }

    #[test]
    fn fade_envelope_is_one_away_from_edges() {
        assert_eq!(fade_envelope(50, 100, 10), 1.0);
        assert_eq!(fade_envelope(0, 100, 10), 0.0);
    }
}
