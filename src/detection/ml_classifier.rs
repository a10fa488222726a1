//! C3 — ML Classifier: `predict(text) -> { is_abusive, confidence }` backed
//! by a binary sequence classifier, with two interchangeable backends
//! selected by artifact inspection at load time (spec.md §9).
//!
//! Ground: `diarization/embedder.rs`'s ONNX `Environment`/`Session` usage
//! (the teacher's only first-party ONNX integration) and
//! `original_source/backend/services/abuse_classifier.py`'s threshold-based
//! `predict`/`predict_batch` contract.

use crate::detection::types::MlPrediction;
use ndarray::{Array2, CowArray};
use ort::{Environment, Session, SessionBuilder, Value};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("model artifact not found at {0}")]
    NotFound(PathBuf),
    #[error("unrecognized model artifact format at {0}")]
    UnrecognizedFormat(PathBuf),
    #[error("failed to load model: {0}")]
    LoadFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    SequenceClassifier,
    LinearTfidf,
}

/// A loaded classifier's capability set (spec.md §9 "Classifier polymorphism").
pub trait ClassifierBackend: Send + Sync {
    fn predict_one(&self, text: &str) -> MlPrediction;
    fn kind(&self) -> ModelKind;
}

/// ONNX-backed sequence classifier. Expects a model that takes a fixed-width
/// bag-of-token-id tensor and returns `[P(clean), P(abuse)]`.
pub struct SequenceClassifier {
    _environment: Arc<Environment>,
    session: Session,
    vocab: HashMap<String, i64>,
    max_len: usize,
    threshold: f32,
}

impl SequenceClassifier {
    fn tokenize(&self, text: &str) -> Vec<i64> {
        let normalized = crate::text_norm::normalize(text);
        let mut ids: Vec<i64> = normalized
            .split_whitespace()
            .map(|w| *self.vocab.get(w).unwrap_or(&0))
            .collect();
        ids.truncate(self.max_len);
        ids.resize(self.max_len, 0);
        ids
    }
}

impl ClassifierBackend for SequenceClassifier {
    fn predict_one(&self, text: &str) -> MlPrediction {
        let ids = self.tokenize(text);
        let input = Array2::from_shape_vec((1, self.max_len), ids.iter().map(|&i| i as f32).collect());
        let input = match input {
            Ok(arr) => arr,
            Err(e) => {
                return MlPrediction {
                    is_abusive: false,
                    confidence: 0.0,
                    error: Some(format!("tensor shape error: {e}")),
                }
            }
        };
        let cow = CowArray::from(input).into_dyn();
        let value = match Value::from_array(self.session.allocator(), &cow) {
            Ok(v) => v,
            Err(e) => {
                return MlPrediction {
                    is_abusive: false,
                    confidence: 0.0,
                    error: Some(format!("failed to build input tensor: {e}")),
                }
            }
        };

        match self.session.run(vec![value]) {
            Ok(outputs) => match outputs[0].try_extract::<f32>() {
                Ok(tensor) => {
                    let view = tensor.view();
                    let probs: Vec<f32> = view.iter().copied().collect();
                    let confidence = probs.get(1).copied().unwrap_or(0.0);
                    MlPrediction {
                        is_abusive: confidence >= self.threshold,
                        confidence,
                        error: None,
                    }
                }
                Err(e) => MlPrediction {
                    is_abusive: false,
                    confidence: 0.0,
                    error: Some(format!("failed to extract output tensor: {e}")),
                },
            },
            Err(e) => MlPrediction {
                is_abusive: false,
                confidence: 0.0,
                error: Some(format!("inference failed: {e}")),
            },
        }
    }

    fn kind(&self) -> ModelKind {
        ModelKind::SequenceClassifier
    }
}

/// Linear model over a fixed bag-of-words vectorizer. Used when the
/// artifact is a plain JSON weights file rather than an ONNX graph.
#[derive(Debug, Deserialize)]
struct LinearArtifact {
    vocab: HashMap<String, usize>,
    weights: Vec<f32>,
    bias: f32,
    #[serde(default)]
    hard_labels_only: bool,
}

pub struct LinearTfidf {
    artifact: LinearArtifact,
    threshold: f32,
}

impl LinearTfidf {
    fn score(&self, text: &str) -> f32 {
        let normalized = crate::text_norm::normalize(text);
        let mut score = self.artifact.bias;
        for token in normalized.split_whitespace() {
            if let Some(&idx) = self.artifact.vocab.get(token) {
                if let Some(&w) = self.artifact.weights.get(idx) {
                    score += w;
                }
            }
        }
        score
    }
}

impl ClassifierBackend for LinearTfidf {
    fn predict_one(&self, text: &str) -> MlPrediction {
        let score = self.score(text);
        if self.artifact.hard_labels_only {
            let is_abusive = score > 0.0;
            return MlPrediction {
                is_abusive,
                confidence: if is_abusive { 1.0 } else { 0.0 },
                error: None,
            };
        }
        let confidence = 1.0 / (1.0 + (-score).exp());
        MlPrediction {
            is_abusive: confidence >= self.threshold,
            confidence,
            error: None,
        }
    }

    fn kind(&self) -> ModelKind {
        ModelKind::LinearTfidf
    }
}

/// Opaque handle over a loaded (or not-loaded) classifier. `predict` never
/// fails: a missing/broken model degrades to a disabled prediction and the
/// ensemble falls back to regex-only (spec.md §4.3).
pub struct ClassifierHandle {
    backend: Option<Box<dyn ClassifierBackend>>,
    pub threshold: f32,
}

impl ClassifierHandle {
    /// Attempt to load a classifier from `artifact_path`. Never returns an
    /// error: on any failure the handle enters the `disabled` state.
    pub fn load(artifact_path: &Path, threshold: f32) -> Self {
        match Self::try_load(artifact_path, threshold) {
            Ok(backend) => {
                info!(path = %artifact_path.display(), "ml classifier loaded");
                Self {
                    backend: Some(backend),
                    threshold,
                }
            }
            Err(e) => {
                warn!(path = %artifact_path.display(), error = %e, "ml classifier disabled");
                Self {
                    backend: None,
                    threshold,
                }
            }
        }
    }

    pub fn disabled(threshold: f32) -> Self {
        Self {
            backend: None,
            threshold,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    fn try_load(
        artifact_path: &Path,
        threshold: f32,
    ) -> Result<Box<dyn ClassifierBackend>, ClassifierError> {
        if !artifact_path.exists() {
            return Err(ClassifierError::NotFound(artifact_path.to_path_buf()));
        }

        match artifact_path.extension().and_then(|e| e.to_str()) {
            Some("onnx") => {
                let environment = Arc::new(
                    Environment::builder()
                        .with_name("censorly-detector")
                        .build()
                        .map_err(|e| ClassifierError::LoadFailed(e.to_string()))?,
                );
                let session = SessionBuilder::new(&environment)
                    .and_then(|b| b.with_model_from_file(artifact_path))
                    .map_err(|e| ClassifierError::LoadFailed(e.to_string()))?;

                let vocab_path = artifact_path.with_extension("vocab.json");
                let vocab: HashMap<String, i64> = std::fs::read_to_string(&vocab_path)
                    .ok()
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default();

                Ok(Box::new(SequenceClassifier {
                    _environment: environment,
                    session,
                    vocab,
                    max_len: 64,
                    threshold,
                }))
            }
            Some("json") => {
                let raw = std::fs::read_to_string(artifact_path)
                    .map_err(|e| ClassifierError::LoadFailed(e.to_string()))?;
                let artifact: LinearArtifact = serde_json::from_str(&raw)
                    .map_err(|e| ClassifierError::LoadFailed(e.to_string()))?;
                Ok(Box::new(LinearTfidf { artifact, threshold }))
            }
            _ => Err(ClassifierError::UnrecognizedFormat(artifact_path.to_path_buf())),
        }
    }

    pub fn predict(&self, text: &str) -> MlPrediction {
        if text.trim().is_empty() {
            return MlPrediction {
                is_abusive: false,
                confidence: 0.0,
                error: None,
            };
        }
        match &self.backend {
            Some(backend) => backend.predict_one(text),
            None => MlPrediction::disabled(),
        }
    }

    /// Order-preserving batch form; a failure on one text degrades that
    /// text's result without failing the batch (spec.md §4.3).
    pub fn predict_batch(&self, texts: &[String]) -> Vec<MlPrediction> {
        texts.iter().map(|t| self.predict(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_yields_disabled_handle() {
        let handle = ClassifierHandle::load(Path::new("/nonexistent/model.onnx"), 0.7);
        assert!(!handle.is_loaded());
        let pred = handle.predict("you fool");
        assert!(!pred.is_abusive);
        assert_eq!(pred.confidence, 0.0);
    }

    #[test]
    fn linear_artifact_predicts_from_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"vocab": {"fool": 0}, "weights": [5.0], "bias": -1.0}"#,
        )
        .unwrap();

        let handle = ClassifierHandle::load(&path, 0.5);
        assert!(handle.is_loaded());
        let pred = handle.predict("you fool");
        assert!(pred.is_abusive);
        assert!(pred.confidence > 0.5);
    }

    #[test]
    fn batch_is_order_preserving() {
        let handle = ClassifierHandle::disabled(0.5);
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = handle.predict_batch(&texts);
        assert_eq!(results.len(), 3);
    }
}
