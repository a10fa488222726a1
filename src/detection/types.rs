//! Shared types for the detection engine (C2/C3/C4).

use serde::{Deserialize, Serialize};

/// A single profanity match produced by the regex scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexMatch {
    pub surface: String,
    pub language_tag: String,
    pub start_char: usize,
    pub end_char: usize,
    /// Highest `WordlistEntry::severity` among the entries that produced
    /// the matched surface form (§3 Wordlist Entry, §14).
    pub severity: u8,
}

/// Result of a single ML classifier prediction (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    pub is_abusive: bool,
    pub confidence: f32,
    pub error: Option<String>,
}

impl MlPrediction {
    pub fn disabled() -> Self {
        Self {
            is_abusive: false,
            confidence: 0.0,
            error: Some("model not loaded".to_string()),
        }
    }
}

/// Ensemble policy selecting how C2 and C3 are combined (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsemblePolicy {
    RegexOnly,
    MlOnly,
    FastFirst,
    Both,
}

impl Default for EnsemblePolicy {
    fn default() -> Self {
        EnsemblePolicy::FastFirst
    }
}

/// Which branch(es) contributed to a hybrid decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Regex,
    Ml,
    Ensemble,
    None,
}

/// Output of the hybrid detector for a single text (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub is_abusive: bool,
    pub confidence: f32,
    pub method: DetectionMethod,
    pub regex_matches: Vec<RegexMatch>,
    pub ml: Option<MlPrediction>,
    pub time_ms: f64,
}
