//! Wordlist document: the language-partitioned collection of profane surface
//! forms used to build the regex scanner's compiled pattern set (C2).
//!
//! Ground: `original_source/backend/services/profanity_scanner.py`'s
//! `learned_words.json` format and `_create_default_wordlist`/`add_words`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WordlistError {
    #[error("failed to read wordlist document at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write wordlist document at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse wordlist document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single profane surface form plus optional metadata (§3 `Wordlist Entry`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordlistEntry {
    pub surface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default)]
    pub severity: u8,
}

impl WordlistEntry {
    pub fn bare(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            meaning: None,
            severity: 0,
        }
    }
}

/// An entry in the document may be a bare string or an object with metadata,
/// matching the original's `{language_tag: [entry...]}` shape where `entry`
/// is either a string or `{surface, meaning?, severity?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Bare(String),
    Full {
        surface: String,
        #[serde(default)]
        meaning: Option<String>,
        #[serde(default)]
        severity: u8,
    },
}

impl From<RawEntry> for WordlistEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Bare(surface) => WordlistEntry::bare(surface),
            RawEntry::Full {
                surface,
                meaning,
                severity,
            } => WordlistEntry {
                surface,
                meaning,
                severity,
            },
        }
    }
}

impl From<WordlistEntry> for RawEntry {
    fn from(entry: WordlistEntry) -> Self {
        RawEntry::Full {
            surface: entry.surface,
            meaning: entry.meaning,
            severity: entry.severity,
        }
    }
}

/// A versioned document grouping wordlist entries by language tag.
#[derive(Debug, Clone, Default)]
pub struct Wordlist {
    pub entries: HashMap<String, Vec<WordlistEntry>>,
}

impl Wordlist {
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn default_seed() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "english".to_string(),
            vec![
                "fuck", "shit", "bitch", "asshole", "damn", "bastard", "motherfucker",
                "cocksucker", "dickhead", "cunt",
            ]
            .into_iter()
            .map(WordlistEntry::bare)
            .collect(),
        );
        entries.insert(
            "hindi".to_string(),
            vec![
                "chutiya",
                "madarchod",
                "bhenchod",
                "bhosadike",
                "randi",
                "harami",
                "gandu",
                "lund",
                "chut",
                "gaand",
                "kamina",
                "saala",
                "kutti",
            ]
            .into_iter()
            .map(WordlistEntry::bare)
            .collect(),
        );
        entries.insert(
            "hinglish".to_string(),
            vec!["bc", "mc", "bkl", "wtf", "stfu", "gtfo"]
                .into_iter()
                .map(WordlistEntry::bare)
                .collect(),
        );
        Self { entries }
    }

    /// Load the wordlist document from `path`, seeding a small default set
    /// if it does not yet exist. Startup load failures are fatal to the
    /// process per spec.md §7; callers should propagate the error.
    pub fn load_or_seed(path: &Path) -> Result<Self, WordlistError> {
        if !path.exists() {
            let seeded = Self::default_seed();
            seeded.save(path)?;
            return Ok(seeded);
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self, WordlistError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WordlistError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: HashMap<String, Vec<RawEntry>> = serde_json::from_str(&raw)?;
        let entries = doc
            .into_iter()
            .map(|(lang, raws)| (lang, raws.into_iter().map(WordlistEntry::from).collect()))
            .collect();
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<(), WordlistError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WordlistError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let doc: HashMap<String, Vec<RawEntry>> = self
            .entries
            .iter()
            .map(|(lang, entries)| {
                (
                    lang.clone(),
                    entries.iter().cloned().map(RawEntry::from).collect(),
                )
            })
            .collect();
        let serialized = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, serialized).map_err(|source| WordlistError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Admin-only, append-only augmentation hook (spec.md §9's open
    /// question: this is explicitly *not* invoked by the pipeline runner).
    pub fn add_entries(
        &mut self,
        language: &str,
        new_entries: Vec<WordlistEntry>,
        path: &Path,
    ) -> Result<(), WordlistError> {
        let bucket = self.entries.entry(language.to_string()).or_default();
        for entry in new_entries {
            if !bucket.iter().any(|e| e.surface == entry.surface) {
                bucket.push(entry);
            }
        }
        self.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn seeds_default_wordlist_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wordlist.json");
        let wl = Wordlist::load_or_seed(&path).unwrap();
        assert!(path.exists());
        assert!(wl.entries.contains_key("english"));
    }

    #[test]
    fn round_trips_bare_and_full_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wordlist.json");
        std::fs::write(
            &path,
            r#"{"english": ["fuck", {"surface": "shit", "severity": 3}]}"#,
        )
        .unwrap();
        let wl = Wordlist::load(&path).unwrap();
        let english = &wl.entries["english"];
        assert_eq!(english.len(), 2);
        assert_eq!(english[1].severity, 3);
    }

    #[test]
    fn add_entries_is_append_only_and_deduped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wordlist.json");
        let mut wl = Wordlist::load_or_seed(&path).unwrap();
        wl.add_entries(
            "custom",
            vec![WordlistEntry::bare("foo"), WordlistEntry::bare("foo")],
            &path,
        )
        .unwrap();
        assert_eq!(wl.entries["custom"].len(), 1);
    }
}
