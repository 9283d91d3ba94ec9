//! Voice catalog: human-readable labels mapped to engine voice identifiers.
//!
//! The catalog is an immutable table handed to [`crate::Converter`] at
//! construction. Nothing reads a global list, so tests can inject a
//! one-voice catalog and deployments can ship their own JSON file.

use crate::error::Pdf2Mp3Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One selectable voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Label shown to users, e.g. `"English (UK) – Ryan (Neural)"`.
    pub label: String,
    /// Opaque identifier passed to the speech engine, e.g. `"en-GB-RyanNeural"`.
    pub id: String,
}

impl VoiceProfile {
    pub fn new(label: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
        }
    }
}

/// Ordered, read-only set of [`VoiceProfile`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceCatalog {
    voices: Vec<VoiceProfile>,
}

impl Default for VoiceCatalog {
    /// The curated Edge neural voices.
    fn default() -> Self {
        Self {
            voices: vec![
                VoiceProfile::new("English (UK) – Ryan (Neural)", "en-GB-RyanNeural"),
                VoiceProfile::new("English (US) – Jenny (Neural)", "en-US-JennyNeural"),
                VoiceProfile::new("English (US) – Guy (Neural)", "en-US-GuyNeural"),
                VoiceProfile::new("Spanish (Spain) – Lucia (Neural)", "es-ES-LuciaNeural"),
                VoiceProfile::new("German (Germany) – Jonas (Neural)", "de-DE-JonasNeural"),
            ],
        }
    }
}

impl VoiceCatalog {
    /// Build a catalog, rejecting empty tables and duplicate labels.
    pub fn new(voices: Vec<VoiceProfile>) -> Result<Self, Pdf2Mp3Error> {
        if voices.is_empty() {
            return Err(Pdf2Mp3Error::InvalidConfig(
                "Voice catalog must contain at least one voice".into(),
            ));
        }
        for (i, v) in voices.iter().enumerate() {
            if v.label.trim().is_empty() || v.id.trim().is_empty() {
                return Err(Pdf2Mp3Error::InvalidConfig(format!(
                    "Voice #{} has an empty label or id",
                    i + 1
                )));
            }
            if voices[..i].iter().any(|other| other.label == v.label) {
                return Err(Pdf2Mp3Error::InvalidConfig(format!(
                    "Duplicate voice label '{}'",
                    v.label
                )));
            }
        }
        Ok(Self { voices })
    }

    /// Load a catalog from a JSON array of `{ "label": …, "id": … }` objects.
    pub fn from_json_file(path: &Path) -> Result<Self, Pdf2Mp3Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| Pdf2Mp3Error::VoiceCatalog {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let voices: Vec<VoiceProfile> =
            serde_json::from_str(&raw).map_err(|e| Pdf2Mp3Error::VoiceCatalog {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::new(voices)
    }

    pub fn voices(&self) -> &[VoiceProfile] {
        &self.voices
    }

    /// First entry; used when the caller does not pick a voice.
    pub fn default_voice(&self) -> &VoiceProfile {
        &self.voices[0]
    }

    /// Look up a voice by its label, falling back to its engine identifier.
    pub fn resolve(&self, label_or_id: &str) -> Result<&VoiceProfile, Pdf2Mp3Error> {
        self.voices
            .iter()
            .find(|v| v.label == label_or_id)
            .or_else(|| self.voices.iter().find(|v| v.id == label_or_id))
            .ok_or_else(|| Pdf2Mp3Error::UnknownVoice {
                label: label_or_id.to_string(),
                available: self
                    .voices
                    .iter()
                    .map(|v| v.label.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
