//! Output types for a conversion run.

use crate::error::{Diagnostic, Pdf2Mp3Error};
use crate::pipeline::workspace::RunWorkspace;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Terminal outcome of one [`crate::ConversionTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Converted { path: PathBuf, bytes: u64 },
    Failed { error: String },
}

/// One result per task, attributable by `source_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub source_name: String,
    #[serde(flatten)]
    pub outcome: ConversionOutcome,
}

impl ConversionResult {
    pub fn converted(source_name: impl Into<String>, path: PathBuf, bytes: u64) -> Self {
        Self {
            source_name: source_name.into(),
            outcome: ConversionOutcome::Converted { path, bytes },
        }
    }

    pub fn failed(source_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            outcome: ConversionOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Converted { .. })
    }

    /// Artifact location on success.
    pub fn output_path(&self) -> Option<&Path> {
        match &self.outcome {
            ConversionOutcome::Converted { path, .. } => Some(path),
            ConversionOutcome::Failed { .. } => None,
        }
    }

    /// Error description on failure.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ConversionOutcome::Converted { .. } => None,
            ConversionOutcome::Failed { error } => Some(error),
        }
    }
}

/// Word count and spoken-length estimate for one readable document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentPreview {
    pub name: String,
    pub page_count: usize,
    pub word_count: usize,
    pub estimated_duration_secs: u64,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Inputs submitted, duplicates included.
    pub total_inputs: usize,
    pub duplicates: usize,
    /// Unique documents that produced no task (unreadable or no text).
    pub excluded: usize,
    /// Words across every readable document.
    pub total_words: usize,
    pub converted: usize,
    pub failed: usize,
    pub audio_bytes: u64,
    pub extraction_time_ms: u64,
    pub synthesis_time_ms: u64,
    pub total_time_ms: u64,
}

/// Everything a presentation layer needs after a run.
///
/// Owns the run's [`RunWorkspace`]: artifact and archive paths stay valid
/// until the report is dropped. Use [`ConversionReport::persist_to`] to keep
/// them.
#[derive(Debug, Serialize)]
pub struct ConversionReport {
    /// Voice label as chosen by the caller.
    pub voice: String,
    /// Engine voice identifier the label resolved to.
    pub voice_id: String,
    pub rate: String,
    pub previews: Vec<DocumentPreview>,
    pub results: Vec<ConversionResult>,
    /// Combined archive, present when at least one task succeeded and
    /// archiving is enabled.
    pub archive: Option<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: RunStats,
    #[serde(skip)]
    pub(crate) workspace: RunWorkspace,
}

impl ConversionReport {
    pub fn successes(&self) -> impl Iterator<Item = &ConversionResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// True when at least one task succeeded.
    pub fn is_partial_success(&self) -> bool {
        self.successes().next().is_some()
    }

    /// Artifacts of successful tasks, in result order.
    pub fn artifact_paths(&self) -> Vec<&Path> {
        self.results.iter().filter_map(|r| r.output_path()).collect()
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    /// The run-scoped directory holding every artifact.
    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    /// Copy every artifact and the archive into `dir`, returning the new
    /// paths. Existing files with the same name are overwritten.
    pub fn persist_to(&self, dir: &Path) -> Result<Vec<PathBuf>, Pdf2Mp3Error> {
        std::fs::create_dir_all(dir).map_err(|source| Pdf2Mp3Error::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::new();
        for src in self.artifact_paths().into_iter().chain(self.archive_path()) {
            let Some(file_name) = src.file_name() else {
                continue;
            };
            let dest = dir.join(file_name);
            std::fs::copy(src, &dest).map_err(|source| Pdf2Mp3Error::OutputWriteFailed {
                path: dest.clone(),
                source,
            })?;
            written.push(dest);
        }

        info!("Persisted {} file(s) to {}", written.len(), dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(results: Vec<ConversionResult>, workspace: RunWorkspace) -> ConversionReport {
        ConversionReport {
            voice: "English (US) – Guy (Neural)".into(),
            voice_id: "en-US-GuyNeural".into(),
            rate: "+0%".into(),
            previews: vec![],
            results,
            archive: None,
            diagnostics: vec![],
            stats: RunStats::default(),
            workspace,
        }
    }

    #[test]
    fn result_accessors() {
        let ok = ConversionResult::converted("a.pdf", PathBuf::from("/x/a_edge.mp3"), 10);
        let bad = ConversionResult::failed("b.pdf", "TTS conversion failed: boom");
        assert!(ok.is_success());
        assert_eq!(ok.output_path(), Some(Path::new("/x/a_edge.mp3")));
        assert!(ok.error().is_none());
        assert!(!bad.is_success());
        assert_eq!(bad.error(), Some("TTS conversion failed: boom"));
    }

    #[test]
    fn result_serialises_flat() {
        let bad = ConversionResult::failed("b.pdf", "boom");
        let json = serde_json::to_value(&bad).unwrap();
        assert_eq!(json["source_name"], "b.pdf");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn persist_copies_only_successful_artifacts() {
        let mut ws = RunWorkspace::create(None).unwrap();
        let a = ws.claim_artifact_path("a.pdf", "edge");
        std::fs::write(&a, b"ID3a").unwrap();

        let report = report_with(
            vec![
                ConversionResult::converted("a.pdf", a, 4),
                ConversionResult::failed("b.pdf", "boom"),
            ],
            ws,
        );
        assert!(report.is_partial_success());
        assert_eq!(report.failures().count(), 1);

        let out = tempfile::tempdir().unwrap();
        let written = report.persist_to(out.path()).unwrap();
        assert_eq!(written, vec![out.path().join("a_edge.mp3")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"ID3a");
    }
}
