//! Error types for the pdf2mp3 library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`Pdf2Mp3Error`]: **Fatal.** The run cannot proceed at all (bad
//!   configuration, unknown voice, the scoped workspace cannot be created,
//!   a defect escaped the batch runner). Returned as `Err(Pdf2Mp3Error)`
//!   from [`crate::Converter`] entry points.
//!
//! * [`Diagnostic`]: **Non-fatal.** One input, page or task went wrong but
//!   the run carries on. Diagnostics accumulate in
//!   [`crate::output::ConversionReport`] so callers can show partial success
//!   instead of losing the whole batch.
//!
//! * [`SynthesisError`]: the speech adapter's own failure. The batch runner
//!   turns it into a failed [`crate::output::ConversionResult`]; it never
//!   escapes a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2mp3 library.
#[derive(Debug, Error)]
pub enum Pdf2Mp3Error {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested voice is not in the injected catalog.
    #[error("Unknown voice '{label}'\nAvailable voices: {available}")]
    UnknownVoice { label: String, available: String },

    /// The speech-rate modifier is not a signed percentage such as `+10%`.
    #[error("Invalid speech rate '{rate}': {reason}")]
    InvalidRate { rate: String, reason: String },

    /// A voice catalog file could not be read or parsed.
    #[error("Failed to load voice catalog from '{path}': {reason}")]
    VoiceCatalog { path: PathBuf, reason: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// An input file could not be read from disk.
    #[error("Failed to read input '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The run-scoped output directory could not be created.
    #[error("Failed to create run workspace: {source}")]
    WorkspaceFailed {
        #[source]
        source: std::io::Error,
    },

    /// Writing the combined archive failed.
    #[error("Failed to write archive '{path}': {reason}")]
    ArchiveFailed { path: PathBuf, reason: String },

    /// Copying artifacts out of the workspace failed.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (a panicked task, a lost join handle).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem recorded during a run.
///
/// Every variant names the source document so a presentation layer can show
/// the warning next to the right file.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A later input reused a name that was already collected.
    #[error("Duplicate input '{name}' ignored (first occurrence kept)")]
    DuplicateInput { name: String },

    /// The bytes could not be opened as a PDF at all.
    #[error("Could not read PDF '{name}': {detail}")]
    DocumentUnreadable { name: String, detail: String },

    /// One page failed; the rest of the document was still read.
    #[error("Page {page} in '{name}' could not be read: {detail}")]
    PageUnreadable {
        name: String,
        page: usize,
        detail: String,
    },

    /// The document opened but yielded no text (scanned images, blank pages).
    #[error("No readable text found in '{name}', skipping")]
    NoText { name: String },

    /// Speech synthesis failed for this document.
    #[error("Failed on '{name}': {detail}")]
    SynthesisFailed { name: String, detail: String },
}

impl Diagnostic {
    /// Name of the source document this diagnostic refers to.
    pub fn source_name(&self) -> &str {
        match self {
            Diagnostic::DuplicateInput { name }
            | Diagnostic::DocumentUnreadable { name, .. }
            | Diagnostic::PageUnreadable { name, .. }
            | Diagnostic::NoText { name }
            | Diagnostic::SynthesisFailed { name, .. } => name,
        }
    }

    /// True for diagnostics that removed the document from the run.
    pub fn excludes_document(&self) -> bool {
        matches!(
            self,
            Diagnostic::DuplicateInput { .. }
                | Diagnostic::DocumentUnreadable { .. }
                | Diagnostic::NoText { .. }
        )
    }
}

/// Failure of a single speech-synthesis call.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Callers must filter empty documents before submitting a task.
    #[error("TTS conversion failed: refusing to synthesize empty text")]
    EmptyText,

    /// Voice identifier was empty or rejected locally.
    #[error("TTS conversion failed: invalid voice '{0}'")]
    InvalidVoice(String),

    /// Transport-level failure talking to the engine.
    #[error("TTS conversion failed: request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The engine answered with a non-success status.
    #[error("TTS conversion failed: engine rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The engine answered 2xx but sent no audio.
    #[error("TTS conversion failed: engine returned no audio")]
    EmptyAudio,

    /// The artifact could not be written.
    #[error("TTS conversion failed: could not write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other engine-specific failure.
    #[error("TTS conversion failed: {0}")]
    Engine(String),
}
