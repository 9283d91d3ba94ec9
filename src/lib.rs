//! # pdf2mp3
//!
//! Batch-convert PDF documents into spoken MP3 audio.
//!
//! Each PDF's text is extracted page by page, normalised, and sent to a
//! neural text-to-speech engine. Many documents are synthesized at once,
//! never more than a fixed number in flight, and one bad document never sinks
//! the rest of the batch: unreadable files, broken pages and engine failures
//! become [`Diagnostic`]s in the final [`ConversionReport`].
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDFs
//!  │
//!  ├─ 1. Collect   drop duplicate names (first one wins)
//!  ├─ 2. Extract   per-page text via lopdf, cached by SHA-256 of the bytes
//!  ├─ 3. Convert   bounded concurrent TTS calls, one MP3 per document
//!  ├─ 4. Report    successes, failures, diagnostics, zip of the artifacts
//!  └─ 5. Done      run workspace removed when the report is dropped
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2mp3::{ConversionConfig, Converter, HttpSpeechSynthesizer, SpeechConfig, VoiceCatalog};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoint and key from PDF2MP3_TTS_URL / PDF2MP3_TTS_API_KEY
//!     let engine = HttpSpeechSynthesizer::new(SpeechConfig::from_env())?;
//!     let converter = Converter::new(
//!         ConversionConfig::default(),
//!         VoiceCatalog::default(),
//!         Arc::new(engine),
//!     );
//!
//!     let prepared = converter.prepare_files(&["report.pdf".into()]).await?;
//!     for p in prepared.previews() {
//!         println!("{}: {} words, ~{}s", p.name, p.word_count, p.estimated_duration_secs);
//!     }
//!
//!     let report = prepared.convert("English (US) – Jenny (Neural)").await?;
//!     report.persist_to("out".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdf2mp3` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `pdfium` | off     | Adds `pipeline::pdfium::PdfiumEngine`, a libpdfium-backed extractor |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2mp3 = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod voice;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{Converter, PreparedRun, RunStage};
pub use error::{Diagnostic, Pdf2Mp3Error, SynthesisError};
pub use output::{ConversionOutcome, ConversionReport, ConversionResult, DocumentPreview, RunStats};
pub use pipeline::batch::{run_batch, BatchRunner, ConversionTask};
pub use pipeline::extract::{normalise_text, Extraction, LopdfEngine, PdfEngine, TextExtractor};
pub use pipeline::input::{load_documents, SourceDocument};
pub use pipeline::speech::{HttpSpeechSynthesizer, SpeechConfig, SpeechRate, SpeechSynthesizer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use voice::{VoiceCatalog, VoiceProfile};
