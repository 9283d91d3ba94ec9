//! Pipeline stages for PDF-to-MP3 conversion.
//!
//! Each submodule implements one step; [`crate::convert`] wires them into a
//! run.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ batch ──▶ speech ──▶ archive
//! (dedup)   (cached)   (bounded)  (HTTP TTS)  (zip)
//!                 └──────── workspace (scoped temp dir) ───┘
//! ```
//!
//! 1. [`input`]: name-based dedup, first occurrence wins
//! 2. [`extract`]: per-page, fault-tolerant text extraction; CPU-bound,
//!    runs in `spawn_blocking`
//! 3. [`cache`]: SHA-256 keyed memo of extraction results
//! 4. [`batch`]: at most *K* synthesis calls in flight, one result per
//!    task
//! 5. [`speech`]: the [`speech::SpeechSynthesizer`] seam and its HTTP
//!    adapter; the only stage with network I/O
//! 6. [`archive`]: zip of the successful artifacts
//! 7. [`workspace`]: per-run output directory, removed on drop

pub mod archive;
pub mod batch;
pub mod cache;
pub mod extract;
pub mod input;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod speech;
pub mod workspace;
