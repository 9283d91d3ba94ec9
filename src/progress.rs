//! Progress-callback trait for per-document conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts and synthesizes each document.
//!
//! # Example
//!
//! ```rust
//! use pdf2mp3::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_task_complete(&self, name: &str, bytes: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name}: {bytes} bytes of audio");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each document.
///
/// Implementations must be `Send + Sync`: synthesis tasks run concurrently,
/// so `on_task_start`, `on_task_complete` and `on_task_error` may be called
/// from different tasks at the same time. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after duplicates are dropped, before extraction.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document yielded text.
    fn on_document_extracted(&self, name: &str, word_count: usize) {
        let _ = (name, word_count);
    }

    /// Called when a document is removed from the run (duplicate, unreadable, no text).
    fn on_document_excluded(&self, name: &str, reason: &str) {
        let _ = (name, reason);
    }

    /// Called once before the first synthesis call.
    fn on_conversion_start(&self, total_tasks: usize) {
        let _ = total_tasks;
    }

    /// Called when a task is admitted under the concurrency ceiling.
    fn on_task_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when a task wrote its artifact.
    fn on_task_complete(&self, name: &str, bytes: u64) {
        let _ = (name, bytes);
    }

    /// Called when a task failed.
    fn on_task_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once after every task reached a terminal outcome.
    fn on_run_complete(&self, total_tasks: usize, success_count: usize) {
        let _ = (total_tasks, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
