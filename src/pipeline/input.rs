//! Input collection: named byte payloads, deduplicated by name.
//!
//! Names are the identity of a document within a run. When two inputs share
//! a name the first one wins and every later one is dropped with a
//! [`Diagnostic::DuplicateInput`]. [`load_documents`] applies the same rule
//! *before* touching the disk, so a dropped duplicate is never read.

use crate::error::{Diagnostic, Pdf2Mp3Error};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// An uploaded PDF: a display name plus its raw bytes.
///
/// The payload is shared (`Arc<[u8]>`) so the extractor can move it onto the
/// blocking pool without copying.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    name: String,
    bytes: Arc<[u8]>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

/// Result of the Collecting stage.
#[derive(Debug, Default)]
pub struct CollectedInputs {
    /// Unique documents in submission order.
    pub documents: Vec<SourceDocument>,
    /// One [`Diagnostic::DuplicateInput`] per dropped input.
    pub diagnostics: Vec<Diagnostic>,
}

/// Drop inputs whose name was already seen, keeping the first occurrence.
pub fn collect_inputs(inputs: impl IntoIterator<Item = SourceDocument>) -> CollectedInputs {
    let mut seen = HashSet::new();
    let mut collected = CollectedInputs::default();

    for doc in inputs {
        if seen.insert(doc.name.clone()) {
            collected.documents.push(doc);
        } else {
            warn!("Duplicate input '{}' dropped", doc.name);
            collected.diagnostics.push(Diagnostic::DuplicateInput { name: doc.name });
        }
    }

    debug!(
        "Collected {} unique inputs ({} duplicates)",
        collected.documents.len(),
        collected.diagnostics.len()
    );
    collected
}

/// Display name used for a file on disk: its final path component.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Read PDF files from disk, deduplicating by file name before reading.
///
/// A missing or unreadable file is fatal: the caller named it explicitly,
/// unlike a corrupt PDF, which only excludes that document later.
pub async fn load_documents(paths: &[PathBuf]) -> Result<CollectedInputs, Pdf2Mp3Error> {
    let mut seen = HashSet::new();
    let mut collected = CollectedInputs::default();

    for path in paths {
        let name = display_name(path);
        if !seen.insert(name.clone()) {
            warn!("Duplicate input '{}' ({}) not read", name, path.display());
            collected.diagnostics.push(Diagnostic::DuplicateInput { name });
            continue;
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| Pdf2Mp3Error::InputReadFailed {
                path: path.clone(),
                source,
            })?;
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        collected.documents.push(SourceDocument::new(name, bytes));
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_wins() {
        let collected = collect_inputs(vec![
            SourceDocument::new("report.pdf", b"first".to_vec()),
            SourceDocument::new("other.pdf", b"x".to_vec()),
            SourceDocument::new("report.pdf", b"second".to_vec()),
        ]);
        assert_eq!(collected.documents.len(), 2);
        assert_eq!(collected.documents[0].bytes(), b"first");
        assert_eq!(
            collected.diagnostics,
            vec![Diagnostic::DuplicateInput {
                name: "report.pdf".into()
            }]
        );
    }

    #[test]
    fn order_is_preserved() {
        let collected = collect_inputs(vec![
            SourceDocument::new("b.pdf", Vec::<u8>::new()),
            SourceDocument::new("a.pdf", Vec::<u8>::new()),
        ]);
        let names: Vec<_> = collected.documents.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("/tmp/x/report.pdf")), "report.pdf");
    }

    #[tokio::test]
    async fn later_duplicates_are_never_read() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("one");
        std::fs::create_dir_all(&a).unwrap();
        let first = a.join("report.pdf");
        std::fs::write(&first, b"first").unwrap();

        // The second path does not exist: reading it would be a fatal error.
        let missing = dir.path().join("two").join("report.pdf");

        let collected = load_documents(&[first, missing]).await.unwrap();
        assert_eq!(collected.documents.len(), 1);
        assert_eq!(collected.documents[0].bytes(), b"first");
        assert_eq!(collected.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let err = load_documents(&[PathBuf::from("/definitely/not/here.pdf")])
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2Mp3Error::InputReadFailed { .. }));
    }
}
