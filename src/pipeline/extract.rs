//! Text extraction: PDF bytes → normalised plain text.
//!
//! The PDF library sits behind [`PdfEngine`]: open from memory, enumerate
//! pages in order, extract text per page, and report document-level and
//! page-level failures distinctly. [`LopdfEngine`] is the pure-Rust default;
//! the `pdfium` feature adds [`super::pdfium::PdfiumEngine`].
//!
//! [`TextExtractor::extract`] never fails. A document that cannot be opened
//! yields empty text plus a [`Diagnostic::DocumentUnreadable`]; a failing
//! page is skipped with a [`Diagnostic::PageUnreadable`] and the remaining
//! pages are still read. Engines that panic on hostile input are contained
//! the same way.

use crate::error::Diagnostic;
use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of reading one page: its raw text, or why it failed.
pub type PageText = Result<String, String>;

/// A PDF text capability.
///
/// Implementations are synchronous and CPU-bound; the pipeline calls them on
/// the blocking pool.
pub trait PdfEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Open `bytes` and return one entry per page, in document order.
    ///
    /// `Err` means the document itself could not be opened.
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<PageText>, String>;
}

/// Pure-Rust engine backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl PdfEngine for LopdfEngine {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<PageText>, String> {
        if bytes.is_empty() {
            return Err("file is empty".to_string());
        }
        let doc = Document::load_mem(bytes).map_err(|e| e.to_string())?;
        if doc.is_encrypted() {
            return Err("document is encrypted".to_string());
        }

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err("document has no pages".to_string());
        }

        Ok(pages
            .keys()
            .map(|&page_num| doc.extract_text(&[page_num]).map_err(|e| e.to_string()))
            .collect())
    }
}

/// Everything learned from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Normalised text; empty when nothing could be read.
    pub text: String,
    /// Number of pages the engine reported (0 when the document did not open).
    pub page_count: usize,
    /// Document- and page-level problems, in page order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    /// True when the document itself could not be opened.
    pub fn is_unreadable(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::DocumentUnreadable { .. }))
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Same extraction with diagnostics attributed to `name`.
    ///
    /// The cache is keyed by content, so one result may serve several
    /// differently named uploads.
    pub fn renamed(&self, name: &str) -> Extraction {
        let diagnostics = self
            .diagnostics
            .iter()
            .cloned()
            .map(|d| match d {
                Diagnostic::DocumentUnreadable { detail, .. } => Diagnostic::DocumentUnreadable {
                    name: name.to_string(),
                    detail,
                },
                Diagnostic::PageUnreadable { page, detail, .. } => Diagnostic::PageUnreadable {
                    name: name.to_string(),
                    page,
                    detail,
                },
                other => other,
            })
            .collect();
        Extraction {
            text: self.text.clone(),
            page_count: self.page_count,
            diagnostics,
        }
    }
}

/// Extracts best-effort text through a [`PdfEngine`].
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn PdfEngine>,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(Arc::new(LopdfEngine))
    }
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn PdfEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Extract text from `bytes`; `name` is only used in diagnostics.
    pub fn extract(&self, bytes: &[u8], name: &str) -> Extraction {
        let opened = catch_unwind(AssertUnwindSafe(|| self.engine.page_texts(bytes)))
            .unwrap_or_else(|panic| Err(format!("parser crashed: {}", panic_message(&panic))));

        let pages = match opened {
            Ok(pages) => pages,
            Err(detail) => {
                warn!("Could not read PDF '{}': {}", name, detail);
                return Extraction {
                    text: String::new(),
                    page_count: 0,
                    diagnostics: vec![Diagnostic::DocumentUnreadable {
                        name: name.to_string(),
                        detail,
                    }],
                };
            }
        };

        let page_count = pages.len();
        let mut diagnostics = Vec::new();
        let mut texts = Vec::with_capacity(page_count);

        for (idx, page) in pages.into_iter().enumerate() {
            match page {
                Ok(text) if !text.trim().is_empty() => texts.push(text),
                Ok(_) => debug!("'{}' page {} has no text", name, idx + 1),
                Err(detail) => {
                    warn!("Page {} in '{}' could not be read: {}", idx + 1, name, detail);
                    diagnostics.push(Diagnostic::PageUnreadable {
                        name: name.to_string(),
                        page: idx + 1,
                        detail,
                    });
                }
            }
        }

        let text = normalise_text(&texts.join("\n"));
        debug!(
            "Extracted {} chars from {}/{} pages of '{}' via {}",
            text.len(),
            texts.len(),
            page_count,
            name,
            self.engine.name()
        );

        Extraction {
            text,
            page_count,
            diagnostics,
        }
    }
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Trim, then collapse every whitespace run (including line breaks) to one space.
pub fn normalise_text(input: &str) -> String {
    RE_WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::pdf_with_pages;
    use super::*;

    /// Engine with scripted page outcomes.
    struct ScriptedEngine(Result<Vec<PageText>, String>);

    impl PdfEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<PageText>, String> {
            self.0.clone()
        }
    }

    struct PanickingEngine;

    impl PdfEngine for PanickingEngine {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<PageText>, String> {
            panic!("xref stream overflow")
        }
    }

    #[test]
    fn test_normalise_text() {
        assert_eq!(normalise_text("  a \n\n b\t\tc  "), "a b c");
        assert_eq!(normalise_text("\n \t"), "");
    }

    #[test]
    fn empty_bytes_yield_empty_text() {
        let out = TextExtractor::default().extract(b"", "empty.pdf");
        assert_eq!(out.text, "");
        assert!(out.is_unreadable());
        assert_eq!(out.page_count, 0);
    }

    #[test]
    fn garbage_bytes_yield_empty_text() {
        let out = TextExtractor::default().extract(b"this is not a pdf at all", "junk.pdf");
        assert_eq!(out.text, "");
        assert!(out.is_unreadable());
    }

    #[test]
    fn truncated_pdf_does_not_escape_extractor() {
        let bytes = pdf_with_pages(&[&["Hello"]]);
        let out = TextExtractor::default().extract(&bytes[..bytes.len() / 3], "cut.pdf");
        if !out.has_text() {
            assert!(!out.diagnostics.is_empty());
        }
    }

    #[test]
    fn single_page_text_is_normalised() {
        let bytes = pdf_with_pages(&[&["Hello, PDF test!"]]);
        let out = TextExtractor::default().extract(&bytes, "hello.pdf");
        assert_eq!(out.text, "Hello, PDF test!");
        assert_eq!(out.page_count, 1);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn pages_are_joined_in_order() {
        let bytes = pdf_with_pages(&[&["First page"], &["Second page"], &["Third"]]);
        let out = TextExtractor::default().extract(&bytes, "three.pdf");
        assert_eq!(out.text, "First page Second page Third");
        assert_eq!(out.page_count, 3);
        assert_eq!(out.word_count(), 5);
    }

    #[test]
    fn extraction_is_idempotent() {
        let bytes = pdf_with_pages(&[&["Same", "input"], &["twice"]]);
        let extractor = TextExtractor::default();
        assert_eq!(
            extractor.extract(&bytes, "a.pdf"),
            extractor.extract(&bytes, "a.pdf")
        );
    }

    #[test]
    fn failing_page_is_skipped_and_reported() {
        let engine = ScriptedEngine(Ok(vec![
            Ok("alpha".into()),
            Err("bad content stream".into()),
            Ok("  gamma\n".into()),
        ]));
        let out = TextExtractor::new(Arc::new(engine)).extract(b"%PDF", "mixed.pdf");
        assert_eq!(out.text, "alpha gamma");
        assert_eq!(out.page_count, 3);
        assert_eq!(
            out.diagnostics,
            vec![Diagnostic::PageUnreadable {
                name: "mixed.pdf".into(),
                page: 2,
                detail: "bad content stream".into(),
            }]
        );
        assert!(!out.is_unreadable());
    }

    #[test]
    fn all_pages_blank_means_no_text() {
        let engine = ScriptedEngine(Ok(vec![Ok("   ".into()), Ok(String::new())]));
        let out = TextExtractor::new(Arc::new(engine)).extract(b"%PDF", "blank.pdf");
        assert!(!out.has_text());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn engine_panic_is_contained() {
        let out = TextExtractor::new(Arc::new(PanickingEngine)).extract(b"%PDF", "evil.pdf");
        assert!(!out.has_text());
        match &out.diagnostics[0] {
            Diagnostic::DocumentUnreadable { detail, .. } => {
                assert!(detail.contains("xref stream overflow"), "got: {detail}")
            }
            other => panic!("unexpected diagnostic {other:?}"),
        }
    }
}
