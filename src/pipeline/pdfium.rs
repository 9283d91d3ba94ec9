//! pdfium-backed [`PdfEngine`] (cargo feature `pdfium`).
//!
//! pdfium handles damaged and unusual PDFs better than lopdf, at the price of
//! a native library. The library comes from `PDFIUM_LIB_PATH` when set,
//! otherwise from the system search path.
//!
//! pdfium bindings are not `Send`, so the engine keeps only the library
//! location and binds inside each extraction call, which already runs on a
//! blocking thread.

use super::extract::{PageText, PdfEngine};
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Text engine backed by the pdfium C++ library.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    library_path: Option<String>,
}

impl PdfiumEngine {
    /// Locate libpdfium via `PDFIUM_LIB_PATH` or the system search path.
    ///
    /// Binds once up front so a missing library fails here rather than on
    /// every document.
    pub fn bind() -> Result<Self, String> {
        let library_path = std::env::var("PDFIUM_LIB_PATH")
            .ok()
            .filter(|p| !p.is_empty());
        Self::with_library_path(library_path)
    }

    /// Use an explicit library file, or the system library when `None`.
    pub fn with_library_path(library_path: Option<String>) -> Result<Self, String> {
        let engine = Self { library_path };
        engine.pdfium()?;
        if let Some(ref path) = engine.library_path {
            info!("Bound pdfium from {}", path);
        }
        Ok(engine)
    }

    fn pdfium(&self) -> Result<Pdfium, String> {
        let bindings = match self.library_path {
            Some(ref path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| format!("Failed to bind to pdfium library: {e:?}"))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfEngine for PdfiumEngine {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<PageText>, String> {
        let pdfium = self.pdfium()?;
        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            let err_str = format!("{e:?}");
            if err_str.contains("Password") || err_str.contains("password") {
                "document is encrypted".to_string()
            } else {
                err_str
            }
        })?;

        let pages: Vec<PageText> = document
            .pages()
            .iter()
            .map(|page| {
                page.text()
                    .map(|text| text.all())
                    .map_err(|e| format!("{e:?}"))
            })
            .collect();
        debug!("pdfium read {} page(s)", pages.len());
        Ok(pages)
    }
}
