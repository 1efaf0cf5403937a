//! PDF text extraction through an ordered list of engines

use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, Result};

/// One way of pulling page text out of a PDF
pub trait PdfEngine: Send + Sync {
    /// Engine name for logs and error messages
    fn name(&self) -> &'static str;

    /// Text of each page in document order
    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>>;
}

/// Layout-aware extraction via `pdf-extract`
pub struct PdfExtractEngine;

impl PdfEngine for PdfExtractEngine {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>> {
        // pdf-extract panics on some malformed fonts
        match panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(data)
        })) {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(Error::internal(e.to_string())),
            Err(payload) => Err(Error::internal(format!("panicked: {}", panic_message(payload.as_ref())))),
        }
    }
}

/// Content-stream text via `lopdf`
pub struct LopdfEngine;

impl PdfEngine for LopdfEngine {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::internal(format!("failed to load PDF: {}", e)))?;

        let mut pages = Vec::new();
        for page_num in doc.get_pages().keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => pages.push(text),
                Err(e) => {
                    tracing::debug!("lopdf could not read page {}: {}", page_num, e);
                    pages.push(String::new());
                }
            }
        }

        if pages.is_empty() {
            return Err(Error::internal("document has no pages"));
        }
        Ok(pages)
    }
}

/// Tries each engine in order; the first one that succeeds wins
///
/// An engine that succeeds with only blank text does not stop the chain,
/// but if no later engine finds text either the result is empty, not an
/// error. Failure of every engine is an extraction error.
pub struct PdfExtractor {
    engines: Vec<Box<dyn PdfEngine>>,
}

impl PdfExtractor {
    /// Create an extractor with a custom engine order
    pub fn with_engines(engines: Vec<Box<dyn PdfEngine>>) -> Self {
        Self { engines }
    }

    /// Extract all pages, joined with newlines
    pub fn extract(&self, filename: &str, data: &[u8]) -> Result<String> {
        let mut failures = Vec::new();
        let mut blank_success = false;

        for engine in &self.engines {
            match engine.extract_pages(data) {
                Ok(pages) => {
                    let text = pages.join("\n");
                    if !text.trim().is_empty() {
                        tracing::debug!(
                            file = %filename,
                            engine = engine.name(),
                            pages = pages.len(),
                            "PDF text extracted"
                        );
                        return Ok(text);
                    }
                    blank_success = true;
                }
                Err(e) => {
                    tracing::warn!(
                        file = %filename,
                        engine = engine.name(),
                        "PDF engine failed: {}, trying next",
                        e
                    );
                    failures.push(format!("{}: {}", engine.name(), e));
                }
            }
        }

        if blank_success {
            tracing::warn!(file = %filename, "PDF has no extractable text, may be image-based");
            return Ok(String::new());
        }

        Err(Error::extraction(
            filename,
            format!("all PDF engines failed ({})", failures.join("; ")),
        ))
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::with_engines(vec![Box::new(PdfExtractEngine), Box::new(LopdfEngine)])
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
