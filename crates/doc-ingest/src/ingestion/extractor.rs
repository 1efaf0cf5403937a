//! Per-format dispatch from a raw document to extracted content

use std::path::Path;

use super::html::extract_html;
use super::pdf::PdfExtractor;
use super::tabular;
use crate::error::{Error, Result};
use crate::types::{ExtractedContent, SourceFormat};

/// Routes a raw document to the extractor for its format
#[derive(Default)]
pub struct FormatExtractor {
    pdf: PdfExtractor,
}

impl FormatExtractor {
    /// Create an extractor with a custom PDF engine chain
    pub fn with_pdf(pdf: PdfExtractor) -> Self {
        Self { pdf }
    }

    /// Extract by filename suffix
    pub fn extract_path(&self, path: &Path) -> Result<(SourceFormat, ExtractedContent)> {
        let format = SourceFormat::from_path(path)?;
        Ok((format, self.extract(format, path)?))
    }

    /// Extract a document of a known format
    ///
    /// Parse failures of any format surface as `Error::Extraction`.
    pub fn extract(&self, format: SourceFormat, path: &Path) -> Result<ExtractedContent> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content = match format {
            SourceFormat::Html => ExtractedContent::Text(extract_html(&std::fs::read(path)?)),
            SourceFormat::Pdf => {
                ExtractedContent::Text(self.pdf.extract(&filename, &std::fs::read(path)?)?)
            }
            SourceFormat::Csv => ExtractedContent::RecordSet(
                tabular::extract_csv(path).map_err(|e| as_extraction(&filename, e))?,
            ),
            SourceFormat::Parquet => ExtractedContent::RecordSet(
                tabular::extract_parquet(path).map_err(|e| as_extraction(&filename, e))?,
            ),
        };

        tracing::debug!(
            file = %filename,
            format = %format,
            empty = content.is_empty(),
            "Extracted document"
        );
        Ok(content)
    }
}

/// Parser errors become extraction failures; IO errors stay as they are
fn as_extraction(filename: &str, error: Error) -> Error {
    match error {
        Error::Csv(e) => Error::extraction(filename, e.to_string()),
        Error::Parquet(e) => Error::extraction(filename, e.to_string()),
        other => other,
    }
}
