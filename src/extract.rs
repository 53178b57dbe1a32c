//! File type detection and PDF text extraction.
//!
//! Uploaded files are classified by extension. PDFs are extracted here
//! page by page; images are handed to the vision model by [`crate::ingest`].

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{RagError, RagResult};

pub const MIME_PDF: &str = "application/pdf";

/// Extensions accepted for file uploads, lowercase.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "bmp", "tiff"];

/// Classified upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image { mime_type: &'static str },
}

/// Classify a file by its extension (case-insensitive).
pub fn detect(file_name: &str) -> RagResult<FileKind> {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| {
            RagError::UnsupportedFormat(format!("'{}' has no file extension", file_name))
        })?;

    let kind = match ext.as_str() {
        "pdf" => FileKind::Pdf,
        "png" => FileKind::Image { mime_type: "image/png" },
        "jpg" | "jpeg" => FileKind::Image { mime_type: "image/jpeg" },
        "gif" => FileKind::Image { mime_type: "image/gif" },
        "bmp" => FileKind::Image { mime_type: "image/bmp" },
        "tiff" => FileKind::Image { mime_type: "image/tiff" },
        other => {
            return Err(RagError::UnsupportedFormat(format!(
                ".{} (allowed: {})",
                other,
                ALLOWED_EXTENSIONS.join(", ")
            )))
        }
    };
    Ok(kind)
}

/// Text of a PDF with its page count.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub text: String,
    pub pages: usize,
}

/// Extract the text layer of a PDF. Pages are joined by a blank line.
///
/// Fails with [`RagError::Extraction`] on malformed input or when no page
/// carries any text (scanned PDFs without OCR).
pub fn extract_pdf(bytes: &[u8]) -> RagResult<PdfText> {
    // pdf-extract panics on some malformed inputs.
    let pages = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| RagError::Extraction("PDF parser crashed on malformed input".to_string()))?
    .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {}", e)))?;

    let page_count = pages.len();
    let text = pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.is_empty() {
        return Err(RagError::Extraction(
            "PDF contains no extractable text".to_string(),
        ));
    }

    Ok(PdfText {
        text,
        pages: page_count.max(1),
    })
}
