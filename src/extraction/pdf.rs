//! PDF text extraction, page by page.

use crate::errors::{Result, SearchError};
use crate::Page;
use std::path::Path;

/// Extract text from every page of a PDF
pub fn extract_pdf(path: &Path) -> Result<Vec<Page>> {
    let texts =
        pdf_extract::extract_text_by_pages(path).map_err(|e| SearchError::ExtractionFailed {
            file: path.display().to_string(),
            details: e.to_string(),
        })?;

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            page_num: i as u32 + 1,
            text: text.trim().to_string(),
            sheet_name: None,
        })
        .collect())
}
