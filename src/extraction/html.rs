//! HTML extraction: body text with lossy decoding, one page per file.

use crate::errors::{Result, SearchError};
use crate::Page;
use std::path::Path;

/// Extract visible text from an HTML file
pub fn extract_html(path: &Path) -> Result<Vec<Page>> {
    let data = std::fs::read(path).map_err(|e| SearchError::ExtractionFailed {
        file: path.display().to_string(),
        details: e.to_string(),
    })?;

    // Legacy exports arrive in assorted encodings; lossy decoding keeps the
    // searchable ASCII intact
    let html = String::from_utf8_lossy(&data);
    let document = scraper::Html::parse_document(&html);
    let body_selector = scraper::Selector::parse("body").unwrap();

    let mut text = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        for piece in body.text() {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    Ok(vec![Page {
        page_num: 1,
        text,
        sheet_name: None,
    }])
}
