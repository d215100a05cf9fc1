//! Word (.docx) extraction: non-empty paragraphs joined into one page.

use crate::errors::{Result, SearchError};
use crate::Page;
use std::path::Path;

/// Extract paragraph text from a `.docx` document
pub fn extract_word(path: &Path) -> Result<Vec<Page>> {
    let data = std::fs::read(path).map_err(|e| SearchError::ExtractionFailed {
        file: path.display().to_string(),
        details: e.to_string(),
    })?;

    let doc = docx_rs::read_docx(&data).map_err(|e| SearchError::ExtractionFailed {
        file: path.display().to_string(),
        details: e.to_string(),
    })?;

    let mut paragraphs = Vec::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut text = String::new();
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            let text = text.trim().to_string();
            if !text.is_empty() {
                paragraphs.push(text);
            }
        }
    }

    Ok(vec![Page {
        page_num: 1,
        text: paragraphs.join("\n\n"),
        sheet_name: None,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_docx_returns_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let err = extract_word(&path).unwrap_err();
        assert!(matches!(err, SearchError::ExtractionFailed { .. }));
    }

    #[test]
    fn missing_file_returns_extraction_error() {
        let err = extract_word(Path::new("/nonexistent/report.docx")).unwrap_err();
        assert!(matches!(err, SearchError::ExtractionFailed { .. }));
    }
}
