//! Excel extraction, sheet by sheet.
//!
//! Each sheet becomes one page. Rows serialize as `Header: value | ...` when
//! the first row looks like a header row, else as bare `value | value | ...`
//! lines. Sheets are capped at a configurable row count with a truncation
//! marker so one giant ledger cannot flood the index.

use crate::errors::{Result, SearchError};
use crate::Page;
use calamine::{Data, Reader};
use std::path::Path;

/// Extract text from all sheets of an Excel workbook
/// (`.xls`, `.xlsx`, `.xlsm`, `.xlsb`)
pub fn extract_excel(path: &Path, max_rows: usize) -> Result<Vec<Page>> {
    let mut workbook =
        calamine::open_workbook_auto(path).map_err(|e| SearchError::ExtractionFailed {
            file: path.display().to_string(),
            details: e.to_string(),
        })?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut pages = Vec::new();

    for (i, sheet_name) in sheet_names.iter().enumerate() {
        let text = match workbook.worksheet_range(sheet_name) {
            Ok(range) => {
                let total_rows = range.get_size().0;
                let rows: Vec<Vec<Data>> = range
                    .rows()
                    .take(max_rows + 1)
                    .map(|r| r.to_vec())
                    .collect();
                serialize_rows(&rows, total_rows, max_rows)
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping sheet '{}' of {:?}: {}",
                    sheet_name,
                    path,
                    e
                );
                String::new()
            }
        };

        pages.push(Page {
            page_num: i as u32 + 1,
            text: text.trim().to_string(),
            sheet_name: Some(sheet_name.clone()),
        });
    }

    Ok(pages)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

/// A first row counts as a header row when at least 60% of its non-empty
/// cells are strings
fn detect_headers(first_row: &[Data]) -> Option<Vec<String>> {
    let non_empty: Vec<&Data> = first_row
        .iter()
        .filter(|c| !matches!(c, Data::Empty) && !cell_to_string(c).is_empty())
        .collect();
    if non_empty.is_empty() {
        return None;
    }

    let string_count = non_empty
        .iter()
        .filter(|c| matches!(c, Data::String(_)))
        .count();
    if string_count * 10 >= non_empty.len() * 6 {
        Some(first_row.iter().map(cell_to_string).collect())
    } else {
        None
    }
}

fn serialize_row(row: &[Data], headers: Option<&[String]>) -> String {
    match headers {
        Some(headers) => {
            let mut pairs = Vec::new();
            for (i, cell) in row.iter().enumerate() {
                let value = cell_to_string(cell);
                if value.is_empty() {
                    continue;
                }
                match headers.get(i).filter(|h| !h.is_empty()) {
                    Some(header) => pairs.push(format!("{}: {}", header, value)),
                    None => pairs.push(value),
                }
            }
            pairs.join(" | ")
        }
        None => row
            .iter()
            .map(cell_to_string)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

fn serialize_rows(rows: &[Vec<Data>], total_rows: usize, max_rows: usize) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let headers = detect_headers(&rows[0]);
    let (data_rows, data_total) = match &headers {
        Some(_) => (&rows[1..], total_rows.saturating_sub(1)),
        None => (rows, total_rows),
    };

    let mut lines: Vec<String> = data_rows
        .iter()
        .take(max_rows)
        .map(|row| serialize_row(row, headers.as_deref()))
        .filter(|line| !line.is_empty())
        .collect();

    if data_total > max_rows {
        lines.push(format!(
            "[... additional rows truncated, showing first {} of {} rows]",
            max_rows, data_total
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    #[test]
    fn header_row_detected_when_mostly_strings() {
        let row = vec![s("Name"), s("Employer"), s("Year")];
        assert!(detect_headers(&row).is_some());

        let numeric = vec![Data::Float(1.0), Data::Float(2.0), s("x")];
        assert!(detect_headers(&numeric).is_none());

        assert!(detect_headers(&[Data::Empty, Data::Empty]).is_none());
    }

    #[test]
    fn rows_serialize_with_headers() {
        let rows = vec![
            vec![s("Name"), s("Employer")],
            vec![s("John Smith"), s("Ford")],
            vec![s("Mary Jones"), Data::Empty],
        ];
        let text = serialize_rows(&rows, 3, 500);
        assert_eq!(text, "Name: John Smith | Employer: Ford\nName: Mary Jones");
    }

    #[test]
    fn rows_serialize_without_headers() {
        let rows = vec![
            vec![Data::Float(12.5), s("widget")],
            vec![Data::Int(3), s("gadget")],
        ];
        let text = serialize_rows(&rows, 2, 500);
        assert_eq!(text, "12.5 | widget\n3 | gadget");
    }

    #[test]
    fn row_cap_appends_truncation_marker() {
        let mut rows = vec![vec![s("Name")]];
        for i in 0..6 {
            rows.push(vec![s(&format!("person {}", i))]);
        }
        let text = serialize_rows(&rows, 700, 5);
        assert!(text.contains("additional rows truncated"));
        assert!(text.contains("first 5 of 699 rows"));
    }

    #[test]
    fn missing_workbook_is_an_extraction_error() {
        let err = extract_excel(Path::new("/nonexistent/book.xlsx"), 500).unwrap_err();
        assert!(matches!(err, SearchError::ExtractionFailed { .. }));
    }
}
