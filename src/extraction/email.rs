//! Email (.eml) extraction.
//!
//! Builds one searchable page per message: a `Subject/From/To/CC/Date`
//! header block, the plain-text body, and attachment file names (so a search
//! for an attachment name finds the covering email).

use crate::errors::{Result, SearchError};
use crate::Page;
use mail_parser::{MessageParser, MimeHeaders};
use std::path::Path;

/// Extract searchable text from an RFC-5322 email file
pub fn extract_email(path: &Path) -> Result<Vec<Page>> {
    let data = std::fs::read(path).map_err(|e| SearchError::ExtractionFailed {
        file: path.display().to_string(),
        details: e.to_string(),
    })?;

    let message =
        MessageParser::default()
            .parse(&data)
            .ok_or_else(|| SearchError::ExtractionFailed {
                file: path.display().to_string(),
                details: "not parseable as an email message".to_string(),
            })?;

    let mut parts = Vec::new();

    if let Some(subject) = message.subject() {
        parts.push(format!("Subject: {}", subject));
    }
    if let Some(from) = first_address(message.from()) {
        parts.push(format!("From: {}", from));
    }
    if let Some(to) = first_address(message.to()) {
        parts.push(format!("To: {}", to));
    }
    if let Some(cc) = first_address(message.cc()) {
        parts.push(format!("CC: {}", cc));
    }
    if let Some(date) = message.date() {
        parts.push(format!("Date: {}", date.to_rfc3339()));
    }

    parts.push(String::new());

    if let Some(body) = message.body_text(0) {
        parts.push(body.to_string());
    }

    let attachment_names: Vec<String> = message
        .attachments()
        .filter_map(|a| a.attachment_name().map(|n| n.to_string()))
        .collect();
    if !attachment_names.is_empty() {
        parts.push(format!("\nAttachments: {}", attachment_names.join(", ")));
    }

    Ok(vec![Page {
        page_num: 1,
        text: parts.join("\n").trim().to_string(),
        sheet_name: None,
    }])
}

fn first_address(address: Option<&mail_parser::Address<'_>>) -> Option<String> {
    let addr = address?.first()?;
    match (addr.name(), addr.address()) {
        (Some(name), Some(email)) => Some(format!("{} <{}>", name, email)),
        (None, Some(email)) => Some(email.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}
