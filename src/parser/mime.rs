//! MIME message decoding: header/body split and `multipart/alternative`
//! extraction.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{MailError, Result};
use crate::model::email::Email;
use crate::parser::content::{decode_content, DEFAULT_CHARSET};
use crate::parser::content_type::ContentType;
use crate::parser::header::parse_header_block;

/// The blank line separating the header block from the body.
pub const HEADER_BODY_BOUNDARY: &str = "\r\n\r\n";

const CRLF: &str = "\r\n";

/// Split a raw message at its first blank line and parse the headers.
///
/// The body is kept verbatim, still transfer-encoded. Fails with
/// [`MailError::Format`] when the message has no `\r\n\r\n` boundary.
pub fn parse_mime(raw: &str) -> Result<Email> {
    let split = raw
        .find(HEADER_BODY_BOUNDARY)
        .ok_or_else(|| MailError::Format("cannot find header/body boundary".into()))?;

    let headers = parse_header_block(&raw[..split])?;
    let body = &raw[split + HEADER_BODY_BOUNDARY.len()..];
    Ok(Email::new(headers, body))
}

/// Decode the renderings a message offers, keyed by lower-cased content type.
///
/// For `multipart/alternative`, each part wrapped in CRLFs between two
/// `--boundary` delimiters is parsed as a nested message; parts with a
/// whitespace-only body or no `Content-Type` are skipped, the rest are
/// decoded with their own transfer-encoding and charset. When two parts
/// share a content type the later one wins.
///
/// Any other message yields a single entry: the whole body decoded with the
/// top-level transfer-encoding and charset.
pub fn multipart_alternatives(email: &Email) -> Result<HashMap<String, String>> {
    let content_type = top_level_content_type(email)?;
    let mut alternatives = HashMap::new();

    if !content_type.is("multipart/alternative") {
        let decoded = decode_part(email, &content_type)?;
        alternatives.insert(content_type.mime_type().to_string(), decoded);
        return Ok(alternatives);
    }

    let boundary = content_type.boundary().ok_or_else(|| {
        MailError::Format("multipart/alternative without a boundary parameter".into())
    })?;

    for fragment in split_parts(email.body(), boundary) {
        let part = parse_mime(fragment)?;
        if part.body().trim().is_empty() {
            debug!("Skipping empty alternative");
            continue;
        }
        let Ok(raw_type) = part.first_header_value("content-type") else {
            debug!("Skipping alternative without Content-Type");
            continue;
        };
        let part_type = ContentType::parse(raw_type)?;
        let decoded = decode_part(&part, &part_type)?;
        alternatives.insert(part_type.mime_type().to_string(), decoded);
    }

    Ok(alternatives)
}

/// Parsed top-level `Content-Type`, `text/plain` when absent.
fn top_level_content_type(email: &Email) -> Result<ContentType> {
    match email.first_header_value("content-type") {
        Ok(value) => ContentType::parse(value),
        Err(_) => Ok(ContentType::default()),
    }
}

fn decode_part(part: &Email, content_type: &ContentType) -> Result<String> {
    let transfer_encoding = part.header_values("content-transfer-encoding").next();
    let charset = content_type.charset().unwrap_or(DEFAULT_CHARSET);
    decode_content(part.body(), transfer_encoding, charset)
}

/// Split a multipart body on `--boundary`, keeping only fragments that begin
/// and end with CRLF, with exactly those two CRLFs removed.
///
/// The preamble, the closing `--` fragment and anything else not wrapped in
/// CRLFs on both sides are dropped.
fn split_parts<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    body.split(delimiter.as_str())
        .filter(|fragment| {
            fragment.len() >= 2 * CRLF.len()
                && fragment.starts_with(CRLF)
                && fragment.ends_with(CRLF)
        })
        .map(|fragment| &fragment[CRLF.len()..fragment.len() - CRLF.len()])
        .collect()
}
