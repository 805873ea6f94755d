//! `Content-Type` header parsing (`type/subtype; param=value`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{MailError, Result};

/// Content type assumed when a message has no `Content-Type` header.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// A parsed `Content-Type` value.
///
/// # Examples
/// `"text/html; charset=UTF-8"` → `mime_type = "text/html"`,
/// `params = {"charset": "UTF-8"}`. Parameter names are lower-cased, values
/// keep their original case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    mime_type: String,
    params: BTreeMap<String, String>,
}

impl ContentType {
    /// Parse a header value. Fails with [`MailError::InvalidContentType`]
    /// when no leading `type/subtype` token is present.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim_start();
        let end = trimmed
            .find(|c: char| c == ';' || c.is_whitespace())
            .unwrap_or(trimmed.len());
        let token = &trimmed[..end];

        let valid = token
            .split_once('/')
            .is_some_and(|(ty, sub)| !ty.is_empty() && !sub.is_empty() && !sub.contains('/'));
        if !valid {
            return Err(MailError::InvalidContentType(value.to_string()));
        }

        let params = split_params(&trimmed[end..])
            .into_iter()
            .filter_map(|piece| {
                let (name, raw) = piece.split_once('=')?;
                let name = name.trim().to_ascii_lowercase();
                if name.is_empty() {
                    return None;
                }
                Some((name, unquote(raw.trim())))
            })
            .collect();

        Ok(Self {
            mime_type: token.to_ascii_lowercase(),
            params,
        })
    }

    /// The lower-cased `type/subtype`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Look up a parameter by (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All parameters, keyed by lower-cased name.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary")
    }

    /// `true` if this is exactly `mime_type` (case-insensitive).
    pub fn is(&self, mime_type: &str) -> bool {
        self.mime_type.eq_ignore_ascii_case(mime_type)
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            mime_type: DEFAULT_CONTENT_TYPE.to_string(),
            params: BTreeMap::new(),
        }
    }
}

impl FromStr for ContentType {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type)?;
        for (name, value) in &self.params {
            write!(f, "; {name}=\"{value}\"")?;
        }
        Ok(())
    }
}

/// Split the parameter section on `;`, ignoring separators inside quotes.
fn split_params(section: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in section.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                pieces.push(&section[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&section[start..]);
    pieces
}

/// Strip surrounding double quotes and resolve `\"` escapes inside them.
fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}
