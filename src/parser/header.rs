//! RFC 5322 header block parsing: folding, name/value splitting, RFC 2047
//! encoded-words, and tolerant date parsing.

use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::warn;

use crate::error::{MailError, Result};
use crate::model::header::Header;
use crate::parser::content::{base64_bytes, decode_with, encoding_for, unescape_hex_triples};

static FOLDED_LINE: OnceLock<Regex> = OnceLock::new();
static ENCODED_WORD: OnceLock<Regex> = OnceLock::new();

/// A CRLF followed by whitespace: the start of a folded continuation line.
fn folded_line_regex() -> &'static Regex {
    FOLDED_LINE.get_or_init(|| Regex::new(r"\r\n\s+").expect("Invalid folding regex"))
}

/// `=?charset?encoding?text?=`
fn encoded_word_regex() -> &'static Regex {
    ENCODED_WORD.get_or_init(|| {
        Regex::new(r"=\?([^?\s]+)\?([^?\s]+)\?([^?\s]*)\?=").expect("Invalid encoded-word regex")
    })
}

/// Parse a header block (everything before the first blank line) into
/// headers, in order of occurrence.
///
/// Folded continuation lines are collapsed into a single space first. Each
/// line is split at its first `:`; the name keeps its case, the value is
/// trimmed and has encoded-words decoded. A line without a colon becomes a
/// header with that line as its name and an empty value.
///
/// An empty block yields no headers.
pub fn parse_header_block(block: &str) -> Result<Vec<Header>> {
    if block.is_empty() {
        return Ok(Vec::new());
    }

    let unfolded = unfold(block);
    unfolded
        .split("\r\n")
        .map(|line| match line.split_once(':') {
            Some((name, value)) => Ok(Header::new(name, decode_encoded_words(value.trim())?)),
            None => Ok(Header::new(line, String::new())),
        })
        .collect()
}

/// Collapse folded continuation lines (`\r\n` + whitespace) into one space.
pub fn unfold(block: &str) -> Cow<'_, str> {
    folded_line_regex().replace_all(block, " ")
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Whitespace separating two adjacent encoded-words is dropped, so a run
/// split across several words decodes as one contiguous string. An encoding
/// letter other than `B`/`Q` fails with [`MailError::Format`].
pub fn decode_encoded_words(input: &str) -> Result<String> {
    if !input.contains("=?") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut last_end = 0;
    let mut last_was_encoded = false;

    for caps in encoded_word_regex().captures_iter(input) {
        let whole = caps.get(0).expect("group 0 always present");
        let gap = &input[last_end..whole.start()];
        if !(last_was_encoded && gap.trim().is_empty()) {
            result.push_str(gap);
        }

        result.push_str(&decode_word(&caps[1], &caps[2], &caps[3])?);
        last_end = whole.end();
        last_was_encoded = true;
    }

    result.push_str(&input[last_end..]);
    Ok(result)
}

/// Decode the payload of one encoded-word.
fn decode_word(charset: &str, encoding: &str, text: &str) -> Result<String> {
    let target = encoding_for(charset);
    let bytes = match encoding {
        "B" | "b" => base64_bytes(text)?,
        "Q" | "q" => decode_q(text, target),
        other => {
            return Err(MailError::Format(format!(
                "unrecognized encoded-word encoding '{other}'"
            )))
        }
    };
    Ok(decode_with(target, &bytes))
}

/// Decode Q-encoding (RFC 2047): underscores are spaces, `=XX` is a byte.
fn decode_q(text: &str, encoding: &'static encoding_rs::Encoding) -> Vec<u8> {
    let spaced = text.replace('_', " ");
    unescape_hex_triples(&spaced, encoding)
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, and many broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Drop any trailing comment such as "(UTC)" and the day of week
    let no_comment = trimmed.split(" (").next().unwrap_or(trimmed);
    let no_dow = strip_day_of_week(no_comment);
    let normalized = normalize_imap_date(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
    ];

    for candidate in [no_dow.as_str(), normalized.as_str()] {
        let with_offset = replace_named_tz(candidate);
        for text in [candidate, with_offset.as_str()] {
            for fmt in &formats {
                if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
                    return Some(Utc.from_utc_datetime(&ndt));
                }
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Last resort: let `mail-parser` interpret the value.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    let fake_msg = format!("Date: {input}\r\n\r\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    if !s.contains('-') {
        return s.to_string();
    }
    for month in MONTHS {
        for variant in [month.to_uppercase(), month.to_lowercase(), month.to_string()] {
            let pattern = format!("-{variant}-");
            if s.contains(&pattern) {
                return s.replacen(&pattern, &format!(" {month} "), 1);
            }
        }
    }
    s.to_string()
}

fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            let rest = rest.strip_prefix(',').unwrap_or(rest);
            if rest.starts_with(' ') {
                return rest.trim().to_string();
            }
        }
    }
    s.to_string()
}

fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 13] = [
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
