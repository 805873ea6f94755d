//! Parsed view of an HTML alternative.
//!
//! Template disambiguation often needs to look inside the HTML body (for
//! example to tell apart two messages that share a subject line). The
//! [`Document`] keeps the original markup together with a plain-text
//! rendering that is cheap to search.

/// HTML markup plus its plain-text rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    html: String,
    text: String,
}

impl Document {
    /// Build a document from HTML markup.
    pub fn parse(html: &str) -> Self {
        Self {
            html: html.to_string(),
            text: html_to_text(html),
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Visible text: tags stripped, scripts and styles removed, common
    /// entities decoded, runs of blank lines collapsed.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Case-insensitive search in the visible text.
    pub fn contains(&self, needle: &str) -> bool {
        self.text.to_lowercase().contains(&needle.to_lowercase())
    }

    /// Visible text lines, trimmed, without blanks.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Convert HTML to plain text.
///
/// - Line breaks from `<br>`, `<p>`, `<div>`, list items, rows, headings
/// - Scripts and styles removed
/// - Common HTML entities decoded
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    // Strip tags, turning block-level ones into newlines
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(open) = rest.find('<') {
        stripped.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        if is_block_tag(tag) {
            stripped.push('\n');
        }
        rest = &rest[open + close + 1..];
    }
    stripped.push_str(rest);

    let decoded = decode_entities(&stripped);

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_was_blank = false;
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

fn is_block_tag(tag: &str) -> bool {
    const BLOCK: [&str; 13] = [
        "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "td",
    ];
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    BLOCK.contains(&name.as_str())
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    while let Some(start) = remaining.to_ascii_lowercase().find(&open) {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        match after.to_ascii_lowercase().find(&close) {
            Some(end) => remaining = &after[end + close.len()..],
            None => {
                remaining = "";
                break;
            }
        }
    }
    result.push_str(remaining);
    result
}
