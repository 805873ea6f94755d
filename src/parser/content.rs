//! Content-transfer-encoding decoding (RFC 2045): quoted-printable and base64.
//!
//! The `=XX` escape handling here is shared with the RFC 2047 `Q` decoder in
//! [`crate::parser::header`].

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tracing::warn;

use crate::error::{MailError, Result};

/// Charset assumed when a part does not declare one.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Base64 engine tolerant of missing padding and stray trailing bits,
/// both of which show up in real mail.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode a body according to its declared `Content-Transfer-Encoding`.
///
/// - `None`: the body is returned unchanged.
/// - `quoted-printable`: soft line breaks are removed and `=XX` escapes are
///   decoded line by line using `charset`; lines are rejoined with `\n`.
/// - `base64`: decoded to bytes, then to text using `charset`.
///
/// Any other token fails with [`MailError::NotImplemented`]. The token is
/// compared case-insensitively.
pub fn decode_content(
    body: &str,
    transfer_encoding: Option<&str>,
    charset: &str,
) -> Result<String> {
    let Some(token) = transfer_encoding else {
        return Ok(body.to_string());
    };

    match token.trim().to_ascii_lowercase().as_str() {
        "quoted-printable" => Ok(decode_quoted_printable(body, charset)),
        "base64" => decode_base64(body, charset),
        _ => Err(MailError::NotImplemented(token.trim().to_string())),
    }
}

/// Decode a quoted-printable body into text.
pub fn decode_quoted_printable(body: &str, charset: &str) -> String {
    let encoding = encoding_for(charset);
    let unfolded = remove_soft_line_breaks(body);

    unfolded
        .split('\n')
        .map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let bytes = unescape_hex_triples(line, encoding);
            decode_with(encoding, &bytes)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode a base64 body into text.
///
/// UTF-8 content is decoded as UTF-8 (invalid sequences become U+FFFD).
/// Other charsets go through their `encoding_rs` decoder; labels unknown to
/// `encoding_rs` fall back to a one-byte-per-character Latin-1 reading.
pub fn decode_base64(body: &str, charset: &str) -> Result<String> {
    let bytes = base64_bytes(body)?;

    if is_utf8_label(charset) {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    match Encoding::for_label(charset_label(charset).as_bytes()) {
        Some(encoding) => Ok(decode_with(encoding, &bytes)),
        None => {
            warn!(charset = charset, "Unknown charset, decoding base64 as Latin-1");
            Ok(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Decode base64 text (whitespace ignored) into raw bytes.
pub(crate) fn base64_bytes(text: &str) -> Result<Vec<u8>> {
    let compact: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64
        .decode(&compact)
        .map_err(|e| MailError::Format(format!("invalid base64 content: {e}")))
}

/// Convert `=XX` escapes into bytes and everything else into the bytes the
/// literal text has in `encoding`.
///
/// Malformed escapes (a `=` not followed by two hex digits) are kept as
/// literal text.
pub(crate) fn unescape_hex_triples(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                push_literal(&mut out, &text[literal_start..i], encoding);
                out.push((hi << 4) | lo);
                i += 3;
                literal_start = i;
                continue;
            }
        }
        i += 1;
    }
    push_literal(&mut out, &text[literal_start..], encoding);
    out
}

/// Re-encode a literal run into `encoding` so it can be decoded alongside
/// the escaped bytes around it.
fn push_literal(out: &mut Vec<u8>, literal: &str, encoding: &'static Encoding) {
    if literal.is_ascii() {
        out.extend_from_slice(literal.as_bytes());
    } else {
        let (encoded, _, _) = encoding.encode(literal);
        out.extend_from_slice(&encoded);
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Remove quoted-printable soft line breaks (`=` at end of line).
fn remove_soft_line_breaks(body: &str) -> Cow<'_, str> {
    if body.contains("=\n") || body.contains("=\r\n") {
        Cow::Owned(body.replace("=\r\n", "").replace("=\n", ""))
    } else {
        Cow::Borrowed(body)
    }
}

/// Resolve a charset label, falling back to UTF-8 for unknown labels.
///
/// RFC 2231 language suffixes (`utf-8*en`) are ignored.
pub(crate) fn encoding_for(charset: &str) -> &'static Encoding {
    let label = charset_label(charset);
    if label.is_empty() {
        return UTF_8;
    }
    Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
        warn!(charset = charset, "Unknown charset, falling back to UTF-8");
        UTF_8
    })
}

/// Decode bytes with an encoding, without BOM sniffing.
pub(crate) fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> String {
    if encoding == UTF_8 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let (decoded, _) = encoding.decode_without_bom_handling(bytes);
    decoded.into_owned()
}

/// Decode raw file bytes to text: UTF-8 first, Windows-1252 as a fallback
/// (which accepts every byte). A UTF-8 BOM is stripped.
pub fn decode_raw_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            decoded.into_owned()
        }
    }
}

fn charset_label(charset: &str) -> &str {
    let charset = charset.trim();
    charset.split('*').next().unwrap_or(charset)
}

fn is_utf8_label(charset: &str) -> bool {
    let label = charset_label(charset);
    label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_encoding_passthrough() {
        let body = "Plain =3D body\r\n";
        assert_eq!(decode_content(body, None, "utf-8").unwrap(), body);
    }

    #[test]
    fn test_qp_escape_decodes_to_equals() {
        assert_eq!(decode_quoted_printable("a=3Db", "utf-8"), "a=b");
    }

    #[test]
    fn test_qp_soft_line_break_removed() {
        assert_eq!(
            decode_quoted_printable("long li=\r\nne\r\nnext", "utf-8"),
            "long line\nnext"
        );
        assert_eq!(decode_quoted_printable("joined=\nword", "utf-8"), "joinedword");
    }

    #[test]
    fn test_qp_utf8_multibyte() {
        assert_eq!(decode_quoted_printable("Caf=C3=A9", "UTF-8"), "Café");
    }

    #[test]
    fn test_qp_latin1() {
        assert_eq!(decode_quoted_printable("caf=E9", "iso-8859-1"), "café");
    }

    #[test]
    fn test_qp_literal_non_ascii_survives() {
        assert_eq!(decode_quoted_printable("déjà =3D vu", "iso-8859-1"), "déjà = vu");
        assert_eq!(decode_quoted_printable("déjà =3D vu", "utf-8"), "déjà = vu");
    }

    #[test]
    fn test_qp_malformed_escape_kept() {
        assert_eq!(decode_quoted_printable("a=ZZb=", "utf-8"), "a=ZZb=");
        assert_eq!(decode_quoted_printable("50=", "utf-8"), "50=");
    }

    #[test]
    fn test_base64_utf8() {
        // "Olá, mundo"
        assert_eq!(decode_base64("T2zDoSwgbXVuZG8=", "utf-8").unwrap(), "Olá, mundo");
    }

    #[test]
    fn test_base64_with_line_breaks() {
        let body = "SGVsbG8g\r\nd29ybGQ=\r\n";
        assert_eq!(decode_content(body, Some("base64"), "us-ascii").unwrap(), "Hello world");
    }

    #[test]
    fn test_base64_single_byte_charset() {
        // "café" in ISO-8859-1
        assert_eq!(decode_base64("Y2Fm6Q==", "iso-8859-1").unwrap(), "café");
    }

    #[test]
    fn test_base64_unknown_charset_reads_latin1() {
        assert_eq!(decode_base64("Y2Fm6Q==", "x-unheard-of").unwrap(), "café");
    }

    #[test]
    fn test_token_is_case_insensitive() {
        assert_eq!(
            decode_content("a=3Db", Some("Quoted-Printable"), "utf-8").unwrap(),
            "a=b"
        );
    }

    #[test]
    fn test_unknown_encoding_not_implemented() {
        let err = decode_content("body", Some("x-uuencode"), "utf-8").unwrap_err();
        assert!(matches!(err, MailError::NotImplemented(ref t) if t == "x-uuencode"));
    }

    #[test]
    fn test_decode_raw_bytes_fallback() {
        assert_eq!(decode_raw_bytes(b"M\xfcller"), "Müller");
        assert_eq!(decode_raw_bytes(b"\xEF\xBB\xBFhi"), "hi");
    }
}
