//! Streaming MBOX reader.
//!
//! Reads MBOX files line-by-line through a large buffer and yields one
//! message at a time, so the file is never loaded whole. Tolerant of
//! malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::parser::content::decode_raw_bytes;
use crate::source::{display_name, IncomingMessage};

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Bytes kept per message; the rest of an oversized body is dropped.
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Splits an mbox file into messages on `From ` separator lines.
///
/// The separator line is not part of the message and one level of `>From `
/// quoting is undone. Either line ending is accepted, as is a BOM before the
/// first separator. A separator without a blank line before it still splits,
/// with a warning; text before the first separator counts as a message.
pub struct MboxReader {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxReader {
    /// Fails with [`MailError::FileNotFound`] when `path` does not exist.
    /// The contents are not checked until the file is walked.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MailError::FileNotFound(path.clone())
            } else {
                MailError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file and walk it lazily. Message `n` (1-based) is named
    /// `<file name>#<n>`.
    pub fn messages(self) -> Result<MboxMessages> {
        let file = File::open(&self.path).map_err(|e| MailError::io(&self.path, e))?;
        Ok(MboxMessages {
            name: display_name(&self.path),
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            path: self.path,
            max_message_size: self.max_message_size,
            message_buf: Vec::with_capacity(64 * 1024),
            line_buf: Vec::with_capacity(4096),
            in_message: false,
            prev_line_was_empty: true,
            first_line: true,
            truncated: false,
            offset: 0,
            count: 0,
            done: false,
        })
    }
}

/// Iterator over the messages of one MBOX file.
///
/// Only the message being assembled is held in memory. A read error is
/// yielded once and ends the iteration.
pub struct MboxMessages {
    path: PathBuf,
    name: String,
    reader: BufReader<File>,
    max_message_size: usize,
    message_buf: Vec<u8>,
    line_buf: Vec<u8>,
    in_message: bool,
    prev_line_was_empty: bool,
    first_line: bool,
    truncated: bool,
    offset: u64,
    count: u64,
    done: bool,
}

impl MboxMessages {
    /// Load the next line into `line_buf`; `false` at end of file.
    fn read_line(&mut self) -> Result<bool> {
        self.line_buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.line_buf)
            .map_err(|e| MailError::io(&self.path, e))?;
        Ok(read > 0)
    }

    fn take_message(&mut self) -> IncomingMessage {
        self.count += 1;
        let contents = decode_raw_bytes(trim_trailing_blank(&self.message_buf));
        self.message_buf.clear();
        IncomingMessage::new(contents, format!("{}#{}", self.name, self.count))
    }

    fn end_line(&mut self) {
        self.prev_line_was_empty = is_blank(&self.line_buf);
        self.first_line = false;
        self.offset += self.line_buf.len() as u64;
    }
}

impl Iterator for MboxMessages {
    type Item = Result<IncomingMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.read_line() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    // last message has no separator after it
                    let last = if self.in_message {
                        Some(self.take_message())
                    } else {
                        None
                    };
                    debug!(path = %self.path.display(), messages = self.count, "MBOX read");
                    return last.map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }

            if is_separator_line(&self.line_buf) {
                if !self.first_line && !self.prev_line_was_empty {
                    warn!(
                        offset = self.offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                let finished = if self.in_message {
                    Some(self.take_message())
                } else {
                    None
                };
                self.in_message = true;
                self.truncated = false;
                self.end_line();
                if let Some(message) = finished {
                    return Some(Ok(message));
                }
                continue;
            }

            if self.message_buf.len() + self.line_buf.len() <= self.max_message_size {
                if !self.in_message && !is_blank(&self.line_buf) {
                    // Content before any separator: treat as a message
                    self.in_message = true;
                }
                self.message_buf
                    .extend_from_slice(unescape_from(&self.line_buf));
            } else if !self.truncated {
                warn!(
                    offset = self.offset,
                    max_size = self.max_message_size,
                    "Oversized message, dropping the rest of its body"
                );
                self.truncated = true;
            }
            self.end_line();
        }
    }
}

/// Read every message of an MBOX file into memory.
///
/// Prefer [`MboxReader::messages`] for archives of unknown size.
pub fn read_mbox(path: impl AsRef<Path>) -> Result<Vec<IncomingMessage>> {
    MboxReader::new(path)?.messages()?.collect()
}

/// `From ` at the start of a line, optionally after a BOM.
fn is_separator_line(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// `>From ` → `From ` (one level of mboxrd quoting).
fn unescape_from(line: &[u8]) -> &[u8] {
    let quotes = line.iter().take_while(|&&b| b == b'>').count();
    if quotes > 0 && line[quotes..].starts_with(b"From ") {
        &line[1..]
    } else {
        line
    }
}

/// Drop the blank line that separates a message from the next `From `.
fn trim_trailing_blank(message: &[u8]) -> &[u8] {
    message
        .strip_suffix(b"\r\n")
        .or_else(|| message.strip_suffix(b"\n"))
        .filter(|rest| rest.ends_with(b"\n"))
        .unwrap_or(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_lines() {
        assert!(is_separator_line(
            b"From notices@portal.example.com Mon Jan 08 10:00:00 2024\n"
        ));
        assert!(!is_separator_line(b"from notices@portal.example.com\n"));
        assert!(!is_separator_line(b">From notices@portal.example.com\n"));
        assert!(!is_separator_line(b"Subject: From the portal\n"));
    }

    #[test]
    fn test_separator_after_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From notices@portal.example.com Mon Jan 08 10:00:00 2024\n");
        assert!(is_separator_line(&line));
    }

    #[test]
    fn test_unescape_from() {
        assert_eq!(unescape_from(b">From me\n"), b"From me\n");
        assert_eq!(unescape_from(b">>From me\n"), b">From me\n");
        assert_eq!(unescape_from(b"> quoted\n"), b"> quoted\n");
    }

    #[test]
    fn test_trim_trailing_blank() {
        assert_eq!(trim_trailing_blank(b"body\r\n\r\n"), b"body\r\n");
        assert_eq!(trim_trailing_blank(b"body\n\n"), b"body\n");
        assert_eq!(trim_trailing_blank(b"body\n"), b"body\n");
    }

    #[test]
    fn test_read_mbox_splits_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.mbox");
        std::fs::write(
            &path,
            concat!(
                "From a@example.com Thu Jan 01 00:00:00 2024\r\n",
                "Subject: one\r\n",
                "\r\n",
                ">From the start\r\n",
                "\r\n",
                "From b@example.com Thu Jan 01 00:00:00 2024\r\n",
                "Subject: two\r\n",
                "\r\n",
                "second\r\n",
            ),
        )
        .unwrap();

        let messages = read_mbox(&path).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].filename, "archive.mbox#1");
        assert_eq!(messages[0].contents, "Subject: one\r\n\r\nFrom the start\r\n");
        assert_eq!(messages[1].filename, "archive.mbox#2");
        assert_eq!(messages[1].contents, "Subject: two\r\n\r\nsecond\r\n");
    }

    #[test]
    fn test_messages_yielded_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.mbox");
        std::fs::write(
            &path,
            concat!(
                "From a Mon Jan 08 10:00:00 2024\n",
                "Subject: one\n\nfirst\n\n",
                "From b Mon Jan 08 10:00:00 2024\n",
                "Subject: two\n\nsecond\n\n",
                "From c Mon Jan 08 10:00:00 2024\n",
                "Subject: three\n\nthird\n",
            ),
        )
        .unwrap();

        let mut messages = MboxReader::new(&path).unwrap().messages().unwrap();
        let first = messages.next().unwrap().unwrap();
        assert_eq!(first.filename, "three.mbox#1");
        assert_eq!(first.contents, "Subject: one\n\nfirst\n");
        assert_eq!(messages.next().unwrap().unwrap().filename, "three.mbox#2");
        assert_eq!(messages.next().unwrap().unwrap().contents, "Subject: three\n\nthird\n");
        assert!(messages.next().is_none());
        assert!(messages.next().is_none());
    }

    #[test]
    fn test_empty_mbox() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mbox");
        std::fs::write(&path, "").unwrap();
        assert!(read_mbox(&path).unwrap().is_empty());
    }
}
