//! Where raw messages come from: `.eml` files, MBOX files and directories
//! of either.

pub mod eml;
pub mod mbox;

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MailError, Result};

pub use eml::read_eml;
pub use mbox::{read_mbox, MboxMessages, MboxReader};

/// One raw message handed to the importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Full RFC 5322 text, headers and body.
    pub contents: String,
    /// Name of the source, used in error reports and stored with the record.
    pub filename: String,
    /// Seeds the stored record's pid set.
    pub processing_id: Option<String>,
}

impl IncomingMessage {
    pub fn new(contents: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            filename: filename.into(),
            processing_id: None,
        }
    }

    pub fn with_processing_id(mut self, pid: impl Into<String>) -> Self {
        self.processing_id = Some(pid.into());
        self
    }

    /// Turn bare LF line endings into CRLF.
    pub fn normalized(mut self) -> Self {
        if let Cow::Owned(text) = normalize_newlines(&self.contents) {
            self.contents = text;
        }
        self
    }
}

/// Rewrite every bare `\n` as `\r\n`. Existing `\r\n` pairs are untouched.
pub fn normalize_newlines(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let has_bare_lf = bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b'\n' && (i == 0 || bytes[i - 1] != b'\r'));
    if !has_bare_lf {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + text.len() / 32);
    let mut prev = '\0';
    for c in text.chars() {
        if c == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(c);
        prev = c;
    }
    Cow::Owned(out)
}

/// Kind of input file, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Eml,
    Mbox,
}

impl SourceKind {
    /// `.eml` is a single message; `.mbox`, `.mbx` and extension-less files
    /// are treated as MBOX.
    pub fn of(path: &Path) -> Option<Self> {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .as_deref()
        {
            Some("eml") => Some(Self::Eml),
            Some("mbox") | Some("mbx") | None => Some(Self::Mbox),
            _ => None,
        }
    }
}

/// Expand directories into the `.eml`/`.mbox` files they contain
/// (one level deep), sorted for a stable import order. Plain file arguments
/// are kept as given.
pub fn collect_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(MailError::FileNotFound(path.clone()));
        }
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        let entries = std::fs::read_dir(path).map_err(|e| MailError::io(path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| MailError::io(path, e))?;
            let file = entry.path();
            if !file.is_file() {
                continue;
            }
            let has_known_extension = file.extension().is_some();
            match SourceKind::of(&file) {
                Some(_) if has_known_extension => found.push(file),
                _ => debug!(path = %file.display(), "Skipping file with unknown extension"),
            }
        }
        if found.is_empty() {
            warn!(path = %path.display(), "Directory contains no .eml or .mbox files");
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// The messages of one input file, read on demand.
///
/// Errors opening or reading the file are yielded as items, after which the
/// iterator ends.
pub enum FileMessages {
    /// A single `.eml` message, or the error that prevented reading it.
    Single(Option<Result<IncomingMessage>>),
    Mbox(MboxMessages),
}

impl Iterator for FileMessages {
    type Item = Result<IncomingMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Single(message) => message.take(),
            Self::Mbox(messages) => messages.next(),
        }
    }
}

/// Open `path` as `.eml` or MBOX by extension.
///
/// Nothing is read from an MBOX file until the first message is requested.
pub fn open_path(path: &Path) -> FileMessages {
    let opened = match SourceKind::of(path) {
        Some(SourceKind::Eml) => return FileMessages::Single(Some(read_eml(path))),
        Some(SourceKind::Mbox) => MboxReader::new(path).and_then(MboxReader::messages),
        None => Err(MailError::UnsupportedSource(path.to_path_buf())),
    };
    match opened {
        Ok(messages) => FileMessages::Mbox(messages),
        Err(e) => FileMessages::Single(Some(Err(e))),
    }
}

/// Chain the messages of `paths`, opening each file only when the previous
/// one is exhausted.
pub fn open_paths(paths: Vec<PathBuf>) -> impl Iterator<Item = Result<IncomingMessage>> {
    paths.into_iter().flat_map(|path| open_path(&path))
}

/// Display name for a source path: its file name, else the whole path.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\nb\r\nc\n"), "a\r\nb\r\nc\r\n");
        assert!(matches!(normalize_newlines("a\r\nb"), Cow::Borrowed(_)));
        assert_eq!(normalize_newlines("\n"), "\r\n");
    }

    #[test]
    fn test_incoming_normalized() {
        let msg = IncomingMessage::new("Subject: x\n\nbody", "a.eml")
            .with_processing_id("p")
            .normalized();
        assert_eq!(msg.contents, "Subject: x\r\n\r\nbody");
        assert_eq!(msg.processing_id.as_deref(), Some("p"));
    }

    #[test]
    fn test_source_kind() {
        assert_eq!(SourceKind::of(Path::new("a.EML")), Some(SourceKind::Eml));
        assert_eq!(SourceKind::of(Path::new("a.mbox")), Some(SourceKind::Mbox));
        assert_eq!(SourceKind::of(Path::new("Inbox")), Some(SourceKind::Mbox));
        assert_eq!(SourceKind::of(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_collect_paths_expands_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.eml"), "x").unwrap();
        std::fs::write(dir.path().join("a.mbox"), "x").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "x").unwrap();

        let files = collect_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["a.mbox", "b.eml"]);
    }

    #[test]
    fn test_unsupported_file_is_not_malformed() {
        let mut messages = open_path(Path::new("notes.txt"));
        let err = messages.next().unwrap().unwrap_err();
        assert!(matches!(err, MailError::UnsupportedSource(_)));
        assert!(!err.is_malformed());
        assert!(messages.next().is_none());
    }

    #[test]
    fn test_open_paths_chains_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mbox = dir.path().join("a.mbox");
        let eml = dir.path().join("b.eml");
        std::fs::write(
            &mbox,
            "From x Mon Jan 08 10:00:00 2024\nSubject: one\n\n1\n\nFrom x Mon Jan 08 10:00:00 2024\nSubject: two\n\n2\n",
        )
        .unwrap();
        std::fs::write(&eml, "Subject: three\r\n\r\n3").unwrap();

        let names: Vec<String> = open_paths(vec![mbox, eml])
            .map(|m| m.unwrap().filename)
            .collect();
        assert_eq!(names, vec!["a.mbox#1", "a.mbox#2", "b.eml"]);
    }

    #[test]
    fn test_open_paths_reports_missing_file() {
        let results: Vec<_> = open_paths(vec![PathBuf::from("/definitely/not/here.mbox")]).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(MailError::FileNotFound(_))));
    }

    #[test]
    fn test_collect_paths_missing() {
        assert!(matches!(
            collect_paths(&[PathBuf::from("/definitely/not/here.eml")]),
            Err(MailError::FileNotFound(_))
        ));
    }
}
