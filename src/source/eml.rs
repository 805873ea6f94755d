//! Reader for individual `.eml` files (RFC 5322 messages without MBOX framing).

use std::path::Path;

use tracing::debug;

use crate::error::{MailError, Result};
use crate::parser::content::decode_raw_bytes;
use crate::source::{display_name, IncomingMessage};

/// Read a single `.eml` file.
///
/// The bytes are decoded as UTF-8 when valid, Windows-1252 otherwise, with
/// any leading BOM removed. Line endings are left as found.
pub fn read_eml(path: impl AsRef<Path>) -> Result<IncomingMessage> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MailError::FileNotFound(path.to_path_buf())
        } else {
            MailError::io(path, e)
        }
    })?;

    debug!(path = %path.display(), bytes = data.len(), "Read EML file");
    Ok(IncomingMessage::new(decode_raw_bytes(&data), display_name(path)))
}
