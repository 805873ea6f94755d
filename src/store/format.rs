//! Binary store file format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (128 bytes, fixed)            │
//! │  magic: [u8; 8] = b"MAILSIFT"        │
//! │  version: u32                        │
//! │  flags: u32                          │
//! │  record_count: u64                   │
//! │  payload_sha256: [u8; 32]            │
//! │  (padding to 128 bytes)              │
//! ├──────────────────────────────────────┤
//! │ PAYLOAD (variable)                   │
//! │  bincode-serialized Vec<StoredEmail> │
//! └──────────────────────────────────────┘
//! ```

use sha2::{Digest, Sha256};

pub const MAGIC: &[u8; 8] = b"MAILSIFT";

pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 128;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StoreHeader {
    pub magic: [u8; 8],
    pub version: u32,
    /// Reserved, written as zero.
    pub flags: u32,
    pub record_count: u64,
    pub payload_sha256: [u8; 32],
}

impl StoreHeader {
    pub fn for_payload(record_count: usize, payload: &[u8]) -> Self {
        Self {
            magic: *MAGIC,
            version: VERSION,
            flags: 0,
            record_count: record_count as u64,
            payload_sha256: sha256(payload),
        }
    }

    /// Check magic and version.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }

    /// Check the payload against the recorded hash.
    pub fn verify_payload(&self, payload: &[u8]) -> std::result::Result<(), String> {
        if self.payload_sha256 != sha256(payload) {
            return Err("Payload hash mismatch".into());
        }
        Ok(())
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
