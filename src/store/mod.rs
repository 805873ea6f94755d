//! Record store keyed by Message-ID.
//!
//! Records live in memory and, for a file-backed store, are persisted as a
//! whole to a single binary file (see [`format`]) when a write phase ends.

pub mod format;

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::{MailError, Result};
use crate::model::stored::StoredEmail;
use format::{StoreHeader, HEADER_SIZE};

#[derive(Debug, Default)]
pub struct EmailStore {
    path: Option<PathBuf>,
    records: HashMap<String, StoredEmail>,
}

impl EmailStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store. A missing file yields an empty store that
    /// is created on the first write phase.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            load_records(&path)?
        } else {
            debug!(path = %path.display(), "Store file absent, starting empty");
            HashMap::new()
        };
        Ok(Self {
            path: Some(path),
            records,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Fetch one record, or [`MailError::RecordNotFound`].
    pub fn get(&self, id: &str) -> Result<&StoredEmail> {
        self.records
            .get(id)
            .ok_or_else(|| MailError::RecordNotFound(id.to_string()))
    }

    /// All records, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &StoredEmail> {
        self.records.values()
    }

    /// Union of every processing ID ever recorded.
    pub fn all_pids(&self) -> BTreeSet<String> {
        self.records
            .values()
            .flat_map(|r| r.pids.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Begin a write phase.
    ///
    /// Writes are visible through the store immediately; the file is
    /// rewritten when the returned guard is finished or dropped.
    pub fn write(&mut self) -> StoreWriter<'_> {
        StoreWriter {
            store: self,
            dirty: false,
            finished: false,
        }
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut records: Vec<&StoredEmail> = self.records.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let payload = bincode::serialize(&records).map_err(|e| MailError::InvalidStore {
            path: path.clone(),
            reason: format!("Serialization failed: {e}"),
        })?;
        let header = StoreHeader::for_payload(records.len(), &payload);
        let header_bytes = bincode::serialize(&header).map_err(|e| MailError::InvalidStore {
            path: path.clone(),
            reason: format!("Header serialization failed: {e}"),
        })?;

        let mut padded_header = vec![0u8; HEADER_SIZE];
        let copy_len = header_bytes.len().min(HEADER_SIZE);
        padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MailError::io(parent, e))?;
        }

        let tmp_path = tmp_path_for(path);
        write_store_file(&tmp_path, &padded_header, &payload)?;
        std::fs::rename(&tmp_path, path).map_err(|e| MailError::io(path, e))?;
        info!(path = %path.display(), records = records.len(), "Store written");
        Ok(())
    }
}

/// The write phase of a batch over an [`EmailStore`].
///
/// Call [`finish`](Self::finish) to persist and observe errors. A guard
/// dropped without finishing (early return, error) still persists what was
/// written and logs any failure.
pub struct StoreWriter<'a> {
    store: &'a mut EmailStore,
    dirty: bool,
    finished: bool,
}

impl StoreWriter<'_> {
    pub fn get(&self, id: &str) -> Option<&StoredEmail> {
        self.store.records.get(id)
    }

    /// Insert or overwrite the record with `record.id`.
    pub fn put(&mut self, record: StoredEmail) -> Result<()> {
        if record.id.is_empty() {
            return Err(MailError::MissingMessageId);
        }
        self.store.records.insert(record.id.clone(), record);
        self.dirty = true;
        Ok(())
    }

    /// Read access to the store during the write phase.
    pub fn store(&self) -> &EmailStore {
        self.store
    }

    /// End the write phase, persisting if anything changed.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        if self.dirty {
            self.store.flush()?;
        }
        Ok(())
    }
}

impl Drop for StoreWriter<'_> {
    fn drop(&mut self) {
        if self.finished || !self.dirty {
            return;
        }
        if let Err(e) = self.store.flush() {
            error!(error = %e, "Failed to persist store after interrupted write phase");
        }
    }
}

fn load_records(path: &Path) -> Result<HashMap<String, StoredEmail>> {
    let invalid = |reason: String| MailError::InvalidStore {
        path: path.to_path_buf(),
        reason,
    };

    let data = std::fs::read(path).map_err(|e| MailError::io(path, e))?;
    if data.len() < HEADER_SIZE {
        return Err(invalid("File too small".into()));
    }

    let header: StoreHeader = bincode::deserialize(&data[..HEADER_SIZE])
        .map_err(|e| invalid(format!("Header deserialization failed: {e}")))?;
    header.validate().map_err(invalid)?;

    let payload = &data[HEADER_SIZE..];
    header.verify_payload(payload).map_err(invalid)?;

    let records: Vec<StoredEmail> = bincode::deserialize(payload)
        .map_err(|e| invalid(format!("Record deserialization failed: {e}")))?;
    if records.len() as u64 != header.record_count {
        return Err(invalid("Record count mismatch".into()));
    }

    debug!(path = %path.display(), records = records.len(), "Store loaded");
    Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
}

fn write_store_file(path: &Path, header: &[u8], payload: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| MailError::io(path, e))?;
    file.write_all(header).map_err(|e| MailError::io(path, e))?;
    file.write_all(payload).map_err(|e| MailError::io(path, e))?;
    file.flush().map_err(|e| MailError::io(path, e))?;
    Ok(())
}

/// Example: `/data/mail.store` → `/data/.mail.store.tmp`
fn tmp_path_for(path: &Path) -> PathBuf {
    let filename = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!(".{filename}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, pid: &str) -> StoredEmail {
        StoredEmail {
            id: id.to_string(),
            pids: [pid.to_string()].into_iter().collect(),
            filename: "test.eml".into(),
            ts: 1_700_000_000_000,
            headers: Vec::new(),
            body: "body".into(),
        }
    }

    #[test]
    fn test_in_memory_get_and_pids() {
        let mut store = EmailStore::in_memory();
        {
            let mut writer = store.write();
            writer.put(record("<a@x>", "p1")).unwrap();
            writer.put(record("<b@x>", "p2")).unwrap();
            writer.finish().unwrap();
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("<a@x>").unwrap().filename, "test.eml");
        assert!(matches!(store.get("<c@x>"), Err(MailError::RecordNotFound(_))));
        assert_eq!(store.all_pids().into_iter().collect::<Vec<_>>(), vec!["p1", "p2"]);
    }

    #[test]
    fn test_put_rejects_empty_id() {
        let mut store = EmailStore::in_memory();
        let mut writer = store.write();
        assert!(matches!(
            writer.put(record("", "p")),
            Err(MailError::MissingMessageId)
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.store");

        let mut store = EmailStore::open(&path).unwrap();
        assert!(store.is_empty());
        let mut writer = store.write();
        writer.put(record("<a@x>", "p1")).unwrap();
        writer.finish().unwrap();
        assert!(path.exists());

        let reopened = EmailStore::open(&path).unwrap();
        assert_eq!(reopened.get("<a@x>").unwrap(), store.get("<a@x>").unwrap());
    }

    #[test]
    fn test_dropped_writer_still_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.store");
        let mut store = EmailStore::open(&path).unwrap();
        {
            let mut writer = store.write();
            writer.put(record("<a@x>", "p1")).unwrap();
        }
        assert_eq!(EmailStore::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.store");
        std::fs::write(&path, b"not a store").unwrap();
        assert!(matches!(
            EmailStore::open(&path),
            Err(MailError::InvalidStore { .. })
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.store");
        let mut store = EmailStore::open(&path).unwrap();
        let mut writer = store.write();
        writer.put(record("<a@x>", "p1")).unwrap();
        writer.finish().unwrap();

        let mut data = std::fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        std::fs::write(&path, data).unwrap();
        assert!(matches!(
            EmailStore::open(&path),
            Err(MailError::InvalidStore { ref reason, .. }) if reason.contains("hash")
        ));
    }
}
