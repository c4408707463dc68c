//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Persistence abstractions and storage bindings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::record::StatusRecord;
use crate::{Result, StatusStore, StoreError};

/// Current status file envelope version.
pub const STORE_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusEnvelope {
    version: u16,
    created_at: DateTime<Utc>,
    hash: String,
    record: StatusRecord,
}

/// Keeps the latest status in a single JSON file.
///
/// Writes land in a sibling `.tmp` file that is renamed over the target, so a
/// reader never observes a partially written record.
#[derive(Debug)]
pub struct FileStatusStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStatusStore {
    /// Open a store at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the status file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StatusStore for FileStatusStore {
    fn put(&self, record: &StatusRecord) -> Result<()> {
        let envelope = StatusEnvelope {
            version: STORE_VERSION,
            created_at: Utc::now(),
            hash: compute_hash(record)?,
            record: record.clone(),
        };

        let _guard = self.write_lock.lock();
        let temp = self.temp_path();
        {
            let mut writer = BufWriter::new(File::create(&temp)?);
            serde_json::to_writer_pretty(&mut writer, &envelope)?;
            writer.flush()?;
        }
        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), "status record persisted");
        Ok(())
    }

    fn latest(&self) -> Result<Option<StatusRecord>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let envelope: StatusEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion(envelope.version));
        }
        if compute_hash(&envelope.record)? != envelope.hash {
            return Err(StoreError::HashMismatch);
        }
        Ok(Some(envelope.record))
    }
}

fn compute_hash(record: &StatusRecord) -> Result<String> {
    let serialized = serde_json::to_vec(record)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    Ok(hex::encode(hasher.finalize()))
}
