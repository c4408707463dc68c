//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Persistence abstractions and storage bindings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use parking_lot::RwLock;

use crate::record::StatusRecord;
use crate::{Result, StatusStore};

/// In-process store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    latest: RwLock<Option<StatusRecord>>,
}

impl MemoryStatusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn put(&self, record: &StatusRecord) -> Result<()> {
        *self.latest.write() = Some(record.clone());
        Ok(())
    }

    fn latest(&self) -> Result<Option<StatusRecord>> {
        Ok(self.latest.read().clone())
    }
}
