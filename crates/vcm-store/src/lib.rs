//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Persistence abstractions and storage bindings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Storage for the most recent charger status.
//!
//! Only one record is kept: each accepted update replaces the previous one.
//! Readers go through [`lookup`], which classifies the record as fresh, stale
//! or absent relative to a maximum age.

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the store subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Wrapper for IO errors encountered while reading/writing the status file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when the stored record fails integrity verification.
    #[error("status file hash mismatch")]
    HashMismatch,
    /// Reported when the envelope was written by an incompatible version.
    #[error("unsupported status file version {0}")]
    UnsupportedVersion(u16),
}

pub mod file;
pub mod memory;
pub mod record;

pub use file::{FileStatusStore, STORE_VERSION};
pub use memory::MemoryStatusStore;
pub use record::{lookup, StatusLookup, StatusRecord};

/// Backend holding the latest [`StatusRecord`].
pub trait StatusStore: Send + Sync + 'static {
    /// Replace the stored record.
    fn put(&self, record: &StatusRecord) -> Result<()>;

    /// Return the stored record, if any.
    fn latest(&self) -> Result<Option<StatusRecord>>;
}
