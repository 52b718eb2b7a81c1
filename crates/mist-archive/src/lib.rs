//! Backup and restore for mistDb.
//!
//! A backup is a zip bundle holding one canonical JSON document per
//! committed transaction plus each content blob once (see [`layout`]).
//! Restoring replays the documents in version order into an empty store,
//! re-verifying every hash, and keeps nothing if any document fails.

pub mod archiver;
pub mod config;
pub mod error;
pub mod layout;

pub use archiver::{Archiver, BackupSummary};
pub use config::{ArchiveConfig, Compression};
pub use error::{ArchiveError, ArchiveResult};
