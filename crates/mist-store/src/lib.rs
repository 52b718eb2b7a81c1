//! Durable table storage for mistDb.
//!
//! The versioning core never talks to a storage engine directly; it reads and
//! writes the logical tables below through the [`TableStore`] trait, inside an
//! explicit begin/commit/rollback bracket.
//!
//! # Tables
//!
//! - `Object(globalId, localId, version, status, parent, pathElem, content, contentType)`
//! - `Attribute(objectLocalId, version, name, value, isJson)`
//! - `Content(id, hash, blob)`
//! - `Transaction(version, timestamp, user, hash, signature)`
//! - `TransactionParent(version, parentVersion)`
//! - `TransactionContent(version, contentId)`
//!
//! # Backends
//!
//! - [`InMemoryTableStore`] -- plain collections, snapshot-based rollback
//! - [`FileTableStore`] -- in-memory tables persisted atomically on commit
//!
//! # Design Rules
//!
//! 1. Rows are never physically removed; superseded object rows change status.
//! 2. Every write happens between `begin` and `commit`/`rollback`.
//! 3. A rollback restores the tables exactly as they were at `begin`.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod rows;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileTableStore;
pub use memory::{InMemoryTableStore, Tables};
pub use rows::{
    AttributeRow, Cell, ContentId, ContentLink, ContentRow, ObjectRow, ParentEdge, TransactionRow,
};
pub use traits::TableStore;
