use mist_types::{Digest, GlobalId, LocalId, Version};

use crate::error::StoreResult;
use crate::rows::{
    AttributeRow, ContentId, ContentLink, ContentRow, ObjectRow, ParentEdge, TransactionRow,
};

/// Transactional table store backing a mistDb instance.
///
/// All implementations must satisfy these invariants:
/// - Writes are only accepted between [`begin`](Self::begin) and
///   [`commit`](Self::commit) / [`rollback`](Self::rollback).
/// - A rollback restores every table to its state at `begin`.
/// - Reads inside an open transaction observe its own uncommitted writes.
/// - Object rows are never removed; [`supersede_object`](Self::supersede_object)
///   only advances the status of the latest row.
pub trait TableStore: Send {
    fn begin(&mut self) -> StoreResult<()>;

    fn commit(&mut self) -> StoreResult<()>;

    fn rollback(&mut self) -> StoreResult<()>;

    // ---- Transaction table ----

    /// All committed transactions in ascending version order.
    fn transactions(&self) -> StoreResult<Vec<TransactionRow>>;

    fn transaction(&self, version: Version) -> StoreResult<Option<TransactionRow>>;

    /// Transactions whose hex hash starts with `prefix`.
    fn transactions_by_hash_prefix(&self, prefix: &str) -> StoreResult<Vec<TransactionRow>>;

    /// Transactions no other transaction names as a parent.
    fn heads(&self) -> StoreResult<Vec<TransactionRow>>;

    fn max_version(&self) -> StoreResult<Option<Version>>;

    /// Parent versions of a transaction in ascending order.
    fn parent_versions(&self, version: Version) -> StoreResult<Vec<Version>>;

    fn insert_transaction(&mut self, row: TransactionRow) -> StoreResult<()>;

    fn insert_parent_edge(&mut self, edge: ParentEdge) -> StoreResult<()>;

    // ---- Object table ----

    /// The next unused object local id.
    fn next_local_id(&self) -> StoreResult<LocalId>;

    /// Latest row (`Current` or `Deleted`) of each known object in `ids`.
    fn latest_objects(&self, ids: &[GlobalId]) -> StoreResult<Vec<ObjectRow>>;

    /// Latest row of each known object in `ids`, looked up by local id.
    fn latest_objects_by_local(&self, ids: &[LocalId]) -> StoreResult<Vec<ObjectRow>>;

    /// Live (`Current`) rows whose parent is one of `parents`.
    fn live_children(&self, parents: &[LocalId]) -> StoreResult<Vec<ObjectRow>>;

    /// Rows written by a given transaction, whatever their current status.
    fn object_rows_at(&self, version: Version) -> StoreResult<Vec<ObjectRow>>;

    /// Mark the latest row of an object as superseded. Fails with
    /// [`StoreError::Constraint`](crate::StoreError::Constraint) when the
    /// object is unknown or has already been superseded.
    fn supersede_object(&mut self, id: LocalId) -> StoreResult<()>;

    fn insert_object(&mut self, row: ObjectRow) -> StoreResult<()>;

    // ---- Attribute table ----

    fn attributes_at(&self, version: Version) -> StoreResult<Vec<AttributeRow>>;

    fn insert_attribute(&mut self, row: AttributeRow) -> StoreResult<()>;

    // ---- Content tables ----

    fn next_content_id(&self) -> StoreResult<ContentId>;

    fn content_by_hash(&self, hashes: &[Digest]) -> StoreResult<Vec<ContentRow>>;

    /// Blobs attributed to a transaction, in hash order.
    fn content_at(&self, version: Version) -> StoreResult<Vec<ContentRow>>;

    fn insert_content(&mut self, row: ContentRow) -> StoreResult<()>;

    fn link_content(&mut self, link: ContentLink) -> StoreResult<()>;

    /// Returns `true` if no transaction has ever been committed.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.max_version()?.is_none())
    }
}
