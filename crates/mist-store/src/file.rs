use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mist_types::{Digest, GlobalId, LocalId, Version};

use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryTableStore, Tables};
use crate::rows::{
    AttributeRow, ContentId, ContentLink, ContentRow, ObjectRow, ParentEdge, TransactionRow,
};
use crate::traits::TableStore;

/// Snapshot format version written to disk.
const SNAPSHOT_FORMAT: u32 = 1;

/// On-disk layout: a format tag followed by the bincode-encoded tables.
#[derive(Deserialize)]
struct Snapshot {
    format: u32,
    tables: Tables,
}

/// Borrowing twin of [`Snapshot`] used for writing; encodes identically.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    tables: &'a Tables,
}

/// File-backed table store.
///
/// Tables live in memory; every `commit` rewrites the whole snapshot to a
/// temporary file in the same directory and renames it over the store path,
/// so a crash leaves either the previous or the new state on disk, never a
/// torn one.
#[derive(Debug)]
pub struct FileTableStore {
    path: PathBuf,
    inner: InMemoryTableStore,
}

impl FileTableStore {
    /// Create a new, empty store at `path`. Fails if the path already exists.
    pub fn create(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(StoreError::FileExists(path));
        }
        let store = Self {
            path,
            inner: InMemoryTableStore::new(),
        };
        store.persist()?;
        info!(path = %store.path.display(), "created store");
        Ok(store)
    }

    /// Open an existing store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(StoreError::Corrupt(format!(
                "unsupported snapshot format {}",
                snapshot.format
            )));
        }
        debug!(
            path = %path.display(),
            transactions = snapshot.tables.transaction_count(),
            "opened store"
        );
        Ok(Self {
            path,
            inner: InMemoryTableStore::from_tables(snapshot.tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            let snapshot = SnapshotRef {
                format: SNAPSHOT_FORMAT,
                tables: self.inner.tables(),
            };
            bincode::serialize_into(&mut writer, &snapshot)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl TableStore for FileTableStore {
    fn begin(&mut self) -> StoreResult<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> StoreResult<()> {
        if !self.inner.in_transaction() {
            return Err(StoreError::NoTransaction);
        }
        // Persist first so a failed write can still be rolled back.
        self.persist()?;
        self.inner.commit()
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback()
    }

    fn transactions(&self) -> StoreResult<Vec<TransactionRow>> {
        self.inner.transactions()
    }

    fn transaction(&self, version: Version) -> StoreResult<Option<TransactionRow>> {
        self.inner.transaction(version)
    }

    fn transactions_by_hash_prefix(&self, prefix: &str) -> StoreResult<Vec<TransactionRow>> {
        self.inner.transactions_by_hash_prefix(prefix)
    }

    fn heads(&self) -> StoreResult<Vec<TransactionRow>> {
        self.inner.heads()
    }

    fn max_version(&self) -> StoreResult<Option<Version>> {
        self.inner.max_version()
    }

    fn parent_versions(&self, version: Version) -> StoreResult<Vec<Version>> {
        self.inner.parent_versions(version)
    }

    fn insert_transaction(&mut self, row: TransactionRow) -> StoreResult<()> {
        self.inner.insert_transaction(row)
    }

    fn insert_parent_edge(&mut self, edge: ParentEdge) -> StoreResult<()> {
        self.inner.insert_parent_edge(edge)
    }

    fn next_local_id(&self) -> StoreResult<LocalId> {
        self.inner.next_local_id()
    }

    fn latest_objects(&self, ids: &[GlobalId]) -> StoreResult<Vec<ObjectRow>> {
        self.inner.latest_objects(ids)
    }

    fn latest_objects_by_local(&self, ids: &[LocalId]) -> StoreResult<Vec<ObjectRow>> {
        self.inner.latest_objects_by_local(ids)
    }

    fn live_children(&self, parents: &[LocalId]) -> StoreResult<Vec<ObjectRow>> {
        self.inner.live_children(parents)
    }

    fn object_rows_at(&self, version: Version) -> StoreResult<Vec<ObjectRow>> {
        self.inner.object_rows_at(version)
    }

    fn supersede_object(&mut self, id: LocalId) -> StoreResult<()> {
        self.inner.supersede_object(id)
    }

    fn insert_object(&mut self, row: ObjectRow) -> StoreResult<()> {
        self.inner.insert_object(row)
    }

    fn attributes_at(&self, version: Version) -> StoreResult<Vec<AttributeRow>> {
        self.inner.attributes_at(version)
    }

    fn insert_attribute(&mut self, row: AttributeRow) -> StoreResult<()> {
        self.inner.insert_attribute(row)
    }

    fn next_content_id(&self) -> StoreResult<ContentId> {
        self.inner.next_content_id()
    }

    fn content_by_hash(&self, hashes: &[Digest]) -> StoreResult<Vec<ContentRow>> {
        self.inner.content_by_hash(hashes)
    }

    fn content_at(&self, version: Version) -> StoreResult<Vec<ContentRow>> {
        self.inner.content_at(version)
    }

    fn insert_content(&mut self, row: ContentRow) -> StoreResult<()> {
        self.inner.insert_content(row)
    }

    fn link_content(&mut self, link: ContentLink) -> StoreResult<()> {
        self.inner.link_content(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tx(version: u64) -> TransactionRow {
        TransactionRow {
            version: Version(version),
            timestamp: Utc::now(),
            user: Some("alice".into()),
            hash: Digest::from_bytes([version as u8; Digest::LEN]),
            signature: None,
        }
    }

    #[test]
    fn create_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mist");
        FileTableStore::create(&path).unwrap();
        let err = FileTableStore::create(&path).unwrap_err();
        assert!(matches!(err, StoreError::FileExists(p) if p == path));
    }

    #[test]
    fn committed_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mist");
        let mut store = FileTableStore::create(&path).unwrap();
        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        store
            .insert_content(ContentRow {
                id: ContentId(1),
                hash: Digest::from_bytes([1; Digest::LEN]),
                blob: vec![0, 1, 2, 255],
            })
            .unwrap();
        store.commit().unwrap();

        let reopened = FileTableStore::open(&path).unwrap();
        assert_eq!(reopened.max_version().unwrap(), Some(Version(2)));
        assert_eq!(
            reopened.transaction(Version(2)).unwrap(),
            store.transaction(Version(2)).unwrap()
        );
        let blobs = reopened
            .content_by_hash(&[Digest::from_bytes([1; Digest::LEN])])
            .unwrap();
        assert_eq!(blobs[0].blob, vec![0, 1, 2, 255]);
    }

    #[test]
    fn rolled_back_state_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mist");
        let mut store = FileTableStore::create(&path).unwrap();
        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        store.rollback().unwrap();

        let reopened = FileTableStore::open(&path).unwrap();
        assert!(reopened.is_empty().unwrap());
    }

    #[test]
    fn failed_persist_can_be_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("nested");
        std::fs::create_dir(&store_dir).unwrap();
        let mut store = FileTableStore::create(store_dir.join("store.mist")).unwrap();
        std::fs::remove_dir_all(&store_dir).unwrap();

        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        assert!(matches!(store.commit(), Err(StoreError::Io(_))));
        store.rollback().unwrap();
        assert!(store.is_empty().unwrap());
        store.begin().unwrap();
    }

    #[test]
    fn open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mist");
        std::fs::write(&path, b"not a snapshot").unwrap();
        assert!(matches!(
            FileTableStore::open(&path),
            Err(StoreError::Corrupt(_))
        ));
    }
}
