use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use mist_types::{Digest, GlobalId, LocalId, ObjectStatus, Version};

use crate::error::{StoreError, StoreResult};
use crate::rows::{
    AttributeRow, ContentId, ContentLink, ContentRow, ObjectRow, ParentEdge, TransactionRow,
};
use crate::traits::TableStore;

/// The full set of logical tables plus derived lookup indexes.
///
/// Only the row vectors are serialized; the indexes are rebuilt by
/// [`Tables::reindex`] after loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tables {
    objects: Vec<ObjectRow>,
    attributes: Vec<AttributeRow>,
    contents: Vec<ContentRow>,
    transactions: BTreeMap<Version, TransactionRow>,
    parents: Vec<ParentEdge>,
    content_links: Vec<ContentLink>,

    /// Global id -> position of the object's latest row.
    #[serde(skip)]
    latest: HashMap<GlobalId, usize>,
    #[serde(skip)]
    local_index: HashMap<LocalId, GlobalId>,
    #[serde(skip)]
    content_by_hash: HashMap<Digest, usize>,
    #[serde(skip)]
    content_by_id: HashMap<ContentId, usize>,
    /// Versions named as a parent by some other transaction.
    #[serde(skip)]
    has_child: HashSet<Version>,
}

impl Tables {
    /// Rebuild every lookup index from the row vectors.
    pub fn reindex(&mut self) {
        self.latest.clear();
        self.local_index.clear();
        for (pos, row) in self.objects.iter().enumerate() {
            self.local_index.insert(row.local_id, row.global_id);
            if row.status.is_latest() {
                self.latest.insert(row.global_id, pos);
            }
        }
        self.content_by_hash = self
            .contents
            .iter()
            .enumerate()
            .map(|(pos, row)| (row.hash, pos))
            .collect();
        self.content_by_id = self
            .contents
            .iter()
            .enumerate()
            .map(|(pos, row)| (row.id, pos))
            .collect();
        self.has_child = self.parents.iter().map(|e| e.parent_version).collect();
    }

    /// Every object row ever written, in insertion order.
    pub fn objects(&self) -> &[ObjectRow] {
        &self.objects
    }

    pub fn attributes(&self) -> &[AttributeRow] {
        &self.attributes
    }

    pub fn contents(&self) -> &[ContentRow] {
        &self.contents
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn latest_row(&self, id: &GlobalId) -> Option<&ObjectRow> {
        self.latest.get(id).map(|&pos| &self.objects[pos])
    }
}

/// Rows are append-only apart from status flips, so an open storage
/// transaction is undone by truncating each table back to its length at
/// `begin` and reverting the flips it recorded.
#[derive(Debug, Default)]
struct Savepoint {
    objects: usize,
    attributes: usize,
    contents: usize,
    parents: usize,
    content_links: usize,
    transactions: Vec<Version>,
    /// Row position and status before each supersession, in write order.
    flips: Vec<(usize, ObjectStatus)>,
}

/// In-memory table store for tests and embedding.
///
/// `begin` records a savepoint of table lengths; `rollback` unwinds to it.
#[derive(Debug, Default)]
pub struct InMemoryTableStore {
    tables: Tables,
    savepoint: Option<Savepoint>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap previously loaded tables.
    pub fn from_tables(mut tables: Tables) -> Self {
        tables.reindex();
        Self {
            tables,
            savepoint: None,
        }
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn in_transaction(&self) -> bool {
        self.savepoint.is_some()
    }

    fn writable(&mut self) -> StoreResult<(&mut Tables, &mut Savepoint)> {
        match self.savepoint.as_mut() {
            Some(savepoint) => Ok((&mut self.tables, savepoint)),
            None => Err(StoreError::NoTransaction),
        }
    }
}

impl TableStore for InMemoryTableStore {
    fn begin(&mut self) -> StoreResult<()> {
        if self.savepoint.is_some() {
            return Err(StoreError::TransactionActive);
        }
        let tables = &self.tables;
        self.savepoint = Some(Savepoint {
            objects: tables.objects.len(),
            attributes: tables.attributes.len(),
            contents: tables.contents.len(),
            parents: tables.parents.len(),
            content_links: tables.content_links.len(),
            ..Savepoint::default()
        });
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.savepoint.take().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let savepoint = self.savepoint.take().ok_or(StoreError::NoTransaction)?;
        let tables = &mut self.tables;
        for (pos, status) in savepoint.flips.into_iter().rev() {
            tables.objects[pos].status = status;
        }
        tables.objects.truncate(savepoint.objects);
        tables.attributes.truncate(savepoint.attributes);
        tables.contents.truncate(savepoint.contents);
        tables.parents.truncate(savepoint.parents);
        tables.content_links.truncate(savepoint.content_links);
        for version in savepoint.transactions {
            tables.transactions.remove(&version);
        }
        tables.reindex();
        debug!("rolled back storage transaction");
        Ok(())
    }

    fn transactions(&self) -> StoreResult<Vec<TransactionRow>> {
        Ok(self.tables.transactions.values().cloned().collect())
    }

    fn transaction(&self, version: Version) -> StoreResult<Option<TransactionRow>> {
        Ok(self.tables.transactions.get(&version).cloned())
    }

    fn transactions_by_hash_prefix(&self, prefix: &str) -> StoreResult<Vec<TransactionRow>> {
        Ok(self
            .tables
            .transactions
            .values()
            .filter(|row| row.hash.matches_prefix(prefix))
            .cloned()
            .collect())
    }

    fn heads(&self) -> StoreResult<Vec<TransactionRow>> {
        Ok(self
            .tables
            .transactions
            .values()
            .filter(|row| !self.tables.has_child.contains(&row.version))
            .cloned()
            .collect())
    }

    fn max_version(&self) -> StoreResult<Option<Version>> {
        Ok(self.tables.transactions.keys().next_back().copied())
    }

    fn parent_versions(&self, version: Version) -> StoreResult<Vec<Version>> {
        let mut parents: Vec<Version> = self
            .tables
            .parents
            .iter()
            .filter(|e| e.version == version)
            .map(|e| e.parent_version)
            .collect();
        parents.sort();
        Ok(parents)
    }

    fn insert_transaction(&mut self, row: TransactionRow) -> StoreResult<()> {
        let (tables, savepoint) = self.writable()?;
        if tables.transactions.contains_key(&row.version) {
            return Err(StoreError::Constraint(format!(
                "transaction version {} already exists",
                row.version
            )));
        }
        savepoint.transactions.push(row.version);
        tables.transactions.insert(row.version, row);
        Ok(())
    }

    fn insert_parent_edge(&mut self, edge: ParentEdge) -> StoreResult<()> {
        let (tables, _) = self.writable()?;
        if !tables.transactions.contains_key(&edge.parent_version) {
            return Err(StoreError::Constraint(format!(
                "parent version {} does not exist",
                edge.parent_version
            )));
        }
        tables.has_child.insert(edge.parent_version);
        tables.parents.push(edge);
        Ok(())
    }

    fn next_local_id(&self) -> StoreResult<LocalId> {
        Ok(self
            .tables
            .local_index
            .keys()
            .max()
            .map(|id| id.next())
            .unwrap_or(LocalId::FIRST))
    }

    fn latest_objects(&self, ids: &[GlobalId]) -> StoreResult<Vec<ObjectRow>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.tables.latest_row(id))
            .cloned()
            .collect())
    }

    fn latest_objects_by_local(&self, ids: &[LocalId]) -> StoreResult<Vec<ObjectRow>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.tables.local_index.get(id))
            .filter_map(|global| self.tables.latest_row(global))
            .cloned()
            .collect())
    }

    fn live_children(&self, parents: &[LocalId]) -> StoreResult<Vec<ObjectRow>> {
        let wanted: HashSet<&LocalId> = parents.iter().collect();
        Ok(self
            .tables
            .latest
            .values()
            .map(|&pos| &self.tables.objects[pos])
            .filter(|row| row.status.is_live())
            .filter(|row| row.parent.as_ref().is_some_and(|p| wanted.contains(p)))
            .cloned()
            .collect())
    }

    fn object_rows_at(&self, version: Version) -> StoreResult<Vec<ObjectRow>> {
        Ok(self
            .tables
            .objects
            .iter()
            .filter(|row| row.version == version)
            .cloned()
            .collect())
    }

    fn supersede_object(&mut self, id: LocalId) -> StoreResult<()> {
        let (tables, savepoint) = self.writable()?;
        let Some(global) = tables.local_index.get(&id).copied() else {
            return Err(StoreError::Constraint(format!("unknown local id {id}")));
        };
        let Some(pos) = tables.latest.remove(&global) else {
            return Err(StoreError::Constraint(format!(
                "object {global} has no latest row to supersede"
            )));
        };
        let row = &mut tables.objects[pos];
        savepoint.flips.push((pos, row.status));
        row.status = row.status.superseded();
        Ok(())
    }

    fn insert_object(&mut self, row: ObjectRow) -> StoreResult<()> {
        let (tables, _) = self.writable()?;
        if let Some(known) = tables.local_index.get(&row.local_id) {
            if *known != row.global_id {
                return Err(StoreError::Constraint(format!(
                    "local id {} already belongs to {}",
                    row.local_id, known
                )));
            }
        }
        if row.status.is_latest() && tables.latest.contains_key(&row.global_id) {
            return Err(StoreError::Constraint(format!(
                "object {} already has a latest row",
                row.global_id
            )));
        }
        let pos = tables.objects.len();
        tables.local_index.insert(row.local_id, row.global_id);
        if row.status.is_latest() {
            tables.latest.insert(row.global_id, pos);
        }
        tables.objects.push(row);
        Ok(())
    }

    fn attributes_at(&self, version: Version) -> StoreResult<Vec<AttributeRow>> {
        Ok(self
            .tables
            .attributes
            .iter()
            .filter(|row| row.version == version)
            .cloned()
            .collect())
    }

    fn insert_attribute(&mut self, row: AttributeRow) -> StoreResult<()> {
        self.writable()?.0.attributes.push(row);
        Ok(())
    }

    fn next_content_id(&self) -> StoreResult<ContentId> {
        Ok(ContentId(
            self.tables
                .content_by_id
                .keys()
                .map(|id| id.0)
                .max()
                .unwrap_or(0)
                + 1,
        ))
    }

    fn content_by_hash(&self, hashes: &[Digest]) -> StoreResult<Vec<ContentRow>> {
        Ok(hashes
            .iter()
            .filter_map(|h| self.tables.content_by_hash.get(h))
            .map(|&pos| self.tables.contents[pos].clone())
            .collect())
    }

    fn content_at(&self, version: Version) -> StoreResult<Vec<ContentRow>> {
        let mut rows: Vec<ContentRow> = self
            .tables
            .content_links
            .iter()
            .filter(|link| link.version == version)
            .filter_map(|link| self.tables.content_by_id.get(&link.content_id))
            .map(|&pos| self.tables.contents[pos].clone())
            .collect();
        rows.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(rows)
    }

    fn insert_content(&mut self, row: ContentRow) -> StoreResult<()> {
        let (tables, _) = self.writable()?;
        if tables.content_by_hash.contains_key(&row.hash) {
            return Err(StoreError::Constraint(format!(
                "content {} already stored",
                row.hash
            )));
        }
        if tables.content_by_id.contains_key(&row.id) {
            return Err(StoreError::Constraint(format!(
                "content id {} already used",
                row.id.0
            )));
        }
        let pos = tables.contents.len();
        tables.content_by_hash.insert(row.hash, pos);
        tables.content_by_id.insert(row.id, pos);
        tables.contents.push(row);
        Ok(())
    }

    fn link_content(&mut self, link: ContentLink) -> StoreResult<()> {
        let (tables, _) = self.writable()?;
        if !tables.content_links.contains(&link) {
            tables.content_links.push(link);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn digest(b: u8) -> Digest {
        Digest::from_bytes([b; Digest::LEN])
    }

    fn tx(version: u64) -> TransactionRow {
        TransactionRow {
            version: Version(version),
            timestamp: Utc::now(),
            user: None,
            hash: digest(version as u8),
            signature: None,
        }
    }

    fn object(global: GlobalId, local: u64, version: u64, parent: Option<u64>) -> ObjectRow {
        ObjectRow {
            global_id: global,
            local_id: LocalId(local),
            version: Version(version),
            status: ObjectStatus::Current,
            parent: parent.map(LocalId),
            path_elem: format!("obj{local}"),
            content: None,
            content_type: None,
        }
    }

    #[test]
    fn writes_require_a_transaction() {
        let mut store = InMemoryTableStore::new();
        let err = store.insert_transaction(tx(2)).unwrap_err();
        assert!(matches!(err, StoreError::NoTransaction));
        assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
    }

    #[test]
    fn nested_begin_is_rejected() {
        let mut store = InMemoryTableStore::new();
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(StoreError::TransactionActive)));
    }

    #[test]
    fn rollback_restores_tables() {
        let mut store = InMemoryTableStore::new();
        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        store.commit().unwrap();

        store.begin().unwrap();
        store.insert_transaction(tx(4)).unwrap();
        store
            .insert_object(object(GlobalId::random(), 1, 4, None))
            .unwrap();
        store.rollback().unwrap();

        assert_eq!(store.max_version().unwrap(), Some(Version(2)));
        assert!(store.tables().objects().is_empty());
        assert_eq!(store.next_local_id().unwrap(), LocalId::FIRST);
    }

    #[test]
    fn heads_are_transactions_without_children() {
        let mut store = InMemoryTableStore::new();
        store.begin().unwrap();
        for v in [2, 4, 6] {
            store.insert_transaction(tx(v)).unwrap();
        }
        store
            .insert_parent_edge(ParentEdge {
                version: Version(4),
                parent_version: Version(2),
            })
            .unwrap();
        store
            .insert_parent_edge(ParentEdge {
                version: Version(6),
                parent_version: Version(2),
            })
            .unwrap();
        store.commit().unwrap();

        let heads: Vec<Version> = store.heads().unwrap().iter().map(|r| r.version).collect();
        assert_eq!(heads, vec![Version(4), Version(6)]);
        assert_eq!(store.parent_versions(Version(6)).unwrap(), vec![Version(2)]);
    }

    #[test]
    fn parent_edge_requires_known_parent() {
        let mut store = InMemoryTableStore::new();
        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        let err = store
            .insert_parent_edge(ParentEdge {
                version: Version(2),
                parent_version: Version(8),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[test]
    fn supersede_advances_status_and_keeps_history() {
        let mut store = InMemoryTableStore::new();
        let id = GlobalId::random();
        store.begin().unwrap();
        store.insert_object(object(id, 1, 2, None)).unwrap();
        store.supersede_object(LocalId(1)).unwrap();
        let mut deleted = object(id, 1, 4, None);
        deleted.status = ObjectStatus::Deleted;
        store.insert_object(deleted).unwrap();
        store.commit().unwrap();

        let statuses: Vec<ObjectStatus> =
            store.tables().objects().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ObjectStatus::Old, ObjectStatus::Deleted]);
        let latest = store.latest_objects(&[id]).unwrap();
        assert_eq!(latest[0].version, Version(4));
        assert_eq!(store.next_local_id().unwrap(), LocalId(2));
    }

    #[test]
    fn rollback_unwinds_supersessions() {
        let mut store = InMemoryTableStore::new();
        let (a, b) = (GlobalId::random(), GlobalId::random());
        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        store.insert_object(object(a, 1, 2, None)).unwrap();
        store.insert_object(object(b, 2, 2, Some(1))).unwrap();
        store.commit().unwrap();

        store.begin().unwrap();
        store.insert_transaction(tx(4)).unwrap();
        store.supersede_object(LocalId(2)).unwrap();
        store.insert_object(object(b, 2, 4, None)).unwrap();
        store.supersede_object(LocalId(2)).unwrap();
        let mut deleted = object(b, 2, 4, None);
        deleted.status = ObjectStatus::Deleted;
        store.insert_object(deleted).unwrap();
        store.rollback().unwrap();

        let statuses: Vec<ObjectStatus> =
            store.tables().objects().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ObjectStatus::Current, ObjectStatus::Current]);
        assert_eq!(store.max_version().unwrap(), Some(Version(2)));
        let latest = store.latest_objects(&[b]).unwrap();
        assert_eq!(latest[0].parent, Some(LocalId(1)));
        assert_eq!(store.live_children(&[LocalId(1)]).unwrap().len(), 1);
    }

    #[test]
    fn superseding_an_unknown_object_is_a_constraint_violation() {
        let mut store = InMemoryTableStore::new();
        let id = GlobalId::random();
        store.begin().unwrap();
        let err = store.supersede_object(LocalId(1)).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        store.insert_object(object(id, 1, 2, None)).unwrap();
        store.supersede_object(LocalId(1)).unwrap();
        let err = store.supersede_object(LocalId(1)).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[test]
    fn second_latest_row_is_a_constraint_violation() {
        let mut store = InMemoryTableStore::new();
        let id = GlobalId::random();
        store.begin().unwrap();
        store.insert_object(object(id, 1, 2, None)).unwrap();
        let err = store.insert_object(object(id, 1, 4, None)).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[test]
    fn live_children_skip_deleted_rows() {
        let mut store = InMemoryTableStore::new();
        let (a, b, c) = (GlobalId::random(), GlobalId::random(), GlobalId::random());
        store.begin().unwrap();
        store.insert_object(object(a, 1, 2, None)).unwrap();
        store.insert_object(object(b, 2, 2, Some(1))).unwrap();
        let mut gone = object(c, 3, 2, Some(1));
        gone.status = ObjectStatus::Deleted;
        store.insert_object(gone).unwrap();
        store.commit().unwrap();

        let children = store.live_children(&[LocalId(1)]).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].global_id, b);
    }

    #[test]
    fn content_is_deduplicated_and_linked() {
        let mut store = InMemoryTableStore::new();
        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        let id = store.next_content_id().unwrap();
        store
            .insert_content(ContentRow {
                id,
                hash: digest(9),
                blob: b"blob".to_vec(),
            })
            .unwrap();
        let dup = store.insert_content(ContentRow {
            id: ContentId(7),
            hash: digest(9),
            blob: b"blob".to_vec(),
        });
        assert!(matches!(dup, Err(StoreError::Constraint(_))));
        store
            .link_content(ContentLink {
                version: Version(2),
                content_id: id,
            })
            .unwrap();
        store.commit().unwrap();

        assert_eq!(store.content_at(Version(2)).unwrap().len(), 1);
        assert_eq!(store.content_by_hash(&[digest(9)]).unwrap()[0].id, id);
        assert_eq!(store.next_content_id().unwrap(), ContentId(2));
    }

    #[test]
    fn hash_prefix_lookup() {
        let mut store = InMemoryTableStore::new();
        store.begin().unwrap();
        store.insert_transaction(tx(2)).unwrap();
        store.insert_transaction(tx(4)).unwrap();
        store.commit().unwrap();

        let hits = store.transactions_by_hash_prefix("0202").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version, Version(2));
        assert_eq!(store.transactions_by_hash_prefix("").unwrap().len(), 2);
    }
}
