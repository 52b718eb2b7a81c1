use std::collections::{BTreeSet, HashMap, HashSet};

use mist_store::{ObjectRow, TableStore};
use mist_txn::Transaction;
use mist_types::{GlobalId, LocalId};

use crate::error::{MistError, MistResult};

/// Checks a sealed transaction against the persisted object graph.
///
/// Runs before any row is written. Persisted rows are fetched lazily: the
/// touched objects and their staged parents up front, then ancestors in
/// batches only as far as the cycle walk needs them.
pub struct Validator<'a, S: TableStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    rows: HashMap<GlobalId, ObjectRow>,
    by_local: HashMap<LocalId, GlobalId>,
    absent: HashSet<GlobalId>,
    absent_local: HashSet<LocalId>,
}

/// What validation learned about the transaction's objects.
#[derive(Debug)]
pub struct Validated {
    /// Latest persisted rows of touched objects, their parents, and any
    /// ancestors visited by the cycle check.
    pub rows: HashMap<GlobalId, ObjectRow>,
    /// Staged objects with no persisted row.
    pub created: BTreeSet<GlobalId>,
}

enum Cursor {
    Global(GlobalId),
    Local(LocalId),
}

struct Walk {
    start: GlobalId,
    at: Cursor,
    seen: HashSet<GlobalId>,
}

enum Step {
    Rooted,
    Fetch(LocalId),
}

impl<'a, S: TableStore + ?Sized> Validator<'a, S> {
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            rows: HashMap::new(),
            by_local: HashMap::new(),
            absent: HashSet::new(),
            absent_local: HashSet::new(),
        }
    }

    pub fn validate(mut self, txn: &Transaction) -> MistResult<Validated> {
        if let Some(id) = txn.deleted_objects.iter().find(|id| txn.objects.contains_key(id)) {
            return Err(MistError::Duplicate(format!(
                "object {id} is both staged and deleted"
            )));
        }

        let wanted: BTreeSet<GlobalId> = txn
            .objects
            .keys()
            .chain(txn.deleted_objects.iter())
            .copied()
            .chain(txn.objects.values().filter_map(|record| record.parent))
            .collect();
        self.fetch(wanted)?;

        let created = self.classify(txn)?;
        self.check_parents(txn)?;
        self.check_acyclic(txn)?;
        self.check_deletes(txn)?;

        Ok(Validated {
            rows: self.rows,
            created,
        })
    }

    fn classify(&self, txn: &Transaction) -> MistResult<BTreeSet<GlobalId>> {
        let mut created = BTreeSet::new();
        for id in txn.objects.keys() {
            match self.rows.get(id) {
                Some(row) if row.status.is_deletion() => {
                    return Err(MistError::NotFound(format!("object {id} has been deleted")));
                }
                Some(_) => {}
                None => {
                    created.insert(*id);
                }
            }
        }
        for id in &txn.deleted_objects {
            match self.rows.get(id) {
                Some(row) if row.status.is_live() => {}
                Some(_) => {
                    return Err(MistError::NotFound(format!("object {id} is already deleted")));
                }
                None => return Err(MistError::NotFound(format!("object {id} does not exist"))),
            }
        }
        Ok(created)
    }

    /// Every parent must be staged here or live in the store. Parents
    /// deleted by this same transaction are left to the delete check.
    fn check_parents(&self, txn: &Transaction) -> MistResult<()> {
        for (id, record) in &txn.objects {
            let Some(parent) = record.parent else { continue };
            if parent == *id {
                return Err(MistError::InvalidParent(format!(
                    "object {id} cannot be its own parent"
                )));
            }
            if txn.objects.contains_key(&parent) || txn.deleted_objects.contains(&parent) {
                continue;
            }
            match self.rows.get(&parent) {
                Some(row) if row.status.is_live() => {}
                Some(_) => {
                    return Err(MistError::InvalidParent(format!(
                        "parent {parent} of object {id} has been deleted"
                    )));
                }
                None => {
                    return Err(MistError::InvalidParent(format!(
                        "parent {parent} of object {id} does not exist"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Walk each staged object's ancestor chain through the graph as it will
    /// look after commit. Revisiting a node means a cycle.
    fn check_acyclic(&mut self, txn: &Transaction) -> MistResult<()> {
        let mut rooted: HashSet<GlobalId> = HashSet::new();
        let mut walks: Vec<Walk> = txn
            .objects
            .keys()
            .map(|id| Walk {
                start: *id,
                at: Cursor::Global(*id),
                seen: HashSet::new(),
            })
            .collect();

        while !walks.is_empty() {
            let mut pending = Vec::new();
            let mut wanted = BTreeSet::new();
            for mut walk in walks {
                match self.advance(txn, &mut walk, &rooted)? {
                    Step::Rooted => rooted.extend(walk.seen),
                    Step::Fetch(local) => {
                        wanted.insert(local);
                        pending.push(walk);
                    }
                }
            }
            if !wanted.is_empty() {
                tracing::trace!(count = wanted.len(), "fetching ancestor rows");
                self.fetch_local(wanted)?;
            }
            walks = pending;
        }
        Ok(())
    }

    fn advance(
        &self,
        txn: &Transaction,
        walk: &mut Walk,
        rooted: &HashSet<GlobalId>,
    ) -> MistResult<Step> {
        loop {
            let id = match walk.at {
                Cursor::Global(id) => id,
                Cursor::Local(local) => match self.by_local.get(&local) {
                    Some(id) => *id,
                    None if self.absent_local.contains(&local) => return Ok(Step::Rooted),
                    None => return Ok(Step::Fetch(local)),
                },
            };
            if rooted.contains(&id) {
                return Ok(Step::Rooted);
            }
            if !walk.seen.insert(id) {
                return Err(MistError::InvalidParent(format!(
                    "object {} would become its own ancestor",
                    walk.start
                )));
            }
            let next = match txn.objects.get(&id) {
                Some(record) => record.parent.map(Cursor::Global),
                None => self.rows.get(&id).and_then(|row| row.parent).map(Cursor::Local),
            };
            match next {
                Some(cursor) => walk.at = cursor,
                None => return Ok(Step::Rooted),
            }
        }
    }

    /// A deleted object may keep no live children once the transaction
    /// applies: persisted children must be deleted in the same transaction,
    /// and no staged object may name it as parent.
    fn check_deletes(&self, txn: &Transaction) -> MistResult<()> {
        if txn.deleted_objects.is_empty() {
            return Ok(());
        }
        let deleted_locals: HashMap<LocalId, GlobalId> = txn
            .deleted_objects
            .iter()
            .filter_map(|id| self.rows.get(id).map(|row| (row.local_id, *id)))
            .collect();
        let locals: Vec<LocalId> = deleted_locals.keys().copied().collect();

        let mut children = Vec::new();
        for chunk in locals.chunks(self.batch_size) {
            children.extend(self.store.live_children(chunk)?);
        }

        for child in children {
            if txn.deleted_objects.contains(&child.global_id) {
                continue;
            }
            // A live child must be deleted alongside its parent; moving it
            // elsewhere in the same transaction does not count.
            if let Some(parent) = child.parent.and_then(|local| deleted_locals.get(&local)) {
                return Err(MistError::NotEmpty(format!(
                    "object {parent} still has child {}",
                    child.global_id
                )));
            }
        }

        for (id, record) in &txn.objects {
            if let Some(parent) = record.parent.filter(|p| txn.deleted_objects.contains(p)) {
                return Err(MistError::NotEmpty(format!(
                    "object {parent} is deleted while {id} is placed under it"
                )));
            }
        }
        Ok(())
    }

    fn fetch(&mut self, ids: impl IntoIterator<Item = GlobalId>) -> MistResult<()> {
        let ids: Vec<GlobalId> = ids
            .into_iter()
            .filter(|id| !self.rows.contains_key(id) && !self.absent.contains(id))
            .collect();
        for chunk in ids.chunks(self.batch_size) {
            for row in self.store.latest_objects(chunk)? {
                self.remember(row);
            }
            for id in chunk {
                if !self.rows.contains_key(id) {
                    self.absent.insert(*id);
                }
            }
        }
        Ok(())
    }

    fn fetch_local(&mut self, ids: impl IntoIterator<Item = LocalId>) -> MistResult<()> {
        let ids: Vec<LocalId> = ids
            .into_iter()
            .filter(|id| !self.by_local.contains_key(id) && !self.absent_local.contains(id))
            .collect();
        for chunk in ids.chunks(self.batch_size) {
            for row in self.store.latest_objects_by_local(chunk)? {
                self.remember(row);
            }
            for id in chunk {
                if !self.by_local.contains_key(id) {
                    self.absent_local.insert(*id);
                }
            }
        }
        Ok(())
    }

    fn remember(&mut self, row: ObjectRow) {
        self.by_local.insert(row.local_id, row.global_id);
        self.rows.entry(row.global_id).or_insert(row);
    }
}
