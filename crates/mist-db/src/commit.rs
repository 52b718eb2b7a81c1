use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use tracing::{debug, info, warn};

use mist_crypto::SigningKey;
use mist_store::{
    AttributeRow, ContentId, ContentLink, ContentRow, ObjectRow, ParentEdge, TableStore,
    TransactionRow,
};
use mist_txn::Transaction;
use mist_types::{Digest, GlobalId, LocalId, ObjectStatus, Version};

use crate::codec::encode_attribute;
use crate::error::{MistError, MistResult};
use crate::validation::{Validated, Validator};

/// How a transaction's parents and timestamp are chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitMode {
    /// A locally staged transaction: parents are the current heads and the
    /// timestamp is the commit time.
    Local,
    /// A transaction received from a peer or a backup: parents and timestamp
    /// are kept as recorded and the recomputed hash must match the carried one.
    Import,
}

/// Applies transactions to a [`TableStore`].
///
/// The engine does no locking of its own; callers hold the store lock for
/// the whole of [`commit`](Self::commit).
pub struct CommitEngine<'a, S: TableStore + ?Sized> {
    store: &'a mut S,
    batch_size: usize,
    signer: Option<&'a SigningKey>,
}

impl<'a, S: TableStore + ?Sized> CommitEngine<'a, S> {
    pub fn new(store: &'a mut S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size,
            signer: None,
        }
    }

    /// Sign locally committed transactions with `key`.
    pub fn with_signer(mut self, key: Option<&'a SigningKey>) -> Self {
        self.signer = key;
        self
    }

    /// Apply `txn` inside its own storage transaction. On any failure the
    /// store is rolled back and left exactly as it was.
    pub fn commit(&mut self, txn: Transaction, mode: CommitMode) -> MistResult<Transaction> {
        self.store.begin()?;
        let applied = match self.apply(txn, mode) {
            Ok(applied) => applied,
            Err(err) => {
                self.abort();
                warn!(code = err.code(), error = %err, "transaction rejected");
                return Err(err);
            }
        };
        if let Err(err) = self.store.commit() {
            self.abort();
            return Err(err.into());
        }
        info!(
            version = %version_of(&applied),
            hash = %applied.hash.map(|h| h.short_hex()).unwrap_or_default(),
            objects = applied.objects.len(),
            deleted = applied.deleted_objects.len(),
            "transaction committed"
        );
        Ok(applied)
    }

    /// Apply `txn` within a storage transaction the caller has already begun.
    /// Nothing is written unless every check passes, but the caller owns the
    /// commit or rollback.
    pub fn apply(&mut self, mut txn: Transaction, mode: CommitMode) -> MistResult<Transaction> {
        let version = Version::after(self.store.max_version()?);
        let claimed = match mode {
            CommitMode::Local => {
                let parents = self
                    .store
                    .heads()?
                    .into_iter()
                    .map(|row| (row.hash, row.version))
                    .collect();
                txn.seal(parents, Utc::now());
                None
            }
            CommitMode::Import => Some(self.seal_imported(&mut txn)?),
        };

        let validated = Validator::new(&*self.store, self.batch_size).validate(&txn)?;
        let known_content = self.check_content(&txn)?;

        let hash = txn.compute_hash()?;
        if let Some(claimed) = claimed {
            if claimed != hash {
                return Err(MistError::HashMismatch(format!(
                    "transaction {claimed} recomputes to {hash}"
                )));
            }
        }
        txn.hash = Some(hash);
        txn.version = Some(version);
        if mode == CommitMode::Local {
            if let Some(key) = self.signer {
                txn.sign(key)?;
            }
        }

        debug!(%version, hash = %hash.short_hex(), ?mode, "writing transaction");
        self.write(&txn, version, validated, known_content)?;
        Ok(txn)
    }

    /// Resolve the recorded parent hashes to local versions. Every parent
    /// must already be known here, and the transaction itself must not be.
    fn seal_imported(&self, txn: &mut Transaction) -> MistResult<Digest> {
        let claimed = txn
            .hash
            .ok_or_else(|| MistError::InvalidState("received transaction carries no hash".into()))?;
        if self.find_by_hash(&claimed)?.is_some() {
            return Err(MistError::Duplicate(format!(
                "transaction {claimed} is already committed"
            )));
        }
        let recorded = txn
            .parents
            .take()
            .ok_or_else(|| MistError::InvalidState("received transaction has no parents".into()))?;
        let timestamp = txn.timestamp.ok_or_else(|| {
            MistError::InvalidState("received transaction has no timestamp".into())
        })?;

        let mut parents = BTreeMap::new();
        for hash in recorded.keys() {
            let row = self
                .find_by_hash(hash)?
                .ok_or_else(|| MistError::NotFound(format!("parent transaction {hash}")))?;
            parents.insert(*hash, row.version);
        }
        txn.seal(parents, timestamp);
        Ok(claimed)
    }

    fn find_by_hash(&self, hash: &Digest) -> MistResult<Option<TransactionRow>> {
        Ok(self
            .store
            .transactions_by_hash_prefix(&hash.to_hex())?
            .into_iter()
            .find(|row| row.hash == *hash))
    }

    /// Every content hash an object references must be staged here or
    /// already stored. Returns the ids of the stored ones.
    fn check_content(&self, txn: &Transaction) -> MistResult<HashMap<Digest, ContentId>> {
        let wanted: BTreeSet<Digest> = txn
            .content
            .keys()
            .copied()
            .chain(txn.objects.values().filter_map(|record| record.content))
            .collect();
        let wanted: Vec<Digest> = wanted.into_iter().collect();
        let known: HashMap<Digest, ContentId> = self
            .store
            .content_by_hash(&wanted)?
            .into_iter()
            .map(|row| (row.hash, row.id))
            .collect();

        for (id, record) in &txn.objects {
            if let Some(hash) = record.content {
                if !txn.content.contains_key(&hash) && !known.contains_key(&hash) {
                    return Err(MistError::NotFound(format!(
                        "content {hash} referenced by object {id}"
                    )));
                }
            }
        }
        Ok(known)
    }

    fn write(
        &mut self,
        txn: &Transaction,
        version: Version,
        validated: Validated,
        known_content: HashMap<Digest, ContentId>,
    ) -> MistResult<()> {
        let hash = txn.hash.ok_or_else(|| MistError::InvalidState("unhashed transaction".into()))?;
        let timestamp = txn
            .timestamp
            .ok_or_else(|| MistError::InvalidState("unsealed transaction".into()))?;

        self.store.insert_transaction(TransactionRow {
            version,
            timestamp,
            user: txn.user.clone(),
            hash,
            signature: txn.signature.clone(),
        })?;
        for parent_version in txn.parents.iter().flat_map(|p| p.values()) {
            self.store.insert_parent_edge(ParentEdge {
                version,
                parent_version: *parent_version,
            })?;
        }

        let mut next_content = self.store.next_content_id()?;
        for (digest, blob) in &txn.content {
            let id = match known_content.get(digest) {
                Some(id) => *id,
                None => {
                    let id = next_content;
                    next_content = ContentId(id.0 + 1);
                    self.store.insert_content(ContentRow {
                        id,
                        hash: *digest,
                        blob: blob.clone(),
                    })?;
                    id
                }
            };
            self.store.link_content(ContentLink {
                version,
                content_id: id,
            })?;
        }

        let mut locals: HashMap<GlobalId, LocalId> = validated
            .rows
            .iter()
            .map(|(id, row)| (*id, row.local_id))
            .collect();
        let mut next_local = self.store.next_local_id()?;
        for id in &validated.created {
            locals.insert(*id, next_local);
            next_local = next_local.next();
        }

        for id in &txn.deleted_objects {
            let prior = validated
                .rows
                .get(id)
                .ok_or_else(|| MistError::InvalidState(format!("no row for deleted {id}")))?;
            self.store.supersede_object(prior.local_id)?;
            self.store.insert_object(ObjectRow {
                version,
                status: ObjectStatus::Deleted,
                ..prior.clone()
            })?;
        }

        for (id, record) in &txn.objects {
            let local = local_of(&locals, id)?;
            if !validated.created.contains(id) {
                self.store.supersede_object(local)?;
            }
            let parent = record
                .parent
                .map(|parent| local_of(&locals, &parent))
                .transpose()?;
            self.store.insert_object(ObjectRow {
                global_id: *id,
                local_id: local,
                version,
                status: ObjectStatus::Current,
                parent,
                path_elem: record.path_elem.clone(),
                content: record.content,
                content_type: record.content_type.clone(),
            })?;
            for (name, value) in &record.attributes {
                let (value, is_json) = encode_attribute(value);
                self.store.insert_attribute(AttributeRow {
                    object: local,
                    version,
                    name: name.clone(),
                    value,
                    is_json,
                })?;
            }
        }
        Ok(())
    }

    fn abort(&mut self) {
        if let Err(err) = self.store.rollback() {
            warn!(error = %err, "rollback failed");
        }
    }
}

fn local_of(locals: &HashMap<GlobalId, LocalId>, id: &GlobalId) -> MistResult<LocalId> {
    locals
        .get(id)
        .copied()
        .ok_or_else(|| MistError::InvalidState(format!("no local id for object {id}")))
}

fn version_of(txn: &Transaction) -> String {
    txn.version.map(|v| v.to_string()).unwrap_or_default()
}
