use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use mist_crypto::{SigningKey, VerifyingKey};
use mist_store::{FileTableStore, InMemoryTableStore, TableStore};
use mist_txn::{Object, ObjectRecord, Transaction, TransactionBuilder, TransactionDocument};
use mist_types::{Attributes, Digest, GlobalId, Version};

use crate::codec::decode_attribute;
use crate::commit::{CommitEngine, CommitMode};
use crate::config::MistConfig;
use crate::error::{MistError, MistResult};
use crate::history::{HistoryReader, TransactionRef, TransactionSummary};
use crate::lock::{LockGuard, LockManager};

/// A mistDb instance: one table store behind a FIFO lock.
///
/// Every operation, read or write, takes the lock for its whole duration,
/// so operations are totally ordered in arrival order.
pub struct MistDb<S: TableStore> {
    store: LockManager<S>,
    config: MistConfig,
    signer: Option<SigningKey>,
}

/// Outcome of [`MistDb::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub checked: usize,
    pub failures: Vec<VerificationFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationFailure {
    pub version: Version,
    pub reason: String,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl MistDb<InMemoryTableStore> {
    pub fn in_memory(config: MistConfig) -> Self {
        Self::new(InMemoryTableStore::new(), config)
    }
}

impl MistDb<FileTableStore> {
    /// Create a new file-backed database. Fails with
    /// [`FileExists`](MistError::FileExists) if `path` exists.
    pub fn create(path: impl AsRef<Path>, config: MistConfig) -> MistResult<Self> {
        let store = FileTableStore::create(path.as_ref())?;
        info!(path = %path.as_ref().display(), "created database");
        Ok(Self::new(store, config))
    }

    pub fn open(path: impl AsRef<Path>, config: MistConfig) -> MistResult<Self> {
        let store = FileTableStore::open(path.as_ref())?;
        Ok(Self::new(store, config))
    }
}

impl<S: TableStore> MistDb<S> {
    pub fn new(store: S, config: MistConfig) -> Self {
        Self {
            store: LockManager::new(store, config.lock_timeout),
            config,
            signer: None,
        }
    }

    /// Sign every locally committed transaction with `key`.
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signer = Some(key);
        self
    }

    pub fn config(&self) -> &MistConfig {
        &self.config
    }

    /// The lock serializing access to the store.
    pub fn lock(&self) -> &LockManager<S> {
        &self.store
    }

    /// Wait for exclusive access to the store.
    pub async fn acquire(&self) -> MistResult<LockGuard<'_, S>> {
        self.store.acquire().await
    }

    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    /// Commit a staged transaction. Resolves to the committed transaction
    /// with its version, parents and hash assigned.
    pub async fn submit(&self, builder: TransactionBuilder) -> MistResult<Transaction> {
        self.submit_transaction(builder.build()).await
    }

    pub async fn submit_transaction(&self, txn: Transaction) -> MistResult<Transaction> {
        let txn = self.stamp_user(txn);
        let mut store = self.store.acquire().await?;
        self.engine(&mut *store).commit(txn, CommitMode::Local)
    }

    /// [`submit_transaction`](Self::submit_transaction) under the configured
    /// [`RetryPolicy`](crate::RetryPolicy).
    pub async fn submit_with_retry(&self, txn: Transaction) -> MistResult<Transaction> {
        self.config
            .retry
            .run(|_| self.submit_transaction(txn.clone()))
            .await
    }

    /// Apply a transaction received from another peer. Its parents must all
    /// be known here; its recorded timestamp and parent set are kept.
    pub async fn import_transaction(&self, txn: Transaction) -> MistResult<Transaction> {
        let mut store = self.store.acquire().await?;
        self.engine(&mut *store).commit(txn, CommitMode::Import)
    }

    /// Decode and apply a peer's transaction document. Blobs are taken from
    /// `blobs`, or from this store when already present.
    pub async fn import_document(
        &self,
        doc: TransactionDocument,
        blobs: &BTreeMap<Digest, Vec<u8>>,
    ) -> MistResult<Transaction> {
        if !doc.verify_hash()? {
            return Err(MistError::HashMismatch(format!("document {}", doc.id)));
        }
        let mut store = self.store.acquire().await?;
        let missing: Vec<Digest> = doc
            .transaction
            .content
            .keys()
            .filter(|hash| !blobs.contains_key(hash))
            .copied()
            .collect();
        let mut stored = BTreeMap::new();
        for chunk in missing.chunks(self.config.ancestor_batch_size) {
            for row in store.content_by_hash(chunk)? {
                stored.insert(row.hash, row.blob);
            }
        }
        let txn = doc.into_transaction(|hash, _| {
            blobs
                .get(hash)
                .or_else(|| stored.get(hash))
                .cloned()
                .ok_or(mist_txn::TxnError::MissingContent(*hash))
        })?;
        self.engine(&mut *store).commit(txn, CommitMode::Import)
    }

    /// Replay `txns` into this database, which must be empty, as one storage
    /// transaction. The first failure rolls everything back.
    pub async fn restore<I>(&self, txns: I) -> MistResult<usize>
    where
        I: IntoIterator<Item = MistResult<Transaction>>,
    {
        let mut store = self.store.acquire().await?;
        if !store.is_empty()? {
            return Err(MistError::FileExists(
                "restore target already holds transactions".into(),
            ));
        }
        store.begin()?;
        let mut applied = 0;
        for txn in txns {
            let result = txn.and_then(|txn| self.engine(&mut *store).apply(txn, CommitMode::Import));
            if let Err(err) = result {
                if let Err(rollback) = store.rollback() {
                    warn!(error = %rollback, "rollback after failed restore failed");
                }
                warn!(applied, error = %err, "restore aborted");
                return Err(err);
            }
            applied += 1;
        }
        if let Err(err) = store.commit() {
            if let Err(rollback) = store.rollback() {
                warn!(error = %rollback, "rollback after failed restore commit failed");
            }
            warn!(applied, error = %err, "restore commit failed");
            return Err(err.into());
        }
        info!(transactions = applied, "restore complete");
        Ok(applied)
    }

    pub async fn list_transactions(&self) -> MistResult<BTreeMap<Version, TransactionSummary>> {
        let store = self.store.acquire().await?;
        HistoryReader::new(&*store).list_transactions()
    }

    pub async fn heads(&self) -> MistResult<Vec<TransactionSummary>> {
        let store = self.store.acquire().await?;
        HistoryReader::new(&*store).heads()
    }

    pub async fn get_transaction(
        &self,
        reference: impl Into<TransactionRef>,
    ) -> MistResult<Transaction> {
        let reference = reference.into();
        let store = self.store.acquire().await?;
        HistoryReader::new(&*store).get_transaction(&reference)
    }

    /// The latest state of a live object, ready to be passed to
    /// [`TransactionBuilder::modify_object`].
    pub async fn get_object(&self, id: GlobalId) -> MistResult<Object> {
        let store = self.store.acquire().await?;
        let row = store
            .latest_objects(&[id])?
            .into_iter()
            .next()
            .filter(|row| row.status.is_live())
            .ok_or_else(|| MistError::NotFound(format!("object {id}")))?;

        let parent = match row.parent {
            Some(local) => Some(
                store
                    .latest_objects_by_local(&[local])?
                    .into_iter()
                    .next()
                    .map(|parent| parent.global_id)
                    .ok_or_else(|| MistError::NotFound(format!("parent {local} of {id}")))?,
            ),
            None => None,
        };
        let mut attributes = Attributes::new();
        for attr in store.attributes_at(row.version)? {
            if attr.object == row.local_id {
                attributes.insert(attr.name, decode_attribute(&attr.value, attr.is_json)?);
            }
        }
        Ok(Object::new(
            id,
            ObjectRecord {
                parent,
                path_elem: row.path_elem,
                content: row.content,
                content_type: row.content_type,
                attributes,
            },
        ))
    }

    /// The bytes of a stored content blob.
    pub async fn get_content(&self, hash: Digest) -> MistResult<Vec<u8>> {
        let store = self.store.acquire().await?;
        store
            .content_by_hash(&[hash])?
            .into_iter()
            .next()
            .map(|row| row.blob)
            .ok_or_else(|| MistError::NotFound(format!("content {hash}")))
    }

    /// Recompute every transaction's hash and check its parent links. With
    /// a key, signatures are checked too; unsigned transactions then fail.
    pub async fn verify(&self, key: Option<&VerifyingKey>) -> MistResult<VerificationReport> {
        let store = self.store.acquire().await?;
        let reader = HistoryReader::new(&*store);
        let mut report = VerificationReport::default();

        for row in store.transactions()? {
            report.checked += 1;
            let version = row.version;
            let expected = row.hash;
            let mut fail = |reason: String| {
                warn!(%version, %reason, "verification failure");
                report.failures.push(VerificationFailure { version, reason });
            };

            let txn = match reader.load(row) {
                Ok(txn) => txn,
                Err(err) => {
                    fail(err.to_string());
                    continue;
                }
            };
            match txn.compute_hash() {
                Ok(hash) if hash == expected => {}
                Ok(hash) => fail(format!("recorded hash {expected}, recomputed {hash}")),
                Err(err) => fail(MistError::from(err).to_string()),
            }
            if let Some(parents) = &txn.parents {
                if let Some(late) = parents.values().find(|p| **p >= version) {
                    fail(format!("parent version {late} is not older"));
                }
            }
            if let Some(key) = key {
                match txn.verify_signature(key) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => fail(format!("signature: {err}")),
                    Err(err) => fail(MistError::from(err).to_string()),
                }
            }
        }
        info!(
            checked = report.checked,
            failures = report.failures.len(),
            "verification finished"
        );
        Ok(report)
    }

    fn engine<'a>(&'a self, store: &'a mut S) -> CommitEngine<'a, S> {
        CommitEngine::new(store, self.config.ancestor_batch_size).with_signer(self.signer.as_ref())
    }

    fn stamp_user(&self, mut txn: Transaction) -> Transaction {
        if txn.user.is_none() {
            txn.user = self.config.user.clone();
        }
        txn
    }
}
