use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use mist_store::{TableStore, TransactionRow};
use mist_txn::{ObjectRecord, Transaction};
use mist_types::{Attributes, Digest, GlobalId, LocalId, Version};

use crate::codec::decode_attribute;
use crate::error::{MistError, MistResult};

/// Transaction metadata without its object payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub user: Option<String>,
    pub hash: Digest,
    pub signature: Option<String>,
    pub parents: BTreeMap<Digest, Version>,
}

/// Names a committed transaction by local version or by hash prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionRef {
    Version(Version),
    Hash(String),
}

impl From<Version> for TransactionRef {
    fn from(version: Version) -> Self {
        Self::Version(version)
    }
}

impl From<Digest> for TransactionRef {
    fn from(hash: Digest) -> Self {
        Self::Hash(hash.to_hex())
    }
}

impl FromStr for TransactionRef {
    type Err = MistError;

    /// Decimal strings shorter than a full hash are versions; anything else
    /// is a hash prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MistError::NotFound("empty transaction reference".into()));
        }
        if s.len() < Digest::LEN * 2 && s.bytes().all(|b| b.is_ascii_digit()) {
            let version = s
                .parse::<u64>()
                .map_err(|e| MistError::NotFound(format!("version {s}: {e}")))?;
            return Ok(Self::Version(Version(version)));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MistError::NotFound(format!("{s} is not a version or hash")));
        }
        Ok(Self::Hash(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => write!(f, "version {v}"),
            Self::Hash(prefix) => write!(f, "hash {prefix}"),
        }
    }
}

/// Reads committed history back out of a store.
pub struct HistoryReader<'a, S: TableStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TableStore + ?Sized> HistoryReader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Every committed transaction keyed by local version.
    pub fn list_transactions(&self) -> MistResult<BTreeMap<Version, TransactionSummary>> {
        self.store
            .transactions()?
            .into_iter()
            .map(|row| Ok((row.version, self.summary(row)?)))
            .collect()
    }

    pub fn heads(&self) -> MistResult<Vec<TransactionSummary>> {
        self.store
            .heads()?
            .into_iter()
            .map(|row| self.summary(row))
            .collect()
    }

    pub fn resolve(&self, reference: &TransactionRef) -> MistResult<TransactionRow> {
        match reference {
            TransactionRef::Version(version) => self
                .store
                .transaction(*version)?
                .ok_or_else(|| MistError::NotFound(format!("transaction {reference}"))),
            TransactionRef::Hash(prefix) => {
                let mut rows = self.store.transactions_by_hash_prefix(prefix)?;
                match rows.len() {
                    1 => Ok(rows.remove(0)),
                    0 => Err(MistError::NotFound(format!("transaction {reference}"))),
                    n => Err(MistError::NotFound(format!(
                        "{reference} is ambiguous: {n} transactions match"
                    ))),
                }
            }
        }
    }

    /// Reconstruct a committed transaction and check it still hashes to its
    /// recorded digest.
    pub fn get_transaction(&self, reference: &TransactionRef) -> MistResult<Transaction> {
        let row = self.resolve(reference)?;
        let expected = row.hash;
        let txn = self.load(row)?;
        let computed = txn.compute_hash()?;
        if computed != expected {
            return Err(MistError::HashMismatch(format!(
                "transaction {expected} recomputes to {computed}"
            )));
        }
        Ok(txn)
    }

    /// Reconstruct a transaction from its rows without checking its hash.
    pub fn load(&self, row: TransactionRow) -> MistResult<Transaction> {
        let version = row.version;
        let objects = self.store.object_rows_at(version)?;

        let mut globals: HashMap<LocalId, GlobalId> =
            objects.iter().map(|o| (o.local_id, o.global_id)).collect();
        let unresolved: Vec<LocalId> = objects
            .iter()
            .filter_map(|o| o.parent)
            .filter(|local| !globals.contains_key(local))
            .collect();
        if !unresolved.is_empty() {
            for parent in self.store.latest_objects_by_local(&unresolved)? {
                globals.insert(parent.local_id, parent.global_id);
            }
        }

        let mut attributes: HashMap<LocalId, Attributes> = HashMap::new();
        for attr in self.store.attributes_at(version)? {
            let value = decode_attribute(&attr.value, attr.is_json)?;
            attributes.entry(attr.object).or_default().insert(attr.name, value);
        }

        let mut txn = Transaction {
            version: Some(version),
            timestamp: Some(row.timestamp),
            user: row.user,
            hash: Some(row.hash),
            signature: row.signature,
            parents: Some(self.parents_of(version)?),
            ..Default::default()
        };

        for object in objects {
            if object.status.is_deletion() {
                txn.deleted_objects.insert(object.global_id);
                continue;
            }
            let parent = match object.parent {
                Some(local) => Some(*globals.get(&local).ok_or_else(|| {
                    MistError::NotFound(format!(
                        "parent {local} of object {}",
                        object.global_id
                    ))
                })?),
                None => None,
            };
            txn.objects.insert(
                object.global_id,
                ObjectRecord {
                    parent,
                    path_elem: object.path_elem,
                    content: object.content,
                    content_type: object.content_type,
                    attributes: attributes.remove(&object.local_id).unwrap_or_default(),
                },
            );
        }

        txn.content = self
            .store
            .content_at(version)?
            .into_iter()
            .map(|content| (content.hash, content.blob))
            .collect();
        Ok(txn)
    }

    fn summary(&self, row: TransactionRow) -> MistResult<TransactionSummary> {
        Ok(TransactionSummary {
            parents: self.parents_of(row.version)?,
            version: row.version,
            timestamp: row.timestamp,
            user: row.user,
            hash: row.hash,
            signature: row.signature,
        })
    }

    fn parents_of(&self, version: Version) -> MistResult<BTreeMap<Digest, Version>> {
        let mut parents = BTreeMap::new();
        for parent in self.store.parent_versions(version)? {
            let row = self.store.transaction(parent)?.ok_or_else(|| {
                MistError::NotFound(format!("parent version {parent} of {version}"))
            })?;
            parents.insert(row.hash, parent);
        }
        Ok(parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_decimal_is_a_version() {
        assert_eq!(
            "42".parse::<TransactionRef>().unwrap(),
            TransactionRef::Version(Version(42))
        );
    }

    #[test]
    fn hex_is_a_lowercased_prefix() {
        assert_eq!(
            "AB12".parse::<TransactionRef>().unwrap(),
            TransactionRef::Hash("ab12".into())
        );
    }

    #[test]
    fn full_length_digits_are_a_hash() {
        let all_digits = "1".repeat(Digest::LEN * 2);
        assert!(matches!(
            all_digits.parse::<TransactionRef>().unwrap(),
            TransactionRef::Hash(_)
        ));
    }

    #[test]
    fn garbage_reference_is_not_found() {
        let err = "head~1".parse::<TransactionRef>().unwrap_err();
        assert_eq!(err.code(), MistError::NOT_FOUND);
    }
}
