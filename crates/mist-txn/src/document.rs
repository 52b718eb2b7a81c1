use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mist_crypto::{canonical_json, ContentHasher};
use mist_types::{Digest, GlobalId, Version};

use crate::body::{body_json, digest_body, format_timestamp, parse_timestamp, FORMAT_VERSION};
use crate::error::{TxnError, TxnResult};
use crate::object::ObjectRecord;
use crate::transaction::Transaction;

/// The canonical JSON form of a committed transaction, as exchanged between
/// peers and written to backups.
///
/// ```text
/// { "id": "<hash>",
///   "transaction": { "user", "timestamp", "parents", "objects",
///                    "deletedObjects", "content", "version": 1 },
///   "signature": "<signature-or-null>" }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionDocument {
    pub id: Digest,
    pub transaction: DocumentBody,
    pub signature: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBody {
    pub user: Option<String>,
    pub timestamp: String,
    /// Parent hashes mapped to the sender's local versions.
    pub parents: BTreeMap<Digest, Version>,
    pub objects: BTreeMap<GlobalId, ObjectRecord>,
    pub deleted_objects: BTreeMap<GlobalId, u8>,
    /// Content hashes mapped to an optional reference to the blob bytes.
    #[serde(default)]
    pub content: BTreeMap<Digest, Option<String>>,
    pub version: u32,
}

impl TransactionDocument {
    /// Encode a sealed transaction. `content_ref` names where each blob's
    /// bytes can be found (e.g. an archive entry), or `None` to omit it.
    pub fn from_transaction(
        txn: &Transaction,
        content_ref: impl Fn(&Digest) -> Option<String>,
    ) -> TxnResult<Self> {
        let timestamp = txn.timestamp.ok_or(TxnError::Unsealed("timestamp"))?;
        let parents = txn.parents.clone().ok_or(TxnError::Unsealed("parents"))?;
        let id = match txn.hash {
            Some(hash) => hash,
            None => txn.compute_hash()?,
        };
        Ok(Self {
            id,
            transaction: DocumentBody {
                user: txn.user.clone(),
                timestamp: format_timestamp(&timestamp),
                parents,
                objects: txn.objects.clone(),
                deleted_objects: txn.deleted_objects.iter().map(|id| (*id, 1)).collect(),
                content: txn.content.keys().map(|h| (*h, content_ref(h))).collect(),
                version: FORMAT_VERSION,
            },
            signature: txn.signature.clone(),
        })
    }

    /// Key-sorted, whitespace-free JSON.
    pub fn to_canonical_json(&self) -> TxnResult<String> {
        let value =
            serde_json::to_value(self).map_err(|e| TxnError::Serialization(e.to_string()))?;
        Ok(canonical_json(&value))
    }

    pub fn from_json(text: &str) -> TxnResult<Self> {
        let doc: Self =
            serde_json::from_str(text).map_err(|e| TxnError::Serialization(e.to_string()))?;
        if doc.transaction.version != FORMAT_VERSION {
            return Err(TxnError::Serialization(format!(
                "unsupported document version {}",
                doc.transaction.version
            )));
        }
        Ok(doc)
    }

    /// Recompute the digest from the document body alone.
    pub fn compute_hash(&self) -> TxnResult<Digest> {
        let body = &self.transaction;
        let json = body_json(
            body.user.as_deref(),
            &body.timestamp,
            &body.objects,
            body.deleted_objects.keys(),
            body.content.keys(),
        )?;
        Ok(digest_body(&json, body.parents.keys()))
    }

    /// Returns `true` if `id` matches the recomputed digest.
    pub fn verify_hash(&self) -> TxnResult<bool> {
        Ok(self.compute_hash()? == self.id)
    }

    /// Decode into a [`Transaction`] carrying the document's hash and parent
    /// set. `load_blob` supplies the bytes for each content hash; they are
    /// checked against the hash before being accepted. The local version is
    /// left unassigned.
    pub fn into_transaction(
        self,
        mut load_blob: impl FnMut(&Digest, Option<&str>) -> TxnResult<Vec<u8>>,
    ) -> TxnResult<Transaction> {
        let body = self.transaction;
        let timestamp = parse_timestamp(&body.timestamp)?;
        if format_timestamp(&timestamp) != body.timestamp {
            return Err(TxnError::InvalidTimestamp(format!(
                "{} is not in canonical form",
                body.timestamp
            )));
        }

        let mut content = BTreeMap::new();
        for (hash, reference) in &body.content {
            let bytes = load_blob(hash, reference.as_deref())?;
            if !ContentHasher::verify(&bytes, hash) {
                return Err(TxnError::ContentMismatch(*hash));
            }
            content.insert(*hash, bytes);
        }

        Ok(Transaction {
            version: None,
            timestamp: Some(timestamp),
            user: body.user,
            hash: Some(self.id),
            signature: self.signature,
            parents: Some(body.parents),
            objects: body.objects,
            deleted_objects: body.deleted_objects.into_keys().collect(),
            content,
        })
    }
}
