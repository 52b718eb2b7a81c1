use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SubsecRound, Utc};

use mist_crypto::{SignatureError, SigningKey, VerifyingKey};
use mist_types::{Digest, GlobalId, Version};

use crate::body::{body_json, digest_body, format_timestamp};
use crate::error::{TxnError, TxnResult};
use crate::object::ObjectRecord;

/// An atomic, hashed, DAG-linked changeset.
///
/// A transaction is staged without `version`, `timestamp`, `parents` or
/// `hash`; the commit engine seals it by assigning them. Read-back
/// transactions arrive fully populated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
    pub version: Option<Version>,
    pub timestamp: Option<DateTime<Utc>>,
    pub user: Option<String>,
    pub hash: Option<Digest>,
    pub signature: Option<String>,
    /// Parent transaction hashes mapped to their local versions.
    pub parents: Option<BTreeMap<Digest, Version>>,
    pub objects: BTreeMap<GlobalId, ObjectRecord>,
    pub deleted_objects: BTreeSet<GlobalId>,
    /// New content blobs keyed by their hash.
    pub content: BTreeMap<Digest, Vec<u8>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.deleted_objects.is_empty() && self.content.is_empty()
    }

    /// Returns `true` if `id` is created, modified or deleted here.
    pub fn touches(&self, id: &GlobalId) -> bool {
        self.objects.contains_key(id) || self.deleted_objects.contains(id)
    }

    /// Assign the fields the digest depends on. The timestamp is truncated to
    /// whole seconds, the precision the wire format carries.
    pub fn seal(&mut self, parents: BTreeMap<Digest, Version>, timestamp: DateTime<Utc>) {
        self.parents = Some(parents);
        self.timestamp = Some(timestamp.trunc_subsecs(0));
    }

    /// The canonical JSON body the digest is taken over.
    pub fn body(&self) -> TxnResult<serde_json::Value> {
        let timestamp = self.timestamp.ok_or(TxnError::Unsealed("timestamp"))?;
        body_json(
            self.user.as_deref(),
            &format_timestamp(&timestamp),
            &self.objects,
            &self.deleted_objects,
            self.content.keys(),
        )
    }

    /// Compute the transaction digest: the canonical body with the sorted
    /// parent hashes folded in. Fails until the transaction is sealed.
    pub fn compute_hash(&self) -> TxnResult<Digest> {
        let parents = self.parents.as_ref().ok_or(TxnError::Unsealed("parents"))?;
        Ok(digest_body(&self.body()?, parents.keys()))
    }

    /// Returns `true` if the stored hash equals the recomputed one.
    pub fn verify_hash(&self) -> TxnResult<bool> {
        Ok(self.hash == Some(self.compute_hash()?))
    }

    /// Sign the transaction digest. Computes and stores the hash first.
    pub fn sign(&mut self, key: &SigningKey) -> TxnResult<()> {
        let hash = self.compute_hash()?;
        self.hash = Some(hash);
        self.signature = Some(key.sign_digest(&hash));
        Ok(())
    }

    /// Verify the signature over the recomputed digest.
    pub fn verify_signature(&self, key: &VerifyingKey) -> TxnResult<Result<(), SignatureError>> {
        let hash = self.compute_hash()?;
        Ok(match &self.signature {
            Some(signature) => key.verify_digest(&hash, signature),
            None => Err(SignatureError::InvalidSignature),
        })
    }
}
