use mist_crypto::ContentHasher;
use mist_types::{Attributes, Digest, GlobalId};
use tracing::debug;

use crate::error::{TxnError, TxnResult};
use crate::object::{Object, ObjectRecord};
use crate::transaction::Transaction;

/// Field overrides for [`TransactionBuilder::modify_object`].
///
/// `None` keeps the object's current value. `parent: Some(None)` moves the
/// object to the root; `content: Some(None)` clears its content.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectPatch {
    pub parent: Option<Option<GlobalId>>,
    pub path_elem: Option<String>,
    pub content: Option<Option<Digest>>,
    pub content_type: Option<Option<String>>,
    pub attributes: Option<Attributes>,
}

impl ObjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: Option<GlobalId>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn path_elem(mut self, path_elem: impl Into<String>) -> Self {
        self.path_elem = Some(path_elem.into());
        self
    }

    pub fn content(mut self, content: Option<Digest>, content_type: Option<String>) -> Self {
        self.content = Some(content);
        self.content_type = Some(content_type);
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// Client-side staging area for one transaction.
///
/// Staging is pure data manipulation: nothing here touches a store, and a
/// builder that is dropped without being submitted has no effect. Each
/// object may be staged at most once per transaction.
#[derive(Clone, Debug, Default)]
pub struct TransactionBuilder {
    txn: Transaction,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute the transaction to a user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.txn.user = Some(user.into());
        self
    }

    /// Stage a new object under `parent` (`None` for the root).
    pub fn new_object(
        &mut self,
        parent: Option<GlobalId>,
        path_elem: impl Into<String>,
        content: Option<Digest>,
        content_type: Option<String>,
        attributes: Attributes,
    ) -> TxnResult<Object> {
        let id = GlobalId::random();
        if self.txn.touches(&id) {
            return Err(TxnError::Duplicate(id));
        }
        if parent == Some(id) {
            return Err(TxnError::InvalidParent(id));
        }
        let record = ObjectRecord {
            parent,
            path_elem: path_elem.into(),
            content,
            content_type,
            attributes,
        };
        debug!(object = %id.short_hex(), path = %record.path_elem, "staged new object");
        self.txn.objects.insert(id, record.clone());
        Ok(Object::new(id, record))
    }

    /// Stage a change to an existing object. Unset patch fields keep the
    /// values from `obj`.
    pub fn modify_object(&mut self, obj: &Object, patch: ObjectPatch) -> TxnResult<Object> {
        if self.txn.touches(&obj.id) {
            return Err(TxnError::Duplicate(obj.id));
        }
        let current = &obj.record;
        let record = ObjectRecord {
            parent: patch.parent.unwrap_or(current.parent),
            path_elem: patch.path_elem.unwrap_or_else(|| current.path_elem.clone()),
            content: patch.content.unwrap_or(current.content),
            content_type: patch
                .content_type
                .unwrap_or_else(|| current.content_type.clone()),
            attributes: patch
                .attributes
                .unwrap_or_else(|| current.attributes.clone()),
        };
        if record.parent == Some(obj.id) {
            return Err(TxnError::InvalidParent(obj.id));
        }
        debug!(object = %obj.id.short_hex(), "staged object change");
        self.txn.objects.insert(obj.id, record.clone());
        Ok(Object::new(obj.id, record))
    }

    /// Stage the deletion of an object.
    pub fn delete_object(&mut self, id: GlobalId) -> TxnResult<()> {
        if self.txn.touches(&id) {
            return Err(TxnError::Duplicate(id));
        }
        debug!(object = %id.short_hex(), "staged deletion");
        self.txn.deleted_objects.insert(id);
        Ok(())
    }

    /// Stage a content blob and return its hash for use as an object's
    /// `content`. Staging identical bytes twice stores them once.
    pub fn new_content(&mut self, bytes: impl Into<Vec<u8>>) -> Digest {
        let bytes = bytes.into();
        let hash = ContentHasher::hash(&bytes);
        self.txn.content.entry(hash).or_insert(bytes);
        hash
    }

    /// The transaction digest. Only available once parents and timestamp
    /// have been assigned, which normally happens at commit.
    pub fn compute_hash(&self) -> TxnResult<Digest> {
        self.txn.compute_hash()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    pub fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.txn
    }

    pub fn build(self) -> Transaction {
        self.txn
    }
}
