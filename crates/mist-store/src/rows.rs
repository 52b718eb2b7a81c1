use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mist_types::{Digest, GlobalId, LocalId, ObjectStatus, Version};

/// Store-local content blob identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

/// One version of one object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectRow {
    pub global_id: GlobalId,
    pub local_id: LocalId,
    pub version: Version,
    pub status: ObjectStatus,
    /// Local id of the parent object; `None` for root-level objects.
    pub parent: Option<LocalId>,
    pub path_elem: String,
    pub content: Option<Digest>,
    pub content_type: Option<String>,
}

/// Scalar storage cell for attribute values.
///
/// Arrays and maps are flattened to their canonical JSON text and stored as
/// [`Cell::Text`] with the row's `is_json` flag set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// One attribute of one object version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeRow {
    pub object: LocalId,
    pub version: Version,
    pub name: String,
    pub value: Cell,
    pub is_json: bool,
}

/// A content-addressed blob. Stored once per distinct hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRow {
    pub id: ContentId,
    pub hash: Digest,
    pub blob: Vec<u8>,
}

/// A committed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub user: Option<String>,
    pub hash: Digest,
    pub signature: Option<String>,
}

/// DAG edge from a transaction to one of its parents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentEdge {
    pub version: Version,
    pub parent_version: Version,
}

/// Attribution of a content blob to a transaction that staged it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentLink {
    pub version: Version,
    pub content_id: ContentId,
}
