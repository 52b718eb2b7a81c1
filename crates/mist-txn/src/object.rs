use serde::{Deserialize, Serialize};

use mist_types::{Attributes, Digest, GlobalId};

/// The state of one object as recorded by a transaction.
///
/// Serialized field names follow the wire format (`pathElem`,
/// `contentType`); a `None` parent places the object at the root.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    pub parent: Option<GlobalId>,
    pub path_elem: String,
    pub content: Option<Digest>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

/// An object as a client holds it: its identity plus its current record.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub id: GlobalId,
    pub record: ObjectRecord,
}

impl Object {
    pub fn new(id: GlobalId, record: ObjectRecord) -> Self {
        Self { id, record }
    }

    pub fn parent(&self) -> Option<GlobalId> {
        self.record.parent
    }

    pub fn path_elem(&self) -> &str {
        &self.record.path_elem
    }
}
