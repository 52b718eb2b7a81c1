//! The hashed projection of a transaction.
//!
//! The digest covers the user, the timestamp, every object record, the
//! deleted-object set and the *hashes* of new content blobs, never the blob
//! bytes themselves (those are content-addressed on their own) and never
//! store-local numbers such as versions. Parent hashes are folded in after
//! the body; see [`TransactionHasher`].

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map};

use mist_crypto::{canonical_json, TransactionHasher};
use mist_types::{Digest, GlobalId};

use crate::error::{TxnError, TxnResult};
use crate::object::ObjectRecord;

/// Wire/body format version, carried as `"version"` in every document.
pub const FORMAT_VERSION: u32 = 1;

/// ISO-8601 UTC timestamp without fractional seconds.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(s: &str) -> TxnResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| TxnError::InvalidTimestamp(format!("{s}: {e}")))
}

/// Build the JSON value the transaction digest is taken over.
pub fn body_json<'a>(
    user: Option<&str>,
    timestamp: &str,
    objects: &BTreeMap<GlobalId, ObjectRecord>,
    deleted: impl IntoIterator<Item = &'a GlobalId>,
    content: impl IntoIterator<Item = &'a Digest>,
) -> TxnResult<serde_json::Value> {
    let objects =
        serde_json::to_value(objects).map_err(|e| TxnError::Serialization(e.to_string()))?;
    let deleted: Map<String, serde_json::Value> =
        deleted.into_iter().map(|id| (id.to_hex(), json!(1))).collect();
    let content: Map<String, serde_json::Value> =
        content.into_iter().map(|h| (h.to_hex(), json!(1))).collect();
    Ok(json!({
        "user": user,
        "timestamp": timestamp,
        "objects": objects,
        "deletedObjects": deleted,
        "content": content,
        "version": FORMAT_VERSION,
    }))
}

/// Digest a body and fold in the parent hashes.
pub fn digest_body<'a>(
    body: &serde_json::Value,
    parents: impl IntoIterator<Item = &'a Digest>,
) -> Digest {
    TransactionHasher::new(&canonical_json(body))
        .fold_parents(parents)
        .finalize()
}
