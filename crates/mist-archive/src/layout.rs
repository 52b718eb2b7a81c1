//! Entry names inside a backup bundle.
//!
//! ```text
//! transaction_2.json
//! transaction_4.json
//! content/<sha3-224 hex>
//! ```

use mist_types::{Digest, Version};

const TRANSACTION_PREFIX: &str = "transaction_";
const TRANSACTION_SUFFIX: &str = ".json";
const CONTENT_DIR: &str = "content/";

pub fn transaction_entry(version: Version) -> String {
    format!("{TRANSACTION_PREFIX}{}{TRANSACTION_SUFFIX}", version.get())
}

pub fn content_entry(hash: &Digest) -> String {
    format!("{CONTENT_DIR}{}", hash.to_hex())
}

/// The version named by a transaction entry, or `None` for other entries.
pub fn parse_transaction_entry(name: &str) -> Option<Version> {
    let digits = name
        .strip_prefix(TRANSACTION_PREFIX)?
        .strip_suffix(TRANSACTION_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(Version)
}
