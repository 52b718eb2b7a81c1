use std::fmt;

use crate::error::TypeError;

/// A 224-bit digest identifying a content blob or a transaction.
///
/// Digests render as 56 lowercase hex characters. Ordering is byte-wise,
/// which coincides with the lexicographic order of the hex form; parent
/// hashes are folded into transaction digests in that order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; Digest::LEN]);

impl Digest {
    /// Digest length in bytes.
    pub const LEN: usize = 28;

    /// Wrap a pre-computed hash.
    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 56-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; Self::LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| TypeError::InvalidLength {
                    expected: Self::LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// Returns `true` if the hex form starts with `prefix` (case-insensitive).
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl_hex_serde!(Digest);

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
