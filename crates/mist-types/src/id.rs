use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Globally stable identity of an object.
///
/// A `GlobalId` is 128 bits of randomness assigned once, when the object is
/// created, and never reused or reassigned. It is the identifier replicas
/// exchange; the compact [`LocalId`] never leaves a store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId([u8; 16]);

impl GlobalId {
    /// Generate a fresh random identity.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Wrap raw identity bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hex-encoded string (32 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 16,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl_hex_serde!(GlobalId);

impl fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalId({})", self.short_hex())
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Store-local compact object identifier used as the join key between the
/// object and attribute tables. All rows of one object share one `LocalId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub u64);

impl LocalId {
    /// The first id handed out by an empty store.
    pub const FIRST: Self = Self(1);

    /// The id following this one in the allocation sequence.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Store-local transaction number.
///
/// Versions grow monotonically along the even path: the first commit gets
/// [`Version::FIRST`] and each later commit the current maximum plus
/// [`Version::STEP`]. Odd numbers are reserved and never allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    pub const FIRST: Self = Self(2);
    pub const STEP: u64 = 2;

    /// Allocate the version following `current`, or the first version for an
    /// empty history.
    pub fn after(current: Option<Version>) -> Self {
        match current {
            None => Self::FIRST,
            Some(v) => Self(v.0 + Self::STEP),
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
