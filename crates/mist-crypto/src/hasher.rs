use sha3::{Digest as _, Sha3_224};

use mist_types::Digest;

/// SHA3-224 hasher for content blobs.
///
/// Identical bytes always produce the same [`Digest`], so a blob staged by
/// several objects or transactions is stored once.
pub struct ContentHasher;

impl ContentHasher {
    /// Hash raw bytes.
    pub fn hash(data: &[u8]) -> Digest {
        Digest::from_bytes(Sha3_224::digest(data).into())
    }

    /// Verify that data produces the expected digest.
    pub fn verify(data: &[u8], expected: &Digest) -> bool {
        Self::hash(data) == *expected
    }
}

/// Incremental transaction digest.
///
/// The canonical transaction body is absorbed first, then the hex form of
/// every parent hash in ascending order. Sorting makes the digest
/// independent of the order parents were discovered in, while folding them
/// in keeps identical bodies committed on different parent sets apart.
pub struct TransactionHasher {
    inner: Sha3_224,
}

impl TransactionHasher {
    /// Start a digest over a canonical transaction body.
    pub fn new(canonical_body: &str) -> Self {
        let mut inner = Sha3_224::new();
        inner.update(canonical_body.as_bytes());
        Self { inner }
    }

    /// Fold the parent hashes into the digest.
    pub fn fold_parents<'a, I>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = &'a Digest>,
    {
        let mut sorted: Vec<&Digest> = parents.into_iter().collect();
        sorted.sort();
        for parent in sorted {
            self.inner.update(parent.to_hex().as_bytes());
        }
        self
    }

    pub fn finalize(self) -> Digest {
        Digest::from_bytes(self.inner.finalize().into())
    }
}
