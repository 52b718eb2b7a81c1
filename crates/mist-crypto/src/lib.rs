//! Cryptographic primitives for mistDb.
//!
//! Provides the canonical (key-sorted) serialization every digest is taken
//! over, SHA3-224 content and transaction hashing, and Ed25519 signatures
//! over transaction digests.
//!
//! All crypto operations wrap established libraries.

pub mod canonical;
pub mod hasher;
pub mod signer;

pub use canonical::{canonical_json, canonicalize};
pub use hasher::{ContentHasher, TransactionHasher};
pub use signer::{SignatureError, SigningKey, VerifyingKey};
