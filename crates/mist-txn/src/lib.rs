//! Transactions for mistDb.
//!
//! A [`Transaction`] is the unit of atomic commit: new and changed objects,
//! deleted objects and new content blobs, plus the metadata (timestamp,
//! user, parent hashes) that make it a node in the history DAG.
//!
//! - [`TransactionBuilder`] -- client-side staging with no I/O
//! - [`Transaction::compute_hash`] -- SHA3-224 over the canonical body with
//!   the sorted parent hashes folded in
//! - [`TransactionDocument`] -- the canonical JSON form exchanged between
//!   peers and written to backups

pub mod body;
pub mod builder;
pub mod document;
pub mod error;
pub mod object;
pub mod transaction;

pub use builder::{ObjectPatch, TransactionBuilder};
pub use document::{DocumentBody, TransactionDocument};
pub use error::{TxnError, TxnResult};
pub use object::{Object, ObjectRecord};
pub use transaction::Transaction;
