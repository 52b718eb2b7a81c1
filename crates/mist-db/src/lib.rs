//! mistDb: a peer-replicated, content-addressed hierarchical object store.
//!
//! Objects form a tree through parent links and carry attributes and an
//! optional content blob. Every change is an atomic [`Transaction`] whose
//! SHA3-224 digest covers its parents' digests, so the history forms a
//! verifiable DAG that peers can exchange and merge.
//!
//! # Architecture
//!
//! - [`MistDb`] -- the public handle; every operation queues on a FIFO lock
//! - [`CommitEngine`] -- seals, validates and writes one transaction
//! - [`Validator`] -- parent existence, acyclicity and safe-delete checks
//! - [`HistoryReader`] -- `list_transactions` / `get_transaction`
//! - [`LockManager`] -- arrival-order exclusive access with deadlines
//!
//! # Versions
//!
//! Local versions start at 2 and advance by 2. They are local to a store;
//! peers identify transactions by hash.

pub mod codec;
pub mod commit;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod lock;
pub mod retry;
pub mod validation;

pub use commit::{CommitEngine, CommitMode};
pub use config::MistConfig;
pub use db::{MistDb, VerificationFailure, VerificationReport};
pub use error::{MistError, MistResult};
pub use history::{HistoryReader, TransactionRef, TransactionSummary};
pub use lock::{LockGuard, LockManager};
pub use retry::RetryPolicy;
pub use validation::{Validated, Validator};

pub use mist_crypto::{SigningKey, VerifyingKey};
pub use mist_store::{FileTableStore, InMemoryTableStore, TableStore};
pub use mist_txn::{Object, ObjectPatch, Transaction, TransactionBuilder, TransactionDocument};
