//! Foundation types for mistDb.
//!
//! Every other mist crate depends on `mist-types`. The types here carry no
//! storage or hashing logic of their own; they are the shared vocabulary of
//! the object hierarchy and its transaction history.
//!
//! # Key Types
//!
//! - [`GlobalId`] -- 128-bit random object identity, stable across replicas
//! - [`LocalId`] -- compact store-local stand-in for a [`GlobalId`]
//! - [`Digest`] -- 224-bit content/transaction hash
//! - [`Version`] -- store-local transaction number
//! - [`Value`] -- tagged attribute value (null, bool, number, string, array, map)
//! - [`ObjectStatus`] -- per-row supersession marker

#[macro_use]
mod hex_serde;

pub mod digest;
pub mod error;
pub mod id;
pub mod status;
pub mod value;

pub use digest::Digest;
pub use error::TypeError;
pub use id::{GlobalId, LocalId, Version};
pub use status::ObjectStatus;
pub use value::{Attributes, Value};
