//! Foundation types for the Agora replication node.
//!
//! This crate provides the entity schemas, identity, and temporal types used
//! throughout the system. Every other Agora crate depends on `agora-types`.
//!
//! # Key Types
//!
//! - [`Fingerprint`] — Content-derived identity string for an entity
//! - [`Timestamp`] — Unix-seconds wall-clock timestamp
//! - [`Entity`] / [`EntityKind`] — Tagged union over the closed entity set
//! - [`Provable`] / [`Updateable`] — Capability traits over entity variants
//! - The entity schemas themselves: [`Board`], [`Thread`], [`Post`],
//!   [`Vote`], [`Key`], [`Truststate`], [`Address`]

pub mod address;
pub mod content;
pub mod entity;
pub mod error;
pub mod fingerprint;
pub mod timestamp;
pub mod traits;

pub use address::{Address, Client, Protocol, Subprotocol};
pub use content::{Board, BoardOwner, CurrencyAddress, Key, Post, Thread, Truststate, Vote};
pub use entity::{Entity, EntityKind};
pub use error::TypeError;
pub use fingerprint::Fingerprint;
pub use timestamp::Timestamp;
pub use traits::{Provable, Updateable};
