//! Content entity schemas.
//!
//! Six entity types travel the network: Board, Thread, Post, Vote, Key and
//! Truststate. Every one carries the Provable set (`creation`,
//! `proof_of_work`, `signature`); the mutable four (Board, Vote, Key,
//! Truststate) additionally carry the Updateable set. `local_arrival` is
//! node-local bookkeeping and is never serialized onto the wire.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::timestamp::Timestamp;
use crate::traits::{impl_provable, impl_updateable, Provable, Updateable};

// ---------------------------------------------------------------------------
// Sub-entities
// ---------------------------------------------------------------------------

/// A moderator entry nested inside a [`Board`].
///
/// Keyed by (board fingerprint, key fingerprint); the board fingerprint is
/// implicit from the parent. Reconciled as a set on every board merge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardOwner {
    pub key_fingerprint: Fingerprint,
    pub expiry: Timestamp,
    pub level: u8,
}

/// A payment address nested inside a [`Key`].
///
/// Keyed by (owner key fingerprint, address); the key fingerprint is
/// implicit from the parent. Reconciled as a set on every key merge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyAddress {
    pub currency_code: String,
    pub address: String,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A discussion board. Mutable; owns a reconciled set of [`BoardOwner`]s.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Board {
    pub fingerprint: Fingerprint,
    pub name: String,
    /// Key fingerprint of the board's creator.
    pub owner: Fingerprint,
    pub board_owners: Vec<BoardOwner>,
    pub description: String,
    pub creation: Timestamp,
    pub proof_of_work: String,
    pub signature: String,
    pub last_update: Timestamp,
    pub update_proof_of_work: String,
    pub update_signature: String,
    #[serde(skip)]
    pub local_arrival: Timestamp,
}

/// A thread within a board. Immutable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thread {
    pub fingerprint: Fingerprint,
    pub board: Fingerprint,
    pub name: String,
    pub body: String,
    pub link: String,
    pub owner: Fingerprint,
    pub creation: Timestamp,
    pub proof_of_work: String,
    pub signature: String,
    #[serde(skip)]
    pub local_arrival: Timestamp,
}

/// A post within a thread. Immutable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    pub fingerprint: Fingerprint,
    pub board: Fingerprint,
    pub thread: Fingerprint,
    /// Parent post, or the thread fingerprint for top-level posts.
    pub parent: Fingerprint,
    pub body: String,
    pub owner: Fingerprint,
    pub creation: Timestamp,
    pub proof_of_work: String,
    pub signature: String,
    #[serde(skip)]
    pub local_arrival: Timestamp,
}

/// A vote on a target entity. Mutable (the vote type can change).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vote {
    pub fingerprint: Fingerprint,
    pub board: Fingerprint,
    pub thread: Fingerprint,
    pub target: Fingerprint,
    pub owner: Fingerprint,
    #[serde(rename = "type")]
    pub vote_type: i32,
    pub creation: Timestamp,
    pub proof_of_work: String,
    pub signature: String,
    pub last_update: Timestamp,
    pub update_proof_of_work: String,
    pub update_signature: String,
    #[serde(skip)]
    pub local_arrival: Timestamp,
}

/// A user identity key. Mutable; owns a reconciled set of
/// [`CurrencyAddress`]es.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Key {
    pub fingerprint: Fingerprint,
    #[serde(rename = "type")]
    pub key_type: String,
    /// The public key material itself.
    pub key: String,
    pub name: String,
    pub info: String,
    pub currency_addresses: Vec<CurrencyAddress>,
    pub creation: Timestamp,
    pub proof_of_work: String,
    pub signature: String,
    pub last_update: Timestamp,
    pub update_proof_of_work: String,
    pub update_signature: String,
    #[serde(skip)]
    pub local_arrival: Timestamp,
}

/// A trust statement about another key. Mutable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Truststate {
    pub fingerprint: Fingerprint,
    pub target: Fingerprint,
    pub owner: Fingerprint,
    #[serde(rename = "type")]
    pub trust_type: i32,
    pub expiry: Timestamp,
    pub creation: Timestamp,
    pub proof_of_work: String,
    pub signature: String,
    pub last_update: Timestamp,
    pub update_proof_of_work: String,
    pub update_signature: String,
    #[serde(skip)]
    pub local_arrival: Timestamp,
}

impl_provable!(Board);
impl_provable!(Thread);
impl_provable!(Post);
impl_provable!(Vote);
impl_provable!(Key);
impl_provable!(Truststate);

impl_updateable!(Board);
impl_updateable!(Vote);
impl_updateable!(Key);
impl_updateable!(Truststate);

// ---------------------------------------------------------------------------
// Required-content checks
// ---------------------------------------------------------------------------

impl Board {
    /// Schema-required content columns are present.
    pub fn content_present(&self) -> bool {
        !self.name.is_empty() && !self.creation.is_zero()
    }
}

impl Thread {
    pub fn content_present(&self) -> bool {
        !self.board.is_empty() && !self.name.is_empty() && !self.creation.is_zero()
    }
}

impl Post {
    pub fn content_present(&self) -> bool {
        !self.board.is_empty()
            && !self.thread.is_empty()
            && !self.body.is_empty()
            && !self.creation.is_zero()
    }
}

impl Vote {
    pub fn content_present(&self) -> bool {
        !self.board.is_empty()
            && !self.target.is_empty()
            && !self.owner.is_empty()
            && !self.creation.is_zero()
    }
}

impl Key {
    pub fn content_present(&self) -> bool {
        !self.key_type.is_empty() && !self.key.is_empty() && !self.creation.is_zero()
    }
}

impl Truststate {
    pub fn content_present(&self) -> bool {
        !self.target.is_empty() && !self.owner.is_empty() && !self.creation.is_zero()
    }
}
