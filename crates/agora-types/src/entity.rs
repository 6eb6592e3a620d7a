//! The closed entity set as a tagged union.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::content::{Board, Key, Post, Thread, Truststate, Vote};
use crate::error::TypeError;
use crate::fingerprint::Fingerprint;
use crate::timestamp::Timestamp;
use crate::traits::{Provable, Updateable};

/// One of the seven entity kinds, matching the seven replication endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Board,
    Thread,
    Post,
    Vote,
    Key,
    Truststate,
    Address,
}

impl EntityKind {
    /// Every kind, in endpoint-walk order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Board,
        EntityKind::Thread,
        EntityKind::Post,
        EntityKind::Vote,
        EntityKind::Key,
        EntityKind::Truststate,
        EntityKind::Address,
    ];

    /// The URL path segment of this kind's endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EntityKind::Board => "boards",
            EntityKind::Thread => "threads",
            EntityKind::Post => "posts",
            EntityKind::Vote => "votes",
            EntityKind::Key => "keys",
            EntityKind::Truststate => "truststates",
            EntityKind::Address => "addresses",
        }
    }

    /// Parse an endpoint path segment back into a kind.
    pub fn from_endpoint(s: &str) -> Result<Self, TypeError> {
        match s {
            "boards" => Ok(EntityKind::Board),
            "threads" => Ok(EntityKind::Thread),
            "posts" => Ok(EntityKind::Post),
            "votes" => Ok(EntityKind::Vote),
            "keys" => Ok(EntityKind::Key),
            "truststates" => Ok(EntityKind::Truststate),
            "addresses" => Ok(EntityKind::Address),
            other => Err(TypeError::UnknownEndpoint(other.to_string())),
        }
    }

    /// Whether entities of this kind carry the Updateable set.
    pub fn is_updateable(&self) -> bool {
        matches!(
            self,
            EntityKind::Board | EntityKind::Vote | EntityKind::Key | EntityKind::Truststate
        )
    }

    /// Whether entities of this kind expand into parent + sub-entity rows.
    pub fn has_subentities(&self) -> bool {
        matches!(self, EntityKind::Board | EntityKind::Key)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

/// A single network entity of any kind.
///
/// The entity set is closed; everything downstream matches exhaustively so
/// that adding a kind is a compile error until every component handles it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum Entity {
    Board(Board),
    Thread(Thread),
    Post(Post),
    Vote(Vote),
    Key(Key),
    Truststate(Truststate),
    Address(Address),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Board(_) => EntityKind::Board,
            Entity::Thread(_) => EntityKind::Thread,
            Entity::Post(_) => EntityKind::Post,
            Entity::Vote(_) => EntityKind::Vote,
            Entity::Key(_) => EntityKind::Key,
            Entity::Truststate(_) => EntityKind::Truststate,
            Entity::Address(_) => EntityKind::Address,
        }
    }

    /// The entity's fingerprint; `None` for addresses, which have none.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.provable().map(|p| p.fingerprint())
    }

    /// Provable view, when the variant is content.
    pub fn provable(&self) -> Option<&dyn Provable> {
        match self {
            Entity::Board(e) => Some(e),
            Entity::Thread(e) => Some(e),
            Entity::Post(e) => Some(e),
            Entity::Vote(e) => Some(e),
            Entity::Key(e) => Some(e),
            Entity::Truststate(e) => Some(e),
            Entity::Address(_) => None,
        }
    }

    /// Updateable view, when the variant is mutable content.
    pub fn updateable(&self) -> Option<&dyn Updateable> {
        match self {
            Entity::Board(e) => Some(e),
            Entity::Vote(e) => Some(e),
            Entity::Key(e) => Some(e),
            Entity::Truststate(e) => Some(e),
            Entity::Thread(_) | Entity::Post(_) | Entity::Address(_) => None,
        }
    }

    /// Identity columns are present (fingerprint; addresses: location+port).
    pub fn identity_present(&self) -> bool {
        match self {
            Entity::Address(a) => a.identity_present(),
            other => other
                .fingerprint()
                .map(|fp| !fp.is_empty())
                .unwrap_or(false),
        }
    }

    /// Schema-required content columns are present.
    pub fn content_present(&self) -> bool {
        match self {
            Entity::Board(e) => e.content_present(),
            Entity::Thread(e) => e.content_present(),
            Entity::Post(e) => e.content_present(),
            Entity::Vote(e) => e.content_present(),
            Entity::Key(e) => e.content_present(),
            Entity::Truststate(e) => e.content_present(),
            // Addresses have no required content beyond identity.
            Entity::Address(_) => true,
        }
    }

    /// Stamp the node-local arrival time. Called once when a remote entity
    /// is first committed; never transmitted.
    pub fn set_local_arrival(&mut self, at: Timestamp) {
        match self {
            Entity::Board(e) => e.local_arrival = at,
            Entity::Thread(e) => e.local_arrival = at,
            Entity::Post(e) => e.local_arrival = at,
            Entity::Vote(e) => e.local_arrival = at,
            Entity::Key(e) => e.local_arrival = at,
            Entity::Truststate(e) => e.local_arrival = at,
            Entity::Address(e) => e.local_arrival = at,
        }
    }
}
