use crate::fingerprint::Fingerprint;
use crate::timestamp::Timestamp;

/// Capability of every content entity: a provable creation.
///
/// The Provable set (`creation`, `proof_of_work`, `signature`) is covered by
/// the external verification gate. This trait only exposes the fields so the
/// fetch client and merge store can reason about identity and age without
/// knowing the concrete variant.
pub trait Provable {
    fn fingerprint(&self) -> &Fingerprint;
    fn creation(&self) -> Timestamp;
    fn proof_of_work(&self) -> &str;
    fn signature(&self) -> &str;
}

/// Capability of mutable entities: a provable update set.
///
/// Board, Vote, Key and Truststate are updateable; Thread and Post are
/// permanently immutable and deliberately do not implement this.
pub trait Updateable: Provable {
    fn last_update(&self) -> Timestamp;
    fn update_proof_of_work(&self) -> &str;
    fn update_signature(&self) -> &str;

    /// Last-writer-wins admission rule against a stored counterpart.
    ///
    /// A candidate update is honored only if its `last_update` is strictly
    /// greater than both the stored `last_update` and the stored `creation`.
    fn supersedes(&self, stored_creation: Timestamp, stored_last_update: Timestamp) -> bool {
        self.last_update() > stored_last_update && self.last_update() > stored_creation
    }
}

macro_rules! impl_provable {
    ($ty:ty) => {
        impl Provable for $ty {
            fn fingerprint(&self) -> &Fingerprint {
                &self.fingerprint
            }
            fn creation(&self) -> Timestamp {
                self.creation
            }
            fn proof_of_work(&self) -> &str {
                &self.proof_of_work
            }
            fn signature(&self) -> &str {
                &self.signature
            }
        }
    };
}

macro_rules! impl_updateable {
    ($ty:ty) => {
        impl Updateable for $ty {
            fn last_update(&self) -> Timestamp {
                self.last_update
            }
            fn update_proof_of_work(&self) -> &str {
                &self.update_proof_of_work
            }
            fn update_signature(&self) -> &str {
                &self.update_signature
            }
        }
    };
}

pub(crate) use impl_provable;
pub(crate) use impl_updateable;
