use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unix-seconds wall-clock timestamp.
///
/// All protocol timestamps (creation, last update, cache ranges, local
/// arrival) are seconds since the Unix epoch. A zero timestamp means
/// "absent": mutable entities that have never been updated carry a zero
/// `last_update`, and a zero `last_checkin` requests a full bootstrap walk.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from raw Unix seconds.
    pub const fn new(secs: i64) -> Self {
        Self(secs)
    }

    /// The zero ("absent") timestamp.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self(secs)
    }

    /// Raw Unix seconds.
    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// Returns `true` for the zero/absent timestamp.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// This timestamp moved back by `secs` seconds, saturating at zero.
    pub fn rewind(&self, secs: i64) -> Self {
        Self(self.0.saturating_sub(secs).max(0))
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_seconds() {
        assert!(Timestamp::new(100) < Timestamp::new(200));
        assert!(Timestamp::zero() < Timestamp::new(1));
    }

    #[test]
    fn now_is_after_2020() {
        assert!(Timestamp::now() > Timestamp::new(1_577_836_800));
    }

    #[test]
    fn zero_is_absent() {
        assert!(Timestamp::zero().is_zero());
        assert!(!Timestamp::new(1).is_zero());
    }

    #[test]
    fn rewind_saturates_at_zero() {
        assert_eq!(Timestamp::new(100).rewind(30), Timestamp::new(70));
        assert_eq!(Timestamp::new(10).rewind(30), Timestamp::zero());
    }

    #[test]
    fn serde_is_transparent() {
        let ts = Timestamp::new(1234567890);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "1234567890");
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ts);
    }
}
