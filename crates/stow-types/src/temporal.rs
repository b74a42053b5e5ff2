use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Logical timestamp for local causal ordering.
///
/// The value is a tick count in microseconds since the UNIX epoch, advanced
/// past wall-clock time whenever the clock is asked for more than one value per
/// microsecond. The zero value means "unset".
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The unset timestamp.
    pub const UNSET: Self = Self(0);

    /// Create a timestamp from a raw tick count.
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Current wall-clock time as a timestamp.
    pub fn wall_clock() -> Self {
        Self(wall_clock_ticks())
    }

    /// Raw tick count.
    pub const fn ticks(&self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the unset default.
    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

/// Microseconds since the UNIX epoch, or zero if the system clock is before it.
pub fn wall_clock_ticks() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
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

impl From<u64> for Timestamp {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unset() {
        assert!(Timestamp::default().is_unset());
        assert_eq!(Timestamp::default(), Timestamp::UNSET);
    }

    #[test]
    fn wall_clock_is_reasonable() {
        let ts = Timestamp::wall_clock();
        // After 2020-01-01 in microseconds.
        assert!(ts.ticks() > 1_577_836_800_000_000);
        assert!(!ts.is_unset());
    }

    #[test]
    fn ordering_follows_ticks() {
        assert!(Timestamp::from_ticks(1) < Timestamp::from_ticks(2));
        assert!(Timestamp::UNSET < Timestamp::from_ticks(1));
    }

    #[test]
    fn serde_roundtrip() {
        let ts = Timestamp::from_ticks(1234567890);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "1234567890");
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", Timestamp::from_ticks(42)), "42");
        assert_eq!(format!("{:?}", Timestamp::from_ticks(42)), "Timestamp(42)");
    }
}
