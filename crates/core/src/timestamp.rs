//! Hybrid logical timestamps
//!
//! A timestamp pairs a physical wall time (nanoseconds) with a logical
//! counter that breaks ties between events observed at the same wall time.
//! Timestamps order by wall time first, then logical.
//!
//! ## Usage
//!
//! ```
//! use strata_core::Timestamp;
//!
//! let ts = Timestamp::new(10, 10);
//! assert_eq!(ts.next(), Timestamp::new(10, 11));
//! assert!(ts < ts.next());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Hybrid logical timestamp
///
/// Field order matters: the derived `Ord` compares `wall_time` first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Physical component, nanoseconds
    pub wall_time: i64,
    /// Logical component, tie-breaker within one wall time
    pub logical: i32,
}

impl Timestamp {
    /// The zero timestamp ("unset")
    pub const ZERO: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };

    /// The maximum timestamp
    pub const MAX: Timestamp = Timestamp {
        wall_time: i64::MAX,
        logical: i32::MAX,
    };

    /// Create a timestamp
    #[inline]
    pub const fn new(wall_time: i64, logical: i32) -> Self {
        Timestamp { wall_time, logical }
    }

    /// True for the zero timestamp
    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Timestamp::ZERO
    }

    /// Next logical tick at the same wall time
    #[inline]
    pub fn next(&self) -> Timestamp {
        if self.logical == i32::MAX {
            Timestamp::new(self.wall_time.saturating_add(1), 0)
        } else {
            Timestamp::new(self.wall_time, self.logical + 1)
        }
    }

    /// The greatest timestamp strictly below this one
    pub fn prev(&self) -> Timestamp {
        if self.logical > 0 {
            Timestamp::new(self.wall_time, self.logical - 1)
        } else if self.wall_time > 0 {
            Timestamp::new(self.wall_time - 1, i32::MAX)
        } else {
            Timestamp::ZERO
        }
    }

    /// Ratchet forward to `other` if it is later; returns true if changed
    pub fn forward(&mut self, other: Timestamp) -> bool {
        if *self < other {
            *self = other;
            true
        } else {
            false
        }
    }

    /// Add a wall-time duration, leaving the logical component unchanged
    pub fn add_duration(&self, d: Duration) -> Timestamp {
        let nanos = i64::try_from(d.as_nanos()).unwrap_or(i64::MAX);
        Timestamp::new(self.wall_time.saturating_add(nanos), self.logical)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09},{}", self.wall_time / 1_000_000_000, self.wall_time % 1_000_000_000, self.logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_wall_then_logical() {
        assert!(Timestamp::new(1, 5) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 0) < Timestamp::new(2, 1));
        assert!(Timestamp::ZERO < Timestamp::new(0, 1));
    }

    #[test]
    fn test_next_and_prev() {
        let ts = Timestamp::new(10, 10);
        assert_eq!(ts.next(), Timestamp::new(10, 11));
        assert_eq!(ts.next().prev(), ts);
        assert_eq!(Timestamp::new(10, 0).prev(), Timestamp::new(9, i32::MAX));
        assert_eq!(Timestamp::ZERO.prev(), Timestamp::ZERO);
    }

    #[test]
    fn test_forward() {
        let mut ts = Timestamp::new(5, 0);
        assert!(!ts.forward(Timestamp::new(4, 9)));
        assert_eq!(ts, Timestamp::new(5, 0));
        assert!(ts.forward(Timestamp::new(5, 1)));
        assert_eq!(ts, Timestamp::new(5, 1));
    }

    #[test]
    fn test_add_duration() {
        let ts = Timestamp::new(1, 3).add_duration(Duration::from_nanos(9));
        assert_eq!(ts, Timestamp::new(10, 3));
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::new(1_500_000_000, 2).to_string(), "1.500000000,2");
    }
}
