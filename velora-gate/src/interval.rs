use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::GateError;

/// A half-open time interval `[start, end)`. Two intervals sharing only a
/// boundary instant do not overlap, so back-to-back appointments are legal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, GateError> {
        if start >= end {
            return Err(GateError::InvalidInterval);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, hour, min, 0).unwrap()
    }

    #[test]
    fn rejects_inverted_and_empty_intervals() {
        assert!(Interval::new(at(10, 0), at(9, 0)).is_err());
        assert!(Interval::new(at(10, 0), at(10, 0)).is_err());
    }

    #[test]
    fn overlap_is_half_open() {
        let morning = Interval::new(at(9, 0), at(10, 0)).unwrap();
        let adjacent = Interval::new(at(10, 0), at(11, 0)).unwrap();
        let straddling = Interval::new(at(9, 30), at(10, 30)).unwrap();
        let contained = Interval::new(at(9, 15), at(9, 45)).unwrap();

        // Sharing the 10:00 boundary is not a conflict
        assert!(!morning.overlaps(&adjacent));
        assert!(!adjacent.overlaps(&morning));

        assert!(morning.overlaps(&straddling));
        assert!(morning.overlaps(&contained));
        assert!(contained.overlaps(&morning));
    }
}
