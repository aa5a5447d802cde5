//! Core measurement data model shared by the subscriber and publisher.

use crate::time::Ticks;
use uuid::Uuid;

/// Quality-state bitmask carried alongside every measurement value.
///
/// Stored as a plain `u32` newtype rather than pulling in the `bitflags`
/// crate, matching the rest of this workspace's preference for explicit
/// constants over a flag-derive macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct StateFlags(pub u32);

impl StateFlags {
    pub const NORMAL: StateFlags = StateFlags(0x0000_0000);
    pub const BAD_DATA: StateFlags = StateFlags(0x0000_0001);
    pub const SUSPECT_DATA: StateFlags = StateFlags(0x0000_0002);
    pub const OVER_RANGE_ERROR: StateFlags = StateFlags(0x0000_0004);
    pub const UNDER_RANGE_ERROR: StateFlags = StateFlags(0x0000_0008);
    pub const ALARM_HIGH: StateFlags = StateFlags(0x0000_0010);
    pub const ALARM_LOW: StateFlags = StateFlags(0x0000_0020);
    pub const WARNING_HIGH: StateFlags = StateFlags(0x0000_0040);
    pub const WARNING_LOW: StateFlags = StateFlags(0x0000_0080);
    pub const FLATLINE_ALARM: StateFlags = StateFlags(0x0000_0100);
    pub const COMPARISON_ALARM: StateFlags = StateFlags(0x0000_0200);
    pub const ROC_ALARM: StateFlags = StateFlags(0x0000_0400);
    pub const RECEIVED_AS_BAD: StateFlags = StateFlags(0x0000_0800);
    pub const CALCULATED_VALUE: StateFlags = StateFlags(0x0000_1000);
    pub const CALCULATION_ERROR: StateFlags = StateFlags(0x0000_2000);
    pub const CALCULATION_WARNING: StateFlags = StateFlags(0x0000_4000);
    pub const RESERVED_QUALITY_FLAG: StateFlags = StateFlags(0x0000_8000);
    pub const BAD_TIME: StateFlags = StateFlags(0x0001_0000);
    pub const SUSPECT_TIME: StateFlags = StateFlags(0x0002_0000);
    pub const LATE_TIME_ALARM: StateFlags = StateFlags(0x0004_0000);
    pub const FUTURE_TIME_ALARM: StateFlags = StateFlags(0x0008_0000);
    pub const UPSAMPLED: StateFlags = StateFlags(0x0010_0000);
    pub const DOWNSAMPLED: StateFlags = StateFlags(0x0020_0000);
    pub const DISCARDED_VALUE: StateFlags = StateFlags(0x0040_0000);
    pub const RESERVED_TIME_FLAG: StateFlags = StateFlags(0x0080_0000);
    pub const USER_DEFINED_FLAG1: StateFlags = StateFlags(0x0100_0000);
    pub const USER_DEFINED_FLAG2: StateFlags = StateFlags(0x0200_0000);
    pub const USER_DEFINED_FLAG3: StateFlags = StateFlags(0x0400_0000);
    pub const USER_DEFINED_FLAG4: StateFlags = StateFlags(0x0800_0000);
    pub const USER_DEFINED_FLAG5: StateFlags = StateFlags(0x1000_0000);
    pub const SYSTEM_ERROR: StateFlags = StateFlags(0x2000_0000);
    pub const SYSTEM_WARNING: StateFlags = StateFlags(0x4000_0000);
    pub const MEASUREMENT_ERROR: StateFlags = StateFlags(0x8000_0000);

    pub fn contains(self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: StateFlags) -> StateFlags {
        StateFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for StateFlags {
    type Output = StateFlags;
    fn bitor(self, rhs: StateFlags) -> StateFlags {
        self.union(rhs)
    }
}

impl From<u32> for StateFlags {
    fn from(value: u32) -> Self {
        StateFlags(value)
    }
}

impl From<StateFlags> for u32 {
    fn from(value: StateFlags) -> Self {
        value.0
    }
}

/// A single time-stamped, signal-identified value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub signal_id: Uuid,
    pub value: f64,
    pub timestamp: Ticks,
    pub flags: StateFlags,
}

impl Measurement {
    pub fn new(signal_id: Uuid, value: f64, timestamp: Ticks) -> Self {
        Measurement {
            signal_id,
            value,
            timestamp,
            flags: StateFlags::NORMAL,
        }
    }

    pub fn with_flags(mut self, flags: StateFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_flags_union_and_contains() {
        let flags = StateFlags::BAD_DATA | StateFlags::SUSPECT_TIME;
        assert!(flags.contains(StateFlags::BAD_DATA));
        assert!(flags.contains(StateFlags::SUSPECT_TIME));
        assert!(!flags.contains(StateFlags::ALARM_HIGH));
    }

    #[test]
    fn measurement_default_flags_are_normal() {
        let m = Measurement::new(Uuid::nil(), 60.0, 0);
        assert_eq!(m.flags, StateFlags::NORMAL);
    }
}
