//! Device Capabilities
//!
//! Packed capability bits carried on every device record.
//! Capability checks are plain bit tests, never a lookup by type.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use serde::{Serialize, Deserialize};

/// Set of device capabilities (packed bits):
/// - Bit 0: Network access
/// - Bit 1: GPS
/// - Bit 2: Display
/// - Bit 3: Video source
/// - Bit 4: Power
/// - Bit 5: Information
/// - Bit 6-7: Reserved
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// Can take part in a network at all.
    pub const NETWORK_ACCESS: Self = Self(1 << 0);
    /// Reports its own position.
    pub const GPS: Self = Self(1 << 1);
    /// Has a screen.
    pub const DISPLAY: Self = Self(1 << 2);
    /// Can be selected as a video feed.
    pub const VIDEO_SOURCE: Self = Self(1 << 3);
    /// Supplies power to other equipment.
    pub const POWER: Self = Self(1 << 4);
    /// Publishes information pages.
    pub const INFORMATION: Self = Self(1 << 5);

    const ALL_BITS: u8 = 0b0011_1111;

    const NAMES: [(Self, &'static str); 6] = [
        (Self::NETWORK_ACCESS, "network"),
        (Self::GPS, "gps"),
        (Self::DISPLAY, "display"),
        (Self::VIDEO_SOURCE, "video"),
        (Self::POWER, "power"),
        (Self::INFORMATION, "info"),
    ];

    /// Create from raw bits. Reserved bits are dropped.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit in `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no bits are set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the bits in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits in `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Shorthand for the network-access test.
    #[inline]
    pub const fn has_network_access(self) -> bool {
        self.contains(Self::NETWORK_ACCESS)
    }
}

impl BitOr for Capabilities {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capabilities {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities[{}]", names.join("|"))
    }
}
