//! Conversion options
//!
//! A small bitset passed through every conversion. It crosses the call
//! interface as a single `Int`.

use std::ops::{BitOr, BitOrAssign, Sub};

/// Flags controlling container representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConversionOptions(u32);

impl ConversionOptions {
    /// No flags: wrapped containers and value types
    pub const NONE: Self = Self(0);
    /// Produce the foreign runtime's plain list/map/set/byte-array/date forms
    pub const NATIVE_CONTAINER: Self = Self(1 << 0);
    /// The outermost value is a plain foreign container; consumed by the
    /// first container converter it reaches
    pub const INTEROP_COMPATIBLE_CONTAINER: Self = Self(1 << 1);

    const ALL: u32 = Self::NATIVE_CONTAINER.0 | Self::INTEROP_COMPATIBLE_CONTAINER.0;

    /// Raw bits as sent across the boundary
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// From raw bits; unknown bits are dropped
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    /// Whether every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Remove the flags in `other`
    pub const fn subtract(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether a container at this level takes its plain foreign form
    pub const fn plain_container(self) -> bool {
        self.0 & Self::ALL != 0
    }

    /// Options for values nested inside a container
    pub const fn nested(self) -> Self {
        self.subtract(Self::INTEROP_COMPATIBLE_CONTAINER)
    }

    /// Options from the installed configuration
    pub fn configured() -> Self {
        crate::config::config().default_options()
    }
}

impl BitOr for ConversionOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ConversionOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl Sub for ConversionOptions {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.subtract(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_subtract() {
        let both = ConversionOptions::NATIVE_CONTAINER | ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
        assert!(both.contains(ConversionOptions::NATIVE_CONTAINER));
        let native = both - ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
        assert_eq!(native, ConversionOptions::NATIVE_CONTAINER);
        assert!(!native.contains(ConversionOptions::INTEROP_COMPATIBLE_CONTAINER));
    }

    #[test]
    fn test_bits_round_trip() {
        let opts = ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
        assert_eq!(ConversionOptions::from_bits(opts.bits()), opts);
        assert_eq!(ConversionOptions::from_bits(0xff00), ConversionOptions::NONE);
    }

    #[test]
    fn test_interop_flag_is_consumed_once() {
        let outer = ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
        assert!(outer.plain_container());
        assert!(!outer.nested().plain_container());
        let native = ConversionOptions::NATIVE_CONTAINER;
        assert!(native.nested().plain_container());
    }
}
