// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A unit-tagged byte count.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// An exact byte count, presented in units of `PERIOD` bytes.
///
/// The unit only affects construction and [`AllocationSize::size`]; the
/// stored value is always the byte count. Converting between units is a
/// reinterpretation and never loses precision, and values of different units
/// compare by their byte counts.
///
/// Arithmetic is plain `u64` arithmetic on byte counts. Overflow is a caller
/// error; use [`crate::math::saturated`] for untrusted quantities.
#[derive(Clone, Copy, Default)]
pub struct AllocationSize<const PERIOD: u64> {
    bytes: u64,
}

/// Sizes expressed in bytes.
pub type Bytes = AllocationSize<1>;
/// Sizes expressed in kilobytes (1000 bytes).
pub type KiloBytes = AllocationSize<1_000>;
/// Sizes expressed in megabytes (1000^2 bytes).
pub type MegaBytes = AllocationSize<1_000_000>;
/// Sizes expressed in gigabytes (1000^3 bytes).
pub type GigaBytes = AllocationSize<1_000_000_000>;
/// Sizes expressed in kibibytes (1024 bytes).
pub type KibiBytes = AllocationSize<1_024>;
/// Sizes expressed in mebibytes (1024^2 bytes).
pub type MebiBytes = AllocationSize<1_048_576>;
/// Sizes expressed in gibibytes (1024^3 bytes).
pub type GibiBytes = AllocationSize<1_073_741_824>;

impl<const PERIOD: u64> AllocationSize<PERIOD> {
    /// Creates a size of `ceil(value)` units.
    ///
    /// `Bytes::new(1.5)` is 2 bytes and `KiloBytes::new(5.0)` is exactly 5000
    /// bytes.
    #[inline]
    pub fn new(value: f64) -> Self {
        Self {
            bytes: value.ceil() as u64 * PERIOD,
        }
    }

    /// Creates a size of exactly `units` units.
    #[inline]
    pub const fn from_units(units: u64) -> Self {
        Self {
            bytes: units * PERIOD,
        }
    }

    /// Creates a size from a raw byte count.
    #[inline]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// The exact number of bytes.
    #[inline]
    pub const fn byte_size(&self) -> u64 {
        self.bytes
    }

    /// The size in units of `PERIOD`, possibly fractional.
    #[inline]
    pub fn size(&self) -> f64 {
        self.bytes as f64 / PERIOD as f64
    }

    /// Reinterprets the same byte count in a different unit.
    #[inline]
    pub const fn convert_to<const OTHER: u64>(self) -> AllocationSize<OTHER> {
        AllocationSize { bytes: self.bytes }
    }

    /// Returns `true` if the size is zero bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

impl<const P: u64, const O: u64> PartialEq<AllocationSize<O>> for AllocationSize<P> {
    #[inline]
    fn eq(&self, other: &AllocationSize<O>) -> bool {
        self.bytes == other.bytes
    }
}

impl<const P: u64> Eq for AllocationSize<P> {}

impl<const P: u64, const O: u64> PartialOrd<AllocationSize<O>> for AllocationSize<P> {
    #[inline]
    fn partial_cmp(&self, other: &AllocationSize<O>) -> Option<Ordering> {
        Some(self.bytes.cmp(&other.bytes))
    }
}

impl<const P: u64> Ord for AllocationSize<P> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl<const P: u64> Hash for AllocationSize<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl<const P: u64> Add for AllocationSize<P> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::from_bytes(self.bytes + rhs.bytes)
    }
}

impl<const P: u64> Sub for AllocationSize<P> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::from_bytes(self.bytes - rhs.bytes)
    }
}

impl<const P: u64> AddAssign for AllocationSize<P> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.bytes += rhs.bytes;
    }
}

impl<const P: u64> SubAssign for AllocationSize<P> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.bytes -= rhs.bytes;
    }
}

impl<const P: u64> fmt::Debug for AllocationSize<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllocationSize<{P}>({} bytes)", self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_rounds_up() {
        assert_eq!(Bytes::new(1.5).byte_size(), 2);
        assert_eq!(Bytes::new(2.0).byte_size(), 2);
        assert_eq!(KiloBytes::new(5.0).byte_size(), 5_000);
        assert_eq!(KiloBytes::new(0.1).byte_size(), 1_000);
        assert_eq!(KibiBytes::new(2.0).byte_size(), 2_048);
        assert_eq!(MebiBytes::from_units(3).byte_size(), 3 * 1_048_576);
    }

    #[test]
    fn test_conversion_is_exact() {
        let sizes = [
            Bytes::from_bytes(1),
            Bytes::from_bytes(1_023),
            Bytes::from_bytes(1_000_001),
            Bytes::from_bytes(u64::MAX),
        ];
        for size in sizes {
            assert_eq!(size.convert_to::<1_000>().byte_size(), size.byte_size());
            assert_eq!(size.convert_to::<1_073_741_824>().byte_size(), size.byte_size());
            let back: Bytes = size.convert_to::<1_048_576>().convert_to();
            assert_eq!(back, size);
        }
    }

    #[test]
    fn test_fractional_size() {
        let size = Bytes::from_bytes(1_500).convert_to::<1_000>();
        assert_eq!(size.size(), 1.5);
        assert_eq!(GigaBytes::from_units(2).size(), 2.0);
    }

    #[test]
    fn test_cross_unit_comparison() {
        assert_eq!(KiloBytes::from_units(1), Bytes::from_bytes(1_000));
        assert!(KibiBytes::from_units(1) > KiloBytes::from_units(1));
        assert!(MegaBytes::from_units(1) < MebiBytes::from_units(1));
        assert!(GibiBytes::from_units(1) >= GigaBytes::from_units(1));
    }

    #[test]
    fn test_arithmetic_on_bytes() {
        let mut a = KiloBytes::from_units(2);
        a += KiloBytes::new(0.5);
        assert_eq!(a.byte_size(), 3_000);
        a -= KiloBytes::from_units(1);
        assert_eq!(a.byte_size(), 2_000);
        assert_eq!((a + a).byte_size(), 4_000);
        assert_eq!((a - a).byte_size(), 0);
        assert!((a - a).is_empty());
    }
}
