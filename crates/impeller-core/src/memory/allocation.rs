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

//! A growable host byte buffer with power-of-two reservation.

use super::allocation_size::Bytes;

/// A host-side byte buffer that separates its logical length from its
/// reserved capacity.
///
/// Growth through [`Allocation::truncate`] reserves the next power of two by
/// default, so a sequence of small appends costs a logarithmic number of
/// reallocations.
#[derive(Debug, Default)]
pub struct Allocation {
    buffer: Vec<u8>,
    length: Bytes,
}

impl Allocation {
    /// Creates an empty allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// The logical length.
    #[inline]
    pub fn length(&self) -> Bytes {
        self.length
    }

    /// The reserved capacity, which is always at least [`Allocation::length`].
    #[inline]
    pub fn reserved_length(&self) -> Bytes {
        Bytes::from_bytes(self.buffer.len() as u64)
    }

    /// The bytes up to the logical length.
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..self.length.byte_size() as usize]
    }

    /// Mutable access to the bytes up to the logical length.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        let len = self.length.byte_size() as usize;
        &mut self.buffer[..len]
    }

    /// Sets the logical length, growing the reservation if needed.
    ///
    /// With `npot` the reservation grows to the next power of two of
    /// `length`; otherwise to exactly `length`. Shrinking never releases
    /// memory. Returns `false` if the host allocation fails, in which case
    /// the allocation is unchanged.
    pub fn truncate(&mut self, length: Bytes, npot: bool) -> bool {
        let requested = if npot {
            Self::next_power_of_two_size(length)
        } else {
            length
        };
        if !self.reserve(requested) {
            return false;
        }
        self.length = length;
        true
    }

    /// Rounds `x` up to the next power of two. Zero rounds to one.
    pub fn next_power_of_two_size(x: Bytes) -> Bytes {
        Bytes::from_bytes(x.byte_size().max(1).next_power_of_two())
    }

    fn reserve(&mut self, reserved: Bytes) -> bool {
        let current = self.buffer.len();
        let Ok(wanted) = usize::try_from(reserved.byte_size()) else {
            return false;
        };
        if wanted <= current {
            return true;
        }
        if self.buffer.try_reserve_exact(wanted - current).is_err() {
            log::error!("Host allocation of {wanted} bytes failed");
            return false;
        }
        self.buffer.resize(wanted, 0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(Allocation::next_power_of_two_size(Bytes::from_bytes(0)).byte_size(), 1);
        assert_eq!(Allocation::next_power_of_two_size(Bytes::from_bytes(1)).byte_size(), 1);
        assert_eq!(Allocation::next_power_of_two_size(Bytes::from_bytes(3)).byte_size(), 4);
        assert_eq!(Allocation::next_power_of_two_size(Bytes::from_bytes(1024)).byte_size(), 1024);
        assert_eq!(Allocation::next_power_of_two_size(Bytes::from_bytes(1025)).byte_size(), 2048);
    }

    #[test]
    fn test_truncate_npot_reserves_power_of_two() {
        let mut allocation = Allocation::new();
        assert!(allocation.truncate(Bytes::from_bytes(100), true));
        assert_eq!(allocation.length().byte_size(), 100);
        assert_eq!(allocation.reserved_length().byte_size(), 128);
        assert_eq!(allocation.buffer().len(), 100);
    }

    #[test]
    fn test_truncate_exact_and_shrink() {
        let mut allocation = Allocation::new();
        assert!(allocation.truncate(Bytes::from_bytes(100), false));
        assert_eq!(allocation.reserved_length().byte_size(), 100);

        allocation.buffer_mut()[0] = 42;
        assert!(allocation.truncate(Bytes::from_bytes(10), true));
        assert_eq!(allocation.length().byte_size(), 10);
        assert_eq!(allocation.reserved_length().byte_size(), 100);
        assert_eq!(allocation.buffer()[0], 42, "Shrinking must keep existing contents");
    }
}
