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

//! Byte-size value types and process-wide device memory statistics.
//!
//! The global counters below form a contract: every backend allocator
//! reports its device allocations through [`record_device_allocation`] and
//! [`record_device_deallocation`], and any part of the renderer can read a
//! consistent-enough snapshot with [`get_device_memory_stats`].

pub mod allocation;
pub mod allocation_size;

pub use allocation::Allocation;
pub use allocation_size::{
    AllocationSize, Bytes, GibiBytes, GigaBytes, KibiBytes, KiloBytes, MebiBytes, MegaBytes,
};

use std::sync::atomic::{AtomicU64, Ordering};

// --- Global Device Memory Counters ---

/// Bytes of device memory currently held by all allocators.
pub static CURRENTLY_ALLOCATED_DEVICE_BYTES: AtomicU64 = AtomicU64::new(0);

/// The highest value [`CURRENTLY_ALLOCATED_DEVICE_BYTES`] has reached.
pub static PEAK_ALLOCATED_DEVICE_BYTES: AtomicU64 = AtomicU64::new(0);

/// The number of device memory allocations made.
pub static TOTAL_DEVICE_ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// The number of device memory allocations released.
pub static TOTAL_DEVICE_DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// The number of textures that were given memoryless (lazily allocated) backing.
pub static MEMORYLESS_TEXTURES: AtomicU64 = AtomicU64::new(0);

/// A snapshot of the global device memory counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceMemoryStats {
    /// Bytes currently allocated.
    pub current_allocated_bytes: u64,
    /// Peak bytes allocated.
    pub peak_allocated_bytes: u64,
    /// Total allocation calls.
    pub total_allocations: u64,
    /// Total deallocation calls.
    pub total_deallocations: u64,
    /// Textures backed by memoryless storage.
    pub memoryless_textures: u64,
}

impl DeviceMemoryStats {
    /// The number of allocations not yet released.
    pub fn live_allocations(&self) -> i64 {
        self.total_allocations as i64 - self.total_deallocations as i64
    }
}

/// Records a device allocation of `size` bytes.
pub fn record_device_allocation(size: Bytes) {
    let bytes = size.byte_size();
    TOTAL_DEVICE_ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    let current = CURRENTLY_ALLOCATED_DEVICE_BYTES.fetch_add(bytes, Ordering::Relaxed) + bytes;
    PEAK_ALLOCATED_DEVICE_BYTES.fetch_max(current, Ordering::Relaxed);
}

/// Records the release of a device allocation of `size` bytes.
pub fn record_device_deallocation(size: Bytes) {
    TOTAL_DEVICE_DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    CURRENTLY_ALLOCATED_DEVICE_BYTES.fetch_sub(size.byte_size(), Ordering::Relaxed);
}

/// Records that a texture received memoryless backing.
pub fn record_memoryless_texture() {
    MEMORYLESS_TEXTURES.fetch_add(1, Ordering::Relaxed);
}

/// Takes a snapshot of all global device memory counters.
///
/// Counters are read individually with `Ordering::Relaxed`, so a snapshot
/// taken while other threads allocate may be slightly inconsistent.
pub fn get_device_memory_stats() -> DeviceMemoryStats {
    DeviceMemoryStats {
        current_allocated_bytes: CURRENTLY_ALLOCATED_DEVICE_BYTES.load(Ordering::Relaxed),
        peak_allocated_bytes: PEAK_ALLOCATED_DEVICE_BYTES.load(Ordering::Relaxed),
        total_allocations: TOTAL_DEVICE_ALLOCATIONS.load(Ordering::Relaxed),
        total_deallocations: TOTAL_DEVICE_DEALLOCATIONS.load(Ordering::Relaxed),
        memoryless_textures: MEMORYLESS_TEXTURES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_advance() {
        // Other tests may allocate concurrently; only check monotonic counters.
        let before = get_device_memory_stats();
        record_device_allocation(Bytes::from_bytes(4096));
        record_device_deallocation(Bytes::from_bytes(4096));
        let after = get_device_memory_stats();
        assert!(after.total_allocations > before.total_allocations);
        assert!(after.total_deallocations > before.total_deallocations);
        assert!(after.peak_allocated_bytes >= 4096);
    }
}
