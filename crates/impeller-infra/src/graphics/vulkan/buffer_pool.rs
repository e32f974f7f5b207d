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

//! Suballocation of host-visible buffers out of large memory blocks.

use ash::vk;
use std::collections::{BTreeMap, BTreeSet};

/// Every suballocation offset is a multiple of this.
pub const POOL_ALIGNMENT: u64 = 256;

/// Tracks the free ranges of one block and hands out the best fit.
#[derive(Debug)]
pub struct BestFit {
    // offset -> size of the free range starting there
    free_by_offset: BTreeMap<u64, u64>,
    // (size, offset)
    free_by_size: BTreeSet<(u64, u64)>,
}

impl BestFit {
    /// A fully free range of `size` bytes.
    pub fn new(size: u64) -> Self {
        let mut free_by_offset = BTreeMap::new();
        free_by_offset.insert(0, size);
        let mut free_by_size = BTreeSet::new();
        free_by_size.insert((size, 0));
        Self {
            free_by_offset,
            free_by_size,
        }
    }

    /// Carves `size` bytes out of the smallest free range that fits.
    pub fn alloc(&mut self, size: u64) -> Option<u64> {
        let block = *self.free_by_size.range((size, 0)..).next()?;
        let (block_size, offset) = block;
        self.free_by_offset.remove(&offset);
        self.free_by_size.remove(&block);
        let remainder = block_size - size;
        if remainder > 0 {
            let remainder_offset = offset + size;
            self.free_by_offset.insert(remainder_offset, remainder);
            self.free_by_size.insert((remainder, remainder_offset));
        }
        Some(offset)
    }

    /// Returns a range, merging it with free neighbours.
    pub fn free(&mut self, offset: u64, size: u64) {
        let mut start = offset;
        let mut len = size;

        let prev = self
            .free_by_offset
            .range(..offset)
            .next_back()
            .map(|(&o, &s)| (o, s));
        if let Some((prev_offset, prev_size)) = prev {
            if prev_offset + prev_size == offset {
                self.free_by_offset.remove(&prev_offset);
                self.free_by_size.remove(&(prev_size, prev_offset));
                start = prev_offset;
                len += prev_size;
            }
        }

        let next_offset = offset + size;
        if let Some(next_size) = self.free_by_offset.remove(&next_offset) {
            self.free_by_size.remove(&(next_size, next_offset));
            len += next_size;
        }

        self.free_by_offset.insert(start, len);
        self.free_by_size.insert((len, start));
    }

    /// Returns `true` if nothing is allocated out of a block of `capacity` bytes.
    pub fn is_unused(&self, capacity: u64) -> bool {
        self.free_by_offset.get(&0) == Some(&capacity)
    }
}

#[derive(Debug)]
struct PoolBlock {
    memory: vk::DeviceMemory,
    capacity: u64,
    ranges: BestFit,
}

/// A suballocated range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAllocation {
    /// The backing memory of the block.
    pub memory: vk::DeviceMemory,
    /// The offset within the block.
    pub offset: u64,
    /// The reserved size, a multiple of [`POOL_ALIGNMENT`].
    pub size: u64,
}

/// The blocks of one memory type.
#[derive(Debug, Default)]
pub struct BufferPool {
    blocks: Vec<PoolBlock>,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suballocates `size` bytes from an existing block.
    pub fn allocate(&mut self, size: u64) -> Option<PoolAllocation> {
        let size = size.max(1).next_multiple_of(POOL_ALIGNMENT);
        self.blocks.iter_mut().find_map(|block| {
            block.ranges.alloc(size).map(|offset| PoolAllocation {
                memory: block.memory,
                offset,
                size,
            })
        })
    }

    /// Adds a freshly allocated block of `capacity` bytes.
    pub fn add_block(&mut self, memory: vk::DeviceMemory, capacity: u64) {
        self.blocks.push(PoolBlock {
            memory,
            capacity,
            ranges: BestFit::new(capacity),
        });
    }

    /// Returns a range to its block.
    pub fn free(&mut self, allocation: &PoolAllocation) {
        if let Some(block) = self.blocks.iter_mut().find(|b| b.memory == allocation.memory) {
            block.ranges.free(allocation.offset, allocation.size);
        }
    }

    /// The number of blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Removes and returns every block with no live allocation, except one.
    pub fn trim(&mut self) -> Vec<(vk::DeviceMemory, u64)> {
        let mut kept_empty = false;
        let mut released = Vec::new();
        self.blocks.retain(|block| {
            if !block.ranges.is_unused(block.capacity) {
                return true;
            }
            if !kept_empty {
                kept_empty = true;
                return true;
            }
            released.push((block.memory, block.capacity));
            false
        });
        released
    }

    /// Removes and returns every block.
    pub fn drain(&mut self) -> Vec<(vk::DeviceMemory, u64)> {
        self.blocks
            .drain(..)
            .map(|b| (b.memory, b.capacity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_best_fit_prefers_smallest_hole() {
        let mut fit = BestFit::new(1024);
        let a = fit.alloc(256).unwrap();
        let _b = fit.alloc(128).unwrap();
        let c = fit.alloc(512).unwrap();
        fit.free(a, 256);
        fit.free(c, 512);

        // 256 at offset 0 is the tightest fit for 200.
        assert_eq!(fit.alloc(200), Some(0));
    }

    #[test]
    fn test_free_coalesces_neighbours() {
        let mut fit = BestFit::new(300);
        let a = fit.alloc(100).unwrap();
        let b = fit.alloc(100).unwrap();
        let c = fit.alloc(100).unwrap();
        assert_eq!(fit.alloc(1), None);

        fit.free(a, 100);
        fit.free(c, 100);
        fit.free(b, 100);

        assert!(fit.is_unused(300), "All ranges should merge back into one");
        assert_eq!(fit.alloc(300), Some(0));
    }

    #[test]
    fn test_pool_rounds_to_alignment() {
        let mut pool = BufferPool::new();
        pool.add_block(vk::DeviceMemory::from_raw(7), 4096);
        let first = pool.allocate(10).unwrap();
        let second = pool.allocate(10).unwrap();
        assert_eq!(first.size, POOL_ALIGNMENT);
        assert_eq!(second.offset % POOL_ALIGNMENT, 0);
        assert_ne!(first.offset, second.offset);
    }

    #[test]
    fn test_trim_keeps_one_empty_block() {
        let mut pool = BufferPool::new();
        pool.add_block(vk::DeviceMemory::from_raw(1), 1024);
        pool.add_block(vk::DeviceMemory::from_raw(2), 1024);
        let released = pool.trim();
        assert_eq!(released.len(), 1);
        assert_eq!(pool.block_count(), 1);
    }
}
