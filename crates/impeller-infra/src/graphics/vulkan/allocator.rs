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

//! Buffer and texture allocation.

use super::buffer_pool::{BufferPool, PoolAllocation, POOL_ALIGNMENT};
use super::device_holder::{with_device, DeviceHolderVK};
use super::formats::IntoVk;
use ash::vk;
use impeller_core::math::ISize;
use impeller_core::memory::{self, Bytes};
use impeller_core::renderer::{
    Allocator, AttachmentKind, DeviceBuffer, DeviceBufferDescriptor, ResourceError, StorageMode,
    Texture, TextureDescriptor, TextureType, TextureUsage,
};
use impeller_core::validation_log;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Every buffer is created with the same usage, so one set of memory
/// requirements describes them all.
const BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::VERTEX_BUFFER.as_raw()
        | vk::BufferUsageFlags::INDEX_BUFFER.as_raw()
        | vk::BufferUsageFlags::UNIFORM_BUFFER.as_raw()
        | vk::BufferUsageFlags::STORAGE_BUFFER.as_raw()
        | vk::BufferUsageFlags::TRANSFER_SRC.as_raw()
        | vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
);

/// Counts the device bytes held by one allocator and reports them to the
/// process-wide memory statistics.
#[derive(Debug, Default)]
struct AllocationTracker {
    bytes: AtomicU64,
}

impl AllocationTracker {
    fn add(&self, size: u64) {
        self.bytes.fetch_add(size, Ordering::Relaxed);
        memory::record_device_allocation(Bytes::from_bytes(size));
    }

    fn remove(&self, size: u64) {
        self.bytes.fetch_sub(size, Ordering::Relaxed);
        memory::record_device_deallocation(Bytes::from_bytes(size));
    }
}

/// The host-visible buffer pool and the device it allocates from.
#[derive(Debug)]
struct SharedPool {
    device: Weak<DeviceHolderVK>,
    memory_type_index: u32,
    block_size: u64,
    pool: Mutex<BufferPool>,
    tracker: Arc<AllocationTracker>,
}

impl SharedPool {
    /// Returns `true` if buffers with `requirements` may live in this pool.
    fn accepts(&self, requirements: &vk::MemoryRequirements) -> bool {
        requirements.memory_type_bits & (1 << self.memory_type_index) != 0
            && requirements.alignment <= POOL_ALIGNMENT
    }

    /// Suballocates, adding a block if every existing one is full.
    fn allocate(&self, device: &DeviceHolderVK, size: u64) -> Option<PoolAllocation> {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(allocation) = pool.allocate(size) {
            return Some(allocation);
        }
        let capacity = self.block_size.max(size.next_multiple_of(POOL_ALIGNMENT));
        match device
            .driver()
            .allocate_memory(device.device(), capacity, self.memory_type_index)
        {
            Ok(memory) => {
                log::debug!("Buffer pool grew by a block of {capacity} bytes.");
                self.tracker.add(capacity);
                pool.add_block(memory, capacity);
                pool.allocate(size)
            }
            Err(error) => {
                log::warn!("Could not grow the buffer pool: {error}.");
                None
            }
        }
    }

    fn release(&self, allocation: &PoolAllocation) {
        let released = {
            let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            pool.free(allocation);
            pool.trim()
        };
        self.free_blocks(released);
    }

    fn free_blocks(&self, blocks: Vec<(vk::DeviceMemory, u64)>) {
        for (memory, capacity) in blocks {
            with_device(&self.device, |device| {
                device.driver().free_memory(device.device(), memory);
            });
            self.tracker.remove(capacity);
        }
    }
}

impl Drop for SharedPool {
    fn drop(&mut self) {
        let blocks = self
            .pool
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain();
        self.free_blocks(blocks);
    }
}

#[derive(Debug)]
enum BufferBacking {
    Dedicated {
        memory: vk::DeviceMemory,
        size: u64,
    },
    Pooled {
        pool: Arc<SharedPool>,
        allocation: PoolAllocation,
    },
}

impl BufferBacking {
    fn memory_and_offset(&self) -> (vk::DeviceMemory, u64) {
        match self {
            BufferBacking::Dedicated { memory, .. } => (*memory, 0),
            BufferBacking::Pooled { allocation, .. } => (allocation.memory, allocation.offset),
        }
    }
}

/// A Vulkan buffer and its memory.
#[derive(Debug)]
pub struct DeviceBufferVK {
    descriptor: DeviceBufferDescriptor,
    device: Weak<DeviceHolderVK>,
    buffer: vk::Buffer,
    backing: BufferBacking,
    host_visible: bool,
    tracker: Arc<AllocationTracker>,
}

impl DeviceBufferVK {
    /// The buffer handle.
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns `true` if the buffer shares a memory block with other buffers.
    pub fn is_pooled(&self) -> bool {
        matches!(self.backing, BufferBacking::Pooled { .. })
    }

    /// The backing memory and the buffer's offset within it.
    pub fn memory_and_offset(&self) -> (vk::DeviceMemory, u64) {
        self.backing.memory_and_offset()
    }

    fn check_access(
        &self,
        offset: usize,
        length: usize,
    ) -> Result<Arc<DeviceHolderVK>, ResourceError> {
        if !self.host_visible {
            return Err(ResourceError::NotHostVisible);
        }
        let size = self.descriptor.size;
        if offset.checked_add(length).map_or(true, |end| end > size) {
            return Err(ResourceError::OutOfBounds {
                offset,
                length,
                size,
            });
        }
        self.device.upgrade().ok_or(ResourceError::DeviceLost)
    }
}

impl DeviceBuffer for DeviceBufferVK {
    fn descriptor(&self) -> &DeviceBufferDescriptor {
        &self.descriptor
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), ResourceError> {
        let device = self.check_access(offset, data.len())?;
        let (memory, base) = self.backing.memory_and_offset();
        device
            .driver()
            .write_memory(device.device(), memory, base + offset as u64, data)
            .map_err(|e| ResourceError::BackendError(e.to_string()))
    }

    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, ResourceError> {
        let device = self.check_access(offset, len)?;
        let (memory, base) = self.backing.memory_and_offset();
        device
            .driver()
            .read_memory(device.device(), memory, base + offset as u64, len as u64)
            .map_err(|e| ResourceError::BackendError(e.to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for DeviceBufferVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            device.driver().destroy_buffer(device.device(), self.buffer);
        });
        match &self.backing {
            BufferBacking::Dedicated { memory, size } => {
                with_device(&self.device, |device| {
                    device.driver().free_memory(device.device(), *memory);
                });
                self.tracker.remove(*size);
            }
            BufferBacking::Pooled { pool, allocation } => pool.release(allocation),
        }
    }
}

/// A Vulkan image and its memory.
#[derive(Debug)]
pub struct TextureVK {
    descriptor: TextureDescriptor,
    device: Weak<DeviceHolderVK>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    tracked_size: u64,
    memoryless: bool,
    tracker: Arc<AllocationTracker>,
}

impl TextureVK {
    /// The image handle.
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Returns `true` if the image is backed by lazily allocated memory.
    pub fn is_memoryless(&self) -> bool {
        self.memoryless
    }

    /// The image extent.
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.descriptor.size.width as u32,
            height: self.descriptor.size.height as u32,
        }
    }
}

impl Texture for TextureVK {
    fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    fn is_valid(&self) -> bool {
        self.image != vk::Image::null() && self.device.strong_count() > 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for TextureVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            device.driver().destroy_image(device.device(), self.image);
            device.driver().free_memory(device.device(), self.memory);
        });
        if self.tracked_size > 0 {
            self.tracker.remove(self.tracked_size);
        }
    }
}

/// Creates buffers and textures on one device.
#[derive(Debug)]
pub struct AllocatorVK {
    device: Weak<DeviceHolderVK>,
    memory_types: Vec<vk::MemoryType>,
    supports_memoryless: bool,
    max_texture_size: ISize,
    host_pool: Option<Arc<SharedPool>>,
    tracker: Arc<AllocationTracker>,
}

impl AllocatorVK {
    /// Creates an allocator.
    ///
    /// ## Arguments
    /// * `device` - The device to allocate from.
    /// * `supports_memoryless` - Whether transient render targets may use
    ///   lazily allocated memory.
    /// * `max_texture_size` - The largest texture the device accepts.
    /// * `pool_block_size` - The size of one host-visible pool block. Zero
    ///   disables pooling.
    pub fn new(
        device: &Arc<DeviceHolderVK>,
        supports_memoryless: bool,
        max_texture_size: ISize,
        pool_block_size: u64,
    ) -> Self {
        let memory_types = device.driver().memory_types();
        let tracker = Arc::new(AllocationTracker::default());
        let host_pool = (pool_block_size > 0)
            .then(|| Self::pool_memory_type(device, &memory_types))
            .flatten()
            .map(|memory_type_index| {
                log::debug!("Host-visible buffer pool uses memory type {memory_type_index}.");
                Arc::new(SharedPool {
                    device: Arc::downgrade(device),
                    memory_type_index,
                    block_size: pool_block_size,
                    pool: Mutex::new(BufferPool::new()),
                    tracker: tracker.clone(),
                })
            });
        Self {
            device: Arc::downgrade(device),
            memory_types,
            supports_memoryless,
            max_texture_size,
            host_pool,
            tracker,
        }
    }

    /// Picks the pool's memory type from the requirements of a real buffer.
    fn pool_memory_type(device: &DeviceHolderVK, memory_types: &[vk::MemoryType]) -> Option<u32> {
        let driver = device.driver();
        let info = vk::BufferCreateInfo::default()
            .size(POOL_ALIGNMENT)
            .usage(BUFFER_USAGE)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = match driver.create_buffer(device.device(), &info) {
            Ok(buffer) => buffer,
            Err(error) => {
                log::warn!("Could not query buffer memory requirements ({error}), not pooling.");
                return None;
            }
        };
        let requirements = driver.buffer_memory_requirements(device.device(), buffer);
        driver.destroy_buffer(device.device(), buffer);
        let (required, forbidden) = Self::memory_flags(StorageMode::HostVisible);
        find_memory_type(memory_types, requirements.memory_type_bits, required, forbidden)
    }

    /// The memory type index backing the host-visible buffer pool.
    pub fn pool_memory_type_index(&self) -> Option<u32> {
        self.host_pool.as_ref().map(|p| p.memory_type_index)
    }

    /// Bytes of device memory currently held by this allocator.
    pub fn allocated_bytes(&self) -> u64 {
        self.tracker.bytes.load(Ordering::Relaxed)
    }

    /// The number of blocks in the host-visible buffer pool.
    pub fn pool_block_count(&self) -> usize {
        self.host_pool.as_ref().map_or(0, |p| {
            p.pool.lock().unwrap_or_else(PoisonError::into_inner).block_count()
        })
    }

    fn memory_flags(
        storage_mode: StorageMode,
    ) -> (vk::MemoryPropertyFlags, vk::MemoryPropertyFlags) {
        // (required, forbidden)
        match storage_mode {
            StorageMode::HostVisible => (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                vk::MemoryPropertyFlags::empty(),
            ),
            StorageMode::DevicePrivate | StorageMode::DeviceTransient => (
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
            ),
        }
    }

    fn create_buffer_vk(
        &self,
        device: &Arc<DeviceHolderVK>,
        descriptor: &DeviceBufferDescriptor,
    ) -> Result<DeviceBufferVK, String> {
        let driver = device.driver();
        let info = vk::BufferCreateInfo::default()
            .size(descriptor.size as u64)
            .usage(BUFFER_USAGE)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = driver
            .create_buffer(device.device(), &info)
            .map_err(|e| format!("buffer creation failed: {e}"))?;
        let requirements = driver.buffer_memory_requirements(device.device(), buffer);
        let host_visible = descriptor.storage_mode == StorageMode::HostVisible;

        let destroy = |reason: String| {
            driver.destroy_buffer(device.device(), buffer);
            reason
        };

        // Readback buffers get their own memory so the host never observes
        // a neighbour's writes.
        let pool = self
            .host_pool
            .as_ref()
            .filter(|_| host_visible && !descriptor.readback);
        if let Some(pool) = pool.filter(|pool| !pool.accepts(&requirements)) {
            log::debug!(
                "Buffer allows memory types {:#b}, not the pool's type {}. Using a dedicated \
                 allocation.",
                requirements.memory_type_bits,
                pool.memory_type_index
            );
        }
        if let Some(pool) = pool.filter(|pool| pool.accepts(&requirements)) {
            if let Some(allocation) = pool.allocate(device, requirements.size) {
                let bound = driver.bind_buffer_memory(
                    device.device(),
                    buffer,
                    allocation.memory,
                    allocation.offset,
                );
                match bound {
                    Ok(()) => {
                        return Ok(DeviceBufferVK {
                            descriptor: *descriptor,
                            device: Arc::downgrade(device),
                            buffer,
                            backing: BufferBacking::Pooled {
                                pool: pool.clone(),
                                allocation,
                            },
                            host_visible,
                            tracker: self.tracker.clone(),
                        });
                    }
                    Err(error) => {
                        pool.release(&allocation);
                        log::warn!("Binding pooled memory failed ({error}), not pooling.");
                    }
                }
            }
        }

        let (required, forbidden) = Self::memory_flags(descriptor.storage_mode);
        let memory = self
            .allocate_dedicated(device, &requirements, required, forbidden)
            .map_err(destroy)?;
        if let Err(error) = driver.bind_buffer_memory(device.device(), buffer, memory, 0) {
            driver.free_memory(device.device(), memory);
            return Err(destroy(format!("binding memory failed: {error}")));
        }
        self.tracker.add(requirements.size);

        Ok(DeviceBufferVK {
            descriptor: *descriptor,
            device: Arc::downgrade(device),
            buffer,
            backing: BufferBacking::Dedicated {
                memory,
                size: requirements.size,
            },
            host_visible,
            tracker: self.tracker.clone(),
        })
    }

    fn allocate_dedicated(
        &self,
        device: &DeviceHolderVK,
        requirements: &vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
        forbidden: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory, String> {
        let bits = requirements.memory_type_bits;
        let type_index = find_memory_type(&self.memory_types, bits, required, forbidden)
            .ok_or_else(|| format!("no memory type with {required:?} in {bits:#b}"))?;
        device
            .driver()
            .allocate_memory(device.device(), requirements.size, type_index)
            .map_err(|e| format!("memory allocation of {} bytes failed: {e}", requirements.size))
    }

    fn image_usage(descriptor: &TextureDescriptor, transient: bool) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::empty();
        if descriptor.usage.contains(TextureUsage::RENDER_TARGET) {
            let kind = descriptor.format.attachment_kind();
            if kind == Some(AttachmentKind::Color) {
                usage |=
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT;
            } else {
                usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
            }
        }
        if transient {
            // Transient images may only be used as attachments.
            return usage | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
        }
        if descriptor.usage.contains(TextureUsage::SHADER_READ) {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        if descriptor.usage.contains(TextureUsage::SHADER_WRITE) {
            usage |= vk::ImageUsageFlags::STORAGE;
        }
        usage | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST
    }

    fn create_texture_vk(
        &self,
        device: &Arc<DeviceHolderVK>,
        descriptor: &TextureDescriptor,
        memoryless: bool,
    ) -> Result<TextureVK, String> {
        let driver = device.driver();
        let cube = descriptor.texture_type == TextureType::TextureCube;
        let info = vk::ImageCreateInfo::default()
            .flags(if cube {
                vk::ImageCreateFlags::CUBE_COMPATIBLE
            } else {
                vk::ImageCreateFlags::empty()
            })
            .image_type(vk::ImageType::TYPE_2D)
            .format(descriptor.format.into_vk())
            .extent(vk::Extent3D {
                width: descriptor.size.width as u32,
                height: descriptor.size.height as u32,
                depth: 1,
            })
            .mip_levels(descriptor.mip_count)
            .array_layers(if cube { 6 } else { 1 })
            .samples(descriptor.sample_count.into_vk())
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(Self::image_usage(descriptor, memoryless))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = driver
            .create_image(device.device(), &info)
            .map_err(|e| format!("image creation failed: {e}"))?;
        let requirements = driver.image_memory_requirements(device.device(), image);
        let destroy = |reason: String| {
            driver.destroy_image(device.device(), image);
            reason
        };

        let (required, forbidden) = if memoryless {
            (
                vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
                vk::MemoryPropertyFlags::empty(),
            )
        } else {
            Self::memory_flags(descriptor.storage_mode)
        };
        let memory = self
            .allocate_dedicated(device, &requirements, required, forbidden)
            .map_err(destroy)?;
        if let Err(error) = driver.bind_image_memory(device.device(), image, memory, 0) {
            driver.free_memory(device.device(), memory);
            return Err(destroy(format!("binding memory failed: {error}")));
        }

        let tracked_size = if memoryless {
            memory::record_memoryless_texture();
            0
        } else {
            self.tracker.add(requirements.size);
            requirements.size
        };

        Ok(TextureVK {
            descriptor: *descriptor,
            device: Arc::downgrade(device),
            image,
            memory,
            tracked_size,
            memoryless,
            tracker: self.tracker.clone(),
        })
    }
}

/// The index of the first memory type allowed by `type_bits` that has all of
/// `required` and none of `forbidden`.
pub fn find_memory_type(
    types: &[vk::MemoryType],
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    forbidden: vk::MemoryPropertyFlags,
) -> Option<u32> {
    types
        .iter()
        .enumerate()
        .find(|(i, t)| {
            type_bits & (1 << i) != 0
                && t.property_flags.contains(required)
                && !t.property_flags.intersects(forbidden)
        })
        .map(|(i, _)| i as u32)
}

impl Allocator for AllocatorVK {
    fn create_buffer(&self, descriptor: &DeviceBufferDescriptor) -> Option<Arc<dyn DeviceBuffer>> {
        if descriptor.size == 0 {
            validation_log!("Cannot create an empty buffer: {descriptor:?}");
            return None;
        }
        let Some(device) = self.device.upgrade() else {
            validation_log!("Cannot create a buffer, the device is gone: {descriptor:?}");
            return None;
        };
        match self.create_buffer_vk(&device, descriptor) {
            Ok(buffer) => Some(Arc::new(buffer)),
            Err(reason) => {
                validation_log!("Unable to allocate a device buffer ({reason}): {descriptor:?}");
                None
            }
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Option<Arc<dyn Texture>> {
        if !descriptor.is_valid() {
            validation_log!("Invalid texture descriptor: {descriptor:?}");
            return None;
        }
        if !descriptor.size.fits_within(&self.max_texture_size) {
            validation_log!(
                "Texture of size {}x{} exceeds the device maximum of {}x{}.",
                descriptor.size.width,
                descriptor.size.height,
                self.max_texture_size.width,
                self.max_texture_size.height
            );
            return None;
        }
        let Some(device) = self.device.upgrade() else {
            validation_log!("Cannot create a texture, the device is gone: {descriptor:?}");
            return None;
        };

        let wants_memoryless = descriptor.storage_mode == StorageMode::DeviceTransient
            && descriptor.is_render_target()
            && self.supports_memoryless;
        if wants_memoryless {
            match self.create_texture_vk(&device, descriptor, true) {
                Ok(texture) => return Some(Arc::new(texture)),
                Err(reason) => {
                    log::debug!("Memoryless backing unavailable ({reason}), using device memory.")
                }
            }
        }

        match self.create_texture_vk(&device, descriptor, false) {
            Ok(texture) => Some(Arc::new(texture)),
            Err(reason) => {
                validation_log!("Unable to allocate a texture ({reason}): {descriptor:?}");
                None
            }
        }
    }

    fn max_texture_size_supported(&self) -> ISize {
        self.max_texture_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::driver::{VulkanDriver, KHR_SWAPCHAIN};
    use crate::graphics::vulkan::instance::InstanceRegistry;
    use crate::graphics::vulkan::software_driver::{DeviceProfile, SoftwareDriver};
    use impeller_core::renderer::{InstanceRetention, PixelFormat, SampleCount};

    fn setup(profile: DeviceProfile) -> (Arc<SoftwareDriver>, Arc<DeviceHolderVK>, AllocatorVK) {
        let driver = Arc::new(SoftwareDriver::new(profile));
        let registry = InstanceRegistry::new();
        let instance = registry.acquire(
            &(driver.clone() as Arc<dyn VulkanDriver>),
            false,
            InstanceRetention::ReleaseWithLastContext,
        );
        let device = Arc::new(DeviceHolderVK::create(instance, &[KHR_SWAPCHAIN]).unwrap());
        let allocator = AllocatorVK::new(&device, true, ISize::new(4096, 4096), 64 * 1024);
        (driver, device, allocator)
    }

    fn transient_target() -> TextureDescriptor {
        TextureDescriptor {
            storage_mode: StorageMode::DeviceTransient,
            format: PixelFormat::R8G8B8A8UNormInt,
            size: ISize::new(64, 64),
            usage: TextureUsage::RENDER_TARGET,
            ..Default::default()
        }
    }

    #[test]
    fn test_host_visible_buffers_share_a_block() {
        // --- 1. ARRANGE ---
        let (_driver, _device, allocator) = setup(DeviceProfile::default());

        // --- 2. ACT ---
        let a = allocator.create_buffer(&DeviceBufferDescriptor::host_visible(100)).unwrap();
        let b = allocator.create_buffer(&DeviceBufferDescriptor::host_visible(100)).unwrap();

        // --- 3. ASSERT ---
        let a = a.downcast_ref::<DeviceBufferVK>().unwrap();
        let b = b.downcast_ref::<DeviceBufferVK>().unwrap();
        assert!(a.is_pooled() && b.is_pooled());
        assert_eq!(a.memory_and_offset().0, b.memory_and_offset().0, "Both should share one block");
        assert_ne!(a.memory_and_offset().1, b.memory_and_offset().1);
        assert_eq!(allocator.pool_block_count(), 1);
    }

    /// The default profile plus a second host-visible type that buffers may
    /// use when the first one is masked out.
    fn profile_with_two_host_types() -> DeviceProfile {
        DeviceProfile::default().with_memory_type(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            1,
        )
    }

    #[test]
    fn test_pool_memory_type_honors_buffer_requirements() {
        // --- 1. ARRANGE ---
        let profile = profile_with_two_host_types().with_buffer_memory_type_mask(!(1 << 1));

        // --- 2. ACT ---
        let (_driver, _device, allocator) = setup(profile);
        let a = allocator.create_buffer(&DeviceBufferDescriptor::host_visible(64)).unwrap();
        let b = allocator.create_buffer(&DeviceBufferDescriptor::host_visible(64)).unwrap();
        a.write(0, &[7; 64]).unwrap();
        b.write(0, &[9; 64]).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(
            allocator.pool_memory_type_index(),
            Some(3),
            "The first host-visible type is not allowed for buffers"
        );
        assert!(a.downcast_ref::<DeviceBufferVK>().unwrap().is_pooled());
        assert!(b.downcast_ref::<DeviceBufferVK>().unwrap().is_pooled());
        assert_eq!(a.read(0, 64).unwrap(), vec![7; 64]);
        assert_eq!(b.read(0, 64).unwrap(), vec![9; 64]);
    }

    #[test]
    fn test_buffers_that_reject_the_pool_type_get_dedicated_memory() {
        // --- 1. ARRANGE ---
        let (driver, _device, allocator) = setup(profile_with_two_host_types());
        assert_eq!(allocator.pool_memory_type_index(), Some(1));
        driver.set_buffer_memory_type_mask(!(1 << 1));

        // --- 2. ACT ---
        let buffer = allocator.create_buffer(&DeviceBufferDescriptor::host_visible(32)).unwrap();
        buffer.write(0, &[3; 32]).unwrap();

        // --- 3. ASSERT ---
        assert!(!buffer.downcast_ref::<DeviceBufferVK>().unwrap().is_pooled());
        assert_eq!(buffer.read(0, 32).unwrap(), vec![3; 32]);
        assert_eq!(allocator.pool_block_count(), 0, "The pool must not have grown");
    }

    #[test]
    fn test_readback_buffers_are_not_pooled() {
        let (_driver, _device, allocator) = setup(DeviceProfile::default());
        let descriptor = DeviceBufferDescriptor {
            readback: true,
            ..DeviceBufferDescriptor::host_visible(100)
        };
        let buffer = allocator.create_buffer(&descriptor).unwrap();
        assert!(!buffer.downcast_ref::<DeviceBufferVK>().unwrap().is_pooled());
    }

    #[test]
    fn test_pooled_buffers_do_not_alias() {
        let (_driver, _device, allocator) = setup(DeviceProfile::default());
        let a = allocator.create_buffer(&DeviceBufferDescriptor::host_visible(16)).unwrap();
        let b = allocator.create_buffer(&DeviceBufferDescriptor::host_visible(16)).unwrap();

        a.write(0, &[1; 16]).unwrap();
        b.write(0, &[2; 16]).unwrap();

        assert_eq!(a.read(0, 16).unwrap(), vec![1; 16]);
        assert!(matches!(
            a.write(10, &[0; 8]),
            Err(ResourceError::OutOfBounds { offset: 10, length: 8, size: 16 })
        ));
    }

    #[test]
    fn test_device_private_buffers_are_not_host_visible() {
        let (_driver, _device, allocator) = setup(DeviceProfile::default());
        let buffer = allocator
            .create_buffer(&DeviceBufferDescriptor {
                storage_mode: StorageMode::DevicePrivate,
                size: 64,
                readback: false,
            })
            .unwrap();
        assert!(matches!(buffer.write(0, &[0; 4]), Err(ResourceError::NotHostVisible)));
    }

    #[test]
    fn test_transient_render_target_is_memoryless_when_supported() {
        let (driver, _device, allocator) = setup(DeviceProfile::default());
        let texture = allocator.create_texture(&transient_target()).unwrap();
        assert!(texture.downcast_ref::<TextureVK>().unwrap().is_memoryless());
        assert_eq!(driver.stats().lazily_allocated_images, 1);
    }

    #[test]
    fn test_transient_render_target_falls_back_silently() {
        let (driver, _device, allocator) =
            setup(DeviceProfile::default().without_lazily_allocated_memory());
        let texture = allocator.create_texture(&transient_target()).unwrap();

        assert!(!texture.downcast_ref::<TextureVK>().unwrap().is_memoryless());
        assert_eq!(driver.stats().lazily_allocated_images, 0);
        assert!(texture.is_valid());
    }

    #[test]
    fn test_invalid_textures_are_rejected() {
        let (_driver, _device, allocator) = setup(DeviceProfile::default());
        let too_big = TextureDescriptor {
            size: ISize::new(8192, 8192),
            ..transient_target()
        };
        assert!(allocator.create_texture(&too_big).is_none());

        let bad_samples = TextureDescriptor {
            sample_count: SampleCount::Count4,
            ..transient_target()
        };
        assert!(allocator.create_texture(&bad_samples).is_none());
    }

    #[test]
    fn test_allocated_bytes_return_to_zero() {
        let (_driver, _device, allocator) = setup(DeviceProfile::default());
        let buffer = allocator
            .create_buffer(&DeviceBufferDescriptor {
                storage_mode: StorageMode::DevicePrivate,
                size: 1000,
                readback: false,
            })
            .unwrap();
        assert!(allocator.allocated_bytes() >= 1000);
        drop(buffer);
        assert_eq!(allocator.allocated_bytes(), 0);
    }
}
