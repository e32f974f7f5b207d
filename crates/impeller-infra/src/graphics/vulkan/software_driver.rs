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

//! A deterministic, in-process implementation of [`VulkanDriver`].
//!
//! The software driver keeps every object in host memory and enforces the
//! validity rules the backend relies on: render pass compatibility when a
//! pipeline is bound, barriers inside a render pass being covered by the
//! subpass self-dependency, descriptor pool capacity, memory types and
//! budgets, pipeline cache identity and object lifetimes across queue
//! submissions. It also exposes statistics and fault injection so that the
//! backend can be exercised without a GPU.
//!
//! Fences never signal on their own. A submission stays in flight until its
//! fence is waited on.

use super::create_info::{
    is_unused, render_passes_compatible, DescriptorResourceVK, DescriptorWriteVK,
    GraphicsPipelineDescriptionVK, RenderPassDescriptionVK,
};
use super::driver::{
    VkResult, VulkanDriver, EXT_PIPELINE_CREATION_FEEDBACK,
    EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS, KHR_PORTABILITY_SUBSET, KHR_SWAPCHAIN,
};
use ash::vk::{self, Handle};
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, CStr, CString};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const CACHE_HEADER_SIZE: usize = 32;
const CACHE_HEADER_VERSION_ONE: u32 = 1;
const CACHE_KEY_SIZE: usize = 16;

type PipelineKey = [u8; CACHE_KEY_SIZE];

/// Packs `name` into a fixed-size, NUL-terminated device name.
pub fn device_name(name: &str) -> [c_char; vk::MAX_PHYSICAL_DEVICE_NAME_SIZE] {
    let mut packed = [0; vk::MAX_PHYSICAL_DEVICE_NAME_SIZE];
    let bytes = name.bytes().take(vk::MAX_PHYSICAL_DEVICE_NAME_SIZE - 1);
    for (dst, src) in packed.iter_mut().zip(bytes) {
        *dst = src as c_char;
    }
    packed
}

/// The physical device the software driver pretends to be.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Identity and limits.
    pub properties: vk::PhysicalDeviceProperties,
    /// Available device extensions.
    pub extensions: Vec<CString>,
    /// Supported formats and their features. Missing formats support nothing.
    pub formats: HashMap<vk::Format, vk::FormatFeatureFlags>,
    /// Memory types, indexed by memory type index.
    pub memory_types: Vec<vk::MemoryType>,
    /// Bytes of non-lazy device memory that can be allocated.
    pub device_memory_budget: u64,
    /// Memory types buffers may be bound to, as a bit mask over
    /// `memory_types`. Lazily allocated types are always excluded.
    pub buffer_memory_type_mask: u32,
}

impl Default for DeviceProfile {
    /// A desktop-class device with framebuffer fetch and memoryless support.
    fn default() -> Self {
        let color = vk::FormatFeatureFlags::COLOR_ATTACHMENT
            | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND
            | vk::FormatFeatureFlags::SAMPLED_IMAGE;
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        let mut formats = HashMap::new();
        for format in [
            vk::Format::R8_UNORM,
            vk::Format::R8G8_UNORM,
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::R8G8B8A8_SRGB,
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::R32G32B32A32_SFLOAT,
            vk::Format::R16G16B16A16_SFLOAT,
        ] {
            formats.insert(format, color);
        }
        for format in [
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D32_SFLOAT,
        ] {
            formats.insert(format, depth);
        }

        let samples = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4;
        Self {
            properties: vk::PhysicalDeviceProperties {
                device_name: device_name("Impeller Software Rasterizer"),
                vendor_id: 0x10005,
                device_id: 0x0001,
                driver_version: 1,
                pipeline_cache_uuid: *b"impeller-soft-01",
                limits: vk::PhysicalDeviceLimits {
                    max_image_dimension2_d: 16384,
                    framebuffer_color_sample_counts: samples,
                    framebuffer_depth_sample_counts: samples,
                    ..Default::default()
                },
                ..Default::default()
            },
            extensions: [
                KHR_SWAPCHAIN,
                EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS,
                EXT_PIPELINE_CREATION_FEEDBACK,
            ]
            .into_iter()
            .map(CStr::to_owned)
            .collect(),
            formats,
            memory_types: vec![
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    heap_index: 0,
                },
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                        | vk::MemoryPropertyFlags::HOST_COHERENT,
                    heap_index: 1,
                },
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL
                        | vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
                    heap_index: 0,
                },
            ],
            device_memory_budget: 256 * 1024 * 1024,
            buffer_memory_type_mask: u32::MAX,
        }
    }
}

impl DeviceProfile {
    /// Removes an extension from the profile.
    pub fn without_extension(mut self, name: &CStr) -> Self {
        self.extensions.retain(|e| e.as_c_str() != name);
        self
    }

    /// Adds an extension to the profile.
    pub fn with_extension(mut self, name: &CStr) -> Self {
        if !self.has_extension(name) {
            self.extensions.push(name.to_owned());
        }
        self
    }

    /// Removes every lazily allocated memory type.
    pub fn without_lazily_allocated_memory(mut self) -> Self {
        self.memory_types
            .retain(|t| !t.property_flags.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED));
        self
    }

    /// Appends a memory type.
    pub fn with_memory_type(mut self, property_flags: vk::MemoryPropertyFlags, heap: u32) -> Self {
        self.memory_types.push(vk::MemoryType {
            property_flags,
            heap_index: heap,
        });
        self
    }

    /// Restricts the memory types buffers may be bound to.
    pub fn with_buffer_memory_type_mask(mut self, mask: u32) -> Self {
        self.buffer_memory_type_mask = mask;
        self
    }

    /// Removes support for `format`.
    pub fn without_format(mut self, format: vk::Format) -> Self {
        self.formats.remove(&format);
        self
    }

    fn has_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == name)
    }
}

/// Failures the driver can be told to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultInjection {
    /// `create_device` fails.
    pub fail_device_creation: bool,
    /// `create_render_pass` fails.
    pub fail_render_pass_creation: bool,
    /// `create_graphics_pipeline` fails.
    pub fail_pipeline_creation: bool,
    /// `create_descriptor_set_layout` fails.
    pub fail_descriptor_set_layout_creation: bool,
    /// `create_pipeline_cache` rejects any non-empty initial data.
    pub reject_pipeline_cache_data: bool,
    /// `create_shader_module` fails.
    pub fail_shader_module_creation: bool,
}

/// Counters collected by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Logical devices created.
    pub devices_created: u64,
    /// Graphics pipelines created, including cache hits.
    pub pipelines_created: u64,
    /// Pipelines whose compilation was served from a pipeline cache.
    pub pipeline_cache_hits: u64,
    /// Compilations started while an identical one was still running.
    pub overlapping_compilations: u64,
    /// Render passes created.
    pub render_passes_created: u64,
    /// Shader modules created.
    pub shader_modules_created: u64,
    /// Buffers created.
    pub buffers_created: u64,
    /// Images created.
    pub images_created: u64,
    /// Images bound to lazily allocated memory.
    pub lazily_allocated_images: u64,
    /// Memory allocations made.
    pub memory_allocations: u64,
    /// Bytes of non-lazy memory currently allocated.
    pub live_memory_bytes: u64,
    /// Descriptor pools created.
    pub descriptor_pools_created: u64,
    /// Descriptor sets allocated.
    pub descriptor_sets_allocated: u64,
    /// Pipeline barriers recorded.
    pub pipeline_barriers: u64,
    /// Draws recorded.
    pub draws: u64,
    /// Command buffers submitted without errors.
    pub submissions: u64,
    /// Fences waited on until signaled.
    pub fences_waited: u64,
    /// Command buffers, framebuffers, descriptor pools or fences destroyed
    /// while a submission using them was still pending.
    pub objects_destroyed_in_flight: u64,
    /// Calls made with a device that was already destroyed.
    pub calls_on_destroyed_device: u64,
    /// Objects still alive when their device was destroyed.
    pub objects_leaked_at_device_destroy: u64,
    /// Invalid usage recorded in submitted command buffers.
    pub command_errors: Vec<String>,
}

#[derive(Debug)]
struct MemoryObject {
    type_index: u32,
    size: u64,
    lazy: bool,
    host_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
struct ImageObject {
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    samples: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
}

#[derive(Debug)]
struct PipelineObject {
    render_pass: RenderPassDescriptionVK,
}

#[derive(Debug)]
struct DescriptorPoolObject {
    remaining_sets: u32,
    remaining: HashMap<vk::DescriptorType, u32>,
}

#[derive(Debug)]
struct FramebufferObject {
    render_pass: RenderPassDescriptionVK,
}

#[derive(Debug, Default)]
struct CommandBufferState {
    current_pass: Option<RenderPassDescriptionVK>,
    bound_pipeline: Option<vk::Pipeline>,
    framebuffers: HashSet<vk::Framebuffer>,
    descriptor_pools: HashSet<vk::DescriptorPool>,
    errors: Vec<String>,
}

/// The objects a pending submission uses.
#[derive(Debug)]
struct InFlight {
    command_buffer: vk::CommandBuffer,
    framebuffers: HashSet<vk::Framebuffer>,
    descriptor_pools: HashSet<vk::DescriptorPool>,
}

#[derive(Debug, Default)]
struct DriverState {
    live_devices: HashSet<vk::Device>,
    buffers: HashMap<vk::Buffer, u64>,
    images: HashMap<vk::Image, ImageObject>,
    memory: HashMap<vk::DeviceMemory, MemoryObject>,
    shader_modules: HashMap<vk::ShaderModule, PipelineKey>,
    set_layouts: HashMap<vk::DescriptorSetLayout, Vec<(vk::DescriptorType, u32)>>,
    pipeline_layouts: HashSet<vk::PipelineLayout>,
    render_passes: HashMap<vk::RenderPass, RenderPassDescriptionVK>,
    pipeline_caches: HashMap<vk::PipelineCache, HashSet<PipelineKey>>,
    pipelines: HashMap<vk::Pipeline, PipelineObject>,
    compiling: HashMap<PipelineKey, usize>,
    descriptor_pools: HashMap<vk::DescriptorPool, DescriptorPoolObject>,
    descriptor_sets: HashMap<vk::DescriptorSet, vk::DescriptorPool>,
    framebuffers: HashMap<vk::Framebuffer, FramebufferObject>,
    command_buffers: HashMap<vk::CommandBuffer, CommandBufferState>,
    /// `None` once signaled.
    fences: HashMap<vk::Fence, Option<InFlight>>,
    stats: DriverStats,
}

impl DriverState {
    fn live_object_count(&self) -> usize {
        self.buffers.len()
            + self.images.len()
            + self.memory.len()
            + self.shader_modules.len()
            + self.set_layouts.len()
            + self.pipeline_layouts.len()
            + self.render_passes.len()
            + self.pipeline_caches.len()
            + self.pipelines.len()
            + self.descriptor_pools.len()
            + self.framebuffers.len()
            + self.fences.len()
    }

    fn is_in_flight(&self, uses: impl Fn(&InFlight) -> bool) -> bool {
        self.fences.values().flatten().any(uses)
    }

    fn destroying(&mut self, what: &str, in_flight: bool) {
        if in_flight {
            log::error!("{what} destroyed while a submission using it is pending.");
            self.stats.objects_destroyed_in_flight += 1;
        }
    }
}

/// A Vulkan driver that runs entirely on the host.
#[derive(Debug)]
pub struct SoftwareDriver {
    profile: DeviceProfile,
    compile_delay: Duration,
    buffer_memory_type_mask: AtomicU32,
    faults: Mutex<FaultInjection>,
    state: Mutex<DriverState>,
    next_handle: AtomicU64,
}

impl Default for SoftwareDriver {
    fn default() -> Self {
        Self::new(DeviceProfile::default())
    }
}

impl SoftwareDriver {
    /// Creates a driver for `profile`.
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            buffer_memory_type_mask: AtomicU32::new(profile.buffer_memory_type_mask),
            profile,
            compile_delay: Duration::ZERO,
            faults: Mutex::new(FaultInjection::default()),
            state: Mutex::new(DriverState::default()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Makes every uncached pipeline compilation take `delay`.
    pub fn with_compile_delay(mut self, delay: Duration) -> Self {
        self.compile_delay = delay;
        self
    }

    /// Replaces the active faults.
    pub fn set_faults(&self, faults: FaultInjection) {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner) = faults;
    }

    /// Changes the memory types buffers created from now on may be bound to.
    pub fn set_buffer_memory_type_mask(&self, mask: u32) {
        self.buffer_memory_type_mask.store(mask, Ordering::Relaxed);
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> DriverStats {
        self.lock().stats.clone()
    }

    /// Submissions whose fence has not been waited on yet.
    pub fn pending_submissions(&self) -> usize {
        self.lock().fences.values().flatten().count()
    }

    /// The profile this driver was created with.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    fn faults(&self) -> FaultInjection {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next<T: Handle>(&self) -> T {
        T::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Records a call on a dead device. Returns `false` if `device` is gone.
    fn check_device(state: &mut DriverState, device: vk::Device, call: &str) -> bool {
        if state.live_devices.contains(&device) {
            return true;
        }
        state.stats.calls_on_destroyed_device += 1;
        log::error!("{call} called with destroyed or unknown device {device:?}.");
        false
    }

    fn bytes_per_pixel(format: vk::Format) -> u64 {
        match format {
            vk::Format::UNDEFINED => 0,
            vk::Format::R8_UNORM | vk::Format::S8_UINT => 1,
            vk::Format::R8G8_UNORM => 2,
            vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::R16G16B16A16_SFLOAT
            | vk::Format::R32G32_SFLOAT => 8,
            vk::Format::R32G32B32_SFLOAT => 12,
            vk::Format::R32G32B32A32_SFLOAT => 16,
            _ => 4,
        }
    }

    fn memory_type_bits(&self, include: impl Fn(vk::MemoryPropertyFlags) -> bool) -> u32 {
        self.profile
            .memory_types
            .iter()
            .enumerate()
            .filter(|(_, t)| include(t.property_flags))
            .fold(0, |bits, (i, _)| bits | (1 << i))
    }

    fn buffer_memory_type_bits(&self) -> u32 {
        self.memory_type_bits(|f| !f.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED))
            & self.buffer_memory_type_mask.load(Ordering::Relaxed)
    }

    fn image_memory_type_bits(&self, usage: vk::ImageUsageFlags) -> u32 {
        let transient = usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT);
        self.memory_type_bits(|f| {
            f.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
                && (transient || !f.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED))
        })
    }

    fn pipeline_key(
        state: &DriverState,
        description: &GraphicsPipelineDescriptionVK,
        render_pass: &RenderPassDescriptionVK,
    ) -> PipelineKey {
        // Handles differ between runs. Hash shader contents instead.
        let mut hasher = blake3::Hasher::new();
        for stage in &description.stages {
            let code = state
                .shader_modules
                .get(&stage.module)
                .copied()
                .unwrap_or_default();
            hasher.update(&code);
            hasher.update(format!("{:?}{}", stage.stage, stage.entry_point).as_bytes());
        }
        let mut normalized = description.clone();
        normalized.stages.clear();
        normalized.layout = vk::PipelineLayout::null();
        normalized.render_pass = vk::RenderPass::null();
        hasher.update(format!("{normalized:?}{render_pass:?}").as_bytes());
        let mut key = [0u8; CACHE_KEY_SIZE];
        key.copy_from_slice(&hasher.finalize().as_bytes()[..CACHE_KEY_SIZE]);
        key
    }

    fn cache_header(&self) -> Vec<u8> {
        let props = &self.profile.properties;
        let mut header = Vec::with_capacity(CACHE_HEADER_SIZE);
        header.extend_from_slice(&(CACHE_HEADER_SIZE as u32).to_le_bytes());
        header.extend_from_slice(&CACHE_HEADER_VERSION_ONE.to_le_bytes());
        header.extend_from_slice(&props.vendor_id.to_le_bytes());
        header.extend_from_slice(&props.device_id.to_le_bytes());
        header.extend_from_slice(&props.pipeline_cache_uuid);
        header
    }

    fn parse_cache_data(&self, data: &[u8]) -> VkResult<HashSet<PipelineKey>> {
        if data.is_empty() {
            return Ok(HashSet::new());
        }
        if data.len() < CACHE_HEADER_SIZE + 4
            || data[..CACHE_HEADER_SIZE] != self.cache_header()[..]
        {
            log::warn!("Pipeline cache data was produced by another device or driver.");
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let mut count_bytes = [0u8; 4];
        count_bytes.copy_from_slice(&data[CACHE_HEADER_SIZE..CACHE_HEADER_SIZE + 4]);
        let count = u32::from_le_bytes(count_bytes) as usize;
        let entries = &data[CACHE_HEADER_SIZE + 4..];
        if entries.len() != count * CACHE_KEY_SIZE {
            log::warn!("Pipeline cache data is truncated.");
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(entries
            .chunks_exact(CACHE_KEY_SIZE)
            .map(|chunk| {
                let mut key = [0u8; CACHE_KEY_SIZE];
                key.copy_from_slice(chunk);
                key
            })
            .collect())
    }

    fn record_error(state: &mut DriverState, command_buffer: vk::CommandBuffer, message: String) {
        log::error!("Invalid command buffer usage: {message}");
        if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
            cb.errors.push(message);
        }
    }
}

impl VulkanDriver for SoftwareDriver {
    fn physical_device_properties(&self) -> vk::PhysicalDeviceProperties {
        self.profile.properties
    }

    fn enumerate_device_extensions(&self) -> Vec<CString> {
        self.profile.extensions.clone()
    }

    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        self.profile
            .formats
            .get(&format)
            .copied()
            .unwrap_or(vk::FormatFeatureFlags::empty())
    }

    fn memory_types(&self) -> Vec<vk::MemoryType> {
        self.profile.memory_types.clone()
    }

    fn create_device(&self, enabled_extensions: &[&CStr]) -> VkResult<vk::Device> {
        if self.faults().fail_device_creation {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        if let Some(missing) = enabled_extensions
            .iter()
            .find(|name| !self.profile.has_extension(name))
        {
            log::error!("Device extension {missing:?} is not present.");
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        let device: vk::Device = self.next();
        let mut state = self.lock();
        state.live_devices.insert(device);
        state.stats.devices_created += 1;
        Ok(device)
    }

    fn destroy_device(&self, device: vk::Device) {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkDestroyDevice") {
            return;
        }
        let leaked = state.live_object_count() as u64;
        if leaked > 0 {
            log::warn!("{leaked} objects still alive when destroying {device:?}.");
        }
        state.stats.objects_leaked_at_device_destroy += leaked;
        state.live_devices.remove(&device);
    }

    fn create_buffer(
        &self,
        device: vk::Device,
        info: &vk::BufferCreateInfo<'_>,
    ) -> VkResult<vk::Buffer> {
        if info.size == 0 {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        let buffer: vk::Buffer = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreateBuffer") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        state.buffers.insert(buffer, info.size);
        state.stats.buffers_created += 1;
        Ok(buffer)
    }

    fn destroy_buffer(&self, device: vk::Device, buffer: vk::Buffer) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyBuffer") {
            state.buffers.remove(&buffer);
        }
    }

    fn buffer_memory_requirements(
        &self,
        device: vk::Device,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements {
        let size = {
            let mut state = self.lock();
            Self::check_device(&mut state, device, "vkGetBufferMemoryRequirements");
            state.buffers.get(&buffer).copied().unwrap_or(0)
        };
        vk::MemoryRequirements {
            size: size.next_multiple_of(16),
            alignment: 64,
            memory_type_bits: self.buffer_memory_type_bits(),
        }
    }

    fn create_image(
        &self,
        device: vk::Device,
        info: &vk::ImageCreateInfo<'_>,
    ) -> VkResult<vk::Image> {
        let max = self.profile.properties.limits.max_image_dimension2_d;
        let extent = info.extent;
        if extent.width == 0 || extent.height == 0 || extent.width > max || extent.height > max {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        let features = self.format_features(info.format);
        let needs = if info.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        } else if info.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
            vk::FormatFeatureFlags::COLOR_ATTACHMENT
        } else {
            vk::FormatFeatureFlags::SAMPLED_IMAGE
        };
        if !features.contains(needs) {
            return Err(vk::Result::ERROR_FORMAT_NOT_SUPPORTED);
        }
        let image: vk::Image = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreateImage") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        state.images.insert(
            image,
            ImageObject {
                format: info.format,
                extent,
                mip_levels: info.mip_levels,
                array_layers: info.array_layers,
                samples: info.samples,
                usage: info.usage,
            },
        );
        state.stats.images_created += 1;
        Ok(image)
    }

    fn destroy_image(&self, device: vk::Device, image: vk::Image) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyImage") {
            state.images.remove(&image);
        }
    }

    fn image_memory_requirements(
        &self,
        device: vk::Device,
        image: vk::Image,
    ) -> vk::MemoryRequirements {
        let info = {
            let mut state = self.lock();
            Self::check_device(&mut state, device, "vkGetImageMemoryRequirements");
            state.images.get(&image).copied()
        };
        let Some(info) = info else {
            return vk::MemoryRequirements {
                size: 0,
                alignment: 1,
                memory_type_bits: 0,
            };
        };
        let mut size = 0u64;
        let (mut w, mut h) = (info.extent.width as u64, info.extent.height as u64);
        for _ in 0..info.mip_levels.max(1) {
            size += w * h;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        size *= Self::bytes_per_pixel(info.format)
            * info.samples.as_raw() as u64
            * info.array_layers.max(1) as u64;
        vk::MemoryRequirements {
            size: size.next_multiple_of(4096),
            alignment: 4096,
            memory_type_bits: self.image_memory_type_bits(info.usage),
        }
    }

    fn allocate_memory(
        &self,
        device: vk::Device,
        size: u64,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory> {
        let Some(memory_type) = self.profile.memory_types.get(memory_type_index as usize) else {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        };
        let lazy = memory_type
            .property_flags
            .contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED);
        let host_visible = memory_type
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE);

        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkAllocateMemory") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        if !lazy && state.stats.live_memory_bytes + size > self.profile.device_memory_budget {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let memory: vk::DeviceMemory = self.next();
        state.memory.insert(
            memory,
            MemoryObject {
                type_index: memory_type_index,
                size,
                lazy,
                host_data: host_visible.then(|| vec![0; size as usize]),
            },
        );
        state.stats.memory_allocations += 1;
        if !lazy {
            state.stats.live_memory_bytes += size;
        }
        Ok(memory)
    }

    fn free_memory(&self, device: vk::Device, memory: vk::DeviceMemory) {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkFreeMemory") {
            return;
        }
        if let Some(object) = state.memory.remove(&memory) {
            if !object.lazy {
                state.stats.live_memory_bytes -= object.size;
            }
        }
    }

    fn bind_buffer_memory(
        &self,
        device: vk::Device,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> VkResult<()> {
        let allowed = self.buffer_memory_type_bits();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkBindBufferMemory") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let (Some(size), Some(mem)) = (state.buffers.get(&buffer), state.memory.get(&memory))
        else {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        };
        if allowed & (1 << mem.type_index) == 0 {
            log::error!(
                "Buffer {buffer:?} bound to memory type {} outside its allowed types {allowed:#b}.",
                mem.type_index
            );
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        if offset + size > mem.size || mem.lazy {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        Ok(())
    }

    fn bind_image_memory(
        &self,
        device: vk::Device,
        image: vk::Image,
        memory: vk::DeviceMemory,
        _offset: u64,
    ) -> VkResult<()> {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkBindImageMemory") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let Some(info) = state.images.get(&image).copied() else {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        };
        let Some((lazy, type_index)) = state.memory.get(&memory).map(|m| (m.lazy, m.type_index))
        else {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        };
        if self.image_memory_type_bits(info.usage) & (1 << type_index) == 0 {
            log::error!("Image {image:?} bound to disallowed memory type {type_index}.");
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        if lazy {
            state.stats.lazily_allocated_images += 1;
        }
        Ok(())
    }

    fn write_memory(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        offset: u64,
        data: &[u8],
    ) -> VkResult<()> {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkMapMemory") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let bytes = state
            .memory
            .get_mut(&memory)
            .and_then(|m| m.host_data.as_mut())
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_memory(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        offset: u64,
        len: u64,
    ) -> VkResult<Vec<u8>> {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkMapMemory") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let bytes = state
            .memory
            .get(&memory)
            .and_then(|m| m.host_data.as_ref())
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        let start = offset as usize;
        let end = start + len as usize;
        bytes
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)
    }

    fn create_shader_module(
        &self,
        device: vk::Device,
        code: &[u8],
    ) -> VkResult<vk::ShaderModule> {
        if self.faults().fail_shader_module_creation || code.len() < 4 || code.len() % 4 != 0 {
            return Err(vk::Result::ERROR_INVALID_SHADER_NV);
        }
        let mut digest = [0u8; CACHE_KEY_SIZE];
        digest.copy_from_slice(&blake3::hash(code).as_bytes()[..CACHE_KEY_SIZE]);
        let module: vk::ShaderModule = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreateShaderModule") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        state.shader_modules.insert(module, digest);
        state.stats.shader_modules_created += 1;
        Ok(module)
    }

    fn destroy_shader_module(&self, device: vk::Device, module: vk::ShaderModule) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyShaderModule") {
            state.shader_modules.remove(&module);
        }
    }

    fn create_descriptor_set_layout(
        &self,
        device: vk::Device,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> VkResult<vk::DescriptorSetLayout> {
        if self.faults().fail_descriptor_set_layout_creation {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let mut seen = HashSet::new();
        if !bindings.iter().all(|b| seen.insert(b.binding)) {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        let layout: vk::DescriptorSetLayout = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreateDescriptorSetLayout") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let counts = bindings
            .iter()
            .map(|b| (b.descriptor_type, b.descriptor_count))
            .collect();
        state.set_layouts.insert(layout, counts);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, device: vk::Device, layout: vk::DescriptorSetLayout) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyDescriptorSetLayout") {
            state.set_layouts.remove(&layout);
        }
    }

    fn create_pipeline_layout(
        &self,
        device: vk::Device,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout> {
        let layout: vk::PipelineLayout = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreatePipelineLayout") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        if !set_layouts.iter().all(|l| state.set_layouts.contains_key(l)) {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        state.pipeline_layouts.insert(layout);
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, device: vk::Device, layout: vk::PipelineLayout) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyPipelineLayout") {
            state.pipeline_layouts.remove(&layout);
        }
    }

    fn create_render_pass(
        &self,
        device: vk::Device,
        description: &RenderPassDescriptionVK,
    ) -> VkResult<vk::RenderPass> {
        if self.faults().fail_render_pass_creation {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        if description.subpasses.is_empty() {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        let count = description.attachments.len() as u32;
        let in_range = |r: &vk::AttachmentReference| is_unused(r) || r.attachment < count;
        for subpass in &description.subpasses {
            let refs_valid = subpass
                .input_attachments
                .iter()
                .chain(&subpass.color_attachments)
                .chain(&subpass.resolve_attachments)
                .chain(subpass.depth_stencil_attachment.iter())
                .all(in_range);
            let resolves_parallel = subpass.resolve_attachments.is_empty()
                || subpass.resolve_attachments.len() == subpass.color_attachments.len();
            if !refs_valid || !resolves_parallel {
                return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
            }
        }
        let render_pass: vk::RenderPass = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreateRenderPass") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        state.render_passes.insert(render_pass, description.clone());
        state.stats.render_passes_created += 1;
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, device: vk::Device, render_pass: vk::RenderPass) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyRenderPass") {
            state.render_passes.remove(&render_pass);
        }
    }

    fn create_pipeline_cache(
        &self,
        device: vk::Device,
        initial_data: &[u8],
    ) -> VkResult<vk::PipelineCache> {
        if !initial_data.is_empty() && self.faults().reject_pipeline_cache_data {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let keys = self.parse_cache_data(initial_data)?;
        let cache: vk::PipelineCache = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreatePipelineCache") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        state.pipeline_caches.insert(cache, keys);
        Ok(cache)
    }

    fn get_pipeline_cache_data(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
    ) -> VkResult<Vec<u8>> {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkGetPipelineCacheData") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let keys = state
            .pipeline_caches
            .get(&cache)
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        let mut sorted: Vec<_> = keys.iter().collect();
        sorted.sort();
        let mut data = self.cache_header();
        data.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
        for key in sorted {
            data.extend_from_slice(key);
        }
        Ok(data)
    }

    fn destroy_pipeline_cache(&self, device: vk::Device, cache: vk::PipelineCache) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyPipelineCache") {
            state.pipeline_caches.remove(&cache);
        }
    }

    fn create_graphics_pipeline(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
        description: &GraphicsPipelineDescriptionVK,
    ) -> VkResult<(vk::Pipeline, vk::PipelineCreationFeedback)> {
        if self.faults().fail_pipeline_creation {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let started = Instant::now();
        let (key, render_pass, cached) = {
            let mut state = self.lock();
            if !Self::check_device(&mut state, device, "vkCreateGraphicsPipelines") {
                return Err(vk::Result::ERROR_DEVICE_LOST);
            }
            let Some(render_pass) = state.render_passes.get(&description.render_pass).cloned()
            else {
                log::error!(
                    "Pipeline created against unknown render pass {:?}.",
                    description.render_pass
                );
                return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
            };
            let modules_known = description
                .stages
                .iter()
                .all(|s| state.shader_modules.contains_key(&s.module));
            if !state.pipeline_layouts.contains(&description.layout)
                || description.stages.is_empty()
                || !modules_known
            {
                return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
            }
            let subpass = render_pass
                .subpasses
                .get(description.subpass as usize)
                .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
            let samples_match = subpass
                .color_attachments
                .iter()
                .chain(subpass.depth_stencil_attachment.iter())
                .filter(|r| !is_unused(r))
                .filter_map(|r| render_pass.attachments.get(r.attachment as usize))
                .all(|a| a.samples == description.rasterization_samples);
            if !samples_match {
                log::error!("Pipeline rasterization samples disagree with its render pass.");
                return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
            }
            if description.topology == vk::PrimitiveTopology::TRIANGLE_FAN
                && self.profile.has_extension(KHR_PORTABILITY_SUBSET)
            {
                return Err(vk::Result::ERROR_FEATURE_NOT_PRESENT);
            }
            let key = Self::pipeline_key(&state, description, &render_pass);
            let cached = state
                .pipeline_caches
                .get(&cache)
                .is_some_and(|keys| keys.contains(&key));
            let running = {
                let running = state.compiling.entry(key).or_default();
                *running += 1;
                *running
            };
            if running > 1 {
                state.stats.overlapping_compilations += 1;
            }
            (key, render_pass, cached)
        };

        if !cached && !self.compile_delay.is_zero() {
            std::thread::sleep(self.compile_delay);
        }

        let pipeline: vk::Pipeline = self.next();
        let mut state = self.lock();
        let finished = state.compiling.get_mut(&key).is_some_and(|running| {
            *running -= 1;
            *running == 0
        });
        if finished {
            state.compiling.remove(&key);
        }
        if let Some(keys) = state.pipeline_caches.get_mut(&cache) {
            keys.insert(key);
        }
        state.pipelines.insert(pipeline, PipelineObject { render_pass });
        state.stats.pipelines_created += 1;
        let mut flags = vk::PipelineCreationFeedbackFlags::VALID;
        if cached {
            state.stats.pipeline_cache_hits += 1;
            flags |= vk::PipelineCreationFeedbackFlags::APPLICATION_PIPELINE_CACHE_HIT;
        }
        Ok((
            pipeline,
            vk::PipelineCreationFeedback {
                flags,
                duration: started.elapsed().as_nanos() as u64,
            },
        ))
    }

    fn destroy_pipeline(&self, device: vk::Device, pipeline: vk::Pipeline) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyPipeline") {
            state.pipelines.remove(&pipeline);
        }
    }

    fn create_descriptor_pool(
        &self,
        device: vk::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        if max_sets == 0 {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        let pool: vk::DescriptorPool = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreateDescriptorPool") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let mut remaining = HashMap::new();
        for size in pool_sizes {
            *remaining.entry(size.ty).or_insert(0) += size.descriptor_count;
        }
        state.descriptor_pools.insert(
            pool,
            DescriptorPoolObject {
                remaining_sets: max_sets,
                remaining,
            },
        );
        state.stats.descriptor_pools_created += 1;
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyDescriptorPool") {
            let in_flight = state.is_in_flight(|f| f.descriptor_pools.contains(&pool));
            state.destroying("Descriptor pool", in_flight);
            state.descriptor_pools.remove(&pool);
            state.descriptor_sets.retain(|_, owner| *owner != pool);
        }
    }

    fn allocate_descriptor_set(
        &self,
        device: vk::Device,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let set: vk::DescriptorSet = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkAllocateDescriptorSets") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let Some(bindings) = state.set_layouts.get(&layout).cloned() else {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        };
        let pool_object = state
            .descriptor_pools
            .get_mut(&pool)
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        if pool_object.remaining_sets == 0 {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        let mut needed: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for (ty, count) in &bindings {
            *needed.entry(*ty).or_insert(0) += count;
        }
        let fits = needed
            .iter()
            .all(|(ty, n)| pool_object.remaining.get(ty).copied().unwrap_or(0) >= *n);
        if !fits {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        for (ty, n) in needed {
            if let Some(left) = pool_object.remaining.get_mut(&ty) {
                *left -= n;
            }
        }
        pool_object.remaining_sets -= 1;
        state.descriptor_sets.insert(set, pool);
        state.stats.descriptor_sets_allocated += 1;
        Ok(set)
    }

    fn update_descriptor_sets(&self, device: vk::Device, writes: &[DescriptorWriteVK]) {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkUpdateDescriptorSets") {
            return;
        }
        for write in writes {
            let exists = match write.resource {
                DescriptorResourceVK::Buffer(info) => state.buffers.contains_key(&info.buffer),
                DescriptorResourceVK::Image { image, .. } => state.images.contains_key(&image),
            };
            if !exists || !state.descriptor_sets.contains_key(&write.dst_set) {
                log::error!(
                    "Descriptor write to binding {} references a dead object.",
                    write.dst_binding
                );
            }
        }
    }

    fn create_framebuffer(
        &self,
        device: vk::Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::Image],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let framebuffer: vk::Framebuffer = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkCreateFramebuffer") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let description = state
            .render_passes
            .get(&render_pass)
            .cloned()
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        if description.attachments.len() != attachments.len() {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        for (image, attachment) in attachments.iter().zip(&description.attachments) {
            let Some(image_info) = state.images.get(image) else {
                return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
            };
            if image_info.format != attachment.format
                || image_info.samples != attachment.samples
                || image_info.extent.width != extent.width
                || image_info.extent.height != extent.height
            {
                log::error!("Framebuffer attachment {image:?} does not match its render pass.");
                return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
            }
        }
        state.framebuffers.insert(
            framebuffer,
            FramebufferObject {
                render_pass: description,
            },
        );
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, device: vk::Device, framebuffer: vk::Framebuffer) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyFramebuffer") {
            let in_flight = state.is_in_flight(|f| f.framebuffers.contains(&framebuffer));
            state.destroying("Framebuffer", in_flight);
            state.framebuffers.remove(&framebuffer);
        }
    }

    fn allocate_command_buffer(&self, device: vk::Device) -> VkResult<vk::CommandBuffer> {
        let command_buffer: vk::CommandBuffer = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkAllocateCommandBuffers") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        state
            .command_buffers
            .insert(command_buffer, CommandBufferState::default());
        Ok(command_buffer)
    }

    fn free_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkFreeCommandBuffers") {
            let in_flight = state.is_in_flight(|f| f.command_buffer == command_buffer);
            state.destroying("Command buffer", in_flight);
            state.command_buffers.remove(&command_buffer);
        }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        clear_values: &[vk::ClearValue],
    ) {
        let mut state = self.lock();
        let pass = state.render_passes.get(&render_pass).cloned();
        let fb_pass = state
            .framebuffers
            .get(&framebuffer)
            .map(|f| f.render_pass.clone());
        let (Some(pass), Some(fb_pass)) = (pass, fb_pass) else {
            let message = "Begin with unknown render pass or framebuffer.".to_string();
            Self::record_error(&mut state, command_buffer, message);
            return;
        };
        if !render_passes_compatible(&pass, &fb_pass) {
            let message = "Framebuffer is not compatible with the render pass.".to_string();
            Self::record_error(&mut state, command_buffer, message);
        }
        let clear = vk::AttachmentLoadOp::CLEAR;
        let clears_needed = pass
            .attachments
            .iter()
            .rposition(|a| a.load_op == clear || a.stencil_load_op == clear)
            .map_or(0, |index| index + 1);
        if clear_values.len() < clears_needed {
            let message = format!(
                "{} clear values given, {clears_needed} attachments are cleared.",
                clear_values.len()
            );
            Self::record_error(&mut state, command_buffer, message);
        }
        if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
            if cb.current_pass.is_some() {
                cb.errors
                    .push("Render pass begun inside another render pass.".into());
            }
            cb.current_pass = Some(pass);
            cb.bound_pipeline = None;
            cb.framebuffers.insert(framebuffer);
        }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        let mut state = self.lock();
        let pipeline_pass = state
            .pipelines
            .get(&pipeline)
            .map(|p| p.render_pass.clone());
        let current = state
            .command_buffers
            .get(&command_buffer)
            .and_then(|cb| cb.current_pass.clone());
        let error = match (pipeline_pass, current) {
            (None, _) => Some(format!("Bound unknown pipeline {pipeline:?}.")),
            (_, None) => Some("Pipeline bound outside of a render pass.".to_string()),
            (Some(p), Some(c)) if !render_passes_compatible(&p, &c) => Some(format!(
                "Pipeline {pipeline:?} is not compatible with the current render pass."
            )),
            _ => None,
        };
        match error {
            Some(message) => Self::record_error(&mut state, command_buffer, message),
            None => {
                if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
                    cb.bound_pipeline = Some(pipeline);
                }
            }
        }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        let mut state = self.lock();
        if !state.pipeline_layouts.contains(&layout) {
            Self::record_error(&mut state, command_buffer, "Unknown pipeline layout.".into());
        }
        let pools: Vec<_> = sets
            .iter()
            .filter_map(|set| state.descriptor_sets.get(set).copied())
            .collect();
        if pools.len() != sets.len() {
            let message = "Bound a descriptor set that was never allocated.".to_string();
            Self::record_error(&mut state, command_buffer, message);
        }
        if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
            cb.descriptor_pools.extend(pools);
        }
    }

    fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let mut state = self.lock();
        state.stats.pipeline_barriers += 1;
        let current = state
            .command_buffers
            .get(&command_buffer)
            .and_then(|cb| cb.current_pass.clone());
        let Some(pass) = current else {
            return;
        };
        // Inside a render pass a barrier must be covered by a self-dependency.
        let covered = pass.dependencies.iter().any(|dep| {
            dep.src_subpass == 0
                && dep.dst_subpass == 0
                && dep.dependency_flags == dependency_flags
                && dep.src_stage_mask.contains(src_stage_mask)
                && dep.dst_stage_mask.contains(dst_stage_mask)
                && image_barriers.iter().all(|b| {
                    dep.src_access_mask.contains(b.src_access_mask)
                        && dep.dst_access_mask.contains(b.dst_access_mask)
                })
        });
        if !covered {
            let message =
                "Barrier inside a render pass is not covered by a subpass self-dependency.";
            Self::record_error(&mut state, command_buffer, message.to_string());
        }
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        _vertex_count: u32,
        _instance_count: u32,
    ) {
        let mut state = self.lock();
        let bound = state
            .command_buffers
            .get(&command_buffer)
            .is_some_and(|cb| cb.current_pass.is_some() && cb.bound_pipeline.is_some());
        if bound {
            state.stats.draws += 1;
        } else {
            let message = "Draw without a bound pipeline.".to_string();
            Self::record_error(&mut state, command_buffer, message);
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        let mut state = self.lock();
        let ended = state
            .command_buffers
            .get_mut(&command_buffer)
            .and_then(|cb| cb.current_pass.take())
            .is_some();
        if !ended {
            let message = "End without a render pass.".to_string();
            Self::record_error(&mut state, command_buffer, message);
        }
    }

    fn queue_submit(
        &self,
        device: vk::Device,
        command_buffer: vk::CommandBuffer,
    ) -> VkResult<vk::Fence> {
        let fence: vk::Fence = self.next();
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkQueueSubmit") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let Some(cb) = state.command_buffers.get_mut(&command_buffer) else {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        };
        if cb.current_pass.is_some() {
            cb.errors.push("Submitted inside a render pass.".into());
        }
        let errors = std::mem::take(&mut cb.errors);
        let in_flight = InFlight {
            command_buffer,
            framebuffers: std::mem::take(&mut cb.framebuffers),
            descriptor_pools: std::mem::take(&mut cb.descriptor_pools),
        };
        if !errors.is_empty() {
            state.stats.command_errors.extend(errors);
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        state.fences.insert(fence, Some(in_flight));
        state.stats.submissions += 1;
        Ok(fence)
    }

    fn wait_for_fence(&self, device: vk::Device, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.lock();
        if !Self::check_device(&mut state, device, "vkWaitForFences") {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        match state.fences.get_mut(&fence) {
            Some(status) => {
                if status.take().is_some() {
                    state.stats.fences_waited += 1;
                }
                Ok(())
            }
            None => Err(vk::Result::ERROR_VALIDATION_FAILED_EXT),
        }
    }

    fn destroy_fence(&self, device: vk::Device, fence: vk::Fence) {
        let mut state = self.lock();
        if Self::check_device(&mut state, device, "vkDestroyFence") {
            let pending = state.fences.remove(&fence).flatten().is_some();
            state.destroying("Fence", pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(driver: &SoftwareDriver) -> vk::Device {
        driver.create_device(&[KHR_SWAPCHAIN]).unwrap()
    }

    fn uniform_layout(driver: &SoftwareDriver, device: vk::Device) -> vk::DescriptorSetLayout {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX);
        driver.create_descriptor_set_layout(device, &[binding]).unwrap()
    }

    #[test]
    fn test_missing_extension_fails_device_creation() {
        let profile = DeviceProfile::default().without_extension(KHR_SWAPCHAIN);
        let driver = SoftwareDriver::new(profile);
        assert_eq!(
            driver.create_device(&[KHR_SWAPCHAIN]),
            Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
        );
    }

    #[test]
    fn test_cache_data_round_trips_and_rejects_foreign_headers() {
        // --- 1. ARRANGE ---
        let driver = SoftwareDriver::default();
        let device = device(&driver);
        let cache = driver.create_pipeline_cache(device, &[]).unwrap();
        let data = driver.get_pipeline_cache_data(device, cache).unwrap();

        // --- 2. ACT & ASSERT ---
        assert!(driver.create_pipeline_cache(device, &data).is_ok());

        let mut foreign = data.clone();
        foreign[8] ^= 0xFF;
        assert_eq!(
            driver.create_pipeline_cache(device, &foreign),
            Err(vk::Result::ERROR_INITIALIZATION_FAILED),
            "A cache from another vendor must be rejected"
        );
    }

    #[test]
    fn test_memory_budget_is_enforced() {
        let mut profile = DeviceProfile::default();
        profile.device_memory_budget = 1024;
        let driver = SoftwareDriver::new(profile);
        let device = device(&driver);
        assert!(driver.allocate_memory(device, 1024, 0).is_ok());
        assert_eq!(
            driver.allocate_memory(device, 1, 0),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        );
        // Lazily allocated memory does not count.
        assert!(driver.allocate_memory(device, 1 << 20, 2).is_ok());
    }

    #[test]
    fn test_binding_a_buffer_to_a_disallowed_memory_type_fails() {
        // --- 1. ARRANGE ---
        let profile = DeviceProfile::default().with_buffer_memory_type_mask(!(1 << 1));
        let driver = SoftwareDriver::new(profile);
        let device = device(&driver);
        let info = vk::BufferCreateInfo::default()
            .size(256)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER);
        let buffer = driver.create_buffer(device, &info).unwrap();
        let host_memory = driver.allocate_memory(device, 256, 1).unwrap();
        let device_memory = driver.allocate_memory(device, 256, 0).unwrap();

        // --- 2. ACT ---
        let requirements = driver.buffer_memory_requirements(device, buffer);
        let rejected = driver.bind_buffer_memory(device, buffer, host_memory, 0);
        let accepted = driver.bind_buffer_memory(device, buffer, device_memory, 0);

        // --- 3. ASSERT ---
        assert_eq!(requirements.memory_type_bits & (1 << 1), 0);
        assert_eq!(rejected, Err(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        assert_eq!(accepted, Ok(()));
    }

    #[test]
    fn test_calls_after_device_destroy_are_counted() {
        let driver = SoftwareDriver::default();
        let device = device(&driver);
        driver.destroy_device(device);
        driver.destroy_buffer(device, vk::Buffer::from_raw(42));
        assert_eq!(driver.stats().calls_on_destroyed_device, 1);
    }

    #[test]
    fn test_descriptor_pool_runs_out_of_sets() {
        let driver = SoftwareDriver::default();
        let device = device(&driver);
        let layout = uniform_layout(&driver, device);
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 8,
        }];
        let pool = driver.create_descriptor_pool(device, 1, &sizes).unwrap();

        assert!(driver.allocate_descriptor_set(device, pool, layout).is_ok());
        assert_eq!(
            driver.allocate_descriptor_set(device, pool, layout),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
        );
    }

    #[test]
    fn test_destroying_objects_of_a_pending_submission_is_counted() {
        // --- 1. ARRANGE ---
        let driver = SoftwareDriver::default();
        let device = device(&driver);
        let layout = uniform_layout(&driver, device);
        let pipeline_layout = driver.create_pipeline_layout(device, &[layout]).unwrap();
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 4,
        }];
        let pool = driver.create_descriptor_pool(device, 4, &sizes).unwrap();
        let set = driver.allocate_descriptor_set(device, pool, layout).unwrap();
        let command_buffer = driver.allocate_command_buffer(device).unwrap();
        driver.cmd_bind_descriptor_sets(command_buffer, pipeline_layout, &[set]);

        // --- 2. ACT ---
        let fence = driver.queue_submit(device, command_buffer).unwrap();
        driver.destroy_descriptor_pool(device, pool);
        let early = driver.stats().objects_destroyed_in_flight;
        driver.wait_for_fence(device, fence).unwrap();
        driver.free_command_buffer(device, command_buffer);
        driver.destroy_fence(device, fence);

        // --- 3. ASSERT ---
        assert_eq!(early, 1, "The pool was still used by the pending submission");
        let stats = driver.stats();
        assert_eq!(stats.objects_destroyed_in_flight, 1);
        assert_eq!(stats.fences_waited, 1);
        assert_eq!(driver.pending_submissions(), 0);
    }
}
