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

//! The driver backed by the system Vulkan loader.
//!
//! [`AshDriver`] loads the loader at runtime, creates one instance and picks
//! a physical device with a graphics queue. Every logical device it creates
//! gets its own queue, command pool and default sampler.

use super::create_info::{
    DescriptorResourceVK, DescriptorWriteVK, GraphicsPipelineDescriptionVK,
    RenderPassDescriptionVK,
};
use super::driver::{VkResult, VulkanDriver, EXT_PIPELINE_CREATION_FEEDBACK};
use super::driver::{
    ARM_RASTERIZATION_ORDER_ATTACHMENT_ACCESS, EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS,
};
use super::formats::aspect_mask;
use ash::vk;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const KHR_PORTABILITY_ENUMERATION: &CStr = c"VK_KHR_portability_enumeration";

/// Errors raised while bringing up the driver.
#[derive(Debug, Error)]
pub enum AshDriverError {
    /// The Vulkan loader library could not be loaded.
    #[error("Could not load the Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),
    /// A Vulkan call failed.
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
    /// No physical device exposes a graphics queue.
    #[error("No physical device with a graphics queue")]
    NoSuitableDevice,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A persistent mapping of host-visible memory.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    ptr: *mut u8,
    size: u64,
    coherent: bool,
}

// SAFETY: the pointer is only dereferenced while the mapping's memory is
// alive, and the bounds are checked against `size` first.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

#[derive(Debug)]
struct ImageState {
    format: vk::Format,
    view_type: vk::ImageViewType,
    mip_levels: u32,
    array_layers: u32,
    view: Option<vk::ImageView>,
}

/// Per-device objects and the bookkeeping the trait's flat handles need.
struct DeviceState {
    device: ash::Device,
    queue: Mutex<vk::Queue>,
    // Also guards recording into command buffers allocated from the pool.
    command_pool: Mutex<vk::CommandPool>,
    sampler: vk::Sampler,
    creation_feedback: bool,
    images: Mutex<HashMap<vk::Image, ImageState>>,
    mappings: Mutex<HashMap<vk::DeviceMemory, Mapping>>,
    framebuffer_extents: Mutex<HashMap<vk::Framebuffer, vk::Extent2D>>,
}

impl DeviceState {
    fn image_view(&self, image: vk::Image) -> Option<vk::ImageView> {
        lock(&self.images).get(&image).and_then(|state| state.view)
    }
}

/// A [`VulkanDriver`] on top of the system Vulkan implementation.
pub struct AshDriver {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_types: Vec<vk::MemoryType>,
    graphics_queue_family: u32,
    devices: Mutex<HashMap<vk::Device, Arc<DeviceState>>>,
    command_buffers: Mutex<HashMap<vk::CommandBuffer, Arc<DeviceState>>>,
}

impl fmt::Debug for AshDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AshDriver")
            .field("physical_device", &self.physical_device)
            .field("graphics_queue_family", &self.graphics_queue_family)
            .finish_non_exhaustive()
    }
}

impl AshDriver {
    /// Loads the Vulkan loader and selects a physical device, preferring a
    /// discrete GPU.
    ///
    /// ## Arguments
    /// * `enable_validation` - Enables the Khronos validation layer when it
    ///   is installed.
    ///
    /// ## Errors
    /// * `AshDriverError::Loading` - If no Vulkan loader is installed.
    /// * `AshDriverError::NoSuitableDevice` - If no device can render.
    pub fn new(enable_validation: bool) -> Result<Self, AshDriverError> {
        // SAFETY: the loader stays loaded for as long as `entry` lives, which
        // outlives the instance.
        let entry = unsafe { ash::Entry::load() }?;
        let instance = Self::create_instance(&entry, enable_validation)?;

        let selected = Self::select_physical_device(&instance);
        let Some((physical_device, graphics_queue_family)) = selected else {
            // SAFETY: no child object was created.
            unsafe { instance.destroy_instance(None) };
            return Err(AshDriverError::NoSuitableDevice);
        };

        // SAFETY: `physical_device` was enumerated from `instance`.
        let (properties, memory) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
            )
        };
        let memory_types = memory.memory_types[..memory.memory_type_count as usize].to_vec();
        log::info!(
            "Vulkan driver selected \"{}\" (queue family {graphics_queue_family}).",
            properties
                .device_name_as_c_str()
                .map(CStr::to_string_lossy)
                .unwrap_or_default()
        );

        Ok(Self {
            _entry: entry,
            instance,
            physical_device,
            properties,
            memory_types,
            graphics_queue_family,
            devices: Mutex::new(HashMap::new()),
            command_buffers: Mutex::new(HashMap::new()),
        })
    }

    fn create_instance(
        entry: &ash::Entry,
        enable_validation: bool,
    ) -> Result<ash::Instance, AshDriverError> {
        // SAFETY: plain queries on a loaded entry.
        let (layers, extensions) = unsafe {
            (
                entry.enumerate_instance_layer_properties()?,
                entry.enumerate_instance_extension_properties(None)?,
            )
        };
        let has_layer = layers
            .iter()
            .any(|l| l.layer_name_as_c_str() == Ok(VALIDATION_LAYER));
        let has_portability = extensions
            .iter()
            .any(|e| e.extension_name_as_c_str() == Ok(KHR_PORTABILITY_ENUMERATION));

        let mut enabled_layers = Vec::new();
        if enable_validation {
            if has_layer {
                enabled_layers.push(VALIDATION_LAYER.as_ptr());
            } else {
                log::warn!("Validation requested but the Khronos validation layer is missing.");
            }
        }
        let mut enabled_extensions = Vec::new();
        let mut flags = vk::InstanceCreateFlags::empty();
        if has_portability {
            enabled_extensions.push(KHR_PORTABILITY_ENUMERATION.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"Impeller")
            .engine_name(c"Impeller")
            .api_version(vk::API_VERSION_1_1);
        let info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_layer_names(&enabled_layers)
            .enabled_extension_names(&enabled_extensions);
        // SAFETY: every pointer in `info` outlives the call.
        Ok(unsafe { entry.create_instance(&info, None) }?)
    }

    fn select_physical_device(instance: &ash::Instance) -> Option<(vk::PhysicalDevice, u32)> {
        // SAFETY: plain queries on a live instance.
        let devices = unsafe { instance.enumerate_physical_devices() }.ok()?;
        let mut candidates: Vec<_> = devices
            .into_iter()
            .filter_map(|device| {
                let families =
                    unsafe { instance.get_physical_device_queue_family_properties(device) };
                let family = families
                    .iter()
                    .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
                let kind = unsafe { instance.get_physical_device_properties(device) }.device_type;
                Some((device, family as u32, kind))
            })
            .collect();
        candidates.sort_by_key(|(_, _, kind)| *kind != vk::PhysicalDeviceType::DISCRETE_GPU);
        candidates
            .first()
            .map(|(device, family, _)| (*device, *family))
    }

    fn device(&self, device: vk::Device) -> VkResult<Arc<DeviceState>> {
        lock(&self.devices)
            .get(&device)
            .cloned()
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }

    fn with_device(&self, device: vk::Device, f: impl FnOnce(&DeviceState)) {
        match self.device(device) {
            Ok(state) => f(&state),
            Err(_) => log::warn!("Call on unknown device {device:?} ignored."),
        }
    }

    /// Runs `f` with the command pool locked.
    fn record(&self, command_buffer: vk::CommandBuffer, f: impl FnOnce(&DeviceState)) {
        let state = lock(&self.command_buffers).get(&command_buffer).cloned();
        match state {
            Some(state) => {
                let _pool = lock(&state.command_pool);
                f(&state);
            }
            None => log::error!("Recording into unknown command buffer {command_buffer:?}."),
        }
    }

    fn is_host_visible(&self, memory_type_index: u32) -> Option<bool> {
        self.memory_types
            .get(memory_type_index as usize)
            .map(|t| t.property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE))
    }

    fn is_host_coherent(&self, memory_type_index: u32) -> bool {
        self.memory_types
            .get(memory_type_index as usize)
            .is_some_and(|t| t.property_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT))
    }
}

impl Drop for AshDriver {
    fn drop(&mut self) {
        let leaked: Vec<_> = lock(&self.devices).keys().copied().collect();
        for device in leaked {
            log::warn!("Device {device:?} still alive when the driver was dropped.");
            self.destroy_device(device);
        }
        // SAFETY: every device created from the instance is gone.
        unsafe { self.instance.destroy_instance(None) };
    }
}

fn whole_mapping(memory: vk::DeviceMemory) -> vk::MappedMemoryRange<'static> {
    vk::MappedMemoryRange::default()
        .memory(memory)
        .offset(0)
        .size(vk::WHOLE_SIZE)
}

// SAFETY (for every `unsafe` block below): handles passed in were created by
// this driver on the same device, and the owning layers destroy children
// before their parents.
impl VulkanDriver for AshDriver {
    fn physical_device_properties(&self) -> vk::PhysicalDeviceProperties {
        self.properties
    }

    fn enumerate_device_extensions(&self) -> Vec<CString> {
        let properties = unsafe {
            self.instance
                .enumerate_device_extension_properties(self.physical_device)
        };
        properties
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect()
    }

    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
        .optimal_tiling_features
    }

    fn memory_types(&self) -> Vec<vk::MemoryType> {
        self.memory_types.clone()
    }

    fn create_device(&self, enabled_extensions: &[&CStr]) -> VkResult<vk::Device> {
        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(self.graphics_queue_family)
            .queue_priorities(&priorities)];
        let extension_names: Vec<_> = enabled_extensions.iter().map(|e| e.as_ptr()).collect();
        let framebuffer_fetch = enabled_extensions.iter().any(|e| {
            *e == EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS
                || *e == ARM_RASTERIZATION_ORDER_ATTACHMENT_ACCESS
        });
        let creation_feedback = enabled_extensions.contains(&EXT_PIPELINE_CREATION_FEEDBACK);

        let mut order_access =
            vk::PhysicalDeviceRasterizationOrderAttachmentAccessFeaturesEXT::default()
                .rasterization_order_color_attachment_access(true);
        let mut info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names);
        if framebuffer_fetch {
            info = info.push_next(&mut order_access);
        }
        let device = unsafe {
            self.instance
                .create_device(self.physical_device, &info, None)
        }?;

        let queue = unsafe { device.get_device_queue(self.graphics_queue_family, 0) };
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.graphics_queue_family);
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE);
        let children = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .and_then(|pool| match device.create_sampler(&sampler_info, None) {
                    Ok(sampler) => Ok((pool, sampler)),
                    Err(error) => {
                        device.destroy_command_pool(pool, None);
                        Err(error)
                    }
                })
        };
        let (command_pool, sampler) = match children {
            Ok(children) => children,
            Err(error) => {
                unsafe { device.destroy_device(None) };
                return Err(error);
            }
        };

        let handle = device.handle();
        lock(&self.devices).insert(
            handle,
            Arc::new(DeviceState {
                device,
                queue: Mutex::new(queue),
                command_pool: Mutex::new(command_pool),
                sampler,
                creation_feedback,
                images: Mutex::new(HashMap::new()),
                mappings: Mutex::new(HashMap::new()),
                framebuffer_extents: Mutex::new(HashMap::new()),
            }),
        );
        Ok(handle)
    }

    fn destroy_device(&self, device: vk::Device) {
        let Some(state) = lock(&self.devices).remove(&device) else {
            return;
        };
        lock(&self.command_buffers).retain(|_, owner| !Arc::ptr_eq(owner, &state));
        let raw = &state.device;
        unsafe {
            if let Err(error) = raw.device_wait_idle() {
                log::error!("Waiting for device {device:?} to idle failed: {error}");
            }
            for (_, image) in lock(&state.images).drain() {
                if let Some(view) = image.view {
                    raw.destroy_image_view(view, None);
                }
            }
            raw.destroy_sampler(state.sampler, None);
            raw.destroy_command_pool(*lock(&state.command_pool), None);
            raw.destroy_device(None);
        }
    }

    fn create_buffer(
        &self,
        device: vk::Device,
        info: &vk::BufferCreateInfo<'_>,
    ) -> VkResult<vk::Buffer> {
        let state = self.device(device)?;
        unsafe { state.device.create_buffer(info, None) }
    }

    fn destroy_buffer(&self, device: vk::Device, buffer: vk::Buffer) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_buffer(buffer, None);
        });
    }

    fn buffer_memory_requirements(
        &self,
        device: vk::Device,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements {
        self.device(device)
            .map(|state| unsafe { state.device.get_buffer_memory_requirements(buffer) })
            .unwrap_or_default()
    }

    fn create_image(
        &self,
        device: vk::Device,
        info: &vk::ImageCreateInfo<'_>,
    ) -> VkResult<vk::Image> {
        let state = self.device(device)?;
        let image = unsafe { state.device.create_image(info, None) }?;
        let cube = info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE);
        lock(&state.images).insert(
            image,
            ImageState {
                format: info.format,
                view_type: if cube {
                    vk::ImageViewType::CUBE
                } else {
                    vk::ImageViewType::TYPE_2D
                },
                mip_levels: info.mip_levels,
                array_layers: info.array_layers,
                view: None,
            },
        );
        Ok(image)
    }

    fn destroy_image(&self, device: vk::Device, image: vk::Image) {
        self.with_device(device, |state| {
            let view = lock(&state.images).remove(&image).and_then(|i| i.view);
            unsafe {
                if let Some(view) = view {
                    state.device.destroy_image_view(view, None);
                }
                state.device.destroy_image(image, None);
            }
        });
    }

    fn image_memory_requirements(
        &self,
        device: vk::Device,
        image: vk::Image,
    ) -> vk::MemoryRequirements {
        self.device(device)
            .map(|state| unsafe { state.device.get_image_memory_requirements(image) })
            .unwrap_or_default()
    }

    fn allocate_memory(
        &self,
        device: vk::Device,
        size: u64,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory> {
        let state = self.device(device)?;
        let host_visible = self
            .is_host_visible(memory_type_index)
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        let memory = unsafe { state.device.allocate_memory(&info, None) }?;
        if host_visible {
            let mapped = unsafe {
                state
                    .device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            };
            let ptr = match mapped {
                Ok(ptr) => ptr.cast::<u8>(),
                Err(error) => {
                    unsafe { state.device.free_memory(memory, None) };
                    return Err(error);
                }
            };
            lock(&state.mappings).insert(
                memory,
                Mapping {
                    ptr,
                    size,
                    coherent: self.is_host_coherent(memory_type_index),
                },
            );
        }
        Ok(memory)
    }

    fn free_memory(&self, device: vk::Device, memory: vk::DeviceMemory) {
        self.with_device(device, |state| {
            // Freeing unmaps implicitly.
            lock(&state.mappings).remove(&memory);
            unsafe { state.device.free_memory(memory, None) };
        });
    }

    fn bind_buffer_memory(
        &self,
        device: vk::Device,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> VkResult<()> {
        let state = self.device(device)?;
        unsafe { state.device.bind_buffer_memory(buffer, memory, offset) }
    }

    fn bind_image_memory(
        &self,
        device: vk::Device,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> VkResult<()> {
        let state = self.device(device)?;
        unsafe { state.device.bind_image_memory(image, memory, offset) }?;

        // Views need bound memory, so they are created here.
        let mut images = lock(&state.images);
        let image_state = images
            .get_mut(&image)
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(image_state.view_type)
            .format(image_state.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(image_state.format),
                base_mip_level: 0,
                level_count: image_state.mip_levels,
                base_array_layer: 0,
                layer_count: image_state.array_layers,
            });
        image_state.view = Some(unsafe { state.device.create_image_view(&info, None) }?);
        Ok(())
    }

    fn write_memory(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        offset: u64,
        data: &[u8],
    ) -> VkResult<()> {
        let state = self.device(device)?;
        let mapping = lock(&state.mappings)
            .get(&memory)
            .copied()
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        if offset.saturating_add(data.len() as u64) > mapping.size {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapping.ptr.add(offset as usize),
                data.len(),
            );
            if !mapping.coherent {
                state
                    .device
                    .flush_mapped_memory_ranges(&[whole_mapping(memory)])?;
            }
        }
        Ok(())
    }

    fn read_memory(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        offset: u64,
        len: u64,
    ) -> VkResult<Vec<u8>> {
        let state = self.device(device)?;
        let mapping = lock(&state.mappings)
            .get(&memory)
            .copied()
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        if offset.saturating_add(len) > mapping.size {
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        let mut out = vec![0u8; len as usize];
        unsafe {
            if !mapping.coherent {
                state
                    .device
                    .invalidate_mapped_memory_ranges(&[whole_mapping(memory)])?;
            }
            std::ptr::copy_nonoverlapping(
                mapping.ptr.add(offset as usize),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        Ok(out)
    }

    fn create_shader_module(
        &self,
        device: vk::Device,
        code: &[u8],
    ) -> VkResult<vk::ShaderModule> {
        let state = self.device(device)?;
        let words = ash::util::read_spv(&mut std::io::Cursor::new(code)).map_err(|error| {
            log::error!("Malformed SPIR-V: {error}");
            vk::Result::ERROR_INITIALIZATION_FAILED
        })?;
        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        unsafe { state.device.create_shader_module(&info, None) }
    }

    fn destroy_shader_module(&self, device: vk::Device, module: vk::ShaderModule) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_shader_module(module, None);
        });
    }

    fn create_descriptor_set_layout(
        &self,
        device: vk::Device,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> VkResult<vk::DescriptorSetLayout> {
        let state = self.device(device)?;
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        unsafe { state.device.create_descriptor_set_layout(&info, None) }
    }

    fn destroy_descriptor_set_layout(&self, device: vk::Device, layout: vk::DescriptorSetLayout) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_descriptor_set_layout(layout, None);
        });
    }

    fn create_pipeline_layout(
        &self,
        device: vk::Device,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout> {
        let state = self.device(device)?;
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        unsafe { state.device.create_pipeline_layout(&info, None) }
    }

    fn destroy_pipeline_layout(&self, device: vk::Device, layout: vk::PipelineLayout) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_pipeline_layout(layout, None);
        });
    }

    fn create_render_pass(
        &self,
        device: vk::Device,
        description: &RenderPassDescriptionVK,
    ) -> VkResult<vk::RenderPass> {
        let state = self.device(device)?;
        let subpasses: Vec<_> = description
            .subpasses
            .iter()
            .map(|subpass| {
                let mut lowered = vk::SubpassDescription::default()
                    .flags(subpass.flags)
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&subpass.input_attachments)
                    .color_attachments(&subpass.color_attachments);
                if !subpass.resolve_attachments.is_empty() {
                    lowered = lowered.resolve_attachments(&subpass.resolve_attachments);
                }
                if let Some(depth_stencil) = &subpass.depth_stencil_attachment {
                    lowered = lowered.depth_stencil_attachment(depth_stencil);
                }
                lowered
            })
            .collect();
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&description.attachments)
            .subpasses(&subpasses)
            .dependencies(&description.dependencies);
        unsafe { state.device.create_render_pass(&info, None) }
    }

    fn destroy_render_pass(&self, device: vk::Device, render_pass: vk::RenderPass) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_render_pass(render_pass, None);
        });
    }

    fn create_pipeline_cache(
        &self,
        device: vk::Device,
        initial_data: &[u8],
    ) -> VkResult<vk::PipelineCache> {
        let state = self.device(device)?;
        let info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);
        unsafe { state.device.create_pipeline_cache(&info, None) }
    }

    fn get_pipeline_cache_data(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
    ) -> VkResult<Vec<u8>> {
        let state = self.device(device)?;
        unsafe { state.device.get_pipeline_cache_data(cache) }
    }

    fn destroy_pipeline_cache(&self, device: vk::Device, cache: vk::PipelineCache) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_pipeline_cache(cache, None);
        });
    }

    fn create_graphics_pipeline(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
        description: &GraphicsPipelineDescriptionVK,
    ) -> VkResult<(vk::Pipeline, vk::PipelineCreationFeedback)> {
        let state = self.device(device)?;
        let entry_points = description
            .stages
            .iter()
            .map(|stage| CString::new(stage.entry_point.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let stages: Vec<_> = description
            .stages
            .iter()
            .zip(&entry_points)
            .map(|(stage, name)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(name)
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&description.vertex_bindings)
            .vertex_attribute_descriptions(&description.vertex_attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(description.topology);
        // Viewport and scissor are set per render pass.
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(description.polygon_mode)
            .cull_mode(description.cull_mode)
            .front_face(description.front_face)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(description.rasterization_samples);

        let ds = &description.depth_stencil;
        let mut depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(ds.depth_test_enable)
            .depth_write_enable(ds.depth_write_enable)
            .depth_compare_op(ds.depth_compare_op)
            .stencil_test_enable(ds.stencil_test_enable);
        if let Some(front) = ds.front {
            depth_stencil = depth_stencil.front(front);
        }
        if let Some(back) = ds.back {
            depth_stencil = depth_stencil.back(back);
        }
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .flags(description.color_blend_flags)
            .attachments(&description.color_blend_attachments);

        let mut feedback = vk::PipelineCreationFeedback::default();
        let mut feedback_info = vk::PipelineCreationFeedbackCreateInfo::default()
            .pipeline_creation_feedback(&mut feedback);
        let mut info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(description.layout)
            .render_pass(description.render_pass)
            .subpass(description.subpass);
        if state.creation_feedback {
            info = info.push_next(&mut feedback_info);
        }

        let pipelines = unsafe { state.device.create_graphics_pipelines(cache, &[info], None) }
            .map_err(|(_, error)| error)?;
        let pipeline = pipelines
            .first()
            .copied()
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        Ok((pipeline, feedback))
    }

    fn destroy_pipeline(&self, device: vk::Device, pipeline: vk::Pipeline) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_pipeline(pipeline, None);
        });
    }

    fn create_descriptor_pool(
        &self,
        device: vk::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        let state = self.device(device)?;
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        unsafe { state.device.create_descriptor_pool(&info, None) }
    }

    fn destroy_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_descriptor_pool(pool, None);
        });
    }

    fn allocate_descriptor_set(
        &self,
        device: vk::Device,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let state = self.device(device)?;
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { state.device.allocate_descriptor_sets(&info) }?;
        sets.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn update_descriptor_sets(&self, device: vk::Device, writes: &[DescriptorWriteVK]) {
        self.with_device(device, |state| {
            enum Info {
                Buffer([vk::DescriptorBufferInfo; 1]),
                Image([vk::DescriptorImageInfo; 1]),
            }
            let infos: Vec<_> = writes
                .iter()
                .map(|write| match write.resource {
                    DescriptorResourceVK::Buffer(info) => Info::Buffer([info]),
                    DescriptorResourceVK::Image { image, layout } => {
                        Info::Image([vk::DescriptorImageInfo {
                            sampler: state.sampler,
                            image_view: state.image_view(image).unwrap_or_default(),
                            image_layout: layout,
                        }])
                    }
                })
                .collect();
            let lowered: Vec<_> = writes
                .iter()
                .zip(&infos)
                .map(|(write, info)| {
                    let base = vk::WriteDescriptorSet::default()
                        .dst_set(write.dst_set)
                        .dst_binding(write.dst_binding)
                        .descriptor_type(write.descriptor_type);
                    match info {
                        Info::Buffer(buffer) => base.buffer_info(buffer),
                        Info::Image(image) => base.image_info(image),
                    }
                })
                .collect();
            unsafe { state.device.update_descriptor_sets(&lowered, &[]) };
        });
    }

    fn create_framebuffer(
        &self,
        device: vk::Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::Image],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let state = self.device(device)?;
        let views = attachments
            .iter()
            .map(|image| state.image_view(*image))
            .collect::<Option<Vec<_>>>()
            .ok_or(vk::Result::ERROR_VALIDATION_FAILED_EXT)?;
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { state.device.create_framebuffer(&info, None) }?;
        lock(&state.framebuffer_extents).insert(framebuffer, extent);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, device: vk::Device, framebuffer: vk::Framebuffer) {
        self.with_device(device, |state| {
            lock(&state.framebuffer_extents).remove(&framebuffer);
            unsafe { state.device.destroy_framebuffer(framebuffer, None) };
        });
    }

    fn allocate_command_buffer(&self, device: vk::Device) -> VkResult<vk::CommandBuffer> {
        let state = self.device(device)?;
        let command_buffer = {
            let pool = lock(&state.command_pool);
            let info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffers = unsafe { state.device.allocate_command_buffers(&info) }?;
            let command_buffer = buffers.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)?;
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            let begun = unsafe { state.device.begin_command_buffer(command_buffer, &begin) };
            if let Err(error) = begun {
                unsafe { state.device.free_command_buffers(*pool, &buffers) };
                return Err(error);
            }
            command_buffer
        };
        lock(&self.command_buffers).insert(command_buffer, state);
        Ok(command_buffer)
    }

    fn free_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer) {
        lock(&self.command_buffers).remove(&command_buffer);
        self.with_device(device, |state| {
            let pool = lock(&state.command_pool);
            unsafe { state.device.free_command_buffers(*pool, &[command_buffer]) };
        });
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        clear_values: &[vk::ClearValue],
    ) {
        self.record(command_buffer, |state| {
            let Some(extent) = lock(&state.framebuffer_extents).get(&framebuffer).copied() else {
                log::error!("Render pass begun on unknown framebuffer {framebuffer:?}.");
                return;
            };
            let area = vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            };
            let info = vk::RenderPassBeginInfo::default()
                .render_pass(render_pass)
                .framebuffer(framebuffer)
                .render_area(area)
                .clear_values(clear_values);
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            unsafe {
                state
                    .device
                    .cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE);
                state.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
                state.device.cmd_set_scissor(command_buffer, 0, &[area]);
            }
        });
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(command_buffer, |state| unsafe {
            state.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        self.record(command_buffer, |state| unsafe {
            state.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        });
    }

    fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        self.record(command_buffer, |state| unsafe {
            state.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage_mask,
                dst_stage_mask,
                dependency_flags,
                &[],
                &[],
                image_barriers,
            );
        });
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.record(command_buffer, |state| unsafe {
            state
                .device
                .cmd_draw(command_buffer, vertex_count, instance_count, 0, 0);
        });
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.record(command_buffer, |state| unsafe {
            state.device.cmd_end_render_pass(command_buffer);
        });
    }

    fn queue_submit(
        &self,
        device: vk::Device,
        command_buffer: vk::CommandBuffer,
    ) -> VkResult<vk::Fence> {
        let state = self.device(device)?;
        {
            let _pool = lock(&state.command_pool);
            unsafe { state.device.end_command_buffer(command_buffer) }?;
        }
        let fence = unsafe {
            state
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }?;
        let command_buffers = [command_buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let queue = lock(&state.queue);
        if let Err(error) = unsafe { state.device.queue_submit(*queue, &[submit], fence) } {
            unsafe { state.device.destroy_fence(fence, None) };
            return Err(error);
        }
        Ok(fence)
    }

    fn wait_for_fence(&self, device: vk::Device, fence: vk::Fence) -> VkResult<()> {
        let state = self.device(device)?;
        unsafe { state.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn destroy_fence(&self, device: vk::Device, fence: vk::Fence) {
        self.with_device(device, |state| unsafe {
            state.device.destroy_fence(fence, None);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::context::ContextVK;
    use crate::graphics::vulkan::instance::InstanceRegistry;
    use impeller_core::renderer::{Context, ContextSettings};

    #[test]
    #[ignore = "needs a Vulkan loader and a GPU"]
    fn test_system_driver_creates_a_context() {
        // --- 1. ARRANGE ---
        let _ = env_logger::builder().is_test(true).try_init();
        let driver: Arc<dyn VulkanDriver> =
            Arc::new(AshDriver::new(false).expect("a Vulkan implementation is installed"));

        // --- 2. ACT ---
        let context = ContextVK::create_with_registry(
            &InstanceRegistry::new(),
            driver,
            ContextSettings {
                worker_count: 1,
                ..Default::default()
            },
        );

        // --- 3. ASSERT ---
        assert!(!context.describe_gpu_model().is_empty());
        if context.is_valid() {
            assert!(context.pipeline_library().is_some_and(|l| l.is_valid()));
        }
        context.shutdown();
    }
}
