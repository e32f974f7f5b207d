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

//! Device capability probing.
//!
//! Capabilities are decided once, at construction, from what the physical
//! device reports. The rest of the backend only reads the result.

use super::driver::{
    VulkanDriver, ARM_RASTERIZATION_ORDER_ATTACHMENT_ACCESS, EXT_PIPELINE_CREATION_FEEDBACK,
    EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS, KHR_PORTABILITY_SUBSET, KHR_SWAPCHAIN,
};
use super::formats::{pixel_format_from_vk, IntoVk};
use ash::vk;
use impeller_core::math::ISize;
use impeller_core::renderer::{Capabilities, PixelFormat, Workarounds};
use std::ffi::{CStr, CString};

/// Optional device extensions the backend knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionalDeviceExtensionVK {
    /// `VK_EXT_rasterization_order_attachment_access`.
    RasterizationOrderAttachmentAccessEXT,
    /// `VK_ARM_rasterization_order_attachment_access`.
    RasterizationOrderAttachmentAccessARM,
    /// `VK_EXT_pipeline_creation_feedback`.
    PipelineCreationFeedback,
    /// `VK_KHR_portability_subset`.
    PortabilitySubset,
}

impl OptionalDeviceExtensionVK {
    const ALL: [Self; 4] = [
        Self::RasterizationOrderAttachmentAccessEXT,
        Self::RasterizationOrderAttachmentAccessARM,
        Self::PipelineCreationFeedback,
        Self::PortabilitySubset,
    ];

    /// The extension name.
    pub const fn name(self) -> &'static CStr {
        match self {
            Self::RasterizationOrderAttachmentAccessEXT => {
                EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS
            }
            Self::RasterizationOrderAttachmentAccessARM => {
                ARM_RASTERIZATION_ORDER_ATTACHMENT_ACCESS
            }
            Self::PipelineCreationFeedback => EXT_PIPELINE_CREATION_FEEDBACK,
            Self::PortabilitySubset => KHR_PORTABILITY_SUBSET,
        }
    }
}

const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [KHR_SWAPCHAIN];

/// The NUL-terminated device name as a string.
fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8 as char)
        .collect()
}

/// What the physical device supports, after workarounds.
#[derive(Debug, Clone)]
pub struct CapabilitiesVK {
    valid: bool,
    optional_extensions: Vec<OptionalDeviceExtensionVK>,
    default_color_format: PixelFormat,
    default_stencil_format: PixelFormat,
    default_depth_stencil_format: PixelFormat,
    supports_offscreen_msaa: bool,
    supports_framebuffer_fetch: bool,
    supports_device_transient_textures: bool,
    max_texture_size: ISize,
    device_name: String,
}

impl CapabilitiesVK {
    /// Queries the physical device behind `driver`.
    ///
    /// ## Arguments
    /// * `driver` - The driver to query.
    /// * `workarounds` - Driver bugs to avoid. They only ever disable features.
    ///
    /// ## Returns
    /// The capabilities. They are invalid if a required extension is missing
    /// or no depth-stencil format is usable.
    pub fn new(driver: &dyn VulkanDriver, workarounds: &Workarounds) -> Self {
        let available = driver.enumerate_device_extensions();
        let has = |name: &CStr| available.iter().any(|e: &CString| e.as_c_str() == name);

        let mut valid = true;
        for required in REQUIRED_DEVICE_EXTENSIONS {
            if !has(required) {
                log::error!("Required device extension {required:?} is not available.");
                valid = false;
            }
        }

        let optional_extensions: Vec<_> = OptionalDeviceExtensionVK::ALL
            .into_iter()
            .filter(|ext| has(ext.name()))
            .collect();

        let supports = |format: vk::Format, feature: vk::FormatFeatureFlags| {
            driver.format_features(format).contains(feature)
        };
        let first_supported = |candidates: &[vk::Format], feature: vk::FormatFeatureFlags| {
            candidates
                .iter()
                .copied()
                .find(|f| supports(*f, feature))
                .map(pixel_format_from_vk)
                .unwrap_or(PixelFormat::Unknown)
        };

        let default_color_format = first_supported(
            &[vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM],
            vk::FormatFeatureFlags::COLOR_ATTACHMENT,
        );
        let default_depth_stencil_format = first_supported(
            &[vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT],
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        let default_stencil_format = match first_supported(
            &[vk::Format::S8_UINT],
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        ) {
            PixelFormat::Unknown => default_depth_stencil_format,
            format => format,
        };

        if default_color_format == PixelFormat::Unknown {
            log::error!("No supported color attachment format.");
            valid = false;
        }
        if default_depth_stencil_format == PixelFormat::Unknown {
            log::error!("No supported depth-stencil attachment format.");
            valid = false;
        }

        let properties = driver.physical_device_properties();
        let has_rasterization_order = optional_extensions.iter().any(|e| {
            matches!(
                e,
                OptionalDeviceExtensionVK::RasterizationOrderAttachmentAccessEXT
                    | OptionalDeviceExtensionVK::RasterizationOrderAttachmentAccessARM
            )
        });
        let has_lazy_memory = driver.memory_types().iter().any(|t| {
            t.property_flags
                .contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED)
        });

        let max = properties.limits.max_image_dimension2_d as i64;
        let capabilities = Self {
            valid,
            optional_extensions,
            default_color_format,
            default_stencil_format,
            default_depth_stencil_format,
            supports_offscreen_msaa: properties
                .limits
                .framebuffer_color_sample_counts
                .contains(vk::SampleCountFlags::TYPE_4),
            supports_framebuffer_fetch: has_rasterization_order
                && !workarounds.input_attachment_self_dependency_broken,
            supports_device_transient_textures: has_lazy_memory
                && !workarounds.disable_memoryless_textures,
            max_texture_size: ISize::new(max, max),
            device_name: device_name(&properties),
        };
        log::info!("Device capabilities: {capabilities:?}");
        capabilities
    }

    /// Returns `true` if the optional extension is available and will be enabled.
    pub fn has_extension(&self, extension: OptionalDeviceExtensionVK) -> bool {
        self.optional_extensions.contains(&extension)
    }

    /// Every extension the logical device must be created with.
    pub fn enabled_device_extensions(&self) -> Vec<&'static CStr> {
        REQUIRED_DEVICE_EXTENSIONS
            .into_iter()
            .chain(self.optional_extensions.iter().map(|e| e.name()))
            .collect()
    }

    /// The largest 2D texture.
    pub fn max_texture_size(&self) -> ISize {
        self.max_texture_size
    }

    /// The physical device name.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Returns `true` if `format` can be a color attachment on this device.
    pub fn supports_color_attachment(
        &self,
        driver: &dyn VulkanDriver,
        format: PixelFormat,
    ) -> bool {
        driver
            .format_features(format.into_vk())
            .contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT)
    }
}

impl Capabilities for CapabilitiesVK {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn default_color_format(&self) -> PixelFormat {
        self.default_color_format
    }

    fn default_stencil_format(&self) -> PixelFormat {
        self.default_stencil_format
    }

    fn default_depth_stencil_format(&self) -> PixelFormat {
        self.default_depth_stencil_format
    }

    fn supports_offscreen_msaa(&self) -> bool {
        self.valid && self.supports_offscreen_msaa
    }

    fn supports_ssbo(&self) -> bool {
        self.valid
    }

    fn supports_framebuffer_fetch(&self) -> bool {
        self.valid && self.supports_framebuffer_fetch
    }

    fn supports_device_transient_textures(&self) -> bool {
        self.valid && self.supports_device_transient_textures
    }

    fn supports_triangle_fan(&self) -> bool {
        self.valid && !self.has_extension(OptionalDeviceExtensionVK::PortabilitySubset)
    }

    fn supports_compute(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::software_driver::{DeviceProfile, SoftwareDriver};

    #[test]
    fn test_default_profile_enables_everything() {
        let driver = SoftwareDriver::default();
        let caps = CapabilitiesVK::new(&driver, &Workarounds::default());

        assert!(caps.is_valid());
        assert_eq!(caps.default_color_format(), PixelFormat::B8G8R8A8UNormInt);
        assert_eq!(caps.default_depth_stencil_format(), PixelFormat::D32FloatS8UInt);
        assert_eq!(
            caps.default_stencil_format(),
            PixelFormat::D32FloatS8UInt,
            "Without S8 the stencil format falls back to depth-stencil"
        );
        assert!(caps.supports_framebuffer_fetch());
        assert!(caps.supports_device_transient_textures());
        assert!(caps.supports_triangle_fan());
        assert!(!caps.supports_compute());
        assert!(caps
            .enabled_device_extensions()
            .contains(&EXT_PIPELINE_CREATION_FEEDBACK));
    }

    #[test]
    fn test_missing_swapchain_invalidates() {
        let driver = SoftwareDriver::new(DeviceProfile::default().without_extension(KHR_SWAPCHAIN));
        let caps = CapabilitiesVK::new(&driver, &Workarounds::default());
        assert!(!caps.is_valid());
        assert!(!caps.supports_framebuffer_fetch(), "Invalid capabilities support nothing");
    }

    #[test]
    fn test_missing_depth_stencil_format_invalidates() {
        let profile = DeviceProfile::default()
            .without_format(vk::Format::D24_UNORM_S8_UINT)
            .without_format(vk::Format::D32_SFLOAT_S8_UINT);
        let caps = CapabilitiesVK::new(&SoftwareDriver::new(profile), &Workarounds::default());
        assert!(!caps.is_valid());
    }

    #[test]
    fn test_workarounds_disable_features() {
        let workarounds = Workarounds {
            input_attachment_self_dependency_broken: true,
            disable_memoryless_textures: true,
        };
        let caps = CapabilitiesVK::new(&SoftwareDriver::default(), &workarounds);
        assert!(caps.is_valid());
        assert!(!caps.supports_framebuffer_fetch());
        assert!(!caps.supports_device_transient_textures());
    }

    #[test]
    fn test_portability_subset_disables_triangle_fans() {
        let profile = DeviceProfile::default().with_extension(KHR_PORTABILITY_SUBSET);
        let caps = CapabilitiesVK::new(&SoftwareDriver::new(profile), &Workarounds::default());
        assert!(!caps.supports_triangle_fan());
    }
}
