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

//! Per-attachment state descriptors used for pipeline compatibility.
//!
//! These only carry formats and fixed-function configuration. The runtime
//! attachments bound to a render pass live in
//! [`crate::renderer::api::attachment`].

use super::enums::*;
use crate::renderer::api::formats::PixelFormat;

/// The format and blend configuration of one color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachmentDescriptor {
    /// The pixel format of the attachment.
    pub format: PixelFormat,
    /// If `false`, the blend factors and operations are ignored.
    pub blending_enabled: bool,
    /// Source factor for the RGB channels.
    pub src_color_blend_factor: BlendFactor,
    /// Operation for the RGB channels.
    pub color_blend_op: BlendOperation,
    /// Destination factor for the RGB channels.
    pub dst_color_blend_factor: BlendFactor,
    /// Source factor for the alpha channel.
    pub src_alpha_blend_factor: BlendFactor,
    /// Operation for the alpha channel.
    pub alpha_blend_op: BlendOperation,
    /// Destination factor for the alpha channel.
    pub dst_alpha_blend_factor: BlendFactor,
    /// The channels written.
    pub write_mask: ColorWriteMask,
}

impl Default for ColorAttachmentDescriptor {
    /// Premultiplied source-over with blending disabled.
    fn default() -> Self {
        Self {
            format: PixelFormat::Unknown,
            blending_enabled: false,
            src_color_blend_factor: BlendFactor::SourceAlpha,
            color_blend_op: BlendOperation::Add,
            dst_color_blend_factor: BlendFactor::OneMinusSourceAlpha,
            src_alpha_blend_factor: BlendFactor::SourceAlpha,
            alpha_blend_op: BlendOperation::Add,
            dst_alpha_blend_factor: BlendFactor::OneMinusSourceAlpha,
            write_mask: ColorWriteMask::ALL,
        }
    }
}

impl ColorAttachmentDescriptor {
    /// An attachment of `format` with blending disabled.
    pub fn with_format(format: PixelFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DepthAttachmentDescriptor {
    /// The comparison used by the depth test.
    pub depth_compare: CompareFunction,
    /// If `true`, passing fragments write their depth.
    pub depth_write_enabled: bool,
}

/// Stencil test configuration for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilAttachmentDescriptor {
    /// The comparison used by the stencil test.
    pub stencil_compare: CompareFunction,
    /// Operation when the stencil test fails.
    pub stencil_failure: StencilOperation,
    /// Operation when the stencil test passes and the depth test fails.
    pub depth_failure: StencilOperation,
    /// Operation when both tests pass.
    pub depth_stencil_pass: StencilOperation,
    /// Mask applied before comparison.
    pub read_mask: u32,
    /// Mask applied on write.
    pub write_mask: u32,
}

impl Default for StencilAttachmentDescriptor {
    fn default() -> Self {
        Self {
            stencil_compare: CompareFunction::Always,
            stencil_failure: StencilOperation::Keep,
            depth_failure: StencilOperation::Keep,
            depth_stencil_pass: StencilOperation::Keep,
            read_mask: !0,
            write_mask: !0,
        }
    }
}
