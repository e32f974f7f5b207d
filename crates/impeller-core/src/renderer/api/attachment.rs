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

//! Runtime attachments: real textures bound to a render pass.
//!
//! These differ from the pipeline-side descriptors in
//! [`crate::renderer::api::pipeline::state`], which only carry a format.
//! An attachment is valid once its texture exists and its format fits the
//! attachment's role.

use super::formats::{LoadAction, PixelFormat, SampleCount, StorageMode, StoreAction};
use crate::math::{Color, ISize};
use crate::renderer::traits::Texture;
use crate::validation_log;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A texture bound to one slot of a render pass.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    /// The texture rendered into.
    pub texture: Option<Arc<dyn Texture>>,
    /// The single-sample texture a multisampled `texture` resolves into.
    pub resolve_texture: Option<Arc<dyn Texture>>,
    /// What happens to the contents at the start of the pass.
    pub load_action: LoadAction,
    /// What happens to the contents at the end of the pass.
    pub store_action: StoreAction,
}

impl Attachment {
    /// An attachment rendering into `texture`.
    pub fn new(texture: Arc<dyn Texture>) -> Self {
        Self {
            texture: Some(texture),
            ..Default::default()
        }
    }

    /// Checks the texture and the resolve configuration.
    ///
    /// Every failure is reported through the validation log.
    pub fn is_valid(&self) -> bool {
        let Some(texture) = &self.texture else {
            validation_log!("Attachment has no texture.");
            return false;
        };
        if !texture.is_valid() {
            validation_log!("Attachment has an invalid texture.");
            return false;
        }

        match &self.resolve_texture {
            Some(resolve) => self.resolve_is_valid(texture.as_ref(), resolve.as_ref()),
            None => {
                if self.store_action.performs_resolve() {
                    validation_log!(
                        "Store action {:?} resolves but no resolve texture is set.",
                        self.store_action
                    );
                    return false;
                }
                true
            }
        }
    }

    fn resolve_is_valid(&self, texture: &dyn Texture, resolve: &dyn Texture) -> bool {
        if !self.store_action.performs_resolve() {
            validation_log!(
                "A resolve texture is set but store action {:?} does not resolve.",
                self.store_action
            );
            return false;
        }
        let desc = texture.descriptor();
        let resolve_desc = resolve.descriptor();
        if !resolve.is_valid() {
            validation_log!("Resolve texture is invalid.");
            return false;
        }
        if desc.sample_count == SampleCount::Count1 {
            validation_log!("Resolve source texture must be multisampled.");
            return false;
        }
        if resolve_desc.sample_count != SampleCount::Count1 {
            validation_log!("Resolve target texture must have one sample.");
            return false;
        }
        if desc.size != resolve_desc.size {
            validation_log!(
                "Resolve size {:?} does not match texture size {:?}.",
                resolve_desc.size,
                desc.size
            );
            return false;
        }
        if desc.format != resolve_desc.format {
            validation_log!(
                "Resolve format {} does not match texture format {}.",
                resolve_desc.format,
                desc.format
            );
            return false;
        }
        if resolve_desc.storage_mode == StorageMode::DeviceTransient {
            validation_log!("Resolve target cannot be device transient.");
            return false;
        }
        true
    }

    fn format(&self) -> PixelFormat {
        self.texture
            .as_ref()
            .map(|t| t.descriptor().format)
            .unwrap_or_default()
    }
}

/// A color attachment with its clear value.
#[derive(Debug, Clone, Default)]
pub struct ColorAttachment {
    /// The bound texture and actions.
    pub attachment: Attachment,
    /// The value used when the load action is `Clear`.
    pub clear_color: Color,
}

impl ColorAttachment {
    /// Returns `true` if the attachment is valid and its format is a color format.
    pub fn is_valid(&self) -> bool {
        if !self.attachment.is_valid() {
            return false;
        }
        let format = self.attachment.format();
        if !format.is_color() {
            validation_log!("Color attachment has non-color format {format}.");
            return false;
        }
        true
    }
}

/// A depth attachment with its clear value.
#[derive(Debug, Clone)]
pub struct DepthAttachment {
    /// The bound texture and actions.
    pub attachment: Attachment,
    /// The value used when the load action is `Clear`.
    pub clear_depth: f64,
}

impl Default for DepthAttachment {
    fn default() -> Self {
        Self {
            attachment: Attachment::default(),
            clear_depth: 0.0,
        }
    }
}

impl DepthAttachment {
    /// Returns `true` if the attachment is valid and its format carries depth.
    pub fn is_valid(&self) -> bool {
        if !self.attachment.is_valid() {
            return false;
        }
        let format = self.attachment.format();
        if !format.is_depth_writable() {
            validation_log!("Depth attachment has non-depth format {format}.");
            return false;
        }
        true
    }
}

/// A stencil attachment with its clear value.
#[derive(Debug, Clone, Default)]
pub struct StencilAttachment {
    /// The bound texture and actions.
    pub attachment: Attachment,
    /// The value used when the load action is `Clear`.
    pub clear_stencil: u32,
}

impl StencilAttachment {
    /// Returns `true` if the attachment is valid and its format carries stencil.
    pub fn is_valid(&self) -> bool {
        if !self.attachment.is_valid() {
            return false;
        }
        let format = self.attachment.format();
        if !format.is_stencil_writable() {
            validation_log!("Stencil attachment has non-stencil format {format}.");
            return false;
        }
        true
    }
}

/// The full set of attachments for one render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderTarget {
    colors: BTreeMap<usize, ColorAttachment>,
    depth: Option<DepthAttachment>,
    stencil: Option<StencilAttachment>,
}

impl RenderTarget {
    /// An empty render target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the color attachment at `index`.
    pub fn set_color_attachment(&mut self, index: usize, attachment: ColorAttachment) -> &mut Self {
        self.colors.insert(index, attachment);
        self
    }

    /// Sets or clears the depth attachment.
    pub fn set_depth_attachment(&mut self, attachment: Option<DepthAttachment>) -> &mut Self {
        self.depth = attachment;
        self
    }

    /// Sets or clears the stencil attachment.
    pub fn set_stencil_attachment(&mut self, attachment: Option<StencilAttachment>) -> &mut Self {
        self.stencil = attachment;
        self
    }

    /// The color attachments by bind index.
    pub fn color_attachments(&self) -> &BTreeMap<usize, ColorAttachment> {
        &self.colors
    }

    /// The depth attachment.
    pub fn depth_attachment(&self) -> Option<&DepthAttachment> {
        self.depth.as_ref()
    }

    /// The stencil attachment.
    pub fn stencil_attachment(&self) -> Option<&StencilAttachment> {
        self.stencil.as_ref()
    }

    /// The size of the render target, taken from color attachment 0.
    pub fn render_target_size(&self) -> ISize {
        self.colors
            .get(&0)
            .and_then(|c| c.attachment.texture.as_ref())
            .map(|t| t.descriptor().size)
            .unwrap_or_default()
    }

    /// The sample count of the render target, taken from color attachment 0.
    pub fn sample_count(&self) -> SampleCount {
        self.colors
            .get(&0)
            .and_then(|c| c.attachment.texture.as_ref())
            .map(|t| t.descriptor().sample_count)
            .unwrap_or_default()
    }

    /// Checks every attachment and their agreement.
    ///
    /// Requires color attachment 0, and all attachments must share the same
    /// size and sample count.
    pub fn is_valid(&self) -> bool {
        if !self.colors.contains_key(&0) {
            validation_log!("Render target has no color attachment at index 0.");
            return false;
        }

        let mut textures: Vec<(&str, &Attachment)> = Vec::new();
        for color in self.colors.values() {
            if !color.is_valid() {
                return false;
            }
            textures.push(("color", &color.attachment));
        }
        if let Some(depth) = &self.depth {
            if !depth.is_valid() {
                return false;
            }
            textures.push(("depth", &depth.attachment));
        }
        if let Some(stencil) = &self.stencil {
            if !stencil.is_valid() {
                return false;
            }
            textures.push(("stencil", &stencil.attachment));
        }

        let size = self.render_target_size();
        let samples = self.sample_count();
        for (role, attachment) in textures {
            let Some(texture) = attachment.texture.as_ref() else {
                continue;
            };
            let desc = texture.descriptor();
            if desc.size != size {
                validation_log!(
                    "Render target {role} attachment size {:?} differs from {:?}.",
                    desc.size,
                    size
                );
                return false;
            }
            if desc.sample_count != samples {
                validation_log!(
                    "Render target {role} attachment has {} samples, expected {}.",
                    desc.sample_count.samples(),
                    samples.samples()
                );
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::formats::{TextureType, TextureUsage};
    use crate::renderer::api::texture::TextureDescriptor;
    use crate::validation::validation_error_count;
    use std::any::Any;

    #[derive(Debug)]
    struct FakeTexture {
        descriptor: TextureDescriptor,
    }

    impl Texture for FakeTexture {
        fn descriptor(&self) -> &TextureDescriptor {
            &self.descriptor
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn texture(format: PixelFormat, samples: SampleCount) -> Arc<dyn Texture> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(FakeTexture {
            descriptor: TextureDescriptor {
                format,
                size: ISize::new(64, 64),
                texture_type: if samples == SampleCount::Count4 {
                    TextureType::Texture2DMultisample
                } else {
                    TextureType::Texture2D
                },
                sample_count: samples,
                usage: TextureUsage::RENDER_TARGET,
                ..Default::default()
            },
        })
    }

    fn color(format: PixelFormat) -> ColorAttachment {
        ColorAttachment {
            attachment: Attachment::new(texture(format, SampleCount::Count1)),
            clear_color: Color::BLACK_TRANSPARENT,
        }
    }

    #[test]
    fn test_attachment_without_texture_is_invalid() {
        let before = validation_error_count();
        assert!(!Attachment::default().is_valid());
        assert!(validation_error_count() > before);
    }

    #[test]
    fn test_color_attachment_rejects_depth_format() {
        assert!(color(PixelFormat::R8G8B8A8UNormInt).is_valid());
        assert!(!color(PixelFormat::D32Float).is_valid());
    }

    #[test]
    fn test_depth_and_stencil_roles() {
        let depth = DepthAttachment {
            attachment: Attachment::new(texture(PixelFormat::D24UnormS8Uint, SampleCount::Count1)),
            clear_depth: 1.0,
        };
        assert!(depth.is_valid());

        let stencil = StencilAttachment {
            attachment: Attachment::new(texture(PixelFormat::D32Float, SampleCount::Count1)),
            clear_stencil: 0,
        };
        assert!(!stencil.is_valid(), "D32Float has no stencil aspect");
    }

    #[test]
    fn test_resolve_requires_matching_store_action() {
        // --- 1. ARRANGE ---
        let mut attachment = Attachment {
            texture: Some(texture(PixelFormat::R8G8B8A8UNormInt, SampleCount::Count4)),
            resolve_texture: Some(texture(PixelFormat::R8G8B8A8UNormInt, SampleCount::Count1)),
            load_action: LoadAction::Clear,
            store_action: StoreAction::Store,
        };

        // --- 2. ACT & ASSERT ---
        assert!(!attachment.is_valid(), "Store does not resolve");
        attachment.store_action = StoreAction::MultisampleResolve;
        assert!(attachment.is_valid());
        attachment.resolve_texture =
            Some(texture(PixelFormat::B8G8R8A8UNormInt, SampleCount::Count1));
        assert!(!attachment.is_valid(), "Resolve format mismatch");
    }

    #[test]
    fn test_resolve_store_without_resolve_texture_is_invalid() {
        let attachment = Attachment {
            texture: Some(texture(PixelFormat::R8G8B8A8UNormInt, SampleCount::Count4)),
            store_action: StoreAction::StoreAndMultisampleResolve,
            ..Default::default()
        };
        assert!(!attachment.is_valid());
    }

    #[test]
    fn test_render_target_requires_index_zero_and_matching_samples() {
        let mut target = RenderTarget::new();
        target.set_color_attachment(1, color(PixelFormat::R8G8B8A8UNormInt));
        assert!(!target.is_valid());

        target.set_color_attachment(0, color(PixelFormat::R8G8B8A8UNormInt));
        assert!(target.is_valid());
        assert_eq!(target.render_target_size(), ISize::new(64, 64));

        target.set_depth_attachment(Some(DepthAttachment {
            attachment: Attachment::new(texture(PixelFormat::D32Float, SampleCount::Count4)),
            clear_depth: 1.0,
        }));
        assert!(!target.is_valid(), "Depth sample count differs");
    }
}
