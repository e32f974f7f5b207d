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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::api::shader::{ShaderFunction, ShaderStage};
use std::fmt;

/// An error related to registering or looking up shader bytecode.
#[derive(Debug)]
pub enum ShaderError {
    /// The bytecode was rejected before reaching the backend.
    InvalidBytecode {
        /// The entry point the bytecode was registered for.
        name: String,
        /// The stage the bytecode was registered for.
        stage: ShaderStage,
        /// Why the bytecode was rejected.
        reason: String,
    },
    /// The backend failed to turn the bytecode into a shader module.
    ModuleCreationFailed {
        /// The entry point name.
        name: String,
        /// Detailed error message from the backend.
        details: String,
    },
    /// The requested shader function is not registered.
    NotFound {
        /// The function that was not found.
        function: ShaderFunction,
    },
    /// A shader archive could not be decoded.
    ArchiveDecode(String),
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::InvalidBytecode {
                name,
                stage,
                reason,
            } => {
                write!(f, "Invalid {stage} shader bytecode for '{name}': {reason}")
            }
            ShaderError::ModuleCreationFailed { name, details } => {
                write!(f, "Shader module creation failed for '{name}': {details}")
            }
            ShaderError::NotFound { function } => {
                write!(f, "Shader function not found: {function}")
            }
            ShaderError::ArchiveDecode(msg) => {
                write!(f, "Could not decode shader archive: {msg}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation of a pipeline state object.
#[derive(Debug)]
pub enum PipelineError {
    /// A shader function named by the descriptor is not in the shader library.
    MissingShaderFunction {
        /// The label of the pipeline being created.
        label: String,
        /// The missing function.
        function: ShaderFunction,
    },
    /// The descriptor-set layout could not be created.
    DescriptorSetLayoutCreationFailed(String),
    /// The pipeline layout could not be created.
    LayoutCreationFailed(String),
    /// The compatibility render pass could not be created.
    RenderPassCreationFailed(String),
    /// The backend rejected the pipeline state object.
    CompilationFailed {
        /// The label of the pipeline.
        label: String,
        /// Detailed error message from the backend.
        details: String,
    },
    /// The color attachment configuration is not usable.
    IncompatibleColorTarget(String),
    /// The depth/stencil configuration is not usable.
    IncompatibleDepthStencilFormat(String),
    /// A required feature is not supported by the device.
    FeatureNotSupported(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MissingShaderFunction { label, function } => {
                write!(f, "Pipeline '{label}' references missing shader function {function}")
            }
            PipelineError::DescriptorSetLayoutCreationFailed(msg) => {
                write!(f, "Descriptor set layout creation failed: {msg}")
            }
            PipelineError::LayoutCreationFailed(msg) => {
                write!(f, "Pipeline layout creation failed: {msg}")
            }
            PipelineError::RenderPassCreationFailed(msg) => {
                write!(f, "Compatibility render pass creation failed: {msg}")
            }
            PipelineError::CompilationFailed { label, details } => {
                write!(f, "Pipeline compilation failed for '{label}': {details}")
            }
            PipelineError::IncompatibleColorTarget(msg) => {
                write!(f, "Incompatible color target format: {msg}")
            }
            PipelineError::IncompatibleDepthStencilFormat(msg) => {
                write!(f, "Incompatible depth/stencil format: {msg}")
            }
            PipelineError::FeatureNotSupported(msg) => {
                write!(f, "Feature not supported: {msg}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// The handle used to reference a resource is invalid.
    InvalidHandle,
    /// The resource's memory cannot be accessed from the host.
    NotHostVisible,
    /// An access went past the end of the resource.
    OutOfBounds {
        /// The first byte accessed.
        offset: usize,
        /// The number of bytes accessed.
        length: usize,
        /// The size of the resource.
        size: usize,
    },
    /// The device that owned the resource has been destroyed.
    DeviceLost,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle."),
            ResourceError::NotHostVisible => {
                write!(f, "Resource memory is not host visible.")
            }
            ResourceError::OutOfBounds {
                offset,
                length,
                size,
            } => write!(
                f,
                "Resource access out of bounds: {length} bytes at offset {offset} \
                 in a resource of {size} bytes."
            ),
            ResourceError::DeviceLost => write!(f, "The owning device no longer exists."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A high-level error raised by a context or one of its command encoders.
#[derive(Debug)]
pub enum RenderError {
    /// The context failed construction and may not be used.
    InvalidContext,
    /// A failure occurred during the initialization of the graphics backend.
    InitializationFailed(String),
    /// A render pass could not be created or begun.
    RenderPassFailed(String),
    /// A pipeline was bound inside a render pass it is not compatible with.
    IncompatibleRenderPass(String),
    /// A rendering operation failed.
    RenderingFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The graphics device was lost.
    DeviceLost,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InvalidContext => write!(f, "The context is not valid."),
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize graphics backend: {msg}")
            }
            RenderError::RenderPassFailed(msg) => write!(f, "Render pass failed: {msg}"),
            RenderError::IncompatibleRenderPass(msg) => {
                write!(f, "Pipeline is not compatible with the render pass: {msg}")
            }
            RenderError::RenderingFailed(msg) => {
                write!(f, "A rendering operation failed: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::DeviceLost => write!(f, "The graphics device was lost."),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<PipelineError> for RenderError {
    fn from(err: PipelineError) -> Self {
        RenderError::ResourceError(err.into())
    }
}

impl From<ShaderError> for RenderError {
    fn from(err: ShaderError) -> Self {
        RenderError::ResourceError(err.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_error_display() {
        let err = ShaderError::InvalidBytecode {
            name: "solid_fill".to_string(),
            stage: ShaderStage::Fragment,
            reason: "missing SPIR-V magic".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Invalid fragment shader bytecode for 'solid_fill': missing SPIR-V magic"
        );
    }

    #[test]
    fn resource_error_display_wrapping_shader_error() {
        let shader_err = ShaderError::NotFound {
            function: ShaderFunction::new("blur", ShaderStage::Vertex),
        };
        let res_err: ResourceError = shader_err.into();
        assert_eq!(
            format!("{res_err}"),
            "Shader resource error: Shader function not found: blur (vertex)"
        );
        assert!(res_err.source().is_some());
    }

    #[test]
    fn render_error_display_wrapping_pipeline_error() {
        let render_err: RenderError =
            PipelineError::LayoutCreationFailed("ERROR_OUT_OF_HOST_MEMORY".to_string()).into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Pipeline resource error: \
             Pipeline layout creation failed: ERROR_OUT_OF_HOST_MEMORY"
        );
        assert!(render_err.source().is_some());
        assert!(render_err.source().unwrap().source().is_some());
    }

    #[test]
    fn out_of_bounds_display() {
        let err = ResourceError::OutOfBounds {
            offset: 8,
            length: 16,
            size: 12,
        };
        assert_eq!(
            err.to_string(),
            "Resource access out of bounds: 16 bytes at offset 8 in a resource of 12 bytes."
        );
    }
}
