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

//! Shader stages and the identity of a shader entry point.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Defines the programmable stage in the pipeline a shader function is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderStage {
    /// The vertex shader stage.
    Vertex,
    /// The fragment shader stage.
    Fragment,
    /// The compute shader stage.
    Compute,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// Identifies one entry point in a shader library.
///
/// The bytecode lives in the backend's shader library; a `ShaderFunction`
/// is just the `(name, stage)` key used to look it up, which keeps pipeline
/// descriptors cheap to clone, compare and hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderFunction {
    name: Arc<str>,
    stage: ShaderStage,
}

impl ShaderFunction {
    /// Creates a new shader function key.
    pub fn new(name: impl Into<Arc<str>>, stage: ShaderStage) -> Self {
        Self {
            name: name.into(),
            stage,
        }
    }

    /// The entry point name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stage this function runs in.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl fmt::Display for ShaderFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_function_identity() {
        let a = ShaderFunction::new("solid_fill_vertex_main", ShaderStage::Vertex);
        let b = ShaderFunction::new(String::from("solid_fill_vertex_main"), ShaderStage::Vertex);
        let c = ShaderFunction::new("solid_fill_vertex_main", ShaderStage::Fragment);

        assert_eq!(a, b);
        assert_ne!(a, c, "Stage is part of the identity");
        assert_eq!(a.name(), "solid_fill_vertex_main");
        assert_eq!(a.to_string(), "solid_fill_vertex_main (vertex)");
    }
}
