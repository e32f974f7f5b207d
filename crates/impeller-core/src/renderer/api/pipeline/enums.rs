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

//! Fixed-function pipeline enumerations.

use bitflags::bitflags;

/// A factor applied to the source or destination in the blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    /// `0`
    Zero,
    /// `1`
    #[default]
    One,
    /// The source color.
    SourceColor,
    /// `1 - source color`
    OneMinusSourceColor,
    /// The source alpha.
    SourceAlpha,
    /// `1 - source alpha`
    OneMinusSourceAlpha,
    /// The destination color.
    DestinationColor,
    /// `1 - destination color`
    OneMinusDestinationColor,
    /// The destination alpha.
    DestinationAlpha,
    /// `1 - destination alpha`
    OneMinusDestinationAlpha,
    /// `min(source alpha, 1 - destination alpha)`
    SourceAlphaSaturated,
    /// The constant blend color.
    BlendColor,
    /// `1 - constant blend color`
    OneMinusBlendColor,
    /// The constant blend alpha.
    BlendAlpha,
    /// `1 - constant blend alpha`
    OneMinusBlendAlpha,
}

/// The operation combining the weighted source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// `src + dst`
    #[default]
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
}

bitflags! {
    /// The color channels a pipeline writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        /// The red channel.
        const RED = 1 << 0;
        /// The green channel.
        const GREEN = 1 << 1;
        /// The blue channel.
        const BLUE = 1 << 2;
        /// The alpha channel.
        const ALPHA = 1 << 3;
        /// All channels.
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        ColorWriteMask::ALL
    }
}

/// A comparison used by the depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Always passes.
    #[default]
    Always,
    /// Passes if the new value is less than the stored value.
    Less,
    /// Passes if the values are equal.
    Equal,
    /// Passes if the new value is less than or equal to the stored value.
    LessEqual,
    /// Passes if the new value is greater than the stored value.
    Greater,
    /// Passes if the values differ.
    NotEqual,
    /// Passes if the new value is greater than or equal to the stored value.
    GreaterEqual,
}

/// What the stencil test does to the stored stencil value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Keep the stored value.
    #[default]
    Keep,
    /// Set the value to 0.
    Zero,
    /// Set the value to the reference value.
    SetToReferenceValue,
    /// Increment, clamping at the maximum.
    IncrementClamp,
    /// Decrement, clamping at 0.
    DecrementClamp,
    /// Bitwise invert.
    Invert,
    /// Increment, wrapping to 0.
    IncrementWrap,
    /// Decrement, wrapping to the maximum.
    DecrementWrap,
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    /// Independent triangles.
    #[default]
    Triangle,
    /// A triangle strip.
    TriangleStrip,
    /// Independent lines.
    Line,
    /// A line strip.
    LineStrip,
    /// Points.
    Point,
    /// A triangle fan. Not every device supports fans.
    TriangleFan,
}

/// How polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Filled polygons.
    #[default]
    Fill,
    /// Polygon edges only.
    Line,
}

/// Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling.
    #[default]
    None,
    /// Cull front faces.
    FrontFace,
    /// Cull back faces.
    BackFace,
}

/// The vertex winding that identifies a front face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindingOrder {
    /// Clockwise winding is front facing.
    Clockwise,
    /// Counter-clockwise winding is front facing.
    #[default]
    CounterClockwise,
}

/// The integer type of index buffer elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    /// 16-bit indices.
    #[default]
    Uint16,
    /// 32-bit indices.
    Uint32,
    /// Vertices are drawn without an index buffer.
    None,
}
