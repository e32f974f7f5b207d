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

//! Numeric primitives used by every layer of the renderer.
//!
//! The types in this module are immutable value types with exact arithmetic
//! contracts: premultiplied color blending, saturating integer arithmetic and
//! a fixed left-handed matrix convention with a `[0, 1]` depth range.
//!
//! All angular functions operate in **radians**.

// --- Fundamental Constants ---

/// The scalar type used throughout the renderer.
pub type Scalar = f32;

/// Tolerance used by the "nearly equal" family of comparisons.
pub const EH_CLOSE_ENOUGH: Scalar = 1e-3;

pub use std::f32::consts::{FRAC_PI_2, PI, TAU};

// --- Declare Sub-Modules ---

pub mod color;
pub mod matrix;
pub mod saturated;
pub mod vector;

// --- Re-export Principal Types ---

pub use self::color::{BlendMode, Color};
pub use self::matrix::Matrix;
pub use self::vector::{ISize, Point, Size, Vector3, Vector4};

// --- Utility Functions ---

/// Returns `true` if `x` is within `EH_CLOSE_ENOUGH` of zero.
#[inline]
pub fn scalar_nearly_zero(x: Scalar) -> bool {
    scalar_nearly_zero_with_tolerance(x, EH_CLOSE_ENOUGH)
}

/// Returns `true` if `x` is within `tolerance` of zero.
#[inline]
pub fn scalar_nearly_zero_with_tolerance(x: Scalar, tolerance: Scalar) -> bool {
    x.abs() <= tolerance
}

/// Returns `true` if `a` and `b` differ by at most `EH_CLOSE_ENOUGH`.
#[inline]
pub fn scalar_nearly_equal(a: Scalar, b: Scalar) -> bool {
    scalar_nearly_zero(a - b)
}

/// Converts an angle from degrees to radians.
#[inline]
pub fn degrees_to_radians(degrees: Scalar) -> Scalar {
    degrees * (PI / 180.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_nearly_zero() {
        assert!(scalar_nearly_zero(0.0));
        assert!(scalar_nearly_zero(0.0009));
        assert!(scalar_nearly_zero(-0.0009));
        assert!(!scalar_nearly_zero(0.01));
    }

    #[test]
    fn test_scalar_nearly_equal() {
        assert!(scalar_nearly_equal(1.0, 1.0005));
        assert!(!scalar_nearly_equal(1.0, 1.1));
    }

    #[test]
    fn test_degrees_to_radians() {
        approx::assert_relative_eq!(degrees_to_radians(180.0), PI);
        approx::assert_relative_eq!(degrees_to_radians(90.0), FRAC_PI_2);
    }
}
