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

//! Defines the 4x4 [`Matrix`] type and its construction conventions.

use super::vector::{ISize, Point, Vector3, Vector4};
use super::{scalar_nearly_zero_with_tolerance, Scalar};
use std::ops::Mul;

/// A 4x4 column-major matrix.
///
/// Constructors follow a fixed convention:
///
/// * Left-handed coordinate system.
/// * Normalized device coordinates span `(-1, -1)` (lower left) to `(1, 1)`
///   (upper right).
/// * The visible depth range is `[0, 1]`; the NDC origin is `(0, 0, 0.5)`.
///
/// `m[c * 4 + r]` is the element at column `c`, row `r`.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Matrix {
    /// The elements in column-major order.
    pub m: [Scalar; 16],
}

impl Default for Matrix {
    /// Returns the identity matrix.
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, //
        ],
    };

    /// Creates a matrix from its column-major elements.
    #[inline]
    pub const fn from_column_major(m: [Scalar; 16]) -> Self {
        Self { m }
    }

    /// Returns column `index` as a vector.
    #[inline]
    pub fn column(&self, index: usize) -> Vector4 {
        let c = index * 4;
        Vector4::new(self.m[c], self.m[c + 1], self.m[c + 2], self.m[c + 3])
    }

    /// Creates a translation matrix.
    pub fn make_translation(t: Vector3) -> Self {
        Self::from_column_major([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            t.x, t.y, t.z, 1.0, //
        ])
    }

    /// Creates a non-uniform scale matrix.
    pub fn make_scale(s: Vector3) -> Self {
        Self::from_column_major([
            s.x, 0.0, 0.0, 0.0, //
            0.0, s.y, 0.0, 0.0, //
            0.0, 0.0, s.z, 0.0, //
            0.0, 0.0, 0.0, 1.0, //
        ])
    }

    /// Maps the rectangle `(0, 0)..(width, height)` onto the full NDC range
    /// with the origin at the top left, flattening depth to `0.5`.
    pub fn make_orthographic(size: ISize) -> Self {
        let scale = Self::make_scale(Vector3::new(
            2.0 / size.width as Scalar,
            -2.0 / size.height as Scalar,
            0.0,
        ));
        let translate = Self::make_translation(Vector3::new(-1.0, 1.0, 0.5));
        translate * scale
    }

    /// Creates a perspective projection mapping `z_near` to depth 0 and
    /// `z_far` to depth 1.
    ///
    /// # Arguments
    ///
    /// * `fov_y`: The vertical field of view in radians.
    /// * `aspect_ratio`: Width divided by height.
    pub fn make_perspective(
        fov_y: Scalar,
        aspect_ratio: Scalar,
        z_near: Scalar,
        z_far: Scalar,
    ) -> Self {
        let height = (fov_y * 0.5).tan();
        let width = height * aspect_ratio;
        let depth = z_far - z_near;
        Self::from_column_major([
            1.0 / width, 0.0, 0.0, 0.0, //
            0.0, 1.0 / height, 0.0, 0.0, //
            0.0, 0.0, z_far / depth, 1.0, //
            0.0, 0.0, -(z_far * z_near) / depth, 0.0, //
        ])
    }

    /// Returns `(cos, sin)` of `radians`, snapping the smaller value to exactly
    /// zero when the other is exactly `±1`.
    ///
    /// Float precision near `1.0` is far coarser than near `0.0`, so a
    /// quadrant angle typically yields `sin == 1.0` alongside a `cos` that is
    /// merely tiny. Snapping keeps quadrant rotations exactly axis aligned.
    pub fn cos_sin(radians: Scalar) -> (Scalar, Scalar) {
        let mut cos = radians.cos();
        let mut sin = radians.sin();
        if cos.abs() == 1.0 {
            sin = 0.0;
        } else if sin.abs() == 1.0 {
            cos = 0.0;
        }
        (cos, sin)
    }

    /// Creates a rotation around the X axis.
    pub fn make_rotation_x(radians: Scalar) -> Self {
        let (c, s) = Self::cos_sin(radians);
        Self::from_column_major([
            1.0, 0.0, 0.0, 0.0, //
            0.0, c, s, 0.0, //
            0.0, -s, c, 0.0, //
            0.0, 0.0, 0.0, 1.0, //
        ])
    }

    /// Creates a rotation around the Y axis.
    pub fn make_rotation_y(radians: Scalar) -> Self {
        let (c, s) = Self::cos_sin(radians);
        Self::from_column_major([
            c, 0.0, -s, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            s, 0.0, c, 0.0, //
            0.0, 0.0, 0.0, 1.0, //
        ])
    }

    /// Creates a rotation around the Z axis.
    pub fn make_rotation_z(radians: Scalar) -> Self {
        let (c, s) = Self::cos_sin(radians);
        Self::from_column_major([
            c, s, 0.0, 0.0, //
            -s, c, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, //
        ])
    }

    /// Returns `true` if the matrix has a perspective component in 2D.
    #[inline]
    pub fn has_perspective_2d(&self) -> bool {
        self.m[3] != 0.0 || self.m[7] != 0.0 || self.m[15] != 1.0
    }

    /// Returns `true` if the matrix has any perspective component.
    #[inline]
    pub fn has_perspective(&self) -> bool {
        self.m[3] != 0.0 || self.m[7] != 0.0 || self.m[11] != 0.0 || self.m[15] != 1.0
    }

    /// Returns `true` if the 2D basis vectors are aligned with the X and Y axes
    /// (possibly swapped), within `tolerance`.
    pub fn is_aligned_2d(&self, tolerance: Scalar) -> bool {
        if self.has_perspective_2d() {
            return false;
        }
        let zero = |v: Scalar| scalar_nearly_zero_with_tolerance(v, tolerance);
        (zero(self.m[1]) && zero(self.m[4])) || (zero(self.m[0]) && zero(self.m[5]))
    }

    /// Returns `true` if each 3D basis vector lies along exactly one axis and
    /// no two basis vectors share an axis, within `tolerance`.
    pub fn is_aligned(&self, tolerance: Scalar) -> bool {
        if self.has_perspective() {
            return false;
        }
        let nz = |i: usize| u32::from(!scalar_nearly_zero_with_tolerance(self.m[i], tolerance));
        let v = [nz(0), nz(1), nz(2), nz(4), nz(5), nz(6), nz(8), nz(9), nz(10)];
        // Each basis vector must be aligned to a single axis.
        if v[0] + v[1] + v[2] != 1 || v[3] + v[4] + v[5] != 1 || v[6] + v[7] + v[8] != 1 {
            return false;
        }
        // And no two of them may overlap.
        v[0] + v[3] + v[6] == 1 && v[1] + v[4] + v[7] == 1 && v[2] + v[5] + v[8] == 1
    }

    /// Transforms a 3D point, performing the perspective divide.
    pub fn transform(&self, p: Vector3) -> Vector3 {
        let v = *self * Vector4::new(p.x, p.y, p.z, 1.0);
        if v.w == 0.0 {
            return Vector3::new(v.x, v.y, v.z);
        }
        Vector3::new(v.x / v.w, v.y / v.w, v.z / v.w)
    }

    /// Transforms a 2D point (with `z = 0`).
    pub fn transform_point(&self, p: Point) -> Point {
        let v = self.transform(Vector3::new(p.x, p.y, 0.0));
        Point::new(v.x, v.y)
    }
}

impl Mul for Matrix {
    type Output = Self;
    /// Concatenates two matrices. `a * b` applies `b` first.
    fn mul(self, rhs: Self) -> Self {
        let mut m = [0.0; 16];
        for c in 0..4 {
            for r in 0..4 {
                m[c * 4 + r] = (0..4).map(|k| self.m[k * 4 + r] * rhs.m[c * 4 + k]).sum();
            }
        }
        Self { m }
    }
}

impl Mul<Vector4> for Matrix {
    type Output = Vector4;
    #[inline]
    fn mul(self, v: Vector4) -> Vector4 {
        self.column(0) * v.x + self.column(1) * v.y + self.column(2) * v.z + self.column(3) * v.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{FRAC_PI_2, PI};
    use approx::assert_abs_diff_eq;

    fn assert_vec3_eq(a: Vector3, b: Vector3) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-5);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-5);
        assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-5);
    }

    #[test]
    fn test_identity_default() {
        assert_eq!(Matrix::default(), Matrix::IDENTITY);
        let t = Matrix::make_translation(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(t * Matrix::IDENTITY, t);
        assert_eq!(Matrix::IDENTITY * t, t);
    }

    #[test]
    fn test_orthographic_maps_to_ndc() {
        let m = Matrix::make_orthographic(ISize::new(100, 200));
        assert_vec3_eq(m.transform(Vector3::ZERO), Vector3::new(-1.0, 1.0, 0.5));
        assert_vec3_eq(
            m.transform(Vector3::new(100.0, 200.0, 42.0)),
            Vector3::new(1.0, -1.0, 0.5),
        );
        assert_vec3_eq(
            m.transform(Vector3::new(50.0, 100.0, 0.0)),
            Vector3::new(0.0, 0.0, 0.5),
        );
    }

    #[test]
    fn test_perspective_depth_range() {
        let m = Matrix::make_perspective(FRAC_PI_2, 1.0, 1.0, 100.0);
        assert_abs_diff_eq!(m.transform(Vector3::new(0.0, 0.0, 1.0)).z, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(m.transform(Vector3::new(0.0, 0.0, 100.0)).z, 1.0, epsilon = 1e-5);
        assert!(m.has_perspective());
        assert!(!m.is_aligned(0.0));
    }

    #[test]
    fn test_cos_sin_snaps_quadrants() {
        assert_eq!(Matrix::cos_sin(FRAC_PI_2), (0.0, 1.0));
        assert_eq!(Matrix::cos_sin(0.0), (1.0, 0.0));
        let (c, s) = Matrix::cos_sin(PI);
        assert_eq!(c, -1.0);
        assert_eq!(s, 0.0);
    }

    #[test]
    fn test_quadrant_rotations_are_aligned() {
        for angle in [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2] {
            let m = Matrix::make_rotation_z(angle);
            assert!(m.is_aligned_2d(0.0), "z rotation by {angle} should be 2D aligned");
            assert!(m.is_aligned(0.0), "z rotation by {angle} should be aligned");
        }
        assert!(Matrix::make_rotation_x(FRAC_PI_2).is_aligned(0.0));
        assert!(Matrix::make_rotation_y(FRAC_PI_2).is_aligned(0.0));
    }

    #[test]
    fn test_diagonal_rotation_is_not_aligned() {
        let m = Matrix::make_rotation_z(PI / 4.0);
        assert!(!m.is_aligned_2d(0.0));
        assert!(!m.is_aligned(0.0));
    }

    #[test]
    fn test_rotation_z_rotates_left_handed() {
        let m = Matrix::make_rotation_z(FRAC_PI_2);
        assert_vec3_eq(m.transform(Vector3::new(1.0, 0.0, 0.0)), Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_scale_is_aligned_but_degenerate_is_not() {
        assert!(Matrix::make_scale(Vector3::new(2.0, 3.0, 4.0)).is_aligned(0.0));
        assert!(!Matrix::make_scale(Vector3::new(2.0, 3.0, 0.0)).is_aligned(0.0));
        assert!(!Matrix::make_scale(Vector3::new(2.0, 3.0, 0.0)).has_perspective());
    }
}
