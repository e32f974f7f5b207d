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

//! Small vector, point and size value types.

use super::Scalar;
use std::ops::{Add, Div, Index, Mul, Neg, Sub};

// --- Vector3 ---

/// A 3-component vector of [`Scalar`]s.
///
/// Besides the usual vector algebra this type supports component-wise
/// arithmetic with a broadcast scalar (`v + 1.0`), which the color blend
/// equations rely on.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Vector3 {
    /// The x component.
    pub x: Scalar,
    /// The y component.
    pub y: Scalar,
    /// The z component.
    pub z: Scalar,
}

impl Vector3 {
    /// A vector with all components set to 0.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a new vector.
    #[inline]
    pub const fn new(x: Scalar, y: Scalar, z: Scalar) -> Self {
        Self { x, y, z }
    }

    /// Creates a vector with all three components set to `v`.
    #[inline]
    pub const fn splat(v: Scalar) -> Self {
        Self::new(v, v, v)
    }

    /// Component-wise minimum.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Component-wise absolute value.
    #[inline]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// Component-wise square root.
    #[inline]
    pub fn sqrt(self) -> Self {
        Self::new(self.x.sqrt(), self.y.sqrt(), self.z.sqrt())
    }

    /// The smallest of the three components.
    #[inline]
    pub fn min_component(self) -> Scalar {
        self.x.min(self.y).min(self.z)
    }

    /// The largest of the three components.
    #[inline]
    pub fn max_component(self) -> Scalar {
        self.x.max(self.y).max(self.z)
    }

    /// Computes the dot product.
    #[inline]
    pub fn dot(self, other: Self) -> Scalar {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Computes the length of the vector.
    #[inline]
    pub fn length(self) -> Scalar {
        self.dot(self).sqrt()
    }
}

impl Add for Vector3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Add<Scalar> for Vector3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Scalar) -> Self {
        self + Self::splat(rhs)
    }
}

impl Add<Vector3> for Scalar {
    type Output = Vector3;
    #[inline]
    fn add(self, rhs: Vector3) -> Vector3 {
        rhs + self
    }
}

impl Sub for Vector3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Sub<Scalar> for Vector3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Scalar) -> Self {
        self - Self::splat(rhs)
    }
}

impl Sub<Vector3> for Scalar {
    type Output = Vector3;
    #[inline]
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::splat(self) - rhs
    }
}

impl Mul for Vector3 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}

impl Mul<Scalar> for Vector3 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Scalar) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Mul<Vector3> for Scalar {
    type Output = Vector3;
    #[inline]
    fn mul(self, rhs: Vector3) -> Vector3 {
        rhs * self
    }
}

impl Div<Scalar> for Vector3 {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Scalar) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// --- Vector4 ---

/// A 4-component vector, used for matrix columns and homogeneous points.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Vector4 {
    /// The x component.
    pub x: Scalar,
    /// The y component.
    pub y: Scalar,
    /// The z component.
    pub z: Scalar,
    /// The w component.
    pub w: Scalar,
}

impl Vector4 {
    /// A vector with all components set to 0.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a new vector.
    #[inline]
    pub const fn new(x: Scalar, y: Scalar, z: Scalar, w: Scalar) -> Self {
        Self { x, y, z, w }
    }

    /// Computes the dot product.
    #[inline]
    pub fn dot(self, other: Self) -> Scalar {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }
}

impl Index<usize> for Vector4 {
    type Output = Scalar;
    #[inline]
    fn index(&self, index: usize) -> &Scalar {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.w,
            _ => panic!("Vector4 index out of bounds: {index}"),
        }
    }
}

impl Add for Vector4 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z, self.w + rhs.w)
    }
}

impl Mul<Scalar> for Vector4 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Scalar) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs, self.w * rhs)
    }
}

// --- Point ---

/// A 2D point in [`Scalar`] coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// The x coordinate.
    pub x: Scalar,
    /// The y coordinate.
    pub y: Scalar,
}

impl Point {
    /// Creates a new point.
    #[inline]
    pub const fn new(x: Scalar, y: Scalar) -> Self {
        Self { x, y }
    }
}

// --- Size ---

/// A width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size<T> {
    /// The horizontal extent.
    pub width: T,
    /// The vertical extent.
    pub height: T,
}

/// An integral size, used for texture dimensions.
pub type ISize = Size<i64>;

impl<T> Size<T> {
    /// Creates a new size.
    #[inline]
    pub const fn new(width: T, height: T) -> Self {
        Self { width, height }
    }
}

impl<T: Copy + PartialOrd + Default + Mul<Output = T>> Size<T> {
    /// Returns `true` if either dimension is zero or negative.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > T::default() && self.height > T::default())
    }

    /// Returns `width * height`.
    #[inline]
    pub fn area(&self) -> T {
        self.width * self.height
    }

    /// Returns `true` if both dimensions fit within `other`.
    #[inline]
    pub fn fits_within(&self, other: &Self) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector3_scalar_broadcast() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(v + 1.0, Vector3::new(2.0, 3.0, 4.0));
        assert_eq!(1.0 - v, Vector3::new(0.0, -1.0, -2.0));
        assert_eq!(2.0 * v, Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(v / 2.0, Vector3::new(0.5, 1.0, 1.5));
    }

    #[test]
    fn test_vector3_component_helpers() {
        let v = Vector3::new(-1.0, 4.0, 2.0);
        assert_eq!(v.min_component(), -1.0);
        assert_eq!(v.max_component(), 4.0);
        assert_eq!(v.abs(), Vector3::new(1.0, 4.0, 2.0));
        assert_eq!(v.min(Vector3::splat(0.0)), Vector3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_size_queries() {
        let s = ISize::new(1920, 1080);
        assert!(!s.is_empty());
        assert_eq!(s.area(), 1920 * 1080);
        assert!(ISize::new(0, 10).is_empty());
        assert!(ISize::new(16, 16).fits_within(&s));
        assert!(!ISize::new(4096, 16).fits_within(&s));
    }
}
