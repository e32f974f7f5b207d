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

//! Overflow-safe arithmetic for untrusted or accumulating quantities.
//!
//! Signed integer `add`/`sub` clamp to the representable range instead of
//! wrapping. Floating point `add`/`sub` return the plain IEEE-754 result:
//! `add(f32::MAX, f32::MAX)` is `+inf`, not `f32::MAX`.
//!
//! [`average_scalar`] halves each operand before summing so that two values
//! near the top of their range never overflow the intermediate sum.
//!
//! [`cast`] saturates float-to-integer conversions (NaN maps to zero) and
//! clamps finite `f64` values that do not fit into an `f32`.

use super::Scalar;

/// Arithmetic that never wraps on overflow.
pub trait SaturatingArithmetic: Copy {
    /// `self + other`, clamped for integers.
    fn saturated_add(self, other: Self) -> Self;
    /// `self - other`, clamped for integers.
    fn saturated_sub(self, other: Self) -> Self;
    /// The mean of `self` and `other` as a [`Scalar`], computed as
    /// `self / 2 + other / 2`.
    fn average_scalar(self, other: Self) -> Scalar;
}

macro_rules! impl_saturating_int {
    ($($t:ty),*) => {
        $(
            impl SaturatingArithmetic for $t {
                #[inline]
                fn saturated_add(self, other: Self) -> Self {
                    self.saturating_add(other)
                }

                #[inline]
                fn saturated_sub(self, other: Self) -> Self {
                    self.saturating_sub(other)
                }

                #[inline]
                fn average_scalar(self, other: Self) -> Scalar {
                    // Halving in f64 is exact for every integer width here;
                    // only the final narrowing to Scalar rounds.
                    ((self as f64) * 0.5 + (other as f64) * 0.5) as Scalar
                }
            }
        )*
    };
}

impl_saturating_int!(i8, i16, i32, i64);

impl SaturatingArithmetic for f32 {
    #[inline]
    fn saturated_add(self, other: Self) -> Self {
        self + other
    }

    #[inline]
    fn saturated_sub(self, other: Self) -> Self {
        self - other
    }

    #[inline]
    fn average_scalar(self, other: Self) -> Scalar {
        self * 0.5 + other * 0.5
    }
}

impl SaturatingArithmetic for f64 {
    #[inline]
    fn saturated_add(self, other: Self) -> Self {
        self + other
    }

    #[inline]
    fn saturated_sub(self, other: Self) -> Self {
        self - other
    }

    #[inline]
    fn average_scalar(self, other: Self) -> Scalar {
        (self * 0.5 + other * 0.5) as Scalar
    }
}

/// Adds two values, clamping integer results to the type's range.
#[inline]
pub fn add<T: SaturatingArithmetic>(a: T, b: T) -> T {
    a.saturated_add(b)
}

/// Subtracts `b` from `a`, clamping integer results to the type's range.
#[inline]
pub fn sub<T: SaturatingArithmetic>(a: T, b: T) -> T {
    a.saturated_sub(b)
}

/// Averages two values without overflowing the intermediate sum.
#[inline]
pub fn average_scalar<T: SaturatingArithmetic>(a: T, b: T) -> Scalar {
    a.average_scalar(b)
}

/// A conversion that clamps instead of producing an out-of-range value.
pub trait SaturatingCast<To>: Copy {
    /// Converts `self`, saturating at the bounds of `To`.
    fn saturating_cast(self) -> To;
}

macro_rules! impl_float_to_int_cast {
    ($from:ty => $($to:ty),*) => {
        $(
            impl SaturatingCast<$to> for $from {
                #[inline]
                fn saturating_cast(self) -> $to {
                    // `as` already saturates float-to-int and maps NaN to 0.
                    self as $to
                }
            }
        )*
    };
}

impl_float_to_int_cast!(f32 => i8, i16, i32, i64);
impl_float_to_int_cast!(f64 => i8, i16, i32, i64);

impl SaturatingCast<f32> for f64 {
    #[inline]
    fn saturating_cast(self) -> f32 {
        if self.is_finite() {
            self.clamp(-(f32::MAX as f64), f32::MAX as f64) as f32
        } else {
            // Non-finite inputs keep their class (inf stays inf, NaN stays NaN).
            self as f32
        }
    }
}

impl SaturatingCast<f64> for f32 {
    #[inline]
    fn saturating_cast(self) -> f64 {
        self as f64
    }
}

impl SaturatingCast<f32> for f32 {
    #[inline]
    fn saturating_cast(self) -> f32 {
        self
    }
}

/// Converts `value` to `To`, saturating at the destination's bounds.
#[inline]
pub fn cast<From, To>(value: From) -> To
where
    From: SaturatingCast<To>,
{
    value.saturating_cast()
}
