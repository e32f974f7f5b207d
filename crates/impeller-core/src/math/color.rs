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

//! Defines the [`Color`] type and the [`BlendMode`] table.

use super::vector::Vector3;
use super::{scalar_nearly_equal, Scalar, EH_CLOSE_ENOUGH};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// An RGBA color with [`Scalar`] components.
///
/// Components are conventionally in `[0, 1]` but the type never clamps them.
/// Unless stated otherwise a `Color` is *unpremultiplied*.
///
/// `#[repr(C)]` keeps the layout stable for upload into uniform buffers.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Color {
    /// The red component.
    pub red: Scalar,
    /// The green component.
    pub green: Scalar,
    /// The blue component.
    pub blue: Scalar,
    /// The alpha (opacity) component.
    pub alpha: Scalar,
}

impl Color {
    /// Fully transparent black.
    pub const BLACK_TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    /// Opaque black.
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    /// Opaque red.
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    /// Opaque green.
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    /// Opaque blue.
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    /// Creates a new color.
    #[inline]
    pub const fn new(red: Scalar, green: Scalar, blue: Scalar, alpha: Scalar) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Returns the color with its RGB channels scaled by alpha.
    #[inline]
    pub fn premultiply(&self) -> Self {
        Self::new(
            self.red * self.alpha,
            self.green * self.alpha,
            self.blue * self.alpha,
            self.alpha,
        )
    }

    /// Inverse of [`Color::premultiply`].
    ///
    /// A color whose alpha is nearly zero unpremultiplies to transparent black.
    #[inline]
    pub fn unpremultiply(&self) -> Self {
        if scalar_nearly_equal(self.alpha, 0.0) {
            return Self::BLACK_TRANSPARENT;
        }
        Self::new(
            self.red / self.alpha,
            self.green / self.alpha,
            self.blue / self.alpha,
            self.alpha,
        )
    }

    /// Component-wise minimum against a scalar threshold.
    #[inline]
    pub fn min_scalar(&self, threshold: Scalar) -> Self {
        Self::new(
            self.red.min(threshold),
            self.green.min(threshold),
            self.blue.min(threshold),
            self.alpha.min(threshold),
        )
    }

    /// Returns `true` if the color is fully opaque.
    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.alpha == 1.0
    }

    /// Returns `true` if the color is fully transparent.
    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.alpha <= 0.0
    }

    #[inline]
    fn rgb(&self) -> Vector3 {
        Vector3::new(self.red, self.green, self.blue)
    }

    #[inline]
    fn from_rgb(rgb: Vector3, alpha: Scalar) -> Self {
        Self::new(rgb.x, rgb.y, rgb.z, alpha)
    }
}

impl Add for Color {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.red + rhs.red,
            self.green + rhs.green,
            self.blue + rhs.blue,
            self.alpha + rhs.alpha,
        )
    }
}

impl Sub for Color {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.red - rhs.red,
            self.green - rhs.green,
            self.blue - rhs.blue,
            self.alpha - rhs.alpha,
        )
    }
}

impl Mul for Color {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.red * rhs.red,
            self.green * rhs.green,
            self.blue * rhs.blue,
            self.alpha * rhs.alpha,
        )
    }
}

impl Mul<Scalar> for Color {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Scalar) -> Self {
        Self::new(
            self.red * rhs,
            self.green * rhs,
            self.blue * rhs,
            self.alpha * rhs,
        )
    }
}

impl Div<Scalar> for Color {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Scalar) -> Self {
        Self::new(
            self.red / rhs,
            self.green / rhs,
            self.blue / rhs,
            self.alpha / rhs,
        )
    }
}

// --- Blend Modes ---

/// The closed set of blend modes understood by the renderer.
///
/// The first block is the Porter-Duff set, followed by the separable modes
/// and finally the non-separable (HSL based) modes, starting at
/// [`BlendMode::Hue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BlendMode {
    /// `r = 0`
    Clear,
    /// `r = s`
    Source,
    /// `r = d`
    Destination,
    /// `r = s + (1 - sa) * d`
    #[default]
    SourceOver,
    /// `r = d + (1 - da) * s`
    DestinationOver,
    /// `r = s * da`
    SourceIn,
    /// `r = d * sa`
    DestinationIn,
    /// `r = s * (1 - da)`
    SourceOut,
    /// `r = d * (1 - sa)`
    DestinationOut,
    /// `r = d * (1 - sa) + s * da`
    SourceATop,
    /// `r = s * (1 - da) + d * sa`
    DestinationATop,
    /// `r = s * (1 - da) + d * (1 - sa)`
    Xor,
    /// `r = min(s + d, 1)`
    Plus,
    /// `r = s * d`
    Modulate,
    /// Separable: `s + d - s * d`.
    Screen,
    /// Separable: hard light with source and destination swapped.
    Overlay,
    /// Separable: `min(s, d)`.
    Darken,
    /// Separable: `max(s, d)`.
    Lighten,
    /// Separable: brightens the destination to reflect the source.
    ColorDodge,
    /// Separable: darkens the destination to reflect the source.
    ColorBurn,
    /// Separable: multiply or screen depending on the source.
    HardLight,
    /// Separable: a softer version of hard light.
    SoftLight,
    /// Separable: `|d - s|`.
    Difference,
    /// Separable: `d + s - 2 * d * s`.
    Exclusion,
    /// Separable: `s * d`.
    Multiply,
    /// Non-separable: source hue with destination saturation and luminosity.
    Hue,
    /// Non-separable: source saturation with destination hue and luminosity.
    Saturation,
    /// Non-separable: source hue and saturation with destination luminosity.
    Color,
    /// Non-separable: source luminosity with destination hue and saturation.
    Luminosity,
}

impl BlendMode {
    /// Every blend mode, in declaration order.
    pub const ALL: [BlendMode; 29] = [
        BlendMode::Clear,
        BlendMode::Source,
        BlendMode::Destination,
        BlendMode::SourceOver,
        BlendMode::DestinationOver,
        BlendMode::SourceIn,
        BlendMode::DestinationIn,
        BlendMode::SourceOut,
        BlendMode::DestinationOut,
        BlendMode::SourceATop,
        BlendMode::DestinationATop,
        BlendMode::Xor,
        BlendMode::Plus,
        BlendMode::Modulate,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Multiply,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
    ];

    /// The last Porter-Duff mode; every mode after it is an "advanced" mode.
    pub const LAST_PIPELINE_BLEND_MODE: BlendMode = BlendMode::Modulate;

    /// Returns the name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Clear => "Clear",
            BlendMode::Source => "Source",
            BlendMode::Destination => "Destination",
            BlendMode::SourceOver => "SourceOver",
            BlendMode::DestinationOver => "DestinationOver",
            BlendMode::SourceIn => "SourceIn",
            BlendMode::DestinationIn => "DestinationIn",
            BlendMode::SourceOut => "SourceOut",
            BlendMode::DestinationOut => "DestinationOut",
            BlendMode::SourceATop => "SourceATop",
            BlendMode::DestinationATop => "DestinationATop",
            BlendMode::Xor => "Xor",
            BlendMode::Plus => "Plus",
            BlendMode::Modulate => "Modulate",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "ColorDodge",
            BlendMode::ColorBurn => "ColorBurn",
            BlendMode::HardLight => "HardLight",
            BlendMode::SoftLight => "SoftLight",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Multiply => "Multiply",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }

    /// Returns `true` for the modes the fixed-function blender can express.
    #[inline]
    pub fn is_porter_duff(&self) -> bool {
        *self <= Self::LAST_PIPELINE_BLEND_MODE
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// --- Blend helpers ---

#[inline]
fn luminosity(color: Vector3) -> Scalar {
    color.x * 0.3 + color.y * 0.59 + color.z * 0.11
}

fn clip_color(mut color: Vector3) -> Vector3 {
    let lum = luminosity(color);
    let mn = color.min_component();
    let mx = color.max_component();
    // `lum - mn` and `mx - lum` are non-negative in these branches; the small
    // bias keeps the divisions finite.
    if mn < 0.0 {
        color = lum + ((color - lum) * lum) / (lum - mn + EH_CLOSE_ENOUGH);
    }
    if mx > 1.0 {
        color = lum + ((color - lum) * (1.0 - lum)) / (mx - lum + EH_CLOSE_ENOUGH);
    }
    color
}

#[inline]
fn set_luminosity(color: Vector3, lum: Scalar) -> Vector3 {
    let relative_lum = lum - luminosity(color);
    clip_color(color + relative_lum)
}

#[inline]
fn saturation(color: Vector3) -> Scalar {
    color.max_component() - color.min_component()
}

fn set_saturation(color: Vector3, sat: Scalar) -> Vector3 {
    let mn = color.min_component();
    let mx = color.max_component();
    if mn < mx {
        ((color - mn) * sat) / (mx - mn)
    } else {
        Vector3::ZERO
    }
}

/// Picks `b` where `value > cutoff`, `a` otherwise, per component.
#[inline]
fn component_choose(a: Vector3, b: Vector3, value: Vector3, cutoff: Scalar) -> Vector3 {
    Vector3::new(
        if value.x > cutoff { b.x } else { a.x },
        if value.y > cutoff { b.y } else { a.y },
        if value.z > cutoff { b.z } else { a.z },
    )
}

/// Composites `blend_result` (the color for the overlapping region) onto `dst`.
/// Inputs are unpremultiplied; the result is premultiplied.
fn apply_blended_color(dst: Color, src: Color, blend_result: Vector3) -> Color {
    let dst = dst.premultiply();
    let src = Color::from_rgb(blend_result, src.alpha * dst.alpha).premultiply()
        + src.premultiply() * (1.0 - dst.alpha);
    src + dst * (1.0 - src.alpha)
}

#[inline]
fn do_color_blend(dst: Color, src: Color, f: impl Fn(Vector3, Vector3) -> Vector3) -> Color {
    let blend_result = f(dst.rgb(), src.rgb());
    apply_blended_color(dst, src, blend_result).unpremultiply()
}

#[inline]
fn do_color_blend_components(
    dst: Color,
    src: Color,
    f: impl Fn(Scalar, Scalar) -> Scalar,
) -> Color {
    let blend_result = Vector3::new(
        f(dst.red, src.red),
        f(dst.green, src.green),
        f(dst.blue, src.blue),
    );
    apply_blended_color(dst, src, blend_result).unpremultiply()
}

impl Color {
    /// Blends `src` onto `self` (the destination) using `mode`.
    ///
    /// Both colors are unpremultiplied, and so is the result. Every mode is
    /// implemented, including the non-separable HSL modes.
    pub fn blend(&self, src: Color, mode: BlendMode) -> Color {
        let dst = *self;
        match mode {
            BlendMode::Clear => Color::BLACK_TRANSPARENT,
            BlendMode::Source => src,
            BlendMode::Destination => dst,
            BlendMode::SourceOver => {
                (src.premultiply() + dst.premultiply() * (1.0 - src.alpha)).unpremultiply()
            }
            BlendMode::DestinationOver => {
                (dst.premultiply() + src.premultiply() * (1.0 - dst.alpha)).unpremultiply()
            }
            BlendMode::SourceIn => (src.premultiply() * dst.alpha).unpremultiply(),
            BlendMode::DestinationIn => (dst.premultiply() * src.alpha).unpremultiply(),
            BlendMode::SourceOut => (src.premultiply() * (1.0 - dst.alpha)).unpremultiply(),
            BlendMode::DestinationOut => (dst.premultiply() * (1.0 - src.alpha)).unpremultiply(),
            BlendMode::SourceATop => (dst.premultiply() * (1.0 - src.alpha)
                + src.premultiply() * dst.alpha)
                .unpremultiply(),
            BlendMode::DestinationATop => (src.premultiply() * (1.0 - dst.alpha)
                + dst.premultiply() * src.alpha)
                .unpremultiply(),
            BlendMode::Xor => (src.premultiply() * (1.0 - dst.alpha)
                + dst.premultiply() * (1.0 - src.alpha))
                .unpremultiply(),
            BlendMode::Plus => (src.premultiply() + dst.premultiply())
                .min_scalar(1.0)
                .unpremultiply(),
            BlendMode::Modulate => (src.premultiply() * dst.premultiply()).unpremultiply(),
            BlendMode::Screen => do_color_blend(dst, src, |d, s| s + d - s * d),
            BlendMode::Overlay => do_color_blend(dst, src, |d, s| {
                // Hard light with the operands swapped.
                let screen_src = 2.0 * d - 1.0;
                let screen = screen_src + s - screen_src * s;
                component_choose(s * (2.0 * d), screen, d, 0.5)
            }),
            BlendMode::Darken => do_color_blend(dst, src, |d, s| d.min(s)),
            BlendMode::Lighten => do_color_blend(dst, src, |d, s| d.max(s)),
            BlendMode::ColorDodge => do_color_blend_components(dst, src, |d, s| {
                if d < EH_CLOSE_ENOUGH {
                    return 0.0;
                }
                if 1.0 - s < EH_CLOSE_ENOUGH {
                    return 1.0;
                }
                (d / (1.0 - s)).min(1.0)
            }),
            BlendMode::ColorBurn => do_color_blend_components(dst, src, |d, s| {
                if 1.0 - d < EH_CLOSE_ENOUGH {
                    return 1.0;
                }
                if s < EH_CLOSE_ENOUGH {
                    return 0.0;
                }
                1.0 - ((1.0 - d) / s).min(1.0)
            }),
            BlendMode::HardLight => do_color_blend(dst, src, |d, s| {
                let screen_src = 2.0 * s - 1.0;
                let screen = screen_src + d - screen_src * d;
                component_choose(d * (2.0 * s), screen, s, 0.5)
            }),
            BlendMode::SoftLight => do_color_blend(dst, src, |d, s| {
                let big_d = component_choose(((16.0 * d - 12.0) * d + 4.0) * d, d.sqrt(), d, 0.25);
                component_choose(
                    d - (1.0 - 2.0 * s) * d * (1.0 - d),
                    d + (2.0 * s - 1.0) * (big_d - d),
                    s,
                    0.5,
                )
            }),
            BlendMode::Difference => do_color_blend(dst, src, |d, s| (d - s).abs()),
            BlendMode::Exclusion => do_color_blend(dst, src, |d, s| d + s - 2.0 * d * s),
            BlendMode::Multiply => do_color_blend(dst, src, |d, s| d * s),
            BlendMode::Hue => do_color_blend(dst, src, |d, s| {
                set_luminosity(set_saturation(s, saturation(d)), luminosity(d))
            }),
            BlendMode::Saturation => do_color_blend(dst, src, |d, s| {
                set_luminosity(set_saturation(d, saturation(s)), luminosity(d))
            }),
            BlendMode::Color => do_color_blend(dst, src, |d, s| set_luminosity(s, luminosity(d))),
            BlendMode::Luminosity => {
                do_color_blend(dst, src, |d, s| set_luminosity(d, luminosity(s)))
            }
        }
    }

    /// The older blend entry point, operating on **premultiplied** colors.
    ///
    /// Porter-Duff and most separable modes use the premultiplied equations
    /// directly. `SoftLight` and the non-separable modes (`Hue`,
    /// `Saturation`, `Color`, `Luminosity`) are not implemented here and
    /// fall back to `SourceOver`. New code should use [`Color::blend`].
    pub fn blend_color(src: Color, dst: Color, mode: BlendMode) -> Color {
        // Separable modes share the source-over alpha.
        let apply_rgb_srcover_alpha = |f: &dyn Fn(Scalar, Scalar) -> Scalar| -> Color {
            Color::new(
                f(src.red, dst.red),
                f(src.green, dst.green),
                f(src.blue, dst.blue),
                dst.alpha * (1.0 - src.alpha) + src.alpha,
            )
        };
        let (sa, da) = (src.alpha, dst.alpha);

        match mode {
            BlendMode::Clear => Color::BLACK_TRANSPARENT,
            BlendMode::Source => src,
            BlendMode::Destination => dst,
            BlendMode::SourceOver => src + dst * (1.0 - sa),
            BlendMode::DestinationOver => dst + src * (1.0 - da),
            BlendMode::SourceIn => src * da,
            BlendMode::DestinationIn => dst * sa,
            BlendMode::SourceOut => src * (1.0 - da),
            BlendMode::DestinationOut => dst * (1.0 - sa),
            BlendMode::SourceATop => dst * (1.0 - sa) + src * da,
            BlendMode::DestinationATop => src * (1.0 - da) + dst * sa,
            BlendMode::Xor => src * (1.0 - da) + dst * (1.0 - sa),
            BlendMode::Plus => (src + dst).min_scalar(1.0),
            BlendMode::Modulate => src * dst,
            BlendMode::Screen => src + dst - src * dst,
            BlendMode::Overlay => apply_rgb_srcover_alpha(&|s, d| {
                let base = s * (1.0 - da) + d * (1.0 - sa);
                if 2.0 * d <= da {
                    base + 2.0 * s * d
                } else {
                    base + sa * da - 2.0 * (da - d) * (sa - s)
                }
            }),
            BlendMode::Darken => apply_rgb_srcover_alpha(&|s, d| s + d - (s * da).max(d * sa)),
            BlendMode::Lighten => apply_rgb_srcover_alpha(&|s, d| s + d - (s * da).min(d * sa)),
            BlendMode::ColorDodge => apply_rgb_srcover_alpha(&|s, d| {
                if d == 0.0 {
                    return s * (1.0 - da);
                }
                if s == sa {
                    return s + d * (1.0 - sa);
                }
                sa * da.min(d * sa / (sa - s)) + s * (1.0 - da) + d * (1.0 - sa)
            }),
            BlendMode::ColorBurn => apply_rgb_srcover_alpha(&|s, d| {
                if d == da {
                    return d + s * (1.0 - da);
                }
                if s == 0.0 {
                    return d * (1.0 - sa);
                }
                sa * (da - da.min((da - d) * sa / s)) + s * (1.0 - da) + d * (1.0 - sa)
            }),
            BlendMode::HardLight => apply_rgb_srcover_alpha(&|s, d| {
                let base = s * (1.0 - da) + d * (1.0 - sa);
                if 2.0 * s <= sa {
                    base + 2.0 * s * d
                } else {
                    base + sa * da - 2.0 * (da - d) * (sa - s)
                }
            }),
            BlendMode::Difference => {
                apply_rgb_srcover_alpha(&|s, d| s + d - 2.0 * (s * da).min(d * sa))
            }
            BlendMode::Exclusion => apply_rgb_srcover_alpha(&|s, d| s + d - 2.0 * s * d),
            BlendMode::Multiply => {
                apply_rgb_srcover_alpha(&|s, d| s * (1.0 - da) + d * (1.0 - sa) + s * d)
            }
            BlendMode::SoftLight
            | BlendMode::Hue
            | BlendMode::Saturation
            | BlendMode::Color
            | BlendMode::Luminosity => src + dst * (1.0 - sa),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_color_eq(actual: Color, expected: Color) {
        assert_abs_diff_eq!(actual.red, expected.red, epsilon = 1e-4);
        assert_abs_diff_eq!(actual.green, expected.green, epsilon = 1e-4);
        assert_abs_diff_eq!(actual.blue, expected.blue, epsilon = 1e-4);
        assert_abs_diff_eq!(actual.alpha, expected.alpha, epsilon = 1e-4);
    }

    #[test]
    fn test_premultiply_roundtrip() {
        let c = Color::new(0.2, 0.4, 0.8, 0.5);
        assert_color_eq(c.premultiply(), Color::new(0.1, 0.2, 0.4, 0.5));
        assert_color_eq(c.premultiply().unpremultiply(), c);
    }

    #[test]
    fn test_unpremultiply_near_zero_alpha_is_transparent_black() {
        let c = Color::new(0.5, 0.5, 0.5, 0.0001);
        assert_eq!(c.unpremultiply(), Color::BLACK_TRANSPARENT);
    }

    #[test]
    fn test_blend_source_over_matches_porter_duff() {
        let samples = [
            Color::new(0.2, 0.4, 0.6, 0.5),
            Color::new(1.0, 0.0, 0.0, 1.0),
            Color::new(0.0, 0.7, 0.3, 0.25),
            Color::new(0.9, 0.9, 0.1, 0.8),
        ];
        for &src in &samples {
            for &dst in &samples {
                let expected =
                    (src.premultiply() + dst.premultiply() * (1.0 - src.alpha)).unpremultiply();
                assert_color_eq(dst.blend(src, BlendMode::SourceOver), expected);
            }
        }
    }

    #[test]
    fn test_blend_trivial_modes() {
        let src = Color::new(0.1, 0.2, 0.3, 0.4);
        let dst = Color::new(0.5, 0.6, 0.7, 0.8);
        assert_eq!(dst.blend(src, BlendMode::Clear), Color::BLACK_TRANSPARENT);
        assert_eq!(dst.blend(src, BlendMode::Source), src);
        assert_eq!(dst.blend(src, BlendMode::Destination), dst);
    }

    #[test]
    fn test_blend_separable_modes_on_opaque_colors() {
        let src = Color::new(0.5, 0.5, 0.5, 1.0);
        let dst = Color::new(0.4, 0.2, 1.0, 1.0);
        assert_color_eq(
            dst.blend(src, BlendMode::Multiply),
            Color::new(0.2, 0.1, 0.5, 1.0),
        );
        assert_color_eq(
            dst.blend(src, BlendMode::Screen),
            Color::new(0.7, 0.6, 1.0, 1.0),
        );
        assert_color_eq(
            dst.blend(src, BlendMode::Difference),
            Color::new(0.1, 0.3, 0.5, 1.0),
        );
        assert_color_eq(
            dst.blend(src, BlendMode::Darken),
            Color::new(0.4, 0.2, 0.5, 1.0),
        );
    }

    #[test]
    fn test_blend_hue_onto_gray_keeps_gray() {
        let dst = Color::new(0.5, 0.5, 0.5, 1.0);
        let src = Color::RED;
        assert_color_eq(dst.blend(src, BlendMode::Hue), dst);
    }

    #[test]
    fn test_blend_luminosity_clips_to_white() {
        let dst = Color::RED;
        let src = Color::WHITE;
        assert_color_eq(dst.blend(src, BlendMode::Luminosity), Color::WHITE);
    }

    #[test]
    fn test_blend_plus_clamps() {
        let c = Color::new(0.8, 0.8, 0.8, 1.0);
        assert_color_eq(c.blend(c, BlendMode::Plus), Color::WHITE);
    }

    #[test]
    fn test_legacy_blend_non_separable_falls_back_to_source_over() {
        let src = Color::new(0.2, 0.1, 0.05, 0.5).premultiply();
        let dst = Color::new(0.3, 0.6, 0.9, 1.0);
        let source_over = Color::blend_color(src, dst, BlendMode::SourceOver);
        for mode in [
            BlendMode::SoftLight,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::Color,
            BlendMode::Luminosity,
        ] {
            assert_eq!(Color::blend_color(src, dst, mode), source_over, "{mode}");
        }
    }

    #[test]
    fn test_legacy_and_canonical_agree_on_source_over() {
        let src = Color::new(0.2, 0.4, 0.6, 0.5);
        let dst = Color::new(0.9, 0.3, 0.1, 0.75);
        let legacy =
            Color::blend_color(src.premultiply(), dst.premultiply(), BlendMode::SourceOver);
        assert_color_eq(legacy.unpremultiply(), dst.blend(src, BlendMode::SourceOver));
    }

    #[test]
    fn test_blend_mode_table() {
        assert_eq!(BlendMode::ALL.len(), 29);
        assert!(BlendMode::Modulate.is_porter_duff());
        assert!(!BlendMode::Screen.is_porter_duff());
        assert_eq!(BlendMode::ColorDodge.to_string(), "ColorDodge");
    }
}
