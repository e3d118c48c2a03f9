//! Conversions between a panel's coordinate spaces.
//!
//! All functions are pure. Scale factors are always `source / target` per axis,
//! so [`scale_point`] maps a point expressed in `target` space into `source`
//! space: `scale_point(p, image, render)` turns a render-space pointer position
//! into image-space pixels, and `scale_point(p, render, image)` goes back.

use crate::dimension::Dimension;

/// Added to numerator and denominator of every scale ratio so a zero extent
/// never produces a zero or infinite scale.
pub const SCALE_EPSILON: f64 = 1e-6;

/// A width and height pair produced by [`scale_to_fit`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

/// A per-axis scale factor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

/// Largest size with the aspect ratio of `inner` that fits inside `outer`.
///
/// When `outer` is relatively wider than `inner`, the height is clamped to the
/// outer height and the width scaled; otherwise the width is clamped. The free
/// axis is rounded to the nearest integer, so re-applying the function with the
/// same outer bounds returns the same size.
///
/// # Examples
/// ```
/// # use rephoto::coordinate_transform::{scale_to_fit, Size};
/// assert_eq!(scale_to_fit(4000, 3000, 800, 800), Size { w: 800, h: 600 });
/// assert_eq!(scale_to_fit(1000, 2000, 800, 600), Size { w: 300, h: 600 });
/// ```
pub fn scale_to_fit(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> Size {
    if inner_w == 0 || inner_h == 0 || outer_w == 0 || outer_h == 0 {
        return Size { w: 0, h: 0 };
    }
    let inner_ratio = inner_w as f64 / inner_h as f64;
    let outer_ratio = outer_w as f64 / outer_h as f64;

    if outer_ratio > inner_ratio {
        let w = (inner_w as f64 * outer_h as f64 / inner_h as f64).round() as u32;
        Size {
            w: w.min(outer_w),
            h: outer_h,
        }
    } else {
        let h = (inner_h as f64 * outer_w as f64 / inner_w as f64).round() as u32;
        Size {
            w: outer_w,
            h: h.min(outer_h),
        }
    }
}

/// Per-axis ratio `source / target`, guarded against zero extents.
pub fn get_scale(source: &Dimension, target: &Dimension) -> Scale {
    Scale {
        x: (source.w as f64 + SCALE_EPSILON) / (target.w as f64 + SCALE_EPSILON),
        y: (source.h as f64 + SCALE_EPSILON) / (target.h as f64 + SCALE_EPSILON),
    }
}

/// Maps `(x, y)` from `target` space into `source` space, rounding to the
/// nearest integer.
///
/// # Examples
/// ```
/// # use rephoto::coordinate_transform::scale_point;
/// # use rephoto::dimension::Dimension;
/// let image = Dimension::sized(4000, 3000);
/// let render = Dimension::sized(800, 600);
/// assert_eq!(scale_point(100, 50, &image, &render), (500, 250));
/// assert_eq!(scale_point(500, 250, &render, &image), (100, 50));
/// ```
pub fn scale_point(x: i32, y: i32, source: &Dimension, target: &Dimension) -> (i32, i32) {
    let scale = get_scale(source, target);
    (
        (x as f64 * scale.x).round() as i32,
        (y as f64 * scale.y).round() as i32,
    )
}

/// Returns `true` when `(px, py)` lies in the axis-aligned square of
/// half-width `radius` centred at `(cx, cy)`, edges included.
///
/// This is a square test, not a circular one: corners at distance
/// `radius * sqrt(2)` still hit.
pub fn in_range(cx: i32, cy: i32, px: i32, py: i32, radius: i32) -> bool {
    (px as i64 - cx as i64).abs() <= radius as i64 && (py as i64 - cy as i64).abs() <= radius as i64
}
