use serde::{Deserialize, Serialize};

/// An integer offset plus extent in one of a panel's coordinate spaces.
///
/// The offset may be negative (a zoomed render rectangle can start left of
/// the surface origin); the extent never is.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Dimension {
    /// Creates a dimension at `(x, y)` with extent `w` × `h`.
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Dimension { x, y, w, h }
    }

    /// Creates a dimension anchored at the origin.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::dimension::Dimension;
    /// let d = Dimension::sized(800, 600);
    /// assert_eq!((d.x, d.y, d.w, d.h), (0, 0, 800, 600));
    /// ```
    pub fn sized(w: u32, h: u32) -> Self {
        Dimension { x: 0, y: 0, w, h }
    }

    /// Builds the normalised rectangle spanned by two corners, in any order.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::dimension::Dimension;
    /// let d = Dimension::from_corners((50, 40), (10, 60));
    /// assert_eq!(d, Dimension::new(10, 40, 40, 20));
    /// ```
    pub fn from_corners(a: (i32, i32), b: (i32, i32)) -> Self {
        let x0 = a.0.min(b.0);
        let y0 = a.1.min(b.1);
        let x1 = a.0.max(b.0);
        let y1 = a.1.max(b.1);
        Dimension {
            x: x0,
            y: y0,
            w: (x1 as i64 - x0 as i64) as u32,
            h: (y1 as i64 - y0 as i64) as u32,
        }
    }

    /// A `size` × `size` square whose centre pixel is `(cx, cy)`. The offset
    /// saturates at the `i32` range.
    pub fn centered(cx: i32, cy: i32, size: u32) -> Self {
        let half = (size / 2) as i32;
        Dimension::new(cx.saturating_sub(half), cy.saturating_sub(half), size, size)
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Same extent, offset moved back to the origin.
    pub fn extent(&self) -> Dimension {
        Dimension::sized(self.w, self.h)
    }

    /// Returns `true` when `(px, py)` lies inside the half-open rectangle.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && py >= self.y
            && (px as i64) < self.x as i64 + self.w as i64
            && (py as i64) < self.y as i64 + self.h as i64
    }

    /// Intersection of two rectangles; empty (zero extent) when they do not overlap.
    pub fn intersect(&self, other: &Dimension) -> Dimension {
        let x0 = self.x.max(other.x) as i64;
        let y0 = self.y.max(other.y) as i64;
        let x1 = (self.x as i64 + self.w as i64).min(other.x as i64 + other.w as i64);
        let y1 = (self.y as i64 + self.h as i64).min(other.y as i64 + other.h as i64);
        if x1 <= x0 || y1 <= y0 {
            return Dimension::new(x0 as i32, y0 as i32, 0, 0);
        }
        Dimension::new(x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

/// The named coordinate spaces a panel keeps track of.
///
/// - `original`: the image as decoded.
/// - `image`: current working resolution after crop/resize.
/// - `source`: crop window into image space.
/// - `render`: size and position as currently displayed.
/// - `base`: the fixed on-screen viewport.
/// - `magnified`: the scaled copy sampled by the loupe.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelDimensions {
    pub original: Dimension,
    pub image: Dimension,
    pub source: Dimension,
    pub render: Dimension,
    pub base: Dimension,
    pub magnified: Dimension,
}

impl PanelDimensions {
    /// Empty spaces with only the viewport set.
    pub fn with_base(base: Dimension) -> Self {
        PanelDimensions {
            base,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_half_open() {
        let d = Dimension::new(10, 10, 5, 5);
        assert!(d.contains(10, 10));
        assert!(d.contains(14, 14));
        assert!(!d.contains(15, 10));
        assert!(!d.contains(9, 12));
    }

    #[test]
    fn intersect_clips_to_overlap() {
        let a = Dimension::new(0, 0, 100, 100);
        let b = Dimension::new(80, -20, 50, 50);
        assert_eq!(a.intersect(&b), Dimension::new(80, 0, 20, 30));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = Dimension::new(0, 0, 10, 10);
        let b = Dimension::new(20, 20, 10, 10);
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn degenerate_corners_have_zero_area() {
        let d = Dimension::from_corners((5, 5), (5, 30));
        assert_eq!(d.area(), 0);
        assert!(d.is_empty());
    }

    #[test]
    fn extreme_corners_span_full_range() {
        let d = Dimension::from_corners((i32::MAX, i32::MAX), (i32::MIN, 0));
        assert_eq!((d.x, d.y), (i32::MIN, 0));
        assert_eq!((d.w, d.h), (u32::MAX, i32::MAX as u32));
    }

    #[test]
    fn centred_square_saturates() {
        let d = Dimension::centered(i32::MIN + 2, 0, 10);
        assert_eq!(d, Dimension::new(i32::MIN, -5, 10, 10));
    }
}
