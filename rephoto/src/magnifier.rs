use crate::config::MagnifierConfig;
use crate::control_point::ControlPoint;
use crate::coordinate_transform::{get_scale, in_range, scale_point};
use crate::dimension::{Dimension, PanelDimensions};
use crate::photo::Photo;
use crate::render_surface::{CanvasSurface, RenderSurface};

/// A control point drawn inside the loupe, in loupe-local pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoupeMarker {
    pub index: usize,
    pub x: i32,
    pub y: i32,
}

/// One rendered loupe.
#[derive(Debug, Clone, PartialEq)]
pub struct LoupeFrame {
    /// Always `size` × `size`, whatever was sampled.
    pub frame: Photo,
    /// The part of magnified space that was actually sampled.
    pub sampled: Dimension,
    pub markers: Vec<LoupeMarker>,
}

/// Renders the loupe around a render-local pointer position.
///
/// The pointer is mapped into the `magnified` space of `dims` (the render
/// extent times the magnification) and a `size` × `size` window around it is
/// sampled from `photo`. Near an image edge the sampled window shrinks while
/// the frame keeps its size; the uncovered part shows the background colour.
/// A crosshair marks the centre and control points within half the loupe size
/// of the pointer are projected into frame coordinates.
///
/// # Returns
/// `None` if the window misses the image entirely.
pub fn render_loupe(
    photo: &Photo,
    dims: &PanelDimensions,
    pointer: (i32, i32),
    points: &[ControlPoint],
    config: &MagnifierConfig,
) -> Option<LoupeFrame> {
    let magnified = dims.magnified;
    if photo.is_empty() || magnified.is_empty() {
        return None;
    }
    let size = config.size;
    let half = (size / 2) as i32;

    // positions in magnified space can exceed i32 after extreme zoom
    let (cx, cy) = scale_point(pointer.0, pointer.1, &magnified, &dims.render);
    let origin = (cx as i64 - half as i64, cy as i64 - half as i64);
    let window = Dimension::new(cx.saturating_sub(half), cy.saturating_sub(half), size, size);
    let sampled = window.intersect(&magnified.extent());
    if sampled.is_empty() {
        return None;
    }

    let mut frame = Photo::filled(size as usize, size as usize, config.background_color);
    let to_image = get_scale(&dims.image, &magnified);
    let (x0, y0) = (sampled.x as i64, sampled.y as i64);
    for my in y0..y0 + sampled.h as i64 {
        let iy = (((my as f64 + 0.5) * to_image.y) as usize).min(photo.height - 1);
        let fy = my - origin.1;
        for mx in x0..x0 + sampled.w as i64 {
            let ix = (((mx as f64 + 0.5) * to_image.x) as usize).min(photo.width - 1);
            let fx = mx - origin.0;
            if fx < 0 || fy < 0 {
                continue;
            }
            if let Some(rgba) = photo.get_rgba(ix, iy) {
                frame.set_rgba(fx as usize, fy as usize, rgba);
            }
        }
    }

    let mut canvas = CanvasSurface::from_photo(frame);
    let thickness = config.crosshair_thickness;
    let line_start = half - (thickness / 2) as i32;
    canvas.fill_rect(Dimension::new(0, line_start, size, thickness), config.crosshair_color);
    canvas.fill_rect(Dimension::new(line_start, 0, thickness, size), config.crosshair_color);

    let mut markers = Vec::new();
    for (index, point) in points.iter().enumerate() {
        let (px, py) = scale_point(point.x, point.y, &magnified, &dims.image);
        if !in_range(cx, cy, px, py, half) {
            continue;
        }
        let marker = LoupeMarker {
            index,
            x: (px as i64 - origin.0) as i32,
            y: (py as i64 - origin.1) as i32,
        };
        canvas.fill_rect(
            Dimension::centered(marker.x, marker.y, config.marker_size),
            config.marker_color,
        );
        markers.push(marker);
    }

    Some(LoupeFrame {
        frame: canvas.into_photo(),
        sampled,
        markers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 200x150 image shown at 800x600, magnified 3x to 2400x1800.
    fn dims() -> PanelDimensions {
        let image = Dimension::sized(200, 150);
        PanelDimensions {
            original: image,
            image,
            source: image,
            render: Dimension::sized(800, 600),
            base: Dimension::sized(800, 600),
            magnified: Dimension::sized(2400, 1800),
        }
    }

    fn quadrants() -> Photo {
        let mut photo = Photo::new(200, 150);
        for y in 0..150 {
            for x in 0..200 {
                let v = if x < 100 { 10 } else { 200 };
                photo.set_rgba(x, y, [v, v, v, 255]);
            }
        }
        photo
    }

    #[test]
    fn frame_keeps_its_size_at_the_edge() {
        let config = MagnifierConfig::default();
        let loupe = render_loupe(&quadrants(), &dims(), (0, 0), &[], &config).unwrap();
        assert_eq!((loupe.frame.width, loupe.frame.height), (160, 160));
        assert_eq!(loupe.sampled, Dimension::new(0, 0, 80, 80));
        assert_eq!(loupe.frame.get_rgba(10, 10), Some(config.background_color));
        assert_eq!(loupe.frame.get_rgba(100, 100), Some([10, 10, 10, 255]));
    }

    #[test]
    fn centre_shows_crosshair_and_sampled_image() {
        let config = MagnifierConfig::default();
        let loupe = render_loupe(&quadrants(), &dims(), (400, 300), &[], &config).unwrap();
        assert_eq!(loupe.sampled, Dimension::new(1120, 820, 160, 160));
        assert_eq!(loupe.frame.get_rgba(80, 10), Some(config.crosshair_color));
        assert_eq!(loupe.frame.get_rgba(10, 80), Some(config.crosshair_color));
        // left of the centre column is the dark half, right is the light half
        assert_eq!(loupe.frame.get_rgba(20, 20), Some([10, 10, 10, 255]));
        assert_eq!(loupe.frame.get_rgba(140, 20), Some([200, 200, 200, 255]));
    }

    #[test]
    fn nearby_points_are_projected_into_the_frame() {
        let config = MagnifierConfig::default();
        let points = [ControlPoint::new(100, 75), ControlPoint::new(10, 10)];
        let loupe = render_loupe(&quadrants(), &dims(), (400, 300), &points, &config).unwrap();
        assert_eq!(loupe.markers, vec![LoupeMarker { index: 0, x: 80, y: 80 }]);
        assert_eq!(loupe.frame.get_rgba(82, 82), Some(config.marker_color));
    }

    #[test]
    fn pointer_far_outside_gives_nothing() {
        let config = MagnifierConfig::default();
        assert!(render_loupe(&quadrants(), &dims(), (-500, -500), &[], &config).is_none());
    }

    #[test]
    fn saturated_pointer_positions_give_nothing() {
        let config = MagnifierConfig::default();
        for pointer in [(i32::MAX, i32::MAX), (i32::MIN, i32::MIN), (i32::MAX, 300)] {
            assert!(render_loupe(&quadrants(), &dims(), pointer, &[], &config).is_none());
        }
    }
}
