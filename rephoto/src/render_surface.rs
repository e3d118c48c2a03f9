use crate::dimension::Dimension;
use crate::photo::Photo;

/// The drawing target a panel renders onto.
///
/// All rectangles are in surface pixels. Implementations clip drawing to
/// their bounds; callers never have to.
pub trait RenderSurface {
    /// Visible extent of the surface.
    fn bounds(&self) -> Dimension;

    /// Clears `rect` to fully transparent.
    fn clear(&mut self, rect: Dimension);

    /// Draws the `source` region of `photo` scaled into `dest` (nearest neighbour).
    fn draw_photo(&mut self, photo: &Photo, source: Dimension, dest: Dimension);

    /// Fills `rect` with a solid colour.
    fn fill_rect(&mut self, rect: Dimension, rgba: [u8; 4]);

    /// Copies the pixels currently shown inside `rect`.
    fn read_pixels(&self, rect: Dimension) -> Photo;

    /// Draws the one pixel wide outline of `rect`.
    fn stroke_rect(&mut self, rect: Dimension, rgba: [u8; 4]) {
        if rect.is_empty() {
            return;
        }
        let right = rect.x + rect.w as i32 - 1;
        let bottom = rect.y + rect.h as i32 - 1;
        self.fill_rect(Dimension::new(rect.x, rect.y, rect.w, 1), rgba);
        self.fill_rect(Dimension::new(rect.x, bottom, rect.w, 1), rgba);
        self.fill_rect(Dimension::new(rect.x, rect.y, 1, rect.h), rgba);
        self.fill_rect(Dimension::new(right, rect.y, 1, rect.h), rgba);
    }
}

/// An in-memory RGBA surface.
#[derive(Debug, Clone)]
pub struct CanvasSurface {
    canvas: Photo,
}

impl CanvasSurface {
    pub fn new(width: usize, height: usize) -> Self {
        CanvasSurface {
            canvas: Photo::new(width, height),
        }
    }

    /// Wraps existing pixels to draw on top of them.
    pub fn from_photo(canvas: Photo) -> Self {
        CanvasSurface { canvas }
    }

    /// The pixels drawn so far.
    pub fn pixels(&self) -> &Photo {
        &self.canvas
    }

    pub fn into_photo(self) -> Photo {
        self.canvas
    }
}

impl RenderSurface for CanvasSurface {
    fn bounds(&self) -> Dimension {
        self.canvas.dimension()
    }

    fn clear(&mut self, rect: Dimension) {
        self.fill_rect(rect, [0, 0, 0, 0]);
    }

    fn draw_photo(&mut self, photo: &Photo, source: Dimension, dest: Dimension) {
        let source = source.intersect(&photo.dimension());
        if source.is_empty() || dest.is_empty() {
            return;
        }
        let visible = dest.intersect(&self.bounds());
        let sx = source.w as f64 / dest.w as f64;
        let sy = source.h as f64 / dest.h as f64;
        for y in visible.y..visible.y + visible.h as i32 {
            let v = source.y as usize
                + (((y - dest.y) as f64 * sy) as usize).min(source.h as usize - 1);
            for x in visible.x..visible.x + visible.w as i32 {
                let u = source.x as usize
                    + (((x - dest.x) as f64 * sx) as usize).min(source.w as usize - 1);
                if let Some(rgba) = photo.get_rgba(u, v) {
                    self.canvas.set_rgba(x as usize, y as usize, rgba);
                }
            }
        }
    }

    fn fill_rect(&mut self, rect: Dimension, rgba: [u8; 4]) {
        let visible = rect.intersect(&self.bounds());
        for y in visible.y..visible.y + visible.h as i32 {
            for x in visible.x..visible.x + visible.w as i32 {
                self.canvas.set_rgba(x as usize, y as usize, rgba);
            }
        }
    }

    fn read_pixels(&self, rect: Dimension) -> Photo {
        self.canvas.crop(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_photo_scales_and_clips() {
        let mut photo = Photo::new(2, 2);
        photo.set_rgba(0, 0, [1, 1, 1, 255]);
        photo.set_rgba(1, 0, [2, 2, 2, 255]);
        photo.set_rgba(0, 1, [3, 3, 3, 255]);
        photo.set_rgba(1, 1, [4, 4, 4, 255]);

        let mut surface = CanvasSurface::new(6, 6);
        surface.draw_photo(&photo, photo.dimension(), Dimension::new(2, 2, 4, 4));
        let px = surface.pixels();
        assert_eq!(px.get_rgba(2, 2), Some([1, 1, 1, 255]));
        assert_eq!(px.get_rgba(3, 3), Some([1, 1, 1, 255]));
        assert_eq!(px.get_rgba(4, 2), Some([2, 2, 2, 255]));
        assert_eq!(px.get_rgba(5, 5), Some([4, 4, 4, 255]));
        assert_eq!(px.get_rgba(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn drawing_off_surface_is_ignored() {
        let mut surface = CanvasSurface::new(4, 4);
        surface.fill_rect(Dimension::new(-10, -10, 5, 5), [9, 9, 9, 9]);
        surface.draw_photo(
            &Photo::filled(2, 2, [7, 7, 7, 7]),
            Dimension::sized(2, 2),
            Dimension::new(10, 10, 4, 4),
        );
        assert_eq!(surface.pixels(), &Photo::new(4, 4));
    }

    #[test]
    fn read_pixels_after_clear() {
        let mut surface = CanvasSurface::new(4, 4);
        surface.fill_rect(surface.bounds(), [5, 5, 5, 255]);
        surface.clear(Dimension::new(1, 1, 2, 2));
        let region = surface.read_pixels(Dimension::new(0, 0, 2, 2));
        assert_eq!(region.get_rgba(0, 0), Some([5, 5, 5, 255]));
        assert_eq!(region.get_rgba(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn stroke_draws_outline_only() {
        let mut surface = CanvasSurface::new(5, 5);
        surface.stroke_rect(Dimension::new(0, 0, 5, 5), [1, 2, 3, 255]);
        assert_eq!(surface.pixels().get_rgba(0, 2), Some([1, 2, 3, 255]));
        assert_eq!(surface.pixels().get_rgba(4, 4), Some([1, 2, 3, 255]));
        assert_eq!(surface.pixels().get_rgba(2, 2), Some([0, 0, 0, 0]));
    }
}
