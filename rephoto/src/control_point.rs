use crate::coordinate_transform::{get_scale, in_range, scale_point};
use crate::dimension::Dimension;
use crate::error::{RegistrationError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A user-chosen landmark, stored in image space so zooming the view never
/// requires recomputing it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlPoint {
    pub x: i32,
    pub y: i32,
}

impl ControlPoint {
    pub fn new(x: i32, y: i32) -> Self {
        ControlPoint { x, y }
    }
}

/// An in-progress drag of one control point.
///
/// The point's new position is always derived from where it started plus the
/// total pointer travel, so rounding never accumulates across move events.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Drag {
    index: usize,
    origin_point: ControlPoint,
    origin_pointer: (i32, i32),
}

/// The ordered landmark list of a single panel plus its drag state.
///
/// Insertion order is the landmark index and the correspondence order between
/// two panels. The list never grows past `max_points`. The sequence itself is
/// shared immutably: every mutation builds a new list and swaps it in, so a
/// [`ControlPointStore::snapshot`] handed to another task never changes under it.
#[derive(Debug, Clone)]
pub struct ControlPointStore {
    points: Arc<[ControlPoint]>,
    max_points: usize,
    drag: Option<Drag>,
}

impl ControlPointStore {
    /// Creates an empty store capped at `max_points`.
    pub fn new(max_points: usize) -> Self {
        ControlPointStore {
            points: Arc::from(Vec::new()),
            max_points,
            drag: None,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= self.max_points
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<ControlPoint> {
        self.points.get(index).copied()
    }

    /// A cheap, immutable handle on the current sequence.
    pub fn snapshot(&self) -> Arc<[ControlPoint]> {
        self.points.clone()
    }

    /// Appends `point` and returns its index.
    ///
    /// # Errors
    /// [`RegistrationError::MaxControlPoints`] when the store is full; the
    /// stored sequence is left untouched.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::control_point::{ControlPoint, ControlPointStore};
    /// let mut store = ControlPointStore::new(1);
    /// assert_eq!(store.add(ControlPoint::new(5, 5)), Ok(0));
    /// assert!(store.add(ControlPoint::new(6, 6)).is_err());
    /// assert_eq!(store.len(), 1);
    /// ```
    pub fn add(&mut self, point: ControlPoint) -> Result<usize> {
        if self.is_full() {
            return Err(RegistrationError::MaxControlPoints {
                max: self.max_points,
            });
        }
        let mut next = self.points.to_vec();
        next.push(point);
        self.points = Arc::from(next);
        Ok(self.points.len() - 1)
    }

    /// Replaces the whole sequence, truncating to the cap.
    pub fn replace_all(&mut self, points: &[ControlPoint]) {
        let keep = points.len().min(self.max_points);
        self.points = Arc::from(&points[..keep]);
        self.drag = None;
    }

    /// Returns the index of the first point whose render-space position lies
    /// within `radius` (square test) of `pointer`.
    ///
    /// `pointer` is render-local; points are projected from `image` into
    /// `render` space before testing.
    pub fn hit_test(
        &self,
        pointer: (i32, i32),
        image: &Dimension,
        render: &Dimension,
        radius: i32,
    ) -> Option<usize> {
        self.points.iter().position(|p| {
            let (rx, ry) = scale_point(p.x, p.y, render, image);
            in_range(rx, ry, pointer.0, pointer.1, radius)
        })
    }

    /// Starts dragging the point at `index` from the render-local `pointer`.
    ///
    /// Returns `false` (and starts nothing) when `index` is out of range.
    pub fn begin_drag(&mut self, index: usize, pointer: (i32, i32)) -> bool {
        match self.points.get(index) {
            Some(&origin_point) => {
                self.drag = Some(Drag {
                    index,
                    origin_point,
                    origin_pointer: pointer,
                });
                true
            }
            None => false,
        }
    }

    pub fn dragged_index(&self) -> Option<usize> {
        self.drag.map(|d| d.index)
    }

    /// Moves the dragged point to follow the pointer.
    ///
    /// The render-space travel since [`ControlPointStore::begin_drag`] is
    /// converted to image space with [`get_scale`]. The result is not clamped:
    /// points may sit outside the visible crop or even outside the buffer.
    pub fn update_drag(
        &mut self,
        pointer: (i32, i32),
        image: &Dimension,
        render: &Dimension,
    ) -> Option<usize> {
        let drag = self.drag?;
        let scale = get_scale(image, render);
        let dx = ((pointer.0 - drag.origin_pointer.0) as f64 * scale.x).round() as i32;
        let dy = ((pointer.1 - drag.origin_pointer.1) as f64 * scale.y).round() as i32;
        let moved = ControlPoint::new(drag.origin_point.x + dx, drag.origin_point.y + dy);

        let mut next = self.points.to_vec();
        next[drag.index] = moved;
        self.points = Arc::from(next);
        Some(drag.index)
    }

    /// Finishes the current drag, returning the index that was dragged.
    pub fn end_drag(&mut self) -> Option<usize> {
        self.drag.take().map(|d| d.index)
    }

    /// Removes the most recently added point.
    pub fn delete_last(&mut self) -> Option<ControlPoint> {
        let last = *self.points.last()?;
        self.points = Arc::from(&self.points[..self.points.len() - 1]);
        if self.drag.map_or(false, |d| d.index >= self.points.len()) {
            self.drag = None;
        }
        Some(last)
    }

    pub fn clear(&mut self) {
        self.points = Arc::from(Vec::new());
        self.drag = None;
    }

    /// Rescales every point from one image size to another, e.g. after the
    /// working buffer has been resampled.
    pub fn rescale(&mut self, from: &Dimension, to: &Dimension) {
        let next: Vec<ControlPoint> = self
            .points
            .iter()
            .map(|p| {
                let (x, y) = scale_point(p.x, p.y, to, from);
                ControlPoint::new(x, y)
            })
            .collect();
        self.points = Arc::from(next);
        self.drag = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_store() -> ControlPointStore {
        let mut store = ControlPointStore::new(4);
        for (x, y) in [(100, 100), (700, 100), (700, 500), (100, 500)] {
            store.add(ControlPoint::new(x, y)).unwrap();
        }
        store
    }

    #[test]
    fn fifth_point_is_rejected_without_mutation() {
        let mut store = full_store();
        let before = store.snapshot();
        let err = store.add(ControlPoint::new(1, 1)).unwrap_err();
        assert_eq!(err, RegistrationError::MaxControlPoints { max: 4 });
        assert_eq!(store.points(), &before[..]);
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn snapshots_are_not_affected_by_later_edits() {
        let mut store = full_store();
        let snap = store.snapshot();
        store.delete_last();
        store.add(ControlPoint::new(9, 9)).unwrap();
        assert_eq!(snap[3], ControlPoint::new(100, 500));
        assert_eq!(store.points()[3], ControlPoint::new(9, 9));
    }

    #[test]
    fn hit_test_projects_into_render_space() {
        let store = full_store();
        let image = Dimension::sized(800, 600);
        let render = Dimension::sized(400, 300);
        // (700, 100) in image space renders at (350, 50)
        assert_eq!(store.hit_test((354, 46), &image, &render, 5), Some(1));
        assert_eq!(store.hit_test((356, 50), &image, &render, 5), None);
    }

    #[test]
    fn hit_test_returns_first_match() {
        let mut store = ControlPointStore::new(4);
        store.add(ControlPoint::new(10, 10)).unwrap();
        store.add(ControlPoint::new(12, 12)).unwrap();
        let d = Dimension::sized(100, 100);
        assert_eq!(store.hit_test((11, 11), &d, &d, 3), Some(0));
    }

    #[test]
    fn drag_converts_render_delta_to_image_delta() {
        let mut store = full_store();
        let image = Dimension::sized(800, 600);
        let render = Dimension::sized(400, 300);
        assert!(store.begin_drag(0, (50, 50)));
        store.update_drag((60, 45), &image, &render);
        store.update_drag((70, 40), &image, &render);
        assert_eq!(store.end_drag(), Some(0));
        assert_eq!(store.get(0), Some(ControlPoint::new(140, 80)));
    }

    #[test]
    fn drag_is_not_clamped_to_the_image() {
        let mut store = full_store();
        let d = Dimension::sized(800, 600);
        store.begin_drag(3, (100, 500));
        store.update_drag((-50, 900), &d, &d);
        assert_eq!(store.get(3), Some(ControlPoint::new(-50, 900)));
    }

    #[test]
    fn delete_last_removes_only_the_last_point() {
        let mut store = full_store();
        assert_eq!(store.delete_last(), Some(ControlPoint::new(100, 500)));
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(0), Some(ControlPoint::new(100, 100)));
        store.clear();
        assert_eq!(store.delete_last(), None);
    }

    #[test]
    fn begin_drag_out_of_range_is_refused() {
        let mut store = full_store();
        assert!(!store.begin_drag(7, (0, 0)));
        assert_eq!(store.dragged_index(), None);
    }

    #[test]
    fn rescale_follows_the_resample() {
        let mut store = full_store();
        store.rescale(&Dimension::sized(800, 600), &Dimension::sized(400, 300));
        assert_eq!(store.get(2), Some(ControlPoint::new(350, 250)));
    }
}
