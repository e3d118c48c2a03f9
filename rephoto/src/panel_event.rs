//! Pointer and keyboard input for a panel.
//!
//! Input is expressed as [`PanelEvent`] values. [`Panel::handle_event`]
//! applies one event and reports what happened as a list of [`PanelNotice`]
//! messages, so callers never have to watch the panel's fields for changes.

use crate::control_point::ControlPoint;
use crate::dimension::Dimension;
use crate::error::RegistrationError;
use crate::panel::{Panel, PanelStatus};
use serde::{Deserialize, Serialize};

/// What a primary pointer press does.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionMode {
    /// Press adds a control point, or grabs one under the pointer.
    #[default]
    ControlPoints,
    /// Press and drag draws a crop selection.
    CropSelect,
}

/// Keyboard commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelKey {
    ToggleMagnifier,
    DeleteLastPoint,
    ClearPoints,
    ZoomIn,
    ZoomOut,
    Fit,
    Expand,
    Reset,
    /// Apply the current crop selection.
    Crop,
    ToggleCropMode,
    /// Drop the crop selection.
    Cancel,
}

/// Input delivered to a panel. Positions are in surface coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    PointerDown { x: i32, y: i32 },
    PointerMove { x: i32, y: i32 },
    PointerUp { x: i32, y: i32 },
    PointerLeave,
    Key(PanelKey),
}

/// What an event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelNotice {
    /// The panel needs to be drawn again.
    Redraw,
    PointAdded { index: usize, point: ControlPoint },
    PointMoved { index: usize, point: ControlPoint },
    PointDeleted { index: usize },
    PointsCleared,
    /// A point was not added because the panel is full.
    MaxPointsReached { max: usize },
    SelectionChanged(Option<Dimension>),
    Cropped { image: Dimension },
    ModeChanged(InteractionMode),
    /// The event had no effect.
    Ignored,
    /// The event triggered an operation that failed.
    Rejected(RegistrationError),
}

impl Panel {
    /// Switches between control point and crop selection input.
    /// Leaving crop selection drops the selection.
    pub fn set_mode(&mut self, mode: InteractionMode) {
        if self.mode == InteractionMode::CropSelect && mode != InteractionMode::CropSelect {
            self.pointer.anchor = None;
            self.pointer.selection = None;
            if self.status == PanelStatus::Cropping {
                self.status = PanelStatus::Loaded;
            }
        }
        self.mode = mode;
    }

    pub fn set_magnifier(&mut self, enabled: bool) {
        self.pointer.magnify = enabled;
    }

    /// Applies one input event.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::config::PanelConfig;
    /// # use rephoto::control_point::ControlPoint;
    /// # use rephoto::panel::{Panel, PanelId};
    /// # use rephoto::panel_event::{PanelEvent, PanelNotice};
    /// # use rephoto::photo::Photo;
    /// # use rephoto::photo_codec::LoadRequest;
    /// let mut panel = Panel::new(PanelId::Historic, PanelConfig::default()).unwrap();
    /// panel.load(LoadRequest::from_photo(Photo::new(400, 300), "blank")).unwrap();
    /// let notices = panel.handle_event(PanelEvent::PointerDown { x: 200, y: 100 });
    /// assert!(notices.contains(&PanelNotice::PointAdded {
    ///     index: 0,
    ///     point: ControlPoint::new(100, 50)
    /// }));
    /// ```
    pub fn handle_event(&mut self, event: PanelEvent) -> Vec<PanelNotice> {
        if self.pixel_buffer.is_none() {
            return vec![PanelNotice::Ignored];
        }
        match event {
            PanelEvent::PointerDown { x, y } => self.pointer_down((x, y)),
            PanelEvent::PointerMove { x, y } => self.pointer_move((x, y)),
            PanelEvent::PointerUp { x, y } => self.pointer_up((x, y)),
            PanelEvent::PointerLeave => self.pointer_leave(),
            PanelEvent::Key(key) => self.key(key),
        }
    }

    fn pointer_down(&mut self, position: (i32, i32)) -> Vec<PanelNotice> {
        self.pointer.position = Some(position);
        match self.mode {
            InteractionMode::ControlPoints => {
                if !self.accepts_point_edits() {
                    return vec![PanelNotice::Rejected(RegistrationError::InvalidState {
                        panel: self.id,
                        status: self.status,
                    })];
                }
                let local = self.to_render_local(position);
                let hit = self.control_points.hit_test(
                    local,
                    &self.dimensions.image,
                    &self.dimensions.render,
                    self.config.hit_radius,
                );
                if let Some(index) = hit {
                    tracing::debug!("{} panel: grabbed point {}", self.id, index + 1);
                    self.control_points.begin_drag(index, local);
                    return vec![PanelNotice::Redraw];
                }
                if !self.dimensions.render.contains(position.0, position.1) {
                    return vec![PanelNotice::Ignored];
                }
                let (x, y) = self.to_image_space(position);
                let point = ControlPoint::new(x, y);
                match self.add_control_point(point) {
                    Ok(index) => vec![PanelNotice::PointAdded { index, point }, PanelNotice::Redraw],
                    Err(RegistrationError::MaxControlPoints { max }) => {
                        tracing::warn!("{} panel: already holds {max} points", self.id);
                        vec![PanelNotice::MaxPointsReached { max }]
                    }
                    Err(err) => vec![PanelNotice::Rejected(err)],
                }
            }
            InteractionMode::CropSelect => {
                if !matches!(self.status, PanelStatus::Loaded | PanelStatus::Cropping) {
                    return vec![PanelNotice::Ignored];
                }
                self.status = PanelStatus::Cropping;
                self.pointer.anchor = Some(position);
                let selection = Dimension::from_corners(position, position);
                self.pointer.selection = Some(selection);
                vec![PanelNotice::SelectionChanged(Some(selection)), PanelNotice::Redraw]
            }
        }
    }

    fn pointer_move(&mut self, position: (i32, i32)) -> Vec<PanelNotice> {
        self.pointer.position = Some(position);

        if self.control_points.dragged_index().is_some() {
            let local = self.to_render_local(position);
            let moved = self
                .control_points
                .update_drag(local, &self.dimensions.image, &self.dimensions.render);
            if let Some(index) = moved {
                if let Some(point) = self.control_points.get(index) {
                    return vec![PanelNotice::PointMoved { index, point }, PanelNotice::Redraw];
                }
            }
            return vec![PanelNotice::Ignored];
        }

        if let (PanelStatus::Cropping, Some(anchor)) = (self.status, self.pointer.anchor) {
            let selection = Dimension::from_corners(anchor, position).intersect(&self.dimensions.render);
            self.pointer.selection = Some(selection);
            return vec![PanelNotice::SelectionChanged(Some(selection)), PanelNotice::Redraw];
        }

        if self.pointer.magnify {
            vec![PanelNotice::Redraw]
        } else {
            Vec::new()
        }
    }

    fn pointer_up(&mut self, position: (i32, i32)) -> Vec<PanelNotice> {
        self.pointer.position = Some(position);

        if let Some(index) = self.control_points.end_drag() {
            tracing::debug!("{} panel: released point {}", self.id, index + 1);
            return vec![PanelNotice::Redraw];
        }

        if self.pointer.anchor.take().is_some() {
            let empty = self.pointer.selection.map_or(true, |s| s.is_empty());
            if empty {
                self.pointer.selection = None;
                if self.status == PanelStatus::Cropping {
                    self.status = PanelStatus::Loaded;
                }
                return vec![PanelNotice::SelectionChanged(None), PanelNotice::Redraw];
            }
            return vec![PanelNotice::SelectionChanged(self.pointer.selection)];
        }

        Vec::new()
    }

    fn pointer_leave(&mut self) -> Vec<PanelNotice> {
        self.pointer.position = None;
        self.control_points.end_drag();
        self.pointer.anchor = None;
        if self.pointer.magnify {
            vec![PanelNotice::Redraw]
        } else {
            Vec::new()
        }
    }

    fn key(&mut self, key: PanelKey) -> Vec<PanelNotice> {
        let redraw_or_reject = |result: crate::error::Result<()>| match result {
            Ok(()) => vec![PanelNotice::Redraw],
            Err(err) => vec![PanelNotice::Rejected(err)],
        };

        match key {
            PanelKey::ToggleMagnifier => {
                self.pointer.magnify = !self.pointer.magnify;
                vec![PanelNotice::Redraw]
            }
            PanelKey::DeleteLastPoint => match self.delete_last_point() {
                Ok(Some(_)) => vec![
                    PanelNotice::PointDeleted {
                        index: self.control_points.len(),
                    },
                    PanelNotice::Redraw,
                ],
                Ok(None) => vec![PanelNotice::Ignored],
                Err(err) => vec![PanelNotice::Rejected(err)],
            },
            PanelKey::ClearPoints => match self.clear_points() {
                Ok(()) => vec![PanelNotice::PointsCleared, PanelNotice::Redraw],
                Err(err) => vec![PanelNotice::Rejected(err)],
            },
            PanelKey::ZoomIn => redraw_or_reject(self.zoom_in()),
            PanelKey::ZoomOut => redraw_or_reject(self.zoom_out()),
            PanelKey::Fit => redraw_or_reject(self.fit()),
            PanelKey::Expand => redraw_or_reject(self.expand()),
            PanelKey::Reset => redraw_or_reject(self.reset()),
            PanelKey::Crop => match self.crop_to_selection() {
                Ok(true) => vec![
                    PanelNotice::Cropped {
                        image: self.dimensions.image,
                    },
                    PanelNotice::Redraw,
                ],
                Ok(false) => vec![PanelNotice::Ignored],
                Err(err) => vec![PanelNotice::Rejected(err)],
            },
            PanelKey::ToggleCropMode => {
                let mode = match self.mode {
                    InteractionMode::ControlPoints => InteractionMode::CropSelect,
                    InteractionMode::CropSelect => InteractionMode::ControlPoints,
                };
                self.set_mode(mode);
                vec![PanelNotice::ModeChanged(mode), PanelNotice::Redraw]
            }
            PanelKey::Cancel => {
                if self.pointer.selection.is_none() {
                    return vec![PanelNotice::Ignored];
                }
                self.pointer.anchor = None;
                self.pointer.selection = None;
                if self.status == PanelStatus::Cropping {
                    self.status = PanelStatus::Loaded;
                }
                vec![PanelNotice::SelectionChanged(None), PanelNotice::Redraw]
            }
        }
    }
}
