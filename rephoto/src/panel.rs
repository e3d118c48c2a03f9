//! One image's lifecycle: load, view changes, crop, resize, reset and the
//! receiving end of an alignment.
//!
//! A [`Panel`] owns its pixel buffers exclusively. Buffers live behind
//! [`Arc`] and are only ever replaced, never written in place, so a buffer
//! handed to a running task (or kept for [`Panel::reset`]) stays valid no
//! matter what happens to the panel afterwards.

use crate::config::PanelConfig;
use crate::control_point::{ControlPoint, ControlPointStore};
use crate::coordinate_transform::{scale_point, scale_to_fit};
use crate::dimension::{Dimension, PanelDimensions};
use crate::error::{RegistrationError, Result};
use crate::homography::Homography;
use crate::magnifier::render_loupe;
use crate::operation_ticket::{
    AlignOutcome, AlignTask, LoadOutcome, LoadTask, OperationTicket, ResizeOutcome, ResizeTask,
};
use crate::panel_event::InteractionMode;
use crate::photo::Photo;
use crate::photo_codec::{encode, DecodedPhoto, ImageMetadata, LoadRequest, SaveRequest};
use crate::render_surface::RenderSurface;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The two panels of a registration session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelId {
    Historic,
    Modern,
}

impl PanelId {
    pub fn partner(&self) -> PanelId {
        match self {
            PanelId::Historic => PanelId::Modern,
            PanelId::Modern => PanelId::Historic,
        }
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelId::Historic => write!(f, "historic"),
            PanelId::Modern => write!(f, "modern"),
        }
    }
}

/// Lifecycle state of a panel.
///
/// ```text
/// Empty -> Loading -> Loaded <-> {Cropping, Resizing, Aligning}
///                        any -> Error (failed load)
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelStatus {
    Empty,
    Loading,
    Loaded,
    /// A crop selection is being drawn or waits to be applied.
    Cropping,
    Resizing,
    Aligning,
    Error,
}

/// States in which the view (zoom, fit, expand) may change.
const VIEW_STATES: [PanelStatus; 4] = [
    PanelStatus::Loaded,
    PanelStatus::Cropping,
    PanelStatus::Resizing,
    PanelStatus::Aligning,
];

/// States in which control points may change. A finished alignment replaces
/// the points, so they are frozen while one is in flight.
const POINT_STATES: [PanelStatus; 3] = [
    PanelStatus::Loaded,
    PanelStatus::Cropping,
    PanelStatus::Resizing,
];

/// Pointer and overlay state, all positions in surface coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerState {
    /// Last known pointer position; `None` once it left the surface.
    pub position: Option<(i32, i32)>,
    /// Where the current crop selection drag started.
    pub anchor: Option<(i32, i32)>,
    /// Crop selection box.
    pub selection: Option<Dimension>,
    /// Whether the loupe follows the pointer.
    pub magnify: bool,
    /// Whether control point markers are drawn. Cleared by a crop.
    pub markers_visible: bool,
}

/// The displayed rectangle kept in floating point, so zooming in and back out
/// returns to the same integer render dimensions.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub(crate) struct ViewRect {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

impl ViewRect {
    fn from_dimension(d: &Dimension) -> Self {
        ViewRect {
            x: d.x as f64,
            y: d.y as f64,
            w: d.w as f64,
            h: d.h as f64,
        }
    }

    fn scaled_up(&self, factor: f64) -> Self {
        ViewRect {
            x: self.x * factor,
            y: self.y * factor,
            w: self.w * factor,
            h: self.h * factor,
        }
    }

    fn scaled_down(&self, factor: f64) -> Self {
        ViewRect {
            x: self.x / factor,
            y: self.y / factor,
            w: self.w / factor,
            h: self.h / factor,
        }
    }

    fn to_dimension(self) -> Dimension {
        let clamp_extent = |v: f64| v.round().clamp(0.0, u32::MAX as f64) as u32;
        let clamp_offset = |v: f64| v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        Dimension::new(
            clamp_offset(self.x),
            clamp_offset(self.y),
            clamp_extent(self.w),
            clamp_extent(self.h),
        )
    }
}

/// The aggregate root for one image.
#[derive(Debug, Clone)]
pub struct Panel {
    pub(crate) id: PanelId,
    pub(crate) status: PanelStatus,
    pub(crate) config: PanelConfig,
    pub(crate) dimensions: PanelDimensions,
    pub(crate) view: ViewRect,
    /// Render rectangle computed at load time, restored by [`Panel::reset`].
    pub(crate) fitted: ViewRect,
    pub(crate) pixel_buffer: Option<Arc<Photo>>,
    pub(crate) source_buffer: Option<Arc<Photo>>,
    pub(crate) pointer: PointerState,
    pub(crate) mode: InteractionMode,
    pub(crate) control_points: ControlPointStore,
    pub(crate) metadata: Option<ImageMetadata>,
    /// Bumped by every operation that invalidates in-flight work.
    pub(crate) epoch: u64,
}

impl Panel {
    /// Creates an empty panel.
    ///
    /// # Errors
    /// [`RegistrationError::InvalidConfig`] if `config` fails validation.
    pub fn new(id: PanelId, config: PanelConfig) -> Result<Panel> {
        config.validate()?;
        let base = Dimension::sized(config.base_width, config.base_height);
        Ok(Panel {
            id,
            status: PanelStatus::Empty,
            control_points: ControlPointStore::new(config.max_control_points),
            config,
            dimensions: PanelDimensions::with_base(base),
            view: ViewRect::default(),
            fitted: ViewRect::default(),
            pixel_buffer: None,
            source_buffer: None,
            pointer: PointerState::default(),
            mode: InteractionMode::ControlPoints,
            metadata: None,
            epoch: 0,
        })
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    pub fn status(&self) -> PanelStatus {
        self.status
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn dimensions(&self) -> &PanelDimensions {
        &self.dimensions
    }

    /// The current working buffer.
    pub fn pixels(&self) -> Option<&Arc<Photo>> {
        self.pixel_buffer.as_ref()
    }

    /// The buffer as decoded, kept for [`Panel::reset`].
    pub fn source_pixels(&self) -> Option<&Arc<Photo>> {
        self.source_buffer.as_ref()
    }

    pub fn metadata(&self) -> Option<&ImageMetadata> {
        self.metadata.as_ref()
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn control_points(&self) -> &ControlPointStore {
        &self.control_points
    }

    /// A ticket describing the panel as it is now.
    pub fn ticket(&self) -> OperationTicket {
        OperationTicket {
            panel: self.id,
            epoch: self.epoch,
            status: self.status,
        }
    }

    /// Returns `true` while nothing has happened to the panel since `ticket`
    /// was issued.
    pub fn is_current(&self, ticket: &OperationTicket) -> bool {
        ticket.panel == self.id && ticket.epoch == self.epoch && ticket.status == self.status
    }

    fn require(&self, allowed: &[PanelStatus]) -> Result<Arc<Photo>> {
        let buffer = self
            .pixel_buffer
            .clone()
            .ok_or(RegistrationError::EmptyPanel(self.id))?;
        if !allowed.contains(&self.status) {
            return Err(RegistrationError::InvalidState {
                panel: self.id,
                status: self.status,
            });
        }
        Ok(buffer)
    }

    fn fit_view(&self, image: &Dimension) -> ViewRect {
        let base = &self.dimensions.base;
        let size = scale_to_fit(image.w, image.h, base.w, base.h);
        ViewRect::from_dimension(&Dimension::sized(size.w, size.h))
    }

    fn set_view(&mut self, view: ViewRect) {
        self.view = view;
        let render = view.to_dimension();
        let magnification = self.config.magnifier.magnification;
        self.dimensions.render = render;
        self.dimensions.magnified = Dimension::sized(
            (render.w as f64 * magnification).round() as u32,
            (render.h as f64 * magnification).round() as u32,
        );
    }

    fn clear_selection(&mut self) {
        self.pointer.anchor = None;
        self.pointer.selection = None;
        if self.status == PanelStatus::Cropping {
            self.status = PanelStatus::Loaded;
        }
    }

    // ---------------------------------------------------------------------
    // load

    /// Moves the panel into [`PanelStatus::Loading`] and returns the decode
    /// work for `request`. The current image, if any, stays in place until
    /// [`Panel::complete_load`].
    pub fn begin_load(&mut self, request: LoadRequest) -> LoadTask {
        tracing::info!("{} panel: loading {}", self.id, request.filename);
        self.status = PanelStatus::Loading;
        self.epoch += 1;
        LoadTask {
            ticket: self.ticket(),
            request,
        }
    }

    /// Applies a finished decode.
    ///
    /// # Returns
    /// `Ok(false)` if the outcome was stale and has been discarded.
    ///
    /// # Errors
    /// The decode error. The panel is then in [`PanelStatus::Error`] and
    /// holds no buffers.
    pub fn complete_load(&mut self, outcome: LoadOutcome) -> Result<bool> {
        if !self.is_current(&outcome.ticket) {
            tracing::warn!("{} panel: discarding stale load result", self.id);
            return Ok(false);
        }
        match outcome.result {
            Ok(decoded) => {
                self.install(decoded);
                Ok(true)
            }
            Err(err) => {
                tracing::error!("{} panel: {err}", self.id);
                self.pixel_buffer = None;
                self.source_buffer = None;
                self.metadata = None;
                self.control_points.clear();
                self.pointer = PointerState::default();
                self.dimensions = PanelDimensions::with_base(self.dimensions.base);
                self.view = ViewRect::default();
                self.fitted = ViewRect::default();
                self.status = PanelStatus::Error;
                self.epoch += 1;
                Err(err)
            }
        }
    }

    /// Decodes `request` and installs the result in one step.
    pub fn load(&mut self, request: LoadRequest) -> Result<()> {
        let task = self.begin_load(request);
        self.complete_load(task.run()).map(|_| ())
    }

    fn install(&mut self, decoded: DecodedPhoto) {
        let DecodedPhoto { photo, metadata } = decoded;
        let extent = photo.dimension();
        let buffer = Arc::new(photo);

        self.pixel_buffer = Some(buffer.clone());
        self.source_buffer = Some(buffer);
        self.dimensions = PanelDimensions {
            original: extent,
            image: extent,
            source: extent,
            render: extent,
            base: self.dimensions.base,
            magnified: Dimension::default(),
        };
        self.fitted = self.fit_view(&extent);
        self.set_view(self.fitted);
        self.control_points.clear();
        self.pointer = PointerState {
            magnify: self.pointer.magnify,
            markers_visible: true,
            ..Default::default()
        };
        self.status = PanelStatus::Loaded;
        self.epoch += 1;

        tracing::info!(
            "{} panel: loaded {} ({}x{}, rendered at {}x{})",
            self.id,
            metadata.filename,
            extent.w,
            extent.h,
            self.dimensions.render.w,
            self.dimensions.render.h
        );
        self.metadata = Some(metadata);
    }

    // ---------------------------------------------------------------------
    // view

    /// Fits the working image into the base viewport.
    pub fn fit(&mut self) -> Result<()> {
        self.require(&VIEW_STATES)?;
        let view = self.fit_view(&self.dimensions.image);
        self.set_view(view);
        tracing::debug!("{} panel: fit to {:?}", self.id, self.dimensions.render);
        Ok(())
    }

    /// Shows the working image at 1:1 and drops any crop selection.
    pub fn expand(&mut self) -> Result<()> {
        self.require(&VIEW_STATES)?;
        self.set_view(ViewRect::from_dimension(&self.dimensions.image.extent()));
        self.clear_selection();
        tracing::debug!("{} panel: expanded to {:?}", self.id, self.dimensions.render);
        Ok(())
    }

    /// Scales the render rectangle, offset included, up by the zoom factor.
    /// Steps accumulate without bound.
    pub fn zoom_in(&mut self) -> Result<()> {
        self.require(&VIEW_STATES)?;
        self.set_view(self.view.scaled_up(self.config.zoom_factor));
        tracing::debug!("{} panel: zoom in to {:?}", self.id, self.dimensions.render);
        Ok(())
    }

    /// Inverse of [`Panel::zoom_in`].
    pub fn zoom_out(&mut self) -> Result<()> {
        self.require(&VIEW_STATES)?;
        self.set_view(self.view.scaled_down(self.config.zoom_factor));
        tracing::debug!("{} panel: zoom out to {:?}", self.id, self.dimensions.render);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // crop / reset

    /// Sets the crop selection box (surface coordinates) and enters
    /// [`PanelStatus::Cropping`]; `None` drops it.
    pub fn set_selection(&mut self, selection: Option<Dimension>) -> Result<()> {
        self.require(&[PanelStatus::Loaded, PanelStatus::Cropping])?;
        match selection {
            Some(box_) => {
                self.pointer.selection = Some(box_);
                self.status = PanelStatus::Cropping;
            }
            None => self.clear_selection(),
        }
        Ok(())
    }

    /// Crops to `selection`, a box in surface coordinates.
    ///
    /// The box is mapped into image space and clipped to the image. The
    /// working buffer is replaced by a copy of that window: `image` becomes
    /// the window extent, `source` the window within the pre-crop image and
    /// `render` the selection extent. Control points keep their coordinates;
    /// see [`Panel::points_outside_image`].
    ///
    /// # Returns
    /// `Ok(false)` without changing anything if the box, or its part over the
    /// image, has zero area.
    pub fn crop(&mut self, selection: Dimension) -> Result<bool> {
        let buffer = self.require(&[PanelStatus::Loaded, PanelStatus::Cropping])?;
        let image = self.dimensions.image;
        let render = self.dimensions.render;

        let local = Dimension::new(selection.x - render.x, selection.y - render.y, selection.w, selection.h);
        if local.is_empty() {
            tracing::warn!("{} panel: ignoring zero-area crop", self.id);
            return Ok(false);
        }
        let top_left = scale_point(local.x, local.y, &image, &render);
        let bottom_right = scale_point(
            local.x + local.w as i32,
            local.y + local.h as i32,
            &image,
            &render,
        );
        let window = Dimension::from_corners(top_left, bottom_right).intersect(&image.extent());
        if window.is_empty() {
            tracing::warn!("{} panel: crop selection misses the image", self.id);
            return Ok(false);
        }

        self.pixel_buffer = Some(Arc::new(buffer.crop(window)));
        self.dimensions.image = window.extent();
        self.dimensions.source = window;
        self.set_view(ViewRect::from_dimension(&local.extent()));
        self.pointer.anchor = None;
        self.pointer.selection = None;
        self.pointer.markers_visible = false;
        self.control_points.end_drag();
        self.status = PanelStatus::Loaded;
        self.epoch += 1;

        tracing::info!("{} panel: cropped to {:?}", self.id, window);
        Ok(true)
    }

    /// Crops to the stored selection box, if there is one.
    pub fn crop_to_selection(&mut self) -> Result<bool> {
        match self.pointer.selection {
            Some(selection) => self.crop(selection),
            None => Ok(false),
        }
    }

    /// Indices of control points that lie outside the working image, e.g.
    /// after a crop.
    pub fn points_outside_image(&self) -> Vec<usize> {
        let image = self.dimensions.image.extent();
        self.control_points
            .points()
            .iter()
            .enumerate()
            .filter(|(_, p)| !image.contains(p.x, p.y))
            .map(|(i, _)| i)
            .collect()
    }

    /// Restores the decoded buffer and the load-time view. Control points are
    /// kept. Any resize or alignment in flight is invalidated.
    pub fn reset(&mut self) -> Result<()> {
        self.require(&VIEW_STATES)?;
        let source = self
            .source_buffer
            .clone()
            .ok_or(RegistrationError::EmptyPanel(self.id))?;
        if matches!(self.status, PanelStatus::Resizing | PanelStatus::Aligning) {
            tracing::warn!("{} panel: reset while {:?}, pending result will be dropped", self.id, self.status);
        }

        self.pixel_buffer = Some(source);
        let original = self.dimensions.original;
        self.dimensions.image = original;
        self.dimensions.source = original;
        self.set_view(self.fitted);
        self.pointer.anchor = None;
        self.pointer.selection = None;
        self.pointer.markers_visible = true;
        self.control_points.end_drag();
        self.status = PanelStatus::Loaded;
        self.epoch += 1;

        tracing::info!("{} panel: reset to {}x{}", self.id, original.w, original.h);
        Ok(())
    }

    /// Abandons a load, resize or alignment in flight.
    ///
    /// # Returns
    /// `true` if there was something to cancel.
    pub fn cancel(&mut self) -> bool {
        if !matches!(
            self.status,
            PanelStatus::Loading | PanelStatus::Resizing | PanelStatus::Aligning
        ) {
            return false;
        }
        tracing::warn!("{} panel: cancelled while {:?}", self.id, self.status);
        self.status = if self.pixel_buffer.is_some() {
            PanelStatus::Loaded
        } else {
            PanelStatus::Empty
        };
        self.epoch += 1;
        true
    }

    // ---------------------------------------------------------------------
    // resize

    /// Starts resampling the working buffer to `width` × `height`.
    ///
    /// # Errors
    /// [`RegistrationError::InvalidConfig`] for a zero target size, or the
    /// usual state errors.
    pub fn begin_resize(&mut self, width: u32, height: u32) -> Result<ResizeTask> {
        let buffer = self.require(&[PanelStatus::Loaded])?;
        if width == 0 || height == 0 {
            return Err(RegistrationError::InvalidConfig(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        tracing::info!(
            "{} panel: resizing {}x{} -> {width}x{height}",
            self.id,
            buffer.width,
            buffer.height
        );
        self.status = PanelStatus::Resizing;
        self.epoch += 1;
        Ok(ResizeTask {
            ticket: self.ticket(),
            buffer,
            width: width as usize,
            height: height as usize,
        })
    }

    /// Installs a resampled buffer. Control points are rescaled with it and
    /// the view is re-fitted.
    ///
    /// # Returns
    /// `false` if the outcome was stale and has been discarded.
    pub fn apply_resize(&mut self, outcome: ResizeOutcome) -> bool {
        if !self.is_current(&outcome.ticket) {
            tracing::warn!("{} panel: discarding stale resize result", self.id);
            return false;
        }
        let previous = self.dimensions.image;
        let resized = outcome.photo.dimension();

        self.pixel_buffer = Some(Arc::new(outcome.photo));
        self.dimensions.image = resized;
        self.dimensions.source = resized;
        self.control_points.rescale(&previous, &resized);
        self.set_view(self.fit_view(&resized));
        self.status = PanelStatus::Loaded;
        self.epoch += 1;
        true
    }

    /// Resamples in one step.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let task = self.begin_resize(width, height)?;
        self.apply_resize(task.run());
        Ok(())
    }

    /// Resamples to `width`, keeping the aspect ratio of the working image.
    pub fn resize_to_width(&mut self, width: u32) -> Result<()> {
        let image = self.dimensions.image;
        if image.w == 0 {
            return Err(RegistrationError::EmptyPanel(self.id));
        }
        let height = (image.h as f64 * width as f64 / image.w as f64).round().max(1.0) as u32;
        self.resize(width, height)
    }

    // ---------------------------------------------------------------------
    // alignment

    /// Hands out the warp of this panel's buffer through `homography`.
    /// Preconditions on both panels are checked by the orchestrator.
    pub(crate) fn begin_align(
        &mut self,
        homography: Homography,
        reference_points: Arc<[ControlPoint]>,
    ) -> Result<AlignTask> {
        let buffer = self.require(&[PanelStatus::Loaded])?;
        self.control_points.end_drag();
        self.status = PanelStatus::Aligning;
        self.epoch += 1;
        Ok(AlignTask {
            ticket: self.ticket(),
            buffer,
            homography,
            reference_points,
        })
    }

    /// Swaps in the warped buffer. The landmarks now sit where the reference
    /// panel has them, so the reference points replace this panel's points.
    pub(crate) fn apply_align(&mut self, outcome: AlignOutcome) -> Option<Arc<Photo>> {
        if !self.is_current(&outcome.ticket) {
            tracing::warn!("{} panel: discarding stale alignment result", self.id);
            return None;
        }
        let warped = Arc::new(outcome.warped);
        self.pixel_buffer = Some(warped.clone());
        self.control_points.replace_all(&outcome.reference_points);
        self.pointer.markers_visible = true;
        self.status = PanelStatus::Loaded;
        self.epoch += 1;
        tracing::info!("{} panel: aligned", self.id);
        Some(warped)
    }

    // ---------------------------------------------------------------------
    // control points

    /// Adds a control point given in image space.
    ///
    /// # Errors
    /// [`RegistrationError::InvalidState`] while an alignment is in flight,
    /// [`RegistrationError::MaxControlPoints`] once the panel is full.
    pub fn add_control_point(&mut self, point: ControlPoint) -> Result<usize> {
        self.require(&POINT_STATES)?;
        let index = self.control_points.add(point)?;
        self.pointer.markers_visible = true;
        tracing::debug!("{} panel: point {} at ({}, {})", self.id, index + 1, point.x, point.y);
        Ok(index)
    }

    /// Removes the most recently added point, `Ok(None)` if there is none.
    pub fn delete_last_point(&mut self) -> Result<Option<ControlPoint>> {
        self.require(&POINT_STATES)?;
        Ok(self.control_points.delete_last())
    }

    pub fn clear_points(&mut self) -> Result<()> {
        self.require(&POINT_STATES)?;
        self.control_points.clear();
        Ok(())
    }

    /// Whether control points may be added, moved or removed right now.
    pub fn accepts_point_edits(&self) -> bool {
        self.pixel_buffer.is_some() && POINT_STATES.contains(&self.status)
    }

    /// Converts a surface position into render-local coordinates.
    pub fn to_render_local(&self, surface: (i32, i32)) -> (i32, i32) {
        let render = &self.dimensions.render;
        (surface.0 - render.x, surface.1 - render.y)
    }

    /// Converts a surface position into image space.
    pub fn to_image_space(&self, surface: (i32, i32)) -> (i32, i32) {
        let (x, y) = self.to_render_local(surface);
        scale_point(x, y, &self.dimensions.image, &self.dimensions.render)
    }

    /// Converts an image-space position into surface coordinates.
    pub fn to_surface(&self, point: &ControlPoint) -> (i32, i32) {
        let render = &self.dimensions.render;
        let (x, y) = scale_point(point.x, point.y, render, &self.dimensions.image);
        (x + render.x, y + render.y)
    }

    // ---------------------------------------------------------------------
    // output

    /// Draws the working buffer, markers, crop selection and loupe.
    pub fn render<S: RenderSurface + ?Sized>(&self, surface: &mut S) {
        let bounds = surface.bounds();
        surface.clear(bounds);
        let Some(buffer) = &self.pixel_buffer else {
            return;
        };
        let dims = &self.dimensions;
        surface.draw_photo(buffer, dims.image.extent(), dims.render);

        if self.pointer.markers_visible {
            for point in self.control_points.points() {
                let (x, y) = self.to_surface(point);
                surface.fill_rect(
                    Dimension::centered(x, y, self.config.marker_size),
                    self.config.marker_color,
                );
            }
        }

        if let Some(selection) = self.pointer.selection {
            surface.stroke_rect(selection, self.config.selection_color);
        }

        if self.pointer.magnify {
            if let Some(position) = self.pointer.position {
                let local = self.to_render_local(position);
                let loupe = render_loupe(
                    buffer,
                    dims,
                    local,
                    self.control_points.points(),
                    &self.config.magnifier,
                );
                if let Some(loupe) = loupe {
                    let dest = Dimension::centered(position.0, position.1, self.config.magnifier.size);
                    surface.draw_photo(&loupe.frame, loupe.frame.dimension(), dest);
                }
            }
        }
    }

    /// Encodes the working buffer.
    pub fn save(&self, request: &SaveRequest) -> Result<Vec<u8>> {
        let buffer = self
            .pixel_buffer
            .as_ref()
            .ok_or(RegistrationError::EmptyPanel(self.id))?;
        let bytes = encode(buffer, request)?;
        tracing::info!("{} panel: saved {} bytes as {:?}", self.id, bytes.len(), request.format);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photo_codec::{decode, SaveFormat};
    use crate::render_surface::CanvasSurface;

    fn gradient(width: usize, height: usize) -> Photo {
        let mut photo = Photo::new(width, height);
        for y in 0..height {
            for x in 0..width {
                photo.set_rgba(x, y, [(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]);
            }
        }
        photo
    }

    fn loaded(width: usize, height: usize) -> Panel {
        let mut panel = Panel::new(PanelId::Historic, PanelConfig::default()).unwrap();
        panel
            .load(LoadRequest::from_photo(gradient(width, height), "gradient"))
            .unwrap();
        panel
    }

    #[test]
    fn load_fits_render_into_base() {
        let panel = loaded(200, 150);
        let dims = panel.dimensions();
        assert_eq!(panel.status(), PanelStatus::Loaded);
        assert_eq!(dims.original, Dimension::sized(200, 150));
        assert_eq!(dims.image, dims.original);
        assert_eq!(dims.source, dims.original);
        assert_eq!(dims.render, Dimension::sized(800, 600));
        assert_eq!(dims.magnified, Dimension::sized(2400, 1800));
        assert_eq!(panel.metadata().map(|m| m.filename.as_str()), Some("gradient"));
    }

    #[test]
    fn failed_load_enters_error_without_buffers() {
        let mut panel = loaded(20, 20);
        let err = panel
            .load(LoadRequest::from_bytes(vec![1, 2, 3], "broken.png"))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Decode { .. }));
        assert_eq!(panel.status(), PanelStatus::Error);
        assert!(panel.pixels().is_none());
        assert!(panel.source_pixels().is_none());
    }

    #[test]
    fn cancelled_load_result_is_discarded() {
        let mut panel = loaded(40, 30);
        let before = panel.pixels().unwrap().clone();
        let task = panel.begin_load(LoadRequest::from_photo(gradient(10, 10), "late"));
        assert_eq!(panel.status(), PanelStatus::Loading);
        assert!(panel.cancel());

        assert_eq!(panel.complete_load(task.run()), Ok(false));
        assert_eq!(panel.status(), PanelStatus::Loaded);
        assert!(Arc::ptr_eq(panel.pixels().unwrap(), &before));
        assert_eq!(panel.metadata().unwrap().filename, "gradient");
    }

    #[test]
    fn superseded_load_result_is_discarded() {
        let mut panel = Panel::new(PanelId::Modern, PanelConfig::default()).unwrap();
        let first = panel.begin_load(LoadRequest::from_photo(gradient(10, 10), "first"));
        let second = panel.begin_load(LoadRequest::from_photo(gradient(30, 20), "second"));

        assert_eq!(panel.complete_load(first.run()), Ok(false));
        assert!(panel.pixels().is_none());
        assert_eq!(panel.status(), PanelStatus::Loading);

        assert_eq!(panel.complete_load(second.run()), Ok(true));
        assert_eq!(panel.dimensions().image, Dimension::sized(30, 20));
    }

    #[test]
    fn stale_failed_load_leaves_panel_alone() {
        let mut panel = loaded(40, 30);
        panel.add_control_point(ControlPoint::new(5, 5)).unwrap();
        let task = panel.begin_load(LoadRequest::from_bytes(vec![1, 2, 3], "broken.png"));
        panel.cancel();

        assert_eq!(panel.complete_load(task.run()), Ok(false));
        assert_eq!(panel.status(), PanelStatus::Loaded);
        assert!(panel.pixels().is_some());
        assert_eq!(panel.control_points().len(), 1);
    }

    #[test]
    fn view_operations_need_an_image() {
        let mut panel = Panel::new(PanelId::Modern, PanelConfig::default()).unwrap();
        assert_eq!(panel.zoom_in(), Err(RegistrationError::EmptyPanel(PanelId::Modern)));
        assert_eq!(panel.fit(), Err(RegistrationError::EmptyPanel(PanelId::Modern)));
    }

    #[test]
    fn zoom_in_then_out_returns_to_start() {
        let mut panel = loaded(200, 150);
        let start = panel.dimensions().render;
        for _ in 0..10 {
            panel.zoom_in().unwrap();
        }
        assert!(panel.dimensions().render.w > 2000);
        for _ in 0..10 {
            panel.zoom_out().unwrap();
        }
        let end = panel.dimensions().render;
        assert!((end.w as i64 - start.w as i64).abs() <= 1);
        assert!((end.h as i64 - start.h as i64).abs() <= 1);
        assert!((end.x as i64 - start.x as i64).abs() <= 1);
    }

    #[test]
    fn expand_shows_image_one_to_one() {
        let mut panel = loaded(200, 150);
        panel.set_selection(Some(Dimension::new(0, 0, 10, 10))).unwrap();
        panel.expand().unwrap();
        assert_eq!(panel.dimensions().render, Dimension::sized(200, 150));
        assert_eq!(panel.pointer().selection, None);
        assert_eq!(panel.status(), PanelStatus::Loaded);
        panel.fit().unwrap();
        assert_eq!(panel.dimensions().render, Dimension::sized(800, 600));
    }

    #[test]
    fn crop_then_reset_restores_original() {
        let mut panel = loaded(200, 150);
        let original = panel.pixels().unwrap().as_ref().clone();

        assert!(panel.crop(Dimension::new(40, 40, 200, 100)).unwrap());
        let dims = *panel.dimensions();
        assert_eq!(dims.image, Dimension::sized(50, 25));
        assert_eq!(dims.source, Dimension::new(10, 10, 50, 25));
        assert_eq!(dims.render, Dimension::sized(200, 100));
        assert_eq!(
            panel.pixels().unwrap().as_ref(),
            &original.crop(Dimension::new(10, 10, 50, 25))
        );

        panel.reset().unwrap();
        assert_eq!(panel.pixels().unwrap().as_ref(), &original);
        assert_eq!(panel.dimensions().image, panel.dimensions().original);
        assert_eq!(panel.dimensions().render, Dimension::sized(800, 600));
    }

    #[test]
    fn zero_area_crop_is_ignored() {
        let mut panel = loaded(200, 150);
        let before = panel.dimensions().clone();
        assert!(!panel.crop(Dimension::new(40, 40, 0, 100)).unwrap());
        assert!(!panel.crop(Dimension::new(900, 900, 50, 50)).unwrap());
        assert_eq!(panel.dimensions(), &before);
    }

    #[test]
    fn crop_keeps_points_and_reports_those_outside() {
        let mut panel = loaded(200, 150);
        panel.add_control_point(ControlPoint::new(20, 20)).unwrap();
        panel.add_control_point(ControlPoint::new(150, 100)).unwrap();
        panel.crop(Dimension::new(40, 40, 200, 100)).unwrap();
        assert_eq!(panel.control_points().len(), 2);
        assert!(!panel.pointer().markers_visible);
        assert_eq!(panel.points_outside_image(), vec![1]);
    }

    #[test]
    fn resize_rescales_buffer_and_points() {
        let mut panel = loaded(200, 150);
        panel.add_control_point(ControlPoint::new(100, 50)).unwrap();
        panel.resize(100, 75).unwrap();
        assert_eq!(panel.dimensions().image, Dimension::sized(100, 75));
        assert_eq!(panel.pixels().map(|p| (p.width, p.height)), Some((100, 75)));
        assert_eq!(panel.control_points().get(0), Some(ControlPoint::new(50, 25)));
        assert_eq!(panel.dimensions().original, Dimension::sized(200, 150));
    }

    #[test]
    fn resize_to_width_keeps_aspect() {
        let mut panel = loaded(200, 150);
        panel.resize_to_width(80).unwrap();
        assert_eq!(panel.dimensions().image, Dimension::sized(80, 60));
    }

    #[test]
    fn stale_resize_is_discarded_after_reset() {
        let mut panel = loaded(200, 150);
        let task = panel.begin_resize(100, 75).unwrap();
        assert_eq!(panel.status(), PanelStatus::Resizing);
        panel.reset().unwrap();
        assert!(!panel.apply_resize(task.run()));
        assert_eq!(panel.dimensions().image, Dimension::sized(200, 150));
        assert_eq!(panel.status(), PanelStatus::Loaded);
    }

    #[test]
    fn resize_is_refused_while_busy() {
        let mut panel = loaded(200, 150);
        let _task = panel.begin_resize(100, 75).unwrap();
        assert!(matches!(
            panel.begin_resize(50, 50),
            Err(RegistrationError::InvalidState {
                status: PanelStatus::Resizing,
                ..
            })
        ));
        assert!(panel.cancel());
        assert_eq!(panel.status(), PanelStatus::Loaded);
    }

    #[test]
    fn render_draws_image_and_markers() {
        let mut panel = Panel::new(PanelId::Historic, PanelConfig::default()).unwrap();
        panel
            .load(LoadRequest::from_photo(Photo::filled(200, 150, [200, 10, 10, 255]), "red"))
            .unwrap();
        panel.add_control_point(ControlPoint::new(100, 75)).unwrap();

        let mut surface = CanvasSurface::new(800, 600);
        panel.render(&mut surface);
        let pixels = surface.pixels();
        assert_eq!(pixels.get_rgba(10, 10), Some([200, 10, 10, 255]));
        assert_eq!(pixels.get_rgba(400, 300), Some(panel.config().marker_color));
    }

    #[test]
    fn render_draws_loupe_around_pointer() {
        let mut halves = Photo::new(200, 150);
        for y in 0..150 {
            for x in 0..200 {
                let v = if x < 100 { 10 } else { 200 };
                halves.set_rgba(x, y, [v, v, v, 255]);
            }
        }
        let mut panel = Panel::new(PanelId::Historic, PanelConfig::default()).unwrap();
        panel.load(LoadRequest::from_photo(halves, "halves")).unwrap();
        panel.set_magnifier(true);
        panel.handle_event(crate::panel_event::PanelEvent::PointerMove { x: 420, y: 300 });

        let mut surface = CanvasSurface::new(800, 600);
        panel.render(&mut surface);
        let pixels = surface.pixels();
        let crosshair = panel.config().magnifier.crosshair_color;
        // 160 px loupe centred on (420, 300), crosshair through its centre
        assert_eq!(pixels.get_rgba(420, 250), Some(crosshair));
        assert_eq!(pixels.get_rgba(380, 300), Some(crosshair));
        assert_eq!(pixels.get_rgba(341, 250), Some([10, 10, 10, 255]));
        assert_eq!(pixels.get_rgba(499, 250), Some([200, 200, 200, 255]));
        // outside the loupe the image is drawn as usual
        assert_eq!(pixels.get_rgba(420, 200), Some([200, 200, 200, 255]));
        assert_eq!(pixels.get_rgba(339, 300), Some([10, 10, 10, 255]));
    }

    #[test]
    fn save_encodes_working_buffer() {
        let mut panel = loaded(30, 20);
        panel.crop(Dimension::new(0, 0, 400, 400)).unwrap();
        let bytes = panel.save(&SaveRequest::new(SaveFormat::Png)).unwrap();
        let decoded = decode(LoadRequest::from_bytes(bytes, "out.png")).unwrap();
        assert_eq!(&decoded.photo, panel.pixels().unwrap().as_ref());
    }
}
