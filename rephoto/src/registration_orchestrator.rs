use crate::alignment_export::{AlignedPair, AlignmentSink, CaptureInfo, CaptureMetadata};
use crate::config::RegistrationConfig;
use crate::control_point::ControlPoint;
use crate::error::{RegistrationError, Result};
use crate::homography::{control_points_to_quad, has_collinear_triple, solve, Homography, CORRESPONDENCE_COUNT};
use crate::operation_ticket::{AlignOutcome, AlignTask, OperationTicket};
use crate::panel::{Panel, PanelId};
use crate::photo::Photo;
use crate::photo_codec::{ImageMetadata, LoadRequest, SaveRequest};
use std::sync::Arc;

/// A successful alignment.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub reference: PanelId,
    pub target: PanelId,
    pub homography: Homography,
    /// The target panel's new working buffer.
    pub warped: Arc<Photo>,
}

/// What the last applied alignment looked like, kept for export.
///
/// Both epochs are taken right after the result was applied. A later change
/// to either panel's geometry makes the record stale.
#[derive(Debug, Clone)]
struct AlignmentRecord {
    alignment: Alignment,
    target_points_before: Vec<ControlPoint>,
    reference_pixels: Arc<Photo>,
    reference_info: CaptureInfo,
    target_info: CaptureInfo,
    reference_epoch: u64,
    target_epoch: u64,
}

#[derive(Debug, Clone)]
struct InFlight {
    reference: PanelId,
    reference_epoch: u64,
    ticket: OperationTicket,
    target_points_before: Vec<ControlPoint>,
}

/// Drives the historic and modern panels of one registration session.
///
/// Alignment solves a homography from the reference panel's control points to
/// the target panel's, then warps the target buffer so that its landmarks land
/// where the reference has them. Only one alignment can be in flight at a time.
#[derive(Debug, Clone)]
pub struct RegistrationOrchestrator {
    config: RegistrationConfig,
    historic: Panel,
    modern: Panel,
    in_flight: Option<InFlight>,
    last_alignment: Option<AlignmentRecord>,
}

impl RegistrationOrchestrator {
    /// Creates two empty panels.
    ///
    /// # Errors
    /// [`RegistrationError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: RegistrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(RegistrationOrchestrator {
            historic: Panel::new(PanelId::Historic, config.panel.clone())?,
            modern: Panel::new(PanelId::Modern, config.panel.clone())?,
            config,
            in_flight: None,
            last_alignment: None,
        })
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn panel(&self, id: PanelId) -> &Panel {
        match id {
            PanelId::Historic => &self.historic,
            PanelId::Modern => &self.modern,
        }
    }

    pub fn panel_mut(&mut self, id: PanelId) -> &mut Panel {
        match id {
            PanelId::Historic => &mut self.historic,
            PanelId::Modern => &mut self.modern,
        }
    }

    /// Loads an image into one panel.
    pub fn load(&mut self, id: PanelId, request: LoadRequest) -> Result<&ImageMetadata> {
        let panel = self.panel_mut(id);
        panel.load(request)?;
        panel.metadata().ok_or(RegistrationError::EmptyPanel(id))
    }

    /// Encodes one panel's working buffer.
    pub fn save(&self, id: PanelId, request: &SaveRequest) -> Result<Vec<u8>> {
        self.panel(id).save(request)
    }

    /// Returns `true` while an alignment task is outstanding.
    pub fn is_aligning(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Checks every precondition, solves the homography and hands out the warp
    /// of the target buffer.
    ///
    /// Checks run in this order: distinct panels, no alignment in flight, both
    /// panels hold an image, both have exactly four control points, equal image
    /// widths, no three collinear points on either panel, solvable system. On
    /// any failure both panels are left untouched.
    pub fn begin_align(&mut self, reference: PanelId, target: PanelId) -> Result<AlignTask> {
        if reference == target {
            return Err(RegistrationError::SamePanel);
        }
        if let Some(ticket) = self.in_flight.as_ref().map(|in_flight| in_flight.ticket) {
            if self.panel(ticket.panel).is_current(&ticket) {
                return Err(RegistrationError::AlignmentInProgress);
            }
            // the target moved on, so the pending result can only be discarded
            tracing::warn!("dropping stale alignment of the {} panel", ticket.panel);
            self.in_flight = None;
        }

        let reference_panel = self.panel(reference);
        let target_panel = self.panel(target);
        for panel in [reference_panel, target_panel] {
            if panel.pixels().is_none() {
                return Err(RegistrationError::EmptyPanel(panel.id()));
            }
        }

        let reference_points = reference_panel.control_points().snapshot();
        let target_points = target_panel.control_points().snapshot();
        let quads = (
            control_points_to_quad(&reference_points),
            control_points_to_quad(&target_points),
        );
        let (from, to) = match quads {
            (Some(from), Some(to)) => (from, to),
            _ => {
                return Err(RegistrationError::InsufficientPoints {
                    required: CORRESPONDENCE_COUNT,
                    reference: reference_points.len(),
                    target: target_points.len(),
                })
            }
        };

        let reference_width = reference_panel.dimensions().image.w;
        let target_width = target_panel.dimensions().image.w;
        if reference_width != target_width {
            return Err(RegistrationError::DimensionMismatch {
                reference_width,
                target_width,
            });
        }

        if has_collinear_triple(&from) {
            return Err(RegistrationError::CollinearPoints { panel: reference });
        }
        if has_collinear_triple(&to) {
            return Err(RegistrationError::CollinearPoints { panel: target });
        }

        let homography = solve(&from, &to)?;
        let target_points_before = target_points.to_vec();
        let reference_epoch = reference_panel.ticket().epoch;
        let task = self.panel_mut(target).begin_align(homography, reference_points)?;

        tracing::info!("aligning {target} onto {reference}");
        self.in_flight = Some(InFlight {
            reference,
            reference_epoch,
            ticket: task.ticket(),
            target_points_before,
        });
        Ok(task)
    }

    /// Applies a finished warp.
    ///
    /// # Returns
    /// `None` if either panel changed while the warp ran (reset, reload,
    /// crop, resize, cancel) and the result was discarded.
    pub fn complete_align(&mut self, outcome: AlignOutcome) -> Option<Alignment> {
        let awaited = self
            .in_flight
            .as_ref()
            .map_or(false, |in_flight| in_flight.ticket == outcome.ticket);
        if !awaited {
            tracing::warn!("discarding alignment result nobody is waiting for");
            return None;
        }
        let in_flight = self.in_flight.take()?;
        let target = outcome.ticket.panel;
        let reference_panel = self.panel(in_flight.reference);
        if reference_panel.ticket().epoch != in_flight.reference_epoch {
            tracing::warn!(
                "the {} panel changed while {target} was warped onto it, discarding the result",
                in_flight.reference
            );
            let panel = self.panel_mut(target);
            if panel.is_current(&outcome.ticket) {
                panel.cancel();
            }
            return None;
        }
        let reference_pixels = reference_panel.pixels()?.clone();

        let homography = outcome.homography;
        let panel = self.panel_mut(target);
        let warped = panel.apply_align(outcome)?;

        let alignment = Alignment {
            reference: in_flight.reference,
            target,
            homography,
            warped,
        };
        let reference_panel = self.panel(in_flight.reference);
        let target_panel = self.panel(target);
        self.last_alignment = Some(AlignmentRecord {
            alignment: alignment.clone(),
            target_points_before: in_flight.target_points_before,
            reference_pixels,
            reference_info: capture_info(reference_panel),
            target_info: capture_info(target_panel),
            reference_epoch: reference_panel.ticket().epoch,
            target_epoch: target_panel.ticket().epoch,
        });
        Some(alignment)
    }

    /// Aligns `target` onto `reference` in one step.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::config::RegistrationConfig;
    /// # use rephoto::control_point::ControlPoint;
    /// # use rephoto::panel::PanelId;
    /// # use rephoto::photo::Photo;
    /// # use rephoto::photo_codec::LoadRequest;
    /// # use rephoto::registration_orchestrator::RegistrationOrchestrator;
    /// let mut session = RegistrationOrchestrator::new(RegistrationConfig::default()).unwrap();
    /// for id in [PanelId::Historic, PanelId::Modern] {
    ///     session.load(id, LoadRequest::from_photo(Photo::new(64, 48), "blank")).unwrap();
    ///     for (x, y) in [(5, 5), (60, 5), (60, 40), (5, 40)] {
    ///         session.panel_mut(id).add_control_point(ControlPoint::new(x, y)).unwrap();
    ///     }
    /// }
    /// let alignment = session.align(PanelId::Historic, PanelId::Modern).unwrap();
    /// assert!(alignment.homography.is_near_identity(1e-9));
    /// ```
    pub fn align(&mut self, reference: PanelId, target: PanelId) -> Result<Alignment> {
        let task = self.begin_align(reference, target)?;
        let ticket = task.ticket();
        self.complete_align(task.run())
            .ok_or(RegistrationError::InvalidState {
                panel: target,
                status: ticket.status,
            })
    }

    /// Abandons the alignment in flight; its result will be discarded.
    pub fn cancel_align(&mut self) -> bool {
        match self.in_flight.take() {
            Some(in_flight) => {
                self.panel_mut(in_flight.ticket.panel).cancel();
                true
            }
            None => false,
        }
    }

    /// Sends the most recent alignment, with both buffers and capture
    /// metadata, to `sink`.
    ///
    /// The metadata describes both panels as they were when the alignment was
    /// applied.
    ///
    /// # Errors
    /// [`RegistrationError::Export`] if nothing has been aligned, or either
    /// panel was reloaded, cropped, resized or reset since; otherwise whatever
    /// the sink reports.
    pub fn export<S: AlignmentSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        let record = self
            .last_alignment
            .as_ref()
            .ok_or_else(|| RegistrationError::Export("no alignment to export".to_string()))?;
        let alignment = &record.alignment;
        let checks = [
            (alignment.reference, record.reference_epoch),
            (alignment.target, record.target_epoch),
        ];
        for (id, epoch) in checks {
            if self.panel(id).ticket().epoch != epoch {
                return Err(RegistrationError::Export(format!(
                    "the {id} panel changed after the alignment"
                )));
            }
        }

        let pair = AlignedPair {
            reference: record.reference_pixels.clone(),
            target: alignment.warped.clone(),
            metadata: CaptureMetadata {
                reference: record.reference_info.clone(),
                target: record.target_info.clone(),
                homography: alignment.homography,
                target_points_before: record.target_points_before.clone(),
            },
        };
        tracing::info!(
            "exporting {} / {} pair",
            pair.metadata.reference.filename,
            pair.metadata.target.filename
        );
        sink.receive(pair)
    }
}

fn capture_info(panel: &Panel) -> CaptureInfo {
    let metadata = panel.metadata();
    let image = panel.dimensions().image;
    CaptureInfo {
        panel: panel.id(),
        filename: metadata.map(|m| m.filename.clone()).unwrap_or_default(),
        mime_type: metadata.and_then(|m| m.mime_type.clone()),
        width: image.w,
        height: image.h,
        control_points: panel.control_points().points().to_vec(),
    }
}
