//! Long-running panel work packaged as plain `Send` values.
//!
//! A panel hands out a task together with an [`OperationTicket`] recording
//! which panel started it, in which status, at which epoch. The task can be
//! run on any thread. Its outcome goes back through the panel's `apply_*` /
//! `complete_*` method, which compares the ticket with the panel's current
//! state and drops the outcome if the panel has moved on.

use crate::control_point::ControlPoint;
use crate::error::Result;
use crate::homography::Homography;
use crate::panel::{PanelId, PanelStatus};
use crate::photo::Photo;
use crate::photo_codec::{decode, DecodedPhoto, LoadRequest};
use crate::photo_warper::warp_photo;
use std::sync::Arc;

/// Identifies the panel state an operation was started from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OperationTicket {
    pub panel: PanelId,
    pub epoch: u64,
    pub status: PanelStatus,
}

/// Decoding of a load request.
#[derive(Debug)]
pub struct LoadTask {
    pub(crate) ticket: OperationTicket,
    pub(crate) request: LoadRequest,
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub ticket: OperationTicket,
    pub result: Result<DecodedPhoto>,
}

impl LoadTask {
    pub fn ticket(&self) -> OperationTicket {
        self.ticket
    }

    pub fn run(self) -> LoadOutcome {
        LoadOutcome {
            ticket: self.ticket,
            result: decode(self.request),
        }
    }
}

/// Resampling of a panel's working buffer.
#[derive(Debug)]
pub struct ResizeTask {
    pub(crate) ticket: OperationTicket,
    pub(crate) buffer: Arc<Photo>,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

#[derive(Debug)]
pub struct ResizeOutcome {
    pub ticket: OperationTicket,
    pub photo: Photo,
}

impl ResizeTask {
    pub fn ticket(&self) -> OperationTicket {
        self.ticket
    }

    pub fn run(self) -> ResizeOutcome {
        ResizeOutcome {
            ticket: self.ticket,
            photo: self.buffer.get_scaled(self.width, self.height),
        }
    }
}

/// Warping of the target panel's buffer with an already solved homography.
#[derive(Debug)]
pub struct AlignTask {
    pub(crate) ticket: OperationTicket,
    pub(crate) buffer: Arc<Photo>,
    pub(crate) homography: Homography,
    pub(crate) reference_points: Arc<[ControlPoint]>,
}

#[derive(Debug)]
pub struct AlignOutcome {
    pub ticket: OperationTicket,
    pub warped: Photo,
    pub homography: Homography,
    /// Where the target's landmarks sit after warping.
    pub reference_points: Arc<[ControlPoint]>,
}

impl AlignTask {
    pub fn ticket(&self) -> OperationTicket {
        self.ticket
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    /// Warps into the target's own extent.
    pub fn run(self) -> AlignOutcome {
        let size = (self.buffer.width, self.buffer.height);
        AlignOutcome {
            ticket: self.ticket,
            warped: warp_photo(&self.homography, &self.buffer, Some(size)),
            homography: self.homography,
            reference_points: self.reference_points,
        }
    }
}
