//! Hand-off of an aligned image pair to whatever persists it.

use crate::control_point::ControlPoint;
use crate::error::{RegistrationError, Result};
use crate::homography::Homography;
use crate::panel::PanelId;
use crate::photo::Photo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What is known about one side of an aligned pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub panel: PanelId,
    pub filename: String,
    pub mime_type: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Control points in image space, in correspondence order.
    pub control_points: Vec<ControlPoint>,
}

/// Metadata travelling with an [`AlignedPair`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub reference: CaptureInfo,
    pub target: CaptureInfo,
    /// Maps reference pixel positions to positions in the target as it was
    /// before warping.
    pub homography: Homography,
    /// Target control points as picked, before alignment replaced them.
    pub target_points_before: Vec<ControlPoint>,
}

/// The reference buffer, the warped target buffer and their metadata.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub reference: Arc<Photo>,
    pub target: Arc<Photo>,
    pub metadata: CaptureMetadata,
}

/// Receives aligned pairs for persistence.
pub trait AlignmentSink {
    /// # Errors
    /// Implementations report failures as [`RegistrationError::Export`].
    fn receive(&mut self, pair: AlignedPair) -> Result<()>;
}

/// Keeps every received pair in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub pairs: Vec<AlignedPair>,
}

impl AlignmentSink for MemorySink {
    fn receive(&mut self, pair: AlignedPair) -> Result<()> {
        self.pairs.push(pair);
        Ok(())
    }
}

impl<F> AlignmentSink for F
where
    F: FnMut(AlignedPair) -> std::result::Result<(), String>,
{
    fn receive(&mut self, pair: AlignedPair) -> Result<()> {
        self(pair).map_err(RegistrationError::Export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> AlignedPair {
        let info = |panel: PanelId| CaptureInfo {
            panel,
            filename: format!("{panel}.png"),
            mime_type: Some("image/png".to_string()),
            width: 2,
            height: 2,
            control_points: vec![ControlPoint::new(1, 1)],
        };
        AlignedPair {
            reference: Arc::new(Photo::new(2, 2)),
            target: Arc::new(Photo::new(2, 2)),
            metadata: CaptureMetadata {
                reference: info(PanelId::Historic),
                target: info(PanelId::Modern),
                homography: Homography::identity(),
                target_points_before: vec![ControlPoint::new(2, 2)],
            },
        }
    }

    #[test]
    fn closure_errors_become_export_errors() {
        let mut sink = |_pair: AlignedPair| -> std::result::Result<(), String> { Err("disk full".to_string()) };
        assert_eq!(
            sink.receive(pair()),
            Err(RegistrationError::Export("disk full".to_string()))
        );
    }

    #[test]
    fn memory_sink_collects_pairs() {
        let mut sink = MemorySink::default();
        sink.receive(pair()).unwrap();
        assert_eq!(sink.pairs.len(), 1);
        assert_eq!(sink.pairs[0].metadata.reference.filename, "historic.png");
    }
}
