use crate::panel::{PanelId, PanelStatus};

/// Every failure the registration core can report to its caller.
///
/// Alignment precondition failures (`InsufficientPoints`, `CollinearPoints`,
/// `DimensionMismatch`, `SingularSystem`) are recoverable: the panels involved
/// are left exactly as they were. `Decode` is fatal for the load that raised
/// it and moves the panel into [`PanelStatus::Error`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistrationError {
    #[error("failed to decode {filename}: {reason}")]
    Decode { filename: String, reason: String },

    #[error("failed to encode image as {format}: {reason}")]
    Encode { format: String, reason: String },

    #[error("alignment needs {required} control points on both panels, found {reference} and {target}")]
    InsufficientPoints {
        required: usize,
        reference: usize,
        target: usize,
    },

    #[error("control points on the {panel} panel are collinear")]
    CollinearPoints { panel: PanelId },

    #[error("image widths differ: reference is {reference_width}px, target is {target_width}px")]
    DimensionMismatch {
        reference_width: u32,
        target_width: u32,
    },

    #[error("point correspondences produce a singular system")]
    SingularSystem,

    #[error("panel already holds the maximum of {max} control points")]
    MaxControlPoints { max: usize },

    #[error("the {0} panel has no image")]
    EmptyPanel(PanelId),

    #[error("operation not allowed on the {panel} panel while it is {status:?}")]
    InvalidState { panel: PanelId, status: PanelStatus },

    #[error("an alignment is already in progress")]
    AlignmentInProgress,

    #[error("reference and target must be different panels")]
    SamePanel,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("export failed: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, RegistrationError>;
