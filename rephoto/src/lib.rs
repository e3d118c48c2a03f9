//! # Rephoto Library
//!
//! The `rephoto` library aligns pairs of repeat photographs: a historic and a
//! modern capture of the same viewpoint. The user picks four corresponding
//! landmarks on each image, a homography is solved from them, and one image is
//! warped into the frame of the other.
//!
//! ## Overview of Modules
//!
//! - **`registration_orchestrator`**: Drives the two panels of a session, checks alignment
//!   preconditions, solves the homography and routes the warped buffer back into the
//!   target panel.
//!
//! - **`panel`**: The per-image state machine: load, fit/expand/zoom, crop, resize, reset,
//!   and the receiving end of an alignment.
//!
//! - **`panel_event`**: Pointer and key input for a panel, answered with explicit notices.
//!
//! - **`operation_ticket`**: Load, resize and align work as `Send` tasks whose results are
//!   dropped when the panel moved on in the meantime.
//!
//! - **`photo`**: Defines a basic `Photo` struct for storing pixel data (RGBA format) along
//!   with methods for scaling, cropping and pixel access.
//!
//! - **`dimension`**: Integer rectangles and the six coordinate spaces of a panel.
//!
//! - **`coordinate_transform`**: Pure conversions between those spaces.
//!
//! - **`control_point`**: The per-panel landmark list with hit-testing and dragging.
//!
//! - **`homography`**: The four-point projective solver.
//!
//! - **`photo_warper`**: Resamples a photo through a homography.
//!
//! - **`magnifier`**: The loupe drawn around the pointer.
//!
//! - **`render_surface`**: The drawing target a panel renders onto.
//!
//! - **`photo_codec`**: Decoding (including multi-page TIFF) and encoding of photos.
//!
//! - **`alignment_export`**: Hand-off of aligned pairs and their metadata.
//!
//! - **`config`** and **`error`**: Settings and the error type shared by all of the above.

pub mod alignment_export;
pub mod config;
pub mod control_point;
pub mod coordinate_transform;
pub mod dimension;
pub mod error;
pub mod homography;
pub mod magnifier;
pub mod operation_ticket;
pub mod panel;
pub mod panel_event;
pub mod photo;
pub mod photo_codec;
pub mod photo_warper;
pub mod registration_orchestrator;
pub mod render_surface;

pub use error::{RegistrationError, Result};
pub use panel::{Panel, PanelId, PanelStatus};
pub use registration_orchestrator::{Alignment, RegistrationOrchestrator};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
