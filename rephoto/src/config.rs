use crate::error::{RegistrationError, Result};
use crate::homography::CORRESPONDENCE_COUNT;
use serde::{Deserialize, Serialize};

/// Loupe appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnifierConfig {
    /// Side of the drawn loupe square, in surface pixels. Constant even at image edges.
    pub size: u32,
    /// Magnified copy extent relative to the current render extent.
    pub magnification: f64,
    /// Crosshair line thickness in pixels.
    pub crosshair_thickness: u32,
    pub crosshair_color: [u8; 4],
    /// Side of the square drawn for each control point inside the loupe.
    pub marker_size: u32,
    pub marker_color: [u8; 4],
    /// Colour behind the sampled region when it is shrunk at an image edge.
    pub background_color: [u8; 4],
}

impl Default for MagnifierConfig {
    fn default() -> Self {
        Self {
            size: 160,
            magnification: 3.0,
            crosshair_thickness: 1,
            crosshair_color: [255, 0, 0, 255],
            marker_size: 7,
            marker_color: [255, 255, 0, 255],
            background_color: [0, 0, 0, 255],
        }
    }
}

/// Per-panel behaviour and viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Fixed on-screen viewport the image is fitted into.
    pub base_width: u32,
    pub base_height: u32,
    /// Cap on the number of control points per panel.
    pub max_control_points: usize,
    /// Half-width (render pixels) of the square used to hit-test control points.
    pub hit_radius: i32,
    /// Factor applied by one zoom step.
    pub zoom_factor: f64,
    /// Side of the square drawn for each control point on the panel.
    pub marker_size: u32,
    pub marker_color: [u8; 4],
    pub selection_color: [u8; 4],
    pub magnifier: MagnifierConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            base_width: 800,
            base_height: 600,
            max_control_points: CORRESPONDENCE_COUNT,
            hit_radius: 8,
            zoom_factor: 1.1,
            marker_size: 9,
            marker_color: [0, 255, 0, 255],
            selection_color: [0, 160, 255, 255],
            magnifier: MagnifierConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Checks the values a panel relies on.
    pub fn validate(&self) -> Result<()> {
        if self.base_width == 0 || self.base_height == 0 {
            return Err(RegistrationError::InvalidConfig(
                "base viewport must have a non-zero size".to_string(),
            ));
        }
        if !(self.zoom_factor > 1.0) || !self.zoom_factor.is_finite() {
            return Err(RegistrationError::InvalidConfig(format!(
                "zoom_factor must be a finite value above 1, got {}",
                self.zoom_factor
            )));
        }
        if self.hit_radius < 0 {
            return Err(RegistrationError::InvalidConfig(
                "hit_radius must not be negative".to_string(),
            ));
        }
        if !(self.magnifier.magnification > 0.0) || self.magnifier.size == 0 {
            return Err(RegistrationError::InvalidConfig(
                "magnifier needs a positive size and magnification".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for a two-panel registration session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub panel: PanelConfig,
}

impl RegistrationConfig {
    /// Validates the panel settings and that the point cap matches the
    /// number of correspondences a homography is solved from.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::config::RegistrationConfig;
    /// let mut config = RegistrationConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.panel.max_control_points = 6;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        self.panel.validate()?;
        if self.panel.max_control_points != CORRESPONDENCE_COUNT {
            return Err(RegistrationError::InvalidConfig(format!(
                "alignment needs exactly {} control points per panel, configured {}",
                CORRESPONDENCE_COUNT, self.panel.max_control_points
            )));
        }
        Ok(())
    }
}
