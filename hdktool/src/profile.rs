//! User profile persistence (`osvr_user_settings.json`).
//!
//! A flat record of the user's vision-correction and anthropometric
//! settings, loaded at startup and written back on save. The document
//! layout and field names follow the file format consumed by the OSVR
//! runtime, so existing settings files keep working.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which eye a per-eye record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeSide {
    /// Left eye (oculus sinister).
    Left,
    /// Right eye (oculus dexter).
    Right,
}

/// Distance-vision correction for one eye.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistanceCorrection {
    /// Spherical correction in diopters.
    pub spherical: f64,
    /// Cylindrical correction in diopters.
    pub cylindrical: f64,
    /// Cylinder axis in degrees.
    pub axis: f64,
}

/// Near-vision addition for one eye.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NearAddition {
    /// Added spherical power in diopters.
    pub spherical: f64,
}

/// Full correction record for one eye.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Correction {
    /// Distance-vision correction.
    pub distance: DistanceCorrection,
    /// Near-vision addition.
    pub add_near: NearAddition,
}

/// Per-eye settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EyeSettings {
    /// Whether this is the dominant eye.
    pub dominant: bool,
    /// Half interpupillary distance in millimeters.
    pub pupil_distance: f64,
    /// Vision correction.
    pub correction: Correction,
}

impl Default for EyeSettings {
    fn default() -> Self {
        Self {
            dominant: false,
            pupil_distance: 32.5,
            correction: Correction::default(),
        }
    }
}

/// Anthropometric measurements in centimeters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Anthropometric {
    /// Standing eye height.
    pub standing_eye_height: f64,
    /// Seated eye height.
    pub seated_eye_height: f64,
    /// Eye-to-neck distance.
    pub eye_to_neck: f64,
}

impl Default for Anthropometric {
    fn default() -> Self {
        Self {
            standing_eye_height: 160.0,
            seated_eye_height: 106.0,
            eye_to_neck: 20.32,
        }
    }
}

/// Both eyes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Eyes {
    /// Left eye.
    pub left: EyeSettings,
    /// Right eye.
    pub right: EyeSettings,
}

impl Default for Eyes {
    fn default() -> Self {
        Self {
            left: EyeSettings {
                dominant: true,
                ..EyeSettings::default()
            },
            right: EyeSettings::default(),
        }
    }
}

/// The `personalSettings` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalSettings {
    /// Gender, as recorded by the settings form.
    pub gender: String,
    /// Anthropometric measurements.
    pub anthropometric: Anthropometric,
    /// Per-eye settings.
    pub eyes: Eyes,
}

impl Default for PersonalSettings {
    fn default() -> Self {
        Self {
            gender: "Male".to_string(),
            anthropometric: Anthropometric::default(),
            eyes: Eyes::default(),
        }
    }
}

/// The whole user settings document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    /// Personal settings record.
    pub personal_settings: PersonalSettings,
}

impl UserProfile {
    /// Total interpupillary distance in millimeters.
    pub fn ipd(&self) -> f64 {
        self.personal_settings.eyes.left.pupil_distance
            + self.personal_settings.eyes.right.pupil_distance
    }

    /// Set the total interpupillary distance, split evenly between the eyes.
    pub fn set_ipd(&mut self, ipd: f64) {
        self.personal_settings.eyes.left.pupil_distance = ipd / 2.0;
        self.personal_settings.eyes.right.pupil_distance = ipd / 2.0;
    }

    /// Get one eye's settings.
    pub fn eye(&self, side: EyeSide) -> &EyeSettings {
        match side {
            EyeSide::Left => &self.personal_settings.eyes.left,
            EyeSide::Right => &self.personal_settings.eyes.right,
        }
    }

    /// Get one eye's settings mutably.
    pub fn eye_mut(&mut self, side: EyeSide) -> &mut EyeSettings {
        match side {
            EyeSide::Left => &mut self.personal_settings.eyes.left,
            EyeSide::Right => &mut self.personal_settings.eyes.right,
        }
    }

    /// Mark one eye as dominant (and the other as not).
    pub fn set_dominant(&mut self, side: EyeSide) {
        self.personal_settings.eyes.left.dominant = side == EyeSide::Left;
        self.personal_settings.eyes.right.dominant = side == EyeSide::Right;
    }

    /// Load the profile from a file.
    ///
    /// A missing or unparsable file is not an error: a fresh default
    /// document is written back in its place and returned.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(profile) => {
                    debug!("Loaded user profile from {}", path.display());
                    profile
                },
                Err(e) => {
                    warn!(
                        "Couldn't parse {}; rewriting defaults: {e}",
                        path.display()
                    );
                    Self::write_defaults(path)
                },
            },
            Err(e) => {
                warn!("Couldn't open {}; creating file: {e}", path.display());
                Self::write_defaults(path)
            },
        }
    }

    fn write_defaults(path: &Path) -> Self {
        let profile = Self::default();
        if let Err(e) = profile.save(path) {
            warn!("Couldn't write default profile to {}: {e}", path.display());
        }
        profile
    }

    /// Save the profile as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("serializing profile: {e}")))?;
        fs::write(path, content)?;
        debug!("Saved user profile to {}", path.display());
        Ok(())
    }
}
