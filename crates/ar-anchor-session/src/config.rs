//! JSON session configuration.

use std::{fs, path::Path};

use ar_anchor_core::{MarkerSet, Pose, Viewport};
use ar_anchor_scene::{Light, Material, Mesh};
use ar_anchor_tracking::{TrackingParams, TrackingParamsError};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Tracking(#[from] TrackingParamsError),
    #[error("refresh rate must be positive, got {0} Hz")]
    RefreshRate(f64),
    #[error("marker set has no targets")]
    NoTargets,
    #[error("viewport must be non-empty, got {width}x{height}")]
    Viewport { width: u32, height: u32 },
}

fn default_refresh_hz() -> f64 {
    60.0
}

fn default_skip_repeated_frames() -> bool {
    true
}

/// Render-loop pacing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParams {
    /// Display refresh rate the loop ticks at.
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: f64,
    /// Skip the estimator when the camera has not produced a new frame since
    /// the last tick.
    #[serde(default = "default_skip_repeated_frames")]
    pub skip_repeated_frames: bool,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
            skip_repeated_frames: default_skip_repeated_frames(),
        }
    }
}

/// Content attached to every marker target when the session is built from a
/// config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlaySpec {
    #[serde(default)]
    pub mesh: Mesh,
    #[serde(default)]
    pub material: Material,
    /// Offset from the marker origin.
    #[serde(default = "Pose::identity")]
    pub offset: Pose,
}

impl Default for OverlaySpec {
    fn default() -> Self {
        Self {
            mesh: Mesh::default(),
            material: Material::default(),
            offset: Pose::identity(),
        }
    }
}

/// Full configuration of one viewer session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub markers: MarkerSet,
    #[serde(default)]
    pub tracking: TrackingParams,
    #[serde(default)]
    pub scheduler: SchedulerParams,
    /// Initial output surface size; later changes come through resize events.
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub overlay: Option<OverlaySpec>,
    #[serde(default = "default_lights")]
    pub lights: Vec<Light>,
}

fn default_lights() -> Vec<Light> {
    vec![Light::default()]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            markers: MarkerSet::default(),
            tracking: TrackingParams::default(),
            scheduler: SchedulerParams::default(),
            viewport: Viewport::default(),
            overlay: None,
            lights: default_lights(),
        }
    }
}

impl SessionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracking.validate()?;
        let hz = self.scheduler.refresh_hz;
        if !(hz.is_finite() && hz > 0.0) {
            return Err(ConfigError::RefreshRate(hz));
        }
        if self.markers.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Viewport {
                width: self.viewport.width,
                height: self.viewport.height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_anchor_core::MarkerId;

    #[test]
    fn minimal_json_fills_defaults() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{ "markers": { "descriptor": "targets/targets.mind", "targets": [0] } }"#,
        )
        .expect("parse");
        assert_eq!(cfg.tracking, TrackingParams::default());
        assert_eq!(cfg.scheduler, SchedulerParams::default());
        assert_eq!(cfg.lights, vec![Light::default()]);
        assert!(cfg.overlay.is_none());
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn write_then_load_preserves_overlay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        let cfg = SessionConfig {
            markers: MarkerSet::new("poster.mind", [MarkerId(0), MarkerId(1)]),
            overlay: Some(OverlaySpec {
                material: Material::textured("ar/overlay.svg"),
                ..OverlaySpec::default()
            }),
            ..SessionConfig::default()
        };
        cfg.write_json(&path).expect("write");
        let back = SessionConfig::load_json(&path).expect("load");
        assert_eq!(back, cfg);
    }

    #[test]
    fn validate_reports_bad_sections() {
        let mut cfg = SessionConfig::default();
        cfg.scheduler.refresh_hz = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::RefreshRate(0.0)));

        let mut cfg = SessionConfig::default();
        cfg.markers.targets.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::NoTargets));

        let mut cfg = SessionConfig::default();
        cfg.tracking.loss_timeout_frames = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Tracking(TrackingParamsError::LossTimeout))
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SessionConfig::load_json("/definitely/not/here.json").expect_err("missing");
        assert!(matches!(err, ConfigIoError::Io(_)));
    }
}
