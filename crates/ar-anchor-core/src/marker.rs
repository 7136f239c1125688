use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Pose;

/// Identifier of a registered tracking target.
///
/// This is the index of the target inside the marker descriptor asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u32);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Count of estimator frames; the clock tracking loss is measured in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameStamp(pub u64);

impl FrameStamp {
    pub const ZERO: FrameStamp = FrameStamp(0);

    #[inline]
    pub fn next(self) -> FrameStamp {
        FrameStamp(self.0 + 1)
    }

    /// Number of frames elapsed since `earlier` (zero if `earlier` is later).
    #[inline]
    pub fn frames_since(self, earlier: FrameStamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// One marker detection produced by the pose estimator for a single frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseSample {
    pub marker: MarkerId,
    /// Marker pose relative to the camera.
    pub pose: Pose,
    pub timestamp: FrameStamp,
    /// Estimator confidence in `[0, 1]`.
    pub confidence: f32,
}

impl PoseSample {
    pub fn new(marker: MarkerId, pose: Pose, timestamp: FrameStamp) -> Self {
        Self {
            marker,
            pose,
            timestamp,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Trackable images handed to the estimator at init.
///
/// The descriptor file is pre-built and opaque here: its format belongs to
/// the estimator. `targets` lists the indices inside that file that get an
/// anchor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerSet {
    pub descriptor: PathBuf,
    pub targets: Vec<MarkerId>,
}

impl MarkerSet {
    pub fn new(descriptor: impl Into<PathBuf>, targets: impl IntoIterator<Item = MarkerId>) -> Self {
        Self {
            descriptor: descriptor.into(),
            targets: targets.into_iter().collect(),
        }
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor
    }

    /// Read the raw descriptor bytes.
    pub fn read_descriptor(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.descriptor)
    }
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::new("targets/targets.mind", [MarkerId(0)])
    }
}
