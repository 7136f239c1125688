use serde::{Deserialize, Serialize};

/// Errors returned by [`TrackingParams::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrackingParamsError {
    #[error("smoothing factor must be in (0, 1], got {0}")]
    Smoothing(f64),
    #[error("loss timeout must be at least one frame")]
    LossTimeout,
    #[error("minimum confidence must be in [0, 1], got {0}")]
    MinConfidence(f32),
}

/// Anchor smoothing and loss policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParams {
    /// Weight of a new sample in the pose filter.
    ///
    /// `1.0` disables smoothing; smaller values suppress more jitter at the
    /// price of lag.
    pub smoothing: f64,
    /// Consecutive estimator frames without a sample after which a found
    /// anchor is declared lost.
    ///
    /// A gap of `loss_timeout_frames - 1` frames is tolerated without a
    /// `Lost` event.
    pub loss_timeout_frames: u32,
    /// Samples below this confidence are treated as missing.
    pub min_confidence: f32,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            smoothing: 0.5,
            loss_timeout_frames: 3,
            min_confidence: 0.0,
        }
    }
}

impl TrackingParams {
    pub fn validate(&self) -> Result<(), TrackingParamsError> {
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(TrackingParamsError::Smoothing(self.smoothing));
        }
        if self.loss_timeout_frames == 0 {
            return Err(TrackingParamsError::LossTimeout);
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(TrackingParamsError::MinConfidence(self.min_confidence));
        }
        Ok(())
    }
}
