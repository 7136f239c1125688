//! Anchor tracking.
//!
//! Turns the raw per-frame output of a marker pose estimator into stable
//! anchors:
//! - one anchor per registered marker,
//! - translation/rotation smoothing against detector jitter,
//! - found/lost transitions with a frame-count loss timeout.
//!
//! Everything here is a pure function of the current anchor state, the
//! samples of one frame and the frame clock.

mod anchor;
mod manager;
mod params;

pub use anchor::{Anchor, AnchorEvent, AnchorHandle, AnchorState};
pub use manager::AnchorManager;
pub use params::{TrackingParams, TrackingParamsError};

pub use ar_anchor_core::{FrameStamp, MarkerId, Pose, PoseSample};
