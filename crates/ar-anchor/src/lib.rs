//! Marker-anchored augmented reality, end to end.
//!
//! This crate re-exports the building blocks:
//! - core types: marker ids, pose samples, frames and pose blending,
//! - [`tracking`]: the anchor manager (smoothing, found/lost with a loss
//!   timeout),
//! - [`scene`]: content parented to anchors, synced once per frame,
//! - [`session`]: the render loop and the session lifecycle around a
//!   camera, a pose estimator and a renderer,
//!
//! plus [`sim`], simulated collaborators for demos and tests.
//!
//! ```no_run
//! use ar_anchor::sim::{run_scenario, Scenario};
//!
//! let report = run_scenario(&Scenario::default())?;
//! println!("{} frames drawn", report.stats.draws);
//! # Ok::<(), ar_anchor::session::SessionError>(())
//! ```

pub mod sim;

pub use ar_anchor_scene as scene;
pub use ar_anchor_session as session;
pub use ar_anchor_tracking as tracking;

pub use ar_anchor_core::{
    blend_pose, init_with_level, FrameStamp, MarkerId, MarkerSet, Pose, PoseSample, VideoFrame,
    Viewport,
};
pub use ar_anchor_scene::{Light, Material, Mesh, SceneGraph};
pub use ar_anchor_session::{
    Collaborators, SessionConfig, SessionController, SessionError, SessionHandle, SessionState,
    TeardownReport,
};
pub use ar_anchor_tracking::{AnchorEvent, AnchorManager, AnchorState, TrackingParams};

#[cfg(feature = "tracing")]
pub use ar_anchor_core::init_tracing;
