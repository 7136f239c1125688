//! Session control for marker-anchored AR viewers.
//!
//! A [`SessionController`] owns one mounted viewer: it asks for camera
//! access, initializes the pose estimator, runs the render loop
//! (frame -> estimator -> anchors -> scene -> draw) and guarantees that the
//! camera and the loop are released again however the session ends.
//!
//! The camera, the estimator and the renderer are external collaborators
//! behind the traits in this crate.
//!
//! ```no_run
//! # use ar_anchor_session::*;
//! # fn parts() -> Collaborators { unimplemented!() }
//! # async fn run() -> Result<(), SessionError> {
//! let session = SessionController::new(SessionConfig::default(), parts())?;
//! session.start().await?;
//! // ... later, when the view goes away:
//! session.unmount();
//! # Ok(())
//! # }
//! ```

mod collaborators;
mod config;
mod error;
mod pipeline;
mod scheduler;
mod session;
mod state;
mod worker;

pub use collaborators::{
    CameraStream, FrameView, NoopObserver, PoseEstimator, Renderer, SessionObserver, VideoSource,
};
pub use config::{ConfigError, ConfigIoError, OverlaySpec, SchedulerParams, SessionConfig};
pub use error::{InitError, PermissionError, ReleaseError, SchedulerError, SessionError};
pub use pipeline::{FrameStats, ResizeSender};
pub use scheduler::{FrameTick, RenderLoop};
pub use session::{Collaborators, SessionController, SessionHandle};
pub use state::{SessionState, TeardownReport};
pub use worker::WorkerEstimator;

pub use ar_anchor_core::{MarkerId, MarkerSet, Pose, PoseSample, VideoFrame, Viewport};
