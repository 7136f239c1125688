//! Contracts of the external pieces a session drives: camera, pose
//! estimator, renderer and the UI observer.

use async_trait::async_trait;

use ar_anchor_core::{MarkerId, MarkerSet, Pose, PoseSample, VideoFrame, Viewport};
use ar_anchor_scene::{DrawCommand, Light, Material};

use crate::error::{InitError, PermissionError, ReleaseError};
use crate::state::SessionState;

/// Permission-gated camera.
#[async_trait]
pub trait VideoSource: Send {
    /// Ask for camera access and open a stream.
    async fn acquire(&mut self) -> Result<Box<dyn CameraStream>, PermissionError>;
}

/// An open camera stream.
pub trait CameraStream: Send {
    /// Most recent frame, without waiting. Returns the same frame again (same
    /// `seq`) when the camera has not produced a new one yet.
    fn latest_frame(&mut self) -> Option<VideoFrame>;

    /// Stop every track of the stream.
    fn release(&mut self) -> Result<(), ReleaseError>;
}

/// Marker pose estimator.
#[async_trait]
pub trait PoseEstimator: Send {
    /// Load the marker descriptor asset and prepare for detection.
    async fn init(&mut self, markers: &MarkerSet) -> Result<(), InitError>;

    /// Detect markers in `frame`.
    ///
    /// `None` means no result is ready yet (the estimator works
    /// asynchronously); the caller keeps its previous anchor state. An empty
    /// list means nothing was detected.
    fn detect(&mut self, frame: &VideoFrame) -> Option<Vec<PoseSample>>;

    fn release(&mut self) -> Result<(), ReleaseError>;
}

/// Everything the renderer needs for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    /// Render-loop tick this view belongs to.
    pub tick: u64,
    pub viewport: Viewport,
    /// Camera transform; content poses are camera-relative, so this is the
    /// identity unless the renderer adds its own offset.
    pub camera: Pose,
    pub lights: &'a [Light],
    pub materials: &'a [Material],
    pub commands: &'a [DrawCommand],
}

/// Draws the scene onto the output surface.
pub trait Renderer: Send {
    fn resize(&mut self, viewport: Viewport);
    fn draw(&mut self, view: &FrameView<'_>);
}

/// UI-side hooks.
///
/// State changes are reported from whichever thread drives the lifecycle;
/// target notifications come from the render thread. Callbacks may read the
/// session state but must not call back into lifecycle methods (`start`,
/// `stop`, `unmount`).
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, _state: &SessionState) {}
    fn on_target_found(&self, _marker: MarkerId) {}
    fn on_target_lost(&self, _marker: MarkerId) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
