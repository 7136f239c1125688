//! Session lifecycle.
//!
//! A session gates camera permission and estimator initialization before the
//! render loop may run, and tears everything down again on every exit path:
//! explicit stop, unmount, a failed init, or an abandoned `start()` future.
//!
//! Lock order is `lifecycle` -> `status` -> `pipeline`. Lifecycle callbacks
//! hold `lifecycle`, the render thread holds `pipeline`; no lock is held
//! across an `.await`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use ar_anchor_core::Viewport;
use ar_anchor_scene::SceneGraph;
use ar_anchor_tracking::AnchorManager;
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::collaborators::{
    CameraStream, NoopObserver, PoseEstimator, Renderer, SessionObserver, VideoSource,
};
use crate::config::SessionConfig;
use crate::error::{ReleaseError, SessionError};
use crate::pipeline::{FramePipeline, FrameStats, ResizeSender};
use crate::scheduler::RenderLoop;
use crate::state::{SessionState, TeardownReport};

/// The external pieces one session drives.
pub struct Collaborators {
    pub video: Box<dyn VideoSource>,
    pub estimator: Box<dyn PoseEstimator>,
    pub renderer: Box<dyn Renderer>,
    pub observer: Arc<dyn SessionObserver>,
}

impl Collaborators {
    pub fn new(
        video: Box<dyn VideoSource>,
        estimator: Box<dyn PoseEstimator>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            video,
            estimator,
            renderer,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }
}

struct Status {
    state: SessionState,
    /// `stop()` arrived while initializing; applied when init settles.
    pending_stop: bool,
}

struct Lifecycle {
    /// `None` only while an initialization attempt holds the camera.
    video: Option<Box<dyn VideoSource>>,
    render_loop: RenderLoop,
}

struct Shared {
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    lifecycle: Mutex<Lifecycle>,
    status: Mutex<Status>,
    pipeline: Arc<Mutex<FramePipeline>>,
    resize: ResizeSender,
}

impl Shared {
    fn state(&self) -> SessionState {
        self.status.lock().state.clone()
    }

    fn stop_pending(&self) -> bool {
        self.status.lock().pending_stop
    }

    /// Callers hold the `lifecycle` lock, so transitions are totally ordered.
    fn set_state(&self, next: SessionState) {
        {
            let mut status = self.status.lock();
            status.pending_stop = false;
            if status.state == next {
                return;
            }
            log::info!("session {} -> {}", status.state, next);
            status.state = next.clone();
        }
        self.observer.on_state_change(&next);
    }

    fn prepare(
        self: &Arc<Self>,
        op: &'static str,
        allowed: fn(&SessionState) -> bool,
    ) -> Result<InitAttempt, SessionError> {
        let mut lifecycle = self.lifecycle.lock();
        let state = self.state();
        if !allowed(&state) {
            return Err(SessionError::InvalidTransition { op, state });
        }
        let video = lifecycle.video.take();
        let estimator = self.pipeline.lock().estimator.take();
        self.set_state(SessionState::Initializing);
        Ok(InitAttempt {
            shared: Arc::clone(self),
            video,
            estimator,
            stream: None,
            estimator_active: false,
            settled: false,
        })
    }

    fn stop(&self) -> Option<TeardownReport> {
        let mut lifecycle = self.lifecycle.lock();
        let state = {
            let mut status = self.status.lock();
            if status.state == SessionState::Initializing {
                if !status.pending_stop {
                    log::info!("stop requested during initialization, deferred until it settles");
                }
                status.pending_stop = true;
                return None;
            }
            status.state.clone()
        };
        if !state.is_running() {
            log::debug!("stop ignored, session is {state}");
            return None;
        }
        let report = self.teardown(&mut lifecycle);
        self.set_state(SessionState::Stopped);
        Some(report)
    }

    /// Release everything, in order: camera stream, render loop, estimator,
    /// scene content. A failing step never skips the ones after it.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    fn teardown(&self, lifecycle: &mut Lifecycle) -> TeardownReport {
        let mut report = TeardownReport::default();
        self.release_stream(&mut report);
        report.loop_stopped = lifecycle.render_loop.stop();
        self.release_estimator(&mut report);
        {
            let mut pipeline = self.pipeline.lock();
            report.nodes_released = pipeline.scene.clear();
            pipeline.anchors.clear();
        }

        if report.is_clean() {
            log::debug!("teardown complete: {report:?}");
        } else {
            log::warn!(
                "teardown finished with {} release failure(s)",
                report.failures.len()
            );
        }
        report
    }

    fn release_stream(&self, report: &mut TeardownReport) {
        // Taken under the pipeline lock, released outside it.
        let stream = self.pipeline.lock().stream.take();
        let Some(mut stream) = stream else {
            return;
        };
        match stream.release() {
            Ok(()) => report.stream_released = true,
            Err(err) => record_failure(report, &err),
        }
    }

    fn release_estimator(&self, report: &mut TeardownReport) {
        let mut pipeline = self.pipeline.lock();
        if !pipeline.estimator_active {
            return;
        }
        pipeline.estimator_active = false;
        let Some(estimator) = pipeline.estimator.as_mut() else {
            return;
        };
        match estimator.release() {
            Ok(()) => report.estimator_released = true,
            Err(err) => record_failure(report, &err),
        }
    }
}

fn record_failure(report: &mut TeardownReport, err: &ReleaseError) {
    log::warn!("{err}");
    report.failures.push(err.to_string());
}

/// One in-flight `start()`/`retry()`.
///
/// Owns the camera and estimator while they are awaited. If the attempt is
/// dropped before it settles (the caller abandoned the future), everything it
/// acquired is released and the session ends `Stopped`.
struct InitAttempt {
    shared: Arc<Shared>,
    video: Option<Box<dyn VideoSource>>,
    estimator: Option<Box<dyn PoseEstimator>>,
    stream: Option<Box<dyn CameraStream>>,
    estimator_active: bool,
    settled: bool,
}

impl InitAttempt {
    async fn run(&mut self) -> Result<(), SessionError> {
        let Some(video) = self.video.as_mut() else {
            return Err(SessionError::Unavailable("camera"));
        };
        let Some(estimator) = self.estimator.as_mut() else {
            return Err(SessionError::Unavailable("pose estimator"));
        };

        log::debug!("requesting camera access");
        self.stream = Some(video.acquire().await?);
        if self.shared.stop_pending() {
            log::debug!("stopped while acquiring the camera, skipping estimator init");
            return Ok(());
        }

        let markers = &self.shared.config.markers;
        log::debug!(
            "initializing pose estimator: {} ({} targets)",
            markers.descriptor_path().display(),
            markers.targets.len()
        );
        estimator.init(markers).await?;
        self.estimator_active = true;
        Ok(())
    }

    /// Move every acquired resource back into the session.
    fn hand_back(&mut self, lifecycle: &mut Lifecycle) {
        self.settled = true;
        if let Some(video) = self.video.take() {
            lifecycle.video = Some(video);
        }
        let mut pipeline = self.shared.pipeline.lock();
        pipeline.stream = self.stream.take();
        if let Some(estimator) = self.estimator.take() {
            pipeline.estimator = Some(estimator);
        }
        pipeline.estimator_active = self.estimator_active;
    }

    fn settle(mut self, outcome: Result<(), SessionError>) -> Result<SessionState, SessionError> {
        let shared = Arc::clone(&self.shared);
        let mut lifecycle = shared.lifecycle.lock();
        self.hand_back(&mut lifecycle);

        if shared.stop_pending() {
            log::info!("applying stop requested during initialization");
            shared.teardown(&mut lifecycle);
            shared.set_state(SessionState::Stopped);
            return Ok(SessionState::Stopped);
        }

        if let Err(err) = outcome {
            log::warn!("session initialization failed: {err}");
            let mut report = TeardownReport::default();
            shared.release_stream(&mut report);
            shared.set_state(SessionState::Error(err.user_message()));
            return Err(err);
        }

        shared.pipeline.lock().begin_run();
        // Running before the first tick: no frame is ever drawn earlier.
        shared.set_state(SessionState::Running);
        let pipeline = Arc::clone(&shared.pipeline);
        if let Err(err) = lifecycle
            .render_loop
            .start(move |tick| pipeline.lock().run_frame(tick))
        {
            let err = SessionError::from(err);
            log::error!("{err}");
            let mut report = TeardownReport::default();
            shared.release_stream(&mut report);
            shared.release_estimator(&mut report);
            shared.set_state(SessionState::Error(err.user_message()));
            return Err(err);
        }
        Ok(SessionState::Running)
    }
}

impl Drop for InitAttempt {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        log::warn!("session initialization abandoned, releasing what it acquired");
        let shared = Arc::clone(&self.shared);
        let mut lifecycle = shared.lifecycle.lock();
        self.hand_back(&mut lifecycle);
        shared.teardown(&mut lifecycle);
        shared.set_state(SessionState::Stopped);
    }
}

/// Owner of one mounted viewer.
///
/// Dropping the controller unmounts the session.
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    /// Build a session from a validated config.
    ///
    /// Registers one anchor per configured marker target and, when the config
    /// carries an overlay, attaches it to every anchor.
    pub fn new(config: SessionConfig, parts: Collaborators) -> Result<Self, SessionError> {
        config.validate()?;

        let mut anchors = AnchorManager::new(config.tracking.clone());
        let mut scene = SceneGraph::new();
        for light in &config.lights {
            scene.add_light(light.clone());
        }
        let handles: Vec<_> = config
            .markers
            .targets
            .iter()
            .map(|&marker| anchors.register_anchor(marker))
            .collect();
        if let Some(overlay) = &config.overlay {
            let material = scene.add_material(overlay.material.clone());
            for &anchor in &handles {
                scene.attach_with_offset(anchor, overlay.mesh, material, overlay.offset);
            }
        }

        let (resize_tx, resize_rx) = unbounded();
        let pipeline = FramePipeline::new(
            parts.estimator,
            anchors,
            scene,
            parts.renderer,
            Arc::clone(&parts.observer),
            resize_rx,
            config.viewport,
            config.scheduler.skip_repeated_frames,
        );
        let render_loop = RenderLoop::with_refresh_rate(config.scheduler.refresh_hz);
        log::debug!(
            "session created: {} targets, {} Hz",
            config.markers.targets.len(),
            config.scheduler.refresh_hz
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                observer: parts.observer,
                lifecycle: Mutex::new(Lifecycle {
                    video: Some(parts.video),
                    render_loop,
                }),
                status: Mutex::new(Status {
                    state: SessionState::Idle,
                    pending_stop: false,
                }),
                pipeline: Arc::new(Mutex::new(pipeline)),
                resize: ResizeSender::new(resize_tx),
            }),
        })
    }

    /// Drive the render loop from an external refresh signal instead of the
    /// built-in timer. Ignored while the loop is running.
    pub fn with_refresh_signal(self, refresh: Receiver<Instant>) -> Self {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.render_loop.is_running() {
                log::warn!("refresh signal not replaced: render loop is running");
            } else {
                lifecycle.render_loop = RenderLoop::new(refresh);
            }
        }
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Request the camera, initialize the estimator and start rendering.
    ///
    /// Only valid from `Idle`. Permission and init failures leave the session
    /// in `Error` with a user-facing message and are also returned. A stop
    /// requested meanwhile wins: the session ends `Stopped`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn start(&self) -> Result<SessionState, SessionError> {
        self.begin("start", |state| matches!(state, SessionState::Idle))
            .await
    }

    /// Same sequence as `start`, from `Error`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn retry(&self) -> Result<SessionState, SessionError> {
        self.begin("retry", |state| matches!(state, SessionState::Error(_)))
            .await
    }

    async fn begin(
        &self,
        op: &'static str,
        allowed: fn(&SessionState) -> bool,
    ) -> Result<SessionState, SessionError> {
        let mut attempt = self.shared.prepare(op, allowed)?;
        let outcome = attempt.run().await;
        attempt.settle(outcome)
    }

    /// See [`SessionHandle::stop`].
    pub fn stop(&self) -> Option<TeardownReport> {
        self.shared.stop()
    }

    /// Stop (if running) and release everything the session still holds.
    ///
    /// Terminal: the session ends `Stopped`. While initializing, the stop is
    /// deferred to the in-flight `start()`.
    pub fn unmount(&self) -> Option<TeardownReport> {
        if let Some(report) = self.shared.stop() {
            return Some(report);
        }
        let mut lifecycle = self.shared.lifecycle.lock();
        match self.shared.state() {
            SessionState::Idle | SessionState::Error(_) => {
                let report = self.shared.teardown(&mut lifecycle);
                self.shared.set_state(SessionState::Stopped);
                Some(report)
            }
            _ => None,
        }
    }

    /// Register extra anchors or attach content. Changes are picked up by the
    /// next tick.
    pub fn edit_content<R>(&self, f: impl FnOnce(&mut AnchorManager, &mut SceneGraph) -> R) -> R {
        let mut pipeline = self.shared.pipeline.lock();
        let FramePipeline { anchors, scene, .. } = &mut *pipeline;
        f(anchors, scene)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Cheap, cloneable view of a session for the UI layer.
///
/// None of these methods may be called from renderer or observer callbacks
/// running on the render thread.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().is_running()
    }

    /// Stop a running session.
    ///
    /// Returns the teardown report when this call tore the session down.
    /// While initializing, the stop is queued and `None` is returned; in any
    /// other state this is a no-op. Idempotent.
    pub fn stop(&self) -> Option<TeardownReport> {
        self.shared.stop()
    }

    pub fn resizer(&self) -> ResizeSender {
        self.shared.resize.clone()
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.shared.resize.resize(width, height);
    }

    pub fn stats(&self) -> FrameStats {
        self.shared.pipeline.lock().stats
    }

    pub fn viewport(&self) -> Viewport {
        self.shared.pipeline.lock().viewport()
    }

    /// Read the anchors and the scene between ticks.
    pub fn inspect<R>(&self, f: impl FnOnce(&AnchorManager, &SceneGraph) -> R) -> R {
        let pipeline = self.shared.pipeline.lock();
        f(&pipeline.anchors, &pipeline.scene)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state())
            .finish()
    }
}
