//! Simulated collaborators.
//!
//! A synthetic camera, a pose estimator that replays scripted marker tracks
//! (with occlusion windows) and a renderer that only records what it was
//! asked to draw. [`run_scenario`] wires them into a real
//! [`SessionController`] and steps the render loop by hand, so the whole
//! pipeline runs deterministically without a device.

use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use crossbeam_channel::bounded;
use nalgebra::{Translation3, UnitQuaternion, Vector3};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ar_anchor_core::{FrameStamp, MarkerId, MarkerSet, Pose, PoseSample, VideoFrame, Viewport};
use ar_anchor_session::{
    CameraStream, Collaborators, FrameStats, FrameView, InitError, OverlaySpec,
    PermissionError, PoseEstimator, ReleaseError, Renderer, SessionConfig, SessionController, SessionError,
    SessionObserver, SessionState, TeardownReport, VideoSource, WorkerEstimator,
};

/// Outcome of the simulated permission prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPermission {
    #[default]
    Granted,
    Denied,
    Unavailable,
}

/// Camera that produces empty frames on a fixed cadence.
#[derive(Clone, Debug)]
pub struct SimulatedCamera {
    pub permission: CameraPermission,
    /// A new camera frame every `frame_every` display refreshes.
    pub frame_every: u32,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self {
            permission: CameraPermission::Granted,
            frame_every: 1,
        }
    }
}

#[async_trait]
impl VideoSource for SimulatedCamera {
    async fn acquire(&mut self) -> Result<Box<dyn CameraStream>, PermissionError> {
        match self.permission {
            CameraPermission::Granted => Ok(Box::new(SimulatedStream {
                polls: 0,
                frame_every: u64::from(self.frame_every.max(1)),
                open: true,
            })),
            CameraPermission::Denied => Err(PermissionError::Denied),
            CameraPermission::Unavailable => Err(PermissionError::Unavailable),
        }
    }
}

struct SimulatedStream {
    polls: u64,
    frame_every: u64,
    open: bool,
}

impl CameraStream for SimulatedStream {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if !self.open {
            return None;
        }
        let seq = self.polls / self.frame_every;
        self.polls += 1;
        Some(VideoFrame::empty(seq))
    }

    fn release(&mut self) -> Result<(), ReleaseError> {
        if !self.open {
            return Err(ReleaseError::new("camera stream", "already released"));
        }
        self.open = false;
        Ok(())
    }
}

/// Scripted motion of one marker, indexed by camera frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerTrack {
    pub marker: MarkerId,
    /// Camera frames on which the marker is hidden.
    #[serde(default)]
    pub occlusions: Vec<Range<u64>>,
    /// Distance in front of the camera, meters.
    pub distance: f64,
    /// Lateral offset at frame 0, meters.
    pub offset: f64,
    /// Lateral drift per frame, meters.
    pub drift: f64,
    /// Amplitude of the deterministic detector jitter, meters.
    pub jitter: f64,
}

impl MarkerTrack {
    pub fn new(marker: MarkerId) -> Self {
        Self {
            marker,
            occlusions: Vec::new(),
            distance: 0.5,
            offset: 0.0,
            drift: 0.002,
            jitter: 0.001,
        }
    }

    pub fn with_occlusion(mut self, frames: Range<u64>) -> Self {
        self.occlusions.push(frames);
        self
    }

    pub fn visible_at(&self, seq: u64) -> bool {
        !self.occlusions.iter().any(|r| r.contains(&seq))
    }

    pub fn pose_at(&self, seq: u64) -> Pose {
        let t = seq as f64;
        let x = self.offset + self.drift * t + self.jitter * (1.7 * t).sin();
        let y = self.jitter * (2.3 * t).cos();
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.01 * t);
        Pose::from_parts(Translation3::new(x, y, -self.distance), rotation)
    }
}

/// Pose estimator that replays [`MarkerTrack`]s.
#[derive(Clone, Debug, Default)]
pub struct ScriptedEstimator {
    pub tracks: Vec<MarkerTrack>,
    /// Refuse to initialize, as a broken descriptor asset would.
    pub fail_init: bool,
    /// Read the descriptor asset from disk during init.
    pub load_descriptor: bool,
    ready: bool,
}

impl ScriptedEstimator {
    pub fn new(tracks: Vec<MarkerTrack>) -> Self {
        Self {
            tracks,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PoseEstimator for ScriptedEstimator {
    async fn init(&mut self, markers: &MarkerSet) -> Result<(), InitError> {
        if self.fail_init {
            return Err(InitError::new("descriptor rejected"));
        }
        if self.load_descriptor {
            let bytes = markers.read_descriptor().map_err(|e| {
                InitError::new(format!("{}: {e}", markers.descriptor_path().display()))
            })?;
            log::debug!("loaded {} byte marker descriptor", bytes.len());
        }
        self.ready = true;
        Ok(())
    }

    fn detect(&mut self, frame: &VideoFrame) -> Option<Vec<PoseSample>> {
        if !self.ready {
            return None;
        }
        let samples = self
            .tracks
            .iter()
            .filter(|track| track.visible_at(frame.seq))
            .map(|track| {
                PoseSample::new(track.marker, track.pose_at(frame.seq), FrameStamp(frame.seq))
            })
            .collect();
        Some(samples)
    }

    fn release(&mut self) -> Result<(), ReleaseError> {
        self.ready = false;
        Ok(())
    }
}

/// What the recording renderer saw.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderLog {
    pub draws: u64,
    pub resizes: Vec<Viewport>,
    /// Visible nodes per draw.
    pub visible: Vec<usize>,
}

/// Renderer that records draw calls instead of drawing.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<RenderLog>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the log; stays readable after the renderer moved into
    /// a session.
    pub fn log(&self) -> Arc<Mutex<RenderLog>> {
        Arc::clone(&self.log)
    }
}

impl Renderer for RecordingRenderer {
    fn resize(&mut self, viewport: Viewport) {
        self.log.lock().resizes.push(viewport);
    }

    fn draw(&mut self, view: &FrameView<'_>) {
        let mut log = self.log.lock();
        log.draws += 1;
        log.visible.push(view.commands.len());
    }
}

/// One observer notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    State { state: SessionState },
    Found { marker: MarkerId },
    Lost { marker: MarkerId },
}

/// Observer that keeps every notification in order.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<SessionEvent>>,
}

impl EventLog {
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }
}

impl SessionObserver for EventLog {
    fn on_state_change(&self, state: &SessionState) {
        self.events.lock().push(SessionEvent::State {
            state: state.clone(),
        });
    }

    fn on_target_found(&self, marker: MarkerId) {
        self.events.lock().push(SessionEvent::Found { marker });
    }

    fn on_target_lost(&self, marker: MarkerId) {
        self.events.lock().push(SessionEvent::Lost { marker });
    }
}

/// Default config with a plane overlay on every marker, so a run has
/// something to draw.
pub fn demo_config() -> SessionConfig {
    SessionConfig {
        overlay: Some(OverlaySpec::default()),
        ..SessionConfig::default()
    }
}

/// A complete simulated run.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub config: SessionConfig,
    pub camera: SimulatedCamera,
    pub tracks: Vec<MarkerTrack>,
    /// Display refreshes to run once the session is up.
    pub refreshes: u64,
    pub fail_init: bool,
    pub load_descriptor: bool,
    /// Run the estimator on a worker thread. Results then lag the camera
    /// and the run is no longer deterministic.
    pub worker: bool,
    /// Resize the output surface before the given refresh.
    pub resize: Option<(u64, Viewport)>,
}

impl Scenario {
    /// One always-visible track per configured marker target.
    pub fn from_config(config: SessionConfig) -> Self {
        let tracks = config
            .markers
            .targets
            .iter()
            .enumerate()
            .map(|(i, &marker)| MarkerTrack {
                offset: 0.2 * i as f64,
                ..MarkerTrack::new(marker)
            })
            .collect();
        Self {
            config,
            camera: SimulatedCamera::default(),
            tracks,
            refreshes: 120,
            fail_init: false,
            load_descriptor: false,
            worker: false,
            resize: None,
        }
    }

    /// Hide every track on `frames`.
    pub fn occlude(&mut self, frames: Range<u64>) {
        for track in &mut self.tracks {
            track.occlusions.push(frames.clone());
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::from_config(demo_config())
    }
}

/// Everything a simulated run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Whether the session reached `Running`.
    pub started: bool,
    /// State right after `start()` settled; carries the error message when
    /// the session never ran.
    pub start_state: SessionState,
    /// State after unmount.
    pub final_state: SessionState,
    pub refreshes: u64,
    pub stats: FrameStats,
    pub teardown: Option<TeardownReport>,
    pub events: Vec<SessionEvent>,
    pub render: RenderLog,
}

impl ScenarioReport {
    pub fn found_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Found { .. }))
            .count()
    }

    pub fn lost_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Lost { .. }))
            .count()
    }
}

/// Run `scenario` against a real session and tear it down again.
///
/// Permission and init failures are part of the report (the session ends in
/// `Error`); only an invalid config is returned as an error.
pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport, SessionError> {
    let events = Arc::new(EventLog::default());
    let renderer = RecordingRenderer::new();
    let render_log = renderer.log();

    let scripted = ScriptedEstimator {
        tracks: scenario.tracks.clone(),
        fail_init: scenario.fail_init,
        load_descriptor: scenario.load_descriptor,
        ready: false,
    };
    let estimator: Box<dyn PoseEstimator> = if scenario.worker {
        Box::new(WorkerEstimator::new(Box::new(scripted)))
    } else {
        Box::new(scripted)
    };
    let parts = Collaborators::new(
        Box::new(scenario.camera.clone()),
        estimator,
        Box::new(renderer),
    )
    .with_observer(Arc::clone(&events) as Arc<dyn SessionObserver>);

    let (ticks, refresh) = bounded(0);
    let session =
        SessionController::new(scenario.config.clone(), parts)?.with_refresh_signal(refresh);
    let handle = session.handle();

    let started = match futures::executor::block_on(session.start()) {
        Ok(state) => state.is_running(),
        Err(err) => {
            log::warn!("session did not start: {err}");
            false
        }
    };
    let start_state = session.state();

    let mut refreshes = 0;
    if started {
        for i in 0..scenario.refreshes {
            if let Some((at, viewport)) = scenario.resize {
                if at == i {
                    handle.resize(viewport.width, viewport.height);
                }
            }
            if ticks.send(Instant::now()).is_err() {
                log::warn!("render loop went away after {refreshes} refreshes");
                break;
            }
            refreshes += 1;
        }
    }

    let teardown = session.unmount();
    let report = ScenarioReport {
        started,
        start_state,
        final_state: session.state(),
        refreshes,
        stats: handle.stats(),
        teardown,
        events: events.snapshot(),
        render: render_log.lock().clone(),
    };
    Ok(report)
}
