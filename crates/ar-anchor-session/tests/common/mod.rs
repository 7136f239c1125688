#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ar_anchor_session::{
    CameraStream, Collaborators, FrameView, InitError, MarkerId, MarkerSet, OverlaySpec,
    PermissionError, Pose, PoseEstimator, PoseSample, ReleaseError, Renderer, SessionConfig,
    SessionController, SessionError, SessionHandle, SessionObserver, SessionState, VideoFrame,
    VideoSource, Viewport, WorkerEstimator,
};
use ar_anchor_tracking::FrameStamp;
use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender};
use nalgebra::{Translation3, UnitQuaternion};
use parking_lot::Mutex;

/// One `Renderer::draw` call.
#[derive(Clone, Debug)]
pub struct DrawRecord {
    pub tick: u64,
    /// Session state as last reported to the observer.
    pub state: SessionState,
    pub commands: usize,
    /// World transform of every drawn node, in draw-list order.
    pub worlds: Vec<Pose>,
}

/// What the camera does on the next `acquire`.
#[derive(Clone, Copy, Debug)]
pub enum Acquire {
    Grant,
    Deny,
    NoCamera,
}

/// Shared record of every side effect the mocks see.
#[derive(Default)]
pub struct Probe {
    pub acquires: AtomicUsize,
    pub stream_releases: AtomicUsize,
    pub inits: AtomicUsize,
    pub detects: AtomicUsize,
    pub estimator_releases: AtomicUsize,
    pub draws: Mutex<Vec<DrawRecord>>,
    pub resizes: Mutex<Vec<Viewport>>,
    pub states: Mutex<Vec<SessionState>>,
    pub found: Mutex<Vec<MarkerId>>,
    pub lost: Mutex<Vec<MarkerId>>,
    /// Stopped through this handle from inside `acquire`.
    pub stop_during_acquire: Mutex<Option<SessionHandle>>,
    /// Stopped through this handle from inside estimator `init`.
    pub stop_during_init: Mutex<Option<SessionHandle>>,
}

impl Probe {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn current_state(&self) -> SessionState {
        self.states.lock().last().cloned().unwrap_or_default()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.lock().len()
    }
}

pub struct MockVideo {
    pub probe: Arc<Probe>,
    pub script: VecDeque<Acquire>,
    pub frozen: bool,
    pub fail_release: bool,
}

#[async_trait]
impl VideoSource for MockVideo {
    async fn acquire(&mut self) -> Result<Box<dyn CameraStream>, PermissionError> {
        self.probe.acquires.fetch_add(1, Ordering::SeqCst);
        let stop_with = self.probe.stop_during_acquire.lock().take();
        if let Some(handle) = stop_with {
            handle.stop();
        }
        match self.script.pop_front().unwrap_or(Acquire::Grant) {
            Acquire::Deny => Err(PermissionError::Denied),
            Acquire::NoCamera => Err(PermissionError::Unavailable),
            Acquire::Grant => Ok(Box::new(MockStream {
                probe: Arc::clone(&self.probe),
                next_seq: 0,
                frozen: self.frozen,
                fail_release: self.fail_release,
            })),
        }
    }
}

pub struct MockStream {
    probe: Arc<Probe>,
    next_seq: u64,
    frozen: bool,
    fail_release: bool,
}

impl CameraStream for MockStream {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        let frame = VideoFrame::empty(self.next_seq);
        if !self.frozen {
            self.next_seq += 1;
        }
        Some(frame)
    }

    fn release(&mut self) -> Result<(), ReleaseError> {
        self.probe.stream_releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(ReleaseError::new("camera stream", "track refused to stop"));
        }
        Ok(())
    }
}

/// Reports marker 0 on the frames `visible` accepts.
pub struct ScriptedEstimator {
    pub probe: Arc<Probe>,
    pub fail_init: bool,
    pub hang_init: bool,
    pub fail_release: bool,
    pub visible: fn(u64) -> bool,
}

pub fn marker_pose(seq: u64) -> Pose {
    Pose::from_parts(
        Translation3::new(0.01 * seq as f64, 0.0, -1.0),
        UnitQuaternion::identity(),
    )
}

#[async_trait]
impl PoseEstimator for ScriptedEstimator {
    async fn init(&mut self, markers: &MarkerSet) -> Result<(), InitError> {
        self.probe.inits.fetch_add(1, Ordering::SeqCst);
        let stop_with = self.probe.stop_during_init.lock().take();
        if let Some(handle) = stop_with {
            handle.stop();
        }
        if self.hang_init {
            futures::future::pending::<()>().await;
        }
        if self.fail_init {
            return Err(InitError::new(format!(
                "cannot load {}",
                markers.descriptor_path().display()
            )));
        }
        Ok(())
    }

    fn detect(&mut self, frame: &VideoFrame) -> Option<Vec<PoseSample>> {
        self.probe.detects.fetch_add(1, Ordering::SeqCst);
        let samples = if (self.visible)(frame.seq) {
            vec![PoseSample::new(
                MarkerId(0),
                marker_pose(frame.seq),
                FrameStamp(frame.seq),
            )]
        } else {
            Vec::new()
        };
        Some(samples)
    }

    fn release(&mut self) -> Result<(), ReleaseError> {
        self.probe.estimator_releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(ReleaseError::new("pose estimator", "tracker worker did not exit"));
        }
        Ok(())
    }
}

pub struct RecordingRenderer {
    probe: Arc<Probe>,
}

impl Renderer for RecordingRenderer {
    fn resize(&mut self, viewport: Viewport) {
        self.probe.resizes.lock().push(viewport);
    }

    fn draw(&mut self, view: &FrameView<'_>) {
        let record = DrawRecord {
            tick: view.tick,
            state: self.probe.current_state(),
            commands: view.commands.len(),
            worlds: view.commands.iter().map(|c| c.world).collect(),
        };
        self.probe.draws.lock().push(record);
    }
}

pub struct RecordingObserver {
    probe: Arc<Probe>,
}

impl SessionObserver for RecordingObserver {
    fn on_state_change(&self, state: &SessionState) {
        self.probe.states.lock().push(state.clone());
    }

    fn on_target_found(&self, marker: MarkerId) {
        self.probe.found.lock().push(marker);
    }

    fn on_target_lost(&self, marker: MarkerId) {
        self.probe.lost.lock().push(marker);
    }
}

/// Knobs for one test session.
pub struct RigOptions {
    pub acquire: Vec<Acquire>,
    pub frozen_camera: bool,
    pub fail_stream_release: bool,
    pub fail_init: bool,
    pub hang_init: bool,
    pub fail_estimator_release: bool,
    pub visible: fn(u64) -> bool,
    pub worker: bool,
    pub config: SessionConfig,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            acquire: Vec::new(),
            frozen_camera: false,
            fail_stream_release: false,
            fail_init: false,
            hang_init: false,
            fail_estimator_release: false,
            visible: |_| true,
            worker: false,
            config: SessionConfig {
                overlay: Some(OverlaySpec::default()),
                ..SessionConfig::default()
            },
        }
    }
}

/// A session stepped by hand: each tick sent is one display refresh.
pub struct Rig {
    pub probe: Arc<Probe>,
    pub session: SessionController,
    pub ticks: Sender<Instant>,
}

impl Rig {
    pub fn new(options: RigOptions) -> Self {
        Self::try_new(options).expect("valid config")
    }

    pub fn try_new(options: RigOptions) -> Result<Self, SessionError> {
        let probe = Arc::new(Probe::default());
        let video = MockVideo {
            probe: Arc::clone(&probe),
            script: options.acquire.into(),
            frozen: options.frozen_camera,
            fail_release: options.fail_stream_release,
        };
        let scripted = ScriptedEstimator {
            probe: Arc::clone(&probe),
            fail_init: options.fail_init,
            hang_init: options.hang_init,
            fail_release: options.fail_estimator_release,
            visible: options.visible,
        };
        let estimator: Box<dyn PoseEstimator> = if options.worker {
            Box::new(WorkerEstimator::new(Box::new(scripted)))
        } else {
            Box::new(scripted)
        };
        let renderer = RecordingRenderer {
            probe: Arc::clone(&probe),
        };
        let observer = Arc::new(RecordingObserver {
            probe: Arc::clone(&probe),
        });

        let parts = Collaborators::new(Box::new(video), estimator, Box::new(renderer))
            .with_observer(observer);
        let (ticks, refresh) = bounded(0);
        let session =
            SessionController::new(options.config, parts)?.with_refresh_signal(refresh);
        Ok(Self {
            probe,
            session,
            ticks,
        })
    }

    pub fn start(&self) -> SessionState {
        let _ = futures::executor::block_on(self.session.start());
        self.session.state()
    }

    /// Send `n` refreshes. Each send returns once the loop has taken the
    /// tick, so every frame before the last one has finished.
    pub fn step(&self, n: usize) {
        for _ in 0..n {
            self.ticks
                .send(Instant::now())
                .expect("render loop is running");
        }
    }

    /// True if a refresh was taken within `timeout`.
    pub fn tick_accepted(&self, timeout: Duration) -> bool {
        self.ticks.send_timeout(Instant::now(), timeout).is_ok()
    }
}
