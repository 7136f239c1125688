//! Per-frame work: camera frame -> estimator -> anchors -> scene -> draw.

use std::sync::Arc;

use ar_anchor_core::{FrameStamp, Pose, Viewport};
use ar_anchor_scene::SceneGraph;
use ar_anchor_tracking::{AnchorEvent, AnchorManager};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::collaborators::{CameraStream, FrameView, PoseEstimator, Renderer, SessionObserver};
use crate::scheduler::FrameTick;

/// Counters of the frame pipeline, for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Render-loop ticks handled.
    pub ticks: u64,
    /// Ticks where the estimator was called.
    pub estimator_calls: u64,
    /// Estimator calls that produced a result (the anchor clock).
    pub estimator_results: u64,
    /// Ticks that reused the previous camera frame.
    pub repeated_frames: u64,
    pub draws: u64,
    pub resizes: u64,
}

/// Posts output-surface size changes to the render loop.
///
/// Cheap to clone; the UI layer keeps one per surface. Sizes are applied on
/// the next tick, and only the most recent one counts.
#[derive(Clone, Debug)]
pub struct ResizeSender {
    tx: Sender<Viewport>,
}

impl ResizeSender {
    pub(crate) fn new(tx: Sender<Viewport>) -> Self {
        Self { tx }
    }

    pub fn resize(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("ignoring collapsed surface {width}x{height}");
            return;
        }
        if self.tx.send(Viewport::new(width, height)).is_err() {
            log::debug!("resize after the session went away");
        }
    }
}

/// Everything the render thread touches, owned by the session and locked
/// once per tick.
pub(crate) struct FramePipeline {
    pub(crate) stream: Option<Box<dyn CameraStream>>,
    pub(crate) estimator: Option<Box<dyn PoseEstimator>>,
    /// True between a successful estimator init and its release.
    pub(crate) estimator_active: bool,
    pub(crate) anchors: AnchorManager,
    pub(crate) scene: SceneGraph,
    renderer: Box<dyn Renderer>,
    observer: Arc<dyn SessionObserver>,
    resize_rx: Receiver<Viewport>,
    viewport: Viewport,
    skip_repeated_frames: bool,
    last_frame_seq: Option<u64>,
    clock: FrameStamp,
    pub(crate) stats: FrameStats,
}

impl FramePipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        estimator: Box<dyn PoseEstimator>,
        anchors: AnchorManager,
        scene: SceneGraph,
        renderer: Box<dyn Renderer>,
        observer: Arc<dyn SessionObserver>,
        resize_rx: Receiver<Viewport>,
        viewport: Viewport,
        skip_repeated_frames: bool,
    ) -> Self {
        Self {
            stream: None,
            estimator: Some(estimator),
            estimator_active: false,
            anchors,
            scene,
            renderer,
            observer,
            resize_rx,
            viewport,
            skip_repeated_frames,
            last_frame_seq: None,
            clock: FrameStamp::ZERO,
            stats: FrameStats::default(),
        }
    }

    /// Prepare for a fresh run: size the output surface and restart the
    /// anchor clock.
    ///
    /// Sizes posted while the session was idle or initializing are not lost:
    /// the latest one becomes the initial surface size.
    pub(crate) fn begin_run(&mut self) {
        while let Ok(viewport) = self.resize_rx.try_recv() {
            self.viewport = viewport;
        }
        self.renderer.resize(self.viewport);
        self.stats.resizes += 1;
        self.last_frame_seq = None;
        self.clock = FrameStamp::ZERO;
        self.anchors.reset();
    }

    pub(crate) fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// One render-loop tick. Anchor updates of this tick happen before the
    /// scene sync and the draw of the same tick.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self), fields(seq = tick.seq))
    )]
    pub(crate) fn run_frame(&mut self, tick: FrameTick) {
        self.stats.ticks += 1;
        self.apply_resize();

        let events = self.track();
        for event in &events {
            match event {
                AnchorEvent::Found { marker, .. } => self.observer.on_target_found(*marker),
                AnchorEvent::Lost { marker, .. } => self.observer.on_target_lost(*marker),
            }
        }

        self.scene.sync(&events, &self.anchors);
        let view = FrameView {
            tick: tick.seq,
            viewport: self.viewport,
            camera: Pose::identity(),
            lights: self.scene.lights(),
            materials: self.scene.materials(),
            commands: self.scene.draw_commands(),
        };
        self.renderer.draw(&view);
        self.stats.draws += 1;
    }

    /// Camera frame -> estimator -> anchors. Returns no events when there is
    /// nothing new to look at or the estimator has no result yet; anchors
    /// then keep their previous state.
    fn track(&mut self) -> Vec<AnchorEvent> {
        let Some(stream) = self.stream.as_mut() else {
            return Vec::new();
        };
        let Some(frame) = stream.latest_frame() else {
            return Vec::new();
        };
        if self.last_frame_seq == Some(frame.seq) {
            self.stats.repeated_frames += 1;
            if self.skip_repeated_frames {
                return Vec::new();
            }
        }
        self.last_frame_seq = Some(frame.seq);

        let Some(estimator) = self.estimator.as_mut() else {
            return Vec::new();
        };
        self.stats.estimator_calls += 1;
        let Some(samples) = estimator.detect(&frame) else {
            return Vec::new();
        };
        self.stats.estimator_results += 1;

        self.clock = self.clock.next();
        self.anchors.update(&samples, self.clock)
    }

    // Only the latest size matters; the renderer is resized once per change.
    fn apply_resize(&mut self) {
        let mut latest = None;
        while let Ok(viewport) = self.resize_rx.try_recv() {
            latest = Some(viewport);
        }
        let Some(viewport) = latest else {
            return;
        };
        if viewport == self.viewport {
            return;
        }
        log::debug!(
            "resizing output surface {}x{} -> {}x{} (aspect {:.3})",
            self.viewport.width,
            self.viewport.height,
            viewport.width,
            viewport.height,
            viewport.aspect()
        );
        self.viewport = viewport;
        self.renderer.resize(viewport);
        self.stats.resizes += 1;
    }
}
