use std::collections::HashMap;

use ar_anchor_core::{blend_pose, FrameStamp, MarkerId, PoseSample};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::anchor::{Anchor, AnchorEvent, AnchorHandle, AnchorState};
use crate::params::TrackingParams;

/// Owns one anchor per registered marker and advances them frame by frame.
pub struct AnchorManager {
    params: TrackingParams,
    anchors: Vec<Anchor>,
    by_marker: HashMap<MarkerId, AnchorHandle>,
    // Per-anchor index of the best sample of the current update; reused.
    best: Vec<Option<usize>>,
}

impl AnchorManager {
    pub fn new(params: TrackingParams) -> Self {
        Self {
            params,
            anchors: Vec::new(),
            by_marker: HashMap::new(),
            best: Vec::new(),
        }
    }

    #[inline]
    pub fn params(&self) -> &TrackingParams {
        &self.params
    }

    /// Register an anchor for `marker`.
    ///
    /// Registering the same marker twice returns the existing handle.
    pub fn register_anchor(&mut self, marker: MarkerId) -> AnchorHandle {
        if let Some(handle) = self.by_marker.get(&marker) {
            return *handle;
        }
        let handle = AnchorHandle(self.anchors.len());
        self.anchors.push(Anchor::new(marker));
        self.by_marker.insert(marker, handle);
        log::debug!("registered anchor {} for {marker}", handle.0);
        handle
    }

    pub fn handle_for(&self, marker: MarkerId) -> Option<AnchorHandle> {
        self.by_marker.get(&marker).copied()
    }

    pub fn anchor(&self, handle: AnchorHandle) -> Option<&Anchor> {
        self.anchors.get(handle.0)
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnchorHandle, &Anchor)> + '_ {
        self.anchors
            .iter()
            .enumerate()
            .map(|(i, a)| (AnchorHandle(i), a))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn found_count(&self) -> usize {
        self.anchors.iter().filter(|a| a.is_found()).count()
    }

    /// Advance every anchor by one estimator frame.
    ///
    /// `samples` are the detections of the frame stamped `now`. Anchors with
    /// a sample are filtered (or re-found); anchors without one hold their
    /// pose until the loss timeout elapses. Samples for unregistered markers
    /// are ignored.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, samples), fields(samples = samples.len(), now = now.0))
    )]
    pub fn update(&mut self, samples: &[PoseSample], now: FrameStamp) -> Vec<AnchorEvent> {
        self.select_best_samples(samples);

        let loss_timeout = u64::from(self.params.loss_timeout_frames);
        let smoothing = self.params.smoothing;
        let mut events = Vec::new();

        for (idx, anchor) in self.anchors.iter_mut().enumerate() {
            let handle = AnchorHandle(idx);
            match self.best[idx] {
                Some(sample_idx) => {
                    let sample = &samples[sample_idx];
                    anchor.raw_pose = sample.pose;
                    anchor.last_seen = Some(now);
                    match anchor.state {
                        AnchorState::Lost => {
                            anchor.state = AnchorState::Found;
                            anchor.pose = sample.pose;
                            log::debug!("{} found at frame {}", anchor.marker, now.0);
                            events.push(AnchorEvent::Found {
                                anchor: handle,
                                marker: anchor.marker,
                                pose: sample.pose,
                            });
                        }
                        AnchorState::Found => {
                            anchor.pose = blend_pose(&anchor.pose, &sample.pose, smoothing);
                        }
                    }
                }
                None => {
                    if anchor.state != AnchorState::Found {
                        continue;
                    }
                    let missed = anchor
                        .last_seen
                        .map_or(loss_timeout, |seen| now.frames_since(seen));
                    if missed >= loss_timeout {
                        anchor.state = AnchorState::Lost;
                        log::debug!(
                            "{} lost at frame {} after {missed} missed frames",
                            anchor.marker,
                            now.0
                        );
                        events.push(AnchorEvent::Lost {
                            anchor: handle,
                            marker: anchor.marker,
                        });
                    }
                }
            }
        }

        events
    }

    /// Mark every anchor lost and forget its filter state; registrations stay.
    pub fn reset(&mut self) {
        for anchor in &mut self.anchors {
            let marker = anchor.marker;
            *anchor = Anchor::new(marker);
        }
    }

    /// Drop every anchor (session teardown).
    pub fn clear(&mut self) {
        self.anchors.clear();
        self.by_marker.clear();
        self.best.clear();
    }

    fn select_best_samples(&mut self, samples: &[PoseSample]) {
        self.best.clear();
        self.best.resize(self.anchors.len(), None);

        for (i, sample) in samples.iter().enumerate() {
            if !(sample.confidence >= self.params.min_confidence) {
                continue;
            }
            let Some(handle) = self.by_marker.get(&sample.marker) else {
                log::trace!("ignoring sample for unregistered {}", sample.marker);
                continue;
            };
            let slot = &mut self.best[handle.0];
            match *slot {
                Some(prev) if samples[prev].confidence >= sample.confidence => {}
                _ => *slot = Some(i),
            }
        }
    }
}

impl Default for AnchorManager {
    fn default() -> Self {
        Self::new(TrackingParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ar_anchor_core::{pose_from_parts, Pose};
    use nalgebra::{UnitQuaternion, Vector3};

    fn pose_at(x: f64) -> Pose {
        pose_from_parts(Vector3::new(x, 0.0, 1.0), UnitQuaternion::identity())
    }

    fn sample(marker: u32, x: f64, frame: u64) -> PoseSample {
        PoseSample::new(MarkerId(marker), pose_at(x), FrameStamp(frame))
    }

    #[test]
    fn register_is_idempotent_per_marker() {
        let mut mgr = AnchorManager::default();
        let a = mgr.register_anchor(MarkerId(0));
        let b = mgr.register_anchor(MarkerId(1));
        assert_ne!(a, b);
        assert_eq!(mgr.register_anchor(MarkerId(0)), a);
        assert_eq!(mgr.len(), 2);
        assert_eq!(mgr.handle_for(MarkerId(1)), Some(b));
    }

    #[test]
    fn first_sample_emits_found_with_raw_pose() {
        let mut mgr = AnchorManager::default();
        let h = mgr.register_anchor(MarkerId(0));
        let events = mgr.update(&[sample(0, 0.3, 1)], FrameStamp(1));
        assert_eq!(
            events,
            vec![AnchorEvent::Found {
                anchor: h,
                marker: MarkerId(0),
                pose: pose_at(0.3),
            }]
        );
        let anchor = mgr.anchor(h).expect("anchor");
        assert!(anchor.is_found());
        assert_eq!(anchor.pose(), &pose_at(0.3));
    }

    #[test]
    fn subsequent_samples_are_smoothed() {
        let mut mgr = AnchorManager::new(TrackingParams {
            smoothing: 0.25,
            ..TrackingParams::default()
        });
        let h = mgr.register_anchor(MarkerId(0));
        mgr.update(&[sample(0, 0.0, 1)], FrameStamp(1));
        let events = mgr.update(&[sample(0, 1.0, 2)], FrameStamp(2));
        assert!(events.is_empty());
        let anchor = mgr.anchor(h).expect("anchor");
        assert_relative_eq!(anchor.pose().translation.vector.x, 0.25, epsilon = 1e-12);
        assert_relative_eq!(anchor.raw_pose().translation.vector.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_markers_are_ignored() {
        let mut mgr = AnchorManager::default();
        let h = mgr.register_anchor(MarkerId(0));
        let events = mgr.update(&[sample(7, 0.0, 1)], FrameStamp(1));
        assert!(events.is_empty());
        assert!(!mgr.anchor(h).expect("anchor").is_found());
    }

    #[test]
    fn highest_confidence_duplicate_wins() {
        let mut mgr = AnchorManager::default();
        let h = mgr.register_anchor(MarkerId(0));
        let samples = [
            sample(0, 0.1, 1).with_confidence(0.4),
            sample(0, 0.9, 1).with_confidence(0.8),
            sample(0, 0.5, 1).with_confidence(0.6),
        ];
        mgr.update(&samples, FrameStamp(1));
        let anchor = mgr.anchor(h).expect("anchor");
        assert_relative_eq!(anchor.pose().translation.vector.x, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn low_confidence_counts_as_missing() {
        let mut mgr = AnchorManager::new(TrackingParams {
            min_confidence: 0.5,
            loss_timeout_frames: 1,
            ..TrackingParams::default()
        });
        let h = mgr.register_anchor(MarkerId(0));
        mgr.update(&[sample(0, 0.0, 1)], FrameStamp(1));
        let events = mgr.update(&[sample(0, 0.0, 2).with_confidence(0.2)], FrameStamp(2));
        assert_eq!(
            events,
            vec![AnchorEvent::Lost {
                anchor: h,
                marker: MarkerId(0)
            }]
        );
    }

    #[test]
    fn reset_loses_everything_but_keeps_registrations() {
        let mut mgr = AnchorManager::default();
        let h = mgr.register_anchor(MarkerId(2));
        mgr.update(&[sample(2, 0.0, 1)], FrameStamp(1));
        assert_eq!(mgr.found_count(), 1);
        mgr.reset();
        assert_eq!(mgr.found_count(), 0);
        assert_eq!(mgr.handle_for(MarkerId(2)), Some(h));
        assert_eq!(mgr.anchor(h).expect("anchor").last_seen(), None);

        mgr.clear();
        assert!(mgr.is_empty());
        assert_eq!(mgr.handle_for(MarkerId(2)), None);
    }
}
