use ar_anchor_core::{FrameStamp, MarkerId, Pose};
use serde::{Deserialize, Serialize};

/// Tracking state of one anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorState {
    /// Not seen recently (or never seen).
    #[default]
    Lost,
    /// A sample arrived within the loss timeout.
    Found,
}

/// Stable reference to an anchor owned by an `AnchorManager`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnchorHandle(pub(crate) usize);

impl AnchorHandle {
    /// Position of the anchor in registration order.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A tracked coordinate frame attached to one marker.
#[derive(Clone, Debug)]
pub struct Anchor {
    pub(crate) marker: MarkerId,
    pub(crate) state: AnchorState,
    pub(crate) pose: Pose,
    pub(crate) raw_pose: Pose,
    pub(crate) last_seen: Option<FrameStamp>,
}

impl Anchor {
    pub(crate) fn new(marker: MarkerId) -> Self {
        Self {
            marker,
            state: AnchorState::Lost,
            pose: Pose::identity(),
            raw_pose: Pose::identity(),
            last_seen: None,
        }
    }

    pub fn marker(&self) -> MarkerId {
        self.marker
    }

    pub fn state(&self) -> AnchorState {
        self.state
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        self.state == AnchorState::Found
    }

    /// Smoothed pose; frozen while the anchor is lost.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Last unfiltered pose reported by the estimator.
    pub fn raw_pose(&self) -> &Pose {
        &self.raw_pose
    }

    pub fn last_seen(&self) -> Option<FrameStamp> {
        self.last_seen
    }
}

/// Found/lost transition emitted by `AnchorManager::update`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnchorEvent {
    /// The anchor was lost and got a sample again. `pose` is the raw sample
    /// pose, not a filtered one.
    Found {
        anchor: AnchorHandle,
        marker: MarkerId,
        pose: Pose,
    },
    Lost {
        anchor: AnchorHandle,
        marker: MarkerId,
    },
}

impl AnchorEvent {
    pub fn anchor(&self) -> AnchorHandle {
        match self {
            AnchorEvent::Found { anchor, .. } | AnchorEvent::Lost { anchor, .. } => *anchor,
        }
    }

    pub fn marker(&self) -> MarkerId {
        match self {
            AnchorEvent::Found { marker, .. } | AnchorEvent::Lost { marker, .. } => *marker,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, AnchorEvent::Found { .. })
    }
}
