//! Core types for marker-anchored augmented reality.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete camera, pose estimator or renderer.

mod frame;
mod logger;
mod marker;
mod pose;

pub use frame::{VideoFrame, Viewport};
pub use marker::{FrameStamp, MarkerId, MarkerSet, PoseSample};
pub use pose::{blend_pose, pose_from_parts, Pose};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
