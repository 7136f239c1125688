use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

/// Rigid marker-to-camera transform (rotation + translation).
pub type Pose = Isometry3<f64>;

/// Below this the two rotations are treated as identical.
const SLERP_EPSILON: f64 = 1.0e-9;

/// Build a pose from a translation vector and a unit rotation.
#[inline]
pub fn pose_from_parts(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Pose {
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

/// Move `prev` towards `raw` by `alpha`.
///
/// Translation is filtered with an exponential moving average and rotation
/// with a shortest-arc slerp. `alpha = 1.0` returns `raw`, `alpha = 0.0`
/// returns `prev`. When the two rotations already coincide the slerp is
/// degenerate and the raw rotation is taken as-is.
pub fn blend_pose(prev: &Pose, raw: &Pose, alpha: f64) -> Pose {
    let alpha = alpha.clamp(0.0, 1.0);
    let translation = prev
        .translation
        .vector
        .lerp(&raw.translation.vector, alpha);
    let rotation = prev
        .rotation
        .try_slerp(&raw.rotation, alpha, SLERP_EPSILON)
        .unwrap_or(raw.rotation);
    pose_from_parts(translation, rotation)
}
