use std::path::PathBuf;

use ar_anchor_core::Pose;
use ar_anchor_tracking::AnchorHandle;
use serde::{Deserialize, Serialize};

/// Handle of a node inside a `SceneGraph`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

/// Handle of a material registered with a `SceneGraph`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub(crate) usize);

impl MaterialId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Geometry of a content node, in marker units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mesh {
    /// Plane in the marker's XY plane, centred on the node origin.
    Plane { width: f32, height: f32 },
}

impl Default for Mesh {
    fn default() -> Self {
        Mesh::Plane {
            width: 1.0,
            height: 1.0,
        }
    }
}

/// Unlit surface description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Texture image, resolved by the renderer.
    pub texture: Option<PathBuf>,
    /// Linear RGBA tint multiplied with the texture.
    pub color: [f32; 4],
    pub transparent: bool,
    pub opacity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            texture: None,
            color: [1.0, 1.0, 1.0, 1.0],
            transparent: false,
            opacity: 1.0,
        }
    }
}

impl Material {
    /// Transparent textured material, the usual overlay setup.
    pub fn textured(texture: impl Into<PathBuf>) -> Self {
        Self {
            texture: Some(texture.into()),
            transparent: true,
            ..Self::default()
        }
    }
}

/// Scene lighting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Light {
    /// Sky/ground gradient ambient light.
    Hemisphere {
        sky: [f32; 3],
        ground: [f32; 3],
        intensity: f32,
    },
    Ambient {
        color: [f32; 3],
        intensity: f32,
    },
}

impl Default for Light {
    fn default() -> Self {
        Light::Hemisphere {
            sky: [1.0, 1.0, 1.0],
            ground: [0.733, 0.733, 1.0],
            intensity: 1.0,
        }
    }
}

/// Content parented to one anchor.
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub(crate) anchor: AnchorHandle,
    pub(crate) mesh: Mesh,
    pub(crate) material: MaterialId,
    pub(crate) local: Pose,
    pub(crate) world: Pose,
    pub(crate) visible: bool,
}

impl SceneNode {
    pub fn anchor(&self) -> AnchorHandle {
        self.anchor
    }

    pub fn mesh(&self) -> Mesh {
        self.mesh
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Offset of the node relative to its anchor.
    pub fn local(&self) -> &Pose {
        &self.local
    }

    /// Last world (camera-relative) transform; frozen while hidden.
    pub fn world(&self) -> &Pose {
        &self.world
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}
