//! Scene graph for marker-anchored content.
//!
//! Content nodes are parented to exactly one anchor. Once per frame,
//! `SceneGraph::sync` pushes the anchors' found/lost transitions and poses
//! into the nodes and rebuilds the list of draw commands handed to the
//! renderer.

mod graph;
mod node;

pub use graph::{DrawCommand, SceneGraph};
pub use node::{Light, Material, MaterialId, Mesh, NodeId, SceneNode};
