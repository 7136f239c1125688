use ar_anchor_core::Pose;
use ar_anchor_tracking::{AnchorEvent, AnchorHandle, AnchorManager};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::node::{Light, Material, MaterialId, Mesh, NodeId, SceneNode};

/// One visible node, ready to be drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCommand {
    pub node: NodeId,
    pub anchor: AnchorHandle,
    pub mesh: Mesh,
    pub material: MaterialId,
    /// Camera-relative transform of the node.
    pub world: Pose,
}

/// Content nodes grouped by the anchor that owns them.
#[derive(Default)]
pub struct SceneGraph {
    nodes: Vec<Option<SceneNode>>,
    free: Vec<usize>,
    // children[anchor.index()] lists the nodes owned by that anchor.
    children: Vec<Vec<NodeId>>,
    materials: Vec<Material>,
    lights: Vec<Light>,
    commands: Vec<DrawCommand>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scene with a single default hemisphere light.
    pub fn with_default_light() -> Self {
        let mut scene = Self::new();
        scene.add_light(Light::default());
        scene
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Attach content to `anchor` at the anchor origin.
    pub fn attach(&mut self, anchor: AnchorHandle, mesh: Mesh, material: MaterialId) -> NodeId {
        self.attach_with_offset(anchor, mesh, material, Pose::identity())
    }

    /// Attach content to `anchor` with a fixed offset in marker space.
    ///
    /// The node starts hidden. If the anchor is already found, the next
    /// `sync` shows it, exactly as if it had been attached before the anchor
    /// was found.
    pub fn attach_with_offset(
        &mut self,
        anchor: AnchorHandle,
        mesh: Mesh,
        material: MaterialId,
        local: Pose,
    ) -> NodeId {
        let node = SceneNode {
            anchor,
            mesh,
            material,
            local,
            world: local,
            visible: false,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        if self.children.len() <= anchor.index() {
            self.children.resize_with(anchor.index() + 1, Vec::new);
        }
        self.children[anchor.index()].push(id);
        id
    }

    /// Remove a node. Returns `None` if the id is stale.
    pub fn detach(&mut self, id: NodeId) -> Option<SceneNode> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        if let Some(siblings) = self.children.get_mut(node.anchor.index()) {
            siblings.retain(|n| *n != id);
        }
        self.free.push(id.0);
        Some(node)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)?.as_ref()
    }

    /// Nodes owned by `anchor`.
    pub fn children(&self, anchor: AnchorHandle) -> &[NodeId] {
        self.children
            .get(anchor.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Apply this frame's anchor transitions and poses, then rebuild the
    /// draw list.
    ///
    /// `Found` shows the anchor's nodes at the event's raw pose, `Lost` hides
    /// them and freezes their transform. Anchors that stay found keep pushing
    /// their filtered pose. Must run after the anchor update of the same
    /// frame and before the draw.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(events = events.len()))
    )]
    pub fn sync(&mut self, events: &[AnchorEvent], anchors: &AnchorManager) -> &[DrawCommand] {
        for event in events {
            match event {
                AnchorEvent::Found { anchor, pose, .. } => {
                    self.for_each_child(*anchor, |node| {
                        node.visible = true;
                        node.world = pose * node.local;
                    });
                }
                AnchorEvent::Lost { anchor, .. } => {
                    self.for_each_child(*anchor, |node| node.visible = false);
                }
            }
        }

        for (handle, anchor) in anchors.iter() {
            if anchor.is_found() {
                let pose = *anchor.pose();
                self.for_each_child(handle, |node| {
                    node.visible = true;
                    node.world = pose * node.local;
                });
            } else {
                self.for_each_child(handle, |node| node.visible = false);
            }
        }

        self.commands.clear();
        self.commands.extend(
            self.nodes
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| slot.as_ref().map(|node| (idx, node)))
                .filter(|(_, node)| node.visible)
                .map(|(idx, node)| DrawCommand {
                    node: NodeId(idx),
                    anchor: node.anchor,
                    mesh: node.mesh,
                    material: node.material,
                    world: node.world,
                }),
        );
        &self.commands
    }

    /// Draw list produced by the last `sync`.
    pub fn draw_commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Drop every node and material (session teardown). Lights stay.
    ///
    /// Returns the number of nodes released.
    pub fn clear(&mut self) -> usize {
        let released = self.node_count();
        self.nodes.clear();
        self.free.clear();
        self.children.clear();
        self.materials.clear();
        self.commands.clear();
        if released > 0 {
            log::debug!("released {released} scene nodes");
        }
        released
    }

    fn for_each_child(&mut self, anchor: AnchorHandle, mut f: impl FnMut(&mut SceneNode)) {
        let Some(children) = self.children.get(anchor.index()) else {
            return;
        };
        for id in children {
            if let Some(node) = self.nodes[id.0].as_mut() {
                f(node);
            }
        }
    }
}
