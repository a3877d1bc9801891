//! Scene-node variants.
//!
//! The deep hierarchy is a tagged union of three variants with distinct
//! capability sets: surface leaves carry geometry, internal nodes relay
//! structural deltas upward, and the unique root terminates propagation into
//! the top-level mirror group and the light registry.

use rustc_hash::FxHashMap;

use crate::backend::BufferHandle;
use crate::geometry::Vertex;
use crate::graph::light::LightRegistry;
use crate::graph::{GeometryInstanceKey, NodeKey};
use crate::shallow::{ShGeometryGroupKey, ShGroup, ShTransformKey};
use crate::transform::StaticTransform;

/// A node of the deep hierarchy.
#[derive(Debug)]
pub enum SceneNode {
    Surface(SurfaceNode),
    Internal(InternalNode),
    Root(RootNode),
}

impl SceneNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SceneNode::Surface(node) => &node.name,
            SceneNode::Internal(node) => node.core.name(),
            SceneNode::Root(node) => node.core.name(),
        }
    }
}

/// Geometry payload of a surface leaf.
#[derive(Debug)]
pub enum SurfaceKind {
    TriangleMesh {
        vertices: Vec<Vertex>,
        /// Backend upload of `vertices`, shared by every material group.
        vertex_buffer: Option<BufferHandle>,
    },
    InfiniteSphere,
}

/// A leaf owning geometry instances. Has zero or more parents and no
/// transform of its own.
#[derive(Debug)]
pub struct SurfaceNode {
    pub(crate) name: String,
    pub(crate) parents: Vec<NodeKey>,
    pub(crate) instances: Vec<GeometryInstanceKey>,
    pub(crate) kind: SurfaceKind,
}

impl SurfaceNode {
    pub(crate) fn new_mesh(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            parents: Vec::new(),
            instances: Vec::new(),
            kind: SurfaceKind::TriangleMesh {
                vertices: Vec::new(),
                vertex_buffer: None,
            },
        }
    }

    #[must_use]
    pub fn instances(&self) -> &[GeometryInstanceKey] {
        &self.instances
    }

    #[must_use]
    pub fn parents(&self) -> &[NodeKey] {
        &self.parents
    }
}

/// State shared by the two parent-capable variants.
///
/// `owned` maps child-side transform identity to the chained mirror transform
/// this node created for it; the `None` key is the node's own sentinel
/// transform (the chain link for geometry parented directly to this node).
/// Insertion order is logged so teardown can run in reverse.
#[derive(Debug)]
pub struct ParentCore {
    name: String,
    local_to_world: StaticTransform,
    children: Vec<NodeKey>,
    owned: FxHashMap<Option<ShTransformKey>, ShTransformKey>,
    owned_order: Vec<Option<ShTransformKey>>,
    geometry_group: ShGeometryGroupKey,
}

impl ParentCore {
    pub(crate) fn new(
        name: &str,
        local_to_world: StaticTransform,
        sentinel: ShTransformKey,
        geometry_group: ShGeometryGroupKey,
    ) -> Self {
        let mut owned = FxHashMap::default();
        owned.insert(None, sentinel);
        Self {
            name: name.to_owned(),
            local_to_world,
            children: Vec::new(),
            owned,
            owned_order: vec![None],
            geometry_group,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn local_to_world(&self) -> &StaticTransform {
        &self.local_to_world
    }

    pub(crate) fn set_local_to_world(&mut self, transform: StaticTransform) {
        self.local_to_world = transform;
    }

    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeKey> {
        &mut self.children
    }

    #[must_use]
    pub(crate) fn geometry_group(&self) -> ShGeometryGroupKey {
        self.geometry_group
    }

    /// The mirror transform for geometry parented directly to this node.
    #[must_use]
    pub(crate) fn sentinel(&self) -> ShTransformKey {
        self.owned(None)
    }

    /// The owned transform keyed by `key`. A miss means a delta referenced a
    /// transform this node was never told about, which is fatal.
    #[must_use]
    pub(crate) fn owned(&self, key: Option<ShTransformKey>) -> ShTransformKey {
        *self
            .owned
            .get(&key)
            .unwrap_or_else(|| panic!("no owned transform for delta key {key:?}"))
    }

    pub(crate) fn insert_owned(&mut self, key: Option<ShTransformKey>, transform: ShTransformKey) {
        assert!(
            self.owned.insert(key, transform).is_none(),
            "an owned transform for delta key {key:?} already exists"
        );
        self.owned_order.push(key);
    }

    pub(crate) fn take_owned(&mut self, key: Option<ShTransformKey>) -> ShTransformKey {
        let transform = self
            .owned
            .remove(&key)
            .unwrap_or_else(|| panic!("no owned transform for delta key {key:?}"));
        self.owned_order.retain(|&k| k != key);
        transform
    }

    /// Owned transforms in insertion order.
    pub(crate) fn owned_in_order(&self) -> impl Iterator<Item = ShTransformKey> + '_ {
        self.owned_order.iter().map(|key| self.owned[key])
    }

    /// Delta keys in reverse insertion order, for teardown.
    #[must_use]
    pub(crate) fn owned_keys_newest_first(&self) -> Vec<Option<ShTransformKey>> {
        self.owned_order.iter().rev().copied().collect()
    }
}

/// An interior node: parent-capable, and itself a child of other nodes.
#[derive(Debug)]
pub struct InternalNode {
    pub(crate) core: ParentCore,
    pub(crate) parents: Vec<NodeKey>,
}

impl InternalNode {
    #[must_use]
    pub fn core(&self) -> &ParentCore {
        &self.core
    }

    #[must_use]
    pub fn parents(&self) -> &[NodeKey] {
        &self.parents
    }
}

/// The unique top of the hierarchy: terminates propagation into the
/// top-level mirror group and the light registry.
#[derive(Debug)]
pub struct RootNode {
    pub(crate) core: ParentCore,
    pub(crate) sh_group: ShGroup,
    pub(crate) lights: LightRegistry,
}

impl RootNode {
    #[must_use]
    pub fn core(&self) -> &ParentCore {
        &self.core
    }

    #[must_use]
    pub fn group(&self) -> &ShGroup {
        &self.sh_group
    }

    #[must_use]
    pub fn lights(&self) -> &LightRegistry {
        &self.lights
    }
}
