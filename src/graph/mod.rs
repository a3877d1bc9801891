//! The deep scene hierarchy and its arenas.
//!
//! `SceneGraph` owns every node, mirror entity and geometry instance in
//! slotmap arenas and exposes the structural edit operations. Each edit runs
//! its full upward propagation before returning; the graph is never observed
//! mid-propagation.

pub(crate) mod event;
pub mod light;
pub mod node;

use slotmap::{SlotMap, new_key_type};

use crate::backend::AccelBackend;
use crate::geometry::GeometryInstance;
use crate::graph::event::{EventKind, TransformDelta};
use crate::graph::light::LightRegistry;
use crate::graph::node::{InternalNode, ParentCore, RootNode, SceneNode, SurfaceKind, SurfaceNode};
use crate::shallow::{
    self, ShGeometryGroup, ShGeometryGroupKey, ShGroup, ShTransform, ShTransformKey,
};
use crate::transform::StaticTransform;

new_key_type! {
    /// Arena key for a [`SceneNode`].
    pub struct NodeKey;
    /// Arena key for a [`GeometryInstance`].
    pub struct GeometryInstanceKey;
}

/// Owner of the deep hierarchy and all mirror state.
#[derive(Debug)]
pub struct SceneGraph {
    pub(crate) nodes: SlotMap<NodeKey, SceneNode>,
    pub(crate) sh_transforms: SlotMap<ShTransformKey, ShTransform>,
    pub(crate) sh_geometry_groups: SlotMap<ShGeometryGroupKey, ShGeometryGroup>,
    pub(crate) instances: SlotMap<GeometryInstanceKey, GeometryInstance>,
    root: NodeKey,
}

impl SceneGraph {
    /// Creates a graph holding only the root node, whose sentinel transform
    /// is registered with the top-level group from the start.
    #[must_use]
    pub fn new(backend: &mut dyn AccelBackend) -> Self {
        let mut nodes = SlotMap::with_key();
        let mut sh_transforms = SlotMap::with_key();
        let mut sh_geometry_groups = SlotMap::with_key();

        let geometry_group = sh_geometry_groups.insert(ShGeometryGroup::new(backend));
        let sentinel = shallow::transform::create(
            &mut sh_transforms,
            backend,
            "root",
            StaticTransform::IDENTITY,
            None,
        );
        let mut sh_group = ShGroup::new(backend);
        sh_group.add_transform(&sh_transforms, &sh_geometry_groups, sentinel, backend);

        let root = nodes.insert(SceneNode::Root(RootNode {
            core: ParentCore::new("root", StaticTransform::IDENTITY, sentinel, geometry_group),
            sh_group,
            lights: LightRegistry::new(),
        }));

        Self {
            nodes,
            sh_transforms,
            sh_geometry_groups,
            instances: SlotMap::with_key(),
            root,
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    #[must_use]
    pub fn node(&self, key: NodeKey) -> &SceneNode {
        &self.nodes[key]
    }

    /// Creates a detached interior node with the given local transform.
    pub fn create_internal_node(
        &mut self,
        name: &str,
        local_to_world: StaticTransform,
        backend: &mut dyn AccelBackend,
    ) -> NodeKey {
        let geometry_group = self.sh_geometry_groups.insert(ShGeometryGroup::new(backend));
        let sentinel = shallow::transform::create(
            &mut self.sh_transforms,
            backend,
            name,
            local_to_world,
            None,
        );
        self.nodes.insert(SceneNode::Internal(InternalNode {
            core: ParentCore::new(name, local_to_world, sentinel, geometry_group),
            parents: Vec::new(),
        }))
    }

    /// Creates a detached mesh surface leaf. Geometry is attached afterwards
    /// via [`set_vertices`](Self::set_vertices) and
    /// [`add_material_group`](Self::add_material_group).
    pub fn create_mesh_surface_node(&mut self, name: &str) -> NodeKey {
        self.nodes
            .insert(SceneNode::Surface(SurfaceNode::new_mesh(name)))
    }

    /// Attaches `child` under `parent` and replays the child's full current
    /// state into exactly that parent, leaving siblings untouched.
    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey, backend: &mut dyn AccelBackend) {
        assert_ne!(parent, child, "a node cannot be its own child");
        {
            let children = self.parent_core_mut(parent).children_mut();
            assert!(
                !children.contains(&child),
                "{child:?} is already a child of {parent:?}"
            );
            children.push(child);
        }
        match &mut self.nodes[child] {
            SceneNode::Surface(node) => node.parents.push(parent),
            SceneNode::Internal(node) => node.parents.push(parent),
            SceneNode::Root(_) => panic!("the root node cannot be attached as a child"),
        }
        log::debug!(
            "attached {:?} under {:?}",
            self.nodes[child].name(),
            self.nodes[parent].name()
        );

        match &self.nodes[child] {
            SceneNode::Surface(node) => {
                let instances = node.instances.clone();
                event::deliver_geometry_event(
                    self,
                    backend,
                    parent,
                    EventKind::GeometryAdded,
                    &instances,
                );
            }
            SceneNode::Internal(_) => {
                let delta = self.current_delta(child, EventKind::TransformAdded);
                event::deliver_transform_event(
                    self,
                    backend,
                    parent,
                    EventKind::TransformAdded,
                    &delta,
                );
            }
            SceneNode::Root(_) => unreachable!(),
        }
    }

    /// Detaches `child` from `parent`, replaying the child's full current
    /// state as a removal into exactly that parent.
    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey, backend: &mut dyn AccelBackend) {
        {
            let children = self.parent_core_mut(parent).children_mut();
            let pos = children
                .iter()
                .position(|&c| c == child)
                .unwrap_or_else(|| panic!("{child:?} is not a child of {parent:?}"));
            children.remove(pos);
        }
        {
            let parents = match &mut self.nodes[child] {
                SceneNode::Surface(node) => &mut node.parents,
                SceneNode::Internal(node) => &mut node.parents,
                SceneNode::Root(_) => panic!("the root node has no parent"),
            };
            let pos = parents
                .iter()
                .position(|&p| p == parent)
                .unwrap_or_else(|| panic!("{parent:?} is not a parent of {child:?}"));
            parents.remove(pos);
        }
        log::debug!(
            "detached {:?} from {:?}",
            self.nodes[child].name(),
            self.nodes[parent].name()
        );

        match &self.nodes[child] {
            SceneNode::Surface(node) => {
                let instances = node.instances.clone();
                event::deliver_geometry_event(
                    self,
                    backend,
                    parent,
                    EventKind::GeometryRemoved,
                    &instances,
                );
            }
            SceneNode::Internal(_) => {
                let delta = self.current_delta(child, EventKind::TransformRemoved);
                event::deliver_transform_event(
                    self,
                    backend,
                    parent,
                    EventKind::TransformRemoved,
                    &delta,
                );
            }
            SceneNode::Root(_) => unreachable!(),
        }
    }

    /// Replaces the local transform of a parent node. Interior nodes forward
    /// a `TransformUpdated` covering every transform they own.
    pub fn set_node_transform(
        &mut self,
        node: NodeKey,
        local_to_world: StaticTransform,
        backend: &mut dyn AccelBackend,
    ) {
        match &self.nodes[node] {
            SceneNode::Surface(surface) => {
                panic!("surface node {:?} carries no transform", surface.name)
            }
            SceneNode::Internal(_) | SceneNode::Root(_) => {}
        }
        self.parent_core_mut(node).set_local_to_world(local_to_world);

        let owned: Vec<ShTransformKey> = self
            .parent_core(node)
            .owned_in_order()
            .collect();
        for &own in &owned {
            shallow::transform::set_local_transform(
                &mut self.sh_transforms,
                own,
                local_to_world,
                backend,
            );
        }

        if let SceneNode::Internal(internal) = &self.nodes[node] {
            let parents = internal.parents.clone();
            let delta = self.owned_delta(&owned, EventKind::TransformUpdated);
            for parent in parents {
                event::deliver_transform_event(
                    self,
                    backend,
                    parent,
                    EventKind::TransformUpdated,
                    &delta,
                );
            }
        }
    }

    /// Destroys a detached node, releasing its mirror entities and backend
    /// objects. The node must have no parents and no children; owned
    /// transforms are released newest-first.
    pub fn destroy_node(&mut self, key: NodeKey, backend: &mut dyn AccelBackend) {
        assert_ne!(key, self.root, "the root node cannot be destroyed");
        match self
            .nodes
            .remove(key)
            .unwrap_or_else(|| panic!("{key:?} is not in the node arena"))
        {
            SceneNode::Surface(node) => {
                assert!(
                    node.parents.is_empty(),
                    "surface node {:?} destroyed while still attached",
                    node.name
                );
                for inst in node.instances {
                    let instance = self
                        .instances
                        .remove(inst)
                        .unwrap_or_else(|| panic!("{inst:?} is not in the instance arena"));
                    instance.release(backend);
                }
                if let SurfaceKind::TriangleMesh {
                    vertex_buffer: Some(buffer),
                    ..
                } = node.kind
                {
                    backend.destroy_buffer(buffer);
                }
            }
            SceneNode::Internal(node) => {
                assert!(
                    node.parents.is_empty() && node.core.children().is_empty(),
                    "internal node {:?} destroyed while still attached",
                    node.core.name()
                );
                let mut core = node.core;
                for owned_key in core.owned_keys_newest_first() {
                    let own = core.take_owned(owned_key);
                    let transform = self
                        .sh_transforms
                        .remove(own)
                        .unwrap_or_else(|| panic!("{own:?} is not in the transform arena"));
                    backend.destroy_transform(transform.backend_transform());
                }
                let group = self
                    .sh_geometry_groups
                    .remove(core.geometry_group())
                    .unwrap_or_else(|| panic!("geometry group missing from the arena"));
                backend.destroy_geometry_group(group.backend_group());
            }
            SceneNode::Root(_) => unreachable!(),
        }
    }

    // === Inspection ===

    /// Number of transforms currently attached under the backend top group.
    #[must_use]
    pub fn valid_transform_count(&self) -> u32 {
        self.root_node().sh_group.valid_transform_count()
    }

    #[must_use]
    pub fn lights(&self) -> &LightRegistry {
        &self.root_node().lights
    }

    /// Instance count of a node: owned instances for a surface leaf, the
    /// aggregated geometry-group size for a parent node.
    #[must_use]
    pub fn geometry_instance_count(&self, node: NodeKey) -> usize {
        match &self.nodes[node] {
            SceneNode::Surface(surface) => surface.instances.len(),
            SceneNode::Internal(internal) => {
                self.sh_geometry_groups[internal.core.geometry_group()].len()
            }
            SceneNode::Root(root) => self.sh_geometry_groups[root.core.geometry_group()].len(),
        }
    }

    #[must_use]
    pub(crate) fn root_node(&self) -> &RootNode {
        match &self.nodes[self.root] {
            SceneNode::Root(root) => root,
            _ => unreachable!("the root key always refers to the root node"),
        }
    }

    pub(crate) fn root_node_mut(&mut self) -> &mut RootNode {
        match &mut self.nodes[self.root] {
            SceneNode::Root(root) => root,
            _ => unreachable!("the root key always refers to the root node"),
        }
    }

    fn parent_core(&self, key: NodeKey) -> &ParentCore {
        match &self.nodes[key] {
            SceneNode::Internal(node) => &node.core,
            SceneNode::Root(node) => &node.core,
            SceneNode::Surface(node) => {
                panic!("surface node {:?} cannot act as a parent", node.name)
            }
        }
    }

    fn parent_core_mut(&mut self, key: NodeKey) -> &mut ParentCore {
        match &mut self.nodes[key] {
            SceneNode::Internal(node) => &mut node.core,
            SceneNode::Root(node) => &mut node.core,
            SceneNode::Surface(node) => {
                panic!("surface node {:?} cannot act as a parent", node.name)
            }
        }
    }

    /// The full current delta of an interior node: every transform it owns
    /// plus the geometry instances carried through each of them. Used to
    /// replay a populated subtree into a newly gained (or lost) parent.
    fn current_delta(&mut self, node: NodeKey, kind: EventKind) -> TransformDelta {
        let owned: Vec<ShTransformKey> = self.parent_core(node).owned_in_order().collect();
        self.owned_delta(&owned, kind)
    }

    /// Builds the delta for `owned` and keeps each reachable group's
    /// announced subset in step with what the delta will tell the root: an
    /// add replay carries (and announces) the full membership, removal and
    /// update deltas may only reference what is already announced.
    fn owned_delta(&mut self, owned: &[ShTransformKey], kind: EventKind) -> TransformDelta {
        let mut delta = TransformDelta::default();
        for &own in owned {
            delta.transforms.push(own);
            let Some(group) =
                shallow::transform::has_geometry_descendant(&self.sh_transforms, own)
            else {
                continue;
            };
            match kind {
                EventKind::TransformAdded => {
                    self.sh_geometry_groups[group].announce_all();
                    for &inst in self.sh_geometry_groups[group].instances() {
                        delta.pairs.push((own, inst));
                    }
                }
                EventKind::TransformRemoved => {
                    for &inst in self.sh_geometry_groups[group].announced() {
                        delta.pairs.push((own, inst));
                    }
                    self.sh_geometry_groups[group].clear_announced();
                }
                EventKind::TransformUpdated => {
                    for &inst in self.sh_geometry_groups[group].announced() {
                        delta.pairs.push((own, inst));
                    }
                }
                EventKind::GeometryAdded | EventKind::GeometryRemoved => {
                    unreachable!("geometry events are not built from owned transforms")
                }
            }
        }
        delta
    }
}
