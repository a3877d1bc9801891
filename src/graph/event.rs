//! Bottom-up delta propagation.
//!
//! Every structural change is delivered to a parent node as an event plus a
//! delta: the minimal set of affected mirror transforms and geometry
//! instances, never the whole tree. Internal nodes synthesize their own
//! chained transforms for incoming transform deltas, remap the delta into
//! their own identities and forward it to their parents; the root terminates
//! propagation by mirroring into the top-level group and the light registry.
//!
//! Delivery is strictly child-to-parent and runs to completion before the
//! originating edit returns. A delta key missing from a node's owned map is
//! a protocol violation and aborts.

use crate::backend::AccelBackend;
use crate::graph::node::{InternalNode, RootNode, SceneNode};
use crate::graph::{GeometryInstanceKey, NodeKey, SceneGraph};
use crate::shallow::{self, ShTransformKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    TransformAdded,
    TransformRemoved,
    TransformUpdated,
    GeometryAdded,
    GeometryRemoved,
}

/// Transform-shaped delta: affected mirror transforms plus the geometry
/// instances reachable through them, each paired with the transform that
/// carries it.
#[derive(Debug, Default)]
pub(crate) struct TransformDelta {
    pub transforms: Vec<ShTransformKey>,
    pub pairs: Vec<(ShTransformKey, GeometryInstanceKey)>,
}

fn internal_ref(graph: &SceneGraph, key: NodeKey) -> &InternalNode {
    match &graph.nodes[key] {
        SceneNode::Internal(node) => node,
        other => panic!("expected an internal node, found {:?}", other.name()),
    }
}

fn internal_mut(graph: &mut SceneGraph, key: NodeKey) -> &mut InternalNode {
    match &mut graph.nodes[key] {
        SceneNode::Internal(node) => node,
        other => panic!("expected an internal node, found {:?}", other.name()),
    }
}

fn root_mut(graph: &mut SceneGraph, key: NodeKey) -> &mut RootNode {
    match &mut graph.nodes[key] {
        SceneNode::Root(node) => node,
        other => panic!("expected the root node, found {:?}", other.name()),
    }
}

/// Removes a mirror transform from the arena and releases its backend
/// object. The caller must have detached it from every backend container.
fn destroy_sh_transform(graph: &mut SceneGraph, backend: &mut dyn AccelBackend, key: ShTransformKey) {
    let transform = graph
        .sh_transforms
        .remove(key)
        .unwrap_or_else(|| panic!("{key:?} is not in the transform arena"));
    backend.destroy_transform(transform.backend_transform());
}

/// Delivers a transform-shaped event to `target`, which must be a parent
/// node. Surface nodes never receive transform events.
pub(crate) fn deliver_transform_event(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    kind: EventKind,
    delta: &TransformDelta,
) {
    log::trace!(
        "{kind:?} -> {}: {} transforms, {} instance pairs",
        graph.nodes[target].name(),
        delta.transforms.len(),
        delta.pairs.len()
    );
    match &graph.nodes[target] {
        SceneNode::Surface(node) => {
            panic!("surface node {:?} cannot receive a transform event", node.name)
        }
        SceneNode::Internal(_) => internal_transform_event(graph, backend, target, kind, delta),
        SceneNode::Root(_) => root_transform_event(graph, backend, target, kind, delta),
    }
}

fn internal_transform_event(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    kind: EventKind,
    delta: &TransformDelta,
) {
    let forwarded = match kind {
        EventKind::TransformAdded => {
            // Chain this node's local transform onto every incoming one.
            let (name, local) = {
                let node = internal_ref(graph, target);
                (node.core.name().to_owned(), *node.core.local_to_world())
            };
            let mut transforms = Vec::with_capacity(delta.transforms.len());
            for &child_tr in &delta.transforms {
                let own = shallow::transform::create(
                    &mut graph.sh_transforms,
                    backend,
                    &name,
                    local,
                    Some(child_tr),
                );
                internal_mut(graph, target).core.insert_owned(Some(child_tr), own);
                transforms.push(own);
            }
            let node = internal_ref(graph, target);
            let pairs = delta
                .pairs
                .iter()
                .map(|&(child_tr, inst)| (node.core.owned(Some(child_tr)), inst))
                .collect();
            TransformDelta { transforms, pairs }
        }
        EventKind::TransformRemoved => {
            // Remap only; destruction happens after the event has been
            // forwarded all the way up.
            remap(internal_ref(graph, target), delta)
        }
        EventKind::TransformUpdated => {
            let forwarded = remap(internal_ref(graph, target), delta);
            for &own in &forwarded.transforms {
                shallow::transform::update(&graph.sh_transforms, own, backend);
            }
            forwarded
        }
        EventKind::GeometryAdded | EventKind::GeometryRemoved => {
            // The chain through this node already exists; only the terminal
            // geometry attachment changed below.
            remap(internal_ref(graph, target), delta)
        }
    };

    let parents = internal_ref(graph, target).parents.clone();
    for parent in parents {
        deliver_transform_event(graph, backend, parent, kind, &forwarded);
    }

    if kind == EventKind::TransformRemoved {
        for &child_tr in &delta.transforms {
            let own = internal_mut(graph, target).core.take_owned(Some(child_tr));
            destroy_sh_transform(graph, backend, own);
        }
    }
}

/// Rewrites a child-identity delta into this node's owned identities.
fn remap(node: &InternalNode, delta: &TransformDelta) -> TransformDelta {
    TransformDelta {
        transforms: delta
            .transforms
            .iter()
            .map(|&child_tr| node.core.owned(Some(child_tr)))
            .collect(),
        pairs: delta
            .pairs
            .iter()
            .map(|&(child_tr, inst)| (node.core.owned(Some(child_tr)), inst))
            .collect(),
    }
}

fn root_transform_event(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    kind: EventKind,
    delta: &TransformDelta,
) {
    match kind {
        EventKind::TransformAdded => {
            let (name, local) = {
                let root = root_mut(graph, target);
                (root.core.name().to_owned(), *root.core.local_to_world())
            };
            for &child_tr in &delta.transforms {
                let own = shallow::transform::create(
                    &mut graph.sh_transforms,
                    backend,
                    &name,
                    local,
                    Some(child_tr),
                );
                let root = match &mut graph.nodes[target] {
                    SceneNode::Root(root) => root,
                    _ => unreachable!(),
                };
                root.core.insert_owned(Some(child_tr), own);
                root.sh_group.add_transform(
                    &graph.sh_transforms,
                    &graph.sh_geometry_groups,
                    own,
                    backend,
                );
            }
            for &(child_tr, inst) in &delta.pairs {
                register_light(graph, backend, target, Some(child_tr), inst);
            }
        }
        EventKind::TransformRemoved => {
            let root = root_mut(graph, target);
            for &(_, inst) in &delta.pairs {
                root.lights.unregister(inst);
            }
            let mut detached = Vec::with_capacity(delta.transforms.len());
            for &child_tr in &delta.transforms {
                let root = match &mut graph.nodes[target] {
                    SceneNode::Root(root) => root,
                    _ => unreachable!(),
                };
                let own = root.core.take_owned(Some(child_tr));
                root.sh_group
                    .remove_transform(&graph.sh_transforms, own, backend);
                detached.push(own);
            }
            for own in detached {
                destroy_sh_transform(graph, backend, own);
            }
        }
        EventKind::TransformUpdated => {
            for &child_tr in &delta.transforms {
                let own = root_mut(graph, target).core.owned(Some(child_tr));
                shallow::transform::update(&graph.sh_transforms, own, backend);
            }
            for &(child_tr, inst) in &delta.pairs {
                let root = match &mut graph.nodes[target] {
                    SceneNode::Root(root) => root,
                    _ => unreachable!(),
                };
                let own = root.core.owned(Some(child_tr));
                let world = graph.sh_transforms[own].static_transform(backend);
                root.lights.update_transform(inst, world);
            }
            // Matrices changed under the top-level structure.
            let group = root_mut(graph, target).sh_group.backend_group();
            backend.mark_group_dirty(group);
        }
        EventKind::GeometryAdded => {
            for &child_tr in &delta.transforms {
                update_group_membership(graph, backend, target, Some(child_tr));
            }
            for &(child_tr, inst) in &delta.pairs {
                register_light(graph, backend, target, Some(child_tr), inst);
            }
        }
        EventKind::GeometryRemoved => {
            for &(_, inst) in &delta.pairs {
                root_mut(graph, target).lights.unregister(inst);
            }
            for &child_tr in &delta.transforms {
                update_group_membership(graph, backend, target, Some(child_tr));
            }
        }
    }
}

/// Re-evaluates the qualifying predicate of the root-owned transform for
/// `key` against the top-level group.
fn update_group_membership(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    key: Option<ShTransformKey>,
) {
    let root = match &mut graph.nodes[target] {
        SceneNode::Root(root) => root,
        _ => unreachable!(),
    };
    let own = root.core.owned(key);
    root.sh_group
        .update_transform(&graph.sh_transforms, &graph.sh_geometry_groups, own, backend);
}

/// Registers `inst` in the light registry under the world transform of the
/// root-owned transform for `key`. Double registration is fatal.
fn register_light(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    key: Option<ShTransformKey>,
    inst: GeometryInstanceKey,
) {
    let root = match &mut graph.nodes[target] {
        SceneNode::Root(root) => root,
        _ => unreachable!(),
    };
    let own = root.core.owned(key);
    let world = graph.sh_transforms[own].static_transform(backend);
    let template = graph.instances[inst].light_descriptor_template().clone();
    root.lights.register(inst, template, world);
}

/// Delivers a geometry-only event to `target`: a surface child gained or
/// lost instances with no transform change involved.
pub(crate) fn deliver_geometry_event(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    kind: EventKind,
    instances: &[GeometryInstanceKey],
) {
    debug_assert!(
        matches!(kind, EventKind::GeometryAdded | EventKind::GeometryRemoved),
        "geometry-only events carry geometry kinds, got {kind:?}"
    );
    log::trace!(
        "{kind:?} -> {}: {} instances",
        graph.nodes[target].name(),
        instances.len()
    );
    match &graph.nodes[target] {
        SceneNode::Surface(node) => {
            panic!("surface node {:?} cannot receive a geometry event", node.name)
        }
        SceneNode::Internal(_) => internal_geometry_event(graph, backend, target, kind, instances),
        SceneNode::Root(_) => root_geometry_event(graph, backend, target, kind, instances),
    }
}

fn internal_geometry_event(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    kind: EventKind,
    instances: &[GeometryInstanceKey],
) {
    if instances.is_empty() {
        return;
    }
    let (group_key, sentinel) = {
        let node = internal_ref(graph, target);
        (node.core.geometry_group(), node.core.sentinel())
    };

    // Only the empty/non-empty transition of the aggregate group is a
    // structural change above this node; intermediate count changes stay
    // local so the backend structure upstream is left untouched. What the
    // registry has been told still has to stay sound: the announced subset
    // of the group records exactly which instances travelled upward, and
    // removing an announced instance always forwards so the registry never
    // keeps a detached entry.
    let forwarded = match kind {
        EventKind::GeometryAdded => {
            let was_empty = graph.sh_geometry_groups[group_key].is_empty();
            for &inst in instances {
                let backend_instance = graph.instances[inst].backend_instance();
                graph.sh_geometry_groups[group_key].add_instance(inst, backend_instance, backend);
            }
            if was_empty {
                graph.sh_transforms[sentinel].set_child(Some(group_key));
                for &inst in instances {
                    graph.sh_geometry_groups[group_key].announce(inst);
                }
                Some(TransformDelta {
                    transforms: vec![sentinel],
                    pairs: instances.iter().map(|&inst| (sentinel, inst)).collect(),
                })
            } else {
                // Instances landing in an already populated group are
                // mirrored into the backend group only; the registry learns
                // about them on the next full replay.
                None
            }
        }
        EventKind::GeometryRemoved => {
            let mut retracted = Vec::new();
            for &inst in instances {
                let backend_instance = graph.instances[inst].backend_instance();
                graph.sh_geometry_groups[group_key].remove_instance(inst, backend_instance, backend);
                if graph.sh_geometry_groups[group_key].retract(inst) {
                    retracted.push(inst);
                }
            }
            let now_empty = graph.sh_geometry_groups[group_key].is_empty();
            if now_empty {
                graph.sh_transforms[sentinel].set_child(None);
            }
            if now_empty || !retracted.is_empty() {
                Some(TransformDelta {
                    transforms: vec![sentinel],
                    pairs: retracted.into_iter().map(|inst| (sentinel, inst)).collect(),
                })
            } else {
                None
            }
        }
        _ => unreachable!(),
    };

    if let Some(forwarded) = forwarded {
        let parents = internal_ref(graph, target).parents.clone();
        for parent in parents {
            deliver_transform_event(graph, backend, parent, kind, &forwarded);
        }
    }
}

fn root_geometry_event(
    graph: &mut SceneGraph,
    backend: &mut dyn AccelBackend,
    target: NodeKey,
    kind: EventKind,
    instances: &[GeometryInstanceKey],
) {
    if instances.is_empty() {
        return;
    }
    let (group_key, sentinel) = {
        let root = match &graph.nodes[target] {
            SceneNode::Root(root) => root,
            _ => unreachable!(),
        };
        (root.core.geometry_group(), root.core.sentinel())
    };

    match kind {
        EventKind::GeometryAdded => {
            let was_empty = graph.sh_geometry_groups[group_key].is_empty();
            for &inst in instances {
                let backend_instance = graph.instances[inst].backend_instance();
                graph.sh_geometry_groups[group_key].add_instance(inst, backend_instance, backend);
            }
            if was_empty {
                graph.sh_transforms[sentinel].set_child(Some(group_key));
            }
            update_group_membership(graph, backend, target, None);
            // The root registers unconditionally, so its direct group is
            // always fully announced.
            for &inst in instances {
                graph.sh_geometry_groups[group_key].announce(inst);
                register_light(graph, backend, target, None, inst);
            }
        }
        EventKind::GeometryRemoved => {
            for &inst in instances {
                root_mut(graph, target).lights.unregister(inst);
                let backend_instance = graph.instances[inst].backend_instance();
                graph.sh_geometry_groups[group_key].remove_instance(inst, backend_instance, backend);
                graph.sh_geometry_groups[group_key].retract(inst);
            }
            if graph.sh_geometry_groups[group_key].is_empty() {
                graph.sh_transforms[sentinel].set_child(None);
            }
            update_group_membership(graph, backend, target, None);
        }
        _ => unreachable!(),
    }
}
