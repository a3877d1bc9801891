//! Mirror transform chains.

use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{MAX_CHAIN_DEPTH, ShGeometryGroupKey, ShTransformKey};
use crate::backend::{AccelBackend, TransformHandle};
use crate::transform::StaticTransform;

/// The single child slot of an [`ShTransform`].
///
/// A transform child is fixed at construction; a geometry child may be set
/// and cleared over the transform's lifetime, but never while a transform
/// child is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShChild {
    #[default]
    None,
    Transform(ShTransformKey),
    GeometryGroup(ShGeometryGroupKey),
}

/// One link of a flattened transform chain, owning its backend transform
/// object. The resolved (concatenated) world matrix lives on the backend
/// object and is recomputed eagerly whenever any link of the chain changes.
#[derive(Debug)]
pub struct ShTransform {
    name: String,
    transform: StaticTransform,
    child: ShChild,
    backend_transform: TransformHandle,
}

impl ShTransform {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn local_transform(&self) -> &StaticTransform {
        &self.transform
    }

    #[must_use]
    pub fn child(&self) -> ShChild {
        self.child
    }

    #[must_use]
    pub fn child_transform(&self) -> Option<ShTransformKey> {
        match self.child {
            ShChild::Transform(key) => Some(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn backend_transform(&self) -> TransformHandle {
        self.backend_transform
    }

    /// Attaches or detaches the terminal geometry group.
    ///
    /// Illegal while a child transform is set: a chain link either continues
    /// the chain or terminates it, never both.
    pub fn set_child(&mut self, geometry_group: Option<ShGeometryGroupKey>) {
        assert!(
            !matches!(self.child, ShChild::Transform(_)),
            "only a transform without a child transform can hold a geometry group"
        );
        self.child = match geometry_group {
            Some(key) => ShChild::GeometryGroup(key),
            None => ShChild::None,
        };
    }

    /// The resolved world transform, read back from the backend object.
    #[must_use]
    pub fn static_transform(&self, backend: &dyn AccelBackend) -> StaticTransform {
        let (forward, inverse) = backend.transform_matrix(self.backend_transform);
        StaticTransform::from_matrices(forward, inverse)
    }
}

/// Creates an `ShTransform`, optionally chained onto `child`, and resolves
/// its world matrix into the backend.
pub(crate) fn create(
    transforms: &mut SlotMap<ShTransformKey, ShTransform>,
    backend: &mut dyn AccelBackend,
    name: &str,
    local: StaticTransform,
    child: Option<ShTransformKey>,
) -> ShTransformKey {
    assert!(
        local.is_static(),
        "animated transforms are not implemented"
    );
    let backend_transform = backend.create_transform();
    let key = transforms.insert(ShTransform {
        name: name.to_owned(),
        transform: local,
        child: child.map_or(ShChild::None, ShChild::Transform),
        backend_transform,
    });
    resolve_world_transform(transforms, key, backend);
    key
}

/// Replaces the local transform and re-resolves the world matrix.
pub(crate) fn set_local_transform(
    transforms: &mut SlotMap<ShTransformKey, ShTransform>,
    key: ShTransformKey,
    local: StaticTransform,
    backend: &mut dyn AccelBackend,
) {
    assert!(
        local.is_static(),
        "animated transforms are not implemented"
    );
    transforms[key].transform = local;
    resolve_world_transform(transforms, key, backend);
}

/// Re-resolves the world matrix without changing the local transform. Used
/// when a transform further down the chain changed.
pub(crate) fn update(
    transforms: &SlotMap<ShTransformKey, ShTransform>,
    key: ShTransformKey,
    backend: &mut dyn AccelBackend,
) {
    resolve_world_transform(transforms, key, backend);
}

/// Walks the child chain and uploads the concatenated matrix (ancestor
/// applied after descendant) to the backend transform object.
fn resolve_world_transform(
    transforms: &SlotMap<ShTransformKey, ShTransform>,
    key: ShTransformKey,
    backend: &mut dyn AccelBackend,
) {
    let mut chain: SmallVec<[ShTransformKey; MAX_CHAIN_DEPTH]> = SmallVec::new();
    let mut next = transforms[key].child_transform();
    while let Some(link) = next {
        assert!(
            chain.len() < MAX_CHAIN_DEPTH,
            "transform chain exceeds the maximum depth of {MAX_CHAIN_DEPTH}"
        );
        chain.push(link);
        next = transforms[link].child_transform();
    }

    let mut resolved = transforms[key].transform;
    for &link in &chain {
        resolved = resolved * transforms[link].transform;
    }

    backend.transform_set_matrix(
        transforms[key].backend_transform,
        &resolved.forward_mat4(),
        &resolved.inverse_mat4(),
    );
}

/// Whether the chain starting at `key` reaches a geometry group, and which.
#[must_use]
pub(crate) fn has_geometry_descendant(
    transforms: &SlotMap<ShTransformKey, ShTransform>,
    key: ShTransformKey,
) -> Option<ShGeometryGroupKey> {
    let mut current = key;
    let mut depth = 0;
    loop {
        match transforms[current].child {
            ShChild::GeometryGroup(group) => return Some(group),
            ShChild::Transform(next) => {
                depth += 1;
                assert!(
                    depth <= MAX_CHAIN_DEPTH,
                    "transform chain exceeds the maximum depth of {MAX_CHAIN_DEPTH}"
                );
                current = next;
            }
            ShChild::None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tracking::TrackingBackend;
    use crate::shallow::ShGeometryGroup;
    use glam::{Mat4, Vec3};

    #[test]
    fn resolved_matrix_is_outer_to_inner_product() {
        let mut backend = TrackingBackend::new();
        let mut transforms = SlotMap::with_key();

        let inner = create(
            &mut transforms,
            &mut backend,
            "inner",
            StaticTransform::from_translation(Vec3::Y),
            None,
        );
        let outer = create(
            &mut transforms,
            &mut backend,
            "outer",
            StaticTransform::from_translation(Vec3::X),
            Some(inner),
        );

        let (forward, _) = backend.transform_matrix(transforms[outer].backend_transform());
        let expected = Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0));
        assert!((forward - expected).abs_diff_eq(Mat4::ZERO, 1e-5));
    }

    #[test]
    fn update_propagates_inner_change() {
        let mut backend = TrackingBackend::new();
        let mut transforms = SlotMap::with_key();

        let inner = create(
            &mut transforms,
            &mut backend,
            "inner",
            StaticTransform::from_translation(Vec3::Y),
            None,
        );
        let outer = create(
            &mut transforms,
            &mut backend,
            "outer",
            StaticTransform::from_translation(Vec3::X),
            Some(inner),
        );

        set_local_transform(
            &mut transforms,
            inner,
            StaticTransform::from_translation(Vec3::Z * 3.0),
            &mut backend,
        );
        update(&transforms, outer, &mut backend);

        let (forward, _) = backend.transform_matrix(transforms[outer].backend_transform());
        let expected = Mat4::from_translation(Vec3::new(1.0, 0.0, 3.0));
        assert!((forward - expected).abs_diff_eq(Mat4::ZERO, 1e-5));
    }

    #[test]
    #[should_panic(expected = "geometry group")]
    fn geometry_child_is_illegal_with_transform_child() {
        let mut backend = TrackingBackend::new();
        let mut transforms = SlotMap::with_key();
        let mut geometry_groups = SlotMap::with_key();

        let inner = create(
            &mut transforms,
            &mut backend,
            "inner",
            StaticTransform::IDENTITY,
            None,
        );
        let outer = create(
            &mut transforms,
            &mut backend,
            "outer",
            StaticTransform::IDENTITY,
            Some(inner),
        );
        let group = geometry_groups.insert(ShGeometryGroup::new(&mut backend));
        transforms[outer].set_child(Some(group));
    }

    #[test]
    fn descendant_walk_follows_chain() {
        let mut backend = TrackingBackend::new();
        let mut transforms = SlotMap::with_key();
        let mut geometry_groups: SlotMap<ShGeometryGroupKey, ShGeometryGroup> = SlotMap::with_key();

        let inner = create(
            &mut transforms,
            &mut backend,
            "inner",
            StaticTransform::IDENTITY,
            None,
        );
        let outer = create(
            &mut transforms,
            &mut backend,
            "outer",
            StaticTransform::IDENTITY,
            Some(inner),
        );

        assert!(has_geometry_descendant(&transforms, outer).is_none());

        let group = geometry_groups.insert(ShGeometryGroup::new(&mut backend));
        transforms[inner].set_child(Some(group));
        assert_eq!(has_geometry_descendant(&transforms, outer), Some(group));
    }
}
