//! The backend-visible top-level container.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::transform::has_geometry_descendant;
use super::{ShGeometryGroup, ShGeometryGroupKey, ShTransform, ShTransformKey};
use crate::backend::{AccelBackend, GroupHandle};

/// The single top-level mirror container.
///
/// Holds bookkeeping for every registered transform chain plus any geometry
/// groups parented directly to the root, and maintains the invariant that
/// the backend group's children are exactly the registered transforms that
/// currently have a geometry descendant, plus the direct geometry groups.
/// Transforms without geometry must never reach the backend group: they
/// would be wasteful (or invalid) acceleration nodes.
#[derive(Debug)]
pub struct ShGroup {
    /// Registered transforms and whether each one counted as a backend
    /// child when last evaluated.
    transforms: FxHashMap<ShTransformKey, bool>,
    geometry_groups: Vec<ShGeometryGroupKey>,
    backend_group: GroupHandle,
    num_valid_transforms: u32,
}

impl ShGroup {
    #[must_use]
    pub fn new(backend: &mut dyn AccelBackend) -> Self {
        Self {
            transforms: FxHashMap::default(),
            geometry_groups: Vec::new(),
            backend_group: backend.create_group(),
            num_valid_transforms: 0,
        }
    }

    /// Registers `transform`; if it currently has a geometry descendant it
    /// becomes a backend child immediately.
    pub fn add_transform(
        &mut self,
        transforms: &SlotMap<ShTransformKey, ShTransform>,
        geometry_groups: &SlotMap<ShGeometryGroupKey, ShGeometryGroup>,
        transform: ShTransformKey,
        backend: &mut dyn AccelBackend,
    ) {
        let descendant = has_geometry_descendant(transforms, transform);
        self.transforms.insert(transform, descendant.is_some());
        if let Some(group) = descendant {
            self.attach(transforms, geometry_groups, transform, group, backend);
        }
    }

    /// Unregisters `transform`, detaching it from the backend group if it was
    /// a qualifying child. Fatal if the transform was never registered.
    pub fn remove_transform(
        &mut self,
        transforms: &SlotMap<ShTransformKey, ShTransform>,
        transform: ShTransformKey,
        backend: &mut dyn AccelBackend,
    ) {
        let was_valid = self
            .transforms
            .remove(&transform)
            .unwrap_or_else(|| panic!("{transform:?} is not a child of this group"));
        if was_valid {
            backend.group_remove_transform(self.backend_group, transforms[transform].backend_transform());
            backend.mark_group_dirty(self.backend_group);
            self.num_valid_transforms -= 1;
        }
    }

    /// Re-evaluates the qualifying predicate for `transform` and attaches or
    /// detaches it if the predicate flipped. This is how geometry changes
    /// deep in the tree surface at the top level without a rebuild.
    pub fn update_transform(
        &mut self,
        transforms: &SlotMap<ShTransformKey, ShTransform>,
        geometry_groups: &SlotMap<ShGeometryGroupKey, ShGeometryGroup>,
        transform: ShTransformKey,
        backend: &mut dyn AccelBackend,
    ) {
        assert!(
            self.transforms.contains_key(&transform),
            "{transform:?} is not a child of this group"
        );
        let was_valid = self.transforms[&transform];
        let descendant = has_geometry_descendant(transforms, transform);

        if was_valid && descendant.is_none() {
            backend.group_remove_transform(self.backend_group, transforms[transform].backend_transform());
            backend.mark_group_dirty(self.backend_group);
            self.transforms.insert(transform, false);
            self.num_valid_transforms -= 1;
        } else if !was_valid && let Some(group) = descendant {
            self.attach(transforms, geometry_groups, transform, group, backend);
        }
    }

    fn attach(
        &mut self,
        transforms: &SlotMap<ShTransformKey, ShTransform>,
        geometry_groups: &SlotMap<ShGeometryGroupKey, ShGeometryGroup>,
        transform: ShTransformKey,
        descendant: ShGeometryGroupKey,
        backend: &mut dyn AccelBackend,
    ) {
        let backend_transform = transforms[transform].backend_transform();
        backend.transform_set_child(backend_transform, Some(geometry_groups[descendant].backend_group()));
        assert!(
            backend.transform_child(backend_transform).is_some(),
            "backend transform must have a child"
        );
        backend.group_add_transform(self.backend_group, backend_transform);
        backend.mark_group_dirty(self.backend_group);
        self.transforms.insert(transform, true);
        self.num_valid_transforms += 1;
        log::trace!("transform {transform:?} attached to the top-level group");
    }

    /// Adds a geometry group parented directly to the root.
    pub fn add_geometry_group(
        &mut self,
        geometry_groups: &SlotMap<ShGeometryGroupKey, ShGeometryGroup>,
        group: ShGeometryGroupKey,
        backend: &mut dyn AccelBackend,
    ) {
        self.geometry_groups.push(group);
        backend.group_add_geometry_group(self.backend_group, geometry_groups[group].backend_group());
        backend.mark_group_dirty(self.backend_group);
    }

    pub fn remove_geometry_group(
        &mut self,
        geometry_groups: &SlotMap<ShGeometryGroupKey, ShGeometryGroup>,
        group: ShGeometryGroupKey,
        backend: &mut dyn AccelBackend,
    ) {
        let pos = self
            .geometry_groups
            .iter()
            .position(|&g| g == group)
            .unwrap_or_else(|| panic!("{group:?} is not a child of this group"));
        self.geometry_groups.remove(pos);
        backend.group_remove_geometry_group(self.backend_group, geometry_groups[group].backend_group());
        backend.mark_group_dirty(self.backend_group);
    }

    #[must_use]
    pub fn contains_transform(&self, transform: ShTransformKey) -> bool {
        self.transforms.contains_key(&transform)
    }

    /// Registered transforms that are currently backend children.
    pub fn qualifying_transforms(&self) -> impl Iterator<Item = ShTransformKey> + '_ {
        self.transforms
            .iter()
            .filter_map(|(&key, &valid)| valid.then_some(key))
    }

    #[must_use]
    pub fn valid_transform_count(&self) -> u32 {
        self.num_valid_transforms
    }

    #[must_use]
    pub fn backend_group(&self) -> GroupHandle {
        self.backend_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tracking::TrackingBackend;
    use crate::shallow::transform::create;
    use crate::transform::StaticTransform;

    #[test]
    fn backend_children_match_the_qualifying_predicate() {
        let mut backend = TrackingBackend::new();
        let mut transforms = SlotMap::with_key();
        let mut geometry_groups: SlotMap<ShGeometryGroupKey, ShGeometryGroup> =
            SlotMap::with_key();
        let mut group = ShGroup::new(&mut backend);

        let bare = create(
            &mut transforms,
            &mut backend,
            "bare",
            StaticTransform::IDENTITY,
            None,
        );
        let loaded = create(
            &mut transforms,
            &mut backend,
            "loaded",
            StaticTransform::IDENTITY,
            None,
        );
        let geometry = geometry_groups.insert(ShGeometryGroup::new(&mut backend));
        transforms[loaded].set_child(Some(geometry));

        group.add_transform(&transforms, &geometry_groups, bare, &mut backend);
        group.add_transform(&transforms, &geometry_groups, loaded, &mut backend);

        assert!(group.contains_transform(bare));
        assert!(group.contains_transform(loaded));
        let qualifying: Vec<_> = group.qualifying_transforms().collect();
        assert_eq!(qualifying, vec![loaded]);
        assert_eq!(group.valid_transform_count(), 1);
        assert_eq!(backend.group_children(group.backend_group()).len(), 1);

        // Losing the geometry flips the predicate on the next update.
        transforms[loaded].set_child(None);
        group.update_transform(&transforms, &geometry_groups, loaded, &mut backend);
        assert_eq!(group.qualifying_transforms().count(), 0);
        assert_eq!(group.valid_transform_count(), 0);
        assert!(group.contains_transform(loaded));
        assert!(backend.group_children(group.backend_group()).is_empty());
    }
}
