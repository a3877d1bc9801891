//! Mirror geometry groups.

use crate::backend::{AccelBackend, GeometryGroupHandle, GeometryInstanceHandle};
use crate::graph::GeometryInstanceKey;

/// A set of geometry instances mirrored into one backend geometry group.
///
/// Every membership change is pushed straight to the backend and marks the
/// group's acceleration structure dirty, so the backend set always matches
/// the host set.
///
/// Next to the full membership the group tracks its *announced* subset: the
/// instances that have been carried upward in a delta and therefore exist in
/// the light registry. Removal and update deltas must be built from this
/// subset; referencing anything else upstream is a protocol violation.
#[derive(Debug)]
pub struct ShGeometryGroup {
    instances: Vec<GeometryInstanceKey>,
    announced: Vec<GeometryInstanceKey>,
    backend_group: GeometryGroupHandle,
}

impl ShGeometryGroup {
    #[must_use]
    pub fn new(backend: &mut dyn AccelBackend) -> Self {
        Self {
            instances: Vec::new(),
            announced: Vec::new(),
            backend_group: backend.create_geometry_group(),
        }
    }

    pub fn add_instance(
        &mut self,
        instance: GeometryInstanceKey,
        backend_instance: GeometryInstanceHandle,
        backend: &mut dyn AccelBackend,
    ) {
        assert!(
            !self.instances.contains(&instance),
            "{instance:?} is already in this geometry group"
        );
        self.instances.push(instance);
        backend.geometry_group_add_instance(self.backend_group, backend_instance);
        backend.mark_geometry_group_dirty(self.backend_group);
    }

    pub fn remove_instance(
        &mut self,
        instance: GeometryInstanceKey,
        backend_instance: GeometryInstanceHandle,
        backend: &mut dyn AccelBackend,
    ) {
        let pos = self
            .instances
            .iter()
            .position(|&i| i == instance)
            .unwrap_or_else(|| panic!("{instance:?} is not in this geometry group"));
        self.instances.remove(pos);
        backend.geometry_group_remove_instance(self.backend_group, backend_instance);
        backend.mark_geometry_group_dirty(self.backend_group);
    }

    /// Records that `instance` has been carried upward in a delta.
    pub fn announce(&mut self, instance: GeometryInstanceKey) {
        debug_assert!(self.instances.contains(&instance));
        assert!(
            !self.announced.contains(&instance),
            "{instance:?} is already announced"
        );
        self.announced.push(instance);
    }

    /// Drops `instance` from the announced subset; returns whether it was
    /// announced at all.
    pub fn retract(&mut self, instance: GeometryInstanceKey) -> bool {
        if let Some(pos) = self.announced.iter().position(|&i| i == instance) {
            self.announced.remove(pos);
            true
        } else {
            false
        }
    }

    /// Announces the full current membership, replacing the previous subset.
    /// Used when a replay delta carries the whole group upward.
    pub fn announce_all(&mut self) {
        self.announced = self.instances.clone();
    }

    pub fn clear_announced(&mut self) {
        self.announced.clear();
    }

    #[must_use]
    pub fn announced(&self) -> &[GeometryInstanceKey] {
        &self.announced
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    #[must_use]
    pub fn instance_at(&self, index: usize) -> GeometryInstanceKey {
        self.instances[index]
    }

    #[must_use]
    pub fn instances(&self) -> &[GeometryInstanceKey] {
        &self.instances
    }

    #[must_use]
    pub fn backend_group(&self) -> GeometryGroupHandle {
        self.backend_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tracking::TrackingBackend;
    use slotmap::SlotMap;

    fn setup() -> (
        TrackingBackend,
        ShGeometryGroup,
        Vec<GeometryInstanceKey>,
        Vec<GeometryInstanceHandle>,
    ) {
        let mut backend = TrackingBackend::new();
        let group = ShGeometryGroup::new(&mut backend);
        let mut arena: SlotMap<GeometryInstanceKey, ()> = SlotMap::with_key();
        let keys = vec![arena.insert(()), arena.insert(())];
        let handles = vec![
            backend.create_geometry_instance(),
            backend.create_geometry_instance(),
        ];
        (backend, group, keys, handles)
    }

    #[test]
    fn membership_mirrors_into_the_backend() {
        let (mut backend, mut group, keys, handles) = setup();

        group.add_instance(keys[0], handles[0], &mut backend);
        group.add_instance(keys[1], handles[1], &mut backend);
        assert_eq!(group.len(), 2);
        assert_eq!(group.instance_at(0), keys[0]);
        assert_eq!(group.instance_at(1), keys[1]);
        assert_eq!(
            backend.geometry_group_children(group.backend_group()),
            &[handles[0], handles[1]]
        );

        group.remove_instance(keys[0], handles[0], &mut backend);
        assert_eq!(group.instances(), &[keys[1]]);
        assert_eq!(
            backend.geometry_group_children(group.backend_group()),
            &[handles[1]]
        );
    }

    #[test]
    fn announced_subset_tracks_retractions() {
        let (mut backend, mut group, keys, handles) = setup();

        group.add_instance(keys[0], handles[0], &mut backend);
        group.announce(keys[0]);
        assert_eq!(group.announced(), &[keys[0]]);

        assert!(group.retract(keys[0]));
        assert!(!group.retract(keys[0]));
        assert!(group.announced().is_empty());

        group.add_instance(keys[1], handles[1], &mut backend);
        group.announce_all();
        assert_eq!(group.announced(), group.instances());
        group.clear_announced();
        assert!(group.announced().is_empty());
    }
}
