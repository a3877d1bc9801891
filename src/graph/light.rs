//! Surface-light registry.
//!
//! Every geometry instance on a light path is exactly one entry here. The
//! registry is mutated eagerly by the propagation protocol and flattened
//! lazily: the backend table and the importance distribution are rebuilt on
//! the next synchronization request, not on every edit.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::backend::{AccelBackend, BufferHandle};
use crate::distribution::{ContinuousDistribution2d, DiscreteDistribution1d};
use crate::graph::GeometryInstanceKey;
use crate::transform::StaticTransform;

/// Opaque reference to a backend-callable sampling function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFunction {
    TriangleMesh,
    InfiniteSphere,
}

/// Geometry-kind-specific payload of a light descriptor.
#[derive(Debug, Clone)]
pub enum SurfaceLightBody {
    Mesh {
        vertex_buffer: BufferHandle,
        triangle_buffer: BufferHandle,
        /// Per-primitive area distribution; present only for emitters.
        primitive_distribution: Option<Arc<DiscreteDistribution1d>>,
        /// Concatenated world transform of the instance's chain.
        world_transform: StaticTransform,
    },
    Environment {
        importance_map: Arc<ContinuousDistribution2d>,
    },
}

/// One entry of the light registry, also the element type of the flattened
/// backend table.
#[derive(Debug, Clone)]
pub struct SurfaceLightDescriptor {
    pub material_index: u32,
    pub sample_function: SampleFunction,
    /// Selection weight for light importance sampling. Currently binary:
    /// 1 for emitters, 0 otherwise. TODO: area/power-weighted importance.
    pub importance: f32,
    pub body: SurfaceLightBody,
}

impl SurfaceLightDescriptor {
    /// The stored world transform, if this light kind carries one.
    #[must_use]
    pub fn world_transform(&self) -> Option<&StaticTransform> {
        match &self.body {
            SurfaceLightBody::Mesh { world_transform, .. } => Some(world_transform),
            SurfaceLightBody::Environment { .. } => None,
        }
    }

    fn set_world_transform(&mut self, transform: StaticTransform) {
        if let SurfaceLightBody::Mesh { world_transform, .. } = &mut self.body {
            *world_transform = transform;
        }
    }
}

/// Map from geometry-instance identity to light descriptor, plus the lazily
/// rebuilt flattened state.
#[derive(Debug, Default)]
pub struct LightRegistry {
    lights: FxHashMap<GeometryInstanceKey, SurfaceLightDescriptor>,
    dirty: bool,
    distribution: Option<DiscreteDistribution1d>,
    table: Option<BufferHandle>,
}

impl LightRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor for `instance` with its world transform filled
    /// in. An instance is referenced by at most one light path; registering
    /// it twice is a protocol bug.
    pub fn register(
        &mut self,
        instance: GeometryInstanceKey,
        mut descriptor: SurfaceLightDescriptor,
        world_transform: StaticTransform,
    ) {
        assert!(
            !self.lights.contains_key(&instance),
            "surface light cannot be instanced: {instance:?} is already registered"
        );
        descriptor.set_world_transform(world_transform);
        self.lights.insert(instance, descriptor);
        self.dirty = true;
    }

    /// Removes the entry for `instance`. Fatal if absent.
    pub fn unregister(&mut self, instance: GeometryInstanceKey) {
        self.lights
            .remove(&instance)
            .unwrap_or_else(|| panic!("{instance:?} is not a registered surface light"));
        self.dirty = true;
    }

    /// Stores a recomputed world transform into an existing entry. Fatal if
    /// absent.
    pub fn update_transform(
        &mut self,
        instance: GeometryInstanceKey,
        world_transform: StaticTransform,
    ) {
        let descriptor = self
            .lights
            .get_mut(&instance)
            .unwrap_or_else(|| panic!("{instance:?} is not a registered surface light"));
        descriptor.set_world_transform(world_transform);
        self.dirty = true;
    }

    #[must_use]
    pub fn contains(&self, instance: GeometryInstanceKey) -> bool {
        self.lights.contains_key(&instance)
    }

    #[must_use]
    pub fn get(&self, instance: GeometryInstanceKey) -> Option<&SurfaceLightDescriptor> {
        self.lights.get(&instance)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn instances(&self) -> impl Iterator<Item = GeometryInstanceKey> + '_ {
        self.lights.keys().copied()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The importance distribution over the flattened table, once built.
    #[must_use]
    pub fn distribution(&self) -> Option<&DiscreteDistribution1d> {
        self.distribution.as_ref()
    }

    #[must_use]
    pub fn table_buffer(&self) -> Option<BufferHandle> {
        self.table
    }

    /// Flattens the registry into a backend buffer and rebuilds the
    /// importance distribution. No-op when the registry is already clean.
    pub fn flatten(&mut self, backend: &mut dyn AccelBackend) {
        if !self.dirty {
            return;
        }

        if let Some(old) = self.table.take() {
            backend.destroy_buffer(old);
        }

        let descriptors: Vec<SurfaceLightDescriptor> = self.lights.values().cloned().collect();
        let importances: Vec<f32> = descriptors.iter().map(|d| d.importance).collect();

        self.table = Some(backend.upload_light_table(&descriptors));
        self.distribution = if importances.is_empty() {
            None
        } else {
            Some(
                DiscreteDistribution1d::new(&importances)
                    .expect("importances are non-negative by construction"),
            )
        };
        self.dirty = false;

        log::debug!("light table rebuilt with {} entries", descriptors.len());
    }
}
