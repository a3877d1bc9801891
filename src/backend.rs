//! Acceleration-backend interface.
//!
//! The spatial-acceleration engine (BVH build/refit and primitive
//! intersection) lives outside this crate. The scene layer only needs the
//! capability set below: opaque group / transform / geometry-group /
//! geometry-instance objects with child edits, matrix upload, and
//! dirty-marking of the acceleration structure that hangs off a container.
//!
//! Backend objects are addressed by slotmap handles; the backend owns the
//! objects, the scene layer owns the structure. All calls are synchronous
//! and must come from the thread that owns the scene graph.

pub mod tracking;

use glam::Mat4;
use slotmap::new_key_type;

use crate::distribution::DiscreteDistribution1d;
use crate::graph::light::SurfaceLightDescriptor;

new_key_type! {
    /// Handle to a backend top-level group object.
    pub struct GroupHandle;
    /// Handle to a backend transform object.
    pub struct TransformHandle;
    /// Handle to a backend geometry-group object.
    pub struct GeometryGroupHandle;
    /// Handle to a backend geometry-instance object.
    pub struct GeometryInstanceHandle;
    /// Handle to a backend data buffer.
    pub struct BufferHandle;
}

/// A child of a backend group object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupChild {
    Transform(TransformHandle),
    GeometryGroup(GeometryGroupHandle),
}

/// The capability set the scene layer consumes from the acceleration engine.
///
/// Passing a stale or foreign handle is a caller bug; implementations are
/// expected to abort rather than recover.
pub trait AccelBackend {
    // === Object creation ===
    fn create_group(&mut self) -> GroupHandle;
    fn create_transform(&mut self) -> TransformHandle;
    fn create_geometry_group(&mut self) -> GeometryGroupHandle;
    fn create_geometry_instance(&mut self) -> GeometryInstanceHandle;
    fn create_buffer(&mut self, label: &str, len: usize) -> BufferHandle;

    // === Group children ===
    fn group_add_transform(&mut self, group: GroupHandle, child: TransformHandle);
    fn group_remove_transform(&mut self, group: GroupHandle, child: TransformHandle);
    fn group_add_geometry_group(&mut self, group: GroupHandle, child: GeometryGroupHandle);
    fn group_remove_geometry_group(&mut self, group: GroupHandle, child: GeometryGroupHandle);

    // === Transform objects ===
    fn transform_set_child(
        &mut self,
        transform: TransformHandle,
        child: Option<GeometryGroupHandle>,
    );
    fn transform_child(&self, transform: TransformHandle) -> Option<GeometryGroupHandle>;
    fn transform_set_matrix(&mut self, transform: TransformHandle, forward: &Mat4, inverse: &Mat4);
    /// Returns the `(forward, inverse)` pair last uploaded.
    fn transform_matrix(&self, transform: TransformHandle) -> (Mat4, Mat4);

    // === Geometry-group children ===
    fn geometry_group_add_instance(
        &mut self,
        group: GeometryGroupHandle,
        child: GeometryInstanceHandle,
    );
    fn geometry_group_remove_instance(
        &mut self,
        group: GeometryGroupHandle,
        child: GeometryInstanceHandle,
    );

    // === Acceleration dirtiness ===
    fn mark_group_dirty(&mut self, group: GroupHandle);
    fn mark_geometry_group_dirty(&mut self, group: GeometryGroupHandle);

    // === Teardown ===
    /// Destroying an object still referenced by a container is a caller bug;
    /// detach first.
    fn destroy_transform(&mut self, transform: TransformHandle);
    fn destroy_geometry_group(&mut self, group: GeometryGroupHandle);
    fn destroy_geometry_instance(&mut self, instance: GeometryInstanceHandle);
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // === Render-pass publication ===
    fn set_top_group(&mut self, group: GroupHandle);
    fn upload_light_table(&mut self, descriptors: &[SurfaceLightDescriptor]) -> BufferHandle;
    /// Publishes the selection distribution over the last uploaded light
    /// table. `None` means the scene currently has no lights.
    fn set_light_importance_distribution(&mut self, distribution: Option<&DiscreteDistribution1d>);
    fn set_environment_light(&mut self, light: Option<&SurfaceLightDescriptor>);
}
