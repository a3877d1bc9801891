//! A structural reference backend.
//!
//! `TrackingBackend` keeps an exact mirror of every group, transform,
//! geometry group and instance it is asked to create, counts acceleration
//! dirty-marks, and can dump the hierarchy for debugging. It performs no
//! intersection work; it exists so the bookkeeping invariants of the scene
//! layer can be observed and tested without a GPU.

use glam::Mat4;
use slotmap::SlotMap;

use super::{
    AccelBackend, BufferHandle, GeometryGroupHandle, GeometryInstanceHandle, GroupChild,
    GroupHandle, TransformHandle,
};
use crate::distribution::DiscreteDistribution1d;
use crate::graph::light::SurfaceLightDescriptor;

#[derive(Debug, Default)]
struct GroupRecord {
    children: Vec<GroupChild>,
    dirty_marks: u32,
}

#[derive(Debug)]
struct TransformRecord {
    child: Option<GeometryGroupHandle>,
    forward: Mat4,
    inverse: Mat4,
}

impl Default for TransformRecord {
    fn default() -> Self {
        Self {
            child: None,
            forward: Mat4::IDENTITY,
            inverse: Mat4::IDENTITY,
        }
    }
}

#[derive(Debug, Default)]
struct GeometryGroupRecord {
    children: Vec<GeometryInstanceHandle>,
    dirty_marks: u32,
}

#[derive(Debug)]
struct BufferRecord {
    label: String,
    len: usize,
}

/// Mirror-only implementation of [`AccelBackend`].
#[derive(Debug, Default)]
pub struct TrackingBackend {
    groups: SlotMap<GroupHandle, GroupRecord>,
    transforms: SlotMap<TransformHandle, TransformRecord>,
    geometry_groups: SlotMap<GeometryGroupHandle, GeometryGroupRecord>,
    instances: SlotMap<GeometryInstanceHandle, ()>,
    buffers: SlotMap<BufferHandle, BufferRecord>,

    top_group: Option<GroupHandle>,
    light_table: Vec<SurfaceLightDescriptor>,
    light_distribution: Option<DiscreteDistribution1d>,
    environment_light: Option<SurfaceLightDescriptor>,
}

impl TrackingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Inspection (for tests and debugging) ===

    #[must_use]
    pub fn group_children(&self, group: GroupHandle) -> &[GroupChild] {
        &self.groups[group].children
    }

    #[must_use]
    pub fn group_dirty_marks(&self, group: GroupHandle) -> u32 {
        self.groups[group].dirty_marks
    }

    #[must_use]
    pub fn geometry_group_children(&self, group: GeometryGroupHandle) -> &[GeometryInstanceHandle] {
        &self.geometry_groups[group].children
    }

    #[must_use]
    pub fn geometry_group_dirty_marks(&self, group: GeometryGroupHandle) -> u32 {
        self.geometry_groups[group].dirty_marks
    }

    #[must_use]
    pub fn top_group(&self) -> Option<GroupHandle> {
        self.top_group
    }

    #[must_use]
    pub fn light_table(&self) -> &[SurfaceLightDescriptor] {
        &self.light_table
    }

    #[must_use]
    pub fn light_distribution(&self) -> Option<&DiscreteDistribution1d> {
        self.light_distribution.as_ref()
    }

    #[must_use]
    pub fn environment_light(&self) -> Option<&SurfaceLightDescriptor> {
        self.environment_light.as_ref()
    }

    #[must_use]
    pub fn live_transform_count(&self) -> usize {
        self.transforms.len()
    }

    #[must_use]
    pub fn buffer_len(&self, buffer: BufferHandle) -> usize {
        self.buffers[buffer].len
    }

    #[must_use]
    pub fn buffer_label(&self, buffer: BufferHandle) -> &str {
        &self.buffers[buffer].label
    }

    /// Logs the mirrored hierarchy under the top group, one line per object.
    pub fn dump_hierarchy(&self) {
        let Some(top) = self.top_group else {
            log::debug!("no top group set");
            return;
        };
        log::debug!("group {top:?} ({} dirty marks)", self.groups[top].dirty_marks);
        for child in &self.groups[top].children {
            match *child {
                GroupChild::Transform(tr) => {
                    let rec = &self.transforms[tr];
                    log::debug!("- transform {tr:?} child {:?}", rec.child);
                    if let Some(gg) = rec.child {
                        self.dump_geometry_group(gg, 2);
                    }
                }
                GroupChild::GeometryGroup(gg) => self.dump_geometry_group(gg, 1),
            }
        }
    }

    fn dump_geometry_group(&self, group: GeometryGroupHandle, depth: usize) {
        let rec = &self.geometry_groups[group];
        let indent = "  ".repeat(depth);
        log::debug!(
            "{indent}geometry group {group:?} ({} dirty marks)",
            rec.dirty_marks
        );
        for inst in &rec.children {
            log::debug!("{indent}- instance {inst:?}");
        }
    }
}

impl AccelBackend for TrackingBackend {
    fn create_group(&mut self) -> GroupHandle {
        self.groups.insert(GroupRecord::default())
    }

    fn create_transform(&mut self) -> TransformHandle {
        self.transforms.insert(TransformRecord::default())
    }

    fn create_geometry_group(&mut self) -> GeometryGroupHandle {
        self.geometry_groups.insert(GeometryGroupRecord::default())
    }

    fn create_geometry_instance(&mut self) -> GeometryInstanceHandle {
        self.instances.insert(())
    }

    fn create_buffer(&mut self, label: &str, len: usize) -> BufferHandle {
        self.buffers.insert(BufferRecord {
            label: label.to_owned(),
            len,
        })
    }

    fn group_add_transform(&mut self, group: GroupHandle, child: TransformHandle) {
        let children = &mut self.groups[group].children;
        let child = GroupChild::Transform(child);
        assert!(
            !children.contains(&child),
            "{child:?} is already a child of {group:?}"
        );
        children.push(child);
    }

    fn group_remove_transform(&mut self, group: GroupHandle, child: TransformHandle) {
        let children = &mut self.groups[group].children;
        let child = GroupChild::Transform(child);
        let pos = children
            .iter()
            .position(|&c| c == child)
            .unwrap_or_else(|| panic!("{child:?} is not a child of {group:?}"));
        children.remove(pos);
    }

    fn group_add_geometry_group(&mut self, group: GroupHandle, child: GeometryGroupHandle) {
        let children = &mut self.groups[group].children;
        let child = GroupChild::GeometryGroup(child);
        assert!(
            !children.contains(&child),
            "{child:?} is already a child of {group:?}"
        );
        children.push(child);
    }

    fn group_remove_geometry_group(&mut self, group: GroupHandle, child: GeometryGroupHandle) {
        let children = &mut self.groups[group].children;
        let child = GroupChild::GeometryGroup(child);
        let pos = children
            .iter()
            .position(|&c| c == child)
            .unwrap_or_else(|| panic!("{child:?} is not a child of {group:?}"));
        children.remove(pos);
    }

    fn transform_set_child(
        &mut self,
        transform: TransformHandle,
        child: Option<GeometryGroupHandle>,
    ) {
        self.transforms[transform].child = child;
    }

    fn transform_child(&self, transform: TransformHandle) -> Option<GeometryGroupHandle> {
        self.transforms[transform].child
    }

    fn transform_set_matrix(&mut self, transform: TransformHandle, forward: &Mat4, inverse: &Mat4) {
        let rec = &mut self.transforms[transform];
        rec.forward = *forward;
        rec.inverse = *inverse;
    }

    fn transform_matrix(&self, transform: TransformHandle) -> (Mat4, Mat4) {
        let rec = &self.transforms[transform];
        (rec.forward, rec.inverse)
    }

    fn geometry_group_add_instance(
        &mut self,
        group: GeometryGroupHandle,
        child: GeometryInstanceHandle,
    ) {
        let children = &mut self.geometry_groups[group].children;
        assert!(
            !children.contains(&child),
            "{child:?} is already a child of {group:?}"
        );
        children.push(child);
    }

    fn geometry_group_remove_instance(
        &mut self,
        group: GeometryGroupHandle,
        child: GeometryInstanceHandle,
    ) {
        let children = &mut self.geometry_groups[group].children;
        let pos = children
            .iter()
            .position(|&c| c == child)
            .unwrap_or_else(|| panic!("{child:?} is not a child of {group:?}"));
        children.remove(pos);
    }

    fn mark_group_dirty(&mut self, group: GroupHandle) {
        self.groups[group].dirty_marks += 1;
    }

    fn mark_geometry_group_dirty(&mut self, group: GeometryGroupHandle) {
        self.geometry_groups[group].dirty_marks += 1;
    }

    fn destroy_transform(&mut self, transform: TransformHandle) {
        let still_referenced = self
            .groups
            .values()
            .any(|g| g.children.contains(&GroupChild::Transform(transform)));
        assert!(
            !still_referenced,
            "{transform:?} destroyed while still attached to a group"
        );
        self.transforms
            .remove(transform)
            .expect("unknown transform handle");
    }

    fn destroy_geometry_group(&mut self, group: GeometryGroupHandle) {
        let still_referenced = self
            .groups
            .values()
            .any(|g| g.children.contains(&GroupChild::GeometryGroup(group)))
            || self.transforms.values().any(|t| t.child == Some(group));
        assert!(
            !still_referenced,
            "{group:?} destroyed while still attached to a container"
        );
        self.geometry_groups
            .remove(group)
            .expect("unknown geometry group handle");
    }

    fn destroy_geometry_instance(&mut self, instance: GeometryInstanceHandle) {
        let still_referenced = self
            .geometry_groups
            .values()
            .any(|g| g.children.contains(&instance));
        assert!(
            !still_referenced,
            "{instance:?} destroyed while still attached to a geometry group"
        );
        self.instances
            .remove(instance)
            .expect("unknown geometry instance handle");
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer).expect("unknown buffer handle");
    }

    fn set_top_group(&mut self, group: GroupHandle) {
        self.top_group = Some(group);
    }

    fn upload_light_table(&mut self, descriptors: &[SurfaceLightDescriptor]) -> BufferHandle {
        self.light_table = descriptors.to_vec();
        self.buffers.insert(BufferRecord {
            label: "surface-light-table".to_owned(),
            len: descriptors.len(),
        })
    }

    fn set_light_importance_distribution(&mut self, distribution: Option<&DiscreteDistribution1d>) {
        self.light_distribution = distribution.cloned();
    }

    fn set_environment_light(&mut self, light: Option<&SurfaceLightDescriptor>) {
        self.environment_light = light.cloned();
    }
}
