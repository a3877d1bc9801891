//! Scene entry point.
//!
//! Wraps the graph with environment-light state and the pre-render
//! synchronization step that publishes the top-level group, the flattened
//! light table and the importance distribution to the backend.

use std::sync::Arc;

use crate::backend::AccelBackend;
use crate::distribution::ContinuousDistribution2d;
use crate::errors::Result;
use crate::geometry::Vertex;
use crate::graph::light::{SampleFunction, SurfaceLightBody, SurfaceLightDescriptor};
use crate::graph::{GeometryInstanceKey, NodeKey, SceneGraph};
use crate::material::SurfaceMaterial;
use crate::transform::StaticTransform;

#[derive(Debug, Clone)]
struct EnvironmentLight {
    material_index: u32,
    importance_map: Arc<ContinuousDistribution2d>,
}

/// A scene: one rooted hierarchy plus optional environment lighting.
///
/// Every mutating operation takes the acceleration backend explicitly;
/// nothing here is process-global, so multiple scenes over multiple backends
/// can coexist.
#[derive(Debug)]
pub struct Scene {
    graph: SceneGraph,
    environment: Option<EnvironmentLight>,
}

impl Scene {
    #[must_use]
    pub fn new(backend: &mut dyn AccelBackend) -> Self {
        Self {
            graph: SceneGraph::new(backend),
            environment: None,
        }
    }

    #[must_use]
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    #[must_use]
    pub fn root(&self) -> NodeKey {
        self.graph.root()
    }

    // === Construction ===

    pub fn create_internal_node(
        &mut self,
        name: &str,
        local_to_world: StaticTransform,
        backend: &mut dyn AccelBackend,
    ) -> NodeKey {
        self.graph.create_internal_node(name, local_to_world, backend)
    }

    pub fn create_mesh_surface_node(&mut self, name: &str) -> NodeKey {
        self.graph.create_mesh_surface_node(name)
    }

    pub fn set_vertices(
        &mut self,
        node: NodeKey,
        vertices: Vec<Vertex>,
        backend: &mut dyn AccelBackend,
    ) {
        self.graph.set_vertices(node, vertices, backend);
    }

    pub fn add_material_group(
        &mut self,
        node: NodeKey,
        indices: &[u32],
        material: &dyn SurfaceMaterial,
        backend: &mut dyn AccelBackend,
    ) -> Result<GeometryInstanceKey> {
        self.graph.add_material_group(node, indices, material, backend)
    }

    pub fn create_environment_surface_node(
        &mut self,
        name: &str,
        material: &dyn SurfaceMaterial,
        importance_map: Arc<ContinuousDistribution2d>,
        backend: &mut dyn AccelBackend,
    ) -> NodeKey {
        self.graph
            .create_environment_surface_node(name, material, importance_map, backend)
    }

    // === Structure ===

    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey, backend: &mut dyn AccelBackend) {
        self.graph.add_child(parent, child, backend);
    }

    pub fn remove_child(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        backend: &mut dyn AccelBackend,
    ) {
        self.graph.remove_child(parent, child, backend);
    }

    pub fn set_transform(
        &mut self,
        node: NodeKey,
        local_to_world: StaticTransform,
        backend: &mut dyn AccelBackend,
    ) {
        self.graph.set_node_transform(node, local_to_world, backend);
    }

    pub fn destroy_node(&mut self, node: NodeKey, backend: &mut dyn AccelBackend) {
        self.graph.destroy_node(node, backend);
    }

    // === Environment ===

    /// Installs the environment light published at the next
    /// [`set`](Self::set).
    pub fn set_environment(
        &mut self,
        material: &dyn SurfaceMaterial,
        importance_map: Arc<ContinuousDistribution2d>,
    ) {
        self.environment = Some(EnvironmentLight {
            material_index: material.material_index(),
            importance_map,
        });
    }

    pub fn clear_environment(&mut self) {
        self.environment = None;
    }

    #[must_use]
    pub fn has_environment(&self) -> bool {
        self.environment.is_some()
    }

    // === Synchronization ===

    /// Pushes all accumulated structure to the backend for the next render
    /// pass: the top-level group, the lazily flattened light table with its
    /// importance distribution, and the optional environment descriptor.
    pub fn set(&mut self, backend: &mut dyn AccelBackend) {
        let root = self.graph.root_node_mut();
        backend.set_top_group(root.sh_group.backend_group());

        root.lights.flatten(backend);
        backend.set_light_importance_distribution(root.lights.distribution());

        match &self.environment {
            Some(environment) => {
                let descriptor = SurfaceLightDescriptor {
                    material_index: environment.material_index,
                    sample_function: SampleFunction::InfiniteSphere,
                    importance: 1.0,
                    body: SurfaceLightBody::Environment {
                        importance_map: environment.importance_map.clone(),
                    },
                };
                backend.set_environment_light(Some(&descriptor));
            }
            None => backend.set_environment_light(None),
        }
    }
}
