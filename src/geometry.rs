//! Surface geometry ingestion.
//!
//! Meshes enter the graph as a vertex pool per surface node plus one
//! geometry instance per material group; every instance carries the light
//! descriptor template the root fills in with a world transform when the
//! instance reaches a light path.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::backend::{AccelBackend, GeometryInstanceHandle};
use crate::distribution::{CompensatedSum, ContinuousDistribution2d, DiscreteDistribution1d};
use crate::errors::{Result, SceneError};
use crate::graph::event::{self, EventKind};
use crate::graph::light::{SampleFunction, SurfaceLightBody, SurfaceLightDescriptor};
use crate::graph::node::{SceneNode, SurfaceKind, SurfaceNode};
use crate::graph::{GeometryInstanceKey, NodeKey, SceneGraph};
use crate::material::SurfaceMaterial;
use crate::transform::StaticTransform;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3, normal: Vec3, tangent: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tangent,
            tex_coord,
        }
    }
}

/// Indices into a surface node's vertex pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    pub indices: [u32; 3],
}

/// One renderable unit: a material group of a mesh surface, or the infinite
/// sphere of an environment surface.
#[derive(Debug)]
pub struct GeometryInstance {
    backend_instance: GeometryInstanceHandle,
    triangles: Vec<Triangle>,
    light_template: SurfaceLightDescriptor,
}

impl GeometryInstance {
    #[must_use]
    pub(crate) fn backend_instance(&self) -> GeometryInstanceHandle {
        self.backend_instance
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[must_use]
    pub fn light_descriptor_template(&self) -> &SurfaceLightDescriptor {
        &self.light_template
    }

    /// Releases the per-instance backend objects. The vertex buffer is owned
    /// by the surface node, not the instance.
    pub(crate) fn release(self, backend: &mut dyn AccelBackend) {
        if let SurfaceLightBody::Mesh {
            triangle_buffer, ..
        } = &self.light_template.body
        {
            backend.destroy_buffer(*triangle_buffer);
        }
        backend.destroy_geometry_instance(self.backend_instance);
    }
}

impl SceneGraph {
    /// Replaces the vertex pool of a mesh surface node and uploads it.
    /// Must happen before any material group is added.
    pub fn set_vertices(
        &mut self,
        node: NodeKey,
        vertices: Vec<Vertex>,
        backend: &mut dyn AccelBackend,
    ) {
        let surface = match &mut self.nodes[node] {
            SceneNode::Surface(surface) => surface,
            other => panic!("{:?} is not a surface node", other.name()),
        };
        assert!(
            surface.instances.is_empty(),
            "vertices must be set before material groups"
        );
        let name = surface.name.clone();
        let SurfaceKind::TriangleMesh {
            vertices: stored,
            vertex_buffer,
        } = &mut surface.kind
        else {
            panic!("vertices apply only to triangle-mesh surfaces")
        };
        if let Some(old) = vertex_buffer.take() {
            backend.destroy_buffer(old);
        }
        *vertex_buffer = Some(backend.create_buffer(&format!("{name}.vertices"), vertices.len()));
        *stored = vertices;
    }

    /// Adds a material group over the node's vertex pool: validates the
    /// index list, creates the backend instance and index buffer, builds the
    /// per-primitive area distribution for emitters, and delivers the new
    /// instance to every current parent.
    pub fn add_material_group(
        &mut self,
        node: NodeKey,
        indices: &[u32],
        material: &dyn SurfaceMaterial,
        backend: &mut dyn AccelBackend,
    ) -> Result<GeometryInstanceKey> {
        let (name, vertex_buffer, triangles, areas) = {
            let surface = match &self.nodes[node] {
                SceneNode::Surface(surface) => surface,
                other => panic!("{:?} is not a surface node", other.name()),
            };
            let SurfaceKind::TriangleMesh {
                vertices,
                vertex_buffer,
            } = &surface.kind
            else {
                panic!("material groups apply only to triangle-mesh surfaces")
            };
            let Some(vertex_buffer) = *vertex_buffer else {
                return Err(SceneError::MissingVertices);
            };
            if indices.len() % 3 != 0 {
                return Err(SceneError::InvalidGeometry(format!(
                    "index count {} is not a multiple of 3",
                    indices.len()
                )));
            }
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
                return Err(SceneError::InvalidGeometry(format!(
                    "index {bad} is out of bounds for {} vertices",
                    vertices.len()
                )));
            }

            let mut triangles = Vec::with_capacity(indices.len() / 3);
            let mut areas = Vec::with_capacity(indices.len() / 3);
            let mut total = CompensatedSum::default();
            for tri in indices.chunks_exact(3) {
                let p0 = vertices[tri[0] as usize].position;
                let e1 = vertices[tri[1] as usize].position - p0;
                let e2 = vertices[tri[2] as usize].position - p0;
                let area = 0.5 * e1.cross(e2).length();
                areas.push(area);
                total.add(area);
                triangles.push(Triangle {
                    indices: [tri[0], tri[1], tri[2]],
                });
            }
            log::debug!(
                "material group on {:?}: {} triangles, total area {}",
                surface.name,
                triangles.len(),
                total.value()
            );
            (surface.name.clone(), vertex_buffer, triangles, areas)
        };

        let primitive_distribution = if material.is_emitting() {
            Some(Arc::new(DiscreteDistribution1d::new(&areas)?))
        } else {
            None
        };
        let triangle_buffer =
            backend.create_buffer(&format!("{name}.triangles"), triangles.len());
        let backend_instance = backend.create_geometry_instance();
        let light_template = SurfaceLightDescriptor {
            material_index: material.material_index(),
            sample_function: SampleFunction::TriangleMesh,
            importance: if material.is_emitting() { 1.0 } else { 0.0 },
            body: SurfaceLightBody::Mesh {
                vertex_buffer,
                triangle_buffer,
                primitive_distribution,
                world_transform: StaticTransform::IDENTITY,
            },
        };
        let key = self.instances.insert(GeometryInstance {
            backend_instance,
            triangles,
            light_template,
        });

        let parents = {
            let surface = match &mut self.nodes[node] {
                SceneNode::Surface(surface) => surface,
                _ => unreachable!(),
            };
            surface.instances.push(key);
            surface.parents.clone()
        };
        for parent in parents {
            event::deliver_geometry_event(self, backend, parent, EventKind::GeometryAdded, &[key]);
        }
        Ok(key)
    }

    /// Creates a detached environment surface: an infinite sphere with a
    /// single instance whose light body carries the 2D importance map.
    pub fn create_environment_surface_node(
        &mut self,
        name: &str,
        material: &dyn SurfaceMaterial,
        importance_map: Arc<ContinuousDistribution2d>,
        backend: &mut dyn AccelBackend,
    ) -> NodeKey {
        let backend_instance = backend.create_geometry_instance();
        let light_template = SurfaceLightDescriptor {
            material_index: material.material_index(),
            sample_function: SampleFunction::InfiniteSphere,
            importance: if material.is_emitting() { 1.0 } else { 0.0 },
            body: SurfaceLightBody::Environment { importance_map },
        };
        let inst = self.instances.insert(GeometryInstance {
            backend_instance,
            triangles: Vec::new(),
            light_template,
        });
        self.nodes.insert(SceneNode::Surface(SurfaceNode {
            name: name.to_owned(),
            parents: Vec::new(),
            instances: vec![inst],
            kind: SurfaceKind::InfiniteSphere,
        }))
    }

    #[must_use]
    pub fn geometry_instance(&self, key: GeometryInstanceKey) -> &GeometryInstance {
        &self.instances[key]
    }
}
