//! Incrementally maintained scene hierarchy for a ray-tracing backend.
//!
//! A deep node tree (root, interior nodes, surface leaves) is kept mirrored
//! into a flattened shallow hierarchy the acceleration backend consumes:
//! per-chain resolved transforms, geometry-group membership and a top-level
//! group holding exactly the chains that reach geometry. Structural edits
//! propagate bottom-up as minimal deltas instead of rebuilding, and emissive
//! surfaces are tracked in a lazily flattened light registry with an
//! importance-sampling distribution.
//!
//! The backend itself (BVH build/refit, intersection) stays outside this
//! crate behind the [`AccelBackend`] trait; [`TrackingBackend`] is a
//! structural reference implementation used by the tests.

pub mod backend;
pub mod distribution;
pub mod errors;
pub mod geometry;
pub mod graph;
pub mod material;
pub mod scene;
pub mod shallow;
pub mod transform;

pub use backend::tracking::TrackingBackend;
pub use backend::AccelBackend;
pub use distribution::{ContinuousDistribution1d, ContinuousDistribution2d, DiscreteDistribution1d};
pub use errors::{Result, SceneError};
pub use geometry::{Triangle, Vertex};
pub use graph::{GeometryInstanceKey, NodeKey, SceneGraph};
pub use material::{BasicMaterial, SurfaceMaterial};
pub use scene::Scene;
pub use transform::StaticTransform;
