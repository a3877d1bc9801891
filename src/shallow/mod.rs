//! Shallow hierarchy: the flattened mirror of the scene graph that the
//! acceleration backend actually sees.
//!
//! The deep node tree ([`crate::graph`]) never reaches the backend. Instead,
//! every path from the root to a piece of geometry is flattened into one
//! [`ShTransform`] chain whose concatenated matrix is kept resolved eagerly,
//! and the backend's top-level group holds exactly the chains that terminate
//! in geometry. [`ShGroup`] enforces that invariant; [`ShGeometryGroup`]
//! mirrors instance membership and acceleration dirtiness.
//!
//! All entities live in slotmap arenas owned by the scene graph; functions
//! here borrow the arenas they need explicitly.

pub mod geometry_group;
pub mod group;
pub mod transform;

pub use geometry_group::ShGeometryGroup;
pub use group::ShGroup;
pub use transform::{ShChild, ShTransform};

use slotmap::new_key_type;

new_key_type! {
    /// Arena key for an [`ShTransform`].
    pub struct ShTransformKey;
    /// Arena key for an [`ShGeometryGroup`].
    pub struct ShGeometryGroupKey;
}

/// Maximum number of chained child transforms below any [`ShTransform`].
/// A deeper chain is a fatal configuration error.
pub const MAX_CHAIN_DEPTH: usize = 5;
