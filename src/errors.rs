//! Error Types
//!
//! Recoverable errors exist only at the data-ingestion boundary: geometry
//! handed in by the caller and sampling-table construction. Violations of
//! the propagation protocol's invariants (unknown delta keys, double light
//! registration, illegal child combinations) are caller bugs and abort via
//! assertions instead of surfacing here.

use thiserror::Error;

/// The main error type for the scene layer.
#[derive(Error, Debug)]
pub enum SceneError {
    // ========================================================================
    // Geometry Ingestion Errors
    // ========================================================================
    /// Mesh index data is malformed (not triangles, or out of bounds).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A surface node was given material groups before any vertices.
    #[error("Vertices must be set before adding a material group")]
    MissingVertices,

    // ========================================================================
    // Sampling Table Errors
    // ========================================================================
    /// A sampling distribution was built from an empty weight list.
    #[error("Distribution requires at least one weight")]
    EmptyDistribution,

    /// A sampling distribution was given a negative weight.
    #[error("Distribution weight at index {index} is negative: {value}")]
    NegativeWeight {
        /// Index of the offending weight
        index: usize,
        /// The weight value
        value: f32,
    },

    /// A 2D distribution was given a weight buffer that does not match its
    /// declared dimensions.
    #[error("Distribution weight buffer has {got} entries, expected {expected}")]
    DimensionMismatch {
        /// Actual length
        got: usize,
        /// `width * height`
        expected: usize,
    },
}

/// Alias for `Result<T, SceneError>`.
pub type Result<T> = std::result::Result<T, SceneError>;
