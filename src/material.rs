//! Material seam.
//!
//! Shading is evaluated elsewhere; this layer consumes exactly two facts
//! about a material: whether it emits, and an index used as an opaque key
//! into the external material table.

/// The two-fact material interface consumed by the scene layer.
pub trait SurfaceMaterial {
    /// Whether surfaces bound to this material emit light.
    fn is_emitting(&self) -> bool;

    /// Opaque index into the external material table.
    fn material_index(&self) -> u32;
}

/// A plain value implementation of [`SurfaceMaterial`].
#[derive(Debug, Clone, Copy)]
pub struct BasicMaterial {
    index: u32,
    emitting: bool,
}

impl BasicMaterial {
    #[must_use]
    pub fn new(index: u32, emitting: bool) -> Self {
        Self { index, emitting }
    }

    #[must_use]
    pub fn emitter(index: u32) -> Self {
        Self::new(index, true)
    }

    #[must_use]
    pub fn non_emitter(index: u32) -> Self {
        Self::new(index, false)
    }
}

impl SurfaceMaterial for BasicMaterial {
    fn is_emitting(&self) -> bool {
        self.emitting
    }

    fn material_index(&self) -> u32 {
        self.index
    }
}
