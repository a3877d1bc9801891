//! Static rigid/affine transforms.
//!
//! The acceleration backend consumes transforms as a forward/inverse matrix
//! pair, so the inverse is computed once at construction and carried along
//! instead of being recomputed at every mirror update.

use glam::{Affine3A, Mat4, Quat, Vec3};

/// An immutable local-to-world transform with a cached inverse.
///
/// Only static (non-animated) transforms are supported. The hierarchy layer
/// calls [`StaticTransform::is_static`] before treating a transform as such;
/// the animated branch does not exist yet and is a fatal configuration error
/// if ever reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticTransform {
    forward: Affine3A,
    inverse: Affine3A,
}

impl StaticTransform {
    pub const IDENTITY: Self = Self {
        forward: Affine3A::IDENTITY,
        inverse: Affine3A::IDENTITY,
    };

    #[must_use]
    pub fn new(forward: Affine3A) -> Self {
        Self {
            forward,
            inverse: forward.inverse(),
        }
    }

    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(Affine3A::from_translation(translation))
    }

    #[must_use]
    pub fn from_scale_rotation_translation(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        Self::new(Affine3A::from_scale_rotation_translation(
            scale,
            rotation,
            translation,
        ))
    }

    /// Rebuilds from a forward/inverse pair previously handed to the backend.
    #[must_use]
    pub fn from_matrices(forward: Mat4, inverse: Mat4) -> Self {
        Self {
            forward: Affine3A::from_mat4(forward),
            inverse: Affine3A::from_mat4(inverse),
        }
    }

    /// Whether this transform is constant over time.
    ///
    /// Always true today; animated transforms are not implemented.
    #[must_use]
    pub fn is_static(&self) -> bool {
        true
    }

    #[inline]
    #[must_use]
    pub fn forward(&self) -> &Affine3A {
        &self.forward
    }

    #[inline]
    #[must_use]
    pub fn inverse(&self) -> &Affine3A {
        &self.inverse
    }

    /// Forward matrix in the `Mat4` form the backend's `set_matrix` takes.
    #[inline]
    #[must_use]
    pub fn forward_mat4(&self) -> Mat4 {
        Mat4::from(self.forward)
    }

    #[inline]
    #[must_use]
    pub fn inverse_mat4(&self) -> Mat4 {
        Mat4::from(self.inverse)
    }
}

impl Default for StaticTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for StaticTransform {
    type Output = Self;

    /// Composition: `(a * b)` applies `b` first, then `a`.
    fn mul(self, rhs: Self) -> Self {
        Self {
            forward: self.forward * rhs.forward,
            // (A B)^-1 = B^-1 A^-1
            inverse: rhs.inverse * self.inverse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_round_trip() {
        let t = StaticTransform::from_translation(Vec3::new(3.0, -2.0, 5.0));
        let p = Vec3::new(1.0, 1.0, 1.0);
        let q = t.inverse().transform_point3(t.forward().transform_point3(p));
        assert!((q - p).length() < 1e-5);
    }

    #[test]
    fn composition_applies_rhs_first() {
        let a = StaticTransform::from_translation(Vec3::X);
        let b = StaticTransform::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::IDENTITY,
            Vec3::ZERO,
        );
        let c = a * b;
        let p = c.forward().transform_point3(Vec3::ONE);
        assert!((p - Vec3::new(3.0, 2.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn composed_inverse_matches() {
        let a = StaticTransform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let b = StaticTransform::from_scale_rotation_translation(
            Vec3::splat(0.5),
            Quat::from_rotation_y(1.0),
            Vec3::new(-1.0, 0.0, 4.0),
        );
        let c = a * b;
        let p = Vec3::new(0.3, -0.7, 2.0);
        let q = c.inverse().transform_point3(c.forward().transform_point3(p));
        assert!((q - p).length() < 1e-4);
    }
}
