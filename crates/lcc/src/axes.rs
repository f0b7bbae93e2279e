//! Source-to-consumer coordinate convention.
//!
//! LCC scenes are authored Z-up; consumers here are Y-up. The conversion is a
//! single signed permutation `P` applied once at ingestion to positions,
//! rotations, covariances and the bounding box. Nothing else in the
//! workspace swaps axes.

use crate::covariance::SymMat3;
use crate::meta::BoundingBox;
use glam::{Mat3, Quat, Vec3};

/// A signed axis permutation: `out[i] = sign[i] * in[perm[i]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisAdapter {
    perm: [usize; 3],
    sign: [f32; 3],
}

impl AxisAdapter {
    pub const IDENTITY: AxisAdapter = AxisAdapter {
        perm: [0, 1, 2],
        sign: [1.0, 1.0, 1.0],
    };

    /// `(x, y, z) -> (x, z, -y)`, a proper rotation of -90 degrees about X.
    pub const Z_UP_TO_Y_UP: AxisAdapter = AxisAdapter {
        perm: [0, 2, 1],
        sign: [1.0, 1.0, -1.0],
    };

    /// Returns `None` unless `perm` is a permutation of 0..3 and every sign
    /// is +1 or -1.
    pub fn new(perm: [usize; 3], sign: [f32; 3]) -> Option<Self> {
        let mut seen = [false; 3];
        for &p in &perm {
            if p > 2 || seen[p] {
                return None;
            }
            seen[p] = true;
        }
        if sign.iter().any(|s| s.abs() != 1.0) {
            return None;
        }
        Some(Self { perm, sign })
    }

    /// `P` as a matrix.
    pub fn matrix(&self) -> Mat3 {
        let mut rows = [Vec3::ZERO; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            row[self.perm[i]] = self.sign[i];
        }
        Mat3::from_cols(rows[0], rows[1], rows[2]).transpose()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// `P·v`.
    #[inline]
    pub fn apply(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.sign[0] * v[self.perm[0]],
            self.sign[1] * v[self.perm[1]],
            self.sign[2] * v[self.perm[2]],
        )
    }

    /// `Pᵀ·v`, mapping a consumer-frame direction back to the source frame.
    #[inline]
    pub fn unapply(&self, v: Vec3) -> Vec3 {
        let mut out = Vec3::ZERO;
        for i in 0..3 {
            out[self.perm[i]] = self.sign[i] * v[i];
        }
        out
    }

    /// `P·Σ·Pᵀ`.
    #[inline]
    pub fn apply_covariance(&self, cov: SymMat3) -> SymMat3 {
        cov.conjugate(&self.matrix())
    }

    /// Rotation seen from the consumer frame. For an improper `P` the
    /// rotation uses `-P`, which yields the same conjugated covariance.
    pub fn apply_rotation(&self, q: Quat) -> Quat {
        let p = self.matrix();
        let proper = if p.determinant() < 0.0 { p * -1.0 } else { p };
        (Quat::from_mat3(&proper) * q).normalize()
    }

    /// Axis-aligned box around the transformed corners.
    pub fn apply_bounds(&self, b: &BoundingBox) -> BoundingBox {
        let a = self.apply(b.min_v());
        let c = self.apply(b.max_v());
        BoundingBox {
            min: a.min(c).to_array(),
            max: a.max(c).to_array(),
        }
    }
}

impl Default for AxisAdapter {
    fn default() -> Self {
        Self::Z_UP_TO_Y_UP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::covariance_from_scale_rotation;
    use approx::assert_relative_eq;

    fn assert_sym_eq(a: SymMat3, b: SymMat3) {
        for (x, y) in a.to_array().iter().zip(b.to_array()) {
            assert_relative_eq!(*x, y, epsilon = 1e-5);
        }
    }

    #[test]
    fn z_up_maps_up_to_y() {
        let p = AxisAdapter::Z_UP_TO_Y_UP;
        assert_eq!(p.apply(Vec3::Z), Vec3::Y);
        assert_eq!(p.apply(Vec3::Y), -Vec3::Z);
        assert_eq!(p.matrix() * Vec3::new(1.0, 2.0, 3.0), p.apply(Vec3::new(1.0, 2.0, 3.0)));
        assert_relative_eq!(p.matrix().determinant(), 1.0);
    }

    #[test]
    fn unapply_inverts_apply() {
        let p = AxisAdapter::new([2, 0, 1], [-1.0, 1.0, -1.0]).unwrap();
        let v = Vec3::new(0.3, -4.0, 7.5);
        assert_eq!(p.unapply(p.apply(v)), v);
    }

    #[test]
    fn rejects_non_permutations() {
        assert!(AxisAdapter::new([0, 0, 1], [1.0; 3]).is_none());
        assert!(AxisAdapter::new([0, 1, 3], [1.0; 3]).is_none());
        assert!(AxisAdapter::new([0, 1, 2], [1.0, 0.5, 1.0]).is_none());
    }

    #[test]
    fn rotated_covariance_matches_conjugation() {
        let scale = Vec3::new(0.2, 1.5, 0.7);
        let q = Quat::from_euler(glam::EulerRot::ZYX, 0.4, 1.2, -0.8);
        let source = covariance_from_scale_rotation(scale, q);

        for p in [
            AxisAdapter::Z_UP_TO_Y_UP,
            AxisAdapter::new([1, 0, 2], [1.0, 1.0, 1.0]).unwrap(), // improper
            AxisAdapter::new([2, 1, 0], [-1.0, 1.0, 1.0]).unwrap(),
        ] {
            let conjugated = p.apply_covariance(source);
            let rebuilt = covariance_from_scale_rotation(scale, p.apply_rotation(q));
            assert_sym_eq(conjugated, rebuilt);
        }
    }

    #[test]
    fn bounds_stay_ordered() {
        let b = BoundingBox {
            min: [-1.0, -2.0, 0.0],
            max: [1.0, 2.0, 5.0],
        };
        let out = AxisAdapter::Z_UP_TO_Y_UP.apply_bounds(&b);
        assert_eq!(out.min, [-1.0, 0.0, -2.0]);
        assert_eq!(out.max, [1.0, 5.0, 2.0]);
    }
}
