//! Symmetric 3x3 covariance storage and construction from scale + rotation.

use glam::{Mat3, Quat, Vec3};

/// Upper triangle of a symmetric 3x3 matrix: `[xx, xy, xz, yy, yz, zz]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SymMat3 {
    pub xx: f32,
    pub xy: f32,
    pub xz: f32,
    pub yy: f32,
    pub yz: f32,
    pub zz: f32,
}

impl SymMat3 {
    #[inline]
    pub fn from_array(a: [f32; 6]) -> Self {
        Self {
            xx: a[0],
            xy: a[1],
            xz: a[2],
            yy: a[3],
            yz: a[4],
            zz: a[5],
        }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 6] {
        [self.xx, self.xy, self.xz, self.yy, self.yz, self.zz]
    }

    /// Reads the upper triangle of `m`.
    #[inline]
    pub fn from_mat3(m: &Mat3) -> Self {
        Self {
            xx: m.x_axis.x,
            xy: m.y_axis.x,
            xz: m.z_axis.x,
            yy: m.y_axis.y,
            yz: m.z_axis.y,
            zz: m.z_axis.z,
        }
    }

    #[inline]
    pub fn to_mat3(self) -> Mat3 {
        Mat3::from_cols(
            Vec3::new(self.xx, self.xy, self.xz),
            Vec3::new(self.xy, self.yy, self.yz),
            Vec3::new(self.xz, self.yz, self.zz),
        )
    }

    /// `m · self · mᵀ`.
    #[inline]
    pub fn conjugate(self, m: &Mat3) -> Self {
        Self::from_mat3(&(*m * self.to_mat3() * m.transpose()))
    }

    /// Eigenvalues in ascending order (closed-form, symmetric case).
    pub fn eigenvalues(self) -> [f32; 3] {
        let p1 = self.xy * self.xy + self.xz * self.xz + self.yz * self.yz;
        if p1 == 0.0 {
            let mut d = [self.xx, self.yy, self.zz];
            d.sort_by(f32::total_cmp);
            return d;
        }

        let q = (self.xx + self.yy + self.zz) / 3.0;
        let p2 = (self.xx - q).powi(2) + (self.yy - q).powi(2) + (self.zz - q).powi(2) + 2.0 * p1;
        let p = (p2 / 6.0).sqrt();

        let b = (self.to_mat3() - Mat3::from_diagonal(Vec3::splat(q))) * (1.0 / p);
        let r = (b.determinant() / 2.0).clamp(-1.0, 1.0);
        let phi = r.acos() / 3.0;

        let e1 = q + 2.0 * p * phi.cos();
        let e3 = q + 2.0 * p * (phi + 2.0 * std::f32::consts::PI / 3.0).cos();
        let e2 = 3.0 * q - e1 - e3;
        [e3, e2, e1]
    }
}

/// Σ = Mᵀ·M with M = diag(scale)·Rᵀ, i.e. R·S²·Rᵀ for the rotation `q`.
pub fn covariance_from_scale_rotation(scale: Vec3, rotation: Quat) -> SymMat3 {
    let m = Mat3::from_diagonal(scale) * Mat3::from_quat(rotation).transpose();
    SymMat3::from_mat3(&(m.transpose() * m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_rotation_gives_squared_scales() {
        let c = covariance_from_scale_rotation(Vec3::new(2.0, 1.0, 0.5), Quat::IDENTITY);
        assert_relative_eq!(c.xx, 4.0, epsilon = 1e-6);
        assert_relative_eq!(c.yy, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.zz, 0.25, epsilon = 1e-6);
        assert_relative_eq!(c.xy, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn rotation_moves_the_major_axis() {
        // 90 degrees about z: the x extent becomes the y extent.
        let q = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let c = covariance_from_scale_rotation(Vec3::new(3.0, 1.0, 1.0), q);
        assert_relative_eq!(c.xx, 1.0, epsilon = 1e-5);
        assert_relative_eq!(c.yy, 9.0, epsilon = 1e-5);
    }

    #[test]
    fn eigenvalues_match_squared_scales() {
        let q = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 2.0);
        let c = covariance_from_scale_rotation(Vec3::new(0.5, 2.0, 1.0), q);
        let e = c.eigenvalues();
        assert_relative_eq!(e[0], 0.25, epsilon = 1e-4);
        assert_relative_eq!(e[1], 1.0, epsilon = 1e-4);
        assert_relative_eq!(e[2], 4.0, epsilon = 1e-4);
    }

    #[test]
    fn conjugate_by_identity_is_noop() {
        let c = SymMat3::from_array([1.0, 0.2, 0.3, 2.0, 0.4, 3.0]);
        assert_eq!(c.conjugate(&Mat3::IDENTITY), c);
        assert_eq!(SymMat3::from_mat3(&c.to_mat3()), c);
    }
}
