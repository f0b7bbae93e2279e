//! View-dependent color from degree 1..3 real spherical harmonics.

use glam::Vec3;
use lcc::ShCoeffs;

const C1: f32 = 0.488_602_52;
const C2: [f32; 5] = [
    1.092_548_4,
    -1.092_548_4,
    0.315_391_57,
    -1.092_548_4,
    0.546_274_2,
];
const C3: [f32; 7] = [
    -0.590_043_6,
    2.890_611_4,
    -0.457_045_8,
    0.373_176_34,
    -0.457_045_8,
    1.445_305_7,
    -0.590_043_6,
];

/// Sum of the higher-order bands for unit direction `dir`.
pub fn eval_rest(coeffs: &ShCoeffs, dir: Vec3) -> Vec3 {
    let c = |i: usize| Vec3::from_array(coeffs[i]);
    let (x, y, z) = (dir.x, dir.y, dir.z);
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);

    let mut out = C1 * (-y * c(0) + z * c(1) - x * c(2));

    out += C2[0] * xy * c(3)
        + C2[1] * yz * c(4)
        + C2[2] * (2.0 * zz - xx - yy) * c(5)
        + C2[3] * xz * c(6)
        + C2[4] * (xx - yy) * c(7);

    out += C3[0] * y * (3.0 * xx - yy) * c(8)
        + C3[1] * xy * z * c(9)
        + C3[2] * y * (4.0 * zz - xx - yy) * c(10)
        + C3[3] * z * (2.0 * zz - 3.0 * xx - 3.0 * yy) * c(11)
        + C3[4] * x * (4.0 * zz - xx - yy) * c(12)
        + C3[5] * z * (xx - yy) * c(13)
        + C3[6] * x * (xx - 3.0 * yy) * c(14);

    out
}

/// Base color plus the view-dependent term, clamped to [0, 1].
#[inline]
pub fn shade(base: Vec3, coeffs: &ShCoeffs, dir: Vec3) -> Vec3 {
    (base + eval_rest(coeffs, dir)).clamp(Vec3::ZERO, Vec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lcc::SH_COEFFS;

    #[test]
    fn zero_coefficients_leave_base_color() {
        let zero = [[0.0; 3]; SH_COEFFS];
        let base = Vec3::new(0.2, 0.4, 0.6);
        assert_eq!(shade(base, &zero, Vec3::Z), base);
    }

    #[test]
    fn degree_one_flips_with_direction() {
        let mut coeffs = [[0.0; 3]; SH_COEFFS];
        coeffs[1] = [1.0, 0.0, 0.0];
        let up = eval_rest(&coeffs, Vec3::Z);
        let down = eval_rest(&coeffs, -Vec3::Z);
        assert_relative_eq!(up.x, C1);
        assert_relative_eq!(down.x, -C1);
    }

    #[test]
    fn result_is_clamped() {
        let coeffs = [[10.0; 3]; SH_COEFFS];
        let c = shade(Vec3::splat(0.5), &coeffs, Vec3::new(0.0, 0.6, 0.8));
        assert!(c.cmpge(Vec3::ZERO).all() && c.cmple(Vec3::ONE).all());
    }
}
