//! EWA projection of one splat: 3D covariance to a screen-space conic, its
//! pixel extent, and per-pixel alpha.

use super::RasterOptions;
use crate::camera::ViewState;
use glam::{Vec2, Vec3};
use lcc::SymMat3;

/// Added to both diagonals of the 2D covariance (one-pixel low-pass).
pub const LOW_PASS: f32 = 0.3;
/// Guard band for the Jacobian, as a multiple of the FOV tangent.
pub const CLIP_MARGIN: f32 = 1.3;
/// Floor under the eigenvalue discriminant.
pub const EIGEN_FLOOR: f32 = 0.1;
pub const ALPHA_MAX: f32 = 0.99;
pub const ALPHA_MIN: f32 = 1.0 / 255.0;

/// Screen-space footprint of a visible splat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    /// Pixel coordinates, origin top-left.
    pub center: Vec2,
    /// Inverse 2D covariance as (xx, xy, yy).
    pub conic: Vec3,
    /// Half-extent in pixels (3 sigma along the major axis).
    pub radius: f32,
    /// Distance in front of the camera.
    pub depth: f32,
}

/// Projects a view-space covariance: `J·W·Σ·Wᵀ·Jᵀ` plus the low-pass term.
/// Returns (xx, xy, yy).
pub fn project_covariance(cov: &SymMat3, t: Vec3, view: &ViewState) -> [f32; 3] {
    let zp = -t.z;
    let lim_x = CLIP_MARGIN * view.tan_fovx;
    let lim_y = CLIP_MARGIN * view.tan_fovy;
    let x = (t.x / zp).clamp(-lim_x, lim_x) * zp;
    let y = (t.y / zp).clamp(-lim_y, lim_y) * zp;

    // Pixel mapping: px = cx + fx·x/zp, py = cy - fy·y/zp, with zp = -z.
    let (fx, fy) = (view.focal_x, view.focal_y);
    let zp2 = zp * zp;
    let j0 = Vec3::new(fx / zp, 0.0, fx * x / zp2);
    let j1 = Vec3::new(0.0, -fy / zp, -fy * y / zp2);

    // Rows of J·W, as world-space vectors.
    let w_t = view.view_rotation().transpose();
    let t0 = w_t * j0;
    let t1 = w_t * j1;

    let sigma = cov.to_mat3();
    let s0 = sigma * t0;
    let s1 = sigma * t1;
    [t0.dot(s0) + LOW_PASS, t0.dot(s1), t1.dot(s1) + LOW_PASS]
}

/// Inverts a 2D covariance and sizes its footprint. `None` for a singular
/// matrix.
pub fn conic_and_radius(cov2: [f32; 3]) -> Option<(Vec3, f32)> {
    let [xx, xy, yy] = cov2;
    let det = xx * yy - xy * xy;
    if det <= 0.0 || !det.is_finite() {
        return None;
    }
    let inv = 1.0 / det;
    let conic = Vec3::new(yy * inv, -xy * inv, xx * inv);

    let mid = 0.5 * (xx + yy);
    let disc = (mid * mid - det).max(EIGEN_FLOOR).sqrt();
    let lambda = (mid + disc).max(mid - disc);
    let radius = (3.0 * lambda.sqrt()).ceil();
    Some((conic, radius))
}

/// Full per-splat projection with culling.
pub fn project(
    position: Vec3,
    cov: &SymMat3,
    view: &ViewState,
    camera_position: Vec3,
    opts: &RasterOptions,
) -> Option<Footprint> {
    if let Some(r) = opts.cull_radius {
        if position.distance(camera_position) > r {
            return None;
        }
    }

    let t = view.view.transform_point3(position);
    let depth = -t.z;
    if depth <= opts.near_epsilon {
        return None;
    }

    let cov2 = project_covariance(cov, t, view);
    let (conic, radius) = conic_and_radius(cov2)?;
    let center = view.view_to_pixel(t)?;

    let size = view.viewport();
    if center.x + radius < 0.0
        || center.y + radius < 0.0
        || center.x - radius > size.x
        || center.y - radius > size.y
    {
        return None;
    }

    Some(Footprint {
        center,
        conic,
        radius,
        depth,
    })
}

/// Gaussian exponent at offset `d` from the center.
#[inline]
pub fn gaussian_power(conic: Vec3, d: Vec2) -> f32 {
    -0.5 * (conic.x * d.x * d.x + conic.z * d.y * d.y) - conic.y * d.x * d.y
}

/// Alpha contributed at offset `d`, or `None` if the fragment is skipped.
#[inline]
pub fn fragment_alpha(conic: Vec3, opacity: f32, d: Vec2) -> Option<f32> {
    let power = gaussian_power(conic, d);
    if power > 0.0 {
        return None;
    }
    let alpha = ALPHA_MAX.min(opacity * power.exp());
    (alpha >= ALPHA_MIN).then_some(alpha)
}
