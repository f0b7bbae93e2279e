//! Procedural scenes, packed and decoded through the real codec so they
//! carry the same quantization as scenes read from disk.

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use lcc::{decode_with, encode_level, metadata_for, AxisAdapter, Scene, SplatRecord};

/// Decodes `records` as a one-level Basic scene.
pub fn scene_from_records(records: Vec<SplatRecord>, axes: &AxisAdapter) -> Result<Scene> {
    let levels = vec![records];
    let meta = metadata_for("synthetic", &levels, None);
    let scale_range = meta.scale_range()?;
    let bytes = encode_level(&levels[0], &scale_range);
    decode_with(&meta, &bytes, 0, 0, axes).context("decoding synthetic scene")
}

/// `n` splats on a Fibonacci sphere of radius 2, source frame Z-up.
/// Deterministic: the same `n` always yields the same scene.
pub fn sphere_records(n: usize) -> Vec<SplatRecord> {
    let golden = std::f32::consts::PI * (3.0 - 5f32.sqrt());
    let splat_size = (8.0 / (n.max(1) as f32).sqrt()).clamp(0.005, 0.3);

    (0..n)
        .map(|i| {
            let t = (i as f32 + 0.5) / n as f32;
            let z = 1.0 - 2.0 * t;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let phi = golden * i as f32;
            let normal = Vec3::new(r * phi.cos(), r * phi.sin(), z);

            // Flat discs tangent to the sphere.
            let rotation = Quat::from_rotation_arc(Vec3::Z, normal);
            SplatRecord {
                position: normal * 2.0,
                color: normal * 0.5 + Vec3::splat(0.5),
                opacity: 0.8,
                scale: Vec3::new(splat_size, splat_size, splat_size * 0.1),
                rotation,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_scene_decodes() {
        let scene = scene_from_records(sphere_records(500), &AxisAdapter::default()).unwrap();
        assert_eq!(scene.len(), 500);
        for p in scene.positions() {
            assert!((p.length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn empty_sphere_is_empty_scene() {
        let scene = scene_from_records(sphere_records(0), &AxisAdapter::IDENTITY).unwrap();
        assert!(scene.is_empty());
    }
}
