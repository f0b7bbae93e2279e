//! Decoding one LOD level of `data.bin` into typed attribute buffers.

use crate::axes::AxisAdapter;
use crate::covariance::{covariance_from_scale_rotation, SymMat3};
use crate::error::{LccError, Result};
use crate::meta::{BoundingBox, ByteRange, Metadata, Range3, RECORD_SIZE};
use crate::record::PackedRecord;
use crate::sh::ShCoeffs;
use glam::{Quat, Vec3};
use rayon::prelude::*;
use std::sync::Arc;

/// A decoded LOD level. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Scene {
    level: usize,
    axes: AxisAdapter,
    bounding_box: BoundingBox,
    positions: Arc<[Vec3]>,
    colors: Vec<Vec3>,
    opacities: Vec<f32>,
    scales: Vec<Vec3>,
    rotations: Vec<Quat>,
    cov3ds: Vec<SymMat3>,
    spherical_harmonics: Option<Vec<ShCoeffs>>,
}

/// Borrowed view of one splat.
#[derive(Debug, Clone, Copy)]
pub struct Splat<'a> {
    pub position: Vec3,
    pub color: Vec3,
    pub opacity: f32,
    pub scale: Vec3,
    pub rotation: Quat,
    pub cov3d: SymMat3,
    pub sh: Option<&'a ShCoeffs>,
}

struct Decoded {
    position: Vec3,
    color: Vec3,
    opacity: f32,
    scale: Vec3,
    rotation: Quat,
    cov3d: SymMat3,
}

/// Decodes `level` without changing the coordinate convention.
///
/// `buffer` holds bytes of `data.bin` starting at `buffer_base_offset`; it
/// must cover the whole level span.
pub fn decode(
    meta: &Metadata,
    buffer: &[u8],
    buffer_base_offset: u64,
    level: usize,
) -> Result<Scene> {
    decode_with(meta, buffer, buffer_base_offset, level, &AxisAdapter::IDENTITY)
}

/// Decodes `level`, mapping every position, rotation, covariance and the
/// bounding box through `axes`.
pub fn decode_with(
    meta: &Metadata,
    buffer: &[u8],
    buffer_base_offset: u64,
    level: usize,
    axes: &AxisAdapter,
) -> Result<Scene> {
    meta.validate()?;
    let span = meta.level_span(level)?;
    let scale_range = meta.scale_range()?;

    let window = checked_window(buffer, buffer_base_offset, span)?;
    let count = (span.length / RECORD_SIZE) as usize;
    let available = buffer_base_offset + buffer.len() as u64;

    let decoded: Vec<Decoded> = (0..count)
        .into_par_iter()
        .map(|i| {
            let at = i * RECORD_SIZE as usize;
            let rec: &[u8; 32] = window
                .get(at..at + RECORD_SIZE as usize)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| LccError::Truncated {
                    needed: span.offset + at as u64 + RECORD_SIZE,
                    available,
                })?;
            Ok(decode_record(&PackedRecord::parse(rec), &scale_range, axes))
        })
        .collect::<Result<_>>()?;

    let mut positions = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(count);
    let mut opacities = Vec::with_capacity(count);
    let mut scales = Vec::with_capacity(count);
    let mut rotations = Vec::with_capacity(count);
    let mut cov3ds = Vec::with_capacity(count);

    for d in decoded {
        positions.push(d.position);
        colors.push(d.color);
        opacities.push(d.opacity);
        scales.push(d.scale);
        rotations.push(d.rotation);
        cov3ds.push(d.cov3d);
    }

    log::debug!(
        "LCC level {}: {} splats, bytes {}..{}",
        level,
        count,
        span.offset,
        span.offset + span.length
    );

    Ok(Scene {
        level,
        axes: *axes,
        bounding_box: axes.apply_bounds(&meta.bounding_box),
        positions: positions.into(),
        colors,
        opacities,
        scales,
        rotations,
        cov3ds,
        spherical_harmonics: None,
    })
}

fn decode_record(rec: &PackedRecord, scale_range: &Range3, axes: &AxisAdapter) -> Decoded {
    let scale = rec.scale(scale_range);
    let rotation = rec.rotation();
    let cov3d = covariance_from_scale_rotation(scale, rotation);

    if axes.is_identity() {
        return Decoded {
            position: rec.position(),
            color: rec.color(),
            opacity: rec.opacity(),
            scale,
            rotation,
            cov3d,
        };
    }

    Decoded {
        position: axes.apply(rec.position()),
        color: rec.color(),
        opacity: rec.opacity(),
        scale,
        rotation: axes.apply_rotation(rotation),
        cov3d: axes.apply_covariance(cov3d),
    }
}

/// The slice of `buffer` covering `span`, or `Truncated` if the buffer does
/// not contain all of it.
pub(crate) fn checked_window(buffer: &[u8], base: u64, span: ByteRange) -> Result<&[u8]> {
    let available = base.saturating_add(buffer.len() as u64);
    let truncated = || LccError::Truncated {
        needed: span.end().unwrap_or(u64::MAX),
        available,
    };

    let start = span.offset.checked_sub(base).ok_or_else(truncated)?;
    let end = start.checked_add(span.length).ok_or_else(truncated)?;
    let start = usize::try_from(start).map_err(|_| truncated())?;
    let end = usize::try_from(end).map_err(|_| truncated())?;

    buffer.get(start..end).ok_or_else(truncated)
}

impl Scene {
    /// Attaches SH coefficients decoded for the same level.
    pub fn with_sh(mut self, sh: Vec<ShCoeffs>) -> Result<Self> {
        if sh.len() != self.len() {
            return Err(LccError::format(format!(
                "SH table has {} records for {} splats",
                sh.len(),
                self.len()
            )));
        }
        self.spherical_harmonics = Some(sh);
        Ok(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn splat_count(&self) -> usize {
        self.len()
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    /// The adapter the scene was decoded with.
    #[inline]
    pub fn axes(&self) -> &AxisAdapter {
        &self.axes
    }

    #[inline]
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Shared handle to the position buffer, for handing to another thread.
    #[inline]
    pub fn positions_shared(&self) -> Arc<[Vec3]> {
        Arc::clone(&self.positions)
    }

    #[inline]
    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    #[inline]
    pub fn opacities(&self) -> &[f32] {
        &self.opacities
    }

    #[inline]
    pub fn scales(&self) -> &[Vec3] {
        &self.scales
    }

    #[inline]
    pub fn rotations(&self) -> &[Quat] {
        &self.rotations
    }

    #[inline]
    pub fn cov3ds(&self) -> &[SymMat3] {
        &self.cov3ds
    }

    #[inline]
    pub fn spherical_harmonics(&self) -> Option<&[ShCoeffs]> {
        self.spherical_harmonics.as_deref()
    }

    /// Positions as a flat `x, y, z, x, y, z, ...` slice.
    #[inline]
    pub fn positions_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Covariances as a flat slice of 6-float upper triangles.
    #[inline]
    pub fn cov3ds_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.cov3ds)
    }

    pub fn splat(&self, i: usize) -> Option<Splat<'_>> {
        Some(Splat {
            position: *self.positions.get(i)?,
            color: self.colors[i],
            opacity: self.opacities[i],
            scale: self.scales[i],
            rotation: self.rotations[i],
            cov3d: self.cov3ds[i],
            sh: self.spherical_harmonics.as_ref().map(|sh| &sh[i]),
        })
    }

    /// Bounds of the decoded positions (may be tighter than the metadata box).
    pub fn point_bounds(&self) -> BoundingBox {
        self.positions
            .par_iter()
            .fold(
                || BoundingBox::EMPTY,
                |mut b, p| {
                    b.include(*p);
                    b
                },
            )
            .reduce(|| BoundingBox::EMPTY, BoundingBox::union)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_level, SplatRecord};
    use crate::meta::{AttributeRange, Mode};
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};

    fn meta(counts: Vec<u64>) -> Metadata {
        Metadata {
            name: None,
            splats: counts,
            bounding_box: BoundingBox {
                min: [-10.0; 3],
                max: [10.0; 3],
            },
            attributes: vec![AttributeRange {
                name: "scale".into(),
                min: vec![0.0; 3],
                max: vec![2.0; 3],
            }],
            mode: Mode::Basic,
            total_splats: None,
            total_level: None,
            record_size: None,
        }
    }

    fn random_records(n: usize, seed: u64) -> Vec<SplatRecord> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| SplatRecord {
                position: Vec3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                ),
                color: Vec3::new(rng.gen(), rng.gen(), rng.gen()),
                opacity: rng.gen(),
                scale: Vec3::new(
                    rng.gen_range(0.0..2.0),
                    rng.gen_range(0.0..2.0),
                    rng.gen_range(0.0..2.0),
                ),
                rotation: Quat::from_xyzw(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
                .normalize(),
            })
            .collect()
    }

    #[test]
    fn round_trip_recovers_attributes_within_quantization() {
        let m = meta(vec![64]);
        let records = random_records(64, 3);
        let bytes = encode_level(&records, &m.scale_range().unwrap());
        let scene = decode(&m, &bytes, 0, 0).unwrap();

        assert_eq!(scene.len(), 64);
        for (i, r) in records.iter().enumerate() {
            let s = scene.splat(i).unwrap();
            assert_eq!(s.position, r.position);
            assert!((s.color - r.color).abs().max_element() <= 0.5 / 255.0 + 1e-6);
            assert!((s.opacity - r.opacity).abs() <= 0.5 / 255.0 + 1e-6);
            assert!((s.scale - r.scale).abs().max_element() <= 2.0 / 65535.0);
            assert!(s.rotation.dot(r.rotation).abs() > 0.9999);
        }
    }

    #[test]
    fn covariances_are_symmetric_psd() {
        let m = meta(vec![200]);
        let bytes = encode_level(&random_records(200, 5), &m.scale_range().unwrap());
        let scene = decode(&m, &bytes, 0, 0).unwrap();

        for c in scene.cov3ds() {
            let full = c.to_mat3();
            assert_eq!(full, full.transpose());
            let scale = c.xx.max(c.yy).max(c.zz).max(1.0);
            for e in c.eigenvalues() {
                assert!(e >= -1e-4 * scale, "eigenvalue {e} of {c:?}");
            }
        }
    }

    #[test]
    fn decodes_a_level_from_a_partial_buffer() {
        let m = meta(vec![3, 2]);
        let range = m.scale_range().unwrap();
        let all = random_records(5, 9);
        let mut file = encode_level(&all[..3], &range);
        file.extend(encode_level(&all[3..], &range));

        // Caller fetched only the level-1 span, starting at its offset.
        let span = m.level_span(1).unwrap();
        let window = &file[span.offset as usize..];
        let scene = decode(&m, window, span.offset, 1).unwrap();
        assert_eq!(scene.level(), 1);
        assert_eq!(scene.positions(), &[all[3].position, all[4].position]);
    }

    #[test]
    fn short_buffer_is_truncated_not_a_panic() {
        let m = meta(vec![4]);
        let bytes = encode_level(&random_records(4, 1), &m.scale_range().unwrap());
        match decode(&m, &bytes[..100], 0, 0) {
            Err(LccError::Truncated { needed: 128, available: 100 }) => {}
            other => panic!("unexpected {other:?}"),
        }

        // Buffer starting past the span start cannot serve it either.
        assert!(matches!(
            decode(&m, &bytes, 32, 0),
            Err(LccError::Truncated { .. })
        ));
    }

    #[test]
    fn bad_level_and_bad_metadata_fail_fast() {
        let m = meta(vec![1]);
        assert!(matches!(
            decode(&m, &[], 0, 1),
            Err(LccError::LevelOutOfRange { level: 1, levels: 1 })
        ));

        let mut broken = meta(vec![1]);
        broken.attributes.clear();
        assert!(matches!(decode(&broken, &[0u8; 32], 0, 0), Err(LccError::Format(_))));
    }

    #[test]
    fn empty_level_decodes_to_empty_scene() {
        let m = meta(vec![0]);
        let scene = decode(&m, &[], 0, 0).unwrap();
        assert!(scene.is_empty());
        assert!(scene.positions_flat().is_empty());
    }

    #[test]
    fn adapter_is_applied_at_ingestion() {
        let m = meta(vec![16]);
        let records = random_records(16, 21);
        let bytes = encode_level(&records, &m.scale_range().unwrap());
        let raw = decode(&m, &bytes, 0, 0).unwrap();
        let axes = AxisAdapter::Z_UP_TO_Y_UP;
        let adapted = decode_with(&m, &bytes, 0, 0, &axes).unwrap();

        for i in 0..16 {
            assert_eq!(adapted.positions()[i], axes.apply(raw.positions()[i]));
            let want = axes.apply_covariance(raw.cov3ds()[i]).to_array();
            for (a, b) in adapted.cov3ds()[i].to_array().iter().zip(want) {
                assert_relative_eq!(*a, b, epsilon = 1e-6);
            }
        }
        assert_eq!(adapted.bounding_box(), &axes.apply_bounds(&m.bounding_box));
    }

    #[test]
    fn sh_count_must_match() {
        let m = meta(vec![2]);
        let bytes = encode_level(&random_records(2, 2), &m.scale_range().unwrap());
        let scene = decode(&m, &bytes, 0, 0).unwrap();
        assert!(scene.clone().with_sh(vec![[[0.0; 3]; 15]]).is_err());
        let scene = scene.with_sh(vec![[[0.0; 3]; 15]; 2]).unwrap();
        assert_eq!(scene.spherical_harmonics().map(|s| s.len()), Some(2));
    }
}
