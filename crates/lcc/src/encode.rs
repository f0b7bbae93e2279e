//! Writer side: packs splats into records and lays out a scene directory.

use crate::error::{LccError, Result};
use crate::meta::{AttributeRange, BoundingBox, Metadata, Mode, Range3};
use crate::record::{encode_quaternion, PackedRecord};
use crate::sh::{encode_sh_record, ShCoeffs};
use crate::{DATA_FILE, META_FILE, SH_FILE};
use glam::{Quat, Vec3};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// An unpacked splat, as produced by a trainer or converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatRecord {
    pub position: Vec3,
    pub color: Vec3,
    pub opacity: f32,
    pub scale: Vec3,
    pub rotation: Quat,
}

#[inline]
fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl SplatRecord {
    pub fn pack(&self, scale_range: &Range3) -> PackedRecord {
        let s = scale_range.normalize(self.scale);
        PackedRecord {
            position: self.position.to_array(),
            rgba: [
                unorm8(self.color.x),
                unorm8(self.color.y),
                unorm8(self.color.z),
                unorm8(self.opacity),
            ],
            scale: s.to_array().map(|t| (t * 65535.0).round() as u16),
            rotation: encode_quaternion(self.rotation),
            reserved: [0; 3],
        }
    }
}

/// Packs one level into `data.bin` bytes.
pub fn encode_level(records: &[SplatRecord], scale_range: &Range3) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * PackedRecord::SIZE);
    for r in records {
        out.extend_from_slice(&r.pack(scale_range).to_bytes());
    }
    out
}

/// Packs one level into `shcoef.bin` bytes.
pub fn encode_sh_level(coeffs: &[ShCoeffs], sh_range: &Range3) -> Vec<u8> {
    let mut out = Vec::with_capacity(coeffs.len() * 64);
    for c in coeffs {
        out.extend_from_slice(&encode_sh_record(c, sh_range));
    }
    out
}

/// Tight range over every component of `values` (scales or SH).
pub fn fit_range<I: IntoIterator<Item = Vec3>>(values: I) -> Range3 {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return Range3 {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        };
    }
    Range3 { min, max }
}

fn attribute(name: &str, r: &Range3) -> AttributeRange {
    AttributeRange {
        name: name.to_string(),
        min: r.min.to_array().to_vec(),
        max: r.max.to_array().to_vec(),
    }
}

/// Builds metadata describing `levels` (finest first). SH ranges are only
/// listed when `sh_levels` is given.
pub fn metadata_for(
    name: &str,
    levels: &[Vec<SplatRecord>],
    sh_levels: Option<&[Vec<ShCoeffs>]>,
) -> Metadata {
    let mut bounds = BoundingBox::EMPTY;
    for r in levels.iter().flatten() {
        bounds.include(r.position);
    }
    if !bounds.is_valid() {
        bounds = BoundingBox {
            min: [0.0; 3],
            max: [0.0; 3],
        };
    }

    let scale_range = fit_range(levels.iter().flatten().map(|r| r.scale));
    let mut attributes = vec![
        attribute(
            "position",
            &Range3 {
                min: bounds.min_v(),
                max: bounds.max_v(),
            },
        ),
        attribute("scale", &scale_range),
    ];

    let mode = match sh_levels {
        Some(sh) => {
            let sh_range = fit_range(
                sh.iter()
                    .flatten()
                    .flat_map(|c| c.iter().map(|rgb| Vec3::from_array(*rgb))),
            );
            attributes.push(attribute("shcoef", &sh_range));
            Mode::Extended
        }
        None => Mode::Basic,
    };

    let splats: Vec<u64> = levels.iter().map(|l| l.len() as u64).collect();

    Metadata {
        name: Some(name.to_string()),
        total_splats: Some(splats.iter().sum()),
        total_level: Some(splats.len()),
        splats,
        bounding_box: bounds,
        attributes,
        mode,
        record_size: Some(crate::RECORD_SIZE),
    }
}

/// Writes `meta.lcc`, `data.bin` and (for Extended scenes) `shcoef.bin`
/// into `dir`.
pub fn write_scene<P: AsRef<Path>>(
    dir: P,
    meta: &Metadata,
    levels: &[Vec<SplatRecord>],
    sh_levels: Option<&[Vec<ShCoeffs>]>,
) -> Result<()> {
    meta.validate()?;
    let dir = dir.as_ref();

    if levels.len() != meta.level_count()
        || levels.iter().zip(&meta.splats).any(|(l, &n)| l.len() as u64 != n)
    {
        return Err(LccError::format("levels do not match metadata splat counts"));
    }

    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(META_FILE), meta.to_json()?)?;

    let scale_range = meta.scale_range()?;
    let mut data = BufWriter::new(File::create(dir.join(DATA_FILE))?);
    for level in levels {
        data.write_all(&encode_level(level, &scale_range))?;
    }
    data.flush()?;

    if let Some(sh_levels) = sh_levels {
        let sh_range = meta
            .sh_range()?
            .ok_or_else(|| LccError::format("missing `shcoef` attribute range"))?;
        let mut sh = BufWriter::new(File::create(dir.join(SH_FILE))?);
        for level in sh_levels {
            sh.write_all(&encode_sh_level(level, &sh_range))?;
        }
        sh.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(x: f32, scale: f32) -> SplatRecord {
        SplatRecord {
            position: Vec3::new(x, -x, 2.0 * x),
            color: Vec3::new(1.2, -0.1, 0.5),
            opacity: 0.5,
            scale: Vec3::splat(scale),
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn pack_clamps_colors_and_normalizes_scale() {
        let range = Range3 {
            min: Vec3::ZERO,
            max: Vec3::splat(4.0),
        };
        let p = rec(1.0, 2.0).pack(&range);
        assert_eq!(p.rgba, [255, 0, 128, 128]);
        assert_eq!(p.scale, [32768; 3]);
    }

    #[test]
    fn metadata_covers_all_levels() {
        let levels = vec![vec![rec(1.0, 0.1), rec(-3.0, 0.4)], vec![rec(0.5, 0.2)]];
        let meta = metadata_for("test", &levels, None);
        meta.validate().unwrap();
        assert_eq!(meta.splats, vec![2, 1]);
        assert_eq!(meta.bounding_box.min, [-3.0, -1.0, -6.0]);
        assert_eq!(meta.bounding_box.max, [1.0, 3.0, 2.0]);
        let scale = meta.scale_range().unwrap();
        assert_eq!(scale.min, Vec3::splat(0.1));
        assert_eq!(scale.max, Vec3::splat(0.4));
        assert_eq!(meta.mode, Mode::Basic);
    }

    #[test]
    fn metadata_json_round_trips() {
        let levels = vec![vec![rec(1.0, 0.1)]];
        let sh = vec![vec![[[0.25, -0.5, 0.0]; 15]]];
        let meta = metadata_for("sh", &levels, Some(&sh));
        assert_eq!(meta.mode, Mode::Extended);
        let back = Metadata::from_json_slice(meta.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(back, meta);
    }
}
