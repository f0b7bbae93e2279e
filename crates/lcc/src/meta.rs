//! `meta.lcc`: the JSON scene descriptor.
//!
//! Only the fields the decoder depends on are modelled; unknown keys
//! (`guid`, `epsg`, `cellLengthX`, ...) are ignored.

use crate::error::{LccError, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size in bytes of one primary record in `data.bin`.
pub const RECORD_SIZE: u64 = 32;

/// Size in bytes of one SH side-table record in `shcoef.bin`.
pub const SH_RECORD_SIZE: u64 = 64;

/// Whether the scene ships an SH side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(alias = "Portable", alias = "basic")]
    Basic,
    #[serde(alias = "Quality", alias = "extended")]
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub const EMPTY: BoundingBox = BoundingBox {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    #[inline]
    pub fn min_v(&self) -> Vec3 {
        Vec3::from_array(self.min)
    }

    #[inline]
    pub fn max_v(&self) -> Vec3 {
        Vec3::from_array(self.max)
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min_v() + self.max_v()) * 0.5
    }

    /// Half the diagonal length.
    #[inline]
    pub fn radius(&self) -> f32 {
        (self.max_v() - self.min_v()).length() * 0.5
    }

    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| {
            self.min[i].is_finite() && self.max[i].is_finite() && self.min[i] <= self.max[i]
        })
    }

    /// Grow to include `p`.
    #[inline]
    pub fn include(&mut self, p: Vec3) {
        self.min = self.min_v().min(p).to_array();
        self.max = self.max_v().max(p).to_array();
    }

    pub fn union(self, other: BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min_v().min(other.min_v()).to_array(),
            max: self.max_v().max(other.max_v()).to_array(),
        }
    }
}

/// One entry of the `attributes` table: the range a packed attribute was
/// normalized against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRange {
    pub name: String,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

/// Per-channel affine range used to de-normalize packed values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Range3 {
    /// Maps `t` in [0,1]^3 onto `[min, max]` per channel.
    #[inline]
    pub fn denormalize(&self, t: Vec3) -> Vec3 {
        self.min + t * (self.max - self.min)
    }

    /// Inverse of [`Range3::denormalize`], clamped to [0,1]. A zero-width
    /// channel maps to 0.
    #[inline]
    pub fn normalize(&self, v: Vec3) -> Vec3 {
        let span = self.max - self.min;
        let mut t = Vec3::ZERO;
        for i in 0..3 {
            if span[i] != 0.0 {
                t[i] = ((v[i] - self.min[i]) / span[i]).clamp(0.0, 1.0);
            }
        }
        t
    }
}

/// A contiguous span of a backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    /// One past the last byte; `None` if the span does not fit in a `u64`.
    #[inline]
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Splat count per LOD level; index 0 is the finest level.
    #[serde(alias = "splatCountsByLevel")]
    pub splats: Vec<u64>,

    pub bounding_box: BoundingBox,

    pub attributes: Vec<AttributeRange>,

    #[serde(rename = "fileType", alias = "mode")]
    pub mode: Mode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_splats: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_level: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_size: Option<u64>,
}

impl Metadata {
    /// Parses and validates a `meta.lcc` document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let meta: Metadata = serde_json::from_slice(bytes)?;
        meta.validate()?;
        Ok(meta)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every field the decoder relies on. Nothing is allocated for
    /// splat data before this passes.
    pub fn validate(&self) -> Result<()> {
        if self.splats.is_empty() {
            return Err(LccError::format("`splats` must list at least one LOD level"));
        }

        if let Some(size) = self.record_size {
            if size != RECORD_SIZE {
                return Err(LccError::format(format!(
                    "unsupported recordSize {size} (expected {RECORD_SIZE})"
                )));
            }
        }

        if !self.bounding_box.is_valid() {
            return Err(LccError::format("`boundingBox` must be finite with min <= max"));
        }

        self.scale_range()?;

        if self.mode == Mode::Extended && self.sh_range()?.is_none() {
            return Err(LccError::format("Extended scenes require an `shcoef` attribute range"));
        }

        let total = self
            .splats
            .iter()
            .try_fold(0u64, |acc, &n| acc.checked_add(n))
            .ok_or_else(|| LccError::format("splat count overflow"))?;
        total
            .checked_mul(SH_RECORD_SIZE)
            .ok_or_else(|| LccError::format("scene byte size overflow"))?;

        if let Some(declared) = self.total_splats {
            if declared != total {
                return Err(LccError::format(format!(
                    "totalSplats {declared} disagrees with sum of splats {total}"
                )));
            }
        }

        if let Some(levels) = self.total_level {
            if levels != self.splats.len() {
                return Err(LccError::format(format!(
                    "totalLevel {levels} disagrees with {} listed levels",
                    self.splats.len()
                )));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn level_count(&self) -> usize {
        self.splats.len()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeRange> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Range the packed u16 scales were normalized against.
    pub fn scale_range(&self) -> Result<Range3> {
        let attr = self
            .attribute("scale")
            .ok_or_else(|| LccError::format("missing `scale` attribute range"))?;
        range3(attr)
    }

    /// Range of the SH coefficients, if the table lists one.
    pub fn sh_range(&self) -> Result<Option<Range3>> {
        self.attribute("shcoef").map(range3).transpose()
    }

    /// Number of splats stored at `level`.
    pub fn splat_count(&self, level: usize) -> Result<u64> {
        self.check_level(level)?;
        Ok(self.splats[level])
    }

    /// Byte span of `level` inside `data.bin`.
    pub fn level_span(&self, level: usize) -> Result<ByteRange> {
        self.span(level, RECORD_SIZE)
    }

    /// Byte span of `level` inside `shcoef.bin`.
    pub fn sh_level_span(&self, level: usize) -> Result<ByteRange> {
        self.span(level, SH_RECORD_SIZE)
    }

    /// Finest level holding at most `max_splats`; the coarsest level when
    /// none fits.
    pub fn pick_level(&self, max_splats: u64) -> usize {
        self.splats
            .iter()
            .position(|&n| n <= max_splats)
            .unwrap_or(self.splats.len().saturating_sub(1))
    }

    #[inline]
    fn check_level(&self, level: usize) -> Result<()> {
        if level >= self.splats.len() {
            return Err(LccError::LevelOutOfRange {
                level,
                levels: self.splats.len(),
            });
        }
        Ok(())
    }

    fn span(&self, level: usize, record_size: u64) -> Result<ByteRange> {
        // Level first: no offset math for a level that does not exist.
        self.check_level(level)?;

        let preceding = self.splats[..level]
            .iter()
            .try_fold(0u64, |acc, &n| acc.checked_add(n))
            .ok_or_else(|| LccError::format("splat count overflow"))?;

        let offset = preceding
            .checked_mul(record_size)
            .ok_or_else(|| LccError::format("level offset overflow"))?;
        let length = self.splats[level]
            .checked_mul(record_size)
            .ok_or_else(|| LccError::format("level size overflow"))?;
        offset
            .checked_add(length)
            .ok_or_else(|| LccError::format("level end overflow"))?;

        Ok(ByteRange { offset, length })
    }
}

fn range3(attr: &AttributeRange) -> Result<Range3> {
    if attr.min.len() < 3 || attr.max.len() < 3 {
        return Err(LccError::format(format!(
            "attribute `{}` needs 3 min and 3 max components",
            attr.name
        )));
    }

    let min = Vec3::new(attr.min[0], attr.min[1], attr.min[2]);
    let max = Vec3::new(attr.max[0], attr.max[1], attr.max[2]);

    if !min.is_finite() || !max.is_finite() {
        return Err(LccError::format(format!(
            "attribute `{}` range is not finite",
            attr.name
        )));
    }

    Ok(Range3 { min, max })
}
