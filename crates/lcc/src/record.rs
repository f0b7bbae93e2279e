//! The fixed 32-byte primary record and its bit-packed fields.
//!
//! ```text
//!   00 : f32[3]  position
//!   0C : u8[4]   r, g, b, opacity (unorm8)
//!   10 : u16[3]  scale (unorm16, de-normalized with the `scale` range)
//!   16 : u32     rotation (compressed quaternion, see `decode_quaternion`)
//!   1A : u16[3]  reserved
//! ```

use crate::meta::Range3;
use glam::{Quat, Vec3};
use std::f32::consts::{FRAC_1_SQRT_2, SQRT_2};

/// Component order after decompression, four entries per selector value.
/// Row `s` places the reconstructed component at index `s` of (x, y, z, w).
pub const QUAT_LUT: [usize; 16] = [
    3, 0, 1, 2, //
    0, 3, 1, 2, //
    0, 1, 3, 2, //
    0, 1, 2, 3,
];

/// Extracts `bits` bits of `word` starting at `shift`.
#[inline(always)]
pub fn unpack_bits(word: u32, shift: u32, bits: u32) -> u32 {
    (word >> shift) & ((1u32 << bits) - 1)
}

/// Extracts a `bits`-wide unsigned normalized field as a value in [0,1].
#[inline(always)]
pub fn unpack_unorm(word: u32, shift: u32, bits: u32) -> f32 {
    unpack_bits(word, shift, bits) as f32 / ((1u32 << bits) - 1) as f32
}

/// Quantizes `t` (clamped to [0,1]) into a `bits`-wide field at `shift`.
#[inline(always)]
pub fn pack_unorm(t: f32, shift: u32, bits: u32) -> u32 {
    let max = ((1u32 << bits) - 1) as f32;
    ((t.clamp(0.0, 1.0) * max).round() as u32) << shift
}

#[inline(always)]
fn le_u16(b: &[u8; 32], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

#[inline(always)]
fn le_u32(b: &[u8; 32], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline(always)]
fn le_f32(b: &[u8; 32], at: usize) -> f32 {
    f32::from_bits(le_u32(b, at))
}

/// Decodes a 10/10/10/2 "smallest three" quaternion.
///
/// The three stored components live in [-1/sqrt2, 1/sqrt2]; the dropped one
/// is rebuilt from the unit-norm constraint and moved into place by
/// [`QUAT_LUT`]. The result is renormalized.
pub fn decode_quaternion(code: u32) -> Quat {
    let a = unpack_unorm(code, 0, 10) * SQRT_2 - FRAC_1_SQRT_2;
    let b = unpack_unorm(code, 10, 10) * SQRT_2 - FRAC_1_SQRT_2;
    let c = unpack_unorm(code, 20, 10) * SQRT_2 - FRAC_1_SQRT_2;
    let d = (1.0 - (a * a + b * b + c * c)).max(0.0).sqrt();

    let v = [a, b, c, d];
    let sel = unpack_bits(code, 30, 2) as usize * 4;
    let q = [
        v[QUAT_LUT[sel]],
        v[QUAT_LUT[sel + 1]],
        v[QUAT_LUT[sel + 2]],
        v[QUAT_LUT[sel + 3]],
    ];

    let norm = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if norm == 0.0 {
        return Quat::from_array(v);
    }

    Quat::from_array(q.map(|x| x / norm))
}

/// Inverse of [`decode_quaternion`]: drops the largest-magnitude component.
pub fn encode_quaternion(q: Quat) -> u32 {
    let mut v = q.normalize().to_array();
    if !v.iter().all(|x| x.is_finite()) {
        v = Quat::IDENTITY.to_array();
    }

    let mut largest = 0usize;
    for i in 1..4 {
        if v[i].abs() > v[largest].abs() {
            largest = i;
        }
    }

    // q and -q are the same rotation; keep the dropped component positive.
    if v[largest] < 0.0 {
        v = v.map(|x| -x);
    }

    let mut code = (largest as u32) << 30;
    let mut shift = 0;
    for (i, x) in v.iter().enumerate() {
        if i == largest {
            continue;
        }
        code |= pack_unorm((x + FRAC_1_SQRT_2) / SQRT_2, shift, 10);
        shift += 10;
    }

    code
}

/// One raw record, fields named but still packed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedRecord {
    pub position: [f32; 3],
    pub rgba: [u8; 4],
    pub scale: [u16; 3],
    pub rotation: u32,
    pub reserved: [u16; 3],
}

impl PackedRecord {
    pub const SIZE: usize = 32;

    pub fn parse(b: &[u8; 32]) -> Self {
        Self {
            position: [le_f32(b, 0), le_f32(b, 4), le_f32(b, 8)],
            rgba: [b[12], b[13], b[14], b[15]],
            scale: [le_u16(b, 16), le_u16(b, 18), le_u16(b, 20)],
            rotation: le_u32(b, 22),
            reserved: [le_u16(b, 26), le_u16(b, 28), le_u16(b, 30)],
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, p) in self.position.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&p.to_le_bytes());
        }
        out[12..16].copy_from_slice(&self.rgba);
        for (i, s) in self.scale.iter().enumerate() {
            out[16 + i * 2..18 + i * 2].copy_from_slice(&s.to_le_bytes());
        }
        out[22..26].copy_from_slice(&self.rotation.to_le_bytes());
        for (i, r) in self.reserved.iter().enumerate() {
            out[26 + i * 2..28 + i * 2].copy_from_slice(&r.to_le_bytes());
        }
        out
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    #[inline]
    pub fn color(&self) -> Vec3 {
        Vec3::new(
            self.rgba[0] as f32 / 255.0,
            self.rgba[1] as f32 / 255.0,
            self.rgba[2] as f32 / 255.0,
        )
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.rgba[3] as f32 / 255.0
    }

    /// Scale de-normalized into `range`; negative results clamp to 0.
    #[inline]
    pub fn scale(&self, range: &Range3) -> Vec3 {
        let t = Vec3::new(
            self.scale[0] as f32 / 65535.0,
            self.scale[1] as f32 / 65535.0,
            self.scale[2] as f32 / 65535.0,
        );
        range.denormalize(t).max(Vec3::ZERO)
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        decode_quaternion(self.rotation)
    }
}
