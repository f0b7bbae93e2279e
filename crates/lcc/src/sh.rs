//! `shcoef.bin`: 64-byte records of higher-order SH coefficients.
//!
//! Words 0..15 each pack one RGB coefficient as 11/10/11-bit unorms
//! (bits 0..11, 11..21, 21..32); word 15 is reserved.

use crate::error::{LccError, Result};
use crate::meta::{Metadata, Range3, SH_RECORD_SIZE};
use crate::record::{pack_unorm, unpack_unorm};
use crate::scene::checked_window;
use glam::Vec3;
use rayon::prelude::*;

/// Higher-order coefficients per splat (degrees 1..=3).
pub const SH_COEFFS: usize = 15;

/// One splat's SH coefficients, RGB per basis function.
pub type ShCoeffs = [[f32; 3]; SH_COEFFS];

#[inline]
pub fn unpack_11_10_11(word: u32) -> Vec3 {
    Vec3::new(
        unpack_unorm(word, 0, 11),
        unpack_unorm(word, 11, 10),
        unpack_unorm(word, 21, 11),
    )
}

#[inline]
pub fn pack_11_10_11(t: Vec3) -> u32 {
    pack_unorm(t.x, 0, 11) | pack_unorm(t.y, 11, 10) | pack_unorm(t.z, 21, 11)
}

/// Decodes one record against the `shcoef` range.
pub fn decode_sh_record(rec: &[u8; 64], range: &Range3) -> ShCoeffs {
    let mut out = [[0.0f32; 3]; SH_COEFFS];
    for (i, coeff) in out.iter_mut().enumerate() {
        let at = i * 4;
        let word = u32::from_le_bytes([rec[at], rec[at + 1], rec[at + 2], rec[at + 3]]);
        *coeff = range.denormalize(unpack_11_10_11(word)).to_array();
    }
    out
}

/// Packs one record; the reserved word is written as zero.
pub fn encode_sh_record(coeffs: &ShCoeffs, range: &Range3) -> [u8; 64] {
    let mut out = [0u8; 64];
    for (i, c) in coeffs.iter().enumerate() {
        let word = pack_11_10_11(range.normalize(Vec3::from_array(*c)));
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    out
}

/// Decodes the SH side table for `level` from a buffer that starts at
/// `buffer_base_offset` within `shcoef.bin`.
pub fn decode_sh(
    meta: &Metadata,
    buffer: &[u8],
    buffer_base_offset: u64,
    level: usize,
) -> Result<Vec<ShCoeffs>> {
    meta.validate()?;
    let span = meta.sh_level_span(level)?;
    let range = meta
        .sh_range()?
        .ok_or_else(|| LccError::format("missing `shcoef` attribute range"))?;

    let count = span.length / SH_RECORD_SIZE;
    let window = checked_window(buffer, buffer_base_offset, span)?;

    (0..count as usize)
        .into_par_iter()
        .map(|i| {
            let at = i * SH_RECORD_SIZE as usize;
            let rec: &[u8; 64] = window
                .get(at..at + SH_RECORD_SIZE as usize)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| LccError::Truncated {
                    needed: span.offset + (at as u64) + SH_RECORD_SIZE,
                    available: buffer_base_offset + buffer.len() as u64,
                })?;
            Ok(decode_sh_record(rec, &range))
        })
        .collect()
}
