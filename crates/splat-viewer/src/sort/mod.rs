//! Back-to-front draw order via a bucketed counting sort on view depth.
//!
//! Depth is view-space z (`view.row(2) · (p, 1)`). With a right-handed view
//! the camera looks down -Z, so ascending z is farthest first, which is the
//! order the compositor blends in.

pub mod trigger;
pub mod worker;

pub use trigger::{MatrixL1Delta, MotionDetector, SortScheduler};
pub use worker::{Dispatch, SortResult, SortWorker};

use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;
use std::sync::Arc;

pub const DEFAULT_BUCKETS: u32 = 65536;

const DEPTH_EPSILON: f32 = 1e-6;

#[inline]
pub fn view_depth(row: Vec4, p: Vec3) -> f32 {
    row.dot(p.extend(1.0))
}

/// Bucket index for `depth` within `[min, max]`.
#[inline]
pub fn quantize(depth: f32, min: f32, max: f32, buckets: u32) -> u32 {
    let t = (depth - min) / (max - min + DEPTH_EPSILON);
    // NaN casts to 0.
    ((t * buckets as f32) as u32).min(buckets.saturating_sub(1))
}

/// Stable counting sort of `depths` into ascending buckets. `out` receives
/// the permutation (draw position -> source index).
pub fn counting_sort(
    depths: &[f32],
    buckets: u32,
    keys: &mut Vec<u32>,
    counts: &mut Vec<u32>,
    out: &mut Vec<u32>,
) {
    let n = depths.len();
    out.clear();
    if n == 0 {
        return;
    }
    let buckets = buckets.max(1);

    let (min, max) = depths
        .par_iter()
        .fold(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |(lo, hi), &d| (lo.min(d), hi.max(d)),
        )
        .reduce(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        );

    keys.clear();
    keys.par_extend(depths.par_iter().map(|&d| quantize(d, min, max, buckets)));

    counts.clear();
    counts.resize(buckets as usize, 0);
    for &k in keys.iter() {
        counts[k as usize] += 1;
    }

    // Exclusive prefix sum: counts[b] becomes the first slot of bucket b.
    let mut running = 0u32;
    for c in counts.iter_mut() {
        let here = *c;
        *c = running;
        running += here;
    }

    out.resize(n, 0);
    for (i, &k) in keys.iter().enumerate() {
        let slot = &mut counts[k as usize];
        out[*slot as usize] = i as u32;
        *slot += 1;
    }
}

/// Sort session over one immutable positions buffer. Scratch buffers are
/// reused across calls.
pub struct DepthSorter {
    positions: Arc<[Vec3]>,
    buckets: u32,
    depths: Vec<f32>,
    keys: Vec<u32>,
    counts: Vec<u32>,
}

impl DepthSorter {
    pub fn new(positions: Arc<[Vec3]>, buckets: u32) -> Self {
        Self {
            positions,
            buckets: buckets.max(1),
            depths: Vec::new(),
            keys: Vec::new(),
            counts: Vec::new(),
        }
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
    pub fn buckets(&self) -> u32 {
        self.buckets
    }

    pub fn sort(&mut self, view: &Mat4) -> Vec<u32> {
        let mut out = Vec::new();
        self.sort_into(view, &mut out);
        out
    }

    /// Writes the draw order for `view` into `out`, reusing its allocation.
    pub fn sort_into(&mut self, view: &Mat4, out: &mut Vec<u32>) {
        let row = view.row(2);
        self.depths.clear();
        self.depths
            .par_extend(self.positions.par_iter().map(|&p| view_depth(row, p)));
        counting_sort(
            &self.depths,
            self.buckets,
            &mut self.keys,
            &mut self.counts,
            out,
        );
    }
}
