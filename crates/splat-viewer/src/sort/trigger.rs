//! When to ask for a new draw order.

use glam::Mat4;
use std::time::{Duration, Instant};

/// Decides whether the camera moved enough since the last sort.
pub trait MotionDetector: Send {
    fn has_moved(&self, last: &Mat4, current: &Mat4) -> bool;
}

/// Sum of absolute differences over all 16 matrix entries.
pub fn l1_delta(a: &Mat4, b: &Mat4) -> f32 {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .map(|(x, y)| (x - y).abs())
        .sum()
}

#[derive(Debug, Clone, Copy)]
pub struct MatrixL1Delta {
    pub threshold: f32,
}

impl Default for MatrixL1Delta {
    fn default() -> Self {
        Self { threshold: 0.01 }
    }
}

impl MotionDetector for MatrixL1Delta {
    fn has_moved(&self, last: &Mat4, current: &Mat4) -> bool {
        l1_delta(last, current) > self.threshold
    }
}

/// Tracks the view of the last dispatched sort and gates new dispatches on
/// motion, the worker being idle and an optional minimum interval.
pub struct SortScheduler<D: MotionDetector = MatrixL1Delta> {
    detector: D,
    min_interval: Option<Duration>,
    last_sorted: Option<Mat4>,
    last_dispatch: Option<Instant>,
}

impl<D: MotionDetector> SortScheduler<D> {
    pub fn new(detector: D, min_interval: Option<Duration>) -> Self {
        Self {
            detector,
            min_interval,
            last_sorted: None,
            last_dispatch: None,
        }
    }

    pub fn should_dispatch(&self, view: &Mat4, in_flight: bool, now: Instant) -> bool {
        if in_flight {
            return false;
        }
        let moved = match &self.last_sorted {
            Some(last) => self.detector.has_moved(last, view),
            None => true,
        };
        if !moved {
            return false;
        }
        match (self.min_interval, self.last_dispatch) {
            (Some(interval), Some(at)) => now.saturating_duration_since(at) >= interval,
            _ => true,
        }
    }

    /// Records a dispatch for `view`.
    pub fn mark_dispatched(&mut self, view: Mat4, now: Instant) {
        self.last_sorted = Some(view);
        self.last_dispatch = Some(now);
    }

    /// `should_dispatch` + `mark_dispatched` in one step.
    pub fn poll(&mut self, view: &Mat4, in_flight: bool, now: Instant) -> bool {
        let go = self.should_dispatch(view, in_flight, now);
        if go {
            self.mark_dispatched(*view, now);
        }
        go
    }

    /// Forgets the last sorted view so the next poll dispatches.
    pub fn reset(&mut self) {
        self.last_sorted = None;
        self.last_dispatch = None;
    }

    pub fn last_sorted(&self) -> Option<&Mat4> {
        self.last_sorted.as_ref()
    }
}

impl Default for SortScheduler<MatrixL1Delta> {
    fn default() -> Self {
        Self::new(MatrixL1Delta::default(), None)
    }
}
