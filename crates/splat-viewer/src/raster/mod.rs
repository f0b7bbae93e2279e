//! CPU splat rasterizer: per-splat projection, then an ordered composite.

pub mod composite;
pub mod projection;
pub mod sh;

pub use composite::{Compositor, FrameStats, Framebuffer};
pub use projection::{project, Footprint};

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Splats closer than this (view depth) are culled.
    pub near_epsilon: f32,
    /// Cull splats farther than this from the camera.
    pub cull_radius: Option<f32>,
    /// Evaluate SH when the scene carries it.
    pub use_sh: bool,
    pub background: Vec3,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            near_epsilon: 0.2,
            cull_radius: None,
            use_sh: true,
            background: Vec3::ZERO,
        }
    }
}
