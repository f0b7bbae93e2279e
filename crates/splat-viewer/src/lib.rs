//! Headless Gaussian splat viewer for LCC scenes.
//!
//! Decoded splats are re-ordered back to front by a counting sort running on
//! its own thread, and composited on the CPU with EWA splatting. Frames are
//! written as PNG.

pub mod app;
pub mod camera;
pub mod config;
pub mod data;
pub mod raster;
pub mod sort;
