use crate::app::ViewerOptions;
use crate::data::LoadOptions;
use crate::raster::RasterOptions;
use clap::{Parser, ValueEnum};
use glam::Vec3;
use lcc::AxisAdapter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AxesArg {
    /// Source is Z-up; convert to Y-up.
    ZUp,
    /// Use source coordinates unchanged.
    Identity,
}

impl AxesArg {
    pub fn adapter(self) -> AxisAdapter {
        match self {
            AxesArg::ZUp => AxisAdapter::Z_UP_TO_Y_UP,
            AxesArg::Identity => AxisAdapter::IDENTITY,
        }
    }
}

/// `splat-viewer` - headless Gaussian splat viewer for LCC scenes.
///
/// Orbits the camera around the scene, re-sorting on a background thread as
/// the view changes, and writes composited frames as PNG.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Scene directory or `meta.lcc` file.
    #[arg(long, env = "SPLAT_SCENE", required_unless_present = "synthetic")]
    pub scene: Option<PathBuf>,

    /// Render a generated sphere of N splats instead of a scene on disk.
    #[arg(long, env = "SPLAT_SYNTHETIC", conflicts_with = "scene")]
    pub synthetic: Option<usize>,

    /// LOD level to load (0 = finest).
    #[arg(long, env = "SPLAT_LEVEL")]
    pub level: Option<usize>,

    /// Load the finest level with at most this many splats.
    #[arg(long, env = "SPLAT_MAX_SPLATS", conflicts_with = "level")]
    pub max_splats: Option<u64>,

    #[arg(long, default_value_t = 120)]
    pub frames: u32,

    #[arg(long, default_value_t = 1280, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    #[arg(long, default_value_t = 720, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Vertical field of view in degrees, in (0, 180).
    #[arg(long, default_value_t = 60.0, value_parser = fov_degrees)]
    pub fov_deg: f32,

    /// Camera orbit step per frame, in degrees.
    #[arg(long, default_value_t = 1.0)]
    pub orbit_deg: f32,

    /// Directory for PNG frames. Nothing is written without it.
    #[arg(long, env = "SPLAT_OUT")]
    pub out: Option<PathBuf>,

    /// Write every Nth frame (the last frame is always written).
    #[arg(long, default_value_t = 30)]
    pub save_every: u32,

    /// L1 change of the view matrix that triggers a re-sort.
    #[arg(long, env = "SPLAT_SORT_THRESHOLD", default_value_t = 0.01)]
    pub sort_threshold: f32,

    /// Minimum time between sort dispatches.
    #[arg(long, env = "SPLAT_SORT_INTERVAL_MS")]
    pub sort_interval_ms: Option<u64>,

    /// Depth buckets for the counting sort.
    #[arg(
        long,
        default_value_t = crate::sort::DEFAULT_BUCKETS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub buckets: u32,

    /// Skip splats farther than this from the camera.
    #[arg(long)]
    pub cull_radius: Option<f32>,

    /// Skip splats closer than this view depth.
    #[arg(long, default_value_t = 0.2, value_parser = non_negative)]
    pub near_epsilon: f32,

    /// Ignore SH coefficients and draw base colors.
    #[arg(long)]
    pub no_sh: bool,

    #[arg(long, value_enum, default_value_t = AxesArg::ZUp)]
    pub axes: AxesArg,

    /// Memory-map scene files (builds with the `mmap` feature).
    #[arg(long)]
    pub mmap: bool,
}

fn fov_degrees(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if v > 0.0 && v < 180.0 {
        Ok(v)
    } else {
        Err(format!("{v} is not in (0, 180)"))
    }
}

fn non_negative(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(format!("{v} must be finite and >= 0"))
    }
}

impl Config {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            level: self.level,
            max_splats: self.max_splats,
            axes: self.axes.adapter(),
            load_sh: !self.no_sh,
            mmap: self.mmap,
        }
    }

    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions {
            near_epsilon: self.near_epsilon,
            cull_radius: self.cull_radius,
            use_sh: !self.no_sh,
            background: Vec3::ZERO,
        }
    }

    pub fn viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            width: self.width,
            height: self.height,
            fov_y: self.fov_deg.to_radians(),
            buckets: self.buckets,
            sort_threshold: self.sort_threshold,
            sort_interval: self.sort_interval_ms.map(Duration::from_millis),
            raster: self.raster_options(),
            ..ViewerOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scene_run() {
        let c = Config::try_parse_from([
            "splat-viewer",
            "--scene",
            "/data/scene",
            "--max-splats",
            "500000",
            "--axes",
            "identity",
            "--no-sh",
        ])
        .unwrap();
        assert_eq!(c.scene, Some(PathBuf::from("/data/scene")));
        assert_eq!(c.buckets, 65536);
        assert!(c.load_options().axes.is_identity());
        assert!(!c.raster_options().use_sh);
    }

    #[test]
    fn rejects_degenerate_camera_settings() {
        let run = |extra: &[&str]| {
            let mut args = vec!["splat-viewer", "--synthetic", "10"];
            args.extend_from_slice(extra);
            Config::try_parse_from(args)
        };
        assert!(run(&["--fov-deg", "0"]).is_err());
        assert!(run(&["--fov-deg", "180"]).is_err());
        assert!(run(&["--fov-deg", "nan"]).is_err());
        assert!(run(&["--width", "0"]).is_err());
        assert!(run(&["--height", "0"]).is_err());
        assert!(run(&["--buckets", "0"]).is_err());
        assert!(run(&["--near-epsilon", "-1"]).is_err());

        let c = run(&["--fov-deg", "90", "--near-epsilon", "0", "--mmap"]).unwrap();
        assert_eq!(c.fov_deg, 90.0);
        assert!(c.load_options().mmap);
    }

    #[test]
    fn scene_or_synthetic_is_required() {
        assert!(Config::try_parse_from(["splat-viewer"]).is_err());
        assert!(Config::try_parse_from(["splat-viewer", "--synthetic", "1000"]).is_ok());
        assert!(
            Config::try_parse_from(["splat-viewer", "--synthetic", "10", "--scene", "x"]).is_err()
        );
    }
}
