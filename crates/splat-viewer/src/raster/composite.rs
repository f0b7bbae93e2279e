//! Ordered alpha compositing into a CPU framebuffer.

use super::projection::{fragment_alpha, project, Footprint};
use super::{sh, RasterOptions};
use crate::camera::ViewState;
use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use lcc::Scene;
use rayon::prelude::*;
use std::path::Path;

/// Premultiplied RGBA accumulation buffer, row-major from the top-left.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Vec4::ZERO; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self) {
        self.pixels.fill(Vec4::ZERO);
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// `dst = src·α + dst·(1 - α)` on color, same on coverage.
    #[inline]
    fn blend(&mut self, x: u32, y: u32, color: Vec3, alpha: f32) {
        let dst = &mut self.pixels[(y * self.width + x) as usize];
        *dst = (color * alpha).extend(alpha) + *dst * (1.0 - alpha);
    }

    /// Flattens over `background` into 8-bit RGBA.
    pub fn to_image(&self, background: Vec3) -> image::RgbaImage {
        let mut img = image::RgbaImage::new(self.width, self.height);
        for (px, src) in img.pixels_mut().zip(&self.pixels) {
            let rgb = src.xyz() + background * (1.0 - src.w);
            let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            *px = image::Rgba([q(rgb.x), q(rgb.y), q(rgb.z), 255]);
        }
        img
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P, background: Vec3) -> image::ImageResult<()> {
        self.to_image(background)
            .save_with_format(path, image::ImageFormat::Png)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Projected {
    footprint: Footprint,
    color: Vec3,
    opacity: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub visible: usize,
    pub culled: usize,
    pub fragments: u64,
}

/// Projects every splat of a scene and blends the visible ones in a given
/// draw order.
pub struct Compositor {
    options: RasterOptions,
    projected: Vec<Option<Projected>>,
}

impl Compositor {
    pub fn new(options: RasterOptions) -> Self {
        Self {
            options,
            projected: Vec::new(),
        }
    }

    #[inline]
    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Projection pass, in parallel over splats.
    pub fn project(&mut self, scene: &Scene, view: &ViewState) {
        let camera = view.camera_position();
        let sh_table = scene.spherical_harmonics().filter(|_| self.options.use_sh);
        let axes = *scene.axes();
        let opts = self.options;

        self.projected.clear();
        self.projected.par_extend((0..scene.len()).into_par_iter().map(|i| {
            let position = scene.positions()[i];
            let footprint = project(position, &scene.cov3ds()[i], view, camera, &opts)?;
            let base = scene.colors()[i];
            let color = match sh_table {
                Some(table) => {
                    // SH lives in the source frame.
                    let dir = axes.unapply((position - camera).normalize_or_zero());
                    sh::shade(base, &table[i], dir)
                }
                None => base,
            };
            Some(Projected {
                footprint,
                color,
                opacity: scene.opacities()[i],
            })
        }));
    }

    /// Blends the projected splats into `fb` following `order`, first entry
    /// first (back to front). Indices outside the scene are skipped.
    pub fn composite(&self, order: &[u32], fb: &mut Framebuffer) -> FrameStats {
        let mut stats = FrameStats::default();
        let (w, h) = (fb.width() as f32, fb.height() as f32);

        for &i in order {
            let Some(Some(p)) = self.projected.get(i as usize) else {
                stats.culled += 1;
                continue;
            };
            stats.visible += 1;

            let Footprint {
                center, conic, radius, ..
            } = p.footprint;
            let x0 = (center.x - radius).floor().max(0.0) as u32;
            let y0 = (center.y - radius).floor().max(0.0) as u32;
            let x1 = (center.x + radius).ceil().min(w) as u32;
            let y1 = (center.y + radius).ceil().min(h) as u32;

            for y in y0..y1 {
                for x in x0..x1 {
                    let d = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
                    if let Some(alpha) = fragment_alpha(conic, p.opacity, d) {
                        fb.blend(x, y, p.color, alpha);
                        stats.fragments += 1;
                    }
                }
            }
        }
        stats
    }

    /// Clears `fb`, projects and composites one frame.
    pub fn render(
        &mut self,
        scene: &Scene,
        order: &[u32],
        view: &ViewState,
        fb: &mut Framebuffer,
    ) -> FrameStats {
        fb.clear();
        self.project(scene, view);
        self.composite(order, fb)
    }
}
