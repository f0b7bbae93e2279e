use crate::{
    camera::{OrbitCamera, ViewState},
    config::Config,
    data::{load_scene, synthetic},
    raster::{Compositor, FrameStats, Framebuffer, RasterOptions},
    sort::{Dispatch, MatrixL1Delta, SortResult, SortScheduler, SortWorker, DEFAULT_BUCKETS},
};
use anyhow::{bail, Context, Result};
use lcc::Scene;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub width: u32,
    pub height: u32,
    /// Vertical field of view (radians).
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub buckets: u32,
    pub sort_threshold: f32,
    pub sort_interval: Option<Duration>,
    pub raster: RasterOptions,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fov_y: 60f32.to_radians(),
            near: 0.01,
            far: 10_000.0,
            buckets: DEFAULT_BUCKETS,
            sort_threshold: MatrixL1Delta::default().threshold,
            sort_interval: None,
            raster: RasterOptions::default(),
        }
    }
}

/// The permutation the compositor draws with. Replaced as a whole when a
/// sort lands; never edited in place.
#[derive(Debug, Clone)]
pub struct DrawOrder {
    indices: Arc<Vec<u32>>,
    generation: u64,
}

impl DrawOrder {
    pub fn identity(n: usize) -> Self {
        Self {
            indices: Arc::new((0..n as u32).collect()),
            generation: 0,
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    /// 0 until the first sort is published.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    pub frame: u64,
    pub dispatched: bool,
    pub published: bool,
    pub order_generation: u64,
    pub stats: FrameStats,
    pub elapsed: Duration,
}

/// Frame loop state: camera, sort worker, current order, compositor.
pub struct Viewer {
    scene: Arc<Scene>,
    camera: OrbitCamera,
    view: ViewState,
    worker: SortWorker,
    scheduler: SortScheduler<MatrixL1Delta>,
    order: DrawOrder,
    spare: Option<Vec<u32>>,
    compositor: Compositor,
    framebuffer: Framebuffer,
    frame: u64,
}

impl Viewer {
    pub fn new(scene: Arc<Scene>, opts: ViewerOptions) -> Result<Self> {
        let camera = OrbitCamera::framing(&scene.point_bounds());
        let view = ViewState::new(
            camera.view(),
            opts.fov_y,
            opts.width,
            opts.height,
            opts.near,
            opts.far,
        );
        let worker = SortWorker::spawn(scene.positions_shared(), opts.buckets)
            .context("spawning depth-sort thread")?;
        let scheduler = SortScheduler::new(
            MatrixL1Delta {
                threshold: opts.sort_threshold,
            },
            opts.sort_interval,
        );

        log::info!(
            "Viewer {}x{} | splats={} | orbit target={:?} radius={:.2}",
            opts.width,
            opts.height,
            scene.len(),
            camera.target,
            camera.radius
        );

        Ok(Self {
            order: DrawOrder::identity(scene.len()),
            spare: None,
            compositor: Compositor::new(opts.raster),
            framebuffer: Framebuffer::new(view.width, view.height),
            scene,
            camera,
            view,
            worker,
            scheduler,
            frame: 0,
        })
    }

    #[inline]
    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    #[inline]
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[inline]
    pub fn draw_order(&self) -> &DrawOrder {
        &self.order
    }

    #[inline]
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    fn publish(&mut self, result: SortResult) {
        if result.order.len() != self.scene.len() {
            log::warn!(
                "discarding sort #{} with {} entries for {} splats",
                result.id,
                result.order.len(),
                self.scene.len()
            );
            return;
        }
        let generation = self.order.generation + 1;
        let old = std::mem::replace(
            &mut self.order,
            DrawOrder {
                indices: Arc::new(result.order),
                generation,
            },
        );
        // Hand the old buffer back to the worker next time, if nobody else
        // still holds it.
        self.spare = Arc::try_unwrap(old.indices).ok();
        log::debug!(
            "published order gen {} (sort #{} took {:.2} ms)",
            generation,
            result.id,
            result.elapsed.as_secs_f64() * 1e3
        );
    }

    fn maybe_dispatch(&mut self) -> bool {
        if !self
            .scheduler
            .poll(&self.view.view, self.worker.in_flight(), Instant::now())
        {
            return false;
        }
        match self.worker.request(self.view.view, self.spare.take()) {
            Dispatch::Sent(_) => true,
            Dispatch::Busy => false,
            Dispatch::Closed => {
                log::warn!("depth-sort worker is gone; keeping the last order");
                false
            }
        }
    }

    /// Sorts for the current camera and waits for the result, so the next
    /// frame starts from a correct order.
    pub fn prime(&mut self) {
        self.view.set_view(self.camera.view());
        self.maybe_dispatch();
        self.settle();
    }

    /// Blocks on any in-flight sort and publishes it. Returns whether a new
    /// order landed.
    pub fn settle(&mut self) -> bool {
        match self.worker.wait() {
            Some(result) => {
                self.publish(result);
                true
            }
            None => false,
        }
    }

    /// One frame: pick up a finished sort, maybe start another, composite
    /// with whatever order is current.
    pub fn frame(&mut self) -> FrameReport {
        let started = Instant::now();
        self.view.set_view(self.camera.view());

        let published = match self.worker.poll() {
            Some(result) => {
                self.publish(result);
                true
            }
            None => false,
        };
        let dispatched = self.maybe_dispatch();

        let stats = self.compositor.render(
            &self.scene,
            self.order.as_slice(),
            &self.view,
            &mut self.framebuffer,
        );

        let report = FrameReport {
            frame: self.frame,
            dispatched,
            published,
            order_generation: self.order.generation,
            stats,
            elapsed: started.elapsed(),
        };
        self.frame += 1;

        log::debug!(
            "frame {} | visible={} culled={} fragments={} | order gen {}{}{}",
            report.frame,
            stats.visible,
            stats.culled,
            stats.fragments,
            report.order_generation,
            if published { " | published" } else { "" },
            if dispatched { " | sort dispatched" } else { "" },
        );
        report
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.framebuffer
            .save_png(path, self.compositor.options().background)
            .with_context(|| format!("writing {}", path.display()))
    }
}

fn load(config: &Config) -> Result<Arc<Scene>> {
    if let Some(path) = &config.scene {
        return Ok(load_scene(path, &config.load_options())?.scene);
    }
    match config.synthetic {
        Some(n) => {
            let records = synthetic::sphere_records(n);
            let scene = synthetic::scene_from_records(records, &config.axes.adapter())?;
            log::info!("Generated synthetic sphere with {} splats", scene.len());
            Ok(Arc::new(scene))
        }
        None => bail!("either --scene or --synthetic is required"),
    }
}

/// Headless run: orbit the scene for `config.frames` frames.
pub fn run(config: &Config) -> Result<()> {
    let scene = load(config)?;

    if let Some(out) = &config.out {
        std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    }

    let mut viewer = Viewer::new(scene, config.viewer_options())?;
    viewer.prime();

    let step = config.orbit_deg.to_radians();
    let mut total = Duration::ZERO;
    let mut sorts = 0u64;
    let mut saved = 0u32;

    for i in 0..config.frames {
        viewer.camera_mut().orbit(step, 0.0);
        let report = viewer.frame();
        total += report.elapsed;
        sorts += report.published as u64;

        let last = i + 1 == config.frames;
        let due = config.save_every > 0 && i % config.save_every == 0;
        if let Some(out) = &config.out {
            if due || last {
                viewer.save_png(&out.join(format!("frame_{i:05}.png")))?;
                saved += 1;
            }
        }
    }

    let frames = config.frames.max(1);
    log::info!(
        "Rendered {} frames | avg {:.2} ms/frame | {} sorts published | {} PNGs written",
        config.frames,
        total.as_secs_f64() * 1e3 / frames as f64,
        sorts,
        saved
    );
    Ok(())
}
