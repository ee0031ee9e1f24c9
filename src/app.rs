// =============================================================================
// APP - window, device, scene and the frame loop
// =============================================================================

use crate::backend::{GpuDevice, VulkanDevice};
use crate::camera::Camera;
use crate::config::Config;
use crate::error::Result;
use crate::model::{Drawable, Model, ModelData};
use crate::render_system::RenderSystem;
use crate::renderer::Renderer;
use crate::scene::{Scene, Transform};
use crate::window::{AppWindow, FrameWindow};
use anyhow::Context;
use glam::Vec3;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_rendered: u64,
    /// Frames dropped because the swapchain was out of date on acquire
    pub frames_skipped: u64,
    pub swapchain_recreations: usize,
}

/// Frame loop knobs taken from the config
#[derive(Debug, Clone)]
pub struct FrameLoopSettings {
    pub title: String,
    pub show_fps: bool,
    pub max_frames: Option<u64>,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl FrameLoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            title: config.window.title.clone(),
            show_fps: config.debug.show_fps,
            max_frames: config.max_frames(),
            fov_y: config.camera.fov_degrees.to_radians(),
            near: config.camera.near,
            far: config.camera.far,
        }
    }
}

/// Frames per second, averaged over roughly one second
pub struct FpsCounter {
    frame_count: u32,
    last_update: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_update: now,
            last_frame: now,
        }
    }

    /// Count a frame finished at `now`. Once a second has passed since the
    /// last report, returns `(fps, last frame time in ms)` and starts over.
    pub fn tick_at(&mut self, now: Instant) -> Option<(f32, f32)> {
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_update);
        if elapsed < Duration::from_secs(1) {
            return None;
        }

        let fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_update = now;
        Some((fps, frame_time * 1000.0))
    }
}

/// Poll events and render until the window closes or `max_frames` is hit.
///
/// Waits for the device to go idle before returning.
pub fn run_frame_loop<D: GpuDevice, W: FrameWindow>(
    window: &mut W,
    renderer: &mut Renderer<D>,
    render_system: &RenderSystem<D>,
    scene: &Scene,
    camera: &mut Camera,
    settings: &FrameLoopSettings,
) -> Result<FrameStats> {
    let mut stats = FrameStats::default();
    let mut fps = FpsCounter::new(Instant::now());

    while !window.should_close() {
        window.poll_events();
        if window.should_close() {
            break;
        }
        if settings
            .max_frames
            .is_some_and(|max| stats.frames_rendered >= max)
        {
            log::info!("Reached {} frames, exiting", stats.frames_rendered);
            break;
        }

        camera.set_perspective_projection(
            settings.fov_y,
            renderer.aspect_ratio(),
            settings.near,
            settings.far,
        );

        let Some(cmd) = renderer.begin_frame(window)? else {
            stats.frames_skipped += 1;
            continue;
        };

        renderer.begin_render_pass(cmd);
        render_system.render_objects(cmd, scene, camera);
        renderer.end_render_pass(cmd);
        renderer.end_frame(window)?;
        stats.frames_rendered += 1;

        if settings.show_fps {
            if let Some((rate, frame_ms)) = fps.tick_at(Instant::now()) {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    settings.title, rate, frame_ms
                ));
            }
        }
    }

    renderer.wait_idle()?;
    stats.swapchain_recreations = renderer.swapchain_recreations();
    Ok(stats)
}

/// The demo application: one cube in front of a fixed camera
///
/// Fields drop top to bottom, so GPU objects go before the device and the
/// window outlives the surface.
pub struct App {
    renderer: Renderer<VulkanDevice>,
    render_system: RenderSystem<VulkanDevice>,
    scene: Scene,
    camera: Camera,
    settings: FrameLoopSettings,
    device: Arc<VulkanDevice>,
    window: AppWindow,
}

impl App {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut window = AppWindow::new(
            &config.window.title,
            config.window.width,
            config.window.height,
        )?;

        let device = VulkanDevice::new(
            window.handle(),
            &config.window.title,
            config.validation_enabled(),
            config.present_mode(),
        )
        .context("Failed to create Vulkan device")?;

        let renderer = Renderer::new(device.clone(), &mut window, config.graphics.clear_color)?;

        let render_system = RenderSystem::new(
            &device,
            renderer.render_pass(),
            &config.shaders.vertex,
            &config.shaders.fragment,
        )
        .context("Failed to create render system")?;

        let cube: Arc<dyn Drawable> = Arc::new(Model::new(&device, &ModelData::cube(Vec3::ZERO))?);
        let mut scene = Scene::new();
        scene.spawn(
            cube,
            Vec3::ONE,
            Transform {
                translation: Vec3::new(0.0, 0.0, 2.5),
                scale: Vec3::splat(0.5),
                ..Default::default()
            },
        );

        let mut camera = Camera::default();
        camera.set_view_target(
            Vec3::from(config.camera.position),
            Vec3::from(config.camera.target),
            Vec3::Y,
        );

        Ok(Self {
            renderer,
            render_system,
            scene,
            camera,
            settings: FrameLoopSettings::from_config(config),
            device,
            window,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<FrameStats> {
        log::info!(
            "Rendering {} object(s) on {}",
            self.scene.len(),
            self.device.device_name()
        );

        let stats = run_frame_loop(
            &mut self.window,
            &mut self.renderer,
            &self.render_system,
            &self.scene,
            &mut self.camera,
            &self.settings,
        )?;
        Ok(stats)
    }
}
