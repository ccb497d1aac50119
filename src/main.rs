// =============================================================================
// FRAMESHELL DEMO - Layer-driven 2D rendering
// =============================================================================
//
// Opens a window, attaches one layer that draws a small animated scene with
// the batching renderer, and runs until the window is closed (Escape quits,
// F11 toggles fullscreen).

use anyhow::{Context, Result};
use frameshell::app::{AppLink, Application, EventFlow, FrameContext, Layer};
use frameshell::backend::{VulkanDevice, VulkanTexture};
use frameshell::config::Config;
use frameshell::logging::init_logging;
use frameshell::platform::{InputEvent, PlatformEvent, WinitPlatform};
use frameshell::render2d::{
    ClipRegion, Ellipse, FramebufferPresenter, Quad, Renderer2D, Renderer2DDesc, Rgba8, Triangle,
};
use frameshell::rhi::{LogSink, RenderDevice, TextureDesc};
use glam::Vec2;
use std::f32::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;
use std::time::Duration;

const CHECKER_SIZE: u32 = 64;

fn main() -> Result<()> {
    let config = Config::load();
    init_logging(&config.debug);
    log::info!("Starting frameshell demo");

    let platform = WinitPlatform::new(&config.window).context("failed to open the window")?;
    // Held past the application so the surface is destroyed before the window.
    let window = platform.window()?.clone();
    let device = VulkanDevice::new(&config, window.as_ref(), Arc::new(LogSink))
        .context("failed to initialize Vulkan")?;
    log::info!("Rendering on {}", device.gpu_name());

    let mut app = Application::new(&config, platform, device)?;
    app.push_layer(Box::new(ShapesLayer::new(Renderer2DDesc::from(&config.renderer2d))))?;

    let result = app.run();
    app.shutdown()?;
    drop(app);
    drop(window);
    Ok(result?)
}

/// Checkerboard RGBA pixels, `CHECKER_SIZE` squared.
fn checkerboard() -> Vec<u8> {
    let cell = CHECKER_SIZE / 8;
    let mut pixels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if light { 230 } else { 40 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

struct ShapesLayer {
    desc: Renderer2DDesc,
    renderer: Option<Renderer2D<VulkanDevice>>,
    presenter: Option<FramebufferPresenter<VulkanDevice>>,
    checker: Option<VulkanTexture>,
    link: AppLink,
    time: f32,
    paused: bool,
    frames: u64,
}

impl ShapesLayer {
    fn new(desc: Renderer2DDesc) -> Self {
        Self {
            desc,
            renderer: None,
            presenter: None,
            checker: None,
            link: AppLink::default(),
            time: 0.0,
            paused: false,
            frames: 0,
        }
    }

    fn record_scene(
        renderer: &mut Renderer2D<VulkanDevice>,
        t: f32,
        checker: Option<&VulkanTexture>,
    ) -> frameshell::Result<()> {
        // background panel, drawn first but kept behind everything by depth
        renderer.draw_quad(
            Quad::rect(Vec2::new(-600.0, -340.0), Vec2::new(1200.0, 680.0), Rgba8::rgb(24, 26, 33))
                .with_depth(-10),
        );

        if let Some(checker) = checker {
            let spin = Vec2::from_angle(t * 0.5);
            let corners = [
                Vec2::new(-80.0, -80.0),
                Vec2::new(80.0, -80.0),
                Vec2::new(80.0, 80.0),
                Vec2::new(-80.0, 80.0),
            ]
            .map(|p| Vec2::new(-300.0, 0.0) + spin.rotate(p));
            renderer.draw_quad_managed(Quad::new(corners, Rgba8::WHITE), checker)?;
        }

        renderer.draw_triangle(Triangle::new(
            [
                Vec2::new(0.0, -120.0),
                Vec2::new(110.0, 80.0),
                Vec2::new(-110.0, 80.0),
            ],
            Rgba8::rgb(230, 90, 70),
        ));

        // clipped so only the left half shows
        renderer.draw_ellipse(
            Ellipse::ellipse(Vec2::new(300.0, 0.0), Vec2::new(140.0, 80.0), t * 0.3, Rgba8::rgb(80, 170, 240))
                .with_clip(ClipRegion::from_rect(Vec2::new(160.0, -100.0), Vec2::new(140.0, 200.0))),
        );
        renderer.draw_ring(Vec2::new(300.0, 0.0), 120.0, 100.0, Rgba8::new(255, 255, 255, 160));
        renderer.draw_arc(
            Vec2::new(0.0, 220.0),
            60.0,
            10.0,
            FRAC_PI_2,
            FRAC_PI_2 + (t % TAU),
            Rgba8::rgb(120, 220, 120),
        );
        renderer.draw_circle(Vec2::new(0.0, -220.0), 24.0 + 8.0 * t.sin(), Rgba8::rgb(250, 210, 80));

        for i in 0..12 {
            let x = -550.0 + i as f32 * 100.0;
            renderer.draw_line_gradient(
                Vec2::new(x, 300.0),
                Vec2::new(x + 50.0, 320.0),
                Rgba8::rgb(255, 0, 128),
                Rgba8::rgb(0, 200, 255),
            );
        }
        Ok(())
    }
}

impl Layer<VulkanDevice> for ShapesLayer {
    fn name(&self) -> &str {
        "shapes"
    }

    fn on_attach(&mut self, app: frameshell::AppHandle, device: &VulkanDevice) -> frameshell::Result<()> {
        self.link.attach(app);
        let mut renderer = Renderer2D::new(device, self.desc.clone())?;
        let checker = device.create_texture(
            &TextureDesc {
                width: CHECKER_SIZE,
                height: CHECKER_SIZE,
                debug_name: "checkerboard",
            },
            &checkerboard(),
        );
        match checker {
            Ok(texture) => self.checker = Some(texture),
            Err(e) => {
                renderer.destroy(device);
                return Err(e.into());
            }
        }
        match FramebufferPresenter::new(device) {
            Ok(presenter) => self.presenter = Some(presenter),
            Err(e) => {
                renderer.destroy(device);
                if let Some(texture) = self.checker.take() {
                    device.destroy_texture(texture);
                }
                return Err(e);
            }
        }
        self.renderer = Some(renderer);

        self.link.on_frame_ended(|| log::info!("first frame submitted"))?;
        Ok(())
    }

    fn on_detach(&mut self, device: &VulkanDevice) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.destroy(device);
        }
        if let Some(mut presenter) = self.presenter.take() {
            presenter.destroy(device);
        }
        if let Some(texture) = self.checker.take() {
            device.destroy_texture(texture);
        }
        self.link.detach();
        log::info!("shapes layer rendered {} frames", self.frames);
    }

    fn on_update(&mut self, dt: Duration) -> frameshell::Result<()> {
        if !self.paused {
            self.time += dt.as_secs_f32();
        }
        Ok(())
    }

    fn on_event(&mut self, event: &PlatformEvent) -> EventFlow {
        if let PlatformEvent::Input(input @ InputEvent::Key { .. }) = event {
            if input.is_key_press("Space") {
                self.paused = !self.paused;
                let paused = self.paused;
                // logged after the frame that observed the toggle
                if let Err(e) = self.link.on_frame_ended(move || {
                    log::info!("animation {}", if paused { "paused" } else { "resumed" })
                }) {
                    log::warn!("{e}");
                }
                return EventFlow::Consumed;
            }
        }
        EventFlow::Propagate
    }

    fn on_render(&mut self, frame: &mut FrameContext<'_, VulkanDevice>) -> frameshell::Result<()> {
        let (Some(renderer), Some(presenter)) = (self.renderer.as_mut(), self.presenter.as_mut()) else {
            return Ok(());
        };
        renderer.begin_rendering(frame.device, frame.command_list, frame.extent)?;
        Self::record_scene(renderer, self.time, self.checker.as_ref())?;
        let stats = renderer.end_rendering(frame.device, frame.command_list)?;
        if let Some(texture) = renderer.texture() {
            presenter.present(frame.device, frame.command_list, texture, frame.framebuffer, frame.extent)?;
        }

        self.frames += 1;
        if self.frames == 1 {
            log::debug!("first frame: {stats:?}");
        }
        Ok(())
    }
}
