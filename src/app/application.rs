// =============================================================================
// APPLICATION LOOP
// =============================================================================
//
// Initializing -> Running -> Destroyed. Each iteration:
//
//   EventPump -> [Resizing] -> Updating -> [Rendering] -> PostRender
//
// Resizing replaces the rest of the iteration: the chain is rebuilt, the
// acquire semaphores are replaced and the frame counter restarts at 0.
// Rendering is skipped while minimized. PostRender runs the deferred tasks
// and, on a time-accumulator cadence, GPU garbage collection.

use super::deferred::{self, DeferredQueue};
use super::frame_sync::FrameSlots;
use super::layer::{AppHandle, Layer, LayerStack};
use super::submit::FrameRecorder;
use super::swapchain::SwapchainManager;
use super::timing::{FpsCounter, FrameClock, GcCadence};
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::platform::{InputEvent, Platform, PlatformEvent};
use crate::rhi::{AcquireStatus, Extent, SurfaceDevice};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Initializing,
    Running,
    Destroyed,
}

/// What one loop iteration ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// The swapchain was rebuilt; update and render were skipped.
    Resized,
    Rendered,
    /// Minimized, or the acquire asked for recreation.
    NotRendered,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub frames_rendered: u64,
    pub recreations: u64,
    pub gc_runs: u64,
    pub deferred_tasks_run: u64,
}

/// Values the loop reads from `Config`.
#[derive(Debug, Clone)]
struct LoopSettings {
    title: String,
    show_fps: bool,
    quit_key: String,
    fullscreen_key: String,
}

/// GPU objects that live exactly as long as the running application.
struct FrameResources<D: SurfaceDevice> {
    frames: FrameSlots<D>,
    swapchain: SwapchainManager<D>,
    recorder: FrameRecorder<D>,
}

pub struct Application<P: Platform, D: SurfaceDevice> {
    settings: LoopSettings,
    layers: LayerStack<D>,
    deferred: Rc<RefCell<DeferredQueue>>,
    resources: Option<FrameResources<D>>,
    platform: P,
    events: Vec<PlatformEvent>,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE FLAGS
    // ─────────────────────────────────────────────────────────────────────────
    phase: LoopPhase,
    running: bool,
    needs_resize: bool,
    minimized: bool,
    fullscreen: bool,

    clock: FrameClock,
    gc: GcCadence,
    fps: FpsCounter,
    stats: LoopStats,

    // Dropped last: everything above may still reference it.
    device: D,
}

impl<P: Platform, D: SurfaceDevice> Application<P, D> {
    pub fn new(config: &Config, platform: P, device: D) -> Result<Self> {
        let frames = FrameSlots::new(&device, config.frames_in_flight())?;

        let extent = platform.pixel_size();
        let swapchain = if extent.is_empty() {
            log::info!("Window has no client area yet; deferring swapchain creation");
            SwapchainManager::empty()
        } else {
            match SwapchainManager::create(&device, extent) {
                Ok(swapchain) => swapchain,
                Err(e) => {
                    frames.destroy(&device);
                    return Err(ShellError::Init(format!("swapchain: {e}")));
                }
            }
        };

        let recorder = match FrameRecorder::new(&device, config.graphics.clear_color) {
            Ok(recorder) => recorder,
            Err(e) => {
                swapchain.destroy(&device);
                frames.destroy(&device);
                return Err(e);
            }
        };

        log::info!(
            "Application initialized: {} frames in flight, {}x{}",
            frames.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            settings: LoopSettings {
                title: config.window.title.clone(),
                show_fps: config.debug.show_fps,
                quit_key: config.controls.quit_key.clone(),
                fullscreen_key: config.controls.fullscreen_key.clone(),
            },
            layers: LayerStack::default(),
            deferred: Rc::new(RefCell::new(DeferredQueue::new())),
            resources: Some(FrameResources {
                frames,
                swapchain,
                recorder,
            }),
            platform,
            events: Vec::new(),
            phase: LoopPhase::Initializing,
            running: true,
            needs_resize: extent.is_empty(),
            minimized: extent.is_empty(),
            fullscreen: config.window.fullscreen,
            clock: FrameClock::new(),
            gc: GcCadence::new(config.graphics.gc_interval_secs),
            fps: FpsCounter::new(),
            stats: LoopStats::default(),
            device,
        })
    }

    // =========================================================================
    // LAYERS
    // =========================================================================

    pub fn push_layer(&mut self, mut layer: Box<dyn Layer<D>>) -> Result<()> {
        let handle = AppHandle::new(&self.deferred);
        if let Err(e) = layer.on_attach(handle.clone(), &self.device) {
            handle.revoke();
            return Err(e);
        }
        log::debug!("Attached layer '{}'", layer.name());
        self.layers.push(layer, handle);
        Ok(())
    }

    /// Detach and return the most recently attached layer. Any handle it
    /// kept from `on_attach` rejects new tasks from here on.
    pub fn pop_layer(&mut self) -> Option<Box<dyn Layer<D>>> {
        let (mut layer, handle) = self.layers.pop()?;
        layer.on_detach(&self.device);
        handle.revoke();
        log::debug!("Detached layer '{}'", layer.name());
        Some(layer)
    }

    /// Queue a task to run once after the current frame.
    pub fn on_frame_ended(&self, task: impl FnOnce() + 'static) {
        self.deferred.borrow_mut().push(Box::new(task));
    }

    // =========================================================================
    // RUN LOOP
    // =========================================================================

    /// Iterate until a close request, then drain the GPU.
    pub fn run(&mut self) -> Result<()> {
        if self.phase == LoopPhase::Destroyed {
            return Err(ShellError::Misuse("run called after shutdown"));
        }
        self.phase = LoopPhase::Running;
        log::info!("Entering main loop");

        while self.running {
            self.run_iteration()?;
        }

        log::info!("Main loop finished after {} iterations", self.stats.iterations);
        self.device.wait_idle().map_err(ShellError::sync)
    }

    pub fn run_iteration(&mut self) -> Result<Iteration> {
        self.phase = LoopPhase::Running;
        self.stats.iterations += 1;

        self.pump_events();

        if self.needs_resize && !self.minimized {
            self.recreate_swapchain()?;
            self.run_deferred_tasks();
            return Ok(Iteration::Resized);
        }

        let dt = self.clock.tick();
        for layer in self.layers.front_to_back() {
            layer.on_update(dt)?;
        }

        let rendered = !self.minimized && self.render_frame()?;

        self.run_deferred_tasks();

        if self.gc.tick(dt.as_secs_f32()) {
            self.device.run_garbage_collection();
            self.stats.gc_runs += 1;
            log::trace!("GPU garbage collection ran");
        }

        if rendered {
            self.update_title(dt);
            Ok(Iteration::Rendered)
        } else {
            Ok(Iteration::NotRendered)
        }
    }

    fn pump_events(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        self.platform.poll_events(&mut events);

        for event in events.drain(..) {
            match &event {
                PlatformEvent::CloseRequested => {
                    log::info!("Close requested, shutting down...");
                    self.running = false;
                }
                PlatformEvent::Resized(extent) | PlatformEvent::PixelSizeChanged(extent) => {
                    log::debug!("Surface size changed to {}x{}", extent.width, extent.height);
                    self.needs_resize = true;
                    self.minimized = extent.is_empty();
                }
                PlatformEvent::Minimized => self.minimized = true,
                PlatformEvent::Restored => self.minimized = false,
                PlatformEvent::Input(_) => {}
            }

            let consumed = self.layers.dispatch_event(&event);
            if let (false, PlatformEvent::Input(input)) = (consumed, &event) {
                self.handle_controls(input);
            }
        }

        self.events = events;
    }

    fn handle_controls(&mut self, input: &InputEvent) {
        if input.is_key_press(&self.settings.quit_key) {
            log::info!("Quit key pressed");
            self.running = false;
        } else if input.is_key_press(&self.settings.fullscreen_key) {
            self.fullscreen = !self.fullscreen;
            self.platform.set_fullscreen(self.fullscreen);
            self.needs_resize = true;
        }
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    fn recreate_swapchain(&mut self) -> Result<()> {
        let extent = self.platform.pixel_size();
        if extent.is_empty() {
            // Stay flagged; the chain is rebuilt once the window has area again.
            self.minimized = true;
            return Ok(());
        }

        let Some(res) = self.resources.as_mut() else {
            return Err(ShellError::Misuse("swapchain recreation after shutdown"));
        };

        res.frames.wait_all(&self.device).map_err(ShellError::sync)?;
        self.device.wait_idle().map_err(ShellError::sync)?;

        res.swapchain.recreate(&self.device, extent)?;
        res.frames.recreate_acquire_semaphores(&self.device)?;
        res.frames.reset_counter();

        self.needs_resize = false;
        self.stats.recreations += 1;
        log::debug!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    // =========================================================================
    // RENDER FRAME
    // =========================================================================

    fn render_frame(&mut self) -> Result<bool> {
        let Some(res) = self.resources.as_mut() else {
            return Err(ShellError::Misuse("render after shutdown"));
        };
        if !res.swapchain.is_ready() {
            self.needs_resize = true;
            return Ok(false);
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait until this slot's previous submission retired
        // ─────────────────────────────────────────────────────────────────────
        res.frames.wait_current(&self.device).map_err(ShellError::sync)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire. A stale chain leaves the fence signaled.
        // ─────────────────────────────────────────────────────────────────────
        let acquire_semaphore = res.frames.current().acquire_semaphore;
        let image_index = match res
            .swapchain
            .acquire_next_image(&self.device, acquire_semaphore)
            .map_err(ShellError::sync)?
        {
            AcquireStatus::Ready(index) => index,
            status => {
                log::debug!("Acquire reported {:?}; swapchain will be recreated", status);
                self.needs_resize = true;
                return Ok(false);
            }
        };

        res.frames.reset_current(&self.device).map_err(ShellError::sync)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Record layers, submit, present
        // ─────────────────────────────────────────────────────────────────────
        let layers = &mut self.layers;
        let status = res.recorder.record_and_submit(
            &self.device,
            &res.swapchain,
            res.frames.current(),
            res.frames.current_index(),
            image_index,
            |frame| {
                for layer in layers.front_to_back() {
                    layer.on_render(frame)?;
                }
                Ok(())
            },
        )?;

        if status.needs_recreation() {
            log::debug!("Present reported {:?}; swapchain will be recreated", status);
            self.needs_resize = true;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Advance to next frame slot
        // ─────────────────────────────────────────────────────────────────────
        res.frames.advance();
        self.stats.frames_rendered += 1;
        Ok(true)
    }

    fn run_deferred_tasks(&mut self) {
        let batch = self.deferred.borrow_mut().take_batch();
        let ran = deferred::run_batch(batch);
        self.stats.deferred_tasks_run += ran as u64;
    }

    fn update_title(&mut self, dt: std::time::Duration) {
        if !self.settings.show_fps {
            return;
        }
        if let Some((fps, frame_ms)) = self.fps.frame_rendered(dt) {
            let mode = if self.fullscreen { "fullscreen" } else { "windowed" };
            let title = format!(
                "{} - {:.0} FPS ({:.2}ms) [{}]",
                self.settings.title, fps, frame_ms, mode
            );
            self.platform.set_title(&title);
        }
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Drain the GPU, detach every layer (newest first), destroy frame
    /// resources. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.phase == LoopPhase::Destroyed {
            return Ok(());
        }
        log::info!("Shutting down application...");

        let idle = self.device.wait_idle();

        while self.pop_layer().is_some() {}

        if let Some(res) = self.resources.take() {
            res.recorder.destroy(&self.device);
            res.swapchain.destroy(&self.device);
            res.frames.destroy(&self.device);
        }
        self.device.run_garbage_collection();
        self.phase = LoopPhase::Destroyed;

        idle.map_err(ShellError::sync)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn request_exit(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn needs_resize(&self) -> bool {
        self.needs_resize
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Slot the next frame will use.
    pub fn current_frame_slot(&self) -> usize {
        self.resources
            .as_ref()
            .map(|r| r.frames.current_index())
            .unwrap_or(0)
    }

    pub fn swapchain_extent(&self) -> Extent {
        self.resources
            .as_ref()
            .map(|r| r.swapchain.extent())
            .unwrap_or_default()
    }

    pub fn swapchain_generation(&self) -> u64 {
        self.resources
            .as_ref()
            .map(|r| r.swapchain.generation())
            .unwrap_or(0)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }
}

impl<P: Platform, D: SurfaceDevice> Drop for Application<P, D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Shutdown failed: {}", e);
        }
    }
}
