// winit-backed platform
//
// The shell runs its own loop, so winit is pumped once per iteration instead
// of owning control flow through `run_app`.

use super::{InputEvent, Platform, PlatformEvent};
use crate::config::WindowConfig;
use crate::error::{Result, ShellError};
use crate::rhi::Extent;
use std::sync::Arc;
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Ime, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowId};

/// Attempts to let the platform deliver `resumed` during construction.
const STARTUP_PUMPS: usize = 200;

pub struct WinitPlatform {
    event_loop: EventLoop<()>,
    state: WindowState,
}

struct WindowState {
    config: WindowConfig,
    window: Option<Arc<Window>>,
    creation_error: Option<String>,
    events: Vec<PlatformEvent>,
    minimized: bool,
}

impl WinitPlatform {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| ShellError::Init(format!("event loop: {e}")))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut platform = Self {
            event_loop,
            state: WindowState {
                config: config.clone(),
                window: None,
                creation_error: None,
                events: Vec::new(),
                minimized: false,
            },
        };

        for _ in 0..STARTUP_PUMPS {
            if platform.state.window.is_some() {
                break;
            }
            if let Some(err) = platform.state.creation_error.take() {
                return Err(ShellError::Init(format!("window creation: {err}")));
            }
            if let PumpStatus::Exit(code) = platform
                .event_loop
                .pump_app_events(Some(Duration::from_millis(5)), &mut platform.state)
            {
                return Err(ShellError::Init(format!(
                    "event loop exited during startup (code {code})"
                )));
            }
        }

        if platform.state.window.is_none() {
            return Err(ShellError::Init("platform never resumed the application".into()));
        }

        log::info!(
            "Window created: {}x{} ({})",
            config.width,
            config.height,
            if config.fullscreen { "fullscreen" } else { "windowed" }
        );
        Ok(platform)
    }

    /// Window handle for surface creation.
    pub fn window(&self) -> Result<&Arc<Window>> {
        self.state
            .window
            .as_ref()
            .ok_or_else(|| ShellError::Platform("window not created".into()))
    }
}

impl Platform for WinitPlatform {
    fn poll_events(&mut self, events: &mut Vec<PlatformEvent>) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(_) = status {
            self.state.events.push(PlatformEvent::CloseRequested);
        }
        events.append(&mut self.state.events);
    }

    fn pixel_size(&self) -> Extent {
        self.state
            .window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                Extent::new(size.width, size.height)
            })
            .unwrap_or_default()
    }

    fn set_title(&mut self, title: &str) {
        if let Some(window) = &self.state.window {
            window.set_title(title);
        }
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        if let Some(window) = &self.state.window {
            if fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }
}

impl WindowState {
    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        let extent = Extent::new(size.width, size.height);
        if extent.is_empty() {
            if !self.minimized {
                self.minimized = true;
                self.events.push(PlatformEvent::Minimized);
            }
            return;
        }
        if self.minimized {
            self.minimized = false;
            self.events.push(PlatformEvent::Restored);
        }
        self.events.push(PlatformEvent::Resized(extent));
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_resizable(self.config.resizable)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        if self.config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => self.creation_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let translated = match event {
            WindowEvent::CloseRequested => Some(PlatformEvent::CloseRequested),
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.handle_resize(size);
                None
            }
            WindowEvent::ScaleFactorChanged { .. } => self.window.as_ref().map(|w| {
                let size = w.inner_size();
                PlatformEvent::PixelSizeChanged(Extent::new(size.width, size.height))
            }),
            WindowEvent::KeyboardInput { event, .. } => match event.physical_key {
                PhysicalKey::Code(code) => Some(PlatformEvent::Input(InputEvent::Key {
                    key: format!("{code:?}"),
                    pressed: event.state == ElementState::Pressed,
                    repeat: event.repeat,
                })),
                PhysicalKey::Unidentified(_) => None,
            },
            WindowEvent::CursorMoved { position, .. } => {
                Some(PlatformEvent::Input(InputEvent::PointerMoved {
                    x: position.x as f32,
                    y: position.y as f32,
                }))
            }
            WindowEvent::MouseInput { state, button, .. } => {
                Some(PlatformEvent::Input(InputEvent::PointerButton {
                    button: button_index(button),
                    pressed: state == ElementState::Pressed,
                }))
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (dx, dy) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (x, y),
                    MouseScrollDelta::PixelDelta(p) => (p.x as f32, p.y as f32),
                };
                Some(PlatformEvent::Input(InputEvent::Wheel { dx, dy }))
            }
            WindowEvent::Focused(focused) => Some(PlatformEvent::Input(InputEvent::Focused(focused))),
            WindowEvent::Ime(Ime::Commit(text)) => Some(PlatformEvent::Input(InputEvent::Text(text))),
            _ => None,
        };

        if let Some(event) = translated {
            self.events.push(event);
        }
    }
}

fn button_index(button: MouseButton) -> u16 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Right => 1,
        MouseButton::Middle => 2,
        MouseButton::Back => 3,
        MouseButton::Forward => 4,
        MouseButton::Other(n) => n,
    }
}
