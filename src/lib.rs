// frameshell
//
// A windowed application shell over Vulkan: a frame loop with frames in
// flight, swapchain recreation, a layer stack with deferred tasks, and a
// batching 2D renderer for triangles, quads, lines and ellipses.
//
// The loop and the renderer only see the contracts in `rhi` and `platform`;
// `backend` and `platform::window` are the real providers.

pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod render2d;
pub mod rhi;

pub use app::{AppHandle, AppLink, Application, EventFlow, FrameContext, Layer};
pub use config::Config;
pub use error::{GpuError, GpuResult, Result, ShellError};
pub use render2d::{FramebufferPresenter, Renderer2D};
