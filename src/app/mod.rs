// Frame lifecycle core
//
// Generic over the platform and GPU contracts in `crate::platform` and
// `crate::rhi`; nothing in here touches a graphics API directly.

pub mod application;
pub mod deferred;
pub mod frame_sync;
pub mod layer;
pub mod submit;
pub mod swapchain;
pub mod timing;

pub use application::{Application, Iteration, LoopPhase, LoopStats};
pub use deferred::{DeferredQueue, DeferredTask};
pub use frame_sync::{FrameSlot, FrameSlots};
pub use layer::{AppHandle, AppLink, EventFlow, FrameContext, Layer, LayerStack};
pub use submit::FrameRecorder;
pub use swapchain::{SwapchainImage, SwapchainManager};
