// Batched 2D drawing on top of `crate::rhi`

pub mod chunk;
pub mod color;
pub mod ellipse;
pub mod line;
mod presenter;
pub mod projection;
pub mod records;
mod renderer;
pub mod shapes;
pub mod triangle;
pub mod virtual_texture;

pub use color::{pack_rgba, Rgba8};
pub use presenter::{FramebufferPresenter, PRESENT_VERTEX_COUNT};
pub use records::{ClipRegion, NO_CLIP, NO_TEXTURE};
pub use renderer::{FrameStats, Renderer2D, Renderer2DDesc};
pub use shapes::{Ellipse, Quad, Triangle, QUAD_TEX_COORDS};
pub use virtual_texture::{VirtualTextureId, VirtualTextureTable};
