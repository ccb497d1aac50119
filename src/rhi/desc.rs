// Declarative descriptors passed to a `RenderDevice`

use super::RenderDevice;

/// Size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area extent (minimized window) cannot back a swapchain.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Constant,
    Structured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub byte_size: u64,
    pub usage: BufferUsage,
    pub debug_name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub debug_name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Clamp,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub linear_filter: bool,
    pub address_mode: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            linear_filter: true,
            address_mode: AddressMode::Clamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderVisibility {
    Vertex,
    Pixel,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    ConstantBuffer,
    StructuredBuffer,
    Sampler,
    /// One sampled texture.
    Texture,
    /// Bindless array of sampled textures; elements may be left unbound.
    TextureArray { size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingLayoutItem {
    pub binding: u32,
    pub kind: BindingKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingLayoutDesc {
    pub visibility: ShaderVisibility,
    pub items: Vec<BindingLayoutItem>,
}

pub enum BindingSetItem<'a, D: RenderDevice + ?Sized> {
    ConstantBuffer { binding: u32, buffer: &'a D::Buffer },
    StructuredBuffer { binding: u32, buffer: &'a D::Buffer },
    Sampler { binding: u32, sampler: &'a D::Sampler },
    Texture {
        binding: u32,
        array_element: u32,
        texture: &'a D::Texture,
    },
}

pub struct BindingSetDesc<'a, D: RenderDevice + ?Sized> {
    pub items: Vec<BindingSetItem<'a, D>>,
}

impl<'a, D: RenderDevice + ?Sized> Default for BindingSetDesc<'a, D> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<'a, D: RenderDevice + ?Sized> BindingSetDesc<'a, D> {
    pub fn item(mut self, item: BindingSetItem<'a, D>) -> Self {
        self.items.push(item);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float2,
    Uint,
}

impl VertexFormat {
    pub fn byte_size(self) -> u32 {
        match self {
            VertexFormat::Float2 => 8,
            VertexFormat::Uint => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    LineList,
}

pub struct PipelineDesc<'a, D: RenderDevice + ?Sized> {
    pub debug_name: &'static str,
    /// Shader names resolved by the provider (file stem under its shader dir).
    pub vertex_shader: &'static str,
    pub pixel_shader: &'static str,
    /// `None` for procedural draws that read everything from buffers.
    pub vertex_layout: Option<VertexLayout>,
    /// One layout per descriptor space, in space order.
    pub binding_layouts: Vec<&'a D::BindingLayout>,
    pub topology: PrimitiveTopology,
    pub alpha_blend: bool,
}

pub struct GraphicsState<'a, D: RenderDevice + ?Sized> {
    pub pipeline: &'a D::Pipeline,
    pub framebuffer: &'a D::Framebuffer,
    pub extent: Extent,
    /// Bound in space order.
    pub bindings: Vec<&'a D::BindingSet>,
    pub vertex_buffer: Option<&'a D::Buffer>,
    pub index_buffer: Option<&'a D::Buffer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawArguments {
    /// Index count for indexed draws, vertex count otherwise.
    pub count: u32,
    pub indexed: bool,
}

impl DrawArguments {
    pub fn indexed(index_count: u32) -> Self {
        Self {
            count: index_count,
            indexed: true,
        }
    }

    pub fn vertices(vertex_count: u32) -> Self {
        Self {
            count: vertex_count,
            indexed: false,
        }
    }
}
