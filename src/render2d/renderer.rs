// Batching 2D renderer
//
// Draw calls queue CPU records. `end_rendering` turns them into chunks,
// uploads each chunk into its own set of GPU buffers and issues one draw per
// chunk: triangles and quads first, then lines, then ellipses. Chunk GPU
// resources are created on demand and reused by position every frame.
//
// Everything is drawn into the renderer's own texture, cleared to
// transparent by `begin_rendering` and rebuilt when the output size changes.
// `FramebufferPresenter` composites it onto a frame.
//
// Descriptor spaces (matching `shaders/renderer2d_*`):
//
// | space | binding | triangle / ellipse       | line     |
// |-------|---------|--------------------------|----------|
// | 0     | 0       | view-projection UBO      | same     |
// | 0     | 1       | instances / shapes SSBO  |          |
// | 0     | 2       | clip regions SSBO        |          |
// | 0     | 3       | sampler                  |          |
// | 1     | 0       | texture array (bindless) |          |

use super::color::Rgba8;
use super::ellipse::{unclipped_shape, EllipseBatch, EllipseChunk, EllipseRecord};
use super::line::{LineBatch, LineChunk};
use super::projection::view_projection;
use super::records::{
    ClipRegion, EllipseShape, LineVertex, TriangleInstance, TriangleVertex,
    ELLIPSE_VERTICES_PER_SHAPE, NO_TEXTURE,
};
use super::shapes::{Ellipse, Quad, Triangle};
use super::triangle::{TriangleBatch, TriangleChunk, TriangleRecord};
use super::virtual_texture::{VirtualTextureId, VirtualTextureTable};
use crate::config::Renderer2DConfig;
use crate::error::{GpuResult, Result, ShellError};
use crate::rhi::{
    BindingKind, BindingLayoutDesc, BindingLayoutItem, BindingSetDesc, BindingSetItem,
    BufferDesc, BufferUsage, DrawArguments, Extent, GraphicsState, PipelineDesc,
    PrimitiveTopology, RenderDevice, SamplerDesc, ShaderVisibility, TextureDesc,
    VertexAttribute, VertexFormat, VertexLayout,
};
use glam::{Mat4, Vec2};
use std::mem::size_of;

#[derive(Debug, Clone, PartialEq)]
pub struct Renderer2DDesc {
    pub virtual_size: Vec2,
    pub triangle_chunk_capacity: usize,
    pub line_chunk_capacity: usize,
    pub ellipse_chunk_capacity: usize,
    /// Requested texture array size; clamped to the device limit.
    pub texture_array_size: u32,
    pub initial_texture_capacity: u32,
}

impl Default for Renderer2DDesc {
    fn default() -> Self {
        Self::from(&Renderer2DConfig::default())
    }
}

impl From<&Renderer2DConfig> for Renderer2DDesc {
    fn from(config: &Renderer2DConfig) -> Self {
        Self {
            virtual_size: Vec2::new(config.virtual_width, config.virtual_height),
            triangle_chunk_capacity: config.triangle_chunk_capacity.max(1),
            // whole lines only
            line_chunk_capacity: (config.line_chunk_capacity & !1).max(2),
            ellipse_chunk_capacity: config.ellipse_chunk_capacity.max(1),
            texture_array_size: config.texture_array_size,
            initial_texture_capacity: config.initial_texture_capacity,
        }
    }
}

/// What one `end_rendering` call submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub triangle_chunks: usize,
    pub line_chunks: usize,
    pub ellipse_chunks: usize,
    pub draw_calls: usize,
    pub texture_table_optimized: bool,
}

struct OffscreenTarget<D: RenderDevice> {
    texture: D::Texture,
    framebuffer: D::Framebuffer,
    extent: Extent,
}

impl<D: RenderDevice> OffscreenTarget<D> {
    fn new(device: &D, extent: Extent) -> GpuResult<Self> {
        let texture = device.create_render_target(&TextureDesc {
            width: extent.width,
            height: extent.height,
            debug_name: "renderer2d target",
        })?;
        match device.create_framebuffer(&texture, extent) {
            Ok(framebuffer) => Ok(Self {
                texture,
                framebuffer,
                extent,
            }),
            Err(e) => {
                device.destroy_texture(texture);
                Err(e)
            }
        }
    }

    fn destroy(self, device: &D) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.texture);
    }
}

struct TriangleChunkGpu<D: RenderDevice> {
    vertices: D::Buffer,
    indices: D::Buffer,
    instances: D::Buffer,
    clips: D::Buffer,
    bindings: D::BindingSet,
}

struct LineChunkGpu<D: RenderDevice> {
    vertices: D::Buffer,
    bindings: D::BindingSet,
}

struct EllipseChunkGpu<D: RenderDevice> {
    shapes: D::Buffer,
    clips: D::Buffer,
    bindings: D::BindingSet,
}

struct GpuState<D: RenderDevice> {
    view_projection: D::Buffer,
    sampler: D::Sampler,
    triangle_layout: D::BindingLayout,
    line_layout: D::BindingLayout,
    ellipse_layout: D::BindingLayout,
    texture_layout: D::BindingLayout,
    triangle_pipeline: D::Pipeline,
    line_pipeline: D::Pipeline,
    ellipse_pipeline: D::Pipeline,
    triangle_chunks: Vec<TriangleChunkGpu<D>>,
    line_chunks: Vec<LineChunkGpu<D>>,
    ellipse_chunks: Vec<EllipseChunkGpu<D>>,
}

pub struct Renderer2D<D: RenderDevice> {
    desc: Renderer2DDesc,
    output_size: Extent,
    view_projection: Mat4,
    current_depth: i32,
    triangles: TriangleBatch,
    lines: LineBatch,
    ellipses: EllipseBatch,
    textures: VirtualTextureTable<D::Texture>,
    texture_set: Option<D::BindingSet>,
    target: Option<OffscreenTarget<D>>,
    /// Between `begin_rendering` and `end_rendering`.
    recording: bool,
    gpu: Option<GpuState<D>>,
}

impl<D: RenderDevice> Renderer2D<D> {
    pub fn new(device: &D, desc: Renderer2DDesc) -> Result<Self> {
        let texture_array_size = desc
            .texture_array_size
            .min(device.max_texture_array_size())
            .max(1);
        let gpu = GpuState::new(device, texture_array_size)?;
        log::info!(
            "renderer2d ready: virtual {}x{}, texture array {}",
            desc.virtual_size.x,
            desc.virtual_size.y,
            texture_array_size
        );

        Ok(Self {
            textures: VirtualTextureTable::new(desc.initial_texture_capacity, texture_array_size),
            view_projection: Mat4::IDENTITY,
            output_size: Extent::default(),
            current_depth: 0,
            triangles: TriangleBatch::default(),
            lines: LineBatch::default(),
            ellipses: EllipseBatch::default(),
            texture_set: None,
            target: None,
            recording: false,
            gpu: Some(gpu),
            desc,
        })
    }

    // ── Frame protocol ─────────────────────────────────────────────────────

    /// Start a frame at `extent`: rebuild the target if the size changed and
    /// clear it to transparent.
    pub fn begin_rendering(
        &mut self,
        device: &D,
        command_list: &mut D::CommandList,
        extent: Extent,
    ) -> Result<()> {
        if self.gpu.is_none() {
            return Err(ShellError::Misuse("renderer2d used after destroy"));
        }
        if extent.is_empty() {
            return Err(ShellError::Misuse("begin_rendering needs an output with area"));
        }
        if extent != self.output_size {
            self.output_size = extent;
            self.recalculate_view_projection();
        }

        if self.target.as_ref().map(|t| t.extent) != Some(extent) {
            if let Some(old) = self.target.take() {
                old.destroy(device);
            }
            log::debug!("renderer2d: target {}x{}", extent.width, extent.height);
            self.target = Some(OffscreenTarget::new(device, extent)?);
        }
        if let Some(target) = &self.target {
            device.clear_texture(command_list, &target.texture, [0.0; 4])?;
        }
        self.recording = true;
        Ok(())
    }

    /// Submit every pending draw into the target, clear the queues and leave
    /// the target ready to be sampled.
    pub fn end_rendering(
        &mut self,
        device: &D,
        command_list: &mut D::CommandList,
    ) -> Result<FrameStats> {
        if !std::mem::take(&mut self.recording) {
            return Err(ShellError::Misuse("end_rendering called without begin_rendering"));
        }
        let gpu = self
            .gpu
            .as_mut()
            .ok_or(ShellError::Misuse("renderer2d used after destroy"))?;
        let target = self
            .target
            .as_ref()
            .ok_or(ShellError::Misuse("renderer2d has no target"))?;

        let mut stats = FrameStats::default();
        let has_work =
            !(self.triangles.is_empty() && self.lines.is_empty() && self.ellipses.is_empty());

        if has_work {
            device.write_buffer(
                command_list,
                &gpu.view_projection,
                bytemuck::bytes_of(&self.view_projection),
            )?;

            if !self.triangles.is_empty() || !self.ellipses.is_empty() {
                refresh_texture_set(device, &gpu.texture_layout, &mut self.textures, &mut self.texture_set)?;
            }
            let texture_set = self.texture_set.as_ref();

            let triangles = self.triangles.record_chunks(self.desc.triangle_chunk_capacity);
            gpu.submit_triangles(device, command_list, target, texture_set, triangles.chunks(), &self.desc, &mut stats)?;
            self.triangles.give_back(triangles);

            let lines = self.lines.record_chunks(self.desc.line_chunk_capacity);
            gpu.submit_lines(device, command_list, target, lines.chunks(), &self.desc, &mut stats)?;
            self.lines.give_back(lines);

            let ellipses = self.ellipses.record_chunks(self.desc.ellipse_chunk_capacity);
            gpu.submit_ellipses(device, command_list, target, texture_set, ellipses.chunks(), &self.desc, &mut stats)?;
            self.ellipses.give_back(ellipses);
        }
        device.prepare_for_sampling(command_list, &target.texture)?;

        self.clear();

        if self.textures.is_suboptimal() {
            log::debug!(
                "texture table at {}/{}; optimizing",
                self.textures.len(),
                self.textures.capacity()
            );
            self.textures.optimize();
            stats.texture_table_optimized = true;
        }
        Ok(stats)
    }

    /// Drop every pending draw.
    pub fn clear(&mut self) {
        self.triangles.clear();
        self.lines.clear();
        self.ellipses.clear();
    }

    /// Pending (triangles + quads, lines, ellipses).
    pub fn pending_draws(&self) -> (usize, usize, usize) {
        (self.triangles.len(), self.lines.len(), self.ellipses.len())
    }

    pub fn set_virtual_size(&mut self, size: Vec2) {
        self.desc.virtual_size = size;
        self.recalculate_view_projection();
    }

    pub fn virtual_size(&self) -> Vec2 {
        self.desc.virtual_size
    }

    pub fn output_size(&self) -> Extent {
        self.output_size
    }

    /// What the last frame was drawn into; `None` before the first
    /// `begin_rendering`.
    pub fn texture(&self) -> Option<&D::Texture> {
        self.target.as_ref().map(|target| &target.texture)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    /// Depth for draws without an explicit one.
    pub fn set_depth(&mut self, depth: i32) {
        self.current_depth = depth;
    }

    pub fn depth(&self) -> i32 {
        self.current_depth
    }

    // ── Textures ───────────────────────────────────────────────────────────

    /// Register `texture` for this frame. IDs are invalid after the table
    /// optimizes at the end of a frame.
    pub fn register_texture(&mut self, texture: &D::Texture) -> Result<VirtualTextureId> {
        self.textures.register(texture)
    }

    pub fn textures(&self) -> &VirtualTextureTable<D::Texture> {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut VirtualTextureTable<D::Texture> {
        &mut self.textures
    }

    // ── Triangles and quads ────────────────────────────────────────────────

    pub fn draw_triangle(&mut self, triangle: Triangle) {
        let [p0, p1, p2] = triangle.positions;
        let [t0, t1, t2] = triangle.tex_coords;
        let record = TriangleRecord {
            positions: [p0, p1, p2, Vec2::ZERO],
            tex_coords: [t0, t1, t2, Vec2::ZERO],
            is_quad: false,
            texture_index: self.texture_index(triangle.texture),
            tint: triangle.color.packed(),
            depth: triangle.depth.unwrap_or(self.current_depth),
            clip: triangle.clip,
        };
        self.triangles.push(record);
    }

    /// Register `texture`, draw the triangle with it and return its ID.
    pub fn draw_triangle_managed(
        &mut self,
        mut triangle: Triangle,
        texture: &D::Texture,
    ) -> Result<VirtualTextureId> {
        let id = self.register_texture(texture)?;
        triangle.texture = Some(id);
        self.draw_triangle(triangle);
        Ok(id)
    }

    pub fn draw_quad(&mut self, quad: Quad) {
        let record = TriangleRecord {
            positions: quad.positions,
            tex_coords: quad.tex_coords,
            is_quad: true,
            texture_index: self.texture_index(quad.texture),
            tint: quad.color.packed(),
            depth: quad.depth.unwrap_or(self.current_depth),
            clip: quad.clip,
        };
        self.triangles.push(record);
    }

    pub fn draw_quad_managed(&mut self, mut quad: Quad, texture: &D::Texture) -> Result<VirtualTextureId> {
        let id = self.register_texture(texture)?;
        quad.texture = Some(id);
        self.draw_quad(quad);
        Ok(id)
    }

    // ── Lines ──────────────────────────────────────────────────────────────

    pub fn draw_line(&mut self, p0: Vec2, p1: Vec2, color: Rgba8) {
        self.lines.push(p0, color.packed(), p1, color.packed());
    }

    pub fn draw_line_gradient(&mut self, p0: Vec2, p1: Vec2, color0: Rgba8, color1: Rgba8) {
        self.lines.push(p0, color0.packed(), p1, color1.packed());
    }

    // ── Ellipses ───────────────────────────────────────────────────────────

    pub fn draw_ellipse(&mut self, ellipse: Ellipse) {
        let shape = EllipseShape {
            center: ellipse.center.to_array(),
            radii: ellipse.radii.to_array(),
            rotation: ellipse.rotation,
            inner_scale: ellipse.inner_scale,
            start_angle: ellipse.start_angle,
            end_angle: ellipse.end_angle,
            tint: ellipse.color.packed(),
            texture_index: self.texture_index(ellipse.texture),
            edge_softness: ellipse.edge_softness,
            ..unclipped_shape()
        };
        self.ellipses.push(EllipseRecord {
            shape,
            depth: ellipse.depth.unwrap_or(self.current_depth),
            clip: ellipse.clip,
        });
    }

    pub fn draw_ellipse_managed(
        &mut self,
        ellipse: Ellipse,
        texture: &D::Texture,
    ) -> Result<VirtualTextureId> {
        let id = self.register_texture(texture)?;
        self.draw_ellipse(ellipse.textured(id));
        Ok(id)
    }

    pub fn draw_circle(&mut self, center: Vec2, radius: f32, color: Rgba8) {
        self.draw_ellipse(Ellipse::circle(center, radius, color));
    }

    pub fn draw_ring(&mut self, center: Vec2, outer_radius: f32, inner_radius: f32, color: Rgba8) {
        self.draw_ellipse(Ellipse::ring(center, outer_radius, inner_radius, color));
    }

    pub fn draw_sector(&mut self, center: Vec2, radius: f32, start_angle: f32, end_angle: f32, color: Rgba8) {
        self.draw_ellipse(Ellipse::sector(center, radius, start_angle, end_angle, color));
    }

    pub fn draw_arc(
        &mut self,
        center: Vec2,
        radius: f32,
        thickness: f32,
        start_angle: f32,
        end_angle: f32,
        color: Rgba8,
    ) {
        self.draw_ellipse(Ellipse::arc(center, radius, thickness, start_angle, end_angle, color));
    }

    /// Release every GPU object. Pending draws are dropped.
    pub fn destroy(&mut self, device: &D) {
        self.clear();
        self.recording = false;
        if let Some(target) = self.target.take() {
            target.destroy(device);
        }
        if let Some(set) = self.texture_set.take() {
            device.destroy_binding_set(set);
        }
        if let Some(gpu) = self.gpu.take() {
            gpu.destroy(device);
        }
    }

    fn texture_index(&self, texture: Option<VirtualTextureId>) -> i32 {
        match texture {
            Some(id) => {
                debug_assert!(
                    self.textures.is_current(id),
                    "virtual texture id {id:?} is from an earlier epoch"
                );
                id.shader_index()
            }
            None => NO_TEXTURE,
        }
    }

    fn recalculate_view_projection(&mut self) {
        let output = Vec2::new(self.output_size.width as f32, self.output_size.height as f32);
        self.view_projection = view_projection(output, self.desc.virtual_size);
    }
}

fn refresh_texture_set<D: RenderDevice>(
    device: &D,
    layout: &D::BindingLayout,
    textures: &mut VirtualTextureTable<D::Texture>,
    current: &mut Option<D::BindingSet>,
) -> GpuResult<()> {
    if current.is_some() && !textures.is_dirty() {
        return Ok(());
    }
    let desc = BindingSetDesc {
        items: textures
            .textures()
            .iter()
            .enumerate()
            .map(|(slot, texture)| BindingSetItem::Texture {
                binding: 0,
                array_element: slot as u32,
                texture,
            })
            .collect(),
    };
    let set = device.create_binding_set(&desc, layout)?;
    if let Some(old) = current.replace(set) {
        device.destroy_binding_set(old);
    }
    textures.mark_clean();
    Ok(())
}

fn byte_size<T>(count: usize) -> u64 {
    (size_of::<T>() * count.max(1)) as u64
}

impl<D: RenderDevice> GpuState<D> {
    fn new(device: &D, texture_array_size: u32) -> Result<Self> {
        let view_projection = device.create_buffer(&BufferDesc {
            byte_size: size_of::<Mat4>() as u64,
            usage: BufferUsage::Constant,
            debug_name: "renderer2d view projection",
        })?;
        let sampler = device.create_sampler(&SamplerDesc::default())?;

        let shape_items = |first: BindingKind| BindingLayoutDesc {
            visibility: ShaderVisibility::All,
            items: vec![
                BindingLayoutItem { binding: 0, kind: BindingKind::ConstantBuffer },
                BindingLayoutItem { binding: 1, kind: first },
                BindingLayoutItem { binding: 2, kind: BindingKind::StructuredBuffer },
                BindingLayoutItem { binding: 3, kind: BindingKind::Sampler },
            ],
        };
        let triangle_layout = device.create_binding_layout(&shape_items(BindingKind::StructuredBuffer))?;
        let ellipse_layout = device.create_binding_layout(&shape_items(BindingKind::StructuredBuffer))?;
        let line_layout = device.create_binding_layout(&BindingLayoutDesc {
            visibility: ShaderVisibility::Vertex,
            items: vec![BindingLayoutItem { binding: 0, kind: BindingKind::ConstantBuffer }],
        })?;
        let texture_layout = device.create_binding_layout(&BindingLayoutDesc {
            visibility: ShaderVisibility::Pixel,
            items: vec![BindingLayoutItem {
                binding: 0,
                kind: BindingKind::TextureArray { size: texture_array_size },
            }],
        })?;

        let triangle_pipeline = device.create_graphics_pipeline(&PipelineDesc {
            debug_name: "renderer2d triangles",
            vertex_shader: "renderer2d_triangle.vert",
            pixel_shader: "renderer2d_triangle.frag",
            vertex_layout: Some(VertexLayout {
                stride: size_of::<TriangleVertex>() as u32,
                attributes: vec![
                    VertexAttribute { location: 0, format: VertexFormat::Float2, offset: 0 },
                    VertexAttribute { location: 1, format: VertexFormat::Float2, offset: 8 },
                    VertexAttribute { location: 2, format: VertexFormat::Uint, offset: 16 },
                ],
            }),
            binding_layouts: vec![&triangle_layout, &texture_layout],
            topology: PrimitiveTopology::TriangleList,
            alpha_blend: true,
        })?;
        let line_pipeline = device.create_graphics_pipeline(&PipelineDesc {
            debug_name: "renderer2d lines",
            vertex_shader: "renderer2d_line.vert",
            pixel_shader: "renderer2d_line.frag",
            vertex_layout: Some(VertexLayout {
                stride: size_of::<LineVertex>() as u32,
                attributes: vec![
                    VertexAttribute { location: 0, format: VertexFormat::Float2, offset: 0 },
                    VertexAttribute { location: 1, format: VertexFormat::Uint, offset: 8 },
                ],
            }),
            binding_layouts: vec![&line_layout],
            topology: PrimitiveTopology::LineList,
            alpha_blend: true,
        })?;
        let ellipse_pipeline = device.create_graphics_pipeline(&PipelineDesc {
            debug_name: "renderer2d ellipses",
            vertex_shader: "renderer2d_ellipse.vert",
            pixel_shader: "renderer2d_ellipse.frag",
            vertex_layout: None,
            binding_layouts: vec![&ellipse_layout, &texture_layout],
            topology: PrimitiveTopology::TriangleList,
            alpha_blend: true,
        })?;

        Ok(Self {
            view_projection,
            sampler,
            triangle_layout,
            line_layout,
            ellipse_layout,
            texture_layout,
            triangle_pipeline,
            line_pipeline,
            ellipse_pipeline,
            triangle_chunks: Vec::new(),
            line_chunks: Vec::new(),
            ellipse_chunks: Vec::new(),
        })
    }

    fn ensure_triangle_chunks(&mut self, device: &D, count: usize, capacity: usize) -> GpuResult<()> {
        while self.triangle_chunks.len() < count {
            let slot = self.triangle_chunks.len();
            log::debug!("renderer2d: allocating triangle chunk {slot}");
            let vertices = device.create_buffer(&BufferDesc {
                byte_size: byte_size::<TriangleVertex>(capacity * 4),
                usage: BufferUsage::Vertex,
                debug_name: "renderer2d triangle vertices",
            })?;
            let indices = device.create_buffer(&BufferDesc {
                byte_size: byte_size::<u32>(capacity * 6),
                usage: BufferUsage::Index,
                debug_name: "renderer2d triangle indices",
            })?;
            let instances = device.create_buffer(&BufferDesc {
                byte_size: byte_size::<TriangleInstance>(capacity),
                usage: BufferUsage::Structured,
                debug_name: "renderer2d triangle instances",
            })?;
            let clips = device.create_buffer(&BufferDesc {
                byte_size: byte_size::<ClipRegion>(capacity),
                usage: BufferUsage::Structured,
                debug_name: "renderer2d triangle clips",
            })?;
            let bindings = device.create_binding_set(
                &BindingSetDesc::default()
                    .item(BindingSetItem::ConstantBuffer { binding: 0, buffer: &self.view_projection })
                    .item(BindingSetItem::StructuredBuffer { binding: 1, buffer: &instances })
                    .item(BindingSetItem::StructuredBuffer { binding: 2, buffer: &clips })
                    .item(BindingSetItem::Sampler { binding: 3, sampler: &self.sampler }),
                &self.triangle_layout,
            )?;
            self.triangle_chunks.push(TriangleChunkGpu {
                vertices,
                indices,
                instances,
                clips,
                bindings,
            });
        }
        Ok(())
    }

    fn ensure_line_chunks(&mut self, device: &D, count: usize, capacity: usize) -> GpuResult<()> {
        while self.line_chunks.len() < count {
            let vertices = device.create_buffer(&BufferDesc {
                byte_size: byte_size::<LineVertex>(capacity),
                usage: BufferUsage::Vertex,
                debug_name: "renderer2d line vertices",
            })?;
            let bindings = device.create_binding_set(
                &BindingSetDesc::default()
                    .item(BindingSetItem::ConstantBuffer { binding: 0, buffer: &self.view_projection }),
                &self.line_layout,
            )?;
            self.line_chunks.push(LineChunkGpu { vertices, bindings });
        }
        Ok(())
    }

    fn ensure_ellipse_chunks(&mut self, device: &D, count: usize, capacity: usize) -> GpuResult<()> {
        while self.ellipse_chunks.len() < count {
            let shapes = device.create_buffer(&BufferDesc {
                byte_size: byte_size::<EllipseShape>(capacity),
                usage: BufferUsage::Structured,
                debug_name: "renderer2d ellipse shapes",
            })?;
            let clips = device.create_buffer(&BufferDesc {
                byte_size: byte_size::<ClipRegion>(capacity),
                usage: BufferUsage::Structured,
                debug_name: "renderer2d ellipse clips",
            })?;
            let bindings = device.create_binding_set(
                &BindingSetDesc::default()
                    .item(BindingSetItem::ConstantBuffer { binding: 0, buffer: &self.view_projection })
                    .item(BindingSetItem::StructuredBuffer { binding: 1, buffer: &shapes })
                    .item(BindingSetItem::StructuredBuffer { binding: 2, buffer: &clips })
                    .item(BindingSetItem::Sampler { binding: 3, sampler: &self.sampler }),
                &self.ellipse_layout,
            )?;
            self.ellipse_chunks.push(EllipseChunkGpu { shapes, clips, bindings });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_triangles(
        &mut self,
        device: &D,
        command_list: &mut D::CommandList,
        target: &OffscreenTarget<D>,
        texture_set: Option<&D::BindingSet>,
        chunks: &[TriangleChunk],
        desc: &Renderer2DDesc,
        stats: &mut FrameStats,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texture_set = texture_set.ok_or(ShellError::Misuse("texture binding set missing"))?;
        self.ensure_triangle_chunks(device, chunks.len(), desc.triangle_chunk_capacity)?;

        for (chunk, gpu) in chunks.iter().zip(&self.triangle_chunks) {
            upload(device, command_list, &gpu.vertices, &chunk.vertices)?;
            upload(device, command_list, &gpu.indices, &chunk.indices)?;
            upload(device, command_list, &gpu.instances, &chunk.instances)?;
            upload(device, command_list, &gpu.clips, chunk.clips.regions())?;

            let state = GraphicsState {
                pipeline: &self.triangle_pipeline,
                framebuffer: &target.framebuffer,
                extent: target.extent,
                bindings: vec![&gpu.bindings, texture_set],
                vertex_buffer: Some(&gpu.vertices),
                index_buffer: Some(&gpu.indices),
            };
            device.draw(command_list, &state, DrawArguments::indexed(chunk.indices.len() as u32))?;
            stats.draw_calls += 1;
        }
        stats.triangle_chunks = chunks.len();
        Ok(())
    }

    fn submit_lines(
        &mut self,
        device: &D,
        command_list: &mut D::CommandList,
        target: &OffscreenTarget<D>,
        chunks: &[LineChunk],
        desc: &Renderer2DDesc,
        stats: &mut FrameStats,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.ensure_line_chunks(device, chunks.len(), desc.line_chunk_capacity)?;

        for (chunk, gpu) in chunks.iter().zip(&self.line_chunks) {
            if chunk.vertices.is_empty() {
                continue;
            }
            upload(device, command_list, &gpu.vertices, &chunk.vertices)?;
            let state = GraphicsState {
                pipeline: &self.line_pipeline,
                framebuffer: &target.framebuffer,
                extent: target.extent,
                bindings: vec![&gpu.bindings],
                vertex_buffer: Some(&gpu.vertices),
                index_buffer: None,
            };
            device.draw(command_list, &state, DrawArguments::vertices(chunk.vertices.len() as u32))?;
            stats.draw_calls += 1;
        }
        stats.line_chunks = chunks.len();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_ellipses(
        &mut self,
        device: &D,
        command_list: &mut D::CommandList,
        target: &OffscreenTarget<D>,
        texture_set: Option<&D::BindingSet>,
        chunks: &[EllipseChunk],
        desc: &Renderer2DDesc,
        stats: &mut FrameStats,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texture_set = texture_set.ok_or(ShellError::Misuse("texture binding set missing"))?;
        self.ensure_ellipse_chunks(device, chunks.len(), desc.ellipse_chunk_capacity)?;

        for (chunk, gpu) in chunks.iter().zip(&self.ellipse_chunks) {
            if chunk.shapes.is_empty() {
                continue;
            }
            upload(device, command_list, &gpu.shapes, &chunk.shapes)?;
            upload(device, command_list, &gpu.clips, chunk.clips.regions())?;

            let state = GraphicsState {
                pipeline: &self.ellipse_pipeline,
                framebuffer: &target.framebuffer,
                extent: target.extent,
                bindings: vec![&gpu.bindings, texture_set],
                vertex_buffer: None,
                index_buffer: None,
            };
            let vertex_count = chunk.shapes.len() as u32 * ELLIPSE_VERTICES_PER_SHAPE;
            device.draw(command_list, &state, DrawArguments::vertices(vertex_count))?;
            stats.draw_calls += 1;
        }
        stats.ellipse_chunks = chunks.len();
        Ok(())
    }

    fn destroy(self, device: &D) {
        for chunk in self.triangle_chunks {
            device.destroy_binding_set(chunk.bindings);
            device.destroy_buffer(chunk.vertices);
            device.destroy_buffer(chunk.indices);
            device.destroy_buffer(chunk.instances);
            device.destroy_buffer(chunk.clips);
        }
        for chunk in self.line_chunks {
            device.destroy_binding_set(chunk.bindings);
            device.destroy_buffer(chunk.vertices);
        }
        for chunk in self.ellipse_chunks {
            device.destroy_binding_set(chunk.bindings);
            device.destroy_buffer(chunk.shapes);
            device.destroy_buffer(chunk.clips);
        }
        device.destroy_pipeline(self.triangle_pipeline);
        device.destroy_pipeline(self.line_pipeline);
        device.destroy_pipeline(self.ellipse_pipeline);
        device.destroy_binding_layout(self.triangle_layout);
        device.destroy_binding_layout(self.line_layout);
        device.destroy_binding_layout(self.ellipse_layout);
        device.destroy_binding_layout(self.texture_layout);
        device.destroy_sampler(self.sampler);
        device.destroy_buffer(self.view_projection);
    }
}

/// Skips empty slices.
fn upload<D: RenderDevice, T: bytemuck::Pod>(
    device: &D,
    command_list: &mut D::CommandList,
    buffer: &D::Buffer,
    data: &[T],
) -> GpuResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    device.write_buffer(command_list, buffer, bytemuck::cast_slice(data))
}
