// Framebuffer presentation
//
// Composites a texture (usually `Renderer2D::texture`) over a framebuffer
// with a single fullscreen triangle, alpha blended onto what is already
// there.

use crate::error::{Result, ShellError};
use crate::rhi::{
    BindingKind, BindingLayoutDesc, BindingLayoutItem, BindingSetDesc, BindingSetItem,
    DrawArguments, Extent, GraphicsState, PipelineDesc, PrimitiveTopology, RenderDevice,
    SamplerDesc, ShaderVisibility,
};

/// Vertices of the fullscreen triangle.
pub const PRESENT_VERTEX_COUNT: u32 = 3;

struct PresenterGpu<D: RenderDevice> {
    sampler: D::Sampler,
    layout: D::BindingLayout,
    pipeline: D::Pipeline,
}

pub struct FramebufferPresenter<D: RenderDevice> {
    gpu: Option<PresenterGpu<D>>,
}

impl<D: RenderDevice> FramebufferPresenter<D> {
    pub fn new(device: &D) -> Result<Self> {
        let sampler = device.create_sampler(&SamplerDesc::default())?;
        let layout = match device.create_binding_layout(&BindingLayoutDesc {
            visibility: ShaderVisibility::Pixel,
            items: vec![
                BindingLayoutItem { binding: 0, kind: BindingKind::Texture },
                BindingLayoutItem { binding: 1, kind: BindingKind::Sampler },
            ],
        }) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_sampler(sampler);
                return Err(e.into());
            }
        };
        let pipeline = match device.create_graphics_pipeline(&PipelineDesc {
            debug_name: "framebuffer present",
            vertex_shader: "framebuffer_present.vert",
            pixel_shader: "framebuffer_present.frag",
            vertex_layout: None,
            binding_layouts: vec![&layout],
            topology: PrimitiveTopology::TriangleList,
            alpha_blend: true,
        }) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_binding_layout(layout);
                device.destroy_sampler(sampler);
                return Err(e.into());
            }
        };

        Ok(Self {
            gpu: Some(PresenterGpu {
                sampler,
                layout,
                pipeline,
            }),
        })
    }

    /// Draw `source` over `framebuffer`. `source` must have been prepared for
    /// sampling earlier in `command_list`.
    pub fn present(
        &mut self,
        device: &D,
        command_list: &mut D::CommandList,
        source: &D::Texture,
        framebuffer: &D::Framebuffer,
        extent: Extent,
    ) -> Result<()> {
        let gpu = self
            .gpu
            .as_ref()
            .ok_or(ShellError::Misuse("framebuffer presenter used after destroy"))?;
        if extent.is_empty() {
            return Err(ShellError::Misuse("present into a framebuffer without area"));
        }

        // one set per call; its destruction waits for this submission
        let set = device.create_binding_set(
            &BindingSetDesc::default()
                .item(BindingSetItem::Texture {
                    binding: 0,
                    array_element: 0,
                    texture: source,
                })
                .item(BindingSetItem::Sampler {
                    binding: 1,
                    sampler: &gpu.sampler,
                }),
            &gpu.layout,
        )?;
        let state = GraphicsState {
            pipeline: &gpu.pipeline,
            framebuffer,
            extent,
            bindings: vec![&set],
            vertex_buffer: None,
            index_buffer: None,
        };
        let drawn = device.draw(command_list, &state, DrawArguments::vertices(PRESENT_VERTEX_COUNT));
        device.destroy_binding_set(set);
        Ok(drawn?)
    }

    pub fn destroy(&mut self, device: &D) {
        if let Some(gpu) = self.gpu.take() {
            device.destroy_pipeline(gpu.pipeline);
            device.destroy_binding_layout(gpu.layout);
            device.destroy_sampler(gpu.sampler);
        }
    }
}
