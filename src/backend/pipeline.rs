// Descriptor layouts, descriptor sets and graphics pipelines
//
// Pipelines target dynamic rendering into the surface format, with dynamic
// viewport and scissor. Layout space N of a `PipelineDesc` is descriptor set
// N of the pipeline layout.

use super::resources::{Retired, VulkanBuffer, VulkanSampler, VulkanTexture};
use super::shader::load_shader_module;
use super::VulkanDevice;
use crate::error::{GpuError, GpuResult};
use crate::rhi::{
    BindingKind, BindingLayoutDesc, BindingLayoutItem, BindingSetDesc, BindingSetItem,
    PipelineDesc, PrimitiveTopology, ShaderVisibility, VertexFormat,
};
use ash::vk;

pub struct VulkanBindingLayout {
    pub(super) raw: vk::DescriptorSetLayout,
    items: Vec<BindingLayoutItem>,
}

pub struct VulkanBindingSet {
    pub(super) raw: vk::DescriptorSet,
}

pub struct VulkanPipeline {
    pub(super) raw: vk::Pipeline,
    pub(super) layout: vk::PipelineLayout,
}

fn descriptor_type(kind: BindingKind) -> vk::DescriptorType {
    match kind {
        BindingKind::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingKind::StructuredBuffer => vk::DescriptorType::STORAGE_BUFFER,
        BindingKind::Sampler => vk::DescriptorType::SAMPLER,
        BindingKind::Texture | BindingKind::TextureArray { .. } => vk::DescriptorType::SAMPLED_IMAGE,
    }
}

fn stage_flags(visibility: ShaderVisibility) -> vk::ShaderStageFlags {
    match visibility {
        ShaderVisibility::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderVisibility::Pixel => vk::ShaderStageFlags::FRAGMENT,
        ShaderVisibility::All => vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
    }
}

fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Uint => vk::Format::R32_UINT,
    }
}

pub(super) fn create_binding_layout(
    dev: &VulkanDevice,
    desc: &BindingLayoutDesc,
) -> GpuResult<VulkanBindingLayout> {
    let stages = stage_flags(desc.visibility);
    let bindings: Vec<_> = desc
        .items
        .iter()
        .map(|item| {
            let count = match item.kind {
                BindingKind::TextureArray { size } => size.max(1),
                _ => 1,
            };
            vk::DescriptorSetLayoutBinding::default()
                .binding(item.binding)
                .descriptor_type(descriptor_type(item.kind))
                .descriptor_count(count)
                .stage_flags(stages)
        })
        .collect();
    // texture arrays are sparsely filled
    let flags: Vec<_> = desc
        .items
        .iter()
        .map(|item| match item.kind {
            BindingKind::TextureArray { .. } => vk::DescriptorBindingFlags::PARTIALLY_BOUND,
            _ => vk::DescriptorBindingFlags::empty(),
        })
        .collect();

    let mut flags_info =
        vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&flags);
    let info = vk::DescriptorSetLayoutCreateInfo::default()
        .bindings(&bindings)
        .push_next(&mut flags_info);
    let raw = unsafe { dev.device.create_descriptor_set_layout(&info, None) }?;
    Ok(VulkanBindingLayout {
        raw,
        items: desc.items.clone(),
    })
}

pub(super) fn destroy_binding_layout(dev: &VulkanDevice, layout: VulkanBindingLayout) {
    dev.tracker.lock().retire(Retired::BindingLayout(layout.raw));
}

fn allocate_set(dev: &VulkanDevice, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet, vk::Result> {
    let pool = dev.descriptor_pool.lock();
    let layouts = [layout];
    let info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(*pool)
        .set_layouts(&layouts);
    let sets = unsafe { dev.device.allocate_descriptor_sets(&info) }?;
    sets.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
}

pub(super) fn create_binding_set(
    dev: &VulkanDevice,
    desc: &BindingSetDesc<'_, VulkanDevice>,
    layout: &VulkanBindingLayout,
) -> GpuResult<VulkanBindingSet> {
    let raw = match allocate_set(dev, layout.raw) {
        Ok(set) => set,
        Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
            // retired sets may be holding the pool
            log::debug!("descriptor pool exhausted; collecting garbage and retrying");
            super::resources::collect_garbage(dev);
            allocate_set(dev, layout.raw)?
        }
        Err(err) => return Err(err.into()),
    };

    let mut buffer_infos = Vec::new();
    let mut image_infos = Vec::new();
    for item in &desc.items {
        match item {
            BindingSetItem::ConstantBuffer { buffer, .. } | BindingSetItem::StructuredBuffer { buffer, .. } => {
                let buffer: &VulkanBuffer = buffer;
                buffer_infos.push(
                    vk::DescriptorBufferInfo::default()
                        .buffer(buffer.raw)
                        .range(vk::WHOLE_SIZE),
                );
            }
            BindingSetItem::Sampler { sampler, .. } => {
                let sampler: &VulkanSampler = sampler;
                image_infos.push(vk::DescriptorImageInfo::default().sampler(sampler.raw));
            }
            BindingSetItem::Texture { texture, .. } => {
                let texture: &VulkanTexture = texture;
                image_infos.push(
                    vk::DescriptorImageInfo::default()
                        .image_view(texture.view)
                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                );
            }
        }
    }

    let mut writes = Vec::with_capacity(desc.items.len());
    let (mut next_buffer, mut next_image) = (0, 0);
    for item in &desc.items {
        let write = vk::WriteDescriptorSet::default().dst_set(raw);
        let write = match item {
            BindingSetItem::ConstantBuffer { binding, .. } => {
                next_buffer += 1;
                write
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&buffer_infos[next_buffer - 1]))
            }
            BindingSetItem::StructuredBuffer { binding, .. } => {
                next_buffer += 1;
                write
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(std::slice::from_ref(&buffer_infos[next_buffer - 1]))
            }
            BindingSetItem::Sampler { binding, .. } => {
                next_image += 1;
                write
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(std::slice::from_ref(&image_infos[next_image - 1]))
            }
            BindingSetItem::Texture {
                binding,
                array_element,
                ..
            } => {
                next_image += 1;
                write
                    .dst_binding(*binding)
                    .dst_array_element(*array_element)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(std::slice::from_ref(&image_infos[next_image - 1]))
            }
        };
        writes.push(write);
    }

    let declared = |binding: u32| layout.items.iter().any(|item| item.binding == binding);
    if let Some(unknown) = desc.items.iter().map(item_binding).find(|b| !declared(*b)) {
        dev.tracker.lock().retire(Retired::BindingSet(raw));
        return Err(GpuError::Driver(format!(
            "binding {unknown} is not declared by the layout"
        )));
    }

    if !writes.is_empty() {
        unsafe { dev.device.update_descriptor_sets(&writes, &[]) };
    }
    Ok(VulkanBindingSet { raw })
}

fn item_binding(item: &BindingSetItem<'_, VulkanDevice>) -> u32 {
    match item {
        BindingSetItem::ConstantBuffer { binding, .. }
        | BindingSetItem::StructuredBuffer { binding, .. }
        | BindingSetItem::Sampler { binding, .. }
        | BindingSetItem::Texture { binding, .. } => *binding,
    }
}

pub(super) fn destroy_binding_set(dev: &VulkanDevice, set: VulkanBindingSet) {
    dev.tracker.lock().retire(Retired::BindingSet(set.raw));
}

pub(super) fn create_graphics_pipeline(
    dev: &VulkanDevice,
    desc: &PipelineDesc<'_, VulkanDevice>,
) -> GpuResult<VulkanPipeline> {
    let set_layouts: Vec<_> = desc.binding_layouts.iter().map(|layout| layout.raw).collect();
    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    let layout = unsafe { dev.device.create_pipeline_layout(&layout_info, None) }?;

    let modules = load_shader_module(dev, desc.vertex_shader).and_then(|vertex| {
        match load_shader_module(dev, desc.pixel_shader) {
            Ok(pixel) => Ok((vertex, pixel)),
            Err(err) => {
                unsafe { dev.device.destroy_shader_module(vertex, None) };
                Err(err)
            }
        }
    });
    let (vertex_module, pixel_module) = match modules {
        Ok(modules) => modules,
        Err(err) => {
            unsafe { dev.device.destroy_pipeline_layout(layout, None) };
            return Err(err);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(pixel_module)
            .name(c"main"),
    ];

    let (vertex_bindings, vertex_attributes) = match &desc.vertex_layout {
        Some(layout) => (
            vec![vk::VertexInputBindingDescription::default()
                .binding(0)
                .stride(layout.stride)
                .input_rate(vk::VertexInputRate::VERTEX)],
            layout
                .attributes
                .iter()
                .map(|attr| {
                    vk::VertexInputAttributeDescription::default()
                        .binding(0)
                        .location(attr.location)
                        .format(vertex_format(attr.format))
                        .offset(attr.offset)
                })
                .collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let topology = match desc.topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(topology);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let blend_attachment = if desc.alpha_blend {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    } else {
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .attachments(std::slice::from_ref(&blend_attachment));
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [dev.surface_format.format];
    let mut rendering = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats);

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(layout)
        .push_next(&mut rendering);

    let result = unsafe {
        dev.device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&create_info),
            None,
        )
    };
    unsafe {
        dev.device.destroy_shader_module(vertex_module, None);
        dev.device.destroy_shader_module(pixel_module, None);
    }

    let raw = match result {
        Ok(pipelines) => pipelines.into_iter().next(),
        Err((_, err)) => {
            unsafe { dev.device.destroy_pipeline_layout(layout, None) };
            return Err(err.into());
        }
    };
    let raw = raw.ok_or_else(|| GpuError::Driver("no pipeline created".into()))?;
    log::info!("created pipeline '{}'", desc.debug_name);
    Ok(VulkanPipeline { raw, layout })
}

pub(super) fn destroy_pipeline(dev: &VulkanDevice, pipeline: VulkanPipeline) {
    dev.tracker.lock().retire(Retired::Pipeline {
        raw: pipeline.raw,
        layout: pipeline.layout,
    });
}
