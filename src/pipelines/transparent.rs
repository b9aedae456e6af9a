use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, Vertex},
        texture::Texture,
    },
    pipelines::basic::{depth_state, mk_render_pipeline},
    resources::texture::material_layout,
};

/**
 * Pipeline for materials flagged as transparent.
 *
 * Shares the model shader with the opaque pipeline. Fragments are alpha
 * blended and tested against, but never written to, the depth buffer, so
 * transparent meshes have to be drawn after all opaque ones.
 */
pub fn mk_transparent_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    light_bind_group_layout: &wgpu::BindGroupLayout,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Transparent Pipeline Layout"),
        bind_group_layouts: &[
            &material_layout(device),
            camera_bind_group_layout,
            light_bind_group_layout,
        ],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Model Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("model.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &render_pipeline_layout,
        color_format,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        Some(depth_state(
            Texture::DEPTH_FORMAT,
            false,
            wgpu::CompareFunction::Less,
        )),
        wgpu::PrimitiveTopology::TriangleList,
        &[ModelVertex::desc(), InstanceRaw::desc()],
        shader,
    )
}
