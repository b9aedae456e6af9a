//! Full screen post-processing: FXAA, bleach bypass and colour correction.
//!
//! When enabled the scene is rendered into [`PostProcessing::target`] instead
//! of the surface and [`PostProcessing::draw`] resolves it onto the surface.

use wgpu::util::DeviceExt;

use crate::data_structures::texture::{self, Texture};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostSettings {
    pub fxaa: bool,
    /// Zero disables the bleach bypass.
    pub bleach_opacity: f32,
    pub pow_rgb: [f32; 3],
    pub mul_rgb: [f32; 3],
}

impl Default for PostSettings {
    fn default() -> Self {
        Self {
            fxaa: true,
            bleach_opacity: 0.0,
            pow_rgb: [1.0; 3],
            mul_rgb: [1.0; 3],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PostUniform {
    // xy: 1 / resolution, z: fxaa on, w: manual gamma
    screen: [f32; 4],
    // x: bleach opacity
    bleach: [f32; 4],
    pow_rgb: [f32; 4],
    mul_rgb: [f32; 4],
}

impl PostUniform {
    pub fn new(settings: &PostSettings, size: [u32; 2], manual_gamma: bool) -> Self {
        let [pr, pg, pb] = settings.pow_rgb;
        let [mr, mg, mb] = settings.mul_rgb;
        Self {
            screen: [
                1.0 / size[0].max(1) as f32,
                1.0 / size[1].max(1) as f32,
                if settings.fxaa { 1.0 } else { 0.0 },
                if manual_gamma { 1.0 } else { 0.0 },
            ],
            bleach: [settings.bleach_opacity, 0.0, 0.0, 0.0],
            pow_rgb: [pr, pg, pb, 1.0],
            mul_rgb: [mr, mg, mb, 1.0],
        }
    }
}

#[derive(Debug)]
pub struct PostProcessing {
    pub settings: PostSettings,
    pub target: Texture,
    size: [u32; 2],
    manual_gamma: bool,
    buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
}

impl PostProcessing {
    /// The offscreen target shares the surface format so every scene pipeline can draw into either.
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        size: [u32; 2],
        settings: PostSettings,
    ) -> Self {
        let manual_gamma = !surface_format.is_srgb();
        let target = Texture::create_render_target(device, size, surface_format, "post_target");
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Post Buffer"),
            contents: bytemuck::cast_slice(&[PostUniform::new(&settings, size, manual_gamma)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &target, &buffer);
        let pipeline = mk_post_pipeline(device, surface_format, &bind_group_layout);
        Self {
            settings,
            target,
            size,
            manual_gamma,
            buffer,
            bind_group_layout,
            bind_group,
            pipeline,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, size: [u32; 2]) {
        self.target.destroy();
        self.target = Texture::create_render_target(device, size, self.target.texture.format(), "post_target");
        self.size = size;
        self.bind_group = mk_bind_group(device, &self.bind_group_layout, &self.target, &self.buffer);
        self.update(queue);
    }

    pub fn set_settings(&mut self, queue: &wgpu::Queue, settings: PostSettings) {
        self.settings = settings;
        self.update(queue);
    }

    fn update(&self, queue: &wgpu::Queue) {
        queue.write_buffer(
            &self.buffer,
            0,
            bytemuck::cast_slice(&[PostUniform::new(&self.settings, self.size, self.manual_gamma)]),
        );
    }

    /// Resolve the offscreen target onto `view`.
    pub fn draw(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Post Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        // full screen triangle generated in the vertex shader
        render_pass.draw(0..3, 0..1);
    }
}

fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("post_bind_group_layout"),
    })
}

fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    target: &Texture,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let fallback = texture::create_default_sampler(device);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&target.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(target.sampler.as_ref().unwrap_or(&fallback)),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: buffer.as_entire_binding(),
            },
        ],
        label: Some("post_bind_group"),
    })
}

fn mk_post_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Post Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Post Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("post.wgsl").into()),
    };
    crate::pipelines::basic::mk_render_pipeline(
        device,
        &layout,
        surface_format,
        None,
        None,
        wgpu::PrimitiveTopology::TriangleList,
        &[],
        shader,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_carries_inverse_resolution_and_flags() {
        let settings = PostSettings {
            bleach_opacity: 0.4,
            pow_rgb: [1.4, 1.45, 1.45],
            mul_rgb: [1.1, 1.1, 1.1],
            ..Default::default()
        };
        let uniform = PostUniform::new(&settings, [200, 100], false);
        assert_eq!(uniform.screen, [0.005, 0.01, 1.0, 0.0]);
        assert_eq!(uniform.bleach[0], 0.4);
        assert_eq!(uniform.pow_rgb, [1.4, 1.45, 1.45, 1.0]);
    }
}
