//! Render pipelines and the uniforms they share.
//!
//! - `basic` draws opaque models and holds the shared pipeline builder
//! - `transparent` draws alpha blended models
//! - `lines` draws helpers and wireframes
//! - `light` holds the light description and its uniform
//! - `post` is the optional full screen post-processing chain

pub mod basic;
pub mod light;
pub mod lines;
pub mod post;
pub mod transparent;

/// Every pipeline the renderer switches between during a frame.
#[derive(Debug)]
pub struct Pipelines {
    pub basic: wgpu::RenderPipeline,
    pub transparent: wgpu::RenderPipeline,
    pub lines: wgpu::RenderPipeline,
    pub overlay: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        light_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        Self {
            basic: basic::mk_basic_pipeline(
                device,
                color_format,
                light_bind_group_layout,
                camera_bind_group_layout,
            ),
            transparent: transparent::mk_transparent_pipeline(
                device,
                color_format,
                light_bind_group_layout,
                camera_bind_group_layout,
            ),
            lines: lines::mk_lines_pipeline(device, color_format, camera_bind_group_layout),
            overlay: lines::mk_overlay_pipeline(device, color_format, camera_bind_group_layout),
        }
    }
}
