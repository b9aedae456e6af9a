//! Line rendering for helpers and wireframes.
//!
//! Lines are collected on the CPU in a [`LineBatch`] every frame and copied
//! into a vertex buffer that only grows.

use wgpu::util::DeviceExt;

use crate::{
    data_structures::{model::Vertex, texture::Texture},
    pipelines::basic::{depth_state, mk_render_pipeline},
};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex for LineVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Debug)]
pub struct LineBatch {
    label: String,
    vertices: Vec<LineVertex>,
    buffer: Option<wgpu::Buffer>,
    capacity: usize,
    uploaded: usize,
}

impl LineBatch {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            vertices: Vec::new(),
            buffer: None,
            capacity: 0,
            uploaded: 0,
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[LineVertex] {
        &self.vertices
    }

    pub fn push_line(&mut self, a: [f32; 3], b: [f32; 3], color: [f32; 3]) {
        self.vertices.push(LineVertex { position: a, color });
        self.vertices.push(LineVertex { position: b, color });
    }

    pub fn write_to_buffer(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        self.uploaded = self.vertices.len();
        if self.vertices.is_empty() {
            return;
        }
        match &self.buffer {
            Some(buffer) if self.capacity >= self.vertices.len() => {
                queue.write_buffer(buffer, 0, bytemuck::cast_slice(&self.vertices));
            }
            _ => {
                if let Some(old) = self.buffer.take() {
                    old.destroy();
                }
                self.capacity = self.vertices.len().next_power_of_two();
                let mut contents = self.vertices.clone();
                contents.resize(self.capacity, bytemuck::Zeroable::zeroed());
                self.buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Line Buffer", self.label)),
                    contents: bytemuck::cast_slice(&contents),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                }));
            }
        }
    }

    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// Vertices written by the last [`LineBatch::write_to_buffer`].
    pub fn vertex_count(&self) -> u32 {
        self.uploaded as u32
    }
}

pub trait DrawLines<'a> {
    fn draw_lines(&mut self, lines: &'a LineBatch, camera_bind_group: &'a wgpu::BindGroup);
}

impl<'a, 'b> DrawLines<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_lines(&mut self, lines: &'b LineBatch, camera_bind_group: &'b wgpu::BindGroup) {
        let Some(buffer) = lines.buffer() else {
            return;
        };
        if lines.vertex_count() == 0 {
            return;
        }
        self.set_vertex_buffer(0, buffer.slice(..));
        self.set_bind_group(0, camera_bind_group, &[]);
        self.draw(0..lines.vertex_count(), 0..1);
    }
}

fn mk_line_pipeline_with(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
    depth_stencil: wgpu::DepthStencilState,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Line Pipeline Layout"),
        bind_group_layouts: &[camera_bind_group_layout],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Line Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("lines.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        color_format,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        Some(depth_stencil),
        wgpu::PrimitiveTopology::LineList,
        &[LineVertex::desc()],
        shader,
    )
}

/// Lines that are hidden behind geometry.
pub fn mk_lines_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    mk_line_pipeline_with(
        device,
        color_format,
        camera_bind_group_layout,
        depth_state(Texture::DEPTH_FORMAT, true, wgpu::CompareFunction::LessEqual),
    )
}

/// Lines drawn on top of the scene.
pub fn mk_overlay_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    mk_line_pipeline_with(
        device,
        color_format,
        camera_bind_group_layout,
        depth_state(Texture::DEPTH_FORMAT, false, wgpu::CompareFunction::Always),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_push_vertex_pairs() {
        let mut batch = LineBatch::new("test");
        batch.push_line([0.0; 3], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        batch.push_line([1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0; 3]);
        assert_eq!(batch.vertices().len(), 4);
        assert_eq!(batch.vertices()[1].position, [1.0, 0.0, 0.0]);
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.vertex_count(), 0);
    }
}
