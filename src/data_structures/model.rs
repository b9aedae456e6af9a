//! Meshes, materials and their GPU counterparts.
//!
//! CPU-side descriptions ([`MaterialData`], [`crate::data_structures::geometry::MeshData`])
//! are turned into GPU resources ([`Material`], [`Mesh`]) the first time a node
//! is written to the GPU.

use std::{ops::Range, sync::Arc};

use wgpu::util::DeviceExt;

use crate::data_structures::texture::Texture;

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 11]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Surface description of a material, independent of any GPU device.
///
/// Covers what the viewers need from standard and phong style materials:
/// a base colour (factor and map), an optional normal map, blinn-phong
/// specular parameters and a few rendering flags.
#[derive(Clone, Debug)]
pub struct MaterialData {
    pub name: String,
    pub base_color: [f32; 4],
    pub base_color_texture: Option<Arc<image::RgbaImage>>,
    pub normal_texture: Option<Arc<image::RgbaImage>>,
    /// Red channel scales the specular highlight.
    pub specular_texture: Option<Arc<image::RgbaImage>>,
    pub normal_scale: f32,
    pub specular: [f32; 3],
    pub shininess: f32,
    pub flat_shading: bool,
    pub wireframe: bool,
    pub transparent: bool,
}

impl MaterialData {
    pub fn new(name: &str, base_color: [f32; 4]) -> Self {
        Self {
            name: name.to_string(),
            base_color,
            ..Default::default()
        }
    }

    /// Material from an sRGB `0xRRGGBB` colour.
    pub fn hex(name: &str, hex: u32) -> Self {
        Self::new(name, hex_to_rgba(hex))
    }
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            base_color: [1.0; 4],
            base_color_texture: None,
            normal_texture: None,
            specular_texture: None,
            normal_scale: 1.0,
            specular: [0.07; 3],
            shininess: 30.0,
            flat_shading: false,
            wireframe: false,
            transparent: false,
        }
    }
}

/// sRGB hex colour to linear RGBA.
pub fn hex_to_rgba(hex: u32) -> [f32; 4] {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xff) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    [channel(16), channel(8), channel(0), 1.0]
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    base_color: [f32; 4],
    // rgb: specular colour, w: shininess
    specular: [f32; 4],
    // x: normal scale, y: flat shading, z: has normal map
    params: [f32; 4],
}

impl From<&MaterialData> for MaterialUniform {
    fn from(data: &MaterialData) -> Self {
        let [r, g, b] = data.specular;
        Self {
            base_color: data.base_color,
            specular: [r, g, b, data.shininess],
            params: [
                data.normal_scale,
                if data.flat_shading { 1.0 } else { 0.0 },
                if data.normal_texture.is_some() { 1.0 } else { 0.0 },
                0.0,
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub diffuse_texture: Texture,
    pub normal_texture: Texture,
    pub specular_texture: Texture,
    pub uniform: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &MaterialData,
        layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let diffuse_texture = match &data.base_color_texture {
            Some(img) => Texture::from_rgba(device, queue, img, Some(&data.name), false),
            None => Texture::from_color(device, queue, [255; 4], "white diffuse", false),
        };
        let normal_texture = match &data.normal_texture {
            Some(img) => Texture::from_rgba(device, queue, img, Some(&data.name), true),
            None => Texture::create_default_normal_map(device, queue),
        };
        let specular_texture = match &data.specular_texture {
            Some(img) => Texture::from_rgba(device, queue, img, Some(&data.name), true),
            None => Texture::from_color(device, queue, [255; 4], "white specular", true),
        };
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", data.name)),
            contents: bytemuck::cast_slice(&[MaterialUniform::from(data)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = mk_material_bind_group(
            device,
            layout,
            &diffuse_texture,
            &normal_texture,
            &specular_texture,
            &uniform,
            &data.name,
        );

        Self {
            name: data.name.clone(),
            diffuse_texture,
            normal_texture,
            specular_texture,
            uniform,
            bind_group,
        }
    }

    /// Push changed factors/flags without rebuilding textures.
    pub fn update(&self, queue: &wgpu::Queue, data: &MaterialData) {
        queue.write_buffer(
            &self.uniform,
            0,
            bytemuck::cast_slice(&[MaterialUniform::from(data)]),
        );
    }

    pub fn destroy(&self) {
        self.diffuse_texture.destroy();
        self.normal_texture.destroy();
        self.specular_texture.destroy();
        self.uniform.destroy();
    }
}

fn mk_material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    diffuse: &Texture,
    normal: &Texture,
    specular: &Texture,
    uniform: &wgpu::Buffer,
    name: &str,
) -> wgpu::BindGroup {
    let fallback = crate::data_structures::texture::create_default_sampler(device);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&diffuse.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(
                    diffuse.sampler.as_ref().unwrap_or(&fallback),
                ),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&normal.view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(
                    normal.sampler.as_ref().unwrap_or(&fallback),
                ),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::TextureView(&specular.view),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: wgpu::BindingResource::Sampler(
                    specular.sampler.as_ref().unwrap_or(&fallback),
                ),
            },
        ],
        label: Some(name),
    })
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
}

impl Mesh {
    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

#[derive(Clone, Debug, Default)]
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
}

impl Model {
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

pub trait DrawModel<'a> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a Mesh,
        material: &'a Material,
        instances: Range<u32>,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );

    fn draw_model_instanced(
        &mut self,
        model: &'a Model,
        instances: Range<u32>,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );
}

impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'b Mesh,
        material: &'b Material,
        instances: Range<u32>,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.set_bind_group(1, camera_bind_group, &[]);
        self.set_bind_group(2, light_bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }

    fn draw_model_instanced(
        &mut self,
        model: &'b Model,
        instances: Range<u32>,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        for mesh in &model.meshes {
            let Some(material) = model.materials.get(mesh.material) else {
                log::warn!("Mesh {} references a missing material {}", mesh.name, mesh.material);
                continue;
            };
            self.draw_mesh_instanced(
                mesh,
                material,
                instances.clone(),
                camera_bind_group,
                light_bind_group,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colours_are_linearised() {
        let white = hex_to_rgba(0xffffff);
        assert_eq!(white, [1.0, 1.0, 1.0, 1.0]);
        let red = hex_to_rgba(0xff0000);
        assert_eq!(red, [1.0, 0.0, 0.0, 1.0]);
        // sRGB mid grey is ~0.21 in linear space
        let grey = hex_to_rgba(0x808080);
        assert!((grey[0] - 0.2158).abs() < 1e-3, "{}", grey[0]);
    }

    #[test]
    fn uniform_flags_follow_material() {
        let mut data = MaterialData::hex("phong", 0xdddddd);
        data.flat_shading = true;
        data.normal_scale = 0.8;
        let uniform = MaterialUniform::from(&data);
        assert_eq!(uniform.params[0], 0.8);
        assert_eq!(uniform.params[1], 1.0);
        assert_eq!(uniform.params[2], 0.0);
    }
}
