//! Light sources and the light uniform shared by the model pipelines.
//!
//! Lights are plain values kept in [`LightResources`]. Every frame they are
//! resolved to world space (camera-attached lights follow the camera) and
//! packed into a fixed-capacity [`LightUniform`].

use cgmath::{InnerSpace, Vector3, Vector4};
use wgpu::util::DeviceExt;

use crate::data_structures::model::hex_to_rgba;

pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
pub const MAX_POINT_LIGHTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Ambient,
    /// Sky colour from above, `ground` colour from below.
    Hemisphere { ground: [f32; 3] },
    /// Shines from `position` towards `target`.
    Directional,
    /// `distance == 0` means unlimited range.
    Point { distance: f32, decay: f32 },
}

/// Which space a light's position is expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Attachment {
    #[default]
    World,
    Camera,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    /// Linear RGB.
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: Vector3<f32>,
    /// World-space target of directional lights.
    pub target: Vector3<f32>,
    pub attachment: Attachment,
}

impl Light {
    fn with_kind(kind: LightKind, hex: u32, intensity: f32) -> Self {
        let [r, g, b, _] = hex_to_rgba(hex);
        Self {
            name: String::new(),
            kind,
            color: [r, g, b],
            intensity,
            position: Vector3::new(0.0, 1.0, 0.0),
            target: Vector3::new(0.0, 0.0, 0.0),
            attachment: Attachment::World,
        }
    }

    pub fn ambient(hex: u32, intensity: f32) -> Self {
        Self::with_kind(LightKind::Ambient, hex, intensity).named("ambient_light")
    }

    pub fn hemisphere(sky: u32, ground: u32, intensity: f32) -> Self {
        let [r, g, b, _] = hex_to_rgba(ground);
        Self::with_kind(LightKind::Hemisphere { ground: [r, g, b] }, sky, intensity)
            .named("hemi_light")
    }

    pub fn directional(hex: u32, intensity: f32, position: [f32; 3]) -> Self {
        Self {
            position: position.into(),
            ..Self::with_kind(LightKind::Directional, hex, intensity)
        }
    }

    pub fn point(hex: u32, intensity: f32, position: [f32; 3], distance: f32) -> Self {
        Self {
            position: position.into(),
            ..Self::with_kind(LightKind::Point { distance, decay: 2.0 }, hex, intensity)
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Position is relative to the camera from now on.
    pub fn attached_to_camera(mut self) -> Self {
        self.attachment = Attachment::Camera;
        self
    }

    fn radiance(&self) -> [f32; 4] {
        let [r, g, b] = self.color;
        [r * self.intensity, g * self.intensity, b * self.intensity, 0.0]
    }

    fn world_position(&self, camera_to_world: &cgmath::Matrix4<f32>) -> Vector3<f32> {
        match self.attachment {
            Attachment::World => self.position,
            Attachment::Camera => {
                let p = self.position;
                (camera_to_world * Vector4::new(p.x, p.y, p.z, 1.0)).truncate()
            }
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLightRaw {
    // points towards the light
    direction: [f32; 4],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLightRaw {
    // w: cutoff distance
    position: [f32; 4],
    // w: decay exponent
    color: [f32; 4],
}

// Every member is a vec4 so the layout matches WGSL's uniform alignment rules.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    ambient: [f32; 4],
    hemi_sky: [f32; 4],
    hemi_ground: [f32; 4],
    hemi_direction: [f32; 4],
    directional: [DirectionalLightRaw; MAX_DIRECTIONAL_LIGHTS],
    point: [PointLightRaw; MAX_POINT_LIGHTS],
    // x: directional count, y: point count, z: exposure
    params: [f32; 4],
}

impl LightUniform {
    pub fn new(lights: &[Light], camera_to_world: &cgmath::Matrix4<f32>, exposure: f32) -> Self {
        let mut uniform = Self {
            ambient: [0.0; 4],
            hemi_sky: [0.0; 4],
            hemi_ground: [0.0; 4],
            hemi_direction: [0.0, 1.0, 0.0, 0.0],
            directional: [DirectionalLightRaw::default(); MAX_DIRECTIONAL_LIGHTS],
            point: [PointLightRaw::default(); MAX_POINT_LIGHTS],
            params: [0.0, 0.0, exposure, 0.0],
        };
        let (mut n_dir, mut n_point) = (0, 0);
        for light in lights {
            match light.kind {
                LightKind::Ambient => {
                    let c = light.radiance();
                    for k in 0..3 {
                        uniform.ambient[k] += c[k];
                    }
                }
                LightKind::Hemisphere { ground } => {
                    uniform.hemi_sky = light.radiance();
                    uniform.hemi_ground = [
                        ground[0] * light.intensity,
                        ground[1] * light.intensity,
                        ground[2] * light.intensity,
                        0.0,
                    ];
                    let up = light.world_position(camera_to_world);
                    if up.magnitude2() > 0.0 {
                        uniform.hemi_direction = up.normalize().extend(0.0).into();
                    }
                }
                LightKind::Directional if n_dir < MAX_DIRECTIONAL_LIGHTS => {
                    let from = light.world_position(camera_to_world);
                    let dir = from - light.target;
                    let dir = if dir.magnitude2() > 0.0 {
                        dir.normalize()
                    } else {
                        Vector3::unit_y()
                    };
                    uniform.directional[n_dir] = DirectionalLightRaw {
                        direction: dir.extend(0.0).into(),
                        color: light.radiance(),
                    };
                    n_dir += 1;
                }
                LightKind::Point { distance, decay } if n_point < MAX_POINT_LIGHTS => {
                    let [r, g, b, _] = light.radiance();
                    uniform.point[n_point] = PointLightRaw {
                        position: light.world_position(camera_to_world).extend(distance).into(),
                        color: [r, g, b, decay],
                    };
                    n_point += 1;
                }
                LightKind::Directional | LightKind::Point { .. } => (),
            }
        }
        uniform.params[0] = n_dir as f32;
        uniform.params[1] = n_point as f32;
        uniform
    }
}

pub struct LightResources {
    pub lights: Vec<Light>,
    pub exposure: f32,
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl std::fmt::Debug for LightResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightResources")
            .field("lights", &self.lights)
            .field("exposure", &self.exposure)
            .finish()
    }
}

impl LightResources {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform = LightUniform::new(&[], &cgmath::SquareMatrix::identity(), 1.0);
        let buffer = mk_buffer(device, uniform);
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer);
        Self {
            lights: Vec::new(),
            exposure: 1.0,
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn set_lights(&mut self, lights: Vec<Light>) {
        let count = |pred: fn(&LightKind) -> bool| lights.iter().filter(|l| pred(&l.kind)).count();
        let dirs = count(|k| matches!(k, LightKind::Directional));
        let points = count(|k| matches!(k, LightKind::Point { .. }));
        if dirs > MAX_DIRECTIONAL_LIGHTS || points > MAX_POINT_LIGHTS {
            log::warn!(
                "Only {} directional and {} point lights are supported, got {} and {}. The rest is ignored.",
                MAX_DIRECTIONAL_LIGHTS,
                MAX_POINT_LIGHTS,
                dirs,
                points
            );
        }
        self.lights = lights;
    }

    /// Re-resolve light positions for the current camera and upload them.
    pub fn update(&mut self, queue: &wgpu::Queue, camera_to_world: &cgmath::Matrix4<f32>) {
        self.uniform = LightUniform::new(&self.lights, camera_to_world, self.exposure);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

pub fn mk_buffer(device: &wgpu::Device, light_uniform: LightUniform) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Light Buffer"),
        contents: bytemuck::cast_slice(&[light_uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("light_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: light_buffer.as_entire_binding(),
        }],
        label: Some("light_bind_group"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Matrix4, SquareMatrix};

    #[test]
    fn ambient_lights_add_up() {
        let lights = [Light::ambient(0xffffff, 2.0), Light::ambient(0xffffff, 0.5)];
        let u = LightUniform::new(&lights, &Matrix4::identity(), 1.0);
        assert_eq!(u.ambient, [2.5, 2.5, 2.5, 0.0]);
        assert_eq!(u.params, [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn directional_light_points_from_target_to_light() {
        let lights = [Light::directional(0xffffff, 8.0, [10.0, 10.0, 10.0])];
        let u = LightUniform::new(&lights, &Matrix4::identity(), 1.0);
        let d = u.directional[0].direction;
        let expected = 1.0 / 3f32.sqrt();
        assert!((d[0] - expected).abs() < 1e-5);
        assert!((d[1] - expected).abs() < 1e-5);
        assert_eq!(u.directional[0].color[0], 8.0);
        assert_eq!(u.params[0], 1.0);
    }

    #[test]
    fn camera_attached_lights_follow_the_camera() {
        let light = Light::point(0xffffff, 200.0, [0.0, 0.0, 0.0], 0.0).attached_to_camera();
        let camera = Matrix4::from_translation(Vector3::new(0.0, 0.0, 10.0));
        let u = LightUniform::new(&[light], &camera, 1.0);
        assert_eq!(u.point[0].position, [0.0, 0.0, 10.0, 0.0]);
        assert_eq!(u.params[1], 1.0);
    }

    #[test]
    fn excess_lights_are_dropped() {
        let lights: Vec<Light> = (0..6)
            .map(|i| Light::directional(0xffffff, 1.0, [i as f32, 1.0, 0.0]))
            .collect();
        let u = LightUniform::new(&lights, &Matrix4::identity(), 1.0);
        assert_eq!(u.params[0], MAX_DIRECTIONAL_LIGHTS as f32);
    }
}
