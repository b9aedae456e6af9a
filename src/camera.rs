//! Perspective camera, orbit controls and the camera uniform.
//!
//! The camera follows the usual right handed, y-up convention. Its projection
//! is cached and has to be refreshed with [`PerspectiveCamera::update_projection`]
//! after `fov`, `near` or `far` change; [`PerspectiveCamera::set_aspect`] does
//! that on its own.

use std::f32::consts::PI;

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};
use wgpu::util::DeviceExt;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const EPS: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    projection: Matrix4<f32>,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position: Point3::new(0.0, 0.0, 0.0),
            target: Point3::new(0.0, 0.0, -1.0),
            up: Vector3::unit_y(),
            fov,
            aspect,
            near,
            far,
            projection: Matrix4::identity(),
        };
        camera.update_projection();
        camera
    }

    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Point3::new(x, y, z);
        self
    }

    pub fn look_at(&mut self, target: Point3<f32>) {
        self.target = target;
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection
    }

    pub fn update_projection(&mut self) {
        self.projection = OPENGL_TO_WGPU_MATRIX
            * cgmath::perspective(cgmath::Deg(self.fov), self.aspect, self.near, self.far);
    }

    /// Returns false and leaves the camera untouched for a zero sized viewport.
    pub fn set_aspect(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.aspect = width as f32 / height as f32;
        self.update_projection();
        true
    }

    pub fn view_proj(&self) -> Matrix4<f32> {
        self.projection * self.view_matrix()
    }

    /// Inverse of the view matrix, used to place camera attached lights.
    pub fn camera_to_world(&self) -> Matrix4<f32> {
        self.view_matrix().invert().unwrap_or_else(Matrix4::identity)
    }

    pub fn distance_to_target(&self) -> f32 {
        (self.position - self.target).magnitude()
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(50.0, 1.0, 0.1, 2000.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ControlState {
    #[default]
    None,
    Rotate,
    Pan,
}

/// Orbits the camera around a target: left drag rotates, right drag pans,
/// the wheel zooms.
#[derive(Clone, Debug)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    pub enabled: bool,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_zoom: bool,
    pub zoom_speed: f32,
    pub enable_rotate: bool,
    pub rotate_speed: f32,
    pub enable_pan: bool,
    pub pan_speed: f32,
    /// Pan in the camera plane instead of the ground plane.
    pub screen_space_panning: bool,
    pub auto_rotate: bool,
    /// 2.0 is one orbit every 30 seconds.
    pub auto_rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    state: ControlState,
    last_cursor: Option<(f64, f64)>,
    viewport_height: f32,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_pixels: (f32, f32),
    pan_offset: Vector3<f32>,
    saved: Option<(Point3<f32>, Point3<f32>)>,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Point3::new(0.0, 0.0, 0.0),
            enabled: true,
            enable_damping: false,
            damping_factor: 0.05,
            enable_zoom: true,
            zoom_speed: 1.0,
            enable_rotate: true,
            rotate_speed: 1.0,
            enable_pan: true,
            pan_speed: 1.0,
            screen_space_panning: true,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            state: ControlState::None,
            last_cursor: None,
            viewport_height: 1.0,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_pixels: (0.0, 0.0),
            pan_offset: Vector3::new(0.0, 0.0, 0.0),
            saved: None,
        }
    }
}

impl OrbitControls {
    pub fn new(target: Point3<f32>) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub fn set_viewport_height(&mut self, height: u32) {
        self.viewport_height = height.max(1) as f32;
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    pub fn dolly_in(&mut self, dolly_scale: f32) {
        self.scale *= dolly_scale;
    }

    pub fn dolly_out(&mut self, dolly_scale: f32) {
        self.scale /= dolly_scale;
    }

    /// Queue a pan by a mouse movement in pixels.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.pan_pixels.0 += dx;
        self.pan_pixels.1 += dy;
    }

    /// Feed a window event. Returns true when the event was used.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        if !self.enabled {
            return false;
        }
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                self.state = match (button, state) {
                    (MouseButton::Left, ElementState::Pressed) if self.enable_rotate => {
                        ControlState::Rotate
                    }
                    (MouseButton::Right, ElementState::Pressed) if self.enable_pan => {
                        ControlState::Pan
                    }
                    (_, ElementState::Released) => ControlState::None,
                    _ => self.state,
                };
                self.state != ControlState::None
            }
            WindowEvent::CursorMoved { position, .. } => {
                let current = (position.x, position.y);
                let previous = self.last_cursor.replace(current);
                let Some((px, py)) = previous else {
                    return false;
                };
                let (dx, dy) = ((current.0 - px) as f32, (current.1 - py) as f32);
                match self.state {
                    ControlState::Rotate => {
                        let h = self.viewport_height;
                        self.rotate_left(2.0 * PI * dx / h * self.rotate_speed);
                        self.rotate_up(2.0 * PI * dy / h * self.rotate_speed);
                        true
                    }
                    ControlState::Pan => {
                        self.pan(dx * self.pan_speed, dy * self.pan_speed);
                        true
                    }
                    ControlState::None => false,
                }
            }
            WindowEvent::MouseWheel { delta, .. } if self.enable_zoom => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                if y > 0.0 {
                    self.dolly_in(self.zoom_scale());
                } else if y < 0.0 {
                    self.dolly_out(self.zoom_scale());
                }
                y != 0.0
            }
            _ => false,
        }
    }

    pub fn save_state(&mut self, camera: &PerspectiveCamera) {
        self.saved = Some((self.target, camera.position));
    }

    /// Return to the last saved state.
    pub fn reset(&mut self, camera: &mut PerspectiveCamera) {
        if let Some((target, position)) = self.saved {
            self.target = target;
            camera.position = position;
            camera.target = target;
        }
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.scale = 1.0;
        self.pan_pixels = (0.0, 0.0);
        self.pan_offset = Vector3::new(0.0, 0.0, 0.0);
        self.state = ControlState::None;
    }

    fn pan_to_world(&self, camera: &PerspectiveCamera) -> Vector3<f32> {
        let (dx, dy) = self.pan_pixels;
        if dx == 0.0 && dy == 0.0 {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        let offset = camera.position - self.target;
        let target_distance = offset.magnitude() * (camera.fov.to_radians() / 2.0).tan();
        let h = self.viewport_height;
        let forward = (self.target - camera.position).normalize();
        let right = forward.cross(camera.up).normalize();
        let up = if self.screen_space_panning {
            right.cross(forward).normalize()
        } else {
            camera.up.cross(right).normalize()
        };
        let left_distance = 2.0 * dx * target_distance / h;
        let up_distance = 2.0 * dy * target_distance / h;
        -right * left_distance + up * up_distance
    }

    /// Apply queued input to `camera`. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera, dt: f32) -> bool {
        let old_position = camera.position;
        let old_target = self.target;

        let pan = self.pan_to_world(camera);
        self.pan_offset += pan;
        self.pan_pixels = (0.0, 0.0);

        let offset = camera.position - self.target;
        let mut radius = offset.magnitude();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > 0.0 {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };

        if self.enabled && self.auto_rotate && self.state == ControlState::None {
            self.rotate_left(2.0 * PI / 60.0 * self.auto_rotate_speed * dt);
        }

        let factor = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.delta_theta * factor;
        phi += self.delta_phi * factor;
        phi = phi
            .clamp(self.min_polar_angle, self.max_polar_angle)
            .clamp(EPS, PI - EPS);
        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * factor;

        let sin_phi_radius = phi.sin() * radius;
        let offset = Vector3::new(
            sin_phi_radius * theta.sin(),
            phi.cos() * radius,
            sin_phi_radius * theta.cos(),
        );
        camera.position = self.target + offset;
        camera.target = self.target;

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vector3::new(0.0, 0.0, 0.0);
        }
        self.scale = 1.0;

        (camera.position - old_position).magnitude2() > EPS
            || (self.target - old_target).magnitude2() > EPS
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &PerspectiveCamera) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = camera.view_proj().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CameraResources {
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device, camera: PerspectiveCamera) -> Self {
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(&camera);
        let buffer = mk_buffer(device, uniform, "Camera Buffer");
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer, "camera_bind_group");
        Self {
            camera,
            controls: OrbitControls::new(camera.target),
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn write(&mut self, queue: &wgpu::Queue) {
        self.uniform.update_view_proj(&self.camera);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

pub fn mk_buffer(device: &wgpu::Device, uniform: CameraUniform, label: &str) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&[uniform]),
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
        label: Some("camera_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
        label: Some(label),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn camera_at(z: f32) -> PerspectiveCamera {
        PerspectiveCamera::new(45.0, 1.0, 0.1, 100.0).with_position(0.0, 0.0, z)
    }

    #[test]
    fn aspect_follows_viewport_and_ignores_zero_sizes() {
        let mut camera = camera_at(10.0);
        assert!(camera.set_aspect(1920, 1080));
        assert!(approx(camera.aspect, 1920.0 / 1080.0));
        assert!(!camera.set_aspect(0, 1080));
        assert!(approx(camera.aspect, 1920.0 / 1080.0));
    }

    #[test]
    fn projection_maps_near_and_far_to_wgpu_depth() {
        let camera = camera_at(0.0);
        let near = camera.projection_matrix() * cgmath::Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = camera.projection_matrix() * cgmath::Vector4::new(0.0, 0.0, -100.0, 1.0);
        assert!(approx(near.z / near.w, 0.0));
        assert!(approx(far.z / far.w, 1.0));
    }

    #[test]
    fn projection_is_cached_until_updated() {
        let mut camera = camera_at(0.0);
        let before = camera.projection_matrix();
        camera.far = 10.0;
        assert_eq!(camera.projection_matrix(), before);
        camera.update_projection();
        assert_ne!(camera.projection_matrix(), before);
    }

    #[test]
    fn idle_controls_do_not_move_the_camera() {
        let mut camera = camera_at(5.0);
        let mut controls = OrbitControls::default();
        assert!(!controls.update(&mut camera, 0.016));
        assert!(approx(camera.position.z, 5.0));
    }

    #[test]
    fn rotation_keeps_the_distance_to_the_target() {
        let mut camera = camera_at(5.0);
        let mut controls = OrbitControls::default();
        controls.rotate_left(PI / 2.0);
        assert!(controls.update(&mut camera, 0.016));
        assert!(approx(camera.distance_to_target(), 5.0));
        assert!(approx(camera.position.x, -5.0));
    }

    #[test]
    fn zoom_is_clamped_to_the_distance_limits() {
        let mut camera = camera_at(5.0);
        let mut controls = OrbitControls {
            min_distance: 4.0,
            ..Default::default()
        };
        for _ in 0..20 {
            controls.dolly_in(0.95);
        }
        controls.update(&mut camera, 0.016);
        assert!(approx(camera.distance_to_target(), 4.0));
    }

    #[test]
    fn damping_spreads_a_rotation_over_frames() {
        let mut camera = camera_at(5.0);
        let mut controls = OrbitControls {
            enable_damping: true,
            damping_factor: 0.5,
            ..Default::default()
        };
        controls.rotate_left(1.0);
        controls.update(&mut camera, 0.016);
        let first = camera.position;
        assert!(controls.update(&mut camera, 0.016));
        assert_ne!(camera.position, first);
        assert!(approx(camera.distance_to_target(), 5.0));
    }

    #[test]
    fn reset_returns_to_the_saved_state() {
        let mut camera = camera_at(5.0);
        let mut controls = OrbitControls::default();
        controls.save_state(&camera);
        controls.rotate_up(0.5);
        controls.pan(10.0, 0.0);
        controls.update(&mut camera, 0.016);
        controls.reset(&mut camera);
        assert_eq!(camera.position, Point3::new(0.0, 0.0, 5.0));
        assert_eq!(controls.target, Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn screen_space_pan_moves_target_and_camera_together() {
        let mut camera = camera_at(5.0);
        let mut controls = OrbitControls::default();
        controls.set_viewport_height(100);
        controls.pan(10.0, 0.0);
        controls.update(&mut camera, 0.016);
        assert!(controls.target.x < 0.0);
        assert!(approx(camera.position.x, controls.target.x));
        assert!(approx(camera.distance_to_target(), 5.0));
    }
}
