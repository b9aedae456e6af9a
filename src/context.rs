//! The GPU and window context shared by every flow.
//!
//! [`Context`] owns the surface, device and queue together with the resources
//! every viewer needs: camera and orbit controls, lights, the render pipelines,
//! the egui layer and the optional post-processing chain. Flows receive it in
//! every hook and may reconfigure it in `on_init` or through
//! [`crate::flow::Out::Configure`].

use std::sync::Arc;

use anyhow::Context as _;
use winit::{dpi::PhysicalPosition, window::Window};

use crate::{
    camera::{CameraResources, PerspectiveCamera},
    config::ViewerConfig,
    data_structures::texture::Texture,
    gui::UiLayer,
    pipelines::{
        Pipelines,
        light::LightResources,
        post::{PostProcessing, PostSettings},
    },
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseButtonState {
    Left,
    Right,
    #[default]
    None,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MouseState {
    pub coords: PhysicalPosition<f64>,
    pub pressed: MouseButtonState,
}

impl MouseState {
    /// Cursor position relative to the window centre, in pixels.
    pub fn from_center(&self, width: u32, height: u32) -> (f32, f32) {
        (
            self.coords.x as f32 - width as f32 / 2.0,
            self.coords.y as f32 - height as f32 / 2.0,
        )
    }
}

#[derive(Debug)]
pub struct Context {
    pub window: Arc<Window>,
    pub(crate) depth_texture: Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub light: LightResources,
    pub pipelines: Pipelines,
    pub ui: UiLayer,
    pub post: Option<PostProcessing>,
    pub clear_colour: wgpu::Color,
    pub tick_duration_millis: u64,
    pub mouse: MouseState,
    pub viewer: ViewerConfig,
}

impl Context {
    pub async fn new(window: Arc<Window>, viewer: ViewerConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create a surface for the window")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter found")?;

        log::info!("Requesting device and queue from {:?}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to request a GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders output linear colour. A non sRGB surface gets gamma applied by
        // the post-processing chain, otherwise colours come out darker.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("The surface reports no supported texture format")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let mut perspective = PerspectiveCamera::default().with_position(0.0, 0.0, 5.0);
        perspective.set_aspect(config.width, config.height);
        let mut camera = CameraResources::new(&device, perspective);
        camera.controls.set_viewport_height(config.height);

        let light = LightResources::new(&device);
        let pipelines = Pipelines::new(
            &device,
            config.format,
            &camera.bind_group_layout,
            &light.bind_group_layout,
        );
        let ui = UiLayer::new(&window, &device, config.format);

        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");

        Ok(Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config,
            camera,
            light,
            pipelines,
            ui,
            post: None,
            clear_colour: wgpu::Color::BLACK,
            tick_duration_millis: 100,
            mouse: MouseState::default(),
            viewer,
        })
    }

    /// Render into an offscreen target from now on and resolve it with `settings`.
    pub fn enable_post_processing(&mut self, settings: PostSettings) {
        match &mut self.post {
            Some(post) => post.set_settings(&self.queue, settings),
            None => {
                self.post = Some(PostProcessing::new(
                    &self.device,
                    self.config.format,
                    [self.config.width, self.config.height],
                    settings,
                ));
            }
        }
    }

    pub fn disable_post_processing(&mut self) {
        if let Some(post) = self.post.take() {
            post.target.destroy();
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Apply a new viewport size to everything that depends on it.
    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.camera.camera.set_aspect(width, height);
        self.camera.controls.set_viewport_height(height);
        self.depth_texture.destroy();
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
        if let Some(post) = &mut self.post {
            post.resize(&self.device, &self.queue, [width, height]);
        }
    }
}

/// What a flow constructor gets to build its initial state with.
///
/// Device and queue are reference counted handles, so cloning them from the
/// context is cheap.
#[derive(Clone, Debug)]
pub struct InitContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub viewer: ViewerConfig,
}

impl From<&Context> for InitContext {
    fn from(ctx: &Context) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            viewer: ctx.viewer.clone(),
        }
    }
}

/// Types that keep CPU data which has to be copied to the GPU before drawing.
pub trait BufferWriter {
    fn write_to_buffer(&mut self, ctx: &Context);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_offsets_are_relative_to_the_window_centre() {
        let mouse = MouseState {
            coords: PhysicalPosition::new(100.0, 50.0),
            pressed: MouseButtonState::None,
        };
        assert_eq!(mouse.from_center(400, 300), (-100.0, -100.0));
    }
}
