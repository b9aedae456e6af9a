//! Face capture playback: loads an animated head and plays all of its clips.

use cgmath::Point3;
use instant::Duration;
use winit::event::WindowEvent;

use crate::{
    apps::{clear_colour, set_camera},
    context::{Context, InitContext},
    flow::{GraphicsFlow, Out},
    pipelines::light::Light,
    render::Render,
    resources::texture::Assets,
    viewer::{self, Viewer, ViewerEvent},
};

const MODEL: &str = "models/facecap.glb";
const CAMERA: [f32; 3] = [0.0, 1.0, 5.0];

pub struct FacecapApp {
    viewer: Viewer,
    assets: Assets,
    model: String,
}

impl FacecapApp {
    pub fn new(init: &InitContext) -> Self {
        Self {
            viewer: Viewer::new(),
            assets: init.viewer.assets.clone(),
            model: init.viewer.model_or(MODEL).to_string(),
        }
    }
}

impl GraphicsFlow<(), ViewerEvent> for FacecapApp {
    fn on_init(&mut self, ctx: &mut Context, _state: &mut ()) -> Out<(), ViewerEvent> {
        ctx.clear_colour = clear_colour(0xffffff);
        set_camera(ctx, 35.0, 0.1, 1000.0, CAMERA);
        let controls = &mut ctx.camera.controls;
        controls.enable_damping = true;
        controls.damping_factor = 0.05;
        controls.screen_space_panning = true;
        ctx.light.set_lights(vec![
            Light::directional(0xffffff, 8.0, [10.0, 10.0, 10.0]).named("main_light"),
            Light::ambient(0xffffff, 2.0),
        ]);
        Out::event(viewer::load(self.assets.clone(), self.model.clone()))
    }

    fn on_update(&mut self, ctx: &Context, _state: &mut (), dt: Duration) -> Out<(), ViewerEvent> {
        self.viewer.update(dt.as_secs_f32());
        self.viewer.write_to_buffers(&ctx.device, &ctx.queue);
        Out::Empty
    }

    fn on_window_events(
        &mut self,
        _ctx: &Context,
        _state: &mut (),
        _event: &WindowEvent,
    ) -> Out<(), ViewerEvent> {
        Out::Empty
    }

    fn on_custom_events(
        &mut self,
        _ctx: &Context,
        _state: &mut (),
        event: ViewerEvent,
    ) -> Option<ViewerEvent> {
        match event {
            ViewerEvent::Loaded(model) => {
                // the camera stays where on_init put it
                self.viewer.set_content(model, Some(Point3::from(CAMERA)));
                self.viewer.play_all_clips();
                log::info!("Playing {} clips", self.viewer.clips().len());
            }
            ViewerEvent::LoadFailed(e) => log::error!("Loading {} failed: {}", self.model, e),
        }
        None
    }

    fn on_render(&self) -> Render<'_> {
        self.viewer.render()
    }
}
