//! The five viewers and the plumbing they share.
//!
//! Every app is a single [`GraphicsFlow`] with unit state. Model loads are
//! issued as [`Out::event`] futures and come back as [`ViewerEvent`]s.

use cgmath::Point3;

use crate::{
    config::{AppKind, ViewerConfig},
    context::{Context, InitContext},
    data_structures::model::hex_to_rgba,
    flow::{self, FlowConsturctor, GraphicsFlow, Out},
    viewer::ViewerEvent,
};

pub mod basic;
pub mod facecap;
pub mod human;
pub mod morph;
pub mod normalmap;

pub type AppFlow = Box<dyn GraphicsFlow<(), ViewerEvent>>;

/// Build the flow of `app` once the GPU context exists.
pub fn constructor(app: AppKind) -> FlowConsturctor<(), ViewerEvent> {
    Box::new(move |init: InitContext| {
        Box::pin(async move {
            log::info!("Starting the {} viewer", app.name());
            let flow: AppFlow = match app {
                AppKind::Basic => Box::new(basic::BasicApp::new(&init)),
                AppKind::Facecap => Box::new(facecap::FacecapApp::new(&init)),
                AppKind::Human => Box::new(human::HumanApp::new(&init)),
                AppKind::Morph => Box::new(morph::MorphApp::new(&init)),
                AppKind::Normalmap => Box::new(normalmap::NormalmapApp::new(&init)),
            };
            flow
        })
    })
}

/// Open a window and run the configured app until it is closed.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    let app = config.app;
    flow::run_with_config(config, vec![constructor(app)])
}

/// sRGB hex colour as a linear clear colour.
pub fn clear_colour(hex: u32) -> wgpu::Color {
    let [r, g, b, _] = hex_to_rgba(hex);
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: 1.0,
    }
}

/// Place the camera looking at the origin and make it the controls' reset state.
pub fn set_camera(ctx: &mut Context, fov: f32, near: f32, far: f32, position: [f32; 3]) {
    let camera = &mut ctx.camera.camera;
    camera.fov = fov;
    camera.near = near;
    camera.far = far;
    camera.position = Point3::from(position);
    camera.look_at(Point3::new(0.0, 0.0, 0.0));
    camera.update_projection();
    let controls = &mut ctx.camera.controls;
    controls.target = camera.target;
    controls.save_state(camera);
}

/// Several context edits as one output.
pub(crate) fn configure_all(edits: Vec<Box<dyn FnOnce(&mut Context)>>) -> Out<(), ViewerEvent> {
    if edits.is_empty() {
        return Out::Empty;
    }
    Out::configure(move |ctx| edits.into_iter().for_each(|edit| edit(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_colours_are_linear() {
        let white = clear_colour(0xffffff);
        assert_eq!((white.r, white.g, white.b, white.a), (1.0, 1.0, 1.0, 1.0));
        let grey = clear_colour(0x808080);
        assert!(grey.r > 0.2 && grey.r < 0.23);
    }
}
