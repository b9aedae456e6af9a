//! A purple cube spinning under a directional and an ambient light.

use instant::Duration;
use winit::event::WindowEvent;

use crate::{
    apps::{clear_colour, set_camera},
    context::{Context, InitContext},
    data_structures::{
        geometry::box_geometry,
        model::MaterialData,
        scene_graph::{ModelNode, SceneNode},
    },
    flow::{GraphicsFlow, Out},
    pipelines::light::Light,
    render::Render,
    viewer::ViewerEvent,
};

const SKY_BLUE: u32 = 0x87ceeb;
const PURPLE: u32 = 0x800080;
/// Radians per frame around x and y.
const SPIN: f32 = 0.01;

pub struct BasicApp {
    cube: ModelNode,
    /// Accumulated XYZ euler angles of the cube.
    rotation: [f32; 3],
}

impl BasicApp {
    pub fn new(_init: &InitContext) -> Self {
        Self {
            cube: cube(),
            rotation: [0.0; 3],
        }
    }
}

pub fn cube() -> ModelNode {
    let mut cube = ModelNode::new(
        "cube",
        vec![box_geometry(2.0, 2.0, 2.0)],
        vec![MaterialData::hex("purple", PURPLE)],
    );
    cube
}

/// One frame of spin. The angles only ever grow, the rotation is rebuilt from them.
pub fn tick(rotation: &mut [f32; 3], cube: &mut ModelNode) {
    rotation[0] += SPIN;
    rotation[1] += SPIN;
    cube.local_transform_mut().set_euler(*rotation);
}

impl GraphicsFlow<(), ViewerEvent> for BasicApp {
    fn on_init(&mut self, ctx: &mut Context, _state: &mut ()) -> Out<(), ViewerEvent> {
        ctx.clear_colour = clear_colour(SKY_BLUE);
        set_camera(ctx, 35.0, 0.1, 100.0, [0.0, 0.0, 10.0]);
        ctx.light.set_lights(vec![
            Light::directional(0xffffff, 8.0, [10.0, 10.0, 10.0]).named("main_light"),
            Light::ambient(0xffffff, 2.0),
        ]);
        Out::Empty
    }

    fn on_update(&mut self, ctx: &Context, _state: &mut (), _dt: Duration) -> Out<(), ViewerEvent> {
        tick(&mut self.rotation, &mut self.cube);
        self.cube.update_world_transform_all();
        self.cube.write_to_buffers(&ctx.queue, &ctx.device);
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

    fn on_render(&self) -> Render<'_> {
        Render::Defaults(self.cube.get_render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cgmath::InnerSpace;

    use crate::data_structures::instance::Instance;

    #[test]
    fn cube_spins_a_little_every_frame() {
        let mut cube = cube();
        let mut rotation = [0.0; 3];
        assert_eq!(cube.get_local_transform().euler(), [0.0, 0.0, 0.0]);
        tick(&mut rotation, &mut cube);
        let after = cube.get_local_transform().euler();
        assert!((after[0] - SPIN).abs() < 1e-4);
        assert!((after[1] - SPIN).abs() < 1e-4);
        assert!(after[2].abs() < 1e-4);
    }

    #[test]
    fn spin_keeps_going_past_the_pole() {
        let mut cube = cube();
        let mut rotation = [0.0; 3];
        for _ in 0..400 {
            tick(&mut rotation, &mut cube);
        }
        let mut expected = Instance::default();
        expected.set_euler([4.0, 4.0, 0.0]);
        let dot = cube.get_local_transform().rotation.dot(expected.rotation);
        assert!(dot.abs() > 0.9999, "rotation drifted, dot {}", dot);
    }
}
