//! A flat-shaded cube with two morph targets driven from the panel.

use instant::Duration;
use winit::event::WindowEvent;

use crate::{
    apps::{clear_colour, set_camera},
    context::{Context, InitContext},
    data_structures::{
        geometry::morph_cube,
        model::MaterialData,
        scene_graph::{ModelNode, SceneNode},
    },
    flow::{GraphicsFlow, Out},
    gui::{Gui, GuiChange, GuiValue},
    pipelines::light::Light,
    render::Render,
    viewer::ViewerEvent,
};

const SEGMENTS: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MorphControl {
    Influence(usize),
    Oscillate,
}

pub struct MorphApp {
    cube: ModelNode,
    gui: Gui<MorphControl>,
    oscillate: bool,
    elapsed: f32,
}

impl MorphApp {
    pub fn new(init: &InitContext) -> Self {
        let mut gui = morph_gui();
        if init.viewer.kiosk {
            gui.close();
        }
        Self {
            cube: morph_mesh(),
            gui,
            oscillate: false,
            elapsed: 0.0,
        }
    }

    fn apply(&mut self, change: GuiChange<MorphControl>) {
        match (change.binding, change.value) {
            (MorphControl::Influence(i), GuiValue::Number(v)) => {
                if let Some(influence) = self.cube.morph_target_influences.get_mut(i) {
                    *influence = v;
                }
            }
            (MorphControl::Oscillate, GuiValue::Bool(on)) => self.oscillate = on,
            _ => {}
        }
    }

    /// Advance the clock and, while oscillating, swing the first target.
    fn step(&mut self, dt: f32) {
        self.elapsed += dt;
        if self.oscillate
            && let Some(first) = self.cube.morph_target_influences.first_mut()
        {
            *first = (self.elapsed.sin() + 1.0) / 2.0;
        }
    }
}

pub fn morph_mesh() -> ModelNode {
    let mut material = MaterialData::hex("red", 0xff0000);
    material.flat_shading = true;
    ModelNode::new("morph cube", vec![morph_cube(SEGMENTS)], vec![material])
}

fn morph_gui() -> Gui<MorphControl> {
    let mut gui = Gui::new("Controls");
    let folder = gui.add_folder("Morph Targets");
    folder
        .add_slider("Spherify", MorphControl::Influence(0), 0.0, 0.0, 1.0, 0.01)
        .listen();
    folder
        .add_slider("Twist", MorphControl::Influence(1), 0.0, 0.0, 1.0, 0.01)
        .listen();
    folder.add_toggle("oscillate", MorphControl::Oscillate, false);
    folder.close();
    gui
}

impl GraphicsFlow<(), ViewerEvent> for MorphApp {
    fn on_init(&mut self, ctx: &mut Context, _state: &mut ()) -> Out<(), ViewerEvent> {
        ctx.clear_colour = clear_colour(0x8fbcd4);
        set_camera(ctx, 45.0, 1.0, 20.0, [0.0, 0.0, 10.0]);
        let controls = &mut ctx.camera.controls;
        controls.enable_zoom = false;
        controls.enable_pan = false;
        ctx.light.set_lights(vec![
            Light::ambient(0x8fbcd4, 1.5),
            Light::point(0xffffff, 200.0, [0.0, 0.0, 0.0], 0.0).attached_to_camera(),
        ]);
        Out::Empty
    }

    fn on_update(&mut self, ctx: &Context, _state: &mut (), dt: Duration) -> Out<(), ViewerEvent> {
        self.step(dt.as_secs_f32());
        self.cube.update_world_transform_all();
        self.cube.write_to_buffers(&ctx.queue, &ctx.device);

        let influences = &self.cube.morph_target_influences;
        self.gui.refresh(|control| match control {
            MorphControl::Influence(i) => influences.get(*i).copied(),
            MorphControl::Oscillate => None,
        });
        Out::Empty
    }

    fn on_window_events(&mut self, _: &Context, _: &mut (), _: &WindowEvent) -> Out<(), ViewerEvent> {
        Out::Empty
    }

    fn on_gui(&mut self, egui: &egui::Context, _state: &mut ()) -> Out<(), ViewerEvent> {
        for change in self.gui.show(egui) {
            self.apply(change);
        }
        Out::Empty
    }

    fn on_render(&self) -> Render<'_> {
        Render::Defaults(self.cube.get_render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> MorphApp {
        MorphApp {
            cube: morph_mesh(),
            gui: morph_gui(),
            oscillate: false,
            elapsed: 0.0,
        }
    }

    #[test]
    fn cube_is_red_flat_and_morphable() {
        let cube = morph_mesh();
        assert_eq!(cube.morph_target_influences, vec![0.0, 0.0]);
        assert_eq!(cube.morph_target_dictionary.get("Twist"), Some(&1));
        assert!(cube.materials[0].flat_shading);
        assert_eq!(cube.materials[0].base_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn folder_starts_closed_with_both_targets() {
        let gui = morph_gui();
        let folder = gui.folder("Morph Targets").expect("folder");
        assert!(!folder.is_open());
        let names: Vec<&str> = folder.controllers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Spherify", "Twist", "oscillate"]);
    }

    #[test]
    fn slider_changes_set_influences() {
        let mut app = app();
        app.apply(GuiChange {
            binding: MorphControl::Influence(1),
            value: GuiValue::Number(0.4),
        });
        assert_eq!(app.cube.morph_target_influences, vec![0.0, 0.4]);
    }

    #[test]
    fn oscillation_only_moves_the_first_target() {
        let mut app = app();
        app.step(1.0);
        assert_eq!(app.cube.morph_target_influences[0], 0.0);

        app.apply(GuiChange {
            binding: MorphControl::Oscillate,
            value: GuiValue::Bool(true),
        });
        app.step(0.5);
        let expected = (1.5f32.sin() + 1.0) / 2.0;
        assert!((app.cube.morph_target_influences[0] - expected).abs() < 1e-5);
        assert_eq!(app.cube.morph_target_influences[1], 0.0);
    }

    #[test]
    fn closed_panel_reports_no_edits() {
        let mut app = app();
        let egui = egui::Context::default();
        for _ in 0..2 {
            let _ = egui.run(egui::RawInput::default(), |egui| {
                let _ = app.on_gui(egui, &mut ());
            });
        }
        assert_eq!(app.cube.morph_target_influences, vec![0.0, 0.0]);
        assert!(!app.oscillate);
        assert_eq!(app.gui.folder("Morph Targets").map(|f| f.is_open()), Some(false));
    }
}
