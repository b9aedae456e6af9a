//! Skinned human viewer with a debug panel.
//!
//! The panel has fixed folders for display, lighting, animation and camera
//! settings plus one folder per morphable mesh and one per bone of the loaded
//! model. Load failures are kept in [`HumanApp::load_error`] and shown under
//! the scene.

use std::{collections::HashMap, f32::consts::PI};

use cgmath::Point3;
use instant::Duration;
use winit::event::WindowEvent;

use crate::{
    apps::{clear_colour, configure_all, set_camera},
    config::{Preset, ViewerConfig},
    context::{Context, InitContext},
    data_structures::scene_graph::{
        NodeKind, SceneNode, find_by_source_index, find_by_source_index_mut, traverse,
    },
    flow::{GraphicsFlow, Out},
    gui::{Gui, GuiChange, GuiValue},
    pipelines::light::{Light, LightKind},
    render::Render,
    resources::texture::Assets,
    viewer::{self, Viewer, ViewerEvent},
};

const MODEL: &str = "models/Thanh.glb";
const CAMERA: [f32; 3] = [0.0, 0.5, 2.0];
const AMBIENT_INTENSITY: f32 = 0.3;
const DIRECT_INTENSITY: f32 = 0.8 * PI;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HumanControl {
    Skeleton,
    Grid,
    Wireframe,
    AutoRotate,
    Lights,
    AmbientIntensity,
    DirectIntensity,
    Exposure,
    PlaybackSpeed,
    PlayAll,
    /// Camera position component 0, 1 or 2.
    Camera(usize),
    Morph { node: usize, target: usize },
    /// Bone rotation around axis 0, 1 or 2.
    Bone { node: usize, axis: usize },
}

type Edit = Box<dyn FnOnce(&mut Context)>;

pub struct HumanApp {
    viewer: Viewer,
    gui: Gui<HumanControl>,
    assets: Assets,
    model: String,
    kiosk: bool,
    preset: Preset,
    /// Folders built for the current model.
    model_folders: Vec<String>,
    /// Slider angles of every bone by source index, in radians.
    bone_angles: HashMap<usize, [f32; 3]>,
    pending: Vec<Edit>,
    pub load_error: Option<String>,
}

impl HumanApp {
    pub fn new(init: &InitContext) -> Self {
        Self::with_config(&init.viewer)
    }

    fn with_config(config: &ViewerConfig) -> Self {
        Self {
            viewer: Viewer::new(),
            gui: static_gui(),
            assets: config.assets.clone(),
            model: config.model_or(MODEL).to_string(),
            kiosk: config.kiosk,
            preset: config.preset,
            model_folders: Vec::new(),
            bone_angles: HashMap::new(),
            pending: Vec::new(),
            load_error: None,
        }
    }

    /// Lights for content without its own, using the panel's intensities.
    fn default_lights(&self) -> Vec<Light> {
        if self.preset == Preset::AssetGenerator {
            return vec![Light::hemisphere(0xffffff, 0xffffff, 1.0)];
        }
        let value = |control| {
            self.gui
                .controller(&control)
                .map(|c| c.value())
                .unwrap_or_default()
        };
        vec![
            Light::ambient(0xffffff, value(HumanControl::AmbientIntensity)),
            Light::directional(0xffffff, value(HumanControl::DirectIntensity), [0.5, 0.0, 0.866])
                .named("main_light")
                .attached_to_camera(),
        ]
    }

    fn scene_lights(&self) -> Vec<Light> {
        let lights_on = self
            .gui
            .controller(&HumanControl::Lights)
            .is_some_and(|c| c.is_on());
        match (lights_on, self.viewer.content_lights()) {
            (false, _) => Vec::new(),
            (true, []) => self.default_lights(),
            (true, own) => own.to_vec(),
        }
    }

    fn rebuild_model_folders(&mut self) {
        for name in self.model_folders.drain(..) {
            self.gui.remove_folder(&name);
        }
        self.bone_angles.clear();
        let Some(root) = self.viewer.content_root() else {
            return;
        };
        self.model_folders = add_model_folders(&mut self.gui, root, &mut self.bone_angles);
    }

    /// Take the outcome of a load in. Context edits it needs wait in `pending`.
    fn handle_event(&mut self, event: ViewerEvent) {
        match event {
            ViewerEvent::Loaded(model) => {
                self.load_error = None;
                let framing = self.viewer.set_content(model, Some(Point3::from(CAMERA)));
                if let Some(first) = self.viewer.clips().first().map(|clip| clip.name.clone())
                    && let Some(mixer) = self.viewer.mixer_mut()
                    && let Some(action) = mixer.clip_action(&first)
                {
                    action.play();
                }
                self.rebuild_model_folders();
                let lights = self.scene_lights();
                self.pending.push(Box::new(move |ctx| {
                    framing.apply(ctx);
                    ctx.light.set_lights(lights);
                }));
            }
            ViewerEvent::LoadFailed(e) => {
                log::error!("Loading {} failed: {}", self.model, e);
                self.load_error = Some(e);
            }
        }
    }

    fn apply(&mut self, change: GuiChange<HumanControl>) -> Option<Edit> {
        let number = match change.value {
            GuiValue::Number(v) => v,
            GuiValue::Bool(on) => if on { 1.0 } else { 0.0 },
            GuiValue::Pressed => 0.0,
        };
        let on = number > 0.5;
        match change.binding {
            HumanControl::Skeleton => self.viewer.state.skeleton = on,
            HumanControl::Grid => self.viewer.state.grid = on,
            HumanControl::Wireframe => self.viewer.set_wireframe(on),
            HumanControl::AutoRotate => {
                self.viewer.state.auto_rotate = on;
                return Some(Box::new(move |ctx| ctx.camera.controls.auto_rotate = on));
            }
            HumanControl::Lights => {
                let lights = self.scene_lights();
                return Some(Box::new(move |ctx| ctx.light.set_lights(lights)));
            }
            HumanControl::AmbientIntensity => {
                return Some(Box::new(move |ctx| {
                    ctx.light
                        .lights
                        .iter_mut()
                        .filter(|l| l.kind == LightKind::Ambient)
                        .for_each(|l| l.intensity = number);
                }));
            }
            HumanControl::DirectIntensity => {
                return Some(Box::new(move |ctx| {
                    ctx.light
                        .lights
                        .iter_mut()
                        .filter(|l| l.name == "main_light")
                        .for_each(|l| l.intensity = number);
                }));
            }
            HumanControl::Exposure => {
                return Some(Box::new(move |ctx| ctx.light.exposure = number));
            }
            HumanControl::PlaybackSpeed => self.viewer.set_playback_speed(number),
            HumanControl::PlayAll => self.viewer.play_all_clips(),
            HumanControl::Camera(axis) => {
                return Some(Box::new(move |ctx| match axis {
                    0 => ctx.camera.camera.position.x = number,
                    1 => ctx.camera.camera.position.y = number,
                    _ => ctx.camera.camera.position.z = number,
                }));
            }
            HumanControl::Morph { node, target } => {
                if let Some(model) = self
                    .viewer
                    .content_root_mut()
                    .and_then(|root| find_by_source_index_mut(root, node))
                    .and_then(|n| n.as_model_mut())
                    && let Some(influence) = model.morph_target_influences.get_mut(target)
                {
                    *influence = number;
                }
            }
            HumanControl::Bone { node, axis } => {
                // the rotation is rebuilt from the slider angles, never read back
                if let Some(angles) = self.bone_angles.get_mut(&node) {
                    angles[axis.min(2)] = number;
                    let angles = *angles;
                    if let Some(bone) = self
                        .viewer
                        .content_root_mut()
                        .and_then(|root| find_by_source_index_mut(root, node))
                    {
                        bone.local_transform_mut().set_euler(angles);
                    }
                }
            }
        }
        None
    }
}

fn static_gui() -> Gui<HumanControl> {
    let mut gui = Gui::new("Controls");
    let display = gui.add_folder("Display");
    display.add_toggle("skeleton", HumanControl::Skeleton, false);
    display.add_toggle("grid", HumanControl::Grid, false);
    display.add_toggle("wireframe", HumanControl::Wireframe, false);
    display.add_toggle("autoRotate", HumanControl::AutoRotate, false);

    let lighting = gui.add_folder("Lighting");
    lighting.add_toggle("addLights", HumanControl::Lights, true);
    lighting.add_slider("ambientIntensity", HumanControl::AmbientIntensity, AMBIENT_INTENSITY, 0.0, 2.0, 0.01);
    lighting.add_slider("directIntensity", HumanControl::DirectIntensity, DIRECT_INTENSITY, 0.0, 4.0, 0.01);
    lighting.add_slider("exposure", HumanControl::Exposure, 1.0, 0.0, 2.0, 0.01);

    let animation = gui.add_folder("Animation");
    animation.add_slider("playback speed", HumanControl::PlaybackSpeed, 1.0, 0.0, 1.0, 0.01);
    animation.add_button("play all", HumanControl::PlayAll);

    let cameras = gui.add_folder("Cameras");
    for (axis, (name, range)) in [("x", 50.0), ("y", 50.0), ("z", 100.0)].into_iter().enumerate() {
        cameras
            .add_slider(name, HumanControl::Camera(axis), CAMERA[axis], -range, range, 0.5)
            .listen();
    }
    gui
}

/// One folder per morphable mesh and per bone. Returns the folder names and
/// records each bone's starting angles in `bone_angles`.
fn add_model_folders(
    gui: &mut Gui<HumanControl>,
    root: &dyn SceneNode,
    bone_angles: &mut HashMap<usize, [f32; 3]>,
) -> Vec<String> {
    let mut names = Vec::new();
    traverse(root, &mut |node| {
        let Some(idx) = node.source_index() else {
            return;
        };
        if let Some(model) = node.as_model()
            && !model.morph_target_influences.is_empty()
        {
            let name = format!("Morph: {}", model.name);
            let folder = gui.add_folder(&name);
            for (target, weight) in model.morph_target_influences.iter().enumerate() {
                let label = model
                    .morph_target_name(target)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("morph {}", target));
                folder
                    .add_slider(&label, HumanControl::Morph { node: idx, target }, *weight, 0.0, 1.0, 0.01)
                    .listen();
            }
            folder.close();
            names.push(name);
        }
        if node.kind() == NodeKind::Bone {
            let name = format!("Bone: {}", node.name());
            let folder = gui.add_folder(&name);
            let euler = node.get_local_transform().euler();
            for (axis, label) in ["x", "y", "z"].into_iter().enumerate() {
                folder.add_slider(label, HumanControl::Bone { node: idx, axis }, euler[axis], -PI, PI, 0.01);
            }
            folder.close();
            bone_angles.insert(idx, euler);
            names.push(name);
        }
    });
    names
}

/// Current value of a listening controller.
fn live_value(viewer: &Viewer, ctx: &Context, control: &HumanControl) -> Option<f32> {
    match *control {
        HumanControl::Camera(axis) => {
            let p = ctx.camera.camera.position;
            Some([p.x, p.y, p.z][axis.min(2)])
        }
        HumanControl::Morph { node, target } => viewer
            .content_root()
            .and_then(|root| find_by_source_index(root, node))
            .and_then(|n| n.as_model())
            .and_then(|m| m.morph_target_influences.get(target).copied()),
        _ => None,
    }
}

impl GraphicsFlow<(), ViewerEvent> for HumanApp {
    fn on_init(&mut self, ctx: &mut Context, _state: &mut ()) -> Out<(), ViewerEvent> {
        ctx.clear_colour = clear_colour(0x191919);
        set_camera(ctx, 60.0, 0.01, 100.0, CAMERA);
        ctx.camera.controls.screen_space_panning = true;
        if self.kiosk {
            self.gui.close();
        }
        Out::event(viewer::load(self.assets.clone(), self.model.clone()))
    }

    fn on_update(&mut self, ctx: &Context, _state: &mut (), dt: Duration) -> Out<(), ViewerEvent> {
        self.viewer.update(dt.as_secs_f32());
        self.viewer.write_to_buffers(&ctx.device, &ctx.queue);

        let viewer = &self.viewer;
        self.gui.refresh(|control| live_value(viewer, ctx, control));

        configure_all(std::mem::take(&mut self.pending))
    }

    fn on_window_events(&mut self, _: &Context, _: &mut (), _: &WindowEvent) -> Out<(), ViewerEvent> {
        Out::Empty
    }

    fn on_gui(&mut self, egui: &egui::Context, _state: &mut ()) -> Out<(), ViewerEvent> {
        if let Some(e) = &self.load_error {
            egui::TopBottomPanel::bottom("load_error").show(egui, |ui| {
                ui.colored_label(
                    egui::Color32::LIGHT_RED,
                    format!("Failed to load {}: {}", self.model, e),
                );
            });
        }
        let edits = self
            .gui
            .show(egui)
            .into_iter()
            .filter_map(|change| self.apply(change))
            .collect();
        configure_all(edits)
    }

    fn on_custom_events(
        &mut self,
        _ctx: &Context,
        _state: &mut (),
        event: ViewerEvent,
    ) -> Option<ViewerEvent> {
        self.handle_event(event);
        None
    }

    fn on_render(&self) -> Render<'_> {
        self.viewer.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    use crate::{
        config::AppKind,
        data_structures::{
            geometry::morph_cube,
            instance::Instance,
            model::MaterialData,
            scene_graph::{ContainerNode, ModelNode},
        },
        resources::{
            LoadedModel,
            animation::{AnimationClip, Channel, Interpolation, Property},
        },
    };

    fn rigged() -> ContainerNode {
        let mut root = ContainerNode::new("Thanh");
        let mut hips = ContainerNode::new("hips")
            .with_kind(NodeKind::Bone)
            .with_source_index(1);
        hips.add_child(Box::new(
            ContainerNode::new("spine")
                .with_kind(NodeKind::Bone)
                .with_source_index(2),
        ));
        root.add_child(Box::new(hips));
        root.add_child(Box::new(
            ModelNode::new("face", vec![morph_cube(1)], vec![MaterialData::default()])
                .with_source_index(3),
        ));
        root
    }

    fn clip(name: &str) -> AnimationClip {
        AnimationClip::new(
            name,
            vec![Channel::new(
                1,
                Property::Translation,
                Interpolation::Linear,
                vec![0.0, 1.0],
                vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            )],
        )
    }

    fn app() -> HumanApp {
        HumanApp::with_config(&ViewerConfig::for_app(AppKind::Human))
    }

    fn loaded(root: ContainerNode, clips: Vec<AnimationClip>) -> ViewerEvent {
        ViewerEvent::Loaded(LoadedModel {
            root: Box::new(root),
            clips,
        })
    }

    fn light_names(lights: &[Light]) -> Vec<&str> {
        lights.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn model_folders_cover_morphs_and_bones() {
        let mut gui = static_gui();
        let mut angles = HashMap::new();
        let names = add_model_folders(&mut gui, &rigged(), &mut angles);
        assert_eq!(names, vec!["Bone: hips", "Bone: spine", "Morph: face"]);

        let morph = gui.folder("Morph: face").expect("morph folder");
        let labels: Vec<&str> = morph.controllers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(labels, vec!["Spherify", "Twist"]);
        assert!(!morph.is_open());
        assert_eq!(gui.folder("Bone: hips").map(|f| f.controllers.len()), Some(3));
        assert_eq!(angles.get(&1), Some(&[0.0, 0.0, 0.0]));
        assert_eq!(angles.len(), 2);
    }

    #[test]
    fn static_folders_match_the_panel_layout() {
        let gui = static_gui();
        let names: Vec<&str> = gui.folders().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Display", "Lighting", "Animation", "Cameras"]);
        let z = gui.controller(&HumanControl::Camera(2)).expect("camera z");
        assert_eq!(z.value(), 2.0);
        assert_eq!(
            z.kind,
            crate::gui::ControlKind::Slider {
                min: -100.0,
                max: 100.0,
                step: 0.5
            }
        );
    }

    #[test]
    fn live_values_read_morph_influences() {
        let mut app = app();
        let mut root = rigged();
        if let Some(face) = root.get_children_mut()[1].as_model_mut() {
            face.morph_target_influences[1] = 0.75;
        }
        app.handle_event(loaded(root, Vec::new()));
        let face = find_by_source_index(app.viewer.content_root().expect("content"), 3)
            .and_then(|n| n.as_model())
            .map(|m| m.morph_target_influences.clone());
        assert_eq!(face, Some(vec![0.0, 0.75]));
    }

    #[test]
    fn failed_loads_are_kept_for_the_caller() {
        let mut app = app();
        app.handle_event(ViewerEvent::LoadFailed("no such file".to_string()));
        assert_eq!(app.load_error.as_deref(), Some("no such file"));
        assert!(app.pending.is_empty());
        assert!(!app.viewer.has_content());

        app.handle_event(loaded(rigged(), Vec::new()));
        assert!(app.load_error.is_none());
        assert_eq!(app.pending.len(), 1);
    }

    #[test]
    fn content_without_lights_gets_the_default_rig() {
        let mut app = app();
        app.handle_event(loaded(rigged(), Vec::new()));
        let lights = app.scene_lights();
        assert_eq!(light_names(&lights), vec!["ambient_light", "main_light"]);
        assert_eq!(lights[0].intensity, AMBIENT_INTENSITY);
        assert_eq!(lights[1].intensity, DIRECT_INTENSITY);
    }

    #[test]
    fn content_lights_replace_the_default_rig() {
        let mut app = app();
        let mut root = rigged();
        root.add_child(Box::new(
            ContainerNode::new("sun").with_light(Light::directional(0xffffff, 3.0, [0.0; 3]).named("sun")),
        ));
        app.handle_event(loaded(root, Vec::new()));
        assert_eq!(light_names(&app.scene_lights()), vec!["sun"]);

        // a model without lights brings the defaults back
        app.handle_event(loaded(rigged(), Vec::new()));
        assert_eq!(light_names(&app.scene_lights()), vec!["ambient_light", "main_light"]);
    }

    #[test]
    fn asset_generator_preset_uses_a_hemisphere_light() {
        let mut config = ViewerConfig::for_app(AppKind::Human);
        config.preset = Preset::AssetGenerator;
        let mut app = HumanApp::with_config(&config);
        app.handle_event(loaded(rigged(), Vec::new()));
        let lights = app.scene_lights();
        assert_eq!(lights.len(), 1);
        assert!(matches!(lights[0].kind, LightKind::Hemisphere { .. }));
    }

    #[test]
    fn only_the_first_clip_starts_playing() {
        let mut app = app();
        app.handle_event(loaded(rigged(), vec![clip("idle"), clip("wave")]));
        let mixer = app.viewer.mixer().expect("mixer");
        assert!(mixer.action("idle").is_some_and(|a| a.is_running()));
        assert!(mixer.action("wave").is_some_and(|a| !a.is_running()));
    }

    #[test]
    fn a_second_model_replaces_the_model_folders() {
        let mut app = app();
        app.handle_event(loaded(rigged(), Vec::new()));
        assert!(app.gui.folder("Bone: spine").is_some());

        let mut other = ContainerNode::new("Other");
        other.add_child(Box::new(
            ContainerNode::new("root")
                .with_kind(NodeKind::Bone)
                .with_source_index(7),
        ));
        app.handle_event(loaded(other, Vec::new()));
        let names: Vec<&str> = app.gui.folders().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Display", "Lighting", "Animation", "Cameras", "Bone: root"]);
        assert_eq!(app.model_folders, vec!["Bone: root"]);
        assert_eq!(app.bone_angles.keys().collect::<Vec<_>>(), vec![&7]);
    }

    #[test]
    fn bone_sliders_rebuild_the_rotation_from_their_angles() {
        let mut app = app();
        app.handle_event(loaded(rigged(), Vec::new()));
        // past the point where reading angles back from the quaternion flips them
        let mut angle = 0.0;
        for _ in 0..200 {
            angle += 0.01;
            for axis in 0..2 {
                app.apply(GuiChange {
                    binding: HumanControl::Bone { node: 1, axis },
                    value: GuiValue::Number(angle),
                });
            }
        }
        let hips = find_by_source_index(app.viewer.content_root().expect("content"), 1)
            .expect("hips")
            .get_local_transform()
            .rotation;
        let mut expected = Instance::default();
        expected.set_euler([2.0, 2.0, 0.0]);
        assert!(hips.dot(expected.rotation).abs() > 0.9999);
        assert_eq!(app.bone_angles.get(&1), Some(&[angle, angle, 0.0]));
    }
}
