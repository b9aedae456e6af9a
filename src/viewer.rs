//! The viewer core shared by the model viewing apps.
//!
//! A [`Viewer`] owns a scene root with at most one loaded model in it (the
//! content) and at most one animation mixer driving that model. Replacing the
//! content releases the GPU resources of the previous model before the new one
//! is attached. Debug helpers (skeleton, grid, wireframes) are rebuilt every
//! frame from the live scene.

use std::fmt::Write as _;

use cgmath::{InnerSpace, Point3, Vector3};

use crate::{
    context::Context,
    data_structures::{
        helpers,
        scene_graph::{self, ContainerNode, SceneNode, update_skinning},
    },
    pipelines::{light::Light, lines::LineBatch},
    render::Render,
    resources::{
        LoadedModel,
        animation::{AnimationClip, AnimationMixer},
        load_model_gltf,
        texture::Assets,
    },
};

/// Events produced by asynchronous loads.
pub enum ViewerEvent {
    Loaded(LoadedModel),
    LoadFailed(String),
}

/// Load `file` and wrap the outcome into a [`ViewerEvent`].
pub async fn load(assets: Assets, file: String) -> ViewerEvent {
    match load_model_gltf(&assets, &file).await {
        Ok(model) => ViewerEvent::Loaded(model),
        Err(e) => ViewerEvent::LoadFailed(format!("{:#}", e)),
    }
}

/// Camera placement derived from the size of the content.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Framing {
    pub near: f32,
    pub far: f32,
    pub max_distance: f32,
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

impl Framing {
    pub fn for_size(size: f32, position: Option<Point3<f32>>) -> Self {
        Self {
            near: size / 100.0,
            far: size * 100.0,
            max_distance: size * 10.0,
            position: position.unwrap_or(Point3::new(size / 2.0, size / 5.0, size / 2.0)),
            target: Point3::new(0.0, 0.0, 0.0),
        }
    }

    /// Move camera and controls and make this the state controls reset to.
    pub fn apply(&self, ctx: &mut Context) {
        let camera = &mut ctx.camera.camera;
        camera.near = self.near;
        camera.far = self.far;
        camera.position = self.position;
        camera.look_at(self.target);
        camera.update_projection();
        let controls = &mut ctx.camera.controls;
        controls.target = self.target;
        controls.max_distance = self.max_distance;
        controls.save_state(camera);
        controls.reset(camera);
    }
}

/// What the display folder of the debug panel toggles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayState {
    pub skeleton: bool,
    pub grid: bool,
    pub wireframe: bool,
    pub auto_rotate: bool,
    pub playback_speed: f32,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            skeleton: false,
            grid: false,
            wireframe: false,
            auto_rotate: false,
            playback_speed: 1.0,
        }
    }
}

struct Content {
    /// Index of the model among the scene's children.
    child: usize,
    mixer: Option<AnimationMixer>,
    lights: Vec<Light>,
}

pub struct Viewer {
    pub scene: ContainerNode,
    pub state: DisplayState,
    content: Option<Content>,
    lines: LineBatch,
    overlay: LineBatch,
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewer {
    pub fn new() -> Self {
        Self {
            scene: ContainerNode::new("scene"),
            state: DisplayState::default(),
            content: None,
            lines: LineBatch::new("viewer lines"),
            overlay: LineBatch::new("viewer overlay"),
        }
    }

    /// Replace the content with `model`, centred at the origin.
    ///
    /// `camera` places the camera, otherwise it is derived from the content size.
    pub fn set_content(&mut self, model: LoadedModel, camera: Option<Point3<f32>>) -> Framing {
        self.clear();

        let LoadedModel { mut root, clips } = model;
        root.update_world_transform_all();
        let bounds = scene_graph::bounds(root.as_ref());
        let (center, size) = if bounds.is_empty() {
            (Vector3::new(0.0, 0.0, 0.0), 1.0)
        } else {
            (bounds.center(), bounds.size().magnitude().max(f32::EPSILON))
        };
        root.local_transform_mut().position -= center;

        let mixer = (!clips.is_empty()).then(|| {
            let mut mixer = AnimationMixer::new(clips);
            mixer.time_scale = self.state.playback_speed;
            mixer
        });

        self.scene.add_child(root);
        self.scene.update_world_transform_all();
        let child = self.scene.children.len() - 1;
        let lights = scene_graph::collect_lights(self.scene.children[child].as_ref());
        self.content = Some(Content {
            child,
            mixer,
            lights,
        });
        self.set_wireframe(self.state.wireframe);
        self.print_graph();
        Framing::for_size(size, camera)
    }

    /// Remove the content and release its GPU resources. Returns the released model.
    pub fn clear(&mut self) -> Option<Box<dyn SceneNode>> {
        let content = self.content.take()?;
        let mut removed = self.scene.remove_child(content.child)?;
        removed.dispose();
        Some(removed)
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn content_root(&self) -> Option<&dyn SceneNode> {
        let content = self.content.as_ref()?;
        self.scene.children.get(content.child).map(|c| c.as_ref())
    }

    pub fn content_root_mut(&mut self) -> Option<&mut (dyn SceneNode + 'static)> {
        let content = self.content.as_ref()?;
        self.scene.children.get_mut(content.child).map(|c| c.as_mut())
    }

    /// Lights the content brought with it, in world space.
    pub fn content_lights(&self) -> &[Light] {
        self.content.as_ref().map(|c| c.lights.as_slice()).unwrap_or(&[])
    }

    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.content.as_ref()?.mixer.as_ref()
    }

    pub fn mixer_mut(&mut self) -> Option<&mut AnimationMixer> {
        self.content.as_mut()?.mixer.as_mut()
    }

    pub fn clips(&self) -> &[AnimationClip] {
        self.mixer().map(AnimationMixer::clips).unwrap_or(&[])
    }

    /// Start every clip from the beginning.
    pub fn play_all_clips(&mut self) {
        if let Some(mixer) = self.mixer_mut() {
            mixer.actions_mut().for_each(|action| {
                action.reset().play();
            });
        }
    }

    pub fn set_playback_speed(&mut self, speed: f32) {
        self.state.playback_speed = speed;
        if let Some(mixer) = self.mixer_mut() {
            mixer.time_scale = speed;
        }
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.state.wireframe = wireframe;
        scene_graph::traverse_mut(&mut self.scene, &mut |node| {
            if let Some(model) = node.as_model_mut() {
                model.set_wireframe(wireframe);
            }
        });
    }

    /// Advance animations, skinning and helpers by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        if let Some(content) = &mut self.content {
            if let Some(mixer) = &mut content.mixer
                && mixer.is_playing()
            {
                mixer.update(dt);
                if let Some(root) = self.scene.children.get_mut(content.child) {
                    mixer.apply(root.as_mut());
                }
            }
        }
        self.scene.update_world_transform_all();
        update_skinning(&mut self.scene);
        self.update_helpers();
    }

    fn update_helpers(&mut self) {
        self.lines.clear();
        self.overlay.clear();
        if self.state.grid {
            helpers::push_grid(&mut self.lines, 10.0, 10, 0x444444, 0x888888);
            helpers::push_axes(&mut self.overlay, 1.0);
        }
        if self.state.wireframe {
            helpers::push_wireframes(&mut self.lines, &self.scene);
        }
        if self.state.skeleton {
            helpers::push_skeleton(&mut self.overlay, &self.scene);
        }
    }

    pub fn write_to_buffers(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        self.scene.write_to_buffers(queue, device);
        self.lines.write_to_buffer(device, queue);
        self.overlay.write_to_buffer(device, queue);
    }

    pub fn render(&self) -> Render<'_> {
        let mut renders = vec![
            Render::Defaults(self.scene.get_render()),
            Render::Transparents(self.scene.get_transparent_render()),
        ];
        if !self.lines.is_empty() {
            renders.push(Render::Lines(&self.lines));
        }
        if !self.overlay.is_empty() {
            renders.push(Render::Overlay(&self.overlay));
        }
        Render::Composed(renders)
    }

    /// Indented tree of node names and types.
    pub fn graph(&self) -> String {
        fn walk(out: &mut String, node: &dyn SceneNode, depth: usize) {
            let _ = writeln!(
                out,
                "{}<{}> {}",
                "  ".repeat(depth),
                node.kind().type_name(),
                node.name()
            );
            for child in node.get_children() {
                walk(out, child.as_ref(), depth + 1);
            }
        }
        let mut out = String::new();
        walk(&mut out, &self.scene, 0);
        out
    }

    pub fn print_graph(&self) {
        log::debug!("Scene graph:\n{}", self.graph());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::{
            geometry::box_geometry,
            model::MaterialData,
            scene_graph::{ModelNode, NodeKind},
        },
        resources::animation::{Channel, Interpolation, Property},
    };

    fn model(name: &str, offset: f32, clips: Vec<AnimationClip>) -> LoadedModel {
        let mut root = ContainerNode::new(name);
        let mut cube = ModelNode::new(
            &format!("{name} cube"),
            vec![box_geometry(2.0, 2.0, 2.0)],
            vec![MaterialData::default()],
        )
        .with_source_index(0);
        cube.local_transform_mut().position = Vector3::new(offset, 0.0, 0.0);
        root.add_child(Box::new(cube));
        LoadedModel {
            root: Box::new(root),
            clips,
        }
    }

    fn spin() -> AnimationClip {
        AnimationClip::new(
            "lift",
            vec![Channel::new(
                0,
                Property::Translation,
                Interpolation::Linear,
                vec![0.0, 1.0],
                vec![0.0, 0.0, 0.0, 0.0, 2.0, 0.0],
            )],
        )
    }

    #[test]
    fn loading_adds_exactly_one_child() {
        let mut viewer = Viewer::new();
        assert_eq!(viewer.scene.children.len(), 0);
        viewer.set_content(model("first", 0.0, Vec::new()), None);
        assert_eq!(viewer.scene.children.len(), 1);
        assert!(viewer.mixer().is_none());
    }

    #[test]
    fn replacing_content_removes_and_disposes_the_previous_model() {
        let mut viewer = Viewer::new();
        viewer.set_content(model("first", 0.0, Vec::new()), None);
        let first = viewer.clear().expect("content");
        assert!(
            first.get_children()[0]
                .as_model()
                .is_some_and(ModelNode::is_disposed)
        );
        assert_eq!(viewer.scene.children.len(), 0);

        viewer.set_content(model("second", 0.0, Vec::new()), None);
        viewer.set_content(model("third", 0.0, Vec::new()), None);
        assert_eq!(viewer.scene.children.len(), 1);
        assert_eq!(viewer.content_root().map(|r| r.name()), Some("third"));
    }

    #[test]
    fn content_is_centred_and_framed_by_size() {
        let mut viewer = Viewer::new();
        let framing = viewer.set_content(model("offset", 4.0, Vec::new()), None);
        let b = scene_graph::bounds(&viewer.scene);
        assert!(b.center().magnitude() < 1e-5);

        let size = Vector3::new(2.0f32, 2.0, 2.0).magnitude();
        assert!((framing.near - size / 100.0).abs() < 1e-5);
        assert!((framing.far - size * 100.0).abs() < 1e-3);
        assert!((framing.max_distance - size * 10.0).abs() < 1e-4);
        assert!((framing.position.x - size / 2.0).abs() < 1e-5);

        let framing = viewer.set_content(
            model("human", 0.0, Vec::new()),
            Some(Point3::new(0.0, 0.5, 2.0)),
        );
        assert_eq!(framing.position, Point3::new(0.0, 0.5, 2.0));
    }

    #[test]
    fn clips_get_a_mixer_that_drives_the_content() {
        let mut viewer = Viewer::new();
        viewer.set_content(model("animated", 0.0, vec![spin()]), None);
        assert_eq!(viewer.clips().len(), 1);
        viewer.play_all_clips();
        viewer.set_playback_speed(0.5);
        viewer.update(1.0);

        let mixer = viewer.mixer().expect("mixer");
        assert_eq!(mixer.time_scale, 0.5);
        let cube = &viewer.content_root().expect("content").get_children()[0];
        assert!((cube.get_local_transform().position.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn helpers_follow_the_display_state() {
        let mut viewer = Viewer::new();
        viewer.set_content(model("cube", 0.0, Vec::new()), None);
        viewer.update(0.0);
        assert!(matches!(&viewer.render(), Render::Composed(r) if r.len() == 2));

        viewer.state.grid = true;
        viewer.set_wireframe(true);
        viewer.update(0.0);
        // grid and wireframe lines plus the axes overlay
        assert!(matches!(&viewer.render(), Render::Composed(r) if r.len() == 4));
        // wireframe meshes are only drawn as lines
        assert!(viewer.scene.get_render().is_empty());
    }

    #[test]
    fn grid_comes_with_axes_drawn_on_top() {
        let mut viewer = Viewer::new();
        viewer.state.grid = true;
        viewer.update(0.0);
        assert_eq!(viewer.overlay.vertices().len(), 6);
        assert_eq!(viewer.overlay.vertices()[1].position, [1.0, 0.0, 0.0]);

        viewer.state.grid = false;
        viewer.update(0.0);
        assert!(viewer.overlay.is_empty());
    }

    #[test]
    fn stopped_clips_leave_the_pose_alone() {
        let mut viewer = Viewer::new();
        viewer.set_content(model("animated", 0.0, vec![spin()]), None);
        viewer.update(0.5);
        let cube = &viewer.content_root().expect("content").get_children()[0];
        assert_eq!(cube.get_local_transform().position.y, 0.0);
        assert!(viewer.mixer().is_some_and(|m| !m.is_playing()));
    }

    #[test]
    fn graph_lists_nodes_indented_by_depth() {
        let mut viewer = Viewer::new();
        viewer.set_content(model("cube", 0.0, Vec::new()), None);
        let graph = viewer.graph();
        assert_eq!(graph, "<Group> scene\n  <Group> cube\n    <Mesh> cube cube\n");
        assert_eq!(NodeKind::Group.type_name(), "Group");
    }
}
