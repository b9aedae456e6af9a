//! Lee Perry-Smith's head with colour, specular and normal maps, a post
//! processing chain and a small mouse driven parallax.

use std::sync::Arc;

use anyhow::Context as _;
use instant::Duration;
use winit::event::WindowEvent;

use crate::{
    apps::{clear_colour, set_camera},
    context::{Context, InitContext},
    data_structures::{
        geometry::MeshData,
        model::{MaterialData, hex_to_rgba},
        scene_graph::{ModelNode, SceneNode, traverse_mut},
    },
    flow::{GraphicsFlow, Out},
    pipelines::{light::Light, post::PostSettings},
    render::Render,
    resources::{LoadedModel, load_model_gltf, texture::Assets},
    viewer::ViewerEvent,
};

const MODEL: &str = "models/LeePerrySmith/LeePerrySmith.glb";
const COLOUR_MAP: &str = "Map-COL.jpg";
const SPECULAR_MAP: &str = "Map-SPEC.jpg";
const NORMAL_MAP: &str = "Infinite-Level_02_Tangent_SmoothUV.jpg";

/// Radians of head rotation per pixel of cursor offset.
const PARALLAX: f32 = 0.001;
const EASE: f32 = 0.05;

pub struct NormalmapApp {
    head: Option<Box<dyn SceneNode>>,
    assets: Assets,
    model: String,
}

impl NormalmapApp {
    pub fn new(init: &InitContext) -> Self {
        Self {
            head: None,
            assets: init.viewer.assets.clone(),
            model: init.viewer.model_or(MODEL).to_string(),
        }
    }
}

pub fn post_settings() -> PostSettings {
    PostSettings {
        fxaa: true,
        bleach_opacity: 0.2,
        pow_rgb: [1.4, 1.45, 1.45],
        mul_rgb: [1.1; 3],
    }
}

pub fn head_material() -> MaterialData {
    let [r, g, b, _] = hex_to_rgba(0x222222);
    MaterialData {
        specular: [r, g, b],
        shininess: 35.0,
        normal_scale: 0.8,
        ..MaterialData::hex("head", 0xdddddd)
    }
}

/// Moves the primitives of the first mesh out of `root`.
fn take_first_mesh(root: &mut dyn SceneNode) -> Option<Vec<MeshData>> {
    let mut found = None;
    traverse_mut(root, &mut |node| {
        if found.is_none()
            && let Some(model) = node.as_model_mut()
        {
            found = Some(std::mem::take(&mut model.primitives));
        }
    });
    found
}

/// The head mesh of `file` with the maps found next to it.
pub async fn load_head(assets: Assets, file: String) -> anyhow::Result<ModelNode> {
    let mut loaded = load_model_gltf(&assets, &file).await?;
    let mut primitives = take_first_mesh(loaded.root.as_mut())
        .with_context(|| format!("{} contains no mesh", file))?;
    loaded.root.dispose();
    primitives.iter_mut().for_each(|p| p.material = 0);

    let map = |name| {
        let path = Assets::sibling(&file, name);
        let assets = assets.clone();
        async move { assets.load_image(&path).await.map(Arc::new) }
    };
    let (colour, specular, normal) =
        futures::try_join!(map(COLOUR_MAP), map(SPECULAR_MAP), map(NORMAL_MAP))?;
    let material = MaterialData {
        base_color_texture: Some(colour),
        specular_texture: Some(specular),
        normal_texture: Some(normal),
        ..head_material()
    };

    let mut head = ModelNode::new("head", primitives, vec![material]);
    let transform = head.local_transform_mut();
    transform.position.y = -20.0;
    transform.scale = cgmath::Vector3::new(50.0, 50.0, 50.0);
    Ok(head)
}

/// One easing step of the head rotation towards the cursor.
pub fn parallax(rotation: [f32; 2], mouse: (f32, f32)) -> [f32; 2] {
    let target = [mouse.1 * PARALLAX, mouse.0 * PARALLAX];
    [
        rotation[0] + EASE * (target[0] - rotation[0]),
        rotation[1] + EASE * (target[1] - rotation[1]),
    ]
}

impl GraphicsFlow<(), ViewerEvent> for NormalmapApp {
    fn on_init(&mut self, ctx: &mut Context, _state: &mut ()) -> Out<(), ViewerEvent> {
        ctx.clear_colour = clear_colour(0x494949);
        set_camera(ctx, 27.0, 1.0, 10000.0, [0.0, 0.0, 1000.0]);
        let controls = &mut ctx.camera.controls;
        controls.enable_damping = true;
        controls.damping_factor = 0.05;
        ctx.light.set_lights(vec![
            Light::ambient(0xffffff, 0.5),
            Light::directional(0xffffff, 1.0, [0.0, 5.0, 10.0]).named("main_light"),
            Light::directional(0xffffff, 0.7, [0.0, 0.0, 1.0]),
            Light::directional(0xffffff, 0.5, [0.0, 0.0, -5.0]),
            Light::point(0xffffff, 1.0, [2.0, 2.0, 2.0], 1000.0),
            Light::point(0xffffff, 1.0, [-2.0, 2.0, -2.0], 1000.0),
        ]);
        ctx.enable_post_processing(post_settings());

        let assets = self.assets.clone();
        let file = self.model.clone();
        Out::event(async move {
            match load_head(assets, file).await {
                Ok(head) => ViewerEvent::Loaded(LoadedModel {
                    root: Box::new(head),
                    clips: Vec::new(),
                }),
                Err(e) => ViewerEvent::LoadFailed(format!("{e:#}")),
            }
        })
    }

    fn on_update(&mut self, ctx: &Context, _state: &mut (), _dt: Duration) -> Out<(), ViewerEvent> {
        let Some(head) = self.head.as_mut() else {
            return Out::Empty;
        };
        let (width, height) = ctx.size();
        let mouse = ctx.mouse.from_center(width, height);
        let transform = head.local_transform_mut();
        let [x, y, z] = transform.euler();
        let [x, y] = parallax([x, y], mouse);
        transform.set_euler([x, y, z]);

        head.update_world_transform_all();
        head.write_to_buffers(&ctx.queue, &ctx.device);
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
                if let Some(mut old) = self.head.replace(model.root) {
                    old.dispose();
                }
            }
            ViewerEvent::LoadFailed(e) => log::error!("Loading {} failed: {}", self.model, e),
        }
        None
    }

    fn on_render(&self) -> Render<'_> {
        match &self.head {
            Some(head) => Render::Defaults(head.get_render()),
            None => Render::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{geometry::box_geometry, scene_graph::ContainerNode};

    #[test]
    fn parallax_eases_towards_the_cursor() {
        let r = parallax([0.0, 0.0], (100.0, -200.0));
        assert!((r[0] - 0.05 * -0.2).abs() < 1e-6);
        assert!((r[1] - 0.05 * 0.1).abs() < 1e-6);

        let mut r = [0.0, 0.0];
        for _ in 0..500 {
            r = parallax(r, (100.0, -200.0));
        }
        assert!((r[0] + 0.2).abs() < 1e-4);
        assert!((r[1] - 0.1).abs() < 1e-4);
    }

    #[test]
    fn the_first_mesh_is_taken() {
        let mut root = ContainerNode::new("root");
        root.add_child(Box::new(ContainerNode::new("empty")));
        root.add_child(Box::new(ModelNode::new(
            "first",
            vec![box_geometry(1.0, 1.0, 1.0)],
            vec![MaterialData::default()],
        )));
        root.add_child(Box::new(ModelNode::new("second", Vec::new(), Vec::new())));

        let primitives = take_first_mesh(&mut root).expect("a mesh");
        assert_eq!(primitives.len(), 1);
        assert!(take_first_mesh(&mut ContainerNode::new("none")).is_none());
    }

    #[test]
    fn head_material_is_a_pale_specular_skin() {
        let m = head_material();
        assert_eq!(m.shininess, 35.0);
        assert_eq!(m.normal_scale, 0.8);
        assert!(m.specular[0] < 0.02);
        assert!(m.base_color[0] > 0.7);
    }

    #[test]
    fn post_chain_settings() {
        let s = post_settings();
        assert!(s.fxaa);
        assert_eq!(s.bleach_opacity, 0.2);
        assert_eq!(s.pow_rgb, [1.4, 1.45, 1.45]);
    }
}
