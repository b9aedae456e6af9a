//! Render composition and pipeline batching.
//!
//! This module defines the [`Render`] enum, which is used by flows to specify
//! what they want drawn. The engine uses `Render` to sort objects into batches
//! for the different pipelines (opaque models, transparent models, depth tested
//! lines and overlay lines).
//!
//! # Key types
//!
//! - [`Render<'a>`] is the primary enum describing render operations
//! - [`Instanced<'a>`] contains data for instanced rendering (model + instance buffer)
//! - [`RenderBatches`] collects renders per pipeline before drawing
//!

use crate::{
    data_structures::{model::Model, scene_graph::SceneNode},
    pipelines::lines::LineBatch,
};

/// Data for instanced object rendering: a model and its instance buffer.
///
/// The instance buffer contains per-instance transformation data.
pub struct Instanced<'a> {
    pub instance: &'a wgpu::Buffer,
    pub model: &'a Model,
    pub amount: usize,
}

/// Specifies how a scene object should be rendered.
///
/// # Variants
///
/// - `None` renders nothing
/// - `Default(Instanced)` renders a single opaque instanced object
/// - `Defaults(Vec<Instanced>)` renders a batch of opaque instanced objects
/// - `Transparent(Instanced)` renders a single transparent instanced object
/// - `Transparents(Vec<Instanced>)` renders a batch of transparent objects
/// - `Lines(LineBatch)` renders world space lines that are hidden behind geometry
/// - `Overlay(LineBatch)` renders world space lines on top of everything (skeletons, axes)
/// - `Composed(Vec<Render>)` recursively renders composition of multiple renders
///
pub enum Render<'a> {
    None,
    Default(Instanced<'a>),
    Defaults(Vec<Instanced<'a>>),
    Transparent(Instanced<'a>),
    Transparents(Vec<Instanced<'a>>),
    Lines(&'a LineBatch),
    Overlay(&'a LineBatch),
    Composed(Vec<Render<'a>>),
}

/// Renders of all flows sorted by pipeline.
#[derive(Default)]
pub struct RenderBatches<'a> {
    pub basics: Vec<Instanced<'a>>,
    pub transparents: Vec<Instanced<'a>>,
    pub lines: Vec<&'a LineBatch>,
    pub overlays: Vec<&'a LineBatch>,
}

impl<'a> RenderBatches<'a> {
    pub fn is_empty(&self) -> bool {
        self.basics.is_empty()
            && self.transparents.is_empty()
            && self.lines.is_empty()
            && self.overlays.is_empty()
    }
}

impl<'a> Render<'a> {
    pub(crate) fn set_pipelines(self, batches: &mut RenderBatches<'a>) {
        match self {
            Render::Default(instanced) => batches.basics.push(instanced),
            Render::Defaults(mut vec) => batches.basics.append(&mut vec),
            Render::Transparent(instanced) => batches.transparents.push(instanced),
            Render::Transparents(mut vec) => batches.transparents.append(&mut vec),
            Render::Lines(lines) => batches.lines.push(lines),
            Render::Overlay(lines) => batches.overlays.push(lines),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.set_pipelines(batches)),
            Render::None => (),
        }
    }
}

impl<'a> From<&'a dyn SceneNode> for Render<'a> {
    fn from(sn: &'a dyn SceneNode) -> Self {
        Render::Composed(vec![
            Render::Defaults(sn.get_render()),
            Render::Transparents(sn.get_transparent_render()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composed_renders_are_flattened_into_batches() {
        let a = LineBatch::new("a");
        let b = LineBatch::new("b");
        let render = Render::Composed(vec![
            Render::None,
            Render::Lines(&a),
            Render::Composed(vec![Render::Overlay(&b), Render::Lines(&a)]),
            Render::Defaults(Vec::new()),
        ]);
        let mut batches = RenderBatches::default();
        render.set_pipelines(&mut batches);
        assert_eq!(batches.lines.len(), 2);
        assert_eq!(batches.overlays.len(), 1);
        assert!(batches.basics.is_empty());
        assert!(!batches.is_empty());
    }
}
