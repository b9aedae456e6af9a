//! view-ngin
//!
//! Small cross-platform glTF model viewers built on an instancing-oriented
//! wgpu renderer. The same viewers run natively and in the browser, where the
//! canvas is mounted into the `#scene-container` element.
//!
//! High-level modules
//! - `apps`: the five viewers (basic, facecap, human, morph, normalmap)
//! - `camera`: perspective camera, orbit controls and the camera uniform
//! - `config`: command line and runtime configuration
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `data_structures`: meshes, materials, instances, textures and the scene graph
//! - `flow`: the event loop and the `GraphicsFlow` lifecycle
//! - `gui`: the egui debug panel and the layer that draws it over the frame
//! - `pipelines`: model, line, light and post-processing pipelines
//! - `resources`: asset access, glTF loading and animation
//! - `render`: render composition for efficient pipeline reuse
//! - `viewer`: the content slot, mixer and helpers shared by the model viewers
//!

pub mod apps;
pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod gui;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod viewer;

// Re-exports commonly used types for convenience in downstream code.
pub use winit::dpi::PhysicalPosition;
pub use cgmath::*;
pub use egui;
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;
pub use wgpu::*;

/// Web entry point: `start("human")` mounts and runs the human viewer.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn start(app: &str) -> Result<(), wasm_bindgen::JsValue> {
    let run = || -> anyhow::Result<()> {
        let app = config::AppKind::parse(app)?;
        apps::run(config::ViewerConfig::for_app(app))
    };
    run().map_err(|e| wasm_bindgen::JsValue::from_str(&format!("{e:#}")))
}
