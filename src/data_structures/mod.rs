//! Engine data structures: models, textures, scene graphs, and instances.
//!
//! This module contains the core data types for scene representation:
//!
//! - `model` contains mesh and material definitions, GPU resources for 3D models
//! - `texture` contains GPU texture wrapper and creation utilities
//! - `geometry` holds CPU mesh data, morph targets, skin weights and bounds
//! - `instance` holds per-instance transformation and attribute data
//! - `scene_graph` enables hierarchical scene organization
//! - `helpers` draws skeletons, grids, axes and wireframes as lines

pub mod geometry;
pub mod helpers;
pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod texture;
