use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{Context as _, bail};
use cgmath::{Matrix4, Vector3};

use crate::{
    data_structures::{
        geometry::{MeshData, MorphTarget, SkinWeights},
        instance::Instance,
        model::{MaterialData, ModelVertex},
        scene_graph::{ContainerNode, ModelNode, NodeKind, SceneNode, Skin},
        texture::decode_image,
    },
    pipelines::light::{Light, LightKind},
    resources::{
        animation::{AnimationClip, Channel, Interpolation, Property},
        texture::Assets,
    },
};

/**
 * This module contains all logic for loading meshes, textures and animations from external files.
 */
pub mod animation;
pub mod texture;

/// Required extensions whose decoders are not available.
const UNSUPPORTED_EXTENSIONS: [&str; 4] = [
    "KHR_draco_mesh_compression",
    "KHR_texture_basisu",
    "EXT_meshopt_compression",
    "KHR_meshopt_compression",
];

/// A loaded glTF scene: its node tree and the animations that target it.
pub struct LoadedModel {
    pub root: Box<dyn SceneNode>,
    pub clips: Vec<AnimationClip>,
}

/// Load a `.glb` or `.gltf` file from the asset root.
pub async fn load_model_gltf(assets: &Assets, file_name: &str) -> anyhow::Result<LoadedModel> {
    let bytes = assets.load_binary(file_name).await?;
    parse_model_gltf(assets, file_name, &bytes)
        .await
        .with_context(|| format!("Failed to load model {}", file_name))
}

/// Parse glTF file contents. External buffers and images are resolved next to `file_name`.
pub async fn parse_model_gltf(
    assets: &Assets,
    file_name: &str,
    bytes: &[u8],
) -> anyhow::Result<LoadedModel> {
    // Check the required extensions before validation so the error names them.
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice_without_validation(bytes)?;
    if let Some(ext) = document
        .extensions_required()
        .find(|ext| UNSUPPORTED_EXTENSIONS.contains(ext))
    {
        bail!("{} requires the unsupported extension {}", file_name, ext);
    }
    let document = gltf::Document::from_json(document.into_json())?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next());
    let Some(scene) = scene else {
        bail!("{} contains no scene", file_name);
    };

    // Load buffers
    let mut buffers = Vec::new();
    for buffer in document.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = blob.as_deref().context("Missing binary chunk")?;
                buffers.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                if uri.starts_with("data:") {
                    bail!("Embedded data URIs in buffers are not supported");
                }
                let bin = assets.load_binary(&Assets::sibling(file_name, uri)).await?;
                buffers.push(bin);
            }
        }
    }

    let images = load_images(assets, file_name, &document, &buffers).await;
    let materials: Vec<MaterialData> = document
        .materials()
        .map(|material| to_material_data(&material, &images))
        .collect();
    let joints: HashSet<usize> = document
        .skins()
        .flat_map(|skin| skin.joints().map(|joint| joint.index()).collect::<Vec<_>>())
        .collect();

    let loader = NodeLoader {
        buffers: &buffers,
        materials: &materials,
        joints: &joints,
    };
    let mut root = ContainerNode::new(scene.name().unwrap_or(file_name));
    for node in scene.nodes() {
        root.add_child(loader.load_node(&node));
    }
    root.update_world_transform_all();

    let clips = document
        .animations()
        .map(|animation| load_animation(&animation, &buffers))
        .collect();

    Ok(LoadedModel {
        root: Box::new(root),
        clips,
    })
}

async fn load_images(
    assets: &Assets,
    file_name: &str,
    document: &gltf::Document,
    buffers: &[Vec<u8>],
) -> Vec<Option<Arc<image::RgbaImage>>> {
    let mut images = Vec::new();
    for image in document.images() {
        let decoded = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let end = start + view.length();
                match buffers.get(view.buffer().index()).and_then(|b| b.get(start..end)) {
                    Some(bytes) => decode_image(bytes, mime_type.rsplit('/').next()),
                    None => Err(anyhow::anyhow!("Buffer view out of range")),
                }
            }
            gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
                Err(anyhow::anyhow!("Embedded data URIs in images are not supported"))
            }
            gltf::image::Source::Uri { uri, .. } => {
                assets.load_image(&Assets::sibling(file_name, uri)).await
            }
        };
        match decoded {
            Ok(img) => images.push(Some(Arc::new(img))),
            Err(e) => {
                log::warn!(
                    "Image {} in {} could not be decoded and is ignored: {:#}",
                    image.index(),
                    file_name,
                    e
                );
                images.push(None);
            }
        }
    }
    images
}

fn to_material_data(
    material: &gltf::Material,
    images: &[Option<Arc<image::RgbaImage>>],
) -> MaterialData {
    let texture_image =
        |texture: gltf::Texture| images.get(texture.source().index()).cloned().flatten();
    let pbr = material.pbr_metallic_roughness();
    let base_color = pbr.base_color_factor();
    let metallic = pbr.metallic_factor();
    let roughness = pbr.roughness_factor().max(0.01);
    let normal = material.normal_texture();

    // Blinn-Phong approximation of the metal/rough model
    let specular = std::array::from_fn(|i| 0.04 + (base_color[i] - 0.04) * metallic);
    let shininess = (2.0 / roughness.powi(4) - 2.0).clamp(1.0, 1000.0);

    MaterialData {
        name: material.name().unwrap_or("material").to_string(),
        base_color,
        base_color_texture: pbr
            .base_color_texture()
            .and_then(|info| texture_image(info.texture())),
        normal_scale: normal.as_ref().map(|n| n.scale()).unwrap_or(1.0),
        normal_texture: normal.and_then(|n| texture_image(n.texture())),
        specular_texture: None,
        specular,
        shininess,
        flat_shading: false,
        wireframe: false,
        transparent: material.alpha_mode() == gltf::material::AlphaMode::Blend,
    }
}

struct NodeLoader<'a> {
    buffers: &'a [Vec<u8>],
    materials: &'a [MaterialData],
    joints: &'a HashSet<usize>,
}

impl NodeLoader<'_> {
    fn load_node(&self, node: &gltf::Node) -> Box<dyn SceneNode> {
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", node.index()));
        let (t, r, s) = node.transform().decomposed();
        let local = Instance::from_decomposed(t, r, s);

        let mut scene_node: Box<dyn SceneNode> = if let Some(mesh) = node.mesh() {
            Box::new(self.load_mesh(node, &mesh, &name))
        } else if let Some(light) = node.light() {
            Box::new(
                ContainerNode::new(&name)
                    .with_source_index(node.index())
                    .with_light(to_light(&light, &name)),
            )
        } else {
            let kind = if node.camera().is_some() {
                NodeKind::Camera
            } else if self.joints.contains(&node.index()) {
                NodeKind::Bone
            } else {
                NodeKind::Group
            };
            Box::new(
                ContainerNode::new(&name)
                    .with_kind(kind)
                    .with_source_index(node.index()),
            )
        };
        scene_node.set_local_transform(local);

        for child in node.children() {
            scene_node.add_child(self.load_node(&child));
        }
        scene_node
    }

    fn load_mesh(&self, node: &gltf::Node, mesh: &gltf::Mesh, name: &str) -> ModelNode {
        let target_names = morph_target_names(mesh);

        // Primitives reference document materials; the node keeps its own copies.
        let mut material_slots: HashMap<Option<usize>, usize> = HashMap::new();
        let mut materials = Vec::new();
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Primitive {} of mesh {} is not a triangle list and is skipped",
                    primitive.index(),
                    name
                );
                continue;
            }
            let material_idx = primitive.material().index();
            let slot = *material_slots.entry(material_idx).or_insert_with(|| {
                materials.push(
                    material_idx
                        .and_then(|idx| self.materials.get(idx))
                        .cloned()
                        .unwrap_or_default(),
                );
                materials.len() - 1
            });
            if let Some(data) = self.load_primitive(&primitive, name, slot, &target_names) {
                primitives.push(data);
            }
        }

        let mut model = ModelNode::new(name, primitives, materials).with_source_index(node.index());
        if let Some(weights) = node.weights().or_else(|| mesh.weights()) {
            for (influence, weight) in model.morph_target_influences.iter_mut().zip(weights) {
                *influence = *weight;
            }
        }
        if let Some(skin) = node.skin() {
            let reader = skin.reader(|buffer| self.buffers.get(buffer.index()).map(Vec::as_slice));
            let inverse_bind_matrices = reader
                .read_inverse_bind_matrices()
                .map(|matrices| matrices.map(Matrix4::from).collect())
                .unwrap_or_default();
            model.skin = Some(Skin {
                joints: skin.joints().map(|joint| joint.index()).collect(),
                inverse_bind_matrices,
            });
        }
        model
    }

    fn load_primitive(
        &self,
        primitive: &gltf::Primitive,
        name: &str,
        material: usize,
        target_names: &[String],
    ) -> Option<MeshData> {
        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(Vec::as_slice));
        let Some(positions) = reader.read_positions() else {
            log::warn!("Primitive {} of mesh {} has no positions", primitive.index(), name);
            return None;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
        let tex_coords: Vec<[f32; 2]> = reader
            .read_tex_coords(0)
            .map(|coords| coords.into_f32().collect())
            .unwrap_or_default();
        let tangents: Option<Vec<[f32; 4]>> = reader.read_tangents().map(Iterator::collect);

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, position)| {
                let normal = normals
                    .as_ref()
                    .and_then(|n| n.get(i).copied())
                    .unwrap_or([0.0; 3]);
                let (tangent, bitangent) = match tangents.as_ref().and_then(|t| t.get(i)) {
                    Some([x, y, z, w]) => {
                        let t = Vector3::new(*x, *y, *z);
                        let b = Vector3::from(normal).cross(t) * *w;
                        (t.into(), b.into())
                    }
                    None => ([0.0; 3], [0.0; 3]),
                };
                ModelVertex {
                    position: *position,
                    tex_coords: tex_coords.get(i).copied().unwrap_or([0.0; 2]),
                    normal,
                    tangent,
                    bitangent,
                }
            })
            .collect();
        let indices = reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());

        let mut data = MeshData::new(name, vertices, indices, material);
        if normals.is_none() {
            data.compute_normals();
        }
        if tangents.is_none() && !tex_coords.is_empty() {
            data.compute_tangents();
        }

        data.morph_targets = reader
            .read_morph_targets()
            .enumerate()
            .map(|(i, (positions, normals, _))| MorphTarget {
                name: target_names.get(i).cloned().unwrap_or_default(),
                positions: positions
                    .map(Iterator::collect)
                    .unwrap_or_else(|| vec![[0.0; 3]; data.vertices.len()]),
                normals: normals.map(Iterator::collect).unwrap_or_default(),
            })
            .collect();

        if let (Some(joints), Some(weights)) = (reader.read_joints(0), reader.read_weights(0)) {
            data.skin = Some(SkinWeights {
                joints: joints.into_u16().collect(),
                weights: weights.into_f32().collect(),
            });
        }
        Some(data)
    }
}

/// Morph target names exported in the mesh extras as `targetNames`.
fn morph_target_names(mesh: &gltf::Mesh) -> Vec<String> {
    let Some(raw) = mesh.extras() else {
        return Vec::new();
    };
    let Ok(extras) = gltf::json::deserialize::from_str::<gltf::json::Value>(raw.get()) else {
        return Vec::new();
    };
    extras
        .get("targetNames")
        .and_then(|names| names.as_array())
        .map(|names| {
            names
                .iter()
                .map(|name| name.as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn to_light(light: &gltf::khr_lights_punctual::Light, name: &str) -> Light {
    let kind = match light.kind() {
        gltf::khr_lights_punctual::Kind::Directional => LightKind::Directional,
        gltf::khr_lights_punctual::Kind::Point => LightKind::Point {
            distance: light.range().unwrap_or(0.0),
            decay: 2.0,
        },
        gltf::khr_lights_punctual::Kind::Spot { .. } => {
            log::warn!("Spot light {} is rendered as a point light", name);
            LightKind::Point {
                distance: light.range().unwrap_or(0.0),
                decay: 2.0,
            }
        }
    };
    Light {
        kind,
        color: light.color(),
        ..Light::directional(0xffffff, light.intensity(), [0.0; 3]).named(name)
    }
}

fn load_animation(animation: &gltf::Animation, buffers: &[Vec<u8>]) -> AnimationClip {
    let mut channels = Vec::new();
    for channel in animation.channels() {
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let Some(times) = reader.read_inputs() else {
            continue;
        };
        let times: Vec<f32> = times.collect();
        let Some(outputs) = reader.read_outputs() else {
            continue;
        };
        let (property, values): (Property, Vec<f32>) = match outputs {
            gltf::animation::util::ReadOutputs::Translations(values) => {
                (Property::Translation, values.flatten().collect())
            }
            gltf::animation::util::ReadOutputs::Rotations(values) => {
                (Property::Rotation, values.into_f32().flatten().collect())
            }
            gltf::animation::util::ReadOutputs::Scales(values) => {
                (Property::Scale, values.flatten().collect())
            }
            gltf::animation::util::ReadOutputs::MorphTargetWeights(values) => {
                (Property::MorphWeights, values.into_f32().collect())
            }
        };
        let interpolation = match channel.sampler().interpolation() {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        };
        channels.push(Channel::new(
            channel.target().node().index(),
            property,
            interpolation,
            times,
            values,
        ));
    }
    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Animation {}", animation.index()));
    AnimationClip::new(&name, channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::scene_graph::{bounds, count_nodes};

    /// Wrap a JSON document and a binary chunk into a GLB container.
    fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    fn triangle_glb() -> Vec<u8> {
        let floats: [f32; 17] = [
            // positions
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0,
            // keyframe times
            0.0, 1.0,
            // translations
            1.0, 0.0, 0.0, 1.0, 2.0, 0.0,
        ];
        let bin: Vec<u8> = floats.iter().flat_map(|f| f.to_le_bytes()).collect();
        let json = r#"{
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"name": "triangle scene", "nodes": [0]}],
            "nodes": [{"name": "tri", "mesh": 0, "translation": [1.0, 0.0, 0.0]}],
            "meshes": [{"name": "tri", "primitives": [{"attributes": {"POSITION": 0}}]}],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
                {"bufferView": 1, "componentType": 5126, "count": 2, "type": "SCALAR",
                 "min": [0.0], "max": [1.0]},
                {"bufferView": 2, "componentType": 5126, "count": 2, "type": "VEC3"}
            ],
            "bufferViews": [
                {"buffer": 0, "byteOffset": 0, "byteLength": 36},
                {"buffer": 0, "byteOffset": 36, "byteLength": 8},
                {"buffer": 0, "byteOffset": 44, "byteLength": 24}
            ],
            "buffers": [{"byteLength": 68}],
            "animations": [{
                "name": "slide",
                "channels": [{"sampler": 0, "target": {"node": 0, "path": "translation"}}],
                "samplers": [{"input": 1, "output": 2, "interpolation": "LINEAR"}]
            }]
        }"#;
        glb(json, &bin)
    }

    fn parse(bytes: &[u8]) -> anyhow::Result<LoadedModel> {
        futures::executor::block_on(parse_model_gltf(&Assets::default(), "test.glb", bytes))
    }

    #[test]
    fn glb_triangle_becomes_a_model_node() {
        let loaded = parse(&triangle_glb()).expect("valid glb");
        let root = loaded.root;
        assert_eq!(root.name(), "triangle scene");
        assert_eq!(count_nodes(root.as_ref()), 2);

        let tri = root.get_children()[0].as_model().expect("mesh node");
        assert_eq!(tri.name, "tri");
        assert_eq!(tri.source_index, Some(0));
        let primitive = &tri.primitives[0];
        assert_eq!(primitive.vertices.len(), 3);
        // non-indexed primitives are drawn in vertex order
        assert_eq!(primitive.indices, vec![0, 1, 2]);
        // missing normals are computed from the faces
        assert_eq!(primitive.vertices[0].normal, [0.0, 0.0, 1.0]);
        // a default material is substituted
        assert_eq!(tri.materials.len(), 1);

        let b = bounds(root.as_ref());
        assert_eq!(b.min, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(b.max, Vector3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn glb_animations_become_clips() {
        let loaded = parse(&triangle_glb()).expect("valid glb");
        assert_eq!(loaded.clips.len(), 1);
        let clip = &loaded.clips[0];
        assert_eq!(clip.name, "slide");
        assert_eq!(clip.duration, 1.0);
        let channel = &clip.channels[0];
        assert_eq!(channel.target, 0);
        assert_eq!(channel.property, Property::Translation);
        assert_eq!(channel.sample(0.5), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn documents_without_scenes_are_rejected() {
        let err = parse(br#"{"asset": {"version": "2.0"}}"#)
            .err()
            .expect("no scene");
        assert!(err.to_string().contains("contains no scene"));
    }

    #[test]
    fn compressed_meshes_are_rejected_by_name() {
        let json = br#"{
            "asset": {"version": "2.0"},
            "extensionsUsed": ["KHR_draco_mesh_compression"],
            "extensionsRequired": ["KHR_draco_mesh_compression"],
            "scenes": [{"nodes": []}]
        }"#;
        let err = parse(json).err().expect("unsupported extension");
        assert!(err.to_string().contains("KHR_draco_mesh_compression"));
    }

    #[test]
    fn missing_model_files_fail_with_their_path() {
        let assets = Assets::new("./does-not-exist");
        let result = futures::executor::block_on(load_model_gltf(&assets, "models/none.glb"));
        let err = result.err().expect("missing file");
        assert!(format!("{err:#}").contains("models/none.glb"));
    }
}
