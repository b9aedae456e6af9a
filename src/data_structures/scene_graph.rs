//! Scene graph and hierarchical scene organization.
//!
//! A scene is a tree of boxed [`SceneNode`]s. [`ContainerNode`] covers
//! groups, bones, lights and cameras; [`ModelNode`] owns mesh primitives and
//! their materials. Mesh data stays on the CPU and is uploaded lazily by
//! [`SceneNode::write_to_buffers`], which also re-uploads deformed vertices
//! whenever morph influences or joint matrices changed.

use std::collections::HashMap;

use cgmath::{Matrix4, SquareMatrix, Vector3};
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        geometry::{Box3, MeshData},
        instance::Instance,
        model::{self, MaterialData, ModelVertex},
    },
    pipelines::light::Light,
    render::Instanced,
    resources::texture::material_layout,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Mesh,
    SkinnedMesh,
    Bone,
    Light,
    Camera,
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Group => "Group",
            NodeKind::Mesh => "Mesh",
            NodeKind::SkinnedMesh => "SkinnedMesh",
            NodeKind::Bone => "Bone",
            NodeKind::Light => "Light",
            NodeKind::Camera => "Camera",
        }
    }
}

/// Joints are referenced by their source node index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skin {
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Matrix4<f32>>,
}

pub trait SceneNode {
    fn name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    /// Index of the node in the file it was loaded from, if any.
    fn source_index(&self) -> Option<usize>;

    fn get_local_transform(&self) -> Instance;

    fn local_transform_mut(&mut self) -> &mut Instance;

    fn set_local_transform(&mut self, instance: Instance) {
        *self.local_transform_mut() = instance;
    }

    fn get_world_transform(&self) -> Instance;

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>>;

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>>;

    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.get_children_mut().push(child);
    }

    fn remove_child(&mut self, idx: usize) -> Option<Box<dyn SceneNode>> {
        let children = self.get_children_mut();
        (idx < children.len()).then(|| children.remove(idx))
    }

    /// Recompute the world transform of `self` and its subtree from the parent's world transform.
    fn update_world_transforms(&mut self, parent: &Instance);

    fn update_world_transform_all(&mut self) {
        self.update_world_transforms(&Instance::default());
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue, device: &wgpu::Device);

    /// Release GPU buffers and textures of the whole subtree.
    fn dispose(&mut self);

    /// Opaque draws of the subtree.
    fn get_render(&self) -> Vec<Instanced<'_>>;

    /// Alpha blended draws of the subtree.
    fn get_transparent_render(&self) -> Vec<Instanced<'_>>;

    fn light(&self) -> Option<&Light> {
        None
    }

    fn as_model(&self) -> Option<&ModelNode> {
        None
    }

    fn as_model_mut(&mut self) -> Option<&mut ModelNode> {
        None
    }
}

pub struct ContainerNode {
    pub name: String,
    pub kind: NodeKind,
    pub source_index: Option<usize>,
    pub light: Option<Light>,
    pub children: Vec<Box<dyn SceneNode>>,
    local: Instance,
    world: Instance,
}

impl ContainerNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Group,
            source_index: None,
            light: None,
            children: Vec::new(),
            local: Instance::default(),
            world: Instance::default(),
        }
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_source_index(mut self, idx: usize) -> Self {
        self.source_index = Some(idx);
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.kind = NodeKind::Light;
        self.light = Some(light);
        self
    }
}

impl SceneNode for ContainerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn source_index(&self) -> Option<usize> {
        self.source_index
    }

    fn get_local_transform(&self) -> Instance {
        self.local
    }

    fn local_transform_mut(&mut self) -> &mut Instance {
        &mut self.local
    }

    fn get_world_transform(&self) -> Instance {
        self.world
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn update_world_transforms(&mut self, parent: &Instance) {
        self.world = parent * &self.local;
        let world = self.world;
        for child in self.children.iter_mut() {
            child.update_world_transforms(&world);
        }
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue, device: &wgpu::Device) {
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue, device));
    }

    fn dispose(&mut self) {
        self.children.iter_mut().for_each(|child| child.dispose());
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .collect()
    }

    fn get_transparent_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_transparent_render())
            .collect()
    }

    fn light(&self) -> Option<&Light> {
        self.light.as_ref()
    }
}

/// GPU copy of a [`ModelNode`]: one [`model::Model`] per primitive.
struct GpuModel {
    models: Vec<model::Model>,
    instance_buffer: wgpu::Buffer,
}

pub struct ModelNode {
    pub name: String,
    pub source_index: Option<usize>,
    pub children: Vec<Box<dyn SceneNode>>,
    pub primitives: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    /// One weight per morph target, shared by all primitives like glTF mesh weights.
    pub morph_target_influences: Vec<f32>,
    pub morph_target_dictionary: HashMap<String, usize>,
    pub skin: Option<Skin>,
    local: Instance,
    world: Instance,
    joint_matrices: Vec<Matrix4<f32>>,
    uploaded_influences: Vec<f32>,
    skin_dirty: bool,
    gpu: Option<GpuModel>,
    disposed: bool,
}

impl ModelNode {
    pub fn new(name: &str, primitives: Vec<MeshData>, materials: Vec<MaterialData>) -> Self {
        let mut node = Self {
            name: name.to_string(),
            source_index: None,
            children: Vec::new(),
            primitives,
            materials,
            morph_target_influences: Vec::new(),
            morph_target_dictionary: HashMap::new(),
            skin: None,
            local: Instance::default(),
            world: Instance::default(),
            joint_matrices: Vec::new(),
            uploaded_influences: Vec::new(),
            skin_dirty: false,
            gpu: None,
            disposed: false,
        };
        node.reset_morph_targets();
        node
    }

    pub fn with_source_index(mut self, idx: usize) -> Self {
        self.source_index = Some(idx);
        self
    }

    /// Size the influences and name dictionary after the primitives' morph targets.
    pub fn reset_morph_targets(&mut self) {
        let count = self
            .primitives
            .iter()
            .map(|p| p.morph_targets.len())
            .max()
            .unwrap_or(0);
        self.morph_target_influences.resize(count, 0.0);
        self.morph_target_dictionary.clear();
        for p in &self.primitives {
            for (i, target) in p.morph_targets.iter().enumerate() {
                if !target.name.is_empty() {
                    self.morph_target_dictionary
                        .entry(target.name.clone())
                        .or_insert(i);
                }
            }
        }
    }

    /// Name of the morph target at `idx`, if it has one.
    pub fn morph_target_name(&self, idx: usize) -> Option<&str> {
        self.morph_target_dictionary
            .iter()
            .find(|(_, i)| **i == idx)
            .map(|(name, _)| name.as_str())
    }

    pub fn set_joint_matrices(&mut self, matrices: Vec<Matrix4<f32>>) {
        if matrices != self.joint_matrices {
            self.joint_matrices = matrices;
            self.skin_dirty = true;
        }
    }

    /// Swap the materials. GPU copies are rebuilt on the next upload.
    pub fn set_materials(&mut self, materials: Vec<MaterialData>) {
        self.materials = materials;
        self.release_gpu();
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.materials.iter_mut().for_each(|m| m.wireframe = wireframe);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }

    /// Vertices as they should currently be drawn.
    pub fn current_vertices(&self, primitive: &MeshData) -> Vec<ModelVertex> {
        if !primitive.is_deformable() {
            return primitive.vertices.clone();
        }
        let joints = (self.skin.is_some() && !self.joint_matrices.is_empty())
            .then_some(self.joint_matrices.as_slice());
        primitive.deform(&self.morph_target_influences, joints)
    }

    /// World transform the instance buffer is written with. Skinned vertices
    /// are already in world space.
    pub fn render_transform(&self) -> Instance {
        if self.skin.is_some() && !self.joint_matrices.is_empty() {
            Instance::default()
        } else {
            self.world
        }
    }

    /// World space bounds of the undeformed primitives.
    pub fn bounds(&self) -> Box3 {
        let m = self.world.to_matrix();
        self.primitives
            .iter()
            .map(|p| p.bounds().transformed(&m))
            .fold(Box3::empty(), |acc, b| acc.union(&b))
    }

    fn release_gpu(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            for model in &gpu.models {
                model.meshes.iter().for_each(model::Mesh::destroy);
                model.materials.iter().for_each(model::Material::destroy);
            }
            gpu.instance_buffer.destroy();
        }
    }

    fn upload(&self, queue: &wgpu::Queue, device: &wgpu::Device) -> GpuModel {
        let layout = material_layout(device);
        let materials: Vec<model::Material> = self
            .materials
            .iter()
            .map(|data| model::Material::new(device, queue, data, &layout))
            .collect();
        let fallback = if materials.is_empty() {
            Some(model::Material::new(device, queue, &MaterialData::default(), &layout))
        } else {
            None
        };

        let models = self
            .primitives
            .iter()
            .map(|primitive| {
                let vertices = self.current_vertices(primitive);
                let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Vertex Buffer", primitive.name)),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                });
                let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Index Buffer", primitive.name)),
                    contents: bytemuck::cast_slice(&primitive.indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
                let material = materials
                    .get(primitive.material)
                    .or(materials.first())
                    .or(fallback.as_ref())
                    .cloned();
                model::Model {
                    meshes: vec![model::Mesh {
                        name: primitive.name.clone(),
                        vertex_buffer,
                        index_buffer,
                        num_elements: primitive.indices.len() as u32,
                        material: 0,
                    }],
                    materials: material.into_iter().collect(),
                }
            })
            .collect();

        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Instance Buffer", self.name)),
            contents: bytemuck::cast_slice(&[self.render_transform().to_raw()]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        GpuModel {
            models,
            instance_buffer,
        }
    }

    fn draws(&self, transparent: bool) -> Vec<Instanced<'_>> {
        let Some(gpu) = &self.gpu else {
            return Vec::new();
        };
        if self.disposed {
            return Vec::new();
        }
        self.primitives
            .iter()
            .zip(&gpu.models)
            .filter(|(primitive, _)| {
                self.materials
                    .get(primitive.material)
                    .map(|m| !m.wireframe && m.transparent == transparent)
                    .unwrap_or(!transparent)
            })
            .map(|(_, model)| Instanced {
                instance: &gpu.instance_buffer,
                model,
                amount: 1,
            })
            .collect()
    }
}

impl SceneNode for ModelNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        if self.skin.is_some() {
            NodeKind::SkinnedMesh
        } else {
            NodeKind::Mesh
        }
    }

    fn source_index(&self) -> Option<usize> {
        self.source_index
    }

    fn get_local_transform(&self) -> Instance {
        self.local
    }

    fn local_transform_mut(&mut self) -> &mut Instance {
        &mut self.local
    }

    fn get_world_transform(&self) -> Instance {
        self.world
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn update_world_transforms(&mut self, parent: &Instance) {
        self.world = parent * &self.local;
        let world = self.world;
        for child in self.children.iter_mut() {
            child.update_world_transforms(&world);
        }
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue, device: &wgpu::Device) {
        if self.disposed {
            return;
        }
        match &self.gpu {
            None => {
                let gpu = self.upload(queue, device);
                self.gpu = Some(gpu);
                self.uploaded_influences = self.morph_target_influences.clone();
                self.skin_dirty = false;
            }
            Some(gpu) => {
                queue.write_buffer(
                    &gpu.instance_buffer,
                    0,
                    bytemuck::cast_slice(&[self.render_transform().to_raw()]),
                );
                let deformed =
                    self.skin_dirty || self.uploaded_influences != self.morph_target_influences;
                if deformed {
                    for (primitive, model) in self.primitives.iter().zip(&gpu.models) {
                        if !primitive.is_deformable() {
                            continue;
                        }
                        let vertices = self.current_vertices(primitive);
                        if let Some(mesh) = model.meshes.first() {
                            queue.write_buffer(&mesh.vertex_buffer, 0, bytemuck::cast_slice(&vertices));
                        }
                    }
                    self.uploaded_influences = self.morph_target_influences.clone();
                    self.skin_dirty = false;
                }
            }
        }
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue, device));
    }

    fn dispose(&mut self) {
        self.release_gpu();
        self.disposed = true;
        self.children.iter_mut().for_each(|child| child.dispose());
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .chain(self.draws(false))
            .collect()
    }

    fn get_transparent_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_transparent_render())
            .chain(self.draws(true))
            .collect()
    }

    fn as_model(&self) -> Option<&ModelNode> {
        Some(self)
    }

    fn as_model_mut(&mut self) -> Option<&mut ModelNode> {
        Some(self)
    }
}

/// Depth first, parents before children.
pub fn traverse(node: &dyn SceneNode, f: &mut dyn FnMut(&dyn SceneNode)) {
    f(node);
    for child in node.get_children() {
        traverse(child.as_ref(), f);
    }
}

pub fn traverse_mut(node: &mut dyn SceneNode, f: &mut dyn FnMut(&mut dyn SceneNode)) {
    f(node);
    for child in node.get_children_mut() {
        traverse_mut(child.as_mut(), f);
    }
}

pub fn find_by_source_index(node: &dyn SceneNode, idx: usize) -> Option<&dyn SceneNode> {
    if node.source_index() == Some(idx) {
        return Some(node);
    }
    node.get_children()
        .iter()
        .find_map(|child| find_by_source_index(child.as_ref(), idx))
}

pub fn find_by_source_index_mut(node: &mut dyn SceneNode, idx: usize) -> Option<&mut dyn SceneNode> {
    if node.source_index() == Some(idx) {
        return Some(node);
    }
    for child in node.get_children_mut() {
        if let Some(found) = find_by_source_index_mut(child.as_mut(), idx) {
            return Some(found);
        }
    }
    None
}

/// Count of nodes in the subtree including `node`.
pub fn count_nodes(node: &dyn SceneNode) -> usize {
    let mut count = 0;
    traverse(node, &mut |_| count += 1);
    count
}

/// World matrices of every node that has a source index.
pub fn world_matrices(root: &dyn SceneNode) -> HashMap<usize, Matrix4<f32>> {
    let mut matrices = HashMap::new();
    traverse(root, &mut |node| {
        if let Some(idx) = node.source_index() {
            matrices.insert(idx, node.get_world_transform().to_matrix());
        }
    });
    matrices
}

/// Recompute `world(joint) * inverse_bind` for every skinned mesh below `root`.
///
/// World transforms have to be up to date.
pub fn update_skinning(root: &mut dyn SceneNode) {
    let worlds = world_matrices(root);
    traverse_mut(root, &mut |node| {
        let Some(model) = node.as_model_mut() else {
            return;
        };
        let Some(skin) = &model.skin else {
            return;
        };
        let matrices = skin
            .joints
            .iter()
            .enumerate()
            .map(|(i, joint)| {
                let world = worlds.get(joint).copied().unwrap_or_else(Matrix4::identity);
                let inverse_bind = skin
                    .inverse_bind_matrices
                    .get(i)
                    .copied()
                    .unwrap_or_else(Matrix4::identity);
                world * inverse_bind
            })
            .collect();
        model.set_joint_matrices(matrices);
    });
}

/// World space bounds of every mesh below `root`.
pub fn bounds(root: &dyn SceneNode) -> Box3 {
    let mut b = Box3::empty();
    traverse(root, &mut |node| {
        if let Some(model) = node.as_model() {
            b = b.union(&model.bounds());
        }
    });
    b
}

/// Lights carried by the subtree, resolved to world space.
pub fn collect_lights(root: &dyn SceneNode) -> Vec<Light> {
    let mut lights = Vec::new();
    traverse(root, &mut |node| {
        if let Some(light) = node.light() {
            let world = node.get_world_transform();
            let mut light = light.clone();
            light.position = world.position;
            // glTF lights shine along their local -Z axis
            light.target = world.position + world.rotation * Vector3::new(0.0, 0.0, -1.0);
            lights.push(light);
        }
    });
    lights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::geometry::{SkinWeights, box_geometry, morph_cube};

    fn cube_node(name: &str) -> ModelNode {
        ModelNode::new(name, vec![box_geometry(2.0, 2.0, 2.0)], vec![MaterialData::default()])
    }

    #[test]
    fn world_transforms_propagate_to_children() {
        let mut root = ContainerNode::new("root");
        root.set_local_transform(Instance::from(Vector3::new(1.0, 0.0, 0.0)));
        let mut child = cube_node("child");
        child.set_local_transform(Instance::from(Vector3::new(0.0, 2.0, 0.0)));
        root.add_child(Box::new(child));
        root.update_world_transform_all();

        let world = root.get_children()[0].get_world_transform();
        assert_eq!(world.position, Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn bounds_use_world_transforms() {
        let mut root = ContainerNode::new("root");
        let mut child = cube_node("child");
        child.local_transform_mut().position = Vector3::new(5.0, 0.0, 0.0);
        child.local_transform_mut().scale = Vector3::new(2.0, 2.0, 2.0);
        root.add_child(Box::new(child));
        root.update_world_transform_all();

        let b = bounds(&root);
        assert_eq!(b.center(), Vector3::new(5.0, 0.0, 0.0));
        assert_eq!(b.size(), Vector3::new(4.0, 4.0, 4.0));
    }

    #[test]
    fn morph_dictionary_is_built_from_target_names() {
        let node = ModelNode::new("morph", vec![morph_cube(2)], vec![MaterialData::default()]);
        assert_eq!(node.morph_target_influences, vec![0.0, 0.0]);
        assert_eq!(node.morph_target_dictionary.get("Spherify"), Some(&0));
        assert_eq!(node.morph_target_name(1), Some("Twist"));
        assert_eq!(node.kind(), NodeKind::Mesh);
    }

    #[test]
    fn skinning_uses_joint_world_matrices() {
        let mut mesh = box_geometry(1.0, 1.0, 1.0);
        let n = mesh.vertices.len();
        mesh.skin = Some(SkinWeights {
            joints: vec![[0, 0, 0, 0]; n],
            weights: vec![[1.0, 0.0, 0.0, 0.0]; n],
        });
        let mut skinned = ModelNode::new("skinned", vec![mesh], vec![MaterialData::default()]);
        skinned.skin = Some(Skin {
            joints: vec![7],
            inverse_bind_matrices: vec![Matrix4::identity()],
        });

        let mut root = ContainerNode::new("root");
        let mut bone = ContainerNode::new("bone")
            .with_kind(NodeKind::Bone)
            .with_source_index(7);
        bone.set_local_transform(Instance::from(Vector3::new(0.0, 3.0, 0.0)));
        root.add_child(Box::new(bone));
        root.add_child(Box::new(skinned));
        root.update_world_transform_all();
        update_skinning(&mut root);

        let model = root.get_children()[1].as_model().expect("model node");
        assert_eq!(model.kind(), NodeKind::SkinnedMesh);
        assert_eq!(model.render_transform(), Instance::default());
        let vertices = model.current_vertices(&model.primitives[0]);
        assert!((vertices[0].position[1] - (model.primitives[0].vertices[0].position[1] + 3.0)).abs() < 1e-5);
    }

    #[test]
    fn dispose_marks_the_whole_subtree() {
        let mut root = ContainerNode::new("root");
        let mut group = ContainerNode::new("group");
        group.add_child(Box::new(cube_node("a")));
        root.add_child(Box::new(group));
        root.add_child(Box::new(cube_node("b")));
        root.dispose();

        let mut disposed = 0;
        traverse(&root, &mut |node| {
            if node.as_model().is_some_and(ModelNode::is_disposed) {
                disposed += 1;
            }
        });
        assert_eq!(disposed, 2);
        assert!(root.get_render().is_empty());
        assert_eq!(count_nodes(&root), 4);
    }

    #[test]
    fn nodes_are_found_by_source_index() {
        let mut root = ContainerNode::new("root");
        let mut arm = ContainerNode::new("arm").with_source_index(1);
        arm.add_child(Box::new(cube_node("hand").with_source_index(2)));
        root.add_child(Box::new(arm));

        assert_eq!(find_by_source_index(&root, 2).map(|n| n.name()), Some("hand"));
        assert!(find_by_source_index(&root, 3).is_none());
        let hand = find_by_source_index_mut(&mut root, 2).expect("hand");
        hand.local_transform_mut().position.x = 4.0;
        assert_eq!(root.get_children()[0].get_children()[0].get_local_transform().position.x, 4.0);
    }

    #[test]
    fn light_nodes_resolve_to_world_space() {
        let mut root = ContainerNode::new("root");
        root.set_local_transform(Instance::from(Vector3::new(0.0, 1.0, 0.0)));
        root.add_child(Box::new(
            ContainerNode::new("sun").with_light(Light::directional(0xffffff, 1.0, [0.0; 3])),
        ));
        root.update_world_transform_all();
        let lights = collect_lights(&root);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].position, Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(lights[0].target, Vector3::new(0.0, 1.0, -1.0));
    }
}
