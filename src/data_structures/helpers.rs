//! Debug helpers drawn as lines: skeletons, a ground grid, axes and wireframes.

use cgmath::{Transform, Point3, Vector3};

use crate::{
    data_structures::{
        model::hex_to_rgba,
        scene_graph::{NodeKind, SceneNode, traverse},
    },
    pipelines::lines::LineBatch,
};

fn rgb(hex: u32) -> [f32; 3] {
    let [r, g, b, _] = hex_to_rgba(hex);
    [r, g, b]
}

/// Lines from every bone to its parent bone.
pub fn push_skeleton(batch: &mut LineBatch, root: &dyn SceneNode) {
    fn walk(batch: &mut LineBatch, node: &dyn SceneNode, parent: Option<Vector3<f32>>) {
        let position = node.get_world_transform().position;
        let next = if node.kind() == NodeKind::Bone {
            if let Some(parent) = parent {
                batch.push_line(parent.into(), position.into(), rgb(0x00ff00));
            }
            Some(position)
        } else {
            None
        };
        for child in node.get_children() {
            walk(batch, child.as_ref(), next);
        }
    }
    walk(batch, root, None);
}

/// Square grid in the y = 0 plane, centred at the origin.
pub fn push_grid(batch: &mut LineBatch, size: f32, divisions: u32, center: u32, grid: u32) {
    let divisions = divisions.max(1);
    let half = size / 2.0;
    let step = size / divisions as f32;
    let center_index = divisions / 2;
    for i in 0..=divisions {
        let k = -half + i as f32 * step;
        let color = if i == center_index { rgb(center) } else { rgb(grid) };
        batch.push_line([-half, 0.0, k], [half, 0.0, k], color);
        batch.push_line([k, 0.0, -half], [k, 0.0, half], color);
    }
}

/// X (red), Y (green) and Z (blue) axes of length `size`.
pub fn push_axes(batch: &mut LineBatch, size: f32) {
    batch.push_line([0.0; 3], [size, 0.0, 0.0], [1.0, 0.0, 0.0]);
    batch.push_line([0.0; 3], [0.0, size, 0.0], [0.0, 1.0, 0.0]);
    batch.push_line([0.0; 3], [0.0, 0.0, size], [0.0, 0.0, 1.0]);
}

/// Triangle edges of every mesh whose material is drawn as wireframe.
pub fn push_wireframes(batch: &mut LineBatch, root: &dyn SceneNode) {
    traverse(root, &mut |node| {
        let Some(model) = node.as_model() else {
            return;
        };
        if model.is_disposed() {
            return;
        }
        let transform = model.render_transform().to_matrix();
        for primitive in &model.primitives {
            let material = model.materials.get(primitive.material);
            if !material.is_some_and(|m| m.wireframe) {
                continue;
            }
            let color = material
                .map(|m| [m.base_color[0], m.base_color[1], m.base_color[2]])
                .unwrap_or([1.0; 3]);
            let vertices = model.current_vertices(primitive);
            let world = |i: u32| -> [f32; 3] {
                let p = vertices[i as usize].position;
                let p = transform.transform_point(Point3::new(p[0], p[1], p[2]));
                [p.x, p.y, p.z]
            };
            for [a, b] in primitive.edges() {
                if (a as usize) < vertices.len() && (b as usize) < vertices.len() {
                    batch.push_line(world(a), world(b), color);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{
        geometry::box_geometry,
        instance::Instance,
        model::MaterialData,
        scene_graph::{ContainerNode, ModelNode},
    };

    #[test]
    fn skeleton_connects_bones_to_bone_parents_only() {
        let mut root = ContainerNode::new("root");
        let mut hips = ContainerNode::new("hips").with_kind(NodeKind::Bone);
        let mut spine = ContainerNode::new("spine").with_kind(NodeKind::Bone);
        spine.set_local_transform(Instance::from(Vector3::new(0.0, 1.0, 0.0)));
        spine.add_child(Box::new(ContainerNode::new("prop")));
        hips.add_child(Box::new(spine));
        root.add_child(Box::new(hips));
        root.update_world_transform_all();

        let mut batch = LineBatch::new("skeleton");
        push_skeleton(&mut batch, &root);
        let vertices = batch.vertices();
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(vertices[1].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn grid_has_lines_in_both_directions() {
        let mut batch = LineBatch::new("grid");
        push_grid(&mut batch, 10.0, 10, 0x444444, 0x888888);
        assert_eq!(batch.vertices().len(), 2 * 2 * 11);
        assert_eq!(batch.vertices()[0].position, [-5.0, 0.0, -5.0]);

        batch.clear();
        push_axes(&mut batch, 2.0);
        assert_eq!(batch.vertices().len(), 6);
    }

    #[test]
    fn only_wireframe_materials_produce_edges() {
        let mut root = ContainerNode::new("root");
        let mut wire = MaterialData::default();
        wire.wireframe = true;
        let mut boxed = ModelNode::new("wire", vec![box_geometry(1.0, 1.0, 1.0)], vec![wire]);
        boxed.local_transform_mut().position = Vector3::new(10.0, 0.0, 0.0);
        root.add_child(Box::new(boxed));
        root.add_child(Box::new(ModelNode::new(
            "solid",
            vec![box_geometry(1.0, 1.0, 1.0)],
            vec![MaterialData::default()],
        )));
        root.update_world_transform_all();

        let mut batch = LineBatch::new("wireframe");
        push_wireframes(&mut batch, &root);
        let edges = box_geometry(1.0, 1.0, 1.0).edges().len();
        assert_eq!(batch.vertices().len(), edges * 2);
        assert!(batch.vertices().iter().all(|v| v.position[0] >= 9.5));
    }
}
