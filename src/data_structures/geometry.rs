//! CPU-side geometry: vertex/index data, morph targets, skin weights and bounds.
//!
//! Meshes stay on the CPU so that morph target blending and skinning can be
//! evaluated before upload. The GPU copy lives in [`crate::data_structures::model::Mesh`].

use cgmath::{InnerSpace, Matrix3, Matrix4, Vector3, Vector4, Zero};

use crate::data_structures::model::ModelVertex;

/// A morph target stored as per-vertex deltas relative to the base mesh.
///
/// `normals` is either empty or has one delta per vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MorphTarget {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
}

/// Four joint indices and weights per vertex. Joint indices point into the skin's joint list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinWeights {
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
}

#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: usize,
    pub morph_targets: Vec<MorphTarget>,
    pub skin: Option<SkinWeights>,
}

impl MeshData {
    pub fn new(name: &str, vertices: Vec<ModelVertex>, indices: Vec<u32>, material: usize) -> Self {
        Self {
            name: name.to_string(),
            vertices,
            indices,
            material,
            morph_targets: Vec::new(),
            skin: None,
        }
    }

    pub fn is_deformable(&self) -> bool {
        !self.morph_targets.is_empty() || self.skin.is_some()
    }

    /// Blend morph targets with `influences`, then skin with `joint_matrices`.
    ///
    /// Missing influences count as zero. Skinned output is in world space, so
    /// the caller has to draw it with an identity model matrix.
    pub fn deform(&self, influences: &[f32], joint_matrices: Option<&[Matrix4<f32>]>) -> Vec<ModelVertex> {
        let mut out = self.vertices.clone();

        for (target, &weight) in self.morph_targets.iter().zip(influences) {
            if weight == 0.0 {
                continue;
            }
            for (v, delta) in out.iter_mut().zip(&target.positions) {
                v.position = add_scaled(v.position, *delta, weight);
            }
            for (v, delta) in out.iter_mut().zip(&target.normals) {
                v.normal = add_scaled(v.normal, *delta, weight);
            }
        }
        if self.morph_targets.iter().any(|t| !t.normals.is_empty()) {
            for v in out.iter_mut() {
                v.normal = normalize_or_keep(v.normal);
            }
        }

        if let (Some(skin), Some(matrices)) = (&self.skin, joint_matrices) {
            for (i, v) in out.iter_mut().enumerate() {
                let (Some(joints), Some(weights)) = (skin.joints.get(i), skin.weights.get(i)) else {
                    continue;
                };
                let mut m = Matrix4::<f32>::zero();
                let mut total = 0.0;
                for (&joint, &weight) in joints.iter().zip(weights) {
                    if weight == 0.0 {
                        continue;
                    }
                    if let Some(jm) = matrices.get(joint as usize) {
                        m = m + *jm * weight;
                        total += weight;
                    }
                }
                if total == 0.0 {
                    continue;
                }
                let p = m * Vector4::new(v.position[0], v.position[1], v.position[2], 1.0);
                v.position = p.truncate().into();
                let rot = Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate());
                v.normal = normalize_or_keep((rot * Vector3::from(v.normal)).into());
                v.tangent = normalize_or_keep((rot * Vector3::from(v.tangent)).into());
                v.bitangent = normalize_or_keep((rot * Vector3::from(v.bitangent)).into());
            }
        }
        out
    }

    /// Procedural meshes and many glTF exports don't come with tangents, so
    /// they have to be calculated for normal maps to work correctly.
    pub fn compute_tangents(&mut self) {
        let vertices = &mut self.vertices;
        let mut triangles_included = vec![0; vertices.len()];
        for v in vertices.iter_mut() {
            v.tangent = [0.0; 3];
            v.bitangent = [0.0; 3];
        }

        for c in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
            if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
                continue;
            }
            let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);

            let pos0: Vector3<_> = v0.position.into();
            let pos1: Vector3<_> = v1.position.into();
            let pos2: Vector3<_> = v2.position.into();

            let uv0: cgmath::Vector2<_> = v0.tex_coords.into();
            let uv1: cgmath::Vector2<_> = v1.tex_coords.into();
            let uv2: cgmath::Vector2<_> = v2.tex_coords.into();

            let delta_pos1 = pos1 - pos0;
            let delta_pos2 = pos2 - pos0;
            let delta_uv1 = uv1 - uv0;
            let delta_uv2 = uv2 - uv0;

            // Solves
            //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
            //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
            let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
            // flipped: texture v runs downwards in wgpu, normal maps expect it upwards
            let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

            for &i in &[i0, i1, i2] {
                vertices[i].tangent = (tangent + Vector3::from(vertices[i].tangent)).into();
                vertices[i].bitangent = (bitangent + Vector3::from(vertices[i].bitangent)).into();
                triangles_included[i] += 1;
            }
        }

        for (i, n) in triangles_included.into_iter().enumerate() {
            if n == 0 {
                continue;
            }
            let denom = 1.0 / n as f32;
            let v = &mut vertices[i];
            v.tangent = (Vector3::from(v.tangent) * denom).into();
            v.bitangent = (Vector3::from(v.bitangent) * denom).into();
        }
    }

    /// Smooth vertex normals as the normalized sum of adjacent face normals.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.vertices.len()];
        for c in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
            if i0 >= normals.len() || i1 >= normals.len() || i2 >= normals.len() {
                continue;
            }
            let p0 = Vector3::from(self.vertices[i0].position);
            let p1 = Vector3::from(self.vertices[i1].position);
            let p2 = Vector3::from(self.vertices[i2].position);
            let face = (p1 - p0).cross(p2 - p0);
            for i in [i0, i1, i2] {
                normals[i] += face;
            }
        }
        for (v, n) in self.vertices.iter_mut().zip(normals) {
            v.normal = normalize_or_keep(n.into());
        }
    }

    pub fn bounds(&self) -> Box3 {
        Box3::from_points(self.vertices.iter().map(|v| Vector3::from(v.position)))
    }

    /// Unique triangle edges, used to draw wireframes as line lists.
    pub fn edges(&self) -> Vec<[u32; 2]> {
        let mut edges: Vec<[u32; 2]> = self
            .indices
            .chunks_exact(3)
            .flat_map(|c| [[c[0], c[1]], [c[1], c[2]], [c[2], c[0]]])
            .map(|[a, b]| if a < b { [a, b] } else { [b, a] })
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }
}

fn add_scaled(a: [f32; 3], b: [f32; 3], s: f32) -> [f32; 3] {
    [a[0] + b[0] * s, a[1] + b[1] * s, a[2] + b[2] * s]
}

fn normalize_or_keep(v: [f32; 3]) -> [f32; 3] {
    let v = Vector3::from(v);
    if v.magnitude2() > 0.0 {
        v.normalize().into()
    } else {
        v.into()
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3 {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Default for Box3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Box3 {
    pub fn empty() -> Self {
        Self {
            min: Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vector3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vector3<f32>>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.expand_by_point(p);
        }
        b
    }

    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    pub fn expand_by_point(&mut self, p: Vector3<f32>) {
        self.min = Vector3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Vector3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn union(&self, other: &Box3) -> Box3 {
        if other.is_empty() {
            return *self;
        }
        let mut b = *self;
        b.expand_by_point(other.min);
        b.expand_by_point(other.max);
        b
    }

    pub fn center(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        self.max - self.min
    }

    /// Bounds of the eight corners after applying `m`.
    pub fn transformed(&self, m: &Matrix4<f32>) -> Box3 {
        if self.is_empty() {
            return *self;
        }
        let (lo, hi) = (self.min, self.max);
        Box3::from_points((0..8).map(|i| {
            let corner = Vector4::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
                1.0,
            );
            (m * corner).truncate()
        }))
    }
}

/// An axis-aligned box centred at the origin.
pub fn box_geometry(width: f32, height: f32, depth: f32) -> MeshData {
    let mut mesh = subdivided_box(width, height, depth, 1);
    mesh.name = String::from("box");
    mesh
}

/// A box whose faces are split into `segments` x `segments` quads.
pub fn subdivided_box(width: f32, height: f32, depth: f32, segments: u32) -> MeshData {
    let segments = segments.max(1);
    let half = Vector3::new(width / 2.0, height / 2.0, depth / 2.0);
    // (normal, u, v) with u x v == normal so the quads wind counter clockwise
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let scale = |v: Vector3<f32>| Vector3::new(v.x * half.x, v.y * half.y, v.z * half.z);
    for (n, u, v) in faces {
        let (n, u, v) = (Vector3::from(n), Vector3::from(u), Vector3::from(v));
        let base = vertices.len() as u32;
        for j in 0..=segments {
            for i in 0..=segments {
                let s = i as f32 / segments as f32;
                let t = j as f32 / segments as f32;
                let p = scale(n + u * (2.0 * s - 1.0) + v * (2.0 * t - 1.0));
                vertices.push(ModelVertex {
                    position: p.into(),
                    tex_coords: [s, 1.0 - t],
                    normal: n.into(),
                    tangent: u.into(),
                    bitangent: v.into(),
                });
            }
        }
        let row = segments + 1;
        for j in 0..segments {
            for i in 0..segments {
                let a = base + j * row + i;
                let b = a + 1;
                let c = a + row + 1;
                let d = a + row;
                indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
    }
    MeshData::new("subdivided box", vertices, indices, 0)
}

/// A 2x2x2 cube with two morph targets: "Spherify" moves every vertex onto
/// the unit sphere and "Twist" stretches the cube along x and twists it
/// around that axis.
pub fn morph_cube(segments: u32) -> MeshData {
    let mut mesh = subdivided_box(2.0, 2.0, 2.0, segments);
    mesh.name = String::from("morph cube");

    let mut spherify = MorphTarget {
        name: String::from("Spherify"),
        ..Default::default()
    };
    let mut twist = MorphTarget {
        name: String::from("Twist"),
        ..Default::default()
    };
    for vertex in &mesh.vertices {
        let [x, y, z] = vertex.position;
        let sphere = [
            x * (1.0 - y * y / 2.0 - z * z / 2.0 + y * y * z * z / 3.0).max(0.0).sqrt(),
            y * (1.0 - z * z / 2.0 - x * x / 2.0 + z * z * x * x / 3.0).max(0.0).sqrt(),
            z * (1.0 - x * x / 2.0 - y * y / 2.0 + x * x * y * y / 3.0).max(0.0).sqrt(),
        ];
        spherify.positions.push([sphere[0] - x, sphere[1] - y, sphere[2] - z]);

        let angle = std::f32::consts::PI * x / 2.0;
        let rot = Matrix3::from_angle_x(cgmath::Rad(angle));
        let twisted = rot * Vector3::new(x * 2.0, y, z);
        twist.positions.push([twisted.x - x, twisted.y - y, twisted.z - z]);
    }
    mesh.morph_targets = vec![spherify, twist];
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn box_has_four_vertices_and_two_triangles_per_face() {
        let mesh = box_geometry(2.0, 2.0, 2.0);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        let b = mesh.bounds();
        assert_eq!(b.min, Vector3::new(-1.0, -1.0, -1.0));
        assert_eq!(b.max, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn box_triangles_face_outwards() {
        let mesh = box_geometry(1.0, 2.0, 3.0);
        for c in mesh.indices.chunks_exact(3) {
            let p: Vec<Vector3<f32>> = c
                .iter()
                .map(|&i| Vector3::from(mesh.vertices[i as usize].position))
                .collect();
            let face_normal = (p[1] - p[0]).cross(p[2] - p[0]);
            let n = Vector3::from(mesh.vertices[c[0] as usize].normal);
            assert!(face_normal.dot(n) > 0.0);
        }
    }

    #[test]
    fn morph_influences_blend_linearly() {
        let mesh = morph_cube(4);
        let half = mesh.deform(&[0.5, 0.0], None);
        let full = mesh.deform(&[1.0, 0.0], None);
        for ((base, h), f) in mesh.vertices.iter().zip(&half).zip(&full) {
            for k in 0..3 {
                let expected = base.position[k] + (f.position[k] - base.position[k]) * 0.5;
                assert!(approx(h.position[k], expected));
            }
        }
        // a fully spherified cube lies on the unit sphere
        for v in &full {
            let r = Vector3::from(v.position).magnitude();
            assert!((r - 1.0).abs() < 1e-3, "{r}");
        }
    }

    #[test]
    fn zero_influences_leave_mesh_untouched() {
        let mesh = morph_cube(2);
        assert_eq!(mesh.deform(&[], None), mesh.vertices);
        assert_eq!(mesh.deform(&[0.0, 0.0], None), mesh.vertices);
    }

    #[test]
    fn skinning_moves_vertices_with_their_joint() {
        let mut mesh = box_geometry(1.0, 1.0, 1.0);
        let count = mesh.vertices.len();
        mesh.skin = Some(SkinWeights {
            joints: vec![[0, 1, 0, 0]; count],
            weights: vec![[0.5, 0.5, 0.0, 0.0]; count],
        });
        let joints = [
            Matrix4::from_translation(Vector3::new(2.0, 0.0, 0.0)),
            Matrix4::identity(),
        ];
        let skinned = mesh.deform(&[], Some(&joints));
        for (base, s) in mesh.vertices.iter().zip(&skinned) {
            assert!(approx(s.position[0], base.position[0] + 1.0));
            assert!(approx(s.position[1], base.position[1]));
        }
    }

    #[test]
    fn computed_tangents_follow_u_direction() {
        let mut mesh = box_geometry(2.0, 2.0, 2.0);
        let expected: Vec<[f32; 3]> = mesh.vertices.iter().map(|v| v.tangent).collect();
        mesh.compute_tangents();
        for (v, t) in mesh.vertices.iter().zip(expected) {
            let got = Vector3::from(v.tangent).normalize();
            assert!(got.dot(Vector3::from(t)) > 0.99, "{:?} vs {:?}", got, t);
            // and the bitangent points up the texture like the generated one
            assert!(Vector3::from(v.bitangent).normalize().dot(Vector3::from(v.normal).cross(Vector3::from(t))) > 0.99);
        }
    }

    #[test]
    fn box_union_and_transform() {
        let a = Box3::from_points([Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)]);
        let b = Box3::from_points([Vector3::new(-1.0, 2.0, 0.5)]);
        let u = a.union(&b);
        assert_eq!(u.min, Vector3::new(-1.0, 0.0, 0.0));
        assert_eq!(u.max, Vector3::new(1.0, 2.0, 1.0));
        assert_eq!(u.union(&Box3::empty()), u);

        let moved = a.transformed(&Matrix4::from_scale(2.0));
        assert_eq!(moved.size(), Vector3::new(2.0, 2.0, 2.0));
        assert_eq!(moved.center(), Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(Box3::empty().size(), Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn edges_are_unique() {
        let mesh = box_geometry(1.0, 1.0, 1.0);
        // 6 faces * (4 border edges + 1 diagonal)
        assert_eq!(mesh.edges().len(), 30);
    }
}
