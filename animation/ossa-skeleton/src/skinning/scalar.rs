//! Portable skinning
//!
//! Always available and the reference the vector paths are checked against.

use super::{SkinningInput, SkinningOutput};
use glam::{Mat4, Vec3};

/// Blend one vertex, returning its skinned position and, when `normal` is
/// given, its unnormalised skinned normal.
#[inline]
pub fn blend_vertex(
    input: &SkinningInput<'_>,
    matrices: &[Mat4],
    vertex: usize,
    position: Vec3,
    normal: Option<Vec3>,
) -> (Vec3, Vec3) {
    let mut blended_position = Vec3::ZERO;
    let mut blended_normal = Vec3::ZERO;

    for influence in 0..input.weights_per_vertex {
        let weight = input.blend_weights.get(vertex, influence);
        if weight == 0.0 {
            continue;
        }
        let matrix = &matrices[input.blend_indices.get(vertex, influence)];
        blended_position += matrix.transform_point3(position) * weight;
        if let Some(normal) = normal {
            blended_normal += matrix.transform_vector3(normal) * weight;
        }
    }

    (blended_position, blended_normal)
}

/// Skin every vertex of `input` into `output`.
pub fn skin(input: &SkinningInput<'_>, output: &mut SkinningOutput<'_>, matrices: &[Mat4]) {
    let normals = input.normals.filter(|_| output.has_normals());

    for vertex in 0..input.vertex_count {
        let position = input.positions.vec3(vertex);
        let normal = normals.map(|stream| stream.vec3(vertex));
        let (skinned_position, skinned_normal) =
            blend_vertex(input, matrices, vertex, position, normal);

        output.write_position(vertex, skinned_position);
        if normal.is_some() {
            output.write_normal(vertex, skinned_normal.normalize_or_zero());
        }
    }
}
