//! Transform helpers shared by the node hierarchy, animation and skinning

use glam::{Mat4, Quat, Vec3};

/// Above this cosine two rotations are treated as parallel and blended linearly
const SLERP_LINEAR_THRESHOLD: f32 = 0.9995;

/// Build an affine transform that scales, then rotates, then translates.
///
/// The rotation block is `rotation * scale` with the axes scaled in place, so
/// a non-uniform scale never introduces shear.
pub fn make_transform(position: Vec3, scale: Vec3, orientation: Quat) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, orientation, position)
}

/// Inverse of [`make_transform`] built directly from its parts.
pub fn make_inverse_transform(position: Vec3, scale: Vec3, orientation: Quat) -> Mat4 {
    Mat4::from_scale(scale.recip())
        * Mat4::from_quat(orientation.inverse())
        * Mat4::from_translation(-position)
}

/// Spherical linear interpolation between two unit quaternions.
///
/// With `shortest_path` set the second rotation is negated when the two lie in
/// opposite hemispheres, so the blend never takes the long way round.
pub fn slerp(from: Quat, to: Quat, t: f32, shortest_path: bool) -> Quat {
    let mut cos = from.dot(to);
    let mut to = to;
    if shortest_path && cos < 0.0 {
        cos = -cos;
        to = -to;
    }

    if cos.abs() > SLERP_LINEAR_THRESHOLD {
        return nlerp(from, to, t);
    }

    let sin = (1.0 - cos * cos).sqrt();
    let angle = sin.atan2(cos);
    let inv_sin = sin.recip();
    let a = ((1.0 - t) * angle).sin() * inv_sin;
    let b = (t * angle).sin() * inv_sin;
    from * a + to * b
}

/// Normalised linear interpolation; falls back to `from` when the blend
/// collapses to a zero-length quaternion.
pub fn nlerp(from: Quat, to: Quat, t: f32) -> Quat {
    let blended = from * (1.0 - t) + to * t;
    let length = blended.length();
    if length > f32::EPSILON {
        blended * length.recip()
    } else {
        from
    }
}

/// Catmull-Rom segment between `p1` and `p2`, with `p0` and `p3` as the
/// neighbouring control points.
pub fn catmull_rom(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}

/// Concatenate `base` onto every matrix in `src`, writing `base * src[i]` to
/// `dst[i]`. Only the first `min(src.len(), dst.len())` entries are touched.
pub fn concatenate_affine_matrices(base: &Mat4, src: &[Mat4], dst: &mut [Mat4]) {
    for (out, m) in dst.iter_mut().zip(src) {
        *out = *base * *m;
    }
}
