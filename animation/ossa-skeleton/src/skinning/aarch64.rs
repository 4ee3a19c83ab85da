//! ARM64 NEON skinning paths
//!
//! NEON is part of the ARM64 baseline. The general loop handles any stride;
//! tightly packed `xyz` streams take a four-vertex loop built on the
//! structure loads `vld3q_f32`/`vst3q_f32`. Interleaved position and normal
//! records always use the general loop. All functions expect buffers already
//! validated with `check_buffers`.

// Allow both unused_unsafe and unsafe_op_in_unsafe_fn to handle different Rust versions
#![allow(unused_unsafe)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(unsafe_code)]

use std::arch::aarch64::*;
use std::ops::Range;

use super::{LayoutClass, RawOutput, SkinningInput, SkinningOutput};
use glam::Mat4;

#[derive(Clone, Copy)]
struct Pass {
    positions: *const f32,
    position_stride: usize,
    normals: Option<(*const f32, usize)>,
    output: RawOutput,
}

/// NEON skinning entry point.
///
/// # Safety
///
/// The buffers in `input` and `output` must have passed `check_buffers`.
#[target_feature(enable = "neon")]
pub(super) unsafe fn skin_neon(
    input: &SkinningInput<'_>,
    output: &mut SkinningOutput<'_>,
    matrices: &[Mat4],
) {
    let class = LayoutClass::classify(input, output);
    let packed = class != LayoutClass::Interleaved && class.is_packed(input, output);

    let mut raw = output.raw();
    let normals = match class {
        LayoutClass::PositionOnly => {
            raw.normals = None;
            None
        }
        _ => input.normals.map(|stream| (stream.as_ptr(), stream.stride())),
    };
    let pass = Pass {
        positions: input.positions.as_ptr(),
        position_stride: input.positions.stride(),
        normals,
        output: raw,
    };

    let count = input.vertex_count;
    if !packed {
        skin_general(&pass, input, matrices, 0..count);
        return;
    }

    let end = count / 4 * 4;
    skin_packed(&pass, input, matrices, 0..end);
    skin_general(&pass, input, matrices, end..count);
}

#[inline(always)]
unsafe fn load_column(matrix: &Mat4, column: usize) -> float32x4_t {
    vld1q_f32(std::ptr::from_ref(matrix).cast::<f32>().add(column * 4))
}

#[inline(always)]
unsafe fn blend_columns(
    input: &SkinningInput<'_>,
    matrices: &[Mat4],
    vertex: usize,
) -> [float32x4_t; 4] {
    let mut columns = [vdupq_n_f32(0.0); 4];
    for influence in 0..input.weights_per_vertex {
        let weight = input.blend_weights.get(vertex, influence);
        if weight == 0.0 {
            continue;
        }
        let matrix = &matrices[input.blend_indices.get(vertex, influence)];
        for (index, column) in columns.iter_mut().enumerate() {
            *column = vfmaq_n_f32(*column, load_column(matrix, index), weight);
        }
    }
    columns
}

#[inline(always)]
unsafe fn transform_vector(columns: &[float32x4_t; 4], v: *const f32) -> float32x4_t {
    let mut out = vmulq_n_f32(columns[0], *v);
    out = vfmaq_n_f32(out, columns[1], *v.add(1));
    vfmaq_n_f32(out, columns[2], *v.add(2))
}

#[inline(always)]
unsafe fn normalize3(v: float32x4_t) -> float32x4_t {
    let squared = vmulq_f32(v, v);
    let length = (vgetq_lane_f32::<0>(squared)
        + vgetq_lane_f32::<1>(squared)
        + vgetq_lane_f32::<2>(squared))
    .sqrt();
    if length > 0.0 {
        vmulq_n_f32(v, length.recip())
    } else {
        vdupq_n_f32(0.0)
    }
}

#[inline(always)]
unsafe fn store3(p: *mut f32, v: float32x4_t) {
    vst1_f32(p, vget_low_f32(v));
    vst1q_lane_f32::<2>(p.add(2), v);
}

#[target_feature(enable = "neon")]
unsafe fn skin_general(
    pass: &Pass,
    input: &SkinningInput<'_>,
    matrices: &[Mat4],
    range: Range<usize>,
) {
    for vertex in range {
        let columns = blend_columns(input, matrices, vertex);

        let source = pass.positions.add(vertex * pass.position_stride);
        let position = vaddq_f32(transform_vector(&columns, source), columns[3]);
        store3(
            pass.output
                .positions
                .add(vertex * pass.output.position_stride),
            position,
        );

        if let (Some((source, source_stride)), Some((target, target_stride))) =
            (pass.normals, pass.output.normals)
        {
            let normal = transform_vector(&columns, source.add(vertex * source_stride));
            store3(target.add(vertex * target_stride), normalize3(normal));
        }
    }
}

/// Blended matrices of four vertices with `soa[column]` holding the
/// `x, y, z, w` rows of that column across the vertices.
#[inline(always)]
unsafe fn blend_columns_x4(
    input: &SkinningInput<'_>,
    matrices: &[Mat4],
    vertex: usize,
) -> [float32x4x4_t; 4] {
    // buffer[column] holds that column for vertex 0..4 back to back, which a
    // four-way structure load transposes
    let mut buffer = [[0.0f32; 16]; 4];
    for lane in 0..4 {
        let columns = blend_columns(input, matrices, vertex + lane);
        for (column, values) in columns.iter().enumerate() {
            vst1q_f32(buffer[column].as_mut_ptr().add(lane * 4), *values);
        }
    }
    [
        vld4q_f32(buffer[0].as_ptr()),
        vld4q_f32(buffer[1].as_ptr()),
        vld4q_f32(buffer[2].as_ptr()),
        vld4q_f32(buffer[3].as_ptr()),
    ]
}

#[inline(always)]
unsafe fn soa_row(
    r0: float32x4_t,
    r1: float32x4_t,
    r2: float32x4_t,
    v: &float32x4x3_t,
) -> float32x4_t {
    vfmaq_f32(vfmaq_f32(vmulq_f32(r0, v.0), r1, v.1), r2, v.2)
}

#[inline(always)]
unsafe fn soa_vector(m: &[float32x4x4_t; 4], v: float32x4x3_t) -> float32x4x3_t {
    float32x4x3_t(
        soa_row(m[0].0, m[1].0, m[2].0, &v),
        soa_row(m[0].1, m[1].1, m[2].1, &v),
        soa_row(m[0].2, m[1].2, m[2].2, &v),
    )
}

#[inline(always)]
unsafe fn soa_normalize(v: float32x4x3_t) -> float32x4x3_t {
    let squared = vfmaq_f32(vfmaq_f32(vmulq_f32(v.0, v.0), v.1, v.1), v.2, v.2);
    let length = vsqrtq_f32(squared);
    let nonzero = vcgtq_f32(length, vdupq_n_f32(0.0));
    let scale = vbslq_f32(nonzero, vdivq_f32(vdupq_n_f32(1.0), length), vdupq_n_f32(0.0));
    float32x4x3_t(vmulq_f32(v.0, scale), vmulq_f32(v.1, scale), vmulq_f32(v.2, scale))
}

/// Four vertices per iteration over packed `xyz` streams.
#[target_feature(enable = "neon")]
unsafe fn skin_packed(pass: &Pass, input: &SkinningInput<'_>, matrices: &[Mat4], range: Range<usize>) {
    for vertex in range.step_by(4) {
        let m = blend_columns_x4(input, matrices, vertex);

        let positions = vld3q_f32(pass.positions.add(vertex * 3));
        let rotated = soa_vector(&m, positions);
        let skinned = float32x4x3_t(
            vaddq_f32(rotated.0, m[3].0),
            vaddq_f32(rotated.1, m[3].1),
            vaddq_f32(rotated.2, m[3].2),
        );
        vst3q_f32(pass.output.positions.add(vertex * 3), skinned);

        if let (Some((source, _)), Some((target, _))) = (pass.normals, pass.output.normals) {
            let normals = vld3q_f32(source.add(vertex * 3));
            vst3q_f32(
                target.add(vertex * 3),
                soa_normalize(soa_vector(&m, normals)),
            );
        }
    }
}
