//! x86-64 skinning paths
//!
//! SSE2 is part of the x86-64 baseline, so these paths are always usable on
//! this architecture. Two loops are provided:
//!
//! - a general loop that blends the bone matrix columns for one vertex at a
//!   time and works for any stride
//! - packed loops that process four vertices per iteration when positions
//!   (and normals) are tightly packed, either as separate `xyz` streams or as
//!   interleaved `xyz nx ny nz` records
//!
//! Packed loops use aligned loads and stores when a short scalar-width prefix
//! can bring every stream onto a 16 byte boundary, and unaligned ones
//! otherwise. All functions expect buffers already validated with
//! `check_buffers`.

// Allow both unused_unsafe and unsafe_op_in_unsafe_fn to handle different Rust versions
#![allow(unused_unsafe)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(unsafe_code)]

use std::arch::x86_64::*;
use std::ops::Range;

use super::{LayoutClass, RawOutput, SkinningInput, SkinningOutput};
use glam::Mat4;

/// Resolved pointers for one pass.
#[derive(Clone, Copy)]
struct Pass {
    positions: *const f32,
    position_stride: usize,
    normals: Option<(*const f32, usize)>,
    output: RawOutput,
}

/// SSE2 skinning entry point.
///
/// # Safety
///
/// The buffers in `input` and `output` must have passed `check_buffers`.
#[target_feature(enable = "sse2")]
pub(super) unsafe fn skin_sse2(
    input: &SkinningInput<'_>,
    output: &mut SkinningOutput<'_>,
    matrices: &[Mat4],
) {
    let class = LayoutClass::classify(input, output);
    let packed = class.is_packed(input, output);

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

    let prefix = alignment_prefix(&pass, class);
    let start = prefix.unwrap_or(0);
    let end = start + (count - start) / 4 * 4;
    skin_general(&pass, input, matrices, 0..start);

    match (class, prefix.is_some()) {
        (LayoutClass::Interleaved, true) => {
            skin_packed_interleaved::<true>(&pass, input, matrices, start..end);
        }
        (LayoutClass::Interleaved, false) => {
            skin_packed_interleaved::<false>(&pass, input, matrices, start..end);
        }
        (_, true) => skin_packed_separate::<true>(&pass, input, matrices, start..end),
        (_, false) => skin_packed_separate::<false>(&pass, input, matrices, start..end),
    }

    skin_general(&pass, input, matrices, end..count);
}

/// Smallest number of leading vertices (0 to 3) after which every stream of
/// the pass sits on a 16 byte boundary, if there is one. Interleaved records
/// are loaded from the position, so only those pointers count.
fn alignment_prefix(pass: &Pass, class: LayoutClass) -> Option<usize> {
    let mut streams = vec![
        (pass.positions.addr(), pass.position_stride),
        (pass.output.positions.addr(), pass.output.position_stride),
    ];
    if class == LayoutClass::SeparateBuffers {
        if let Some((normals, stride)) = pass.normals {
            streams.push((normals.addr(), stride));
        }
        if let Some((normals, stride)) = pass.output.normals {
            streams.push((normals.addr(), stride));
        }
    }

    (0..4).find(|&lead| {
        streams
            .iter()
            .all(|&(address, stride)| (address + lead * stride * 4) % 16 == 0)
    })
}

/// Immediate for `_mm_shuffle_ps`: lanes `w` and `x` pick from the first
/// operand, `y` and `z` from the second.
const fn mm_shuffle(z: i32, y: i32, x: i32, w: i32) -> i32 {
    (z << 6) | (y << 4) | (x << 2) | w
}

#[inline(always)]
unsafe fn load_column(matrix: &Mat4, column: usize) -> __m128 {
    _mm_loadu_ps(std::ptr::from_ref(matrix).cast::<f32>().add(column * 4))
}

/// Weighted sum of the bone matrices of one vertex, as four columns.
#[inline(always)]
unsafe fn blend_columns(input: &SkinningInput<'_>, matrices: &[Mat4], vertex: usize) -> [__m128; 4] {
    let mut columns = [_mm_setzero_ps(); 4];
    for influence in 0..input.weights_per_vertex {
        let weight = input.blend_weights.get(vertex, influence);
        if weight == 0.0 {
            continue;
        }
        let matrix = &matrices[input.blend_indices.get(vertex, influence)];
        let weight = _mm_set1_ps(weight);
        for (index, column) in columns.iter_mut().enumerate() {
            *column = _mm_add_ps(*column, _mm_mul_ps(weight, load_column(matrix, index)));
        }
    }
    columns
}

#[inline(always)]
unsafe fn transform_point(columns: &[__m128; 4], p: *const f32) -> __m128 {
    let x = _mm_mul_ps(columns[0], _mm_set1_ps(*p));
    let y = _mm_mul_ps(columns[1], _mm_set1_ps(*p.add(1)));
    let z = _mm_mul_ps(columns[2], _mm_set1_ps(*p.add(2)));
    _mm_add_ps(_mm_add_ps(x, y), _mm_add_ps(z, columns[3]))
}

#[inline(always)]
unsafe fn transform_vector(columns: &[__m128; 4], n: *const f32) -> __m128 {
    let x = _mm_mul_ps(columns[0], _mm_set1_ps(*n));
    let y = _mm_mul_ps(columns[1], _mm_set1_ps(*n.add(1)));
    let z = _mm_mul_ps(columns[2], _mm_set1_ps(*n.add(2)));
    _mm_add_ps(_mm_add_ps(x, y), z)
}

/// Normalise the `xyz` lanes; zero-length vectors become zero.
#[inline(always)]
unsafe fn normalize3(v: __m128) -> __m128 {
    let squared = _mm_mul_ps(v, v);
    let y = _mm_shuffle_ps::<{ mm_shuffle(1, 1, 1, 1) }>(squared, squared);
    let z = _mm_shuffle_ps::<{ mm_shuffle(2, 2, 2, 2) }>(squared, squared);
    let sum = _mm_add_ss(_mm_add_ss(squared, y), z);
    let length = _mm_sqrt_ps(_mm_shuffle_ps::<{ mm_shuffle(0, 0, 0, 0) }>(sum, sum));
    let mask = _mm_cmpgt_ps(length, _mm_setzero_ps());
    _mm_and_ps(_mm_div_ps(v, length), mask)
}

#[inline(always)]
unsafe fn store3(p: *mut f32, v: __m128) {
    let mut lanes = [0.0f32; 4];
    _mm_storeu_ps(lanes.as_mut_ptr(), v);
    std::ptr::copy_nonoverlapping(lanes.as_ptr(), p, 3);
}

/// One vertex at a time, any stride.
#[target_feature(enable = "sse2")]
unsafe fn skin_general(pass: &Pass, input: &SkinningInput<'_>, matrices: &[Mat4], range: Range<usize>) {
    for vertex in range {
        let columns = blend_columns(input, matrices, vertex);

        let position = transform_point(&columns, pass.positions.add(vertex * pass.position_stride));
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

#[inline(always)]
unsafe fn load<const ALIGNED: bool>(p: *const f32) -> __m128 {
    if ALIGNED { _mm_load_ps(p) } else { _mm_loadu_ps(p) }
}

#[inline(always)]
unsafe fn store<const ALIGNED: bool>(p: *mut f32, v: __m128) {
    if ALIGNED {
        _mm_store_ps(p, v);
    } else {
        _mm_storeu_ps(p, v);
    }
}

/// `[x0 y0 z0 x1] [y1 z1 x2 y2] [z2 x3 y3 z3]` to `[x0..x3] [y0..y3] [z0..z3]`.
#[inline(always)]
unsafe fn deinterleave3(a: __m128, b: __m128, c: __m128) -> [__m128; 3] {
    let x = _mm_shuffle_ps::<{ mm_shuffle(2, 0, 3, 0) }>(
        a,
        _mm_shuffle_ps::<{ mm_shuffle(1, 1, 2, 2) }>(b, c),
    );
    let y = _mm_shuffle_ps::<{ mm_shuffle(2, 0, 2, 0) }>(
        _mm_shuffle_ps::<{ mm_shuffle(0, 0, 1, 1) }>(a, b),
        _mm_shuffle_ps::<{ mm_shuffle(2, 2, 3, 3) }>(b, c),
    );
    let z = _mm_shuffle_ps::<{ mm_shuffle(3, 0, 2, 0) }>(
        _mm_shuffle_ps::<{ mm_shuffle(1, 1, 2, 2) }>(a, b),
        c,
    );
    [x, y, z]
}

/// Inverse of [`deinterleave3`].
#[inline(always)]
unsafe fn interleave3([x, y, z]: [__m128; 3]) -> [__m128; 3] {
    let a = _mm_shuffle_ps::<{ mm_shuffle(2, 0, 2, 0) }>(
        _mm_shuffle_ps::<{ mm_shuffle(0, 0, 0, 0) }>(x, y),
        _mm_shuffle_ps::<{ mm_shuffle(1, 1, 0, 0) }>(z, x),
    );
    let b = _mm_shuffle_ps::<{ mm_shuffle(2, 0, 2, 0) }>(
        _mm_shuffle_ps::<{ mm_shuffle(1, 1, 1, 1) }>(y, z),
        _mm_shuffle_ps::<{ mm_shuffle(2, 2, 2, 2) }>(x, y),
    );
    let c = _mm_shuffle_ps::<{ mm_shuffle(2, 0, 2, 0) }>(
        _mm_shuffle_ps::<{ mm_shuffle(3, 3, 2, 2) }>(z, x),
        _mm_shuffle_ps::<{ mm_shuffle(3, 3, 3, 3) }>(y, z),
    );
    [a, b, c]
}

/// Blended matrices of four consecutive vertices in structure-of-arrays
/// form: `soa[column][row]` holds that element for each of the vertices.
#[inline(always)]
unsafe fn blend_columns_x4(
    input: &SkinningInput<'_>,
    matrices: &[Mat4],
    vertex: usize,
) -> [[__m128; 4]; 4] {
    let blended = [
        blend_columns(input, matrices, vertex),
        blend_columns(input, matrices, vertex + 1),
        blend_columns(input, matrices, vertex + 2),
        blend_columns(input, matrices, vertex + 3),
    ];
    let mut soa = [[_mm_setzero_ps(); 4]; 4];
    for (column, out) in soa.iter_mut().enumerate() {
        let mut r0 = blended[0][column];
        let mut r1 = blended[1][column];
        let mut r2 = blended[2][column];
        let mut r3 = blended[3][column];
        _MM_TRANSPOSE4_PS(&mut r0, &mut r1, &mut r2, &mut r3);
        *out = [r0, r1, r2, r3];
    }
    soa
}

/// One output row for four vertices: `m[0][r]·x + m[1][r]·y + m[2][r]·z`.
#[inline(always)]
unsafe fn soa_row(m: &[[__m128; 4]; 4], r: usize, x: __m128, y: __m128, z: __m128) -> __m128 {
    _mm_add_ps(
        _mm_add_ps(_mm_mul_ps(m[0][r], x), _mm_mul_ps(m[1][r], y)),
        _mm_mul_ps(m[2][r], z),
    )
}

#[inline(always)]
unsafe fn soa_point(m: &[[__m128; 4]; 4], [x, y, z]: [__m128; 3]) -> [__m128; 3] {
    [
        _mm_add_ps(soa_row(m, 0, x, y, z), m[3][0]),
        _mm_add_ps(soa_row(m, 1, x, y, z), m[3][1]),
        _mm_add_ps(soa_row(m, 2, x, y, z), m[3][2]),
    ]
}

#[inline(always)]
unsafe fn soa_vector(m: &[[__m128; 4]; 4], [x, y, z]: [__m128; 3]) -> [__m128; 3] {
    [
        soa_row(m, 0, x, y, z),
        soa_row(m, 1, x, y, z),
        soa_row(m, 2, x, y, z),
    ]
}

#[inline(always)]
unsafe fn soa_normalize([x, y, z]: [__m128; 3]) -> [__m128; 3] {
    let squared = _mm_add_ps(_mm_add_ps(_mm_mul_ps(x, x), _mm_mul_ps(y, y)), _mm_mul_ps(z, z));
    let length = _mm_sqrt_ps(squared);
    let mask = _mm_cmpgt_ps(length, _mm_setzero_ps());
    [
        _mm_and_ps(_mm_div_ps(x, length), mask),
        _mm_and_ps(_mm_div_ps(y, length), mask),
        _mm_and_ps(_mm_div_ps(z, length), mask),
    ]
}

#[inline(always)]
unsafe fn load_xyz4<const ALIGNED: bool>(p: *const f32) -> [__m128; 3] {
    deinterleave3(load::<ALIGNED>(p), load::<ALIGNED>(p.add(4)), load::<ALIGNED>(p.add(8)))
}

#[inline(always)]
unsafe fn store_xyz4<const ALIGNED: bool>(p: *mut f32, soa: [__m128; 3]) {
    let [a, b, c] = interleave3(soa);
    store::<ALIGNED>(p, a);
    store::<ALIGNED>(p.add(4), b);
    store::<ALIGNED>(p.add(8), c);
}

/// Four vertices per iteration over packed `xyz` streams. `range` must be
/// a multiple of four long.
#[target_feature(enable = "sse2")]
unsafe fn skin_packed_separate<const ALIGNED: bool>(
    pass: &Pass,
    input: &SkinningInput<'_>,
    matrices: &[Mat4],
    range: Range<usize>,
) {
    for vertex in range.step_by(4) {
        let m = blend_columns_x4(input, matrices, vertex);

        let positions = load_xyz4::<ALIGNED>(pass.positions.add(vertex * 3));
        store_xyz4::<ALIGNED>(pass.output.positions.add(vertex * 3), soa_point(&m, positions));

        if let (Some((source, _)), Some((target, _))) = (pass.normals, pass.output.normals) {
            let normals = load_xyz4::<ALIGNED>(source.add(vertex * 3));
            store_xyz4::<ALIGNED>(
                target.add(vertex * 3),
                soa_normalize(soa_vector(&m, normals)),
            );
        }
    }
}

/// Four vertices per iteration over interleaved `xyz nx ny nz` records.
/// Each pair of vertices spans three vectors; deinterleaving a pair yields
/// lanes `[p0 n0 p1 n1]`, which are then split into position and normal
/// lanes across both pairs.
#[target_feature(enable = "sse2")]
unsafe fn skin_packed_interleaved<const ALIGNED: bool>(
    pass: &Pass,
    input: &SkinningInput<'_>,
    matrices: &[Mat4],
    range: Range<usize>,
) {
    for vertex in range.step_by(4) {
        let m = blend_columns_x4(input, matrices, vertex);

        let source = pass.positions.add(vertex * 6);
        let first = load_xyz4::<ALIGNED>(source);
        let second = load_xyz4::<ALIGNED>(source.add(12));

        let mut positions = [_mm_setzero_ps(); 3];
        let mut normals = [_mm_setzero_ps(); 3];
        for axis in 0..3 {
            positions[axis] =
                _mm_shuffle_ps::<{ mm_shuffle(2, 0, 2, 0) }>(first[axis], second[axis]);
            normals[axis] =
                _mm_shuffle_ps::<{ mm_shuffle(3, 1, 3, 1) }>(first[axis], second[axis]);
        }

        let positions = soa_point(&m, positions);
        let normals = soa_normalize(soa_vector(&m, normals));

        let mut first = [_mm_setzero_ps(); 3];
        let mut second = [_mm_setzero_ps(); 3];
        for axis in 0..3 {
            first[axis] = _mm_unpacklo_ps(positions[axis], normals[axis]);
            second[axis] = _mm_unpackhi_ps(positions[axis], normals[axis]);
        }

        let target = pass.output.positions.add(vertex * 6);
        store_xyz4::<ALIGNED>(target, first);
        store_xyz4::<ALIGNED>(target.add(12), second);
    }
}
