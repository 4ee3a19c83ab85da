//! Software vertex skinning with runtime-selected vector paths
//!
//! The kernel blends bind-pose positions (and optionally normals) by the
//! bone matrices each vertex references:
//!
//! - position: `Σ weight · (matrix × position)`
//! - normal: `Σ weight · (matrix 3x3 × normal)`, then normalised
//!
//! Zero weights are skipped. Weights are used as given; normalising them is
//! the content pipeline's job (or [`SkinningOptions::normalize_weights`] when
//! building a [`SkinningMesh`]).
//!
//! ## Strategies
//!
//! - **Portable**: plain Rust, always available, reference behaviour
//! - **Sse**: SSE2 on x86-64, with packed paths for tightly packed buffers
//! - **Neon**: NEON on ARM64
//!
//! [`SkinningStrategy::global`] picks the best strategy once per process.
//! Every strategy agrees with the portable path within float tolerance.
//!
//! ## Example
//!
//! ```
//! use ossa_skeleton::skinning::{
//!     IndexStream, SkinningInput, SkinningOutput, SkinningStrategy, Stream, StreamMut,
//!     skin_vertices,
//! };
//! use glam::{Mat4, Vec3};
//!
//! let positions = [0.0f32, 0.0, 0.0];
//! let weights = [0.5f32, 0.5];
//! let indices = [0u8, 1];
//! let matrices = [
//!     Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
//!     Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0)),
//! ];
//!
//! let input = SkinningInput {
//!     positions: Stream::packed(&positions, 3),
//!     normals: None,
//!     blend_weights: Stream::packed(&weights, 2),
//!     blend_indices: IndexStream::packed(&indices, 2),
//!     weights_per_vertex: 2,
//!     vertex_count: 1,
//! };
//! let mut out = [0.0f32; 3];
//! let mut output = SkinningOutput::Positions(StreamMut::packed(&mut out, 3));
//! skin_vertices(SkinningStrategy::global(), &input, &mut output, &matrices);
//! assert_eq!(out, [2.0, 0.0, 0.0]);
//! ```

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "x86_64")]
mod x86_64;

pub mod capabilities;
mod dispatch;
pub mod scalar;
mod skinner;

pub use capabilities::{
    SkinningCapabilities, SkinningMode, SoftwareOnly, VertexElement, VertexElementSemantic,
    VertexElementType, VertexLayout, choose_skinning_mode,
};
pub use dispatch::{CpuFeatures, SkinningStrategy, detect_cpu_features};
pub use skinner::{SkinVertex, Skinner, SkinningMesh, SkinningOptions};

use crate::error::{Result, SkeletonError};
use glam::{Mat4, Vec3};

/// Vector paths only switch to the packed four-vertex loop above this count.
pub const PACKED_VERTEX_THRESHOLD: usize = 16;

/// Strided view of `f32` vertex data. Offset and stride count floats.
#[derive(Debug, Clone, Copy)]
pub struct Stream<'a> {
    data: &'a [f32],
    offset: usize,
    stride: usize,
}

impl<'a> Stream<'a> {
    pub fn new(data: &'a [f32], offset: usize, stride: usize) -> Self {
        Self {
            data,
            offset,
            stride,
        }
    }

    /// Tightly packed elements of `components` floats each.
    pub fn packed(data: &'a [f32], components: usize) -> Self {
        Self::new(data, 0, components)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub(crate) fn get(&self, vertex: usize, component: usize) -> f32 {
        self.data[self.offset + vertex * self.stride + component]
    }

    #[inline]
    pub(crate) fn vec3(&self, vertex: usize) -> Vec3 {
        let i = self.offset + vertex * self.stride;
        Vec3::new(self.data[i], self.data[i + 1], self.data[i + 2])
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const f32 {
        self.data.as_ptr().wrapping_add(self.offset)
    }

    fn covers(&self, count: usize, components: usize) -> bool {
        covers(self.data.len(), self.offset, self.stride, count, components)
    }
}

/// Mutable strided view of `f32` vertex data.
#[derive(Debug)]
pub struct StreamMut<'a> {
    data: &'a mut [f32],
    offset: usize,
    stride: usize,
}

impl<'a> StreamMut<'a> {
    pub fn new(data: &'a mut [f32], offset: usize, stride: usize) -> Self {
        Self {
            data,
            offset,
            stride,
        }
    }

    pub fn packed(data: &'a mut [f32], components: usize) -> Self {
        Self::new(data, 0, components)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    fn set_vec3(&mut self, vertex: usize, value: Vec3, extra: usize) {
        let i = self.offset + vertex * self.stride + extra;
        self.data[i..i + 3].copy_from_slice(&value.to_array());
    }

    #[inline]
    fn as_mut_ptr(&mut self) -> *mut f32 {
        self.data.as_mut_ptr().wrapping_add(self.offset)
    }

    fn covers(&self, count: usize, components: usize) -> bool {
        covers(self.data.len(), self.offset, self.stride, count, components)
    }
}

/// Strided view of per-vertex bone indices.
#[derive(Debug, Clone, Copy)]
pub struct IndexStream<'a> {
    data: &'a [u8],
    offset: usize,
    stride: usize,
}

impl<'a> IndexStream<'a> {
    pub fn new(data: &'a [u8], offset: usize, stride: usize) -> Self {
        Self {
            data,
            offset,
            stride,
        }
    }

    pub fn packed(data: &'a [u8], components: usize) -> Self {
        Self::new(data, 0, components)
    }

    #[inline]
    pub(crate) fn get(&self, vertex: usize, component: usize) -> usize {
        usize::from(self.data[self.offset + vertex * self.stride + component])
    }

    fn covers(&self, count: usize, components: usize) -> bool {
        covers(self.data.len(), self.offset, self.stride, count, components)
    }
}

fn covers(len: usize, offset: usize, stride: usize, count: usize, components: usize) -> bool {
    if count == 0 {
        return true;
    }
    (count - 1)
        .checked_mul(stride)
        .and_then(|span| span.checked_add(offset))
        .and_then(|start| start.checked_add(components))
        .is_some_and(|end| end <= len)
}

/// Source buffers for one skinning pass.
#[derive(Debug, Clone, Copy)]
pub struct SkinningInput<'a> {
    pub positions: Stream<'a>,
    pub normals: Option<Stream<'a>>,
    pub blend_weights: Stream<'a>,
    pub blend_indices: IndexStream<'a>,
    pub weights_per_vertex: usize,
    pub vertex_count: usize,
}

/// Destination buffers for one skinning pass.
#[derive(Debug)]
pub enum SkinningOutput<'a> {
    /// Positions only; source normals are ignored.
    Positions(StreamMut<'a>),
    /// Positions and normals in separate buffers.
    Separate {
        positions: StreamMut<'a>,
        normals: StreamMut<'a>,
    },
    /// Position and normal in one buffer, normal three floats after the
    /// position.
    Interleaved(StreamMut<'a>),
}

impl SkinningOutput<'_> {
    pub(crate) fn has_normals(&self) -> bool {
        !matches!(self, Self::Positions(_))
    }

    #[inline]
    pub(crate) fn write_position(&mut self, vertex: usize, position: Vec3) {
        match self {
            Self::Positions(stream) | Self::Interleaved(stream) => {
                stream.set_vec3(vertex, position, 0);
            }
            Self::Separate { positions, .. } => positions.set_vec3(vertex, position, 0),
        }
    }

    #[inline]
    pub(crate) fn write_normal(&mut self, vertex: usize, normal: Vec3) {
        match self {
            Self::Positions(_) => {}
            Self::Separate { normals, .. } => normals.set_vec3(vertex, normal, 0),
            Self::Interleaved(stream) => stream.set_vec3(vertex, normal, 3),
        }
    }

    /// Raw destination pointers and strides. Valid while `self` is
    /// mutably borrowed and only within the checked vertex range.
    pub(crate) fn raw(&mut self) -> RawOutput {
        match self {
            Self::Positions(stream) => RawOutput {
                positions: stream.as_mut_ptr(),
                position_stride: stream.stride,
                normals: None,
            },
            Self::Separate { positions, normals } => RawOutput {
                positions: positions.as_mut_ptr(),
                position_stride: positions.stride,
                normals: Some((normals.as_mut_ptr(), normals.stride)),
            },
            Self::Interleaved(stream) => {
                let base = stream.as_mut_ptr();
                RawOutput {
                    positions: base,
                    position_stride: stream.stride,
                    normals: Some((base.wrapping_add(3), stream.stride)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RawOutput {
    pub positions: *mut f32,
    pub position_stride: usize,
    pub normals: Option<(*mut f32, usize)>,
}

/// How the position and normal data of a pass are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutClass {
    /// Only positions are skinned.
    PositionOnly,
    /// Positions and normals live in separate streams.
    SeparateBuffers,
    /// Each vertex stores its normal right after its position.
    Interleaved,
}

impl LayoutClass {
    pub fn classify(input: &SkinningInput<'_>, output: &SkinningOutput<'_>) -> Self {
        let Some(normals) = input.normals.filter(|_| output.has_normals()) else {
            return Self::PositionOnly;
        };
        let source_interleaved = std::ptr::eq(normals.data, input.positions.data)
            && normals.offset == input.positions.offset + 3
            && normals.stride == input.positions.stride;
        match output {
            SkinningOutput::Interleaved(_) if source_interleaved => Self::Interleaved,
            _ => Self::SeparateBuffers,
        }
    }

    /// Whether the pass can run the packed four-vertex loops: every position
    /// and normal stream is tightly packed and there are enough vertices.
    pub fn is_packed(self, input: &SkinningInput<'_>, output: &SkinningOutput<'_>) -> bool {
        if input.vertex_count <= PACKED_VERTEX_THRESHOLD {
            return false;
        }
        match (self, output) {
            (Self::PositionOnly, SkinningOutput::Positions(out))
            | (Self::PositionOnly, SkinningOutput::Separate { positions: out, .. }) => {
                input.positions.stride == 3 && out.stride == 3
            }
            (Self::PositionOnly, SkinningOutput::Interleaved(_)) => false,
            (Self::SeparateBuffers, SkinningOutput::Separate { positions, normals }) => {
                input.positions.stride == 3
                    && input.normals.is_some_and(|n| n.stride == 3)
                    && positions.stride == 3
                    && normals.stride == 3
            }
            (Self::Interleaved, SkinningOutput::Interleaved(out)) => {
                input.positions.stride == 6 && out.stride == 6
            }
            _ => false,
        }
    }
}

/// Check that every stream holds `vertex_count` elements, so a pass cannot
/// read or write out of bounds.
pub fn check_buffers(input: &SkinningInput<'_>, output: &SkinningOutput<'_>) -> Result<()> {
    let count = input.vertex_count;
    let fail = |what: &str| {
        Err(SkeletonError::invalid_argument(format!(
            "{what} buffer too small for {count} vertices"
        )))
    };

    if !input.positions.covers(count, 3) {
        return fail("source position");
    }
    if input.normals.is_some_and(|n| !n.covers(count, 3)) {
        return fail("source normal");
    }
    if !input.blend_weights.covers(count, input.weights_per_vertex) {
        return fail("blend weight");
    }
    if !input.blend_indices.covers(count, input.weights_per_vertex) {
        return fail("blend index");
    }
    match output {
        SkinningOutput::Positions(positions) if !positions.covers(count, 3) => {
            fail("destination position")
        }
        SkinningOutput::Separate { positions, normals } => {
            if !positions.covers(count, 3) {
                fail("destination position")
            } else if !normals.covers(count, 3) {
                fail("destination normal")
            } else {
                Ok(())
            }
        }
        SkinningOutput::Interleaved(stream) if stream.stride < 6 || !stream.covers(count, 6) => {
            fail("destination interleaved")
        }
        _ => Ok(()),
    }
}

/// Skin `input` into `output` with `strategy`.
///
/// Bone indices must be below `matrices.len()`.
///
/// # Panics
///
/// Panics if a buffer is too small for `input.vertex_count` vertices (see
/// [`check_buffers`]) or a bone index is out of range.
pub fn skin_vertices(
    strategy: SkinningStrategy,
    input: &SkinningInput<'_>,
    output: &mut SkinningOutput<'_>,
    matrices: &[Mat4],
) {
    if let Err(err) = check_buffers(input, output) {
        panic!("skinning buffers do not match the vertex count: {err}");
    }
    strategy.run(input, output, matrices);
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn single_vertex(weights: &[f32], indices: &[u8], matrices: &[Mat4]) -> [f32; 3] {
        let positions = [0.0f32; 3];
        let input = SkinningInput {
            positions: Stream::packed(&positions, 3),
            normals: None,
            blend_weights: Stream::packed(weights, weights.len()),
            blend_indices: IndexStream::packed(indices, indices.len()),
            weights_per_vertex: weights.len(),
            vertex_count: 1,
        };
        let mut out = [f32::NAN; 3];
        let mut output = SkinningOutput::Positions(StreamMut::packed(&mut out, 3));
        skin_vertices(SkinningStrategy::global(), &input, &mut output, matrices);
        out
    }

    #[test]
    fn test_identity_leaves_vertex_alone() {
        assert_eq!(single_vertex(&[1.0], &[0], &[Mat4::IDENTITY]), [0.0; 3]);
    }

    #[test]
    fn test_two_bone_blend() {
        let matrices = [
            Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0)),
        ];
        assert_eq!(single_vertex(&[0.5, 0.5], &[0, 1], &matrices), [2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_weight_skips_bad_index() {
        // index 9 would panic if the zero weight were not skipped
        let out = single_vertex(&[1.0, 0.0], &[0, 9], &[Mat4::from_translation(Vec3::Y)]);
        assert_eq!(out, [0.0, 1.0, 0.0]);
    }

    #[test_case(0, 3, 0, true ; "empty")]
    #[test_case(6, 3, 2, true ; "exact")]
    #[test_case(5, 3, 2, false ; "short")]
    fn test_covers(len: usize, stride: usize, count: usize, expected: bool) {
        assert_eq!(covers(len, 0, stride, count, 3), expected);
    }

    #[test]
    fn test_check_buffers_reports_short_output() {
        let positions = [0.0f32; 6];
        let weights = [1.0f32; 2];
        let indices = [0u8; 2];
        let input = SkinningInput {
            positions: Stream::packed(&positions, 3),
            normals: None,
            blend_weights: Stream::packed(&weights, 1),
            blend_indices: IndexStream::packed(&indices, 1),
            weights_per_vertex: 1,
            vertex_count: 2,
        };
        let mut out = [0.0f32; 5];
        let output = SkinningOutput::Positions(StreamMut::packed(&mut out, 3));
        assert!(matches!(
            check_buffers(&input, &output),
            Err(SkeletonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_layout_classification() {
        let interleaved = [0.0f32; 6 * 20];
        let weights = [1.0f32; 20];
        let indices = [0u8; 20];
        let input = SkinningInput {
            positions: Stream::new(&interleaved, 0, 6),
            normals: Some(Stream::new(&interleaved, 3, 6)),
            blend_weights: Stream::packed(&weights, 1),
            blend_indices: IndexStream::packed(&indices, 1),
            weights_per_vertex: 1,
            vertex_count: 20,
        };

        let mut out = [0.0f32; 6 * 20];
        let output = SkinningOutput::Interleaved(StreamMut::packed(&mut out, 6));
        let class = LayoutClass::classify(&input, &output);
        assert_eq!(class, LayoutClass::Interleaved);
        assert!(class.is_packed(&input, &output));

        let mut pos = [0.0f32; 3 * 20];
        let output = SkinningOutput::Positions(StreamMut::packed(&mut pos, 3));
        let class = LayoutClass::classify(&input, &output);
        assert_eq!(class, LayoutClass::PositionOnly);
        // source positions are strided by 6
        assert!(!class.is_packed(&input, &output));
    }
}
