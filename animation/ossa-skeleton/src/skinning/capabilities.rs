//! Vertex layout descriptors and the software/hardware skinning decision
//!
//! Vertex buffers are owned by the renderer. A [`VertexLayout`] describes
//! where each stream lives inside them so the kernel can read the buffers in
//! place, and a [`SkinningCapabilities`] implementation reports whether the
//! renderer could skin on the GPU instead.

use super::{IndexStream, Stream};
use crate::error::{Result, SkeletonError};
use log::debug;

/// What a vertex element holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexElementSemantic {
    Position,
    Normal,
    BlendWeights,
    BlendIndices,
    Diffuse,
    TextureCoordinates,
}

/// Storage type of a vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexElementType {
    Float1,
    Float2,
    Float3,
    Float4,
    UByte4,
}

impl VertexElementType {
    /// Size in bytes
    pub const fn size(self) -> usize {
        match self {
            Self::Float1 | Self::UByte4 => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }

    /// Number of components
    pub const fn count(self) -> usize {
        match self {
            Self::Float1 => 1,
            Self::Float2 => 2,
            Self::Float3 => 3,
            Self::Float4 | Self::UByte4 => 4,
        }
    }

    pub const fn is_float(self) -> bool {
        !matches!(self, Self::UByte4)
    }
}

/// One element of a vertex declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexElement {
    /// Buffer binding the element is read from
    pub source: u16,
    /// Byte offset inside one vertex of that buffer
    pub offset: usize,
    pub element_type: VertexElementType,
    pub semantic: VertexElementSemantic,
}

/// Vertex declaration: the elements of every bound buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexLayout {
    elements: Vec<VertexElement>,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element.
    pub fn add_element(
        &mut self,
        source: u16,
        offset: usize,
        element_type: VertexElementType,
        semantic: VertexElementSemantic,
    ) -> &mut Self {
        self.elements.push(VertexElement {
            source,
            offset,
            element_type,
            semantic,
        });
        self
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    pub fn find(&self, semantic: VertexElementSemantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }

    /// Size in bytes of one vertex in buffer `source`.
    pub fn vertex_size(&self, source: u16) -> usize {
        self.elements
            .iter()
            .filter(|e| e.source == source)
            .map(|e| e.offset + e.element_type.size())
            .max()
            .unwrap_or(0)
    }

    pub fn has_normals(&self) -> bool {
        self.find(VertexElementSemantic::Normal).is_some()
    }

    /// Bone influences per vertex, 0 when the layout is not skinned.
    pub fn weights_per_vertex(&self) -> usize {
        self.find(VertexElementSemantic::BlendWeights)
            .map_or(0, |e| e.element_type.count())
    }

    /// A float stream over `data`, the contents of the buffer the element
    /// with `semantic` lives in.
    pub fn float_stream<'a>(
        &self,
        semantic: VertexElementSemantic,
        data: &'a [f32],
    ) -> Result<Stream<'a>> {
        let element = self.element(semantic)?;
        if !element.element_type.is_float() {
            return Err(SkeletonError::invalid_argument(format!(
                "{semantic:?} is stored as {:?}, not floats",
                element.element_type
            )));
        }
        let stride = self.vertex_size(element.source);
        if element.offset % 4 != 0 || stride % 4 != 0 {
            return Err(SkeletonError::invalid_argument(format!(
                "{semantic:?} is not aligned to whole floats"
            )));
        }
        Ok(Stream::new(data, element.offset / 4, stride / 4))
    }

    /// A byte stream over the buffer holding the blend indices.
    pub fn index_stream<'a>(&self, data: &'a [u8]) -> Result<IndexStream<'a>> {
        let element = self.element(VertexElementSemantic::BlendIndices)?;
        if element.element_type != VertexElementType::UByte4 {
            return Err(SkeletonError::invalid_argument(format!(
                "blend indices must be UByte4, found {:?}",
                element.element_type
            )));
        }
        Ok(IndexStream::new(
            data,
            element.offset,
            self.vertex_size(element.source),
        ))
    }

    fn element(&self, semantic: VertexElementSemantic) -> Result<&VertexElement> {
        self.find(semantic)
            .ok_or_else(|| SkeletonError::not_found(format!("vertex element {semantic:?}")))
    }
}

/// What the renderer can do on the GPU.
pub trait SkinningCapabilities {
    fn supports_hardware_skinning(&self) -> bool;

    /// Bone matrices a single hardware draw can bind
    fn max_hardware_bones(&self) -> usize;

    fn max_hardware_weights(&self) -> usize {
        4
    }
}

/// Renderer without GPU skinning.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareOnly;

impl SkinningCapabilities for SoftwareOnly {
    fn supports_hardware_skinning(&self) -> bool {
        false
    }

    fn max_hardware_bones(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkinningMode {
    Software,
    Hardware,
}

/// Hardware skinning when the renderer supports it and the mesh fits its
/// limits, software otherwise.
pub fn choose_skinning_mode(
    capabilities: &impl SkinningCapabilities,
    layout: &VertexLayout,
    bone_count: usize,
) -> SkinningMode {
    let weights = layout.weights_per_vertex();
    let mode = if capabilities.supports_hardware_skinning()
        && bone_count <= capabilities.max_hardware_bones()
        && weights <= capabilities.max_hardware_weights()
    {
        SkinningMode::Hardware
    } else {
        SkinningMode::Software
    };
    debug!("{bone_count} bones with {weights} weights per vertex: {mode:?} skinning");
    mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skinning::{
        SkinningInput, SkinningOutput, SkinningStrategy, StreamMut, skin_vertices,
    };
    use glam::{Mat4, Vec3};

    struct Gpu {
        bones: usize,
    }

    impl SkinningCapabilities for Gpu {
        fn supports_hardware_skinning(&self) -> bool {
            true
        }

        fn max_hardware_bones(&self) -> usize {
            self.bones
        }
    }

    fn interleaved_layout() -> VertexLayout {
        let mut layout = VertexLayout::new();
        layout
            .add_element(0, 0, VertexElementType::Float3, VertexElementSemantic::Position)
            .add_element(0, 12, VertexElementType::Float3, VertexElementSemantic::Normal)
            .add_element(0, 24, VertexElementType::Float2, VertexElementSemantic::TextureCoordinates)
            .add_element(1, 0, VertexElementType::Float2, VertexElementSemantic::BlendWeights)
            .add_element(1, 8, VertexElementType::UByte4, VertexElementSemantic::BlendIndices);
        layout
    }

    #[test]
    fn test_layout_queries() {
        let layout = interleaved_layout();
        assert_eq!(layout.vertex_size(0), 32);
        assert_eq!(layout.vertex_size(1), 12);
        assert_eq!(layout.weights_per_vertex(), 2);
        assert!(layout.has_normals());
        assert!(VertexLayout::new().find(VertexElementSemantic::Position).is_none());
    }

    #[test]
    fn test_streams_read_buffers_in_place() {
        let layout = interleaved_layout();
        // two vertices: position, normal, uv
        let geometry = [
            1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.5, 0.5, //
            0.0, 2.0, 0.0, 1.0, 0.0, 0.0, 0.5, 0.5,
        ];
        // buffer 1 viewed once as floats for the weights and once as bytes
        // for the indices
        let weights = [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0];
        let indices = [
            0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
            0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0,
        ];

        let input = SkinningInput {
            positions: layout
                .float_stream(VertexElementSemantic::Position, &geometry)
                .unwrap(),
            normals: Some(
                layout
                    .float_stream(VertexElementSemantic::Normal, &geometry)
                    .unwrap(),
            ),
            blend_weights: layout
                .float_stream(VertexElementSemantic::BlendWeights, &weights)
                .unwrap(),
            blend_indices: layout.index_stream(&indices).unwrap(),
            weights_per_vertex: layout.weights_per_vertex(),
            vertex_count: 2,
        };
        assert_eq!(input.positions.stride(), 8);
        assert_eq!(input.normals.unwrap().offset(), 3);

        let matrices = [Mat4::IDENTITY, Mat4::from_translation(Vec3::Z)];
        let mut out = [0.0f32; 6];
        let mut output = SkinningOutput::Positions(StreamMut::packed(&mut out, 3));
        skin_vertices(SkinningStrategy::Portable, &input, &mut output, &matrices);
        assert_eq!(out, [1.0, 0.0, 0.0, 0.0, 2.0, 1.0]);
    }

    #[test]
    fn test_stream_type_mismatch() {
        let layout = interleaved_layout();
        assert!(matches!(
            layout.float_stream(VertexElementSemantic::BlendIndices, &[]),
            Err(SkeletonError::InvalidArgument(_))
        ));
        assert!(matches!(
            layout.float_stream(VertexElementSemantic::Diffuse, &[]),
            Err(SkeletonError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_choose_skinning_mode() {
        let layout = interleaved_layout();
        assert_eq!(
            choose_skinning_mode(&SoftwareOnly, &layout, 10),
            SkinningMode::Software
        );
        assert_eq!(
            choose_skinning_mode(&Gpu { bones: 60 }, &layout, 10),
            SkinningMode::Hardware
        );
        assert_eq!(
            choose_skinning_mode(&Gpu { bones: 60 }, &layout, 61),
            SkinningMode::Software
        );
    }
}
