//! Owned-buffer skinning on top of the strided kernel

use super::{
    IndexStream, SkinningInput, SkinningOutput, SkinningStrategy, Stream, StreamMut,
    detect_cpu_features, skin_vertices,
};
use crate::error::{Result, SkeletonError};
use crate::frame::{Frame, FrameCache};
use glam::{Mat4, Vec3};
use log::{debug, trace, warn};

/// Influences stored per vertex by [`SkinningMesh`].
pub const INFLUENCES_PER_VERTEX: usize = 4;

/// How a [`SkinningMesh`] packs its influences and which kernel skins it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinningOptions {
    /// Rescale each vertex's surviving influences to sum to one while
    /// packing.
    pub normalize_weights: bool,
    /// Influences lighter than this are zeroed at pack time and do not count
    /// toward [`SkinningMesh::max_bone_index`].
    pub weight_threshold: f32,
    /// Strategy to run; `None` uses [`SkinningStrategy::global`]
    pub strategy: Option<SkinningStrategy>,
}

impl Default for SkinningOptions {
    fn default() -> Self {
        Self {
            normalize_weights: true,
            weight_threshold: 0.001,
            strategy: None,
        }
    }
}

/// A bind-pose vertex with up to four bone influences
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub bone_indices: [u8; 4],
    pub bone_weights: [f32; 4],
}

impl SkinVertex {
    /// A vertex bound fully to one bone.
    pub fn rigid(position: Vec3, normal: Vec3, bone: u8) -> Self {
        Self {
            position,
            normal,
            bone_indices: [bone, 0, 0, 0],
            bone_weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Bind-pose vertex data packed into the streams the kernel reads.
#[derive(Debug, Clone, Default)]
pub struct SkinningMesh {
    positions: Vec<f32>,
    normals: Vec<f32>,
    weights: Vec<f32>,
    indices: Vec<u8>,
    max_bone_index: Option<usize>,
}

impl SkinningMesh {
    pub fn new(vertices: &[SkinVertex], options: &SkinningOptions) -> Self {
        let mut mesh = Self {
            positions: Vec::with_capacity(vertices.len() * 3),
            normals: Vec::with_capacity(vertices.len() * 3),
            weights: Vec::with_capacity(vertices.len() * INFLUENCES_PER_VERTEX),
            indices: Vec::with_capacity(vertices.len() * INFLUENCES_PER_VERTEX),
            max_bone_index: None,
        };

        for vertex in vertices {
            mesh.positions.extend_from_slice(&vertex.position.to_array());
            mesh.normals.extend_from_slice(&vertex.normal.to_array());

            let mut weights = vertex.bone_weights.map(|w| {
                if w < options.weight_threshold {
                    0.0
                } else {
                    w
                }
            });
            let total: f32 = weights.iter().sum();
            if options.normalize_weights && total > 0.0 {
                for weight in &mut weights {
                    *weight /= total;
                }
            }

            for (weight, index) in weights.iter().zip(vertex.bone_indices) {
                if *weight > 0.0 {
                    let index = usize::from(index);
                    mesh.max_bone_index = Some(mesh.max_bone_index.map_or(index, |m| m.max(index)));
                }
            }
            mesh.weights.extend_from_slice(&weights);
            mesh.indices.extend_from_slice(&vertex.bone_indices);
        }

        mesh
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Highest bone index carrying a non-zero weight.
    pub fn max_bone_index(&self) -> Option<usize> {
        self.max_bone_index
    }

    /// Weights of `vertex` after thresholding and normalization.
    pub fn weights(&self, vertex: usize) -> Option<&[f32]> {
        let start = vertex * INFLUENCES_PER_VERTEX;
        self.weights.get(start..start + INFLUENCES_PER_VERTEX)
    }

    pub fn input(&self) -> SkinningInput<'_> {
        SkinningInput {
            positions: Stream::packed(&self.positions, 3),
            normals: Some(Stream::packed(&self.normals, 3)),
            blend_weights: Stream::packed(&self.weights, INFLUENCES_PER_VERTEX),
            blend_indices: IndexStream::packed(&self.indices, INFLUENCES_PER_VERTEX),
            weights_per_vertex: INFLUENCES_PER_VERTEX,
            vertex_count: self.vertex_count(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SkinnedBuffers {
    positions: Vec<f32>,
    normals: Vec<f32>,
}

/// Skins one mesh into owned buffers, at most once per frame.
#[derive(Debug, Clone)]
pub struct Skinner {
    mesh: SkinningMesh,
    strategy: SkinningStrategy,
    output: FrameCache<SkinnedBuffers>,
}

impl Skinner {
    pub fn new(vertices: &[SkinVertex], options: SkinningOptions) -> Self {
        let mesh = SkinningMesh::new(vertices, &options);
        let strategy = match options.strategy {
            Some(strategy) if strategy.is_supported(&detect_cpu_features()) => strategy,
            Some(strategy) => {
                warn!("skinning strategy {strategy} is not supported here, using the global one");
                SkinningStrategy::global()
            }
            None => SkinningStrategy::global(),
        };
        debug!(
            "skinner for {} vertices using {strategy}",
            mesh.vertex_count()
        );

        let output = FrameCache::new(SkinnedBuffers {
            positions: mesh.positions.clone(),
            normals: mesh.normals.clone(),
        });
        Self {
            mesh,
            strategy,
            output,
        }
    }

    pub fn mesh(&self) -> &SkinningMesh {
        &self.mesh
    }

    pub fn strategy(&self) -> SkinningStrategy {
        self.strategy
    }

    /// Skin the mesh with `matrices` unless this frame was already skinned.
    /// Returns whether the buffers were rebuilt.
    pub fn update(&mut self, frame: Frame, matrices: &[Mat4]) -> Result<bool> {
        if let Some(max) = self.mesh.max_bone_index
            && max >= matrices.len()
        {
            return Err(SkeletonError::invalid_argument(format!(
                "mesh references bone matrix {max} but only {} were supplied",
                matrices.len()
            )));
        }

        let mesh = &self.mesh;
        let strategy = self.strategy;
        let (_, refreshed) = self.output.get_or_refresh(frame, |buffers| {
            let input = mesh.input();
            let mut output = SkinningOutput::Separate {
                positions: StreamMut::packed(&mut buffers.positions, 3),
                normals: StreamMut::packed(&mut buffers.normals, 3),
            };
            skin_vertices(strategy, &input, &mut output, matrices);
        });
        if refreshed {
            trace!(
                "skinned {} vertices for frame {}",
                mesh.vertex_count(),
                frame.number()
            );
        }
        Ok(refreshed)
    }

    /// Skinned positions, packed `xyz`.
    pub fn positions(&self) -> &[f32] {
        &self.output.value().positions
    }

    /// Skinned, normalized normals, packed `xyz`.
    pub fn normals(&self) -> &[f32] {
        &self.output.value().normals
    }

    pub fn position(&self, vertex: usize) -> Option<Vec3> {
        let start = vertex * 3;
        self.positions()
            .get(start..start + 3)
            .map(Vec3::from_slice)
    }

    pub fn normal(&self, vertex: usize) -> Option<Vec3> {
        let start = vertex * 3;
        self.normals().get(start..start + 3).map(Vec3::from_slice)
    }

    pub fn frame(&self) -> Option<Frame> {
        self.output.frame()
    }

    /// Force the next `update` to skin again.
    pub fn invalidate(&mut self) {
        self.output.invalidate();
    }
}
