//! Every available skinning strategy against the portable path

use glam::{Mat4, Quat, Vec3};
use ossa_skeleton::skinning::{
    IndexStream, SkinningInput, SkinningOutput, SkinningStrategy, Stream, StreamMut,
    detect_cpu_features, skin_vertices,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_case::test_case;

mod common;

const EPSILON: f32 = 1e-4;
const BONES: usize = 8;
const WEIGHTS: usize = 4;

/// Source buffers for one random mesh.
struct Mesh {
    geometry: Vec<f32>,
    /// Floats per vertex in `geometry`; normals start 3 floats in.
    stride: usize,
    weights: Vec<f32>,
    indices: Vec<u8>,
    matrices: Vec<Mat4>,
    count: usize,
}

impl Mesh {
    fn random(seed: u64, count: usize, stride: usize) -> Self {
        common::init_logging();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut geometry: Vec<f32> = (0..count * stride + 1)
            .map(|_| rng.random_range(-5.0..5.0))
            .collect();
        // keep normals non-degenerate
        for vertex in 0..count {
            geometry[vertex * stride + 3] += 10.0;
        }

        let mut weights = Vec::with_capacity(count * WEIGHTS);
        let mut indices = Vec::with_capacity(count * WEIGHTS);
        for _ in 0..count {
            let raw: [f32; WEIGHTS] = std::array::from_fn(|i| {
                // every other vertex drops an influence to exercise the zero skip
                if i == 3 && rng.random_bool(0.5) {
                    0.0
                } else {
                    rng.random_range(0.0..1.0)
                }
            });
            let total: f32 = raw.iter().sum::<f32>().max(f32::EPSILON);
            weights.extend(raw.iter().map(|w| w / total));
            indices.extend((0..WEIGHTS).map(|_| rng.random_range(0..BONES as u8)));
        }

        let matrices = (0..BONES)
            .map(|_| {
                let axis = Vec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(0.1..1.0),
                )
                .normalize();
                Mat4::from_scale_rotation_translation(
                    Vec3::splat(rng.random_range(0.5..2.0)),
                    Quat::from_axis_angle(axis, rng.random_range(-3.0..3.0)),
                    Vec3::new(
                        rng.random_range(-3.0..3.0),
                        rng.random_range(-3.0..3.0),
                        rng.random_range(-3.0..3.0),
                    ),
                )
            })
            .collect();

        Self {
            geometry,
            stride,
            weights,
            indices,
            matrices,
            count,
        }
    }

    /// Input reading from `shift` floats into the geometry buffer, which
    /// moves the streams off their natural alignment.
    fn input(&self, shift: usize) -> SkinningInput<'_> {
        let data = &self.geometry[shift..];
        SkinningInput {
            positions: Stream::new(data, 0, self.stride),
            normals: Some(Stream::new(data, 3, self.stride)),
            blend_weights: Stream::packed(&self.weights, WEIGHTS),
            blend_indices: IndexStream::packed(&self.indices, WEIGHTS),
            weights_per_vertex: WEIGHTS,
            vertex_count: self.count,
        }
    }
}

/// Positions and normals produced by `strategy`, packed.
fn run_separate(strategy: SkinningStrategy, input: &SkinningInput<'_>, matrices: &[Mat4]) -> (Vec<f32>, Vec<f32>) {
    let mut positions = vec![0.0f32; input.vertex_count * 3];
    let mut normals = vec![0.0f32; input.vertex_count * 3];
    let mut output = SkinningOutput::Separate {
        positions: StreamMut::packed(&mut positions, 3),
        normals: StreamMut::packed(&mut normals, 3),
    };
    skin_vertices(strategy, input, &mut output, matrices);
    (positions, normals)
}

fn run_positions(strategy: SkinningStrategy, input: &SkinningInput<'_>, matrices: &[Mat4]) -> Vec<f32> {
    let mut positions = vec![0.0f32; input.vertex_count * 3];
    let mut output = SkinningOutput::Positions(StreamMut::packed(&mut positions, 3));
    skin_vertices(strategy, input, &mut output, matrices);
    positions
}

fn run_interleaved(strategy: SkinningStrategy, input: &SkinningInput<'_>, matrices: &[Mat4], stride: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; input.vertex_count * stride];
    let mut output = SkinningOutput::Interleaved(StreamMut::new(&mut out, 0, stride));
    skin_vertices(strategy, input, &mut output, matrices);
    out
}

fn assert_close(expected: &[f32], actual: &[f32], what: &str) {
    assert_eq!(expected.len(), actual.len());
    for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
        let tolerance = EPSILON * e.abs().max(1.0);
        assert!((e - a).abs() <= tolerance, "{what}[{i}]: expected {e}, got {a}");
    }
}

fn strategies() -> Vec<SkinningStrategy> {
    SkinningStrategy::available(&detect_cpu_features())
}

#[test_case(5, 6, 0 ; "few vertices interleaved source")]
#[test_case(17, 6, 0 ; "just over the packed threshold")]
#[test_case(64, 6, 1 ; "packed unaligned source")]
#[test_case(103, 6, 0 ; "packed with tail")]
#[test_case(40, 8, 0 ; "padded records")]
fn test_separate_output_matches_portable(count: usize, stride: usize, shift: usize) {
    let mesh = Mesh::random(count as u64, count, stride);
    let input = mesh.input(shift);
    let (positions, normals) = run_separate(SkinningStrategy::Portable, &input, &mesh.matrices);

    for strategy in strategies() {
        let (p, n) = run_separate(strategy, &input, &mesh.matrices);
        assert_close(&positions, &p, &format!("{strategy} positions"));
        assert_close(&normals, &n, &format!("{strategy} normals"));
    }
}

#[test_case(9 ; "general")]
#[test_case(67 ; "packed")]
fn test_packed_separate_streams(count: usize) {
    // tightly packed position and normal streams in their own buffers
    let mesh = Mesh::random(7, count, 6);
    let positions: Vec<f32> = (0..count)
        .flat_map(|v| mesh.geometry[v * 6..v * 6 + 3].to_vec())
        .collect();
    let normals: Vec<f32> = (0..count)
        .flat_map(|v| mesh.geometry[v * 6 + 3..v * 6 + 6].to_vec())
        .collect();

    for shift in [0, 1] {
        let input = SkinningInput {
            positions: Stream::new(&positions, shift * 3, 3),
            normals: Some(Stream::new(&normals, shift * 3, 3)),
            blend_weights: Stream::packed(&mesh.weights, WEIGHTS),
            blend_indices: IndexStream::packed(&mesh.indices, WEIGHTS),
            weights_per_vertex: WEIGHTS,
            vertex_count: count - shift,
        };
        let (expected_p, expected_n) =
            run_separate(SkinningStrategy::Portable, &input, &mesh.matrices);
        let expected_only = run_positions(SkinningStrategy::Portable, &input, &mesh.matrices);
        assert_close(&expected_p, &expected_only, "position-only");

        for strategy in strategies() {
            let (p, n) = run_separate(strategy, &input, &mesh.matrices);
            assert_close(&expected_p, &p, &format!("{strategy} positions, shift {shift}"));
            assert_close(&expected_n, &n, &format!("{strategy} normals, shift {shift}"));

            let only = run_positions(strategy, &input, &mesh.matrices);
            assert_close(&expected_p, &only, &format!("{strategy} position-only"));
        }
    }
}

#[test_case(12, 6 ; "general")]
#[test_case(80, 6 ; "packed")]
#[test_case(80, 7 ; "strided")]
fn test_interleaved_output_matches_portable(count: usize, stride: usize) {
    let mesh = Mesh::random(99, count, stride);
    let input = mesh.input(0);
    let expected = run_interleaved(SkinningStrategy::Portable, &input, &mesh.matrices, stride);

    for strategy in strategies() {
        let out = run_interleaved(strategy, &input, &mesh.matrices, stride);
        assert_close(&expected, &out, &format!("{strategy} interleaved"));
    }
}

#[test]
fn test_normals_are_unit_length() {
    let mesh = Mesh::random(3, 50, 6);
    let (_, normals) = run_separate(SkinningStrategy::global(), &mesh.input(0), &mesh.matrices);
    for normal in normals.chunks_exact(3) {
        let length = Vec3::from_slice(normal).length();
        assert!((length - 1.0).abs() < 1e-4, "length {length}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_strategies_agree(seed in any::<u64>(), count in 1usize..96, shift in 0usize..3) {
        let mesh = Mesh::random(seed, count, 6);
        // shifting by more than the spare float means dropping a vertex
        let mesh_input = if shift == 0 { mesh.input(0) } else {
            SkinningInput { vertex_count: count.saturating_sub(1), ..mesh.input(shift) }
        };
        let (positions, normals) =
            run_separate(SkinningStrategy::Portable, &mesh_input, &mesh.matrices);

        for strategy in strategies() {
            let (p, n) = run_separate(strategy, &mesh_input, &mesh.matrices);
            for (e, a) in positions.iter().zip(&p).chain(normals.iter().zip(&n)) {
                prop_assert!((e - a).abs() <= EPSILON * e.abs().max(1.0), "{strategy}: {e} vs {a}");
            }
        }
    }
}
