//! `ossa probe`: CPU features, strategy choice and strategy cross-checks

use anyhow::{Result, bail};
use console::style;
use glam::{Mat4, Quat, Vec3};
use ossa_skeleton::Frame;
use ossa_skeleton::skinning::{
    SkinVertex, Skinner, SkinningMode, SkinningOptions, SkinningStrategy, SoftwareOnly,
    VertexElementSemantic, VertexElementType, VertexLayout, choose_skinning_mode,
    detect_cpu_features,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BONES: usize = 16;

/// Largest difference tolerated between a vector path and the portable one,
/// relative to the magnitude of the compared value.
const TOLERANCE: f32 = 1e-4;

pub fn execute(vertices: usize, seed: u64) -> Result<()> {
    let features = detect_cpu_features();
    let global = SkinningStrategy::global();

    println!("\n{}", style("CPU Features").bold().underlined());
    for (name, present) in [
        ("sse2", features.has_sse2),
        ("sse4.1", features.has_sse41),
        ("avx2", features.has_avx2),
        ("neon", features.has_neon),
    ] {
        let mark = if present {
            style("yes").green()
        } else {
            style("no").dim()
        };
        println!("  {name:<8} {mark}");
    }

    println!("\n{}", style("Skinning").bold().underlined());
    println!("Selected strategy: {}", style(global).cyan());
    if let Ok(value) = std::env::var(SkinningStrategy::ENV_VAR) {
        println!("  ({}={value})", SkinningStrategy::ENV_VAR);
    }
    println!("Skinning mode: {:?}", skinning_mode());

    let (mesh, matrices) = random_scene(vertices, seed);
    let reference = run(&mesh, &matrices, SkinningStrategy::Portable)?;

    let mut failures = 0;
    for strategy in SkinningStrategy::available(&features) {
        let result = run(&mesh, &matrices, strategy)?;
        let error = max_relative_error(&reference, &result);
        let verdict = if error <= TOLERANCE {
            style("ok").green()
        } else {
            failures += 1;
            style("MISMATCH").red().bold()
        };
        println!(
            "  {:<10} {vertices} vertices, max relative error {error:.2e} {verdict}",
            strategy.name()
        );
    }

    if failures > 0 {
        bail!("{failures} skinning strategies disagree with the portable path");
    }
    Ok(())
}

/// Geometry in stream 0, four weights and indices in stream 1, as built by
/// [`random_scene`].
fn scene_layout() -> VertexLayout {
    let mut layout = VertexLayout::new();
    layout
        .add_element(0, 0, VertexElementType::Float3, VertexElementSemantic::Position)
        .add_element(0, 12, VertexElementType::Float3, VertexElementSemantic::Normal)
        .add_element(1, 0, VertexElementType::Float4, VertexElementSemantic::BlendWeights)
        .add_element(1, 16, VertexElementType::UByte4, VertexElementSemantic::BlendIndices);
    layout
}

/// The CLI has no renderer, so the scene always falls back to the CPU.
fn skinning_mode() -> SkinningMode {
    choose_skinning_mode(&SoftwareOnly, &scene_layout(), BONES)
}

fn random_vec3(rng: &mut StdRng) -> Vec3 {
    Vec3::new(
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
    )
}

/// Random four-weight vertices and random rigid bone matrices.
pub fn random_scene(count: usize, seed: u64) -> (Vec<SkinVertex>, Vec<Mat4>) {
    let mut rng = StdRng::seed_from_u64(seed);

    let vertices = (0..count)
        .map(|_| {
            let mut weights = [0.0f32; 4];
            let mut indices = [0u8; 4];
            for (weight, index) in weights.iter_mut().zip(indices.iter_mut()) {
                *weight = rng.random_range(0.0..1.0);
                *index = rng.random_range(0..BONES as u8);
            }
            SkinVertex {
                position: random_vec3(&mut rng) * 10.0,
                normal: random_vec3(&mut rng).normalize_or(Vec3::Y),
                bone_indices: indices,
                bone_weights: weights,
            }
        })
        .collect();

    let matrices = (0..BONES)
        .map(|_| {
            let axis = random_vec3(&mut rng).normalize_or(Vec3::Z);
            let angle = rng.random_range(-3.0..3.0);
            Mat4::from_rotation_translation(Quat::from_axis_angle(axis, angle), random_vec3(&mut rng) * 5.0)
        })
        .collect();

    (vertices, matrices)
}

fn run(vertices: &[SkinVertex], matrices: &[Mat4], strategy: SkinningStrategy) -> Result<Vec<f32>> {
    let mut skinner = Skinner::new(
        vertices,
        SkinningOptions {
            strategy: Some(strategy),
            ..SkinningOptions::default()
        },
    );
    skinner.update(Frame::ZERO, matrices)?;
    let mut out = skinner.positions().to_vec();
    out.extend_from_slice(skinner.normals());
    Ok(out)
}

fn max_relative_error(expected: &[f32], actual: &[f32]) -> f32 {
    expected
        .iter()
        .zip(actual)
        .map(|(e, a)| (e - a).abs() / e.abs().max(1.0))
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_scene_is_seeded() {
        let (a, ma) = random_scene(8, 7);
        let (b, mb) = random_scene(8, 7);
        assert_eq!(a, b);
        assert_eq!(ma, mb);
        assert!(a.iter().all(|v| v.bone_indices.iter().all(|&i| (i as usize) < BONES)));
    }

    #[test]
    fn test_scene_without_renderer_skins_in_software() {
        assert_eq!(scene_layout().weights_per_vertex(), 4);
        assert_eq!(skinning_mode(), SkinningMode::Software);
    }

    #[test]
    fn test_every_available_strategy_matches_portable() {
        let (mesh, matrices) = random_scene(100, 3);
        let reference = run(&mesh, &matrices, SkinningStrategy::Portable).unwrap();
        for strategy in SkinningStrategy::available(&detect_cpu_features()) {
            let result = run(&mesh, &matrices, strategy).unwrap();
            assert!(max_relative_error(&reference, &result) <= TOLERANCE, "{strategy}");
        }
    }
}
