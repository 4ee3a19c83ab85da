//! `ossa pose`: apply one animation and print the resulting bone matrices

use anyhow::{Context, Result};
use console::style;
use glam::Mat4;
use ossa_skeleton::{AnimationStateSet, Skeleton};
use std::path::Path;

pub fn execute(path: &Path, animation: &str, time: f32, weight: f32) -> Result<()> {
    let mut skeleton = ossa_skel::load_skeleton(path)
        .with_context(|| format!("Failed to load skeleton: {}", path.display()))?;

    let matrices = pose(&mut skeleton, animation, time, weight)?;
    let length = skeleton.animation(animation)?.length();

    println!(
        "Animation {} at {:.3}s of {:.3}s, weight {}",
        style(animation).yellow(),
        time,
        length,
        weight
    );
    for bone in skeleton.bones() {
        let handle = bone.handle();
        println!();
        println!("[{}] {}", handle.0, style(bone.name()).green());
        print!("{}", format_matrix(&matrices[handle.index()]));
    }
    Ok(())
}

/// Pose `skeleton` with a single enabled state and return its bone matrices.
pub fn pose(skeleton: &mut Skeleton, animation: &str, time: f32, weight: f32) -> Result<Vec<Mat4>> {
    let mut states = AnimationStateSet::new();
    skeleton.init_animation_state(&mut states);
    let state = states
        .state_mut(animation)
        .with_context(|| format!("Skeleton '{}' has no animation '{animation}'", skeleton.name()))?;
    state.set_enabled(true);
    state.set_time_position(time);
    state.set_weight(weight);

    skeleton.set_animation_state(&states)?;
    Ok(skeleton.bone_matrix_vec())
}

/// Row-major rendering, one row per line.
pub fn format_matrix(matrix: &Mat4) -> String {
    let mut out = String::new();
    for row in 0..4 {
        let r = matrix.row(row);
        out.push_str(&format!(
            "  {:>9.4} {:>9.4} {:>9.4} {:>9.4}\n",
            r.x, r.y, r.z, r.w
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_format_matrix_rows() {
        let text = format_matrix(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].trim().ends_with("1.0000"));
        assert!(lines[1].trim().ends_with("2.0000"));
        assert!(lines[3].trim().starts_with("0.0000"));
    }

    #[test]
    fn test_pose_unknown_animation() {
        let mut skeleton = Skeleton::new("empty");
        skeleton.create_named_bone("root", None).unwrap();
        let err = pose(&mut skeleton, "jump", 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("jump"));
    }

    #[test]
    fn test_pose_moves_tracked_bone() {
        let mut skeleton = Skeleton::new("one");
        let root = skeleton.create_named_bone("root", None).unwrap().handle();
        skeleton.set_binding_pose();
        let track = skeleton
            .create_animation("slide", 1.0)
            .unwrap()
            .create_track(root)
            .unwrap();
        track.create_key_frame(0.0);
        track.create_key_frame(1.0).translate = Vec3::X * 2.0;

        let matrices = pose(&mut skeleton, "slide", 0.5, 1.0).unwrap();
        let moved = matrices[0].transform_point3(Vec3::ZERO);
        assert!(moved.abs_diff_eq(Vec3::X, 1e-5), "{moved}");
        assert!(matrices[0].to_scale_rotation_translation().1.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }
}
