//! `ossa demo`: write a small sample skeleton

use anyhow::{Context, Result};
use console::style;
use glam::{Quat, Vec3};
use ossa_skeleton::{BoneHandle, InterpolationMode, Skeleton};
use std::f32::consts::FRAC_PI_4;
use std::path::Path;

pub fn execute(output: &Path) -> Result<()> {
    let skeleton = arm_skeleton()?;
    ossa_skel::save_skeleton(output, &skeleton)
        .with_context(|| format!("Failed to write skeleton: {}", output.display()))?;

    println!(
        "✓ Wrote {} ({} bones, {} animations) to {}",
        style(skeleton.name()).cyan(),
        skeleton.num_bones(),
        skeleton.num_animations(),
        style(output.display()).green()
    );
    Ok(())
}

/// A shoulder, elbow, wrist and finger chain along +X with a `wave`
/// animation on the elbow and wrist and an `idle` sway on the shoulder.
pub fn arm_skeleton() -> Result<Skeleton> {
    let mut skeleton = Skeleton::new("arm");
    let chain = [
        ("shoulder", Vec3::new(0.0, 1.5, 0.0)),
        ("elbow", Vec3::new(1.0, 0.0, 0.0)),
        ("wrist", Vec3::new(0.8, 0.0, 0.0)),
        ("finger", Vec3::new(0.2, 0.0, 0.0)),
    ];

    let mut parent: Option<BoneHandle> = None;
    for (name, offset) in chain {
        let handle = skeleton.create_named_bone(name, None)?.set_position(offset).handle();
        if let Some(parent) = parent {
            skeleton.set_bone_parent(handle, parent)?;
        }
        parent = Some(handle);
    }
    skeleton.set_binding_pose();

    let elbow = skeleton.bone_handle("elbow")?;
    let wrist = skeleton.bone_handle("wrist")?;
    let shoulder = skeleton.bone_handle("shoulder")?;

    let wave = skeleton.create_animation("wave", 2.0)?;
    wave.set_interpolation_mode(InterpolationMode::Spline);
    let track = wave.create_track(elbow)?;
    for (time, angle) in [(0.0, 0.0), (0.5, FRAC_PI_4), (1.0, 0.0), (1.5, -FRAC_PI_4)] {
        track.create_key_frame(time).rotation = Quat::from_rotation_z(angle);
    }
    let track = wave.create_track(wrist)?;
    for (time, angle) in [(0.0, 0.0), (0.5, -0.3), (1.0, 0.0), (1.5, 0.3)] {
        track.create_key_frame(time).rotation = Quat::from_rotation_z(angle);
    }

    let idle = skeleton.create_animation("idle", 4.0)?;
    let track = idle.create_track(shoulder)?;
    track.create_key_frame(0.0);
    track.create_key_frame(2.0).translate = Vec3::new(0.0, 0.05, 0.0);

    Ok(skeleton)
}
