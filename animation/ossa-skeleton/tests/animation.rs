//! Keyframe sampling, state blending and instances

use glam::{Mat4, Quat, Vec3};
use ossa_skeleton::animation::AnimationTrack;
use ossa_skeleton::{
    AnimationStateSet, BlendMode, BoneHandle, Frame, InterpolationMode, KeyFrame, Skeleton,
    SkeletonError, SkeletonInstance, share,
};
use pretty_assertions::assert_eq;
use std::f32::consts::FRAC_PI_2;
use test_case::test_case;

mod common;

fn sliding_track() -> AnimationTrack {
    let mut track = AnimationTrack::new(BoneHandle(0));
    track.insert_key_frame(KeyFrame::new(0.0));
    track.insert_key_frame(
        KeyFrame::new(1.0)
            .with_translate(Vec3::new(2.0, 0.0, 0.0))
            .with_rotation(Quat::from_rotation_z(FRAC_PI_2)),
    );
    track
}

/// One bone, one animation sliding it along x by `distance` over a second.
fn slider(distance: f32) -> Skeleton {
    common::init_logging();
    let mut skeleton = Skeleton::new("slider");
    let bone = skeleton.create_named_bone("root", None).unwrap().handle();
    skeleton.set_binding_pose();

    for (name, axis) in [("x", Vec3::X), ("y", Vec3::Y)] {
        let animation = skeleton.create_animation(name, 2.0).unwrap();
        let track = animation.create_track(bone).unwrap();
        track.create_key_frame(0.0);
        track.create_key_frame(1.0).translate = axis * distance;
        track.create_key_frame(2.0);
    }
    skeleton
}

fn enabled(skeleton: &Skeleton, states: &[(&str, f32, f32)]) -> AnimationStateSet {
    let mut set = AnimationStateSet::new();
    skeleton.init_animation_state(&mut set);
    for (name, time, weight) in states {
        let state = set.state_mut(name).unwrap();
        state.set_enabled(true);
        state.set_time_position(*time);
        state.set_weight(*weight);
    }
    set
}

#[test]
fn test_logging_reaches_debug_level() {
    common::init_logging();
    common::init_logging();
    assert!(log::log_enabled!(log::Level::Debug));

    // creation and posing log through the installed logger
    let mut skeleton = slider(1.0);
    let states = enabled(&skeleton, &[("x", 0.5, 1.0)]);
    assert!(skeleton.set_animation_state(&states).unwrap());
}

#[test]
fn test_factor_zero_on_keyframe() {
    let track = sliding_track();
    let span = track.key_frames_at_time(1.0, 2.0).unwrap();
    assert_eq!(span.factor, 0.0);
    assert_eq!(span.first, &track.key_frames()[1]);
}

#[test]
fn test_past_last_key_wraps_to_first() {
    let track = sliding_track();
    let span = track.key_frames_at_time(1.5, 2.0).unwrap();
    assert_eq!(span.first_index, 1);
    assert_eq!(span.second_index, 0);
    assert!((span.factor - 0.5).abs() < 1e-6);
}

#[test]
fn test_midpoint_interpolation() {
    let track = sliding_track();
    let key = track.interpolated_key_frame(0.5, 2.0, InterpolationMode::Linear);
    assert!(key.translate.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    let expected = Quat::from_rotation_z(FRAC_PI_2 / 2.0);
    assert!(key.rotation.abs_diff_eq(expected, 1e-5));
}

#[test_case(0.0, 0.0 ; "start")]
#[test_case(0.5, 1.0 ; "half way up")]
#[test_case(1.0, 2.0 ; "peak")]
#[test_case(1.5, 1.0 ; "half way down")]
#[test_case(2.5, 1.0 ; "wrapped")]
fn test_pose_at_time(time: f32, expected_x: f32) {
    let mut skeleton = slider(2.0);
    let states = enabled(&skeleton, &[("x", time, 1.0)]);
    skeleton.set_animation_state(&states).unwrap();

    let position = skeleton.bone(BoneHandle(0)).unwrap().position();
    assert!((position.x - expected_x).abs() < 1e-5, "{position}");
}

#[test]
fn test_identical_states_skip_second_apply() {
    let mut skeleton = slider(2.0);
    let states = enabled(&skeleton, &[("x", 1.0, 1.0)]);
    assert!(skeleton.set_animation_state(&states).unwrap());

    // nudge the bone by hand; an identical state set must not touch it
    skeleton.bone_mut(BoneHandle(0)).unwrap().set_position(Vec3::splat(9.0));
    assert!(!skeleton.set_animation_state(&states).unwrap());
    assert_eq!(skeleton.bone(BoneHandle(0)).unwrap().position(), Vec3::splat(9.0));
}

#[test]
fn test_cumulative_blend_adds_weighted_offsets() {
    let mut skeleton = slider(2.0);
    let states = enabled(&skeleton, &[("x", 1.0, 0.5), ("y", 1.0, 0.5)]);
    skeleton.set_animation_state(&states).unwrap();

    let position = skeleton.bone(BoneHandle(0)).unwrap().position();
    assert!(position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5), "{position}");
}

#[test]
fn test_cumulative_weights_are_not_normalized() {
    let mut skeleton = slider(2.0);
    let states = enabled(&skeleton, &[("x", 1.0, 1.0), ("y", 1.0, 1.0)]);
    skeleton.set_animation_state(&states).unwrap();

    let position = skeleton.bone(BoneHandle(0)).unwrap().position();
    assert!(position.abs_diff_eq(Vec3::new(2.0, 2.0, 0.0), 1e-5), "{position}");
}

#[test]
fn test_average_blend_mode() {
    let mut skeleton = slider(2.0);
    skeleton.set_blend_mode(BlendMode::Average);
    let states = enabled(&skeleton, &[("x", 1.0, 1.0), ("y", 1.0, 1.0)]);
    skeleton.set_animation_state(&states).unwrap();

    let position = skeleton.bone(BoneHandle(0)).unwrap().position();
    assert!(position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5), "{position}");
}

#[test]
fn test_unknown_state_name() {
    let mut skeleton = slider(1.0);
    let mut states = AnimationStateSet::new();
    states.create_state("jump", 0.0, 1.0, 1.0, true).unwrap();
    assert!(matches!(
        skeleton.set_animation_state(&states),
        Err(SkeletonError::ItemNotFound(_))
    ));
}

#[test]
fn test_instances_pose_independently() {
    let master = slider(2.0);
    let mut left = SkeletonInstance::new(&master);
    let mut right = SkeletonInstance::new(&master);

    left.set_animation_state(&enabled(&master, &[("x", 1.0, 1.0)]))
        .unwrap();
    right
        .set_animation_state(&enabled(&master, &[("y", 1.0, 1.0)]))
        .unwrap();

    let left_matrix = left.bone_matrices_for(Frame::new(1))[0];
    let right_matrix = right.bone_matrices_for(Frame::new(1))[0];
    assert!(left_matrix.abs_diff_eq(Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)), 1e-6));
    assert!(right_matrix.abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)), 1e-6));
}

#[test]
fn test_shared_instance_single_writer() {
    let master = slider(2.0);
    let (mut writer, reader) = share(SkeletonInstance::new(&master));
    let states = enabled(&master, &[("x", 0.5, 1.0)]);

    let frame = Frame::new(3);
    assert!(reader.matrices_for(frame).is_none());
    writer.update(frame, &states).unwrap();

    let readers: Vec<_> = (0..4).map(|_| reader.clone()).collect();
    std::thread::scope(|scope| {
        for reader in &readers {
            scope.spawn(move || {
                let matrices = reader.matrices_for(frame).unwrap();
                assert!((matrices[0].w_axis.x - 1.0).abs() < 1e-6);
            });
        }
    });
}
