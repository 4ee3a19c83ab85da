//! Transform hierarchy and skeleton behaviour through the public API

use glam::{Mat4, Quat, Vec3};
use ossa_skeleton::{BoneHandle, NodeKind, NodeTree, Skeleton, SkeletonError, TransformSpace};
use proptest::prelude::*;
use std::f32::consts::FRAC_PI_2;

mod common;

const EPSILON: f32 = 1e-5;

fn arm() -> Skeleton {
    common::init_logging();
    let mut skeleton = Skeleton::new("arm");
    let shoulder = skeleton.create_named_bone("shoulder", None).unwrap().handle();
    let elbow = skeleton
        .create_child_bone(shoulder, None, Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY)
        .unwrap();
    skeleton
        .create_child_bone(elbow, None, Vec3::new(0.0, 1.5, 0.0), Quat::IDENTITY)
        .unwrap();
    skeleton.set_binding_pose();
    skeleton
}

#[test]
fn test_child_follows_rotated_root() {
    let mut nodes = NodeTree::new();
    let root = nodes.create_node("root", NodeKind::Node);
    let child = nodes.create_node("child", NodeKind::Node);
    nodes.add_child(root, child).unwrap();
    nodes.set_position(child, Vec3::X);

    assert!(nodes.derived_position(child).abs_diff_eq(Vec3::X, EPSILON));

    nodes.rotate(root, Quat::from_rotation_z(FRAC_PI_2), TransformSpace::Local);
    assert!(nodes.derived_position(child).abs_diff_eq(Vec3::Y, EPSILON));
}

#[test]
fn test_scale_never_shears() {
    let mut nodes = NodeTree::new();
    let root = nodes.create_node("root", NodeKind::Node);
    nodes.set_scale(root, Vec3::new(2.0, 1.0, 1.0));
    nodes.set_orientation(root, Quat::from_rotation_z(FRAC_PI_2));

    let full = nodes.full_transform(root);
    // local x axis scaled by two, then rotated onto world y
    assert!(full.x_axis.truncate().abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), EPSILON));
    assert!(full.y_axis.truncate().abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), EPSILON));
}

#[test]
fn test_reparent_refreshes_immediately() {
    let mut nodes = NodeTree::new();
    let a = nodes.create_node("a", NodeKind::Node);
    let b = nodes.create_node("b", NodeKind::Node);
    let child = nodes.create_node("child", NodeKind::Node);
    nodes.set_position(b, Vec3::new(0.0, 0.0, 5.0));
    nodes.add_child(a, child).unwrap();
    nodes.detach(child);
    nodes.add_child(b, child).unwrap();

    assert_eq!(nodes.cached_derived(child).map(|t| t.position), Some(Vec3::new(0.0, 0.0, 5.0)));
}

#[test]
fn test_cycles_rejected() {
    let mut nodes = NodeTree::new();
    let a = nodes.create_node("a", NodeKind::Node);
    let b = nodes.create_node("b", NodeKind::Node);
    nodes.add_child(a, b).unwrap();
    assert!(matches!(nodes.add_child(b, a), Err(SkeletonError::InvalidArgument(_))));
    assert!(matches!(nodes.child(a, 3), Err(SkeletonError::InvalidArgument(_))));
}

#[test]
fn test_bind_pose_matrices_are_identity() {
    let mut skeleton = arm();
    for matrix in skeleton.bone_matrix_vec() {
        assert!(matrix.abs_diff_eq(Mat4::IDENTITY, EPSILON));
    }
}

#[test]
fn test_bone_matrix_maps_bind_space_to_pose() {
    let mut skeleton = arm();
    skeleton
        .bone_mut(BoneHandle(1))
        .unwrap()
        .rotate(Quat::from_rotation_z(FRAC_PI_2), TransformSpace::Local);

    let matrices = skeleton.bone_matrix_vec();
    // the wrist sits at (0, 3.5, 0) in bind pose and swings about the elbow
    let wrist = matrices[2].transform_point3(Vec3::new(0.0, 3.5, 0.0));
    assert!(wrist.abs_diff_eq(Vec3::new(-1.5, 2.0, 0.0), 1e-4), "{wrist}");
    // the shoulder did not move
    assert!(matrices[0].abs_diff_eq(Mat4::IDENTITY, EPSILON));
}

#[test]
fn test_root_bone_and_lookup() {
    let skeleton = arm();
    assert_eq!(skeleton.root_bone().unwrap(), BoneHandle(0));
    assert_eq!(skeleton.bone_by_name("shoulder").unwrap().handle(), BoneHandle(0));
    assert!(matches!(
        skeleton.bone_by_name("tail"),
        Err(SkeletonError::ItemNotFound(_))
    ));
}

#[test]
fn test_binding_pose_round_trip() {
    let mut skeleton = arm();
    let before = skeleton.bone(BoneHandle(1)).unwrap().local();

    let mut bone = skeleton.bone_mut(BoneHandle(1)).unwrap();
    bone.capture_binding_pose();
    bone.reset_to_binding_pose();
    let after = skeleton.bone(BoneHandle(1)).unwrap().local();

    assert!(before.abs_diff_eq(&after, EPSILON));
}

fn finite_vec3() -> impl Strategy<Value = Vec3> {
    (-10.0f32..10.0, -10.0f32..10.0, -10.0f32..10.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn unit_quat() -> impl Strategy<Value = Quat> {
    (finite_vec3(), -3.0f32..3.0).prop_map(|(axis, angle)| {
        let axis = axis.try_normalize().unwrap_or(Vec3::Z);
        Quat::from_axis_angle(axis, angle)
    })
}

proptest! {
    #[test]
    fn prop_derived_cache_is_stable(
        position in finite_vec3(),
        orientation in unit_quat(),
        child_position in finite_vec3(),
        scale in (0.1f32..4.0),
    ) {
        let mut nodes = NodeTree::new();
        let root = nodes.create_node("root", NodeKind::Node);
        let child = nodes.create_node("child", NodeKind::Node);
        nodes.add_child(root, child).unwrap();
        nodes.set_position(root, position);
        nodes.set_orientation(root, orientation);
        nodes.set_scale(root, Vec3::splat(scale));
        nodes.set_position(child, child_position);

        let first = nodes.derived(child);
        let second = nodes.derived(child);
        prop_assert_eq!(first, second);
        prop_assert_eq!(nodes.full_transform(child), nodes.full_transform(child));
    }
}
