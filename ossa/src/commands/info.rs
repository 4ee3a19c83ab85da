//! `ossa info`: bone hierarchy and summary of a skeleton file

use anyhow::{Context, Result};
use console::style;
use glam::Vec3;
use ossa_skeleton::{BoneHandle, Skeleton};
use std::path::Path;

use crate::utils::{NodeType, TreeNode, TreeOptions, render_tree};

pub fn execute(
    path: &Path,
    animations: bool,
    depth: Option<usize>,
    compact: bool,
    no_color: bool,
) -> Result<()> {
    let skeleton = ossa_skel::load_skeleton(path)
        .with_context(|| format!("Failed to load skeleton: {}", path.display()))?;

    let options = TreeOptions {
        max_depth: depth,
        no_color,
        compact,
        ..TreeOptions::default()
    };

    let bones = bone_tree(&skeleton)?;
    println!("\n{}", style("Skeleton Information").bold().underlined());
    println!("File: {}", style(path.display()).cyan());
    println!("Bones: {}", style(bones.count() - 1).green());
    println!("Handle slots: {}", skeleton.num_bones());
    println!("Animations: {}", style(skeleton.num_animations()).green());
    println!();
    print!("{}", render_tree(&bones, &options));

    if animations {
        println!();
        print!("{}", render_tree(&animation_tree(&skeleton), &options));
    }

    Ok(())
}

fn format_vec3(v: Vec3) -> String {
    format!("({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
}

/// Bones below a root node named after the skeleton, in creation order.
pub fn bone_tree(skeleton: &Skeleton) -> Result<TreeNode> {
    fn bone_node(skeleton: &Skeleton, handle: BoneHandle) -> Result<TreeNode> {
        let bone = skeleton.bone(handle)?;
        let pose = bone.bone().binding_pose();
        let (axis, angle) = pose.orientation.to_axis_angle();

        let mut node = TreeNode::new(bone.name(), NodeType::Bone)
            .with_metadata("handle", handle.0.to_string())
            .with_metadata("position", format_vec3(pose.position));
        if angle.abs() > 1e-6 {
            node = node.with_metadata(
                "rotation",
                format!("{:.1}° about {}", angle.to_degrees(), format_vec3(axis)),
            );
        }
        if pose.scale != Vec3::ONE {
            node = node.with_metadata("scale", format_vec3(pose.scale));
        }

        for child in skeleton.child_bones(handle)? {
            node = node.add_child(bone_node(skeleton, child)?);
        }
        Ok(node)
    }

    let mut root = TreeNode::new(skeleton.name(), NodeType::Root);
    for handle in skeleton.root_bones() {
        root = root.add_child(bone_node(skeleton, handle)?);
    }
    Ok(root)
}

/// Animations with one child per track.
pub fn animation_tree(skeleton: &Skeleton) -> TreeNode {
    let mut root = TreeNode::new("animations", NodeType::Root);
    for animation in skeleton.animations() {
        let mut node = TreeNode::new(animation.name(), NodeType::Animation)
            .with_metadata("length", format!("{:.3}s", animation.length()))
            .with_metadata("tracks", animation.num_tracks().to_string());
        for track in animation.tracks() {
            let bone = skeleton
                .bone(track.handle())
                .map_or_else(|_| format!("bone {}", track.handle().0), |b| b.name().to_string());
            node = node.add_child(
                TreeNode::new(bone, NodeType::Track)
                    .with_metadata("keyframes", track.num_key_frames().to_string()),
            );
        }
        root = root.add_child(node);
    }
    root
}
