//! Keyframe animation
//!
//! This module provides the authored side of skeletal animation:
//! - [`KeyFrame`]: a bone transform at one point in time
//! - [`AnimationTrack`]: ordered keyframes for one bone, with interpolation
//! - [`Animation`]: a named, fixed-length set of tracks
//! - [`AnimationState`] / [`AnimationStateSet`]: which animations to pose,
//!   at what time and weight
//!
//! Animations write into anything implementing [`AnimationTarget`]; the
//! skeleton is the usual target.
//!
//! # Example
//!
//! ```
//! use ossa_skeleton::animation::{Animation, InterpolationMode};
//! use ossa_skeleton::BoneHandle;
//! use glam::Vec3;
//!
//! let mut walk = Animation::new("walk", 2.0);
//! let length = walk.length();
//! let track = walk.create_track(BoneHandle(0))?;
//! track.create_key_frame(0.0);
//! track.create_key_frame(1.0).translate = Vec3::new(2.0, 0.0, 0.0);
//!
//! let key = track.interpolated_key_frame(0.5, length, InterpolationMode::Linear);
//! assert_eq!(key.translate, Vec3::new(1.0, 0.0, 0.0));
//! # Ok::<(), ossa_skeleton::SkeletonError>(())
//! ```

mod clip;
mod keyframe;
mod state;
mod track;

pub use clip::Animation;
pub use keyframe::KeyFrame;
pub use state::{AnimationState, AnimationStateSet};
pub use track::{AnimationTrack, KeyFrameSpan};

use crate::bone::BoneHandle;
use crate::error::Result;
use crate::math::slerp;
use crate::node::{NodeId, NodeTree, TransformSpace};
use glam::{Quat, Vec3};

/// How translation and scale are interpolated between keyframes. Rotation
/// always uses spherical interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum InterpolationMode {
    #[default]
    Linear,
    /// Catmull-Rom through the neighbouring keyframes.
    Spline,
}

/// How one interpolated keyframe is combined into its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackBlend {
    pub weight: f32,
    /// Add onto the current pose rather than averaging offsets.
    pub accumulate: bool,
    pub shortest_rotation_path: bool,
}

/// Something an animation can pose, addressed by bone handle.
pub trait AnimationTarget {
    fn apply_key_frame(&mut self, handle: BoneHandle, key: &KeyFrame, blend: TrackBlend)
    -> Result<()>;
}

/// Wrap `time` into `[0, length)`. Non-positive lengths pin time to 0.
pub fn wrap_time(time: f32, length: f32) -> f32 {
    if length <= 0.0 || !time.is_finite() {
        return 0.0;
    }
    let wrapped = time.rem_euclid(length);
    if wrapped >= length { 0.0 } else { wrapped }
}

/// Combine an interpolated keyframe into a node.
///
/// Accumulating rotates by the keyframe rotation scaled towards identity by
/// `weight`, then translates by the weighted translation, then scales by the
/// weighted scale. Otherwise the keyframe joins the node's weighted average
/// of offsets from its initial state.
pub fn apply_key_frame_to_node(nodes: &mut NodeTree, node: NodeId, key: &KeyFrame, blend: TrackBlend) {
    if !blend.accumulate {
        nodes.weighted_transform(node, blend.weight, key.translate, key.rotation, key.scale);
        return;
    }

    let rotation = if blend.weight == 1.0 {
        key.rotation
    } else {
        slerp(
            Quat::IDENTITY,
            key.rotation,
            blend.weight,
            blend.shortest_rotation_path,
        )
    };
    nodes.rotate(node, rotation, TransformSpace::Local);
    nodes.translate(node, key.translate * blend.weight, TransformSpace::Parent);

    if key.scale != Vec3::ONE {
        let scale = if blend.weight == 1.0 {
            key.scale
        } else {
            Vec3::ONE + (key.scale - Vec3::ONE) * blend.weight
        };
        nodes.scale_by(node, scale);
    }
}
