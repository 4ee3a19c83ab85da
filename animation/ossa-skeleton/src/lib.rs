//! Skeletal animation core
//!
//! A [`Skeleton`] is a hierarchy of bones stored in a [`NodeTree`] arena.
//! Each bone keeps a local transform relative to its parent and lazily
//! caches its derived (model space) transform. Keyframe [`Animation`]s
//! sample per-bone tracks and blend into the bones through an
//! [`AnimationStateSet`], and [`Skeleton::bone_matrices`] turns the pose
//! into the per-bone offset matrices the [`skinning`] kernel consumes.
//!
//! ```
//! use glam::{Quat, Vec3};
//! use ossa_skeleton::{AnimationStateSet, BoneHandle, Skeleton};
//!
//! let mut skeleton = Skeleton::new("arm");
//! let root = skeleton.create_named_bone("shoulder", None)?.handle();
//! skeleton.create_child_bone(root, None, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY)?;
//! skeleton.set_binding_pose();
//!
//! let wave = skeleton.create_animation("wave", 1.0)?;
//! let track = wave.create_track(root)?;
//! track.create_key_frame(0.0);
//! track.create_key_frame(1.0).rotation = Quat::from_rotation_z(1.0);
//!
//! let mut states = AnimationStateSet::new();
//! skeleton.init_animation_state(&mut states);
//! let state = states.state_mut("wave")?;
//! state.set_enabled(true);
//! state.set_time_position(0.5);
//! skeleton.set_animation_state(&states)?;
//!
//! let matrices = skeleton.bone_matrix_vec();
//! assert_eq!(matrices.len(), 2);
//! assert_ne!(matrices[BoneHandle(0).index()], glam::Mat4::IDENTITY);
//! # Ok::<(), ossa_skeleton::SkeletonError>(())
//! ```

pub mod animation;
pub mod bone;
pub mod error;
pub mod frame;
pub mod instance;
pub mod math;
pub mod node;
pub mod shared;
pub mod skeleton;
pub mod skinning;

// Re-export common types
pub use animation::{
    Animation, AnimationState, AnimationStateSet, AnimationTrack, InterpolationMode, KeyFrame,
};
pub use bone::{Bone, BoneHandle, BoneMut, BoneRef, MAX_BONES};
pub use error::{Result, SkeletonError};
pub use frame::{Frame, FrameCache};
pub use instance::{Attachable, SkeletonInstance, TagPointId};
pub use node::{NodeId, NodeKind, NodeTree, Transform, TransformSpace};
pub use shared::{ShareStatistics, SkeletonReader, SkeletonWriter, share};
pub use skeleton::{BlendMode, Skeleton, SkeletonOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
