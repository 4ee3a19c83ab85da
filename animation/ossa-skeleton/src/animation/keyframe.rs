//! Keyframes: a bone transform snapshot at one point in time

use glam::{Quat, Vec3};

/// Tolerance used when deciding whether a keyframe does anything.
const IDENTITY_EPSILON: f32 = 1e-5;

/// Translation, rotation and scale of a bone at `time`, relative to its
/// binding pose.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyFrame {
    time: f32,
    pub translate: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl KeyFrame {
    /// An identity keyframe at `time`.
    pub const fn new(time: f32) -> Self {
        Self {
            time,
            translate: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Time in seconds from the start of the animation. Fixed once the
    /// keyframe belongs to a track so the track stays ordered.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub(crate) fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_translate(mut self, translate: Vec3) -> Self {
        self.translate = translate;
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// True when applying this keyframe would leave a bone untouched.
    pub fn is_identity(&self) -> bool {
        self.translate.abs_diff_eq(Vec3::ZERO, IDENTITY_EPSILON)
            && self.scale.abs_diff_eq(Vec3::ONE, IDENTITY_EPSILON)
            && (self.rotation.abs_diff_eq(Quat::IDENTITY, IDENTITY_EPSILON)
                || self.rotation.abs_diff_eq(-Quat::IDENTITY, IDENTITY_EPSILON))
    }

    /// Same transform as `other`, ignoring time.
    pub fn same_transform(&self, other: &Self) -> bool {
        self.translate.abs_diff_eq(other.translate, IDENTITY_EPSILON)
            && self.rotation.abs_diff_eq(other.rotation, IDENTITY_EPSILON)
            && self.scale.abs_diff_eq(other.scale, IDENTITY_EPSILON)
    }
}

impl Default for KeyFrame {
    fn default() -> Self {
        Self::new(0.0)
    }
}
