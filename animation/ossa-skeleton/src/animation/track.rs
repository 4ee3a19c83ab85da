//! Per-bone keyframe tracks and their interpolation

use super::keyframe::KeyFrame;
use super::{AnimationTarget, InterpolationMode, TrackBlend, wrap_time};
use crate::bone::BoneHandle;
use crate::error::{Result, SkeletonError};
use crate::math::{catmull_rom, slerp};

/// The pair of keyframes bracketing a point in time.
#[derive(Debug, Clone, Copy)]
pub struct KeyFrameSpan<'a> {
    /// Latest keyframe at or before the time.
    pub first: &'a KeyFrame,
    /// Keyframe after `first`; wraps to the first keyframe past the end.
    pub second: &'a KeyFrame,
    pub first_index: usize,
    pub second_index: usize,
    /// Position between the two in `[0, 1)`, exactly 0 on `first`.
    pub factor: f32,
    /// The requested time wrapped into `[0, length)`.
    pub time: f32,
}

fn index_error(handle: BoneHandle, index: usize, len: usize) -> SkeletonError {
    SkeletonError::invalid_argument(format!(
        "keyframe index {index} out of range for track {handle} ({len} keyframes)"
    ))
}

/// Time ordered keyframes driving one bone.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationTrack {
    handle: BoneHandle,
    key_frames: Vec<KeyFrame>,
    use_shortest_rotation_path: bool,
}

impl AnimationTrack {
    pub fn new(handle: BoneHandle) -> Self {
        Self {
            handle,
            key_frames: Vec::new(),
            use_shortest_rotation_path: true,
        }
    }

    /// Bone this track animates.
    pub fn handle(&self) -> BoneHandle {
        self.handle
    }

    pub fn num_key_frames(&self) -> usize {
        self.key_frames.len()
    }

    pub fn key_frames(&self) -> &[KeyFrame] {
        &self.key_frames
    }

    pub fn key_frame(&self, index: usize) -> Result<&KeyFrame> {
        let len = self.key_frames.len();
        self.key_frames
            .get(index)
            .ok_or_else(|| index_error(self.handle, index, len))
    }

    pub fn key_frame_mut(&mut self, index: usize) -> Result<&mut KeyFrame> {
        let (handle, len) = (self.handle, self.key_frames.len());
        self.key_frames
            .get_mut(index)
            .ok_or_else(|| index_error(handle, index, len))
    }

    pub fn use_shortest_rotation_path(&self) -> bool {
        self.use_shortest_rotation_path
    }

    pub fn set_use_shortest_rotation_path(&mut self, shortest: bool) {
        self.use_shortest_rotation_path = shortest;
    }

    /// Identity keyframe at `time`, kept in time order.
    ///
    /// Appending past the current last keyframe is the fast path. A keyframe
    /// already sitting at exactly `time` is returned instead of a duplicate.
    pub fn create_key_frame(&mut self, time: f32) -> &mut KeyFrame {
        let last_time = self.key_frames.last().map(KeyFrame::time);
        let index = match last_time {
            Some(last) if time <= last => {
                let index = self.key_frames.partition_point(|k| k.time() < time);
                if self.key_frames[index].time() == time {
                    return &mut self.key_frames[index];
                }
                index
            }
            _ => self.key_frames.len(),
        };
        self.key_frames.insert(index, KeyFrame::new(time));
        &mut self.key_frames[index]
    }

    /// Insert a copy of `key`, replacing any keyframe at the same time.
    pub fn insert_key_frame(&mut self, key: KeyFrame) -> &mut KeyFrame {
        let slot = self.create_key_frame(key.time());
        *slot = key;
        slot
    }

    pub fn remove_key_frame(&mut self, index: usize) -> Result<KeyFrame> {
        if index >= self.key_frames.len() {
            return Err(index_error(self.handle, index, self.key_frames.len()));
        }
        Ok(self.key_frames.remove(index))
    }

    pub fn remove_all_key_frames(&mut self) {
        self.key_frames.clear();
    }

    /// Keyframes bracketing `time` in an animation of `length` seconds.
    ///
    /// Returns `None` for an empty track.
    pub fn key_frames_at_time(&self, time: f32, length: f32) -> Option<KeyFrameSpan<'_>> {
        if self.key_frames.is_empty() {
            return None;
        }
        let time = wrap_time(time, length);

        // number of keyframes at or before `time`
        let after = self.key_frames.partition_point(|k| k.time() <= time);

        let (second_index, second_time) = if after < self.key_frames.len() {
            (after, self.key_frames[after].time())
        } else {
            (0, length)
        };
        let first_index = after.saturating_sub(1);
        let first_time = self.key_frames[first_index].time();

        let factor = if first_time == second_time {
            0.0
        } else {
            ((time - first_time) / (second_time - first_time)).clamp(0.0, 1.0)
        };

        Some(KeyFrameSpan {
            first: &self.key_frames[first_index],
            second: &self.key_frames[second_index],
            first_index,
            second_index,
            factor,
            time,
        })
    }

    /// Keyframe interpolated at `time`; identity for an empty track.
    pub fn interpolated_key_frame(
        &self,
        time: f32,
        length: f32,
        mode: InterpolationMode,
    ) -> KeyFrame {
        let Some(span) = self.key_frames_at_time(time, length) else {
            return KeyFrame::new(wrap_time(time, length));
        };

        if span.factor == 0.0 {
            return span.first.with_time(span.time);
        }

        let t = span.factor;
        let rotation = slerp(
            span.first.rotation,
            span.second.rotation,
            t,
            self.use_shortest_rotation_path,
        );

        let (translate, scale) = match mode {
            InterpolationMode::Linear => (
                span.first.translate.lerp(span.second.translate, t),
                span.first.scale.lerp(span.second.scale, t),
            ),
            InterpolationMode::Spline => {
                let last = self.key_frames.len() - 1;
                let before = &self.key_frames[span.first_index.saturating_sub(1)];
                let beyond = &self.key_frames[(span.second_index + 1).min(last)];
                (
                    catmull_rom(
                        before.translate,
                        span.first.translate,
                        span.second.translate,
                        beyond.translate,
                        t,
                    ),
                    catmull_rom(
                        before.scale,
                        span.first.scale,
                        span.second.scale,
                        beyond.scale,
                        t,
                    ),
                )
            }
        };

        KeyFrame::new(span.time)
            .with_translate(translate)
            .with_rotation(rotation)
            .with_scale(scale)
    }

    /// Whether any keyframe moves the bone at all.
    pub fn has_non_zero_key_frames(&self) -> bool {
        self.key_frames.iter().any(|k| !k.is_identity())
    }

    /// Drop keyframes that sit between two neighbours with the same
    /// transform; they add nothing to the interpolation. Returns how many
    /// were removed.
    pub fn optimise(&mut self) -> usize {
        let before = self.key_frames.len();
        if before < 3 {
            return 0;
        }

        let mut kept: Vec<KeyFrame> = Vec::with_capacity(before);
        for (i, key) in self.key_frames.iter().enumerate() {
            let redundant = i > 0
                && i + 1 < before
                && kept.last().is_some_and(|prev| prev.same_transform(key))
                && self.key_frames[i + 1].same_transform(key);
            if !redundant {
                kept.push(*key);
            }
        }
        self.key_frames = kept;
        before - self.key_frames.len()
    }

    /// Interpolate at `time` and hand the result to `target`.
    pub fn apply<T: AnimationTarget + ?Sized>(
        &self,
        target: &mut T,
        time: f32,
        length: f32,
        weight: f32,
        accumulate: bool,
        mode: InterpolationMode,
    ) -> Result<()> {
        if self.key_frames.is_empty() {
            return Ok(());
        }
        let key = self.interpolated_key_frame(time, length, mode);
        target.apply_key_frame(
            self.handle,
            &key,
            TrackBlend {
                weight,
                accumulate,
                shortest_rotation_path: self.use_shortest_rotation_path,
            },
        )
    }
}
