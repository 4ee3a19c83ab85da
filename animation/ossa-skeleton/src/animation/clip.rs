//! Named animations: a length and one track per animated bone

use super::track::AnimationTrack;
use super::{AnimationTarget, InterpolationMode};
use crate::bone::BoneHandle;
use crate::error::{Result, SkeletonError};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

fn missing_track(animation: &str, handle: BoneHandle) -> SkeletonError {
    SkeletonError::not_found(format!(
        "animation '{animation}' has no track for bone {handle}"
    ))
}

/// A named, fixed-length animation made of per-bone tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    name: String,
    length: f32,
    tracks: BTreeMap<BoneHandle, AnimationTrack>,
    interpolation: InterpolationMode,
}

impl Animation {
    pub fn new(name: impl Into<String>, length: f32) -> Self {
        Self {
            name: name.into(),
            length,
            tracks: BTreeMap::new(),
            interpolation: InterpolationMode::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length in seconds.
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    pub fn interpolation_mode(&self) -> InterpolationMode {
        self.interpolation
    }

    pub fn set_interpolation_mode(&mut self, mode: InterpolationMode) {
        self.interpolation = mode;
    }

    /// Empty track bound to `handle`.
    pub fn create_track(&mut self, handle: BoneHandle) -> Result<&mut AnimationTrack> {
        match self.tracks.entry(handle) {
            Entry::Occupied(_) => Err(SkeletonError::duplicate(format!(
                "animation '{}' already has a track for bone {handle}",
                self.name
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(AnimationTrack::new(handle))),
        }
    }

    pub fn track(&self, handle: BoneHandle) -> Result<&AnimationTrack> {
        self.tracks
            .get(&handle)
            .ok_or_else(|| missing_track(&self.name, handle))
    }

    pub fn track_mut(&mut self, handle: BoneHandle) -> Result<&mut AnimationTrack> {
        let name = &self.name;
        self.tracks
            .get_mut(&handle)
            .ok_or_else(|| missing_track(name, handle))
    }

    pub fn has_track(&self, handle: BoneHandle) -> bool {
        self.tracks.contains_key(&handle)
    }

    pub fn destroy_track(&mut self, handle: BoneHandle) -> Result<AnimationTrack> {
        self.tracks
            .remove(&handle)
            .ok_or_else(|| missing_track(&self.name, handle))
    }

    pub fn destroy_all_tracks(&mut self) {
        self.tracks.clear();
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Tracks in bone-handle order.
    pub fn tracks(&self) -> impl Iterator<Item = &AnimationTrack> {
        self.tracks.values()
    }

    /// Apply every track at `time` to `target`.
    ///
    /// With `accumulate` the interpolated keyframes are added on top of the
    /// target's current pose, scaled by `weight`; otherwise they are blended
    /// into a weighted average of offsets from the binding pose.
    pub fn apply<T: AnimationTarget + ?Sized>(
        &self,
        target: &mut T,
        time: f32,
        weight: f32,
        accumulate: bool,
    ) -> Result<()> {
        for track in self.tracks.values() {
            track.apply(
                target,
                time,
                self.length,
                weight,
                accumulate,
                self.interpolation,
            )?;
        }
        Ok(())
    }

    /// Remove tracks that never move their bone and thin redundant
    /// keyframes from the rest. Returns the number of tracks removed.
    pub fn optimise(&mut self) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|_, track| track.has_non_zero_key_frames());
        let mut thinned = 0;
        for track in self.tracks.values_mut() {
            thinned += track.optimise();
        }
        let removed = before - self.tracks.len();
        log::debug!(
            "optimised animation '{}': {} tracks and {} keyframes removed",
            self.name,
            removed,
            thinned
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{KeyFrame, TrackBlend};
    use glam::Vec3;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        applied: Vec<(BoneHandle, KeyFrame, TrackBlend)>,
    }

    impl AnimationTarget for Recorder {
        fn apply_key_frame(
            &mut self,
            handle: BoneHandle,
            key: &KeyFrame,
            blend: TrackBlend,
        ) -> Result<()> {
            self.applied.push((handle, *key, blend));
            Ok(())
        }
    }

    #[test]
    fn test_create_track_twice_is_duplicate() {
        let mut anim = Animation::new("walk", 1.0);
        anim.create_track(BoneHandle(1)).unwrap();
        assert!(matches!(
            anim.create_track(BoneHandle(1)),
            Err(SkeletonError::DuplicateItem(_))
        ));
    }

    #[test]
    fn test_missing_track_is_not_found() {
        let mut anim = Animation::new("walk", 1.0);
        assert!(matches!(
            anim.track(BoneHandle(4)),
            Err(SkeletonError::ItemNotFound(_))
        ));
        assert!(matches!(
            anim.track_mut(BoneHandle(4)),
            Err(SkeletonError::ItemNotFound(_))
        ));
        assert!(matches!(
            anim.destroy_track(BoneHandle(4)),
            Err(SkeletonError::ItemNotFound(_))
        ));
        assert_eq!(anim.num_tracks(), 0);
    }

    #[test]
    fn test_apply_visits_tracks_in_handle_order() {
        let mut anim = Animation::new("wave", 2.0);
        for handle in [2u16, 0, 1] {
            let track = anim.create_track(BoneHandle(handle)).unwrap();
            track.create_key_frame(0.0);
            track.create_key_frame(1.0).translate = Vec3::splat(handle as f32);
        }
        // empty tracks are skipped
        anim.create_track(BoneHandle(7)).unwrap();

        let mut recorder = Recorder::default();
        anim.apply(&mut recorder, 1.0, 0.5, true).unwrap();

        let handles: Vec<u16> = recorder.applied.iter().map(|(h, _, _)| h.0).collect();
        assert_eq!(handles, vec![0, 1, 2]);
        let (_, key, blend) = recorder.applied[2];
        assert_eq!(key.translate, Vec3::splat(2.0));
        assert_eq!(blend.weight, 0.5);
        assert!(blend.accumulate);
    }

    #[test]
    fn test_optimise_drops_identity_tracks() {
        let mut anim = Animation::new("idle", 1.0);
        anim.create_track(BoneHandle(0)).unwrap().create_key_frame(0.0);
        anim.create_track(BoneHandle(1))
            .unwrap()
            .create_key_frame(0.5)
            .translate = Vec3::X;

        assert_eq!(anim.optimise(), 1);
        assert!(!anim.has_track(BoneHandle(0)));
        assert!(anim.has_track(BoneHandle(1)));
    }
}
