//! Per-animation playback controls and the sets that describe one pose

use super::wrap_time;
use crate::error::{Result, SkeletonError};

/// How far into one named animation to pose, and how strongly.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimationState {
    animation_name: String,
    time_position: f32,
    length: f32,
    weight: f32,
    enabled: bool,
}

impl AnimationState {
    /// Create a state; `time_position` is wrapped into `[0, length)`.
    pub fn new(
        animation_name: impl Into<String>,
        time_position: f32,
        length: f32,
        weight: f32,
        enabled: bool,
    ) -> Self {
        Self {
            animation_name: animation_name.into(),
            time_position: wrap_time(time_position, length),
            length,
            weight,
            enabled,
        }
    }

    pub fn animation_name(&self) -> &str {
        &self.animation_name
    }

    pub fn time_position(&self) -> f32 {
        self.time_position
    }

    pub fn set_time_position(&mut self, time: f32) {
        self.time_position = wrap_time(time, self.length);
    }

    /// Advance by `delta` seconds, looping at the end.
    pub fn add_time(&mut self, delta: f32) {
        self.set_time_position(self.time_position + delta);
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
        self.time_position = wrap_time(self.time_position, length);
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Weights are used as given; keeping a set's weights summing to one is
    /// up to the caller.
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Ordered collection of animation states describing one requested pose.
///
/// Two sets compare equal when they hold field-equal states in the same
/// order, which is what a skeleton uses to skip re-posing.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimationStateSet {
    states: Vec<AnimationState>,
}

impl AnimationStateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_state(
        &mut self,
        animation_name: impl Into<String>,
        time_position: f32,
        length: f32,
        weight: f32,
        enabled: bool,
    ) -> Result<&mut AnimationState> {
        let state = AnimationState::new(animation_name, time_position, length, weight, enabled);
        self.insert(state)
    }

    pub fn insert(&mut self, state: AnimationState) -> Result<&mut AnimationState> {
        if self.has_state(state.animation_name()) {
            return Err(SkeletonError::duplicate(format!(
                "animation state '{}' already exists",
                state.animation_name()
            )));
        }
        self.states.push(state);
        let last = self.states.len() - 1;
        Ok(&mut self.states[last])
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.iter().any(|s| s.animation_name == name)
    }

    pub fn state(&self, name: &str) -> Result<&AnimationState> {
        self.states
            .iter()
            .find(|s| s.animation_name == name)
            .ok_or_else(|| missing_state(name))
    }

    pub fn state_mut(&mut self, name: &str) -> Result<&mut AnimationState> {
        self.states
            .iter_mut()
            .find(|s| s.animation_name == name)
            .ok_or_else(|| missing_state(name))
    }

    pub fn remove_state(&mut self, name: &str) -> Result<AnimationState> {
        let index = self
            .states
            .iter()
            .position(|s| s.animation_name == name)
            .ok_or_else(|| missing_state(name))?;
        Ok(self.states.remove(index))
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, AnimationState> {
        self.states.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, AnimationState> {
        self.states.iter_mut()
    }

    pub fn enabled_states(&self) -> impl Iterator<Item = &AnimationState> {
        self.states.iter().filter(|s| s.enabled)
    }

    /// Advance every enabled state by `delta` seconds.
    pub fn add_time(&mut self, delta: f32) {
        for state in self.states.iter_mut().filter(|s| s.enabled) {
            state.add_time(delta);
        }
    }
}

impl<'a> IntoIterator for &'a AnimationStateSet {
    type Item = &'a AnimationState;
    type IntoIter = std::slice::Iter<'a, AnimationState>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}

fn missing_state(name: &str) -> SkeletonError {
    SkeletonError::not_found(format!("no animation state named '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_wraps_into_length() {
        let mut state = AnimationState::new("run", 5.0, 2.0, 1.0, true);
        assert_eq!(state.time_position(), 1.0);
        state.add_time(1.5);
        assert!((state.time_position() - 0.5).abs() < 1e-6);
        state.set_time_position(-0.5);
        assert!((state.time_position() - 1.5).abs() < 1e-6);
        state.set_time_position(2.0);
        assert_eq!(state.time_position(), 0.0);
    }

    #[test]
    fn test_set_equality_is_ordered_and_field_wise() {
        let mut a = AnimationStateSet::new();
        a.create_state("walk", 0.0, 1.0, 1.0, true).unwrap();
        a.create_state("wave", 0.5, 1.0, 0.5, true).unwrap();

        let mut b = a.clone();
        assert_eq!(a, b);

        b.state_mut("wave").unwrap().set_weight(0.25);
        assert_ne!(a, b);

        let mut c = AnimationStateSet::new();
        c.create_state("wave", 0.5, 1.0, 0.5, true).unwrap();
        c.create_state("walk", 0.0, 1.0, 1.0, true).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_duplicate_and_missing_states() {
        let mut set = AnimationStateSet::new();
        set.create_state("idle", 0.0, 1.0, 1.0, false).unwrap();
        assert!(matches!(
            set.create_state("idle", 0.0, 1.0, 1.0, false),
            Err(SkeletonError::DuplicateItem(_))
        ));
        assert!(matches!(
            set.state("jump"),
            Err(SkeletonError::ItemNotFound(_))
        ));
        assert_eq!(set.remove_state("idle").unwrap().animation_name(), "idle");
        assert!(set.is_empty());
    }

    #[test]
    fn test_add_time_skips_disabled_states() {
        let mut set = AnimationStateSet::new();
        set.create_state("on", 0.0, 4.0, 1.0, true).unwrap();
        set.create_state("off", 0.0, 4.0, 1.0, false).unwrap();
        set.add_time(1.0);
        assert_eq!(set.state("on").unwrap().time_position(), 1.0);
        assert_eq!(set.state("off").unwrap().time_position(), 0.0);
        assert_eq!(set.enabled_states().count(), 1);
    }
}
