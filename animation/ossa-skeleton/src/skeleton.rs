//! Skeletons: bones keyed by handle and name, animations, and bone matrices

use crate::animation::{
    Animation, AnimationStateSet, AnimationTarget, KeyFrame, TrackBlend, apply_key_frame_to_node,
};
use crate::bone::{Bone, BoneHandle, BoneMut, BoneRef, MAX_BONES};
use crate::error::{Result, SkeletonError};
use crate::node::{NodeKind, NodeTree};
use glam::{Mat4, Quat, Vec3};
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::sync::{Arc, OnceLock};

/// How the enabled states of a set are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendMode {
    /// Weighted average of every animation's offset from the binding pose.
    Average,
    /// Each animation adds its weighted offset onto the pose, in set order.
    /// Weights are not normalised.
    #[default]
    Cumulative,
}

/// Options for building a skeleton.
#[derive(Debug, Clone)]
pub struct SkeletonOptions {
    /// Bones with a handle at or above this are rejected.
    pub max_bones: usize,
    pub blend_mode: BlendMode,
}

impl Default for SkeletonOptions {
    fn default() -> Self {
        Self {
            max_bones: MAX_BONES,
            blend_mode: BlendMode::default(),
        }
    }
}

fn missing_bone(handle: BoneHandle) -> SkeletonError {
    SkeletonError::not_found(format!("no bone with handle {handle}"))
}

fn missing_bone_name(name: &str) -> SkeletonError {
    SkeletonError::not_found(format!("no bone named '{name}'"))
}

fn missing_animation(name: &str) -> SkeletonError {
    SkeletonError::not_found(format!("no animation named '{name}'"))
}

/// A bone hierarchy with its animations.
#[derive(Debug, Clone)]
pub struct Skeleton {
    name: String,
    options: SkeletonOptions,
    nodes: NodeTree,
    bones: Vec<Option<Bone>>,
    bone_names: HashMap<String, BoneHandle>,
    root: OnceLock<BoneHandle>,
    animations: BTreeMap<String, Arc<Animation>>,
    last_state: Option<AnimationStateSet>,
    unnamed: usize,
}

impl Skeleton {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, SkeletonOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: SkeletonOptions) -> Self {
        Self {
            name: name.into(),
            options,
            nodes: NodeTree::new(),
            bones: Vec::new(),
            bone_names: HashMap::new(),
            root: OnceLock::new(),
            animations: BTreeMap::new(),
            last_state: None,
            unnamed: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &SkeletonOptions {
        &self.options
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.options.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.options.blend_mode = mode;
        self.last_state = None;
    }

    /// The node arena holding bone (and tag point) transforms.
    pub fn nodes(&self) -> &NodeTree {
        &self.nodes
    }

    /// Mutable access to the node arena. Forgets the cached root and the
    /// last applied animation state, since either may no longer hold.
    pub fn nodes_mut(&mut self) -> &mut NodeTree {
        self.root = OnceLock::new();
        self.last_state = None;
        &mut self.nodes
    }

    /// Arena access for non-bone nodes that cannot disturb the bone pose.
    pub(crate) fn node_arena_mut(&mut self) -> &mut NodeTree {
        &mut self.nodes
    }

    // Bones

    fn max_handles(&self) -> usize {
        self.options.max_bones.min(usize::from(u16::MAX) + 1)
    }

    fn next_free_handle(&self) -> Result<BoneHandle> {
        let next = self.bones.len();
        if next >= self.max_handles() {
            return Err(SkeletonError::CapacityExceeded {
                max: self.max_handles(),
            });
        }
        Ok(BoneHandle(next as u16))
    }

    fn auto_name(&mut self) -> String {
        loop {
            let name = format!("Unnamed_{}", self.unnamed);
            self.unnamed += 1;
            if !self.bone_names.contains_key(&name) {
                return name;
            }
        }
    }

    fn insert_bone(&mut self, name: String, handle: BoneHandle) -> Result<BoneHandle> {
        let index = handle.index();
        if index >= self.max_handles() {
            return Err(SkeletonError::CapacityExceeded {
                max: self.max_handles(),
            });
        }
        if self.bones.get(index).is_some_and(Option::is_some) {
            return Err(SkeletonError::duplicate(format!(
                "skeleton '{}' already has a bone with handle {handle}",
                self.name
            )));
        }
        if self.bone_names.contains_key(&name) {
            return Err(SkeletonError::duplicate(format!(
                "skeleton '{}' already has a bone named '{name}'",
                self.name
            )));
        }

        let node = self.nodes.create_node(name.clone(), NodeKind::Bone(handle));
        if self.bones.len() <= index {
            self.bones.resize_with(index + 1, || None);
        }
        self.bones[index] = Some(Bone::new(handle, name.clone(), node));
        debug!("skeleton '{}': created bone {handle} '{name}'", self.name);
        self.bone_names.insert(name, handle);
        self.root = OnceLock::new();
        Ok(handle)
    }

    /// Create an unnamed root bone with the given handle.
    pub fn create_bone(&mut self, handle: BoneHandle) -> Result<BoneMut<'_>> {
        let name = self.auto_name();
        let handle = self.insert_bone(name, handle)?;
        self.bone_mut(handle)
    }

    /// Create a named root bone. Without a handle the next free one is used.
    pub fn create_named_bone(
        &mut self,
        name: impl Into<String>,
        handle: Option<BoneHandle>,
    ) -> Result<BoneMut<'_>> {
        let handle = match handle {
            Some(handle) => handle,
            None => self.next_free_handle()?,
        };
        let handle = self.insert_bone(name.into(), handle)?;
        self.bone_mut(handle)
    }

    /// Create an unnamed bone as a child of `parent`, offset by `translate`
    /// and `rotate`.
    pub fn create_child_bone(
        &mut self,
        parent: BoneHandle,
        handle: Option<BoneHandle>,
        translate: Vec3,
        rotate: Quat,
    ) -> Result<BoneHandle> {
        let parent_node = self.bone(parent)?.node();
        let handle = match handle {
            Some(handle) => handle,
            None => self.next_free_handle()?,
        };
        let name = self.auto_name();
        let handle = self.insert_bone(name, handle)?;

        let node = self.bone(handle)?.node();
        self.nodes.set_position(node, translate);
        self.nodes.set_orientation(node, rotate);
        self.nodes.add_child(parent_node, node)?;
        Ok(handle)
    }

    /// Make `child` a child bone of `parent`.
    pub fn set_bone_parent(&mut self, child: BoneHandle, parent: BoneHandle) -> Result<()> {
        let child_node = self.bone(child)?.node();
        let parent_node = self.bone(parent)?.node();
        self.nodes.add_child(parent_node, child_node)?;
        self.root = OnceLock::new();
        Ok(())
    }

    pub fn bone(&self, handle: BoneHandle) -> Result<BoneRef<'_>> {
        let bone = self
            .bones
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| missing_bone(handle))?;
        Ok(BoneRef {
            bone,
            nodes: &self.nodes,
        })
    }

    pub fn bone_mut(&mut self, handle: BoneHandle) -> Result<BoneMut<'_>> {
        let bone = self
            .bones
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| missing_bone(handle))?;
        Ok(BoneMut {
            bone,
            nodes: &mut self.nodes,
        })
    }

    pub fn bone_handle(&self, name: &str) -> Result<BoneHandle> {
        self.bone_names
            .get(name)
            .copied()
            .ok_or_else(|| missing_bone_name(name))
    }

    pub fn bone_by_name(&self, name: &str) -> Result<BoneRef<'_>> {
        self.bone(self.bone_handle(name)?)
    }

    pub fn bone_by_name_mut(&mut self, name: &str) -> Result<BoneMut<'_>> {
        let handle = self.bone_handle(name)?;
        self.bone_mut(handle)
    }

    pub fn has_bone(&self, name: &str) -> bool {
        self.bone_names.contains_key(name)
    }

    /// Number of handle slots, which is one past the highest handle in use.
    /// Unused handles below that count contribute identity bone matrices.
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    /// Bones in handle order.
    pub fn bones(&self) -> impl Iterator<Item = BoneRef<'_>> {
        self.bones.iter().flatten().map(|bone| BoneRef {
            bone,
            nodes: &self.nodes,
        })
    }

    /// Child bones of `handle` in creation order.
    pub fn child_bones(&self, handle: BoneHandle) -> Result<Vec<BoneHandle>> {
        let node = self.bone(handle)?.node();
        Ok(self
            .nodes
            .children(node)
            .iter()
            .filter_map(|&child| match self.nodes.kind(child) {
                NodeKind::Bone(handle) => Some(handle),
                _ => None,
            })
            .collect())
    }

    /// The bone at the top of the hierarchy, found by walking parents from
    /// the lowest handle and cached until the topology changes. A single
    /// rooted hierarchy is assumed.
    pub fn root_bone(&self) -> Result<BoneHandle> {
        if let Some(root) = self.root.get() {
            return Ok(*root);
        }
        let first = self
            .bones
            .iter()
            .flatten()
            .next()
            .ok_or_else(|| SkeletonError::not_found(format!("skeleton '{}' has no bones", self.name)))?;
        let root = match self.nodes.kind(self.nodes.root_of(first.node)) {
            NodeKind::Bone(handle) => handle,
            _ => first.handle,
        };
        let _ = self.root.set(root);
        Ok(root)
    }

    /// Every bone with no parent bone.
    pub fn root_bones(&self) -> Vec<BoneHandle> {
        self.bones
            .iter()
            .flatten()
            .filter(|bone| self.nodes.parent(bone.node).is_none())
            .map(|bone| bone.handle)
            .collect()
    }

    // Poses

    /// Capture the current pose of every bone as the binding pose.
    pub fn set_binding_pose(&mut self) {
        self.nodes.update_all();
        for bone in self.bones.iter_mut().flatten() {
            BoneMut {
                bone,
                nodes: &mut self.nodes,
            }
            .capture_binding_pose();
        }
        self.last_state = None;
        debug!("skeleton '{}': binding pose captured", self.name);
    }

    fn reset_bones(&mut self, reset_manual_bones: bool) {
        for bone in self.bones.iter().flatten() {
            if reset_manual_bones || !bone.manually_controlled {
                self.nodes.reset_to_initial_state(bone.node);
            }
        }
    }

    /// Return bones to the binding pose. Manually controlled bones keep their
    /// pose unless `reset_manual_bones` is set.
    pub fn reset(&mut self, reset_manual_bones: bool) {
        self.reset_bones(reset_manual_bones);
        self.last_state = None;
    }

    // Animations

    pub fn create_animation(&mut self, name: impl Into<String>, length: f32) -> Result<&mut Animation> {
        let name = name.into();
        if self.animations.contains_key(&name) {
            return Err(SkeletonError::duplicate(format!(
                "skeleton '{}' already has an animation named '{name}'",
                self.name
            )));
        }
        debug!("skeleton '{}': created animation '{name}' ({length}s)", self.name);
        self.last_state = None;
        let slot = self
            .animations
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Animation::new(name, length)));
        Ok(Arc::make_mut(slot))
    }

    /// Add an animation shared with other skeletons.
    pub fn add_shared_animation(&mut self, animation: Arc<Animation>) -> Result<()> {
        let name = animation.name().to_string();
        if self.animations.contains_key(&name) {
            return Err(SkeletonError::duplicate(format!(
                "skeleton '{}' already has an animation named '{name}'",
                self.name
            )));
        }
        self.animations.insert(name, animation);
        self.last_state = None;
        Ok(())
    }

    pub fn animation(&self, name: &str) -> Result<&Animation> {
        self.animations
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| missing_animation(name))
    }

    /// Mutable access; an animation shared with other skeletons is copied
    /// first so they are unaffected.
    pub fn animation_mut(&mut self, name: &str) -> Result<&mut Animation> {
        let slot = self
            .animations
            .get_mut(name)
            .ok_or_else(|| missing_animation(name))?;
        self.last_state = None;
        Ok(Arc::make_mut(slot))
    }

    /// Animation by position in name order.
    pub fn animation_at(&self, index: usize) -> Result<&Animation> {
        self.animations
            .values()
            .nth(index)
            .map(AsRef::as_ref)
            .ok_or_else(|| {
                SkeletonError::not_found(format!(
                    "animation index {index} out of range ({} animations)",
                    self.animations.len()
                ))
            })
    }

    pub fn shared_animation(&self, name: &str) -> Result<Arc<Animation>> {
        self.animations
            .get(name)
            .cloned()
            .ok_or_else(|| missing_animation(name))
    }

    pub fn has_animation(&self, name: &str) -> bool {
        self.animations.contains_key(name)
    }

    pub fn remove_animation(&mut self, name: &str) -> Result<()> {
        self.animations
            .remove(name)
            .ok_or_else(|| missing_animation(name))?;
        self.last_state = None;
        Ok(())
    }

    pub fn num_animations(&self) -> usize {
        self.animations.len()
    }

    /// Animations in name order.
    pub fn animations(&self) -> impl Iterator<Item = &Animation> {
        self.animations.values().map(AsRef::as_ref)
    }

    /// Optimise every animation, returning the number of tracks removed.
    pub fn optimise_all_animations(&mut self) -> usize {
        self.last_state = None;
        self.animations
            .values_mut()
            .map(|animation| Arc::make_mut(animation).optimise())
            .sum()
    }

    /// Fill `set` with one disabled state per animation at time 0, weight 1.
    pub fn init_animation_state(&self, set: &mut AnimationStateSet) {
        set.clear();
        for animation in self.animations.values() {
            // names are unique in the map
            let _ = set.create_state(animation.name(), 0.0, animation.length(), 1.0, false);
        }
    }

    /// The state set applied last, if any.
    pub fn animation_state(&self) -> Option<&AnimationStateSet> {
        self.last_state.as_ref()
    }

    /// Pose the skeleton from `states`.
    ///
    /// When `states` equals the set applied last this does nothing and
    /// returns `false`. Otherwise every bone is reset to its binding pose and
    /// each enabled state's animation is applied in set order.
    pub fn set_animation_state(&mut self, states: &AnimationStateSet) -> Result<bool> {
        if self.last_state.as_ref() == Some(states) {
            trace!("skeleton '{}': animation state unchanged", self.name);
            return Ok(false);
        }

        let active = states
            .enabled_states()
            .map(|state| {
                self.shared_animation(state.animation_name())
                    .map(|animation| (animation, state.time_position(), state.weight()))
            })
            .collect::<Result<Vec<_>>>()?;

        self.last_state = None;
        self.reset_bones(false);
        let accumulate = self.options.blend_mode == BlendMode::Cumulative;
        for (animation, time, weight) in &active {
            animation.apply(self, *time, *weight, accumulate)?;
        }
        self.last_state = Some(states.clone());
        Ok(true)
    }

    // Bone matrices

    /// Write one skinning matrix per handle into `out`: the bone's current
    /// derived transform times the inverse of its binding derived transform.
    /// Handles without a bone, and entries past [`Self::num_bones`], get the
    /// identity.
    pub fn bone_matrices(&mut self, out: &mut [Mat4]) {
        self.nodes.update_all();
        let nodes = &mut self.nodes;
        for (slot, matrix) in self.bones.iter().zip(out.iter_mut()) {
            *matrix = match slot {
                Some(bone) => nodes.full_transform(bone.node) * bone.bind_derived_inverse,
                None => Mat4::IDENTITY,
            };
        }
        for matrix in out.iter_mut().skip(self.bones.len()) {
            *matrix = Mat4::IDENTITY;
        }
    }

    /// Allocate and fill a matrix array sized to [`Self::num_bones`].
    pub fn bone_matrix_vec(&mut self) -> Vec<Mat4> {
        let mut matrices = vec![Mat4::IDENTITY; self.num_bones()];
        self.bone_matrices(&mut matrices);
        matrices
    }

    /// Human-readable dump of bones and animations.
    pub fn dump_contents(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "-= Debug output of skeleton {} =-", self.name)?;
        writeln!(out)?;
        writeln!(out, "== Bones ==")?;
        writeln!(out, "Number of bones: {}", self.bones.iter().flatten().count())?;

        for bone in self.bones() {
            let local = bone.local();
            let (axis, angle) = local.orientation.to_axis_angle();
            writeln!(out)?;
            writeln!(out, "-- Bone {} --", bone.handle().0)?;
            writeln!(out, "Name: {}", bone.name())?;
            match bone.parent_node() {
                Some(parent) => writeln!(out, "Parent: {}", self.nodes.name(parent))?,
                None => writeln!(out, "Parent: (root)")?,
            }
            writeln!(
                out,
                "Position: {:.4} {:.4} {:.4}",
                local.position.x, local.position.y, local.position.z
            )?;
            writeln!(
                out,
                "Rotation: {:.4} {:.4} {:.4} {:.4}",
                local.orientation.w, local.orientation.x, local.orientation.y, local.orientation.z
            )?;
            writeln!(
                out,
                "Rotation angle/axis: {:.4} rad around {:.4} {:.4} {:.4}",
                angle, axis.x, axis.y, axis.z
            )?;
        }

        writeln!(out)?;
        writeln!(out, "== Animations ==")?;
        writeln!(out, "Number of animations: {}", self.animations.len())?;
        for animation in self.animations() {
            writeln!(out)?;
            writeln!(out, "-- Animation '{}' (length {}) --", animation.name(), animation.length())?;
            writeln!(out, "Number of tracks: {}", animation.num_tracks())?;
            for track in animation.tracks() {
                writeln!(out, "  -- Track for bone {} --", track.handle().0)?;
                writeln!(out, "  Number of keyframes: {}", track.num_key_frames())?;
                for key in track.key_frames() {
                    writeln!(
                        out,
                        "    t={:.4} translate=({:.4}, {:.4}, {:.4}) rotation=({:.4}, {:.4}, {:.4}, {:.4})",
                        key.time(),
                        key.translate.x,
                        key.translate.y,
                        key.translate.z,
                        key.rotation.w,
                        key.rotation.x,
                        key.rotation.y,
                        key.rotation.z
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl AnimationTarget for Skeleton {
    fn apply_key_frame(&mut self, handle: BoneHandle, key: &KeyFrame, blend: TrackBlend) -> Result<()> {
        let bone = self
            .bones
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| missing_bone(handle))?;
        if bone.manually_controlled {
            return Ok(());
        }
        apply_key_frame_to_node(&mut self.nodes, bone.node, key, blend);
        Ok(())
    }
}
