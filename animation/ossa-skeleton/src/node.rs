//! Arena-backed transform hierarchy
//!
//! Every node lives in a [`NodeTree`] and is addressed by a [`NodeId`]. A node
//! stores its parent's id and an ordered list of child ids, so the arena owns
//! every node and no node holds a pointer to another.
//!
//! Each node carries a parent-relative [`Transform`] and a cached derived
//! (world) transform. Mutating a node marks it and its whole subtree dirty;
//! reading a derived value refreshes the dirty chain from the nearest clean
//! ancestor downwards. A dirty node only ever has dirty descendants, so the
//! cache is never observed stale.

use crate::bone::BoneHandle;
use crate::error::{Result, SkeletonError};
use crate::instance::TagPointId;
use crate::math::{make_transform, slerp};
use glam::{Mat4, Quat, Vec3};

/// Stable index of a node inside its [`NodeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position, orientation and scale of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub const fn new(position: Vec3, orientation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            orientation,
            scale,
        }
    }

    /// Unscaled transform.
    pub const fn from_position_orientation(position: Vec3, orientation: Quat) -> Self {
        Self::new(position, orientation, Vec3::ONE)
    }

    /// 4x4 matrix: rotation with scaled axes, then translation.
    pub fn to_matrix(&self) -> Mat4 {
        make_transform(self.position, self.scale, self.orientation)
    }

    /// Compose a child's local transform onto this (parent derived) transform.
    pub fn then_child(&self, local: &Self, inherit_scale: bool) -> Self {
        let orientation = self.orientation * local.orientation;
        let mut position = self.orientation * local.position;
        let scale = if inherit_scale {
            position *= self.scale;
            local.scale * self.scale
        } else {
            local.scale
        };
        Self {
            position: position + self.position,
            orientation,
            scale,
        }
    }

    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        self.position.abs_diff_eq(other.position, max_abs_diff)
            && self.orientation.abs_diff_eq(other.orientation, max_abs_diff)
            && self.scale.abs_diff_eq(other.scale, max_abs_diff)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Reference frame for relative translations and rotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformSpace {
    /// Along the node's own axes.
    Local,
    /// Along the parent's axes.
    #[default]
    Parent,
}

/// What a node in the arena represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A plain transform node.
    Node,
    /// The node of a skeleton bone.
    Bone(BoneHandle),
    /// An attachment point following a bone.
    TagPoint(TagPointId),
}

/// Running weighted average of animation offsets from the initial state.
#[derive(Debug, Clone, Copy)]
struct BlendAccumulator {
    weight: f32,
    translate: Vec3,
    rotate: Quat,
    scale: Vec3,
}

impl Default for BlendAccumulator {
    fn default() -> Self {
        Self {
            weight: 0.0,
            translate: Vec3::ZERO,
            rotate: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

#[derive(Debug, Clone)]
struct NodeSlot {
    name: String,
    kind: NodeKind,
    local: Transform,
    initial: Transform,
    inherit_scale: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    derived: Transform,
    full: Mat4,
    dirty: bool,
    blend: BlendAccumulator,
}

impl NodeSlot {
    fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            local: Transform::IDENTITY,
            initial: Transform::IDENTITY,
            inherit_scale: true,
            parent: None,
            children: Vec::new(),
            derived: Transform::IDENTITY,
            full: Mat4::IDENTITY,
            dirty: false,
            blend: BlendAccumulator::default(),
        }
    }
}

/// Arena owning a forest of transform nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    slots: Vec<NodeSlot>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parentless node with an identity transform.
    pub fn create_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(NodeSlot::new(name.into(), kind));
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.slots.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.slots.len()).map(|i| NodeId(i as u32))
    }

    fn slot(&self, id: NodeId) -> &NodeSlot {
        &self.slots[id.index()]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut NodeSlot {
        &mut self.slots[id.index()]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.slot(id).name
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.slot_mut(id).name = name.into();
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.slot(id).kind
    }

    pub(crate) fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.slot_mut(id).kind = kind;
    }

    // Local transform

    pub fn local(&self, id: NodeId) -> Transform {
        self.slot(id).local
    }

    pub fn position(&self, id: NodeId) -> Vec3 {
        self.slot(id).local.position
    }

    pub fn orientation(&self, id: NodeId) -> Quat {
        self.slot(id).local.orientation
    }

    pub fn scale(&self, id: NodeId) -> Vec3 {
        self.slot(id).local.scale
    }

    pub fn set_local(&mut self, id: NodeId, local: Transform) {
        self.slot_mut(id).local = local;
        self.needs_update(id);
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) {
        self.slot_mut(id).local.position = position;
        self.needs_update(id);
    }

    /// Overwrite the orientation; the quaternion is normalised on the way in.
    pub fn set_orientation(&mut self, id: NodeId, orientation: Quat) {
        self.slot_mut(id).local.orientation = orientation.normalize();
        self.needs_update(id);
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) {
        self.slot_mut(id).local.scale = scale;
        self.needs_update(id);
    }

    pub fn inherit_scale(&self, id: NodeId) -> bool {
        self.slot(id).inherit_scale
    }

    pub fn set_inherit_scale(&mut self, id: NodeId, inherit: bool) {
        self.slot_mut(id).inherit_scale = inherit;
        self.needs_update(id);
    }

    /// Move the node by `delta`, expressed in `space`.
    pub fn translate(&mut self, id: NodeId, delta: Vec3, space: TransformSpace) {
        let slot = self.slot_mut(id);
        let delta = match space {
            TransformSpace::Local => slot.local.orientation * delta,
            TransformSpace::Parent => delta,
        };
        slot.local.position += delta;
        self.needs_update(id);
    }

    /// Rotate the node by `rotation`, expressed in `space`.
    pub fn rotate(&mut self, id: NodeId, rotation: Quat, space: TransformSpace) {
        let slot = self.slot_mut(id);
        let orientation = match space {
            TransformSpace::Local => slot.local.orientation * rotation,
            TransformSpace::Parent => rotation * slot.local.orientation,
        };
        slot.local.orientation = orientation.normalize();
        self.needs_update(id);
    }

    /// Multiply the current scale componentwise.
    pub fn scale_by(&mut self, id: NodeId, factor: Vec3) {
        self.slot_mut(id).local.scale *= factor;
        self.needs_update(id);
    }

    // Initial state and weighted blending

    /// Remember the current local transform as the initial state.
    pub fn set_initial_state(&mut self, id: NodeId) {
        let slot = self.slot_mut(id);
        slot.initial = slot.local;
    }

    pub fn initial(&self, id: NodeId) -> Transform {
        self.slot(id).initial
    }

    /// Restore the initial state and clear any accumulated weighted blend.
    pub fn reset_to_initial_state(&mut self, id: NodeId) {
        let slot = self.slot_mut(id);
        slot.local = slot.initial;
        slot.blend = BlendAccumulator::default();
        self.needs_update(id);
    }

    /// Blend an offset from the initial state into the node.
    ///
    /// Successive calls keep a running weighted average of the offsets, so
    /// two calls with equal weight land halfway between them. The local
    /// transform becomes the initial state composed with that average.
    pub fn weighted_transform(
        &mut self,
        id: NodeId,
        weight: f32,
        translate: Vec3,
        rotate: Quat,
        scale: Vec3,
    ) {
        let slot = self.slot_mut(id);
        let blend = &mut slot.blend;
        if blend.weight == 0.0 {
            *blend = BlendAccumulator {
                weight,
                translate,
                rotate,
                scale,
            };
        } else {
            let factor = weight / (blend.weight + weight);
            blend.translate += (translate - blend.translate) * factor;
            blend.rotate = slerp(blend.rotate, rotate, factor, true);
            blend.scale *= (scale - Vec3::ONE) * factor + Vec3::ONE;
            blend.weight += weight;
        }

        slot.local = Transform {
            position: slot.initial.position + blend.translate,
            orientation: (slot.initial.orientation * blend.rotate).normalize(),
            scale: slot.initial.scale * blend.scale,
        };
        self.needs_update(id);
    }

    // Hierarchy

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slot(id).children
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.slot(id).children.len()
    }

    pub fn child(&self, id: NodeId, index: usize) -> Result<NodeId> {
        self.slot(id).children.get(index).copied().ok_or_else(|| {
            SkeletonError::invalid_argument(format!(
                "child index {index} out of range for node '{}'",
                self.name(id)
            ))
        })
    }

    /// Walk parent links up to the parentless ancestor.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.slot(current).parent {
            current = parent;
        }
        current
    }

    pub fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = self.slot(of).parent;
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.slot(node).parent;
        }
        false
    }

    /// Make `child` the last child of `parent`.
    ///
    /// The child is refreshed against its new parent immediately. Fails if
    /// the child already has a parent or the link would close a cycle.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if let Some(current) = self.slot(child).parent {
            return Err(SkeletonError::invalid_argument(format!(
                "node '{}' is already a child of '{}'",
                self.name(child),
                self.name(current)
            )));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SkeletonError::invalid_argument(format!(
                "attaching '{}' under '{}' would create a cycle",
                self.name(child),
                self.name(parent)
            )));
        }

        self.slot_mut(parent).children.push(child);
        self.slot_mut(child).parent = Some(parent);
        self.needs_update(child);
        self.refresh(child);
        Ok(())
    }

    /// Detach and return the child at `index`.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> Result<NodeId> {
        let child = self.child(parent, index)?;
        self.slot_mut(parent).children.remove(index);
        self.orphan(child);
        Ok(child)
    }

    /// Detach `child` from `parent`.
    pub fn remove_child_node(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let index = self
            .slot(parent)
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                SkeletonError::not_found(format!(
                    "node '{}' is not a child of '{}'",
                    self.name(child),
                    self.name(parent)
                ))
            })?;
        self.remove_child(parent, index).map(|_| ())
    }

    pub fn remove_all_children(&mut self, parent: NodeId) {
        let children = std::mem::take(&mut self.slot_mut(parent).children);
        for child in children {
            self.orphan(child);
        }
    }

    /// Detach a node from whatever parent it has.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.slot(id).parent {
            self.slot_mut(parent).children.retain(|&c| c != id);
            self.orphan(id);
        }
    }

    fn orphan(&mut self, child: NodeId) {
        self.slot_mut(child).parent = None;
        self.needs_update(child);
    }

    // Derived transform cache

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.slot(id).dirty
    }

    /// Mark a node and its subtree out of date. Stops descending at nodes
    /// that are already dirty, whose subtrees are dirty too.
    fn needs_update(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let slot = self.slot_mut(node);
            if slot.dirty {
                continue;
            }
            slot.dirty = true;
            stack.extend_from_slice(&slot.children);
        }
    }

    /// Recompute one node from its (already clean) parent.
    fn update_from_parent(&mut self, id: NodeId) {
        let parent = self.slot(id).parent.map(|p| self.slot(p).derived);
        let slot = self.slot_mut(id);
        slot.derived = match parent {
            Some(parent) => parent.then_child(&slot.local, slot.inherit_scale),
            None => slot.local,
        };
        slot.full = slot.derived.to_matrix();
        slot.dirty = false;
    }

    /// Bring `id` up to date, refreshing dirty ancestors top-down first.
    fn refresh(&mut self, id: NodeId) {
        if !self.slot(id).dirty {
            return;
        }
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if !self.slot(node).dirty {
                break;
            }
            chain.push(node);
            current = self.slot(node).parent;
        }
        for node in chain.into_iter().rev() {
            self.update_from_parent(node);
        }
    }

    /// Explicit refresh of `id`, optionally cascading through its subtree.
    pub fn update(&mut self, id: NodeId, recursive: bool) {
        self.refresh(id);
        if !recursive {
            return;
        }
        let mut stack: Vec<NodeId> = self.slot(id).children.clone();
        while let Some(node) = stack.pop() {
            if self.slot(node).dirty {
                self.update_from_parent(node);
            }
            stack.extend_from_slice(&self.slot(node).children);
        }
    }

    /// Refresh every node in the arena.
    pub fn update_all(&mut self) {
        let roots: Vec<NodeId> = self
            .ids()
            .filter(|&id| self.slot(id).parent.is_none())
            .collect();
        for root in roots {
            self.update(root, true);
        }
    }

    /// Derived transform, recomputed lazily if out of date.
    pub fn derived(&mut self, id: NodeId) -> Transform {
        self.refresh(id);
        self.slot(id).derived
    }

    pub fn derived_position(&mut self, id: NodeId) -> Vec3 {
        self.derived(id).position
    }

    pub fn derived_orientation(&mut self, id: NodeId) -> Quat {
        self.derived(id).orientation
    }

    pub fn derived_scale(&mut self, id: NodeId) -> Vec3 {
        self.derived(id).scale
    }

    /// Derived 4x4 transform, recomputed lazily if out of date.
    pub fn full_transform(&mut self, id: NodeId) -> Mat4 {
        self.refresh(id);
        self.slot(id).full
    }

    /// Derived transform without refreshing; `None` while the node is dirty.
    pub fn cached_derived(&self, id: NodeId) -> Option<Transform> {
        let slot = self.slot(id);
        (!slot.dirty).then_some(slot.derived)
    }

    /// Derived matrix without refreshing; `None` while the node is dirty.
    pub fn cached_full_transform(&self, id: NodeId) -> Option<Mat4> {
        let slot = self.slot(id);
        (!slot.dirty).then_some(slot.full)
    }
}
