//! Bones: transform nodes with a stable handle and a binding pose

use crate::math::make_inverse_transform;
use crate::node::{NodeId, NodeTree, Transform, TransformSpace};
use glam::{Mat4, Quat, Vec3};
use std::fmt;

/// Maximum number of bones a skeleton may hold.
pub const MAX_BONES: usize = 256;

/// Small dense integer identifying a bone within one skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneHandle(pub u16);

impl BoneHandle {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BoneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u16> for BoneHandle {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Bone record stored by a skeleton. The transform itself lives in the
/// skeleton's node arena; use [`BoneRef`] and [`BoneMut`] to work with it.
#[derive(Debug, Clone)]
pub struct Bone {
    pub(crate) handle: BoneHandle,
    pub(crate) name: String,
    pub(crate) node: NodeId,
    pub(crate) binding_pose: Transform,
    pub(crate) bind_derived_inverse: Mat4,
    pub(crate) manually_controlled: bool,
}

impl Bone {
    pub(crate) fn new(handle: BoneHandle, name: String, node: NodeId) -> Self {
        Self {
            handle,
            name,
            node,
            binding_pose: Transform::IDENTITY,
            bind_derived_inverse: Mat4::IDENTITY,
            manually_controlled: false,
        }
    }

    pub fn handle(&self) -> BoneHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Local transform recorded by the last binding-pose capture.
    pub fn binding_pose(&self) -> Transform {
        self.binding_pose
    }

    /// Inverse of the derived transform at the last binding-pose capture.
    pub fn bind_derived_inverse(&self) -> Mat4 {
        self.bind_derived_inverse
    }

    pub fn is_manually_controlled(&self) -> bool {
        self.manually_controlled
    }
}

/// Read-only view of a bone and its transform.
#[derive(Clone, Copy)]
pub struct BoneRef<'a> {
    pub(crate) bone: &'a Bone,
    pub(crate) nodes: &'a NodeTree,
}

impl<'a> BoneRef<'a> {
    pub fn bone(&self) -> &'a Bone {
        self.bone
    }

    pub fn handle(&self) -> BoneHandle {
        self.bone.handle
    }

    pub fn name(&self) -> &'a str {
        &self.bone.name
    }

    pub fn node(&self) -> NodeId {
        self.bone.node
    }

    pub fn position(&self) -> Vec3 {
        self.nodes.position(self.bone.node)
    }

    pub fn orientation(&self) -> Quat {
        self.nodes.orientation(self.bone.node)
    }

    pub fn scale(&self) -> Vec3 {
        self.nodes.scale(self.bone.node)
    }

    pub fn local(&self) -> Transform {
        self.nodes.local(self.bone.node)
    }

    pub fn parent_node(&self) -> Option<NodeId> {
        self.nodes.parent(self.bone.node)
    }

    pub fn is_manually_controlled(&self) -> bool {
        self.bone.manually_controlled
    }

    /// Derived transform if the cache is current.
    pub fn cached_derived(&self) -> Option<Transform> {
        self.nodes.cached_derived(self.bone.node)
    }
}

impl fmt::Debug for BoneRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoneRef")
            .field("handle", &self.bone.handle)
            .field("name", &self.bone.name)
            .field("local", &self.local())
            .finish()
    }
}

/// Mutable view of a bone and its transform.
pub struct BoneMut<'a> {
    pub(crate) bone: &'a mut Bone,
    pub(crate) nodes: &'a mut NodeTree,
}

impl BoneMut<'_> {
    pub fn handle(&self) -> BoneHandle {
        self.bone.handle
    }

    pub fn name(&self) -> &str {
        &self.bone.name
    }

    pub fn node(&self) -> NodeId {
        self.bone.node
    }

    pub fn local(&self) -> Transform {
        self.nodes.local(self.bone.node)
    }

    pub fn position(&self) -> Vec3 {
        self.nodes.position(self.bone.node)
    }

    pub fn orientation(&self) -> Quat {
        self.nodes.orientation(self.bone.node)
    }

    pub fn scale(&self) -> Vec3 {
        self.nodes.scale(self.bone.node)
    }

    pub fn set_position(&mut self, position: Vec3) -> &mut Self {
        self.nodes.set_position(self.bone.node, position);
        self
    }

    pub fn set_orientation(&mut self, orientation: Quat) -> &mut Self {
        self.nodes.set_orientation(self.bone.node, orientation);
        self
    }

    pub fn set_scale(&mut self, scale: Vec3) -> &mut Self {
        self.nodes.set_scale(self.bone.node, scale);
        self
    }

    pub fn translate(&mut self, delta: Vec3, space: TransformSpace) -> &mut Self {
        self.nodes.translate(self.bone.node, delta, space);
        self
    }

    pub fn rotate(&mut self, rotation: Quat, space: TransformSpace) -> &mut Self {
        self.nodes.rotate(self.bone.node, rotation, space);
        self
    }

    pub fn scale_by(&mut self, factor: Vec3) -> &mut Self {
        self.nodes.scale_by(self.bone.node, factor);
        self
    }

    /// Keep animation from touching this bone; the caller positions it.
    pub fn set_manually_controlled(&mut self, manual: bool) -> &mut Self {
        self.bone.manually_controlled = manual;
        self
    }

    pub fn is_manually_controlled(&self) -> bool {
        self.bone.manually_controlled
    }

    pub fn derived(&mut self) -> Transform {
        self.nodes.derived(self.bone.node)
    }

    pub fn derived_position(&mut self) -> Vec3 {
        self.nodes.derived_position(self.bone.node)
    }

    pub fn derived_orientation(&mut self) -> Quat {
        self.nodes.derived_orientation(self.bone.node)
    }

    /// Freeze the current local pose as the binding pose and record the
    /// inverse of the current derived transform.
    ///
    /// The derived transform is refreshed here, so the capture is valid even
    /// if no hierarchy update has run since the pose was set.
    pub fn capture_binding_pose(&mut self) {
        let node = self.bone.node;
        self.nodes.set_initial_state(node);
        let derived = self.nodes.derived(node);
        self.bone.binding_pose = self.nodes.local(node);
        self.bone.bind_derived_inverse =
            make_inverse_transform(derived.position, derived.scale, derived.orientation);
    }

    /// Restore the local transform captured by the binding pose.
    pub fn reset_to_binding_pose(&mut self) {
        self.nodes.reset_to_initial_state(self.bone.node);
    }

    /// Current derived transform times the inverse binding transform.
    pub fn offset_transform(&mut self) -> Mat4 {
        self.nodes.full_transform(self.bone.node) * self.bone.bind_derived_inverse
    }
}
