//! Per-use copies of a skeleton with attachment points
//!
//! A [`SkeletonInstance`] clones the bone hierarchy of a master [`Skeleton`]
//! so it can be posed independently, while the animations themselves stay
//! shared. Objects such as weapons or particle emitters follow individual
//! bones through tag points, which are pooled and reused across
//! attach/detach cycles.

use crate::animation::AnimationStateSet;
use crate::bone::BoneHandle;
use crate::error::{Result, SkeletonError};
use crate::frame::{Frame, FrameCache};
use crate::node::{NodeId, NodeKind, Transform};
use crate::skeleton::Skeleton;
use glam::{Mat4, Quat, Vec3};
use log::{debug, trace};
use std::collections::BTreeMap;
use std::fmt;

/// Index of a tag point within its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagPointId(u32);

impl TagPointId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TagPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

/// An object that can ride on a bone.
pub trait Attachable: fmt::Debug + Send + Sync {
    /// Unique name within one instance's attachments.
    fn name(&self) -> &str;

    fn is_attached(&self) -> bool;

    /// Called with the tag point on attach and with `None` on detach.
    fn notify_attached(&mut self, tag_point: Option<TagPointId>);
}

#[derive(Debug, Clone)]
struct TagPointSlot {
    node: NodeId,
    bone: Option<BoneHandle>,
    in_use: bool,
}

#[derive(Debug)]
struct Attachment {
    tag_point: TagPointId,
    object: Box<dyn Attachable>,
}

/// An independently posable copy of a skeleton.
#[derive(Debug)]
pub struct SkeletonInstance {
    skeleton: Skeleton,
    tag_points: Vec<TagPointSlot>,
    free_tag_points: Vec<TagPointId>,
    attachments: BTreeMap<String, Attachment>,
    matrices: FrameCache<Vec<Mat4>>,
}

impl SkeletonInstance {
    /// Copy the bones of `master`. Animations are shared, not copied.
    pub fn new(master: &Skeleton) -> Self {
        let mut skeleton = master.clone();
        skeleton.reset(true);
        debug!(
            "created instance of skeleton '{}' with {} bones",
            skeleton.name(),
            skeleton.num_bones()
        );
        Self {
            skeleton,
            tag_points: Vec::new(),
            free_tag_points: Vec::new(),
            attachments: BTreeMap::new(),
            matrices: FrameCache::new(Vec::new()),
        }
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// Mutable access to the instance's skeleton. Drops the cached bone
    /// matrices since the pose may change.
    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        self.matrices.invalidate();
        &mut self.skeleton
    }

    pub fn name(&self) -> &str {
        self.skeleton.name()
    }

    // Tag points

    /// Attach a tag point under `bone`, offset by the given rotation and
    /// position. A previously freed tag point is reused when available.
    pub fn create_tag_point_on_bone(
        &mut self,
        bone: BoneHandle,
        offset_orientation: Quat,
        offset_position: Vec3,
    ) -> Result<TagPointId> {
        let bone_node = self.skeleton.bone(bone)?.node();

        let id = match self.free_tag_points.pop() {
            Some(id) => {
                trace!("reusing pooled tag point {id}");
                id
            }
            None => {
                let id = TagPointId(self.tag_points.len() as u32);
                let node = self
                    .skeleton
                    .node_arena_mut()
                    .create_node(format!("TagPoint_{}", id.0), NodeKind::TagPoint(id));
                self.tag_points.push(TagPointSlot {
                    node,
                    bone: None,
                    in_use: false,
                });
                id
            }
        };

        let node = self.tag_points[id.index()].node;
        let nodes = self.skeleton.node_arena_mut();
        nodes.set_local(
            node,
            Transform::from_position_orientation(offset_position, offset_orientation),
        );
        if let Err(err) = nodes.add_child(bone_node, node) {
            self.free_tag_points.push(id);
            return Err(err);
        }
        nodes.set_initial_state(node);

        let slot = &mut self.tag_points[id.index()];
        slot.bone = Some(bone);
        slot.in_use = true;
        Ok(id)
    }

    /// Detach a tag point from its bone and return it to the pool.
    pub fn free_tag_point(&mut self, id: TagPointId) -> Result<()> {
        let slot = self.tag_point_slot(id)?;
        if self
            .attachments
            .values()
            .any(|attachment| attachment.tag_point == id)
        {
            return Err(SkeletonError::invalid_argument(format!(
                "tag point {id} still carries an object; detach it instead"
            )));
        }
        let node = slot.node;
        self.skeleton.node_arena_mut().detach(node);

        let slot = &mut self.tag_points[id.index()];
        slot.bone = None;
        slot.in_use = false;
        self.free_tag_points.push(id);
        Ok(())
    }

    fn tag_point_slot(&self, id: TagPointId) -> Result<&TagPointSlot> {
        match self.tag_points.get(id.index()) {
            Some(slot) if slot.in_use => Ok(slot),
            _ => Err(SkeletonError::invalid_argument(format!(
                "tag point {id} is not in use"
            ))),
        }
    }

    /// The bone a tag point is attached to.
    pub fn tag_point_bone(&self, id: TagPointId) -> Result<BoneHandle> {
        let slot = self.tag_point_slot(id)?;
        slot.bone
            .ok_or_else(|| SkeletonError::invalid_argument(format!("tag point {id} has no bone")))
    }

    /// World transform of a tag point, following its bone.
    pub fn tag_point_derived(&mut self, id: TagPointId) -> Result<Transform> {
        let node = self.tag_point_slot(id)?.node;
        Ok(self.skeleton.node_arena_mut().derived(node))
    }

    /// World matrix of a tag point.
    pub fn tag_point_transform(&mut self, id: TagPointId) -> Result<Mat4> {
        let node = self.tag_point_slot(id)?.node;
        Ok(self.skeleton.node_arena_mut().full_transform(node))
    }

    pub fn num_tag_points(&self) -> usize {
        self.tag_points.iter().filter(|slot| slot.in_use).count()
    }

    /// Tag points waiting in the pool.
    pub fn num_free_tag_points(&self) -> usize {
        self.free_tag_points.len()
    }

    // Attachments

    /// Attach `object` to the bone named `bone_name` through a new tag point.
    pub fn attach_object_to_bone(
        &mut self,
        bone_name: &str,
        mut object: Box<dyn Attachable>,
        offset_orientation: Quat,
        offset_position: Vec3,
    ) -> Result<TagPointId> {
        if object.is_attached() {
            return Err(SkeletonError::invalid_argument(format!(
                "object '{}' is already attached",
                object.name()
            )));
        }
        if self.attachments.contains_key(object.name()) {
            return Err(SkeletonError::duplicate(format!(
                "an object named '{}' is already attached",
                object.name()
            )));
        }

        let bone = self.skeleton.bone_handle(bone_name)?;
        let tag_point = self.create_tag_point_on_bone(bone, offset_orientation, offset_position)?;
        object.notify_attached(Some(tag_point));
        debug!(
            "attached '{}' to bone '{bone_name}' via {tag_point}",
            object.name()
        );
        self.attachments.insert(
            object.name().to_string(),
            Attachment { tag_point, object },
        );
        Ok(tag_point)
    }

    /// Detach an object by name, freeing its tag point.
    pub fn detach_object(&mut self, name: &str) -> Result<Box<dyn Attachable>> {
        let Attachment {
            tag_point,
            mut object,
        } = self.attachments.remove(name).ok_or_else(|| {
            SkeletonError::not_found(format!("no object named '{name}' is attached"))
        })?;
        self.free_tag_point(tag_point)?;
        object.notify_attached(None);
        Ok(object)
    }

    /// Detach every object, returning them in name order.
    pub fn detach_all_objects(&mut self) -> Vec<Box<dyn Attachable>> {
        let attachments = std::mem::take(&mut self.attachments);
        let mut detached = Vec::with_capacity(attachments.len());
        for (_, Attachment { tag_point, mut object }) in attachments {
            // no attachment references it any more, so this cannot fail
            let _ = self.free_tag_point(tag_point);
            object.notify_attached(None);
            detached.push(object);
        }
        detached
    }

    pub fn attached_object(&self, name: &str) -> Result<&dyn Attachable> {
        self.attachments
            .get(name)
            .map(|attachment| attachment.object.as_ref())
            .ok_or_else(|| SkeletonError::not_found(format!("no object named '{name}' is attached")))
    }

    /// Tag point carrying the named object.
    pub fn attachment_tag_point(&self, name: &str) -> Result<TagPointId> {
        self.attachments
            .get(name)
            .map(|attachment| attachment.tag_point)
            .ok_or_else(|| SkeletonError::not_found(format!("no object named '{name}' is attached")))
    }

    pub fn num_attached_objects(&self) -> usize {
        self.attachments.len()
    }

    // Posing

    /// Pose the instance; see [`Skeleton::set_animation_state`].
    pub fn set_animation_state(&mut self, states: &AnimationStateSet) -> Result<bool> {
        let changed = self.skeleton.set_animation_state(states)?;
        if changed {
            self.matrices.invalidate();
        }
        Ok(changed)
    }

    /// Bone matrices for `frame`, recomputed only if the cache belongs to a
    /// different frame or the pose changed since it was filled.
    pub fn bone_matrices_for(&mut self, frame: Frame) -> &[Mat4] {
        let skeleton = &mut self.skeleton;
        let (matrices, refreshed) = self.matrices.get_or_refresh(frame, |out| {
            out.resize(skeleton.num_bones(), Mat4::IDENTITY);
            skeleton.bone_matrices(out);
        });
        if refreshed {
            trace!(
                "skeleton '{}': bone matrices rebuilt for frame {}",
                skeleton.name(),
                frame.number()
            );
        }
        matrices
    }

    /// Matrices cached for `frame`, if that frame has been computed.
    pub fn cached_bone_matrices(&self, frame: Frame) -> Option<&[Mat4]> {
        self.matrices.get(frame).map(Vec::as_slice)
    }

    /// Frame of the cached matrices, if any.
    pub fn cached_frame(&self) -> Option<Frame> {
        self.matrices.frame()
    }

    /// Drop the cached matrices so the next frame request rebuilds them.
    pub fn invalidate_bone_matrices(&mut self) {
        self.matrices.invalidate();
    }
}
