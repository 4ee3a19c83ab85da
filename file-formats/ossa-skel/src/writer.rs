//! Skeleton file writing

use crate::chunks::{
    AnimationChunk, BoneChunk, BoneParentChunk, Chunk, HEADER_CHUNK_ID, SERIALIZER_VERSION,
    write_string,
};
use crate::error::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use ossa_skeleton::{NodeKind, Skeleton};
use std::io::Write;

pub fn write_file_header(writer: &mut impl Write) -> Result<()> {
    writer.write_u16::<LittleEndian>(HEADER_CHUNK_ID)?;
    write_string(writer, SERIALIZER_VERSION)
}

/// Encode `skeleton` in its binding pose: every bone, then every parent
/// link, then every animation.
pub fn write_skeleton(writer: &mut impl Write, skeleton: &Skeleton) -> Result<()> {
    write_file_header(writer)?;

    for bone in skeleton.bones() {
        BoneChunk::from_bone(&bone).write_chunk(writer)?;
    }

    let nodes = skeleton.nodes();
    let mut links = 0;
    for bone in skeleton.bones() {
        let parent = bone.parent_node().map(|node| nodes.kind(node));
        if let Some(NodeKind::Bone(parent)) = parent {
            BoneParentChunk {
                child: bone.handle().0,
                parent: parent.0,
            }
            .write_chunk(writer)?;
            links += 1;
        }
    }

    for animation in skeleton.animations() {
        AnimationChunk::from_animation(animation).write_chunk(writer)?;
    }

    debug!(
        "wrote skeleton '{}': {} bones, {links} parent links, {} animations",
        skeleton.name(),
        skeleton.num_bones(),
        skeleton.num_animations()
    );
    Ok(())
}
