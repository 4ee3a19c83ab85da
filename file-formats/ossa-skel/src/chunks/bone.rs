//! BONE and BONE_PARENT chunks

use super::{
    BONE, BONE_PARENT, Chunk, ChunkHeader, QUAT_SIZE, VEC3_SIZE, string_size, write_quat,
    write_string, write_vec3,
};
use crate::error::Result;
use crate::reader::ChunkStream;
use byteorder::{LittleEndian, WriteBytesExt};
use glam::{Quat, Vec3};
use log::debug;
use ossa_skeleton::{BoneHandle, BoneRef, Skeleton};
use std::io::{Read, Seek, Write};

/// BONE chunk - one bone in its binding pose
#[derive(Debug, Clone, PartialEq)]
pub struct BoneChunk {
    pub name: String,
    pub handle: u16,
    /// Position relative to the parent
    pub position: Vec3,
    /// Orientation relative to the parent
    pub orientation: Quat,
    /// Written only when it differs from one
    pub scale: Option<Vec3>,
}

impl BoneChunk {
    /// Chunk for `bone` in its binding pose.
    pub fn from_bone(bone: &BoneRef<'_>) -> Self {
        let pose = bone.bone().binding_pose();
        Self {
            name: bone.name().to_string(),
            handle: bone.handle().0,
            position: pose.position,
            orientation: pose.orientation,
            scale: (pose.scale != Vec3::ONE).then_some(pose.scale),
        }
    }

    /// Create the bone in `skeleton`.
    pub fn create_in(&self, skeleton: &mut Skeleton) -> Result<()> {
        let mut bone = skeleton.create_named_bone(self.name.clone(), Some(BoneHandle(self.handle)))?;
        bone.set_position(self.position)
            .set_orientation(self.orientation);
        if let Some(scale) = self.scale {
            bone.set_scale(scale);
        }
        debug!("bone {} '{}'", self.handle, self.name);
        Ok(())
    }

    fn fixed_size(&self) -> usize {
        string_size(&self.name) + 2 + VEC3_SIZE + QUAT_SIZE
    }
}

impl Chunk for BoneChunk {
    const ID: u16 = BONE;

    fn read<R: Read + Seek>(stream: &mut ChunkStream<R>, header: ChunkHeader) -> Result<Self> {
        let name = stream.read_string()?;
        let handle = stream.read_u16()?;
        let position = stream.read_vec3()?;
        let orientation = stream.read_quat()?;

        let mut chunk = Self {
            name,
            handle,
            position,
            orientation,
            scale: None,
        };
        let fixed = chunk.fixed_size();
        if header.payload_len() >= fixed + VEC3_SIZE {
            chunk.scale = Some(stream.read_vec3()?);
            stream.skip(header.payload_len() - fixed - VEC3_SIZE)?;
        } else if header.payload_len() > fixed {
            stream.skip(header.payload_len() - fixed)?;
        }
        Ok(chunk)
    }

    fn write_payload(&self, writer: &mut impl Write) -> Result<()> {
        write_string(writer, &self.name)?;
        writer.write_u16::<LittleEndian>(self.handle)?;
        write_vec3(writer, self.position)?;
        write_quat(writer, self.orientation)?;
        if let Some(scale) = self.scale {
            write_vec3(writer, scale)?;
        }
        Ok(())
    }

    fn payload_size(&self) -> usize {
        self.fixed_size() + self.scale.map_or(0, |_| VEC3_SIZE)
    }
}

/// BONE_PARENT chunk - links a child bone under its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneParentChunk {
    pub child: u16,
    pub parent: u16,
}

impl BoneParentChunk {
    /// Attach the child under the parent. Both bones must already exist.
    pub fn link_in(&self, skeleton: &mut Skeleton) -> Result<()> {
        skeleton.set_bone_parent(BoneHandle(self.child), BoneHandle(self.parent))?;
        Ok(())
    }
}

impl Chunk for BoneParentChunk {
    const ID: u16 = BONE_PARENT;

    fn read<R: Read + Seek>(stream: &mut ChunkStream<R>, header: ChunkHeader) -> Result<Self> {
        let child = stream.read_u16()?;
        let parent = stream.read_u16()?;
        if header.payload_len() > 4 {
            stream.skip(header.payload_len() - 4)?;
        }
        Ok(Self { child, parent })
    }

    fn write_payload(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.child)?;
        writer.write_u16::<LittleEndian>(self.parent)?;
        Ok(())
    }

    fn payload_size(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn round_trip(chunk: &BoneChunk) -> BoneChunk {
        let mut data = Vec::new();
        chunk.write_chunk(&mut data).unwrap();
        assert_eq!(data.len(), chunk.chunk_size());

        let mut stream = ChunkStream::new(Cursor::new(data)).unwrap();
        let header = stream.read_header().unwrap();
        assert_eq!(header.id, BONE);
        let read = BoneChunk::read(&mut stream, header).unwrap();
        assert!(stream.is_eof().unwrap());
        read
    }

    #[test]
    fn test_bone_without_scale() {
        let chunk = BoneChunk {
            name: "spine".to_string(),
            handle: 3,
            position: Vec3::new(0.0, 1.0, 0.0),
            orientation: Quat::from_rotation_x(0.5),
            scale: None,
        };
        // 6 header + 6 name + 2 handle + 12 position + 16 orientation
        assert_eq!(chunk.chunk_size(), 42);
        assert_eq!(round_trip(&chunk), chunk);
    }

    #[test]
    fn test_bone_with_scale() {
        let chunk = BoneChunk {
            name: "hand".to_string(),
            handle: 7,
            position: Vec3::X,
            orientation: Quat::IDENTITY,
            scale: Some(Vec3::splat(2.0)),
        };
        assert_eq!(round_trip(&chunk), chunk);
    }

    #[test]
    fn test_parent_link() {
        let mut skeleton = Skeleton::new("pair");
        for (name, handle) in [("root", 0), ("child", 1)] {
            BoneChunk {
                name: name.to_string(),
                handle,
                position: Vec3::ZERO,
                orientation: Quat::IDENTITY,
                scale: None,
            }
            .create_in(&mut skeleton)
            .unwrap();
        }
        BoneParentChunk { child: 1, parent: 0 }
            .link_in(&mut skeleton)
            .unwrap();
        assert_eq!(skeleton.child_bones(BoneHandle(0)).unwrap(), vec![BoneHandle(1)]);

        assert!(
            BoneParentChunk { child: 1, parent: 9 }
                .link_in(&mut skeleton)
                .is_err()
        );
    }
}
