//! Skeleton file chunk implementations
//!
//! A file is a header followed by a flat run of chunks. Every chunk starts
//! with a `u16` id and a `u32` length that counts the six header bytes as
//! well as the payload. Animations nest their tracks and tracks nest their
//! keyframes, so those lengths include the nested chunks.

use crate::error::{Result, SkelError};
use crate::reader::ChunkStream;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec3};
use std::io::{Read, Seek, Write};

pub mod animation;
pub mod bone;

// Re-export chunk types
pub use animation::{AnimationChunk, KeyFrameChunk, TrackChunk};
pub use bone::{BoneChunk, BoneParentChunk};

/// Id that opens every file, followed by the version string
pub const HEADER_CHUNK_ID: u16 = 0x1000;

/// Serializer version this library reads and writes
pub const SERIALIZER_VERSION: &str = "[Serializer_v1.10]";

pub const BONE: u16 = 0x2000;
pub const BONE_PARENT: u16 = 0x3000;
pub const ANIMATION: u16 = 0x4000;
pub const ANIMATION_TRACK: u16 = 0x4100;
pub const ANIMATION_TRACK_KEYFRAME: u16 = 0x4110;

/// Chunk header size (id + length)
pub const CHUNK_OVERHEAD: usize = 6;

/// Longest string the format stores, excluding the terminator
pub const MAX_STRING_LEN: usize = 255;

/// Size of a serialized `Vec3`
pub(crate) const VEC3_SIZE: usize = 12;
/// Size of a serialized `Quat`
pub(crate) const QUAT_SIZE: usize = 16;

/// Human-readable name for a chunk id
pub fn chunk_name(id: u16) -> &'static str {
    match id {
        HEADER_CHUNK_ID => "HEADER",
        BONE => "BONE",
        BONE_PARENT => "BONE_PARENT",
        ANIMATION => "ANIMATION",
        ANIMATION_TRACK => "ANIMATION_TRACK",
        ANIMATION_TRACK_KEYFRAME => "ANIMATION_TRACK_KEYFRAME",
        _ => "UNKNOWN",
    }
}

/// Id and total length of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: u16,
    /// Total chunk size including this header
    pub length: u32,
}

impl ChunkHeader {
    pub fn read(reader: &mut impl Read) -> Result<Self> {
        let id = reader.read_u16::<LittleEndian>()?;
        let length = reader.read_u32::<LittleEndian>()?;
        Ok(Self { id, length })
    }

    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.id)?;
        writer.write_u32::<LittleEndian>(self.length)?;
        Ok(())
    }

    /// Bytes after the header, zero for a malformed length
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(CHUNK_OVERHEAD)
    }
}

/// Common trait for all chunks
pub trait Chunk: Sized {
    /// Chunk id
    const ID: u16;

    /// Read the chunk after its header has been consumed
    fn read<R: Read + Seek>(stream: &mut ChunkStream<R>, header: ChunkHeader) -> Result<Self>;

    /// Write the payload, including any nested chunks
    fn write_payload(&self, writer: &mut impl Write) -> Result<()>;

    /// Size of the payload, including any nested chunks
    fn payload_size(&self) -> usize;

    /// Total size including the header
    fn chunk_size(&self) -> usize {
        self.payload_size() + CHUNK_OVERHEAD
    }

    /// Write the complete chunk including header
    fn write_chunk(&self, writer: &mut impl Write) -> Result<()> {
        let length = u32::try_from(self.chunk_size()).map_err(|_| {
            SkelError::invalid_data(chunk_name(Self::ID), "chunk larger than 4 GiB")
        })?;
        ChunkHeader {
            id: Self::ID,
            length,
        }
        .write(writer)?;
        self.write_payload(writer)
    }
}

/// Serialized size of a newline terminated string
pub(crate) fn string_size(value: &str) -> usize {
    value.len() + 1
}

pub(crate) fn write_string(writer: &mut impl Write, value: &str) -> Result<()> {
    if value.len() > MAX_STRING_LEN || value.contains('\n') {
        return Err(SkelError::invalid_data(
            "string",
            format!("'{value}' is longer than {MAX_STRING_LEN} bytes or contains a newline"),
        ));
    }
    writer.write_all(value.as_bytes())?;
    writer.write_u8(b'\n')?;
    Ok(())
}

pub(crate) fn write_vec3(writer: &mut impl Write, value: Vec3) -> Result<()> {
    for component in value.to_array() {
        writer.write_f32::<LittleEndian>(component)?;
    }
    Ok(())
}

/// Quaternions are stored `x, y, z, w`
pub(crate) fn write_quat(writer: &mut impl Write, value: Quat) -> Result<()> {
    for component in value.to_array() {
        writer.write_f32::<LittleEndian>(component)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_round_trip() {
        let header = ChunkHeader {
            id: BONE_PARENT,
            length: 10,
        };
        let mut data = Vec::new();
        header.write(&mut data).unwrap();
        assert_eq!(data, [0x00, 0x30, 10, 0, 0, 0]);

        let read = ChunkHeader::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(read, header);
        assert_eq!(read.payload_len(), 4);
    }

    #[test]
    fn test_malformed_length_has_no_payload() {
        let header = ChunkHeader { id: BONE, length: 2 };
        assert_eq!(header.payload_len(), 0);
    }

    #[test]
    fn test_string_rules() {
        let mut data = Vec::new();
        write_string(&mut data, "pelvis").unwrap();
        assert_eq!(data, b"pelvis\n");
        assert_eq!(string_size("pelvis"), 7);

        assert!(write_string(&mut Vec::new(), "two\nlines").is_err());
        assert!(write_string(&mut Vec::new(), &"x".repeat(256)).is_err());
    }

    #[test]
    fn test_quat_order() {
        let mut data = Vec::new();
        write_quat(&mut data, Quat::from_xyzw(1.0, 2.0, 3.0, 4.0)).unwrap();
        let mut cursor = Cursor::new(data);
        let w = {
            cursor.set_position(12);
            cursor.read_f32::<LittleEndian>().unwrap()
        };
        assert_eq!(w, 4.0);
    }
}
