//! Skeleton file reading

use crate::chunks::{
    ANIMATION, AnimationChunk, BONE, BONE_PARENT, BoneChunk, BoneParentChunk, CHUNK_OVERHEAD,
    Chunk, ChunkHeader, HEADER_CHUNK_ID, MAX_STRING_LEN, SERIALIZER_VERSION, chunk_name,
};
use crate::error::{Result, SkelError};
use byteorder::{LittleEndian, ReadBytesExt};
use glam::{Quat, Vec3};
use log::{debug, warn};
use ossa_skeleton::Skeleton;
use std::io::{Read, Seek, SeekFrom};

/// Seekable byte source that knows where it ends.
#[derive(Debug)]
pub struct ChunkStream<R> {
    inner: R,
    end: u64,
}

impl<R: Read + Seek> ChunkStream<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let start = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self { inner, end })
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn is_eof(&mut self) -> Result<bool> {
        Ok(self.position()? >= self.end)
    }

    pub fn read_header(&mut self) -> Result<ChunkHeader> {
        ChunkHeader::read(&mut self.inner)
    }

    /// Step back over a header that was read but belongs to an outer loop.
    pub fn rewind_header(&mut self) -> Result<()> {
        self.inner.seek(SeekFrom::Current(-(CHUNK_OVERHEAD as i64)))?;
        Ok(())
    }

    pub fn skip(&mut self, bytes: usize) -> Result<()> {
        self.inner.seek(SeekFrom::Current(bytes as i64))?;
        Ok(())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Quaternions are stored `x, y, z, w`
    pub fn read_quat(&mut self) -> Result<Quat> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Read a newline terminated string.
    pub fn read_string(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.inner.read_u8()?;
            if byte == b'\n' {
                break;
            }
            if bytes.len() == MAX_STRING_LEN {
                return Err(SkelError::invalid_data(
                    "string",
                    format!("no terminator within {MAX_STRING_LEN} bytes"),
                ));
            }
            bytes.push(byte);
        }
        String::from_utf8(bytes).map_err(|e| SkelError::invalid_data("string", e.to_string()))
    }

    /// Read consecutive chunks with id `id`. Stops at the end of the stream
    /// or at the first chunk with another id, leaving that chunk unread.
    pub fn read_nested<T: Chunk>(&mut self) -> Result<Vec<T>> {
        let mut chunks = Vec::new();
        while !self.is_eof()? {
            let header = self.read_header()?;
            if header.id != T::ID {
                self.rewind_header()?;
                break;
            }
            chunks.push(T::read(self, header)?);
        }
        Ok(chunks)
    }

    /// Read the header chunk and check the serializer version.
    pub fn read_file_header(&mut self) -> Result<()> {
        let id = self.read_u16()?;
        if id != HEADER_CHUNK_ID {
            return Err(SkelError::InvalidMagic {
                expected: HEADER_CHUNK_ID,
                found: id,
            });
        }
        let version = self.read_string()?;
        if version != SERIALIZER_VERSION {
            return Err(SkelError::UnsupportedVersion {
                expected: SERIALIZER_VERSION.to_string(),
                found: version,
            });
        }
        Ok(())
    }
}

/// Decode a skeleton named `name` from `reader`.
///
/// Bones are assumed to be stored in their binding pose, which is captured
/// once every chunk has been read.
pub fn read_skeleton<R: Read + Seek>(reader: R, name: &str) -> Result<Skeleton> {
    let mut stream = ChunkStream::new(reader)?;
    stream.read_file_header()?;

    let mut skeleton = Skeleton::new(name);
    while !stream.is_eof()? {
        let header = stream.read_header()?;
        match header.id {
            BONE => BoneChunk::read(&mut stream, header)?.create_in(&mut skeleton)?,
            BONE_PARENT => BoneParentChunk::read(&mut stream, header)?.link_in(&mut skeleton)?,
            ANIMATION => AnimationChunk::read(&mut stream, header)?.create_in(&mut skeleton)?,
            HEADER_CHUNK_ID => {
                return Err(SkelError::UnexpectedChunk {
                    id: header.id,
                    context: "after the file header".to_string(),
                });
            }
            other => {
                warn!(
                    "skipping {} chunk {other:#06x} ({} bytes)",
                    chunk_name(other),
                    header.length
                );
                stream.skip(header.payload_len())?;
            }
        }
    }

    skeleton.set_binding_pose();
    debug!(
        "read skeleton '{name}': {} bones, {} animations",
        skeleton.num_bones(),
        skeleton.num_animations()
    );
    Ok(skeleton)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::{BONE, SERIALIZER_VERSION};
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn header_bytes(version: &str) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_u16::<LittleEndian>(HEADER_CHUNK_ID).unwrap();
        data.extend_from_slice(version.as_bytes());
        data.push(b'\n');
        data
    }

    #[test]
    fn test_empty_file_reads_empty_skeleton() {
        let data = header_bytes(SERIALIZER_VERSION);
        let skeleton = read_skeleton(Cursor::new(data), "empty").unwrap();
        assert_eq!(skeleton.num_bones(), 0);
        assert_eq!(skeleton.name(), "empty");
    }

    #[test]
    fn test_bad_header_id() {
        let mut data = header_bytes(SERIALIZER_VERSION);
        data[1] = 0x20;
        assert!(matches!(
            read_skeleton(Cursor::new(data), "bad"),
            Err(SkelError::InvalidMagic { found: 0x2000, .. })
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let data = header_bytes("[Serializer_v1.00]");
        assert!(matches!(
            read_skeleton(Cursor::new(data), "old"),
            Err(SkelError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_unknown_chunk_skipped() {
        let mut data = header_bytes(SERIALIZER_VERSION);
        data.write_u16::<LittleEndian>(0x7777).unwrap();
        data.write_u32::<LittleEndian>(9).unwrap();
        data.extend_from_slice(&[1, 2, 3]);
        let skeleton = read_skeleton(Cursor::new(data), "skip").unwrap();
        assert_eq!(skeleton.num_bones(), 0);
    }

    #[test]
    fn test_truncated_chunk_is_io_error() {
        let mut data = header_bytes(SERIALIZER_VERSION);
        data.write_u16::<LittleEndian>(BONE).unwrap();
        data.write_u32::<LittleEndian>(40).unwrap();
        data.extend_from_slice(b"hip\n");
        assert!(matches!(
            read_skeleton(Cursor::new(data), "short"),
            Err(SkelError::Io(_))
        ));
    }

    #[test]
    fn test_unterminated_string() {
        let mut stream = ChunkStream::new(Cursor::new(vec![b'a'; 300])).unwrap();
        assert!(matches!(
            stream.read_string(),
            Err(SkelError::InvalidData { .. })
        ));
    }
}
