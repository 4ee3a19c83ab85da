//! ANIMATION, ANIMATION_TRACK and ANIMATION_TRACK_KEYFRAME chunks

use super::{
    ANIMATION, ANIMATION_TRACK, ANIMATION_TRACK_KEYFRAME, Chunk, ChunkHeader, QUAT_SIZE,
    VEC3_SIZE, string_size, write_quat, write_string, write_vec3,
};
use crate::error::{Result, SkelError};
use crate::reader::ChunkStream;
use byteorder::{LittleEndian, WriteBytesExt};
use glam::{Quat, Vec3};
use log::{debug, warn};
use ossa_skeleton::{Animation, AnimationTrack, BoneHandle, KeyFrame, Skeleton};
use std::io::{Read, Seek, Write};

/// Time, rotation and translation
const KEYFRAME_FIXED_SIZE: usize = 4 + QUAT_SIZE + VEC3_SIZE;

/// ANIMATION_TRACK_KEYFRAME chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyFrameChunk {
    pub time: f32,
    pub rotation: Quat,
    pub translate: Vec3,
    /// Written only when it differs from one
    pub scale: Option<Vec3>,
}

impl KeyFrameChunk {
    pub fn from_key_frame(key: &KeyFrame) -> Self {
        Self {
            time: key.time(),
            rotation: key.rotation,
            translate: key.translate,
            scale: (key.scale != Vec3::ONE).then_some(key.scale),
        }
    }

    pub fn to_key_frame(&self) -> KeyFrame {
        KeyFrame::new(self.time)
            .with_rotation(self.rotation)
            .with_translate(self.translate)
            .with_scale(self.scale.unwrap_or(Vec3::ONE))
    }
}

impl Chunk for KeyFrameChunk {
    const ID: u16 = ANIMATION_TRACK_KEYFRAME;

    fn read<R: Read + Seek>(stream: &mut ChunkStream<R>, header: ChunkHeader) -> Result<Self> {
        let time = stream.read_f32()?;
        let rotation = stream.read_quat()?;
        let translate = stream.read_vec3()?;

        let payload = header.payload_len();
        let scale = if payload >= KEYFRAME_FIXED_SIZE + VEC3_SIZE {
            let scale = stream.read_vec3()?;
            stream.skip(payload - KEYFRAME_FIXED_SIZE - VEC3_SIZE)?;
            Some(scale)
        } else {
            stream.skip(payload.saturating_sub(KEYFRAME_FIXED_SIZE))?;
            None
        };

        if !time.is_finite() || time < 0.0 {
            return Err(SkelError::invalid_data(
                "ANIMATION_TRACK_KEYFRAME",
                format!("keyframe time {time} is not a non-negative number"),
            ));
        }

        Ok(Self {
            time,
            rotation,
            translate,
            scale,
        })
    }

    fn write_payload(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_f32::<LittleEndian>(self.time)?;
        write_quat(writer, self.rotation)?;
        write_vec3(writer, self.translate)?;
        if let Some(scale) = self.scale {
            write_vec3(writer, scale)?;
        }
        Ok(())
    }

    fn payload_size(&self) -> usize {
        KEYFRAME_FIXED_SIZE + self.scale.map_or(0, |_| VEC3_SIZE)
    }
}

/// ANIMATION_TRACK chunk - keyframes for one bone
#[derive(Debug, Clone, PartialEq)]
pub struct TrackChunk {
    pub handle: u16,
    pub key_frames: Vec<KeyFrameChunk>,
}

impl TrackChunk {
    pub fn from_track(track: &AnimationTrack) -> Self {
        Self {
            handle: track.handle().0,
            key_frames: track
                .key_frames()
                .iter()
                .map(KeyFrameChunk::from_key_frame)
                .collect(),
        }
    }
}

impl Chunk for TrackChunk {
    const ID: u16 = ANIMATION_TRACK;

    fn read<R: Read + Seek>(stream: &mut ChunkStream<R>, _header: ChunkHeader) -> Result<Self> {
        let handle = stream.read_u16()?;
        let key_frames = stream.read_nested::<KeyFrameChunk>()?;
        Ok(Self { handle, key_frames })
    }

    fn write_payload(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.handle)?;
        for key in &self.key_frames {
            key.write_chunk(writer)?;
        }
        Ok(())
    }

    fn payload_size(&self) -> usize {
        2 + self
            .key_frames
            .iter()
            .map(Chunk::chunk_size)
            .sum::<usize>()
    }
}

/// ANIMATION chunk - a named animation and its tracks
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChunk {
    pub name: String,
    /// Length in seconds
    pub length: f32,
    pub tracks: Vec<TrackChunk>,
}

impl AnimationChunk {
    pub fn from_animation(animation: &Animation) -> Self {
        Self {
            name: animation.name().to_string(),
            length: animation.length(),
            tracks: animation.tracks().map(TrackChunk::from_track).collect(),
        }
    }

    /// Create the animation in `skeleton`. Tracks for bones the skeleton
    /// lacks are dropped with a warning.
    pub fn create_in(&self, skeleton: &mut Skeleton) -> Result<()> {
        let missing: Vec<u16> = self
            .tracks
            .iter()
            .map(|t| t.handle)
            .filter(|&h| skeleton.bone(BoneHandle(h)).is_err())
            .collect();

        let animation = skeleton.create_animation(self.name.clone(), self.length)?;
        for chunk in &self.tracks {
            if missing.contains(&chunk.handle) {
                warn!(
                    "animation '{}': dropping track for missing bone {}",
                    self.name, chunk.handle
                );
                continue;
            }
            let track = animation.create_track(BoneHandle(chunk.handle))?;
            for key in &chunk.key_frames {
                track.insert_key_frame(key.to_key_frame());
            }
        }
        debug!(
            "animation '{}': {} seconds, {} tracks",
            self.name,
            self.length,
            animation.num_tracks()
        );
        Ok(())
    }
}

impl Chunk for AnimationChunk {
    const ID: u16 = ANIMATION;

    fn read<R: Read + Seek>(stream: &mut ChunkStream<R>, _header: ChunkHeader) -> Result<Self> {
        let name = stream.read_string()?;
        let length = stream.read_f32()?;
        let tracks = stream.read_nested::<TrackChunk>()?;
        Ok(Self {
            name,
            length,
            tracks,
        })
    }

    fn write_payload(&self, writer: &mut impl Write) -> Result<()> {
        write_string(writer, &self.name)?;
        writer.write_f32::<LittleEndian>(self.length)?;
        for track in &self.tracks {
            track.write_chunk(writer)?;
        }
        Ok(())
    }

    fn payload_size(&self) -> usize {
        string_size(&self.name)
            + 4
            + self.tracks.iter().map(Chunk::chunk_size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::BONE_PARENT;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn walk() -> AnimationChunk {
        AnimationChunk {
            name: "walk".to_string(),
            length: 2.0,
            tracks: vec![
                TrackChunk {
                    handle: 0,
                    key_frames: vec![
                        KeyFrameChunk {
                            time: 0.0,
                            rotation: Quat::IDENTITY,
                            translate: Vec3::ZERO,
                            scale: None,
                        },
                        KeyFrameChunk {
                            time: 1.0,
                            rotation: Quat::from_rotation_y(0.3),
                            translate: Vec3::Z,
                            scale: Some(Vec3::splat(1.5)),
                        },
                    ],
                },
                TrackChunk {
                    handle: 1,
                    key_frames: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn test_nested_sizes() {
        let chunk = walk();
        let mut data = Vec::new();
        chunk.write_chunk(&mut data).unwrap();
        assert_eq!(data.len(), chunk.chunk_size());
        // 6 + "walk\n" + length + (6 + 2 + 38 + 50) + (6 + 2)
        assert_eq!(chunk.chunk_size(), 6 + 5 + 4 + 96 + 8);
    }

    #[test]
    fn test_nested_read_stops_at_foreign_chunk() {
        let mut data = Vec::new();
        walk().write_chunk(&mut data).unwrap();
        // a bone parent chunk follows the animation
        let parent_at = data.len();
        data.extend_from_slice(&BONE_PARENT.to_le_bytes());
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&[1, 0, 0, 0]);

        let mut stream = ChunkStream::new(Cursor::new(data)).unwrap();
        let header = stream.read_header().unwrap();
        let read = AnimationChunk::read(&mut stream, header).unwrap();
        assert_eq!(read, walk());
        assert_eq!(stream.position().unwrap(), parent_at as u64);
        assert_eq!(stream.read_header().unwrap().id, BONE_PARENT);
    }

    #[test]
    fn test_negative_time_rejected() {
        let key = KeyFrameChunk {
            time: -1.0,
            rotation: Quat::IDENTITY,
            translate: Vec3::ZERO,
            scale: None,
        };
        let mut data = Vec::new();
        key.write_chunk(&mut data).unwrap();
        let mut stream = ChunkStream::new(Cursor::new(data)).unwrap();
        let header = stream.read_header().unwrap();
        assert!(matches!(
            KeyFrameChunk::read(&mut stream, header),
            Err(SkelError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_tracks_for_missing_bones_dropped() {
        let mut skeleton = Skeleton::new("one");
        skeleton.create_named_bone("root", None).unwrap();
        walk().create_in(&mut skeleton).unwrap();

        let animation = skeleton.animation("walk").unwrap();
        assert_eq!(animation.num_tracks(), 1);
        let track = animation.track(BoneHandle(0)).unwrap();
        assert_eq!(track.num_key_frames(), 2);
        assert_eq!(track.key_frames()[1].scale, Vec3::splat(1.5));
    }
}
