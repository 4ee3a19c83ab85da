//! Error types for the skeleton file library

use ossa_skeleton::SkeletonError;
use std::io;
use thiserror::Error;

/// Result type alias for skeleton file operations
pub type Result<T> = std::result::Result<T, SkelError>;

/// Errors that can occur while reading or writing `.skeleton` files
#[derive(Error, Debug)]
pub enum SkelError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the header chunk
    #[error("Invalid header: expected chunk id {expected:#06x}, found {found:#06x}")]
    InvalidMagic { expected: u16, found: u16 },

    /// The header names a serializer version this library does not read
    #[error("Unsupported version: file reports {found}, expected {expected}")]
    UnsupportedVersion { expected: String, found: String },

    /// The path does not have a `.skeleton` extension
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A chunk turned up where it cannot appear
    #[error("Unexpected chunk {id:#06x} {context}")]
    UnexpectedChunk { id: u16, context: String },

    /// Invalid data within a chunk
    #[error("Invalid {chunk} data: {message}")]
    InvalidData { chunk: String, message: String },

    /// The decoded data did not form a valid skeleton
    #[error("Skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),
}

impl SkelError {
    /// Create an invalid chunk data error
    pub fn invalid_data(chunk: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            chunk: chunk.into(),
            message: message.into(),
        }
    }
}
