use thiserror::Error;

/// Error types for skeleton, animation and attachment operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    /// The skeleton already holds the maximum number of bones
    #[error("Capacity exceeded: a skeleton holds at most {max} bones")]
    CapacityExceeded { max: usize },

    /// Lookup of a bone, animation, track or attachment failed
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// An argument was out of range or otherwise malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An item with the same key already exists
    #[error("Duplicate item: {0}")]
    DuplicateItem(String),

    /// A file extension or version tag that cannot be handled
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl SkeletonError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::ItemNotFound(what.into())
    }

    pub(crate) fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    pub(crate) fn duplicate(what: impl Into<String>) -> Self {
        Self::DuplicateItem(what.into())
    }
}

/// Result type using SkeletonError
pub type Result<T> = std::result::Result<T, SkeletonError>;
