//! Explicit frame context for per-frame caching
//!
//! Bone matrices and skinned vertex buffers are expensive to rebuild, and a
//! frame may consult them several times (one skeleton shared by many meshes,
//! shadow passes, and so on). Rather than reading a global frame number,
//! callers thread a [`Frame`] through every update, and caches compare the
//! frame they were filled in against the one they are asked for.

/// Monotonically increasing frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame(u64);

impl Frame {
    /// The first frame.
    pub const ZERO: Self = Self(0);

    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u64 {
        self.0
    }

    /// The frame after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A value tagged with the frame it was computed in.
#[derive(Debug, Clone, Default)]
pub struct FrameCache<T> {
    frame: Option<Frame>,
    value: T,
}

impl<T> FrameCache<T> {
    pub fn new(value: T) -> Self {
        Self { frame: None, value }
    }

    /// Frame the cached value belongs to, if it has been filled.
    pub fn frame(&self) -> Option<Frame> {
        self.frame
    }

    pub fn is_current(&self, frame: Frame) -> bool {
        self.frame == Some(frame)
    }

    /// Forget the cached frame so the next request recomputes.
    pub fn invalidate(&mut self) {
        self.frame = None;
    }

    /// The cached value regardless of which frame produced it.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The cached value only if it was computed for `frame`.
    pub fn get(&self, frame: Frame) -> Option<&T> {
        self.is_current(frame).then_some(&self.value)
    }

    /// Return the value for `frame`, running `refresh` first when the cache
    /// holds a different frame. Returns whether a refresh happened alongside
    /// the value.
    pub fn get_or_refresh(&mut self, frame: Frame, refresh: impl FnOnce(&mut T)) -> (&T, bool) {
        let refreshed = !self.is_current(frame);
        if refreshed {
            refresh(&mut self.value);
            self.frame = Some(frame);
        } else {
            log::trace!("frame cache hit for frame {}", frame.number());
        }
        (&self.value, refreshed)
    }
}
