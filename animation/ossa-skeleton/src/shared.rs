//! One skeleton instance posed once per frame and read by many meshes
//!
//! [`share`] splits an instance into a single [`SkeletonWriter`], which poses
//! it and fills the bone matrices for a frame, and any number of
//! [`SkeletonReader`]s that borrow those matrices. Readers only see matrices
//! tagged with the frame they ask for, so a reader running ahead of the
//! writer gets `None` instead of last frame's pose.

use crate::animation::AnimationStateSet;
use crate::error::Result;
use crate::frame::Frame;
use crate::instance::SkeletonInstance;
use glam::Mat4;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how a shared skeleton is used
#[derive(Debug, Default)]
pub struct ShareStatistics {
    /// Updates that changed the pose
    pub poses_applied: AtomicU64,
    /// Updates skipped because the state set was unchanged
    pub poses_skipped: AtomicU64,
    /// Reader requests answered from the current frame
    pub hits: AtomicU64,
    /// Reader requests for a frame the writer has not produced
    pub misses: AtomicU64,
}

impl ShareStatistics {
    /// Fraction of reader requests that found their frame (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Shared {
    instance: RwLock<SkeletonInstance>,
    stats: ShareStatistics,
}

/// Split `instance` into its writer and a first reader.
pub fn share(instance: SkeletonInstance) -> (SkeletonWriter, SkeletonReader) {
    let inner = Arc::new(Shared {
        instance: RwLock::new(instance),
        stats: ShareStatistics::default(),
    });
    let reader = SkeletonReader {
        inner: Arc::clone(&inner),
    };
    (SkeletonWriter { inner }, reader)
}

/// The only handle allowed to pose a shared instance.
#[derive(Debug)]
pub struct SkeletonWriter {
    inner: Arc<Shared>,
}

impl SkeletonWriter {
    /// Pose the instance for `frame` and fill its bone matrices. Returns
    /// whether the pose changed.
    pub fn update(&mut self, frame: Frame, states: &AnimationStateSet) -> Result<bool> {
        let mut instance = self.inner.instance.write();
        let changed = instance.set_animation_state(states)?;
        instance.bone_matrices_for(frame);

        let counter = if changed {
            &self.inner.stats.poses_applied
        } else {
            &self.inner.stats.poses_skipped
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(changed)
    }

    /// Run `f` with exclusive access to the instance, e.g. to attach objects
    /// or move manually controlled bones. Readers lose the current frame
    /// until the next [`update`](Self::update).
    pub fn with_instance<R>(&mut self, f: impl FnOnce(&mut SkeletonInstance) -> R) -> R {
        let mut instance = self.inner.instance.write();
        let result = f(&mut instance);
        instance.invalidate_bone_matrices();
        result
    }

    pub fn reader(&self) -> SkeletonReader {
        SkeletonReader {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn statistics(&self) -> &ShareStatistics {
        &self.inner.stats
    }
}

/// Read-only handle onto a shared instance.
#[derive(Debug, Clone)]
pub struct SkeletonReader {
    inner: Arc<Shared>,
}

impl SkeletonReader {
    /// Frame the latest matrices were produced for.
    pub fn frame(&self) -> Option<Frame> {
        self.inner.instance.read().cached_frame()
    }

    /// Borrow the bone matrices if the writer has produced `frame`.
    ///
    /// The guard holds a read lock; drop it before the writer's next update.
    pub fn matrices_for(&self, frame: Frame) -> Option<MappedRwLockReadGuard<'_, [Mat4]>> {
        let guard = RwLockReadGuard::try_map(self.inner.instance.read(), |instance| {
            instance.cached_bone_matrices(frame)
        })
        .ok();

        let counter = if guard.is_some() {
            &self.inner.stats.hits
        } else {
            &self.inner.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        guard
    }

    /// Copy the matrices for `frame` into `out`; `false` if not available.
    pub fn copy_matrices(&self, frame: Frame, out: &mut Vec<Mat4>) -> bool {
        match self.matrices_for(frame) {
            Some(matrices) => {
                out.clear();
                out.extend_from_slice(&matrices);
                true
            }
            None => false,
        }
    }

    pub fn statistics(&self) -> &ShareStatistics {
        &self.inner.stats
    }
}
