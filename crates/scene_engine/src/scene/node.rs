//! Per-node storage and the lazy matrix caches

use super::{NodeBehavior, NodeId};
use crate::foundation::math::{Mat4, Transform};
use crate::render::ContextId;
use parking_lot::{MappedRwLockWriteGuard, Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Lazily recomputed matrix guarded by a dirty flag
///
/// Readers take the lock-free fast path while the flag is clear. A reader
/// that finds it set takes the write lock, checks again, clears the flag and
/// only then recomputes, so an invalidation that lands during the recompute
/// leaves the flag set for the next reader.
pub(crate) struct TransformCache {
    dirty: AtomicBool,
    matrix: RwLock<Mat4>,
}

impl TransformCache {
    pub(crate) fn new() -> Self {
        Self {
            dirty: AtomicBool::new(true),
            matrix: RwLock::new(Mat4::identity()),
        }
    }

    pub(crate) fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn get_or_compute(&self, compute: impl FnOnce() -> Mat4) -> Mat4 {
        if !self.dirty.load(Ordering::Acquire) {
            return *self.matrix.read();
        }

        let mut matrix = self.matrix.write();
        if self.dirty.swap(false, Ordering::AcqRel) {
            *matrix = compute();
        }
        *matrix
    }
}

/// Arena entry for one node
///
/// Every field has its own synchronization so the draw thread, logic threads
/// and event handlers can touch different aspects of a node at once. The
/// activation mutex is separate from the transform locks so that `ready`
/// hooks may move the node they are attached to.
pub(crate) struct SceneNode {
    pub(crate) name: RwLock<String>,
    pub(crate) parent: RwLock<Option<NodeId>>,
    pub(crate) children: RwLock<Vec<NodeId>>,
    pub(crate) local: RwLock<Transform>,
    pub(crate) world: TransformCache,
    pub(crate) world_inverse: TransformCache,
    pub(crate) visible: AtomicBool,
    pub(crate) excluded_contexts: RwLock<HashSet<ContextId>>,
    pub(crate) activated: AtomicBool,
    pub(crate) activation: Mutex<()>,
    pub(crate) behavior: Mutex<Option<Box<dyn NodeBehavior>>>,
}

impl SceneNode {
    pub(crate) fn new(name: String, behavior: Option<Box<dyn NodeBehavior>>) -> Self {
        Self {
            name: RwLock::new(name),
            parent: RwLock::new(None),
            children: RwLock::new(Vec::new()),
            local: RwLock::new(Transform::identity()),
            world: TransformCache::new(),
            world_inverse: TransformCache::new(),
            visible: AtomicBool::new(true),
            excluded_contexts: RwLock::new(HashSet::new()),
            activated: AtomicBool::new(false),
            activation: Mutex::new(()),
            behavior: Mutex::new(behavior),
        }
    }

    /// Mark both world caches stale
    pub(crate) fn invalidate(&self) {
        self.world.invalidate();
        self.world_inverse.invalidate();
    }

    pub(crate) fn children_snapshot(&self) -> Vec<NodeId> {
        self.children.read().clone()
    }
}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNode")
            .field("name", &*self.name.read())
            .field("parent", &*self.parent.read())
            .field("children", &*self.children.read())
            .field("local", &*self.local.read())
            .field("visible", &self.visible.load(Ordering::Relaxed))
            .field("activated", &self.activated.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Write access to one component of a node's local transform
///
/// The node and all of its descendants are invalidated before the guard is
/// handed out, so the caches assume a write happened even if the value is
/// left unchanged. Querying world matrices of the node or its descendants
/// while the guard is alive blocks until it is dropped.
pub struct TransformGuard<'a, T> {
    inner: MappedRwLockWriteGuard<'a, T>,
    on_release: Option<fn(&mut T)>,
}

impl<'a, T> TransformGuard<'a, T> {
    pub(crate) fn new(inner: MappedRwLockWriteGuard<'a, T>) -> Self {
        Self { inner, on_release: None }
    }

    pub(crate) fn with_release_hook(inner: MappedRwLockWriteGuard<'a, T>, hook: fn(&mut T)) -> Self {
        Self { inner, on_release: Some(hook) }
    }
}

impl<T> Deref for TransformGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for TransformGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for TransformGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release {
            hook(&mut self.inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cache_starts_dirty_and_computes_once() {
        let cache = TransformCache::new();
        let computed = AtomicUsize::new(0);
        let compute = || {
            computed.fetch_add(1, Ordering::SeqCst);
            Mat4::new_scaling(2.0)
        };

        assert!(cache.is_dirty());
        assert_eq!(cache.get_or_compute(compute), Mat4::new_scaling(2.0));
        assert_eq!(cache.get_or_compute(compute), Mat4::new_scaling(2.0));
        assert_eq!(computed.load(Ordering::SeqCst), 1);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let cache = TransformCache::new();
        cache.get_or_compute(Mat4::identity);
        cache.invalidate();
        assert_eq!(cache.get_or_compute(|| Mat4::new_scaling(3.0)), Mat4::new_scaling(3.0));
    }

    #[test]
    fn test_invalidation_during_compute_is_not_lost() {
        let cache = TransformCache::new();
        cache.get_or_compute(|| {
            // An invalidation racing with this recompute
            cache.invalidate();
            Mat4::identity()
        });
        assert!(cache.is_dirty());
    }

    #[test]
    fn test_concurrent_readers_compute_once() {
        let cache = TransformCache::new();
        let computed = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let matrix = cache.get_or_compute(|| {
                        computed.fetch_add(1, Ordering::SeqCst);
                        Mat4::new_scaling(5.0)
                    });
                    assert_eq!(matrix, Mat4::new_scaling(5.0));
                });
            }
        });

        assert_eq!(computed.load(Ordering::SeqCst), 1);
    }
}
