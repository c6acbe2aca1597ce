//! Per-window render context and task scheduler

use super::backend::{PendingRelease, ResourceReleaser};
use super::{BackendResult, GpuContext, GpuResource, GraphicsBackend, RenderError, RenderTask};
use crate::events::EventKind;
use crossbeam_channel::{unbounded, Receiver};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a rendering context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Counters for the last rendered frame and the context lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames rendered so far
    pub frames: u64,
    /// Tasks executed in the last frame
    pub tasks_executed: usize,
    /// Draw calls issued in the last frame
    pub draw_calls: u32,
    /// Resources released by the last garbage collection
    pub resources_released: usize,
}

/// Rendering surface with its own thread, task queue and GPU resources
///
/// The thread that constructs the context owns it. Tasks may be queued from
/// anywhere the context is reachable, but [`render`](Self::render),
/// [`present`](Self::present) and [`collect_garbage`](Self::collect_garbage)
/// only run on the owner.
pub struct RenderContext {
    id: ContextId,
    name: String,
    owner: ThreadId,
    tasks: Vec<RenderTask>,
    gpu: GpuContext,
    releases: Receiver<PendingRelease>,
    stats: FrameStats,
}

impl RenderContext {
    /// Create a context owned by the calling thread
    pub fn new(name: impl Into<String>, backend: Box<dyn GraphicsBackend + Send>) -> Self {
        Self::with_id(ContextId::next(), name, backend)
    }

    /// Create a context with a pre-allocated id
    pub fn with_id(id: ContextId, name: impl Into<String>, backend: Box<dyn GraphicsBackend + Send>) -> Self {
        let name = name.into();
        let owner = thread::current().id();
        let (sender, releases) = unbounded();
        log::debug!("Creating render context {id} '{name}' on {owner:?} with {} backend", backend.name());

        Self {
            id,
            name,
            owner,
            tasks: Vec::new(),
            gpu: GpuContext::new(id, owner, backend, ResourceReleaser::new(id, sender)),
            releases,
            stats: FrameStats::default(),
        }
    }

    /// Context id
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Window name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Thread that owns the context
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Whether the caller is the owning thread
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Queue a task for the next [`render`](Self::render)
    pub fn add_render_task(&mut self, task: RenderTask) {
        self.tasks.push(task);
    }

    /// Number of queued tasks
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Direct GPU access for setup work outside the task queue
    pub fn gpu(&mut self) -> &mut GpuContext {
        &mut self.gpu
    }

    /// Releaser that can be sent to other threads
    pub fn releaser(&self) -> ResourceReleaser {
        self.gpu.releaser()
    }

    /// Queue the default release of `resource` for the end of the frame
    pub fn defer_release(&self, resource: GpuResource) {
        // The receiver lives as long as self, so the send cannot fail.
        self.gpu.releaser().release(resource);
    }

    /// Lifetime and last-frame counters
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Execute all queued tasks in priority order
    ///
    /// Lower priorities run first and ties keep registration order. The
    /// queue is drained even if a task fails; the first failure is returned
    /// and the remaining tasks of the frame are dropped. Returns the number
    /// of executed tasks.
    pub fn render(&mut self) -> Result<usize, RenderError> {
        self.gpu.check_thread()?;

        // Vec::sort_by is stable; total_cmp gives NaN a fixed place
        self.tasks.sort_by(|a, b| a.priority().total_cmp(&b.priority()));

        let mut executed = 0;
        for task in self.tasks.drain(..) {
            log::trace!("{}: executing {} (priority {})", self.id, task.label(), task.priority());
            task.execute(&mut self.gpu)?;
            executed += 1;
        }

        self.stats.frames += 1;
        self.stats.tasks_executed = executed;
        self.stats.draw_calls = self.gpu.draw_calls();
        Ok(executed)
    }

    /// Swap buffers
    pub fn present(&mut self) -> BackendResult<()> {
        self.gpu.present()
    }

    /// Reset per-frame state after a render pass
    ///
    /// Drops tasks queued after the last [`render`](Self::render) and resets
    /// the sampler slot counter.
    pub fn refresh(&mut self) {
        if !self.tasks.is_empty() {
            log::debug!("{}: discarding {} unrendered tasks", self.id, self.tasks.len());
        }
        self.tasks.clear();
        self.gpu.reset_frame();
    }

    /// Run every release queued since the last collection
    ///
    /// All queued releases are attempted; the first failure is returned.
    pub fn collect_garbage(&mut self) -> Result<usize, RenderError> {
        self.gpu.check_thread()?;

        let mut released = 0;
        let mut first_error = None;
        for pending in self.releases.try_iter() {
            match (pending.release)(&mut self.gpu, pending.resource) {
                Ok(()) => released += 1,
                Err(e) => {
                    log::warn!("{}: failed to release {:?}: {e}", self.id, pending.resource);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.stats.resources_released = released;
        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    /// Window events reported by the backend since the last poll
    pub fn poll_events(&mut self) -> BackendResult<Vec<EventKind>> {
        self.gpu.poll_events()
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if !self.is_owner_thread() {
            log::warn!("{}: dropped off its owning thread, pending releases are skipped", self.id);
            return;
        }
        if let Err(e) = self.collect_garbage() {
            log::warn!("{}: release during teardown failed: {e}", self.id);
        }
        log::debug!("Destroyed render context {} '{}'", self.id, self.name);
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("pending_tasks", &self.tasks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
