//! Engine object owning the shared scene and the context threads
//!
//! There is no global engine instance. An [`Engine`] is constructed
//! explicitly and handed to whatever needs the scene, the event bus or the
//! resource loader. Dropping it stops every context thread and the event
//! dispatcher.
//!
//! Each window runs on its own thread:
//!
//! ```text
//! poll events -> update (driver only) -> register draw -> render
//!             -> present -> refresh -> collect garbage -> pace
//! ```

use crate::assets::{AssetError, FileResourceLoader, ResourceLoader};
use crate::config::{ConfigError, EngineConfig, WindowConfig};
use crate::events::{Event, EventBus, EventDispatcher, EventError, EventKind, EventSender};
use crate::foundation::time::FrameClock;
use crate::render::{priority, ContextId, GraphicsBackend, RenderContext, RenderError, RenderTask};
use crate::scene::{SceneError, SceneGraph};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Boxed backend as produced by a backend factory
pub type BoxedBackend = Box<dyn GraphicsBackend + Send>;

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rendering failed
    #[error("Rendering error: {0}")]
    Render(#[from] RenderError),

    /// Scene graph misuse
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Asset loading failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Event delivery failed
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// A thread could not be started
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// A context thread panicked
    #[error("Context {0} panicked")]
    ContextPanicked(ContextId),

    /// No running context has this id
    #[error("Unknown context {0}")]
    UnknownContext(ContextId),

    /// A running context already uses this id
    #[error("Context {0} is already running")]
    DuplicateContext(ContextId),
}

/// How a context thread ended
#[derive(Debug, Clone, PartialEq)]
pub struct ContextReport {
    /// Context id
    pub id: ContextId,
    /// Window title
    pub title: String,
    /// Frames completed
    pub frames: u64,
    /// Whether the backend reported a close request
    pub close_requested: bool,
    /// Failure that tore the context down
    pub error: Option<RenderError>,
}

/// Handle to a running context thread
pub struct ContextHandle {
    id: ContextId,
    title: String,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<ContextReport>,
}

impl ContextHandle {
    /// Context id
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Window title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Ask the thread to stop after the current frame
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread to exit
    pub fn join(self) -> Result<ContextReport, EngineError> {
        self.thread.join().map_err(|_| EngineError::ContextPanicked(self.id))
    }

    /// Request a stop and wait for the thread
    pub fn stop(self) -> Result<ContextReport, EngineError> {
        self.request_stop();
        self.join()
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Where a context thread sends the events its backend reports
struct EventRoute {
    bus: Arc<EventBus>,
    sender: Option<EventSender>,
}

impl EventRoute {
    fn deliver(&self, event: Event) {
        if let Some(sender) = &self.sender {
            match sender.send(event) {
                Ok(()) => return,
                Err(e) => log::warn!("{e}, delivering {:?} synchronously", event.kind),
            }
        }
        self.bus.publish(&event);
    }
}

/// Everything a context thread needs besides its backend
struct ContextShared {
    id: ContextId,
    window: WindowConfig,
    scene: Arc<SceneGraph>,
    events: EventRoute,
    stop: Arc<AtomicBool>,
    frame_time: Option<Duration>,
}

/// Explicitly constructed engine instance
pub struct Engine {
    config: EngineConfig,
    scene: Arc<SceneGraph>,
    events: Arc<EventBus>,
    dispatcher: Option<EventDispatcher>,
    loader: Arc<dyn ResourceLoader>,
    contexts: Vec<ContextHandle>,
}

impl Engine {
    /// Create an engine reading assets from `config.asset_root`
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let loader = Arc::new(FileResourceLoader::new(&config.asset_root));
        Self::with_loader(config, loader)
    }

    /// Create an engine with a custom resource loader
    pub fn with_loader(config: EngineConfig, loader: Arc<dyn ResourceLoader>) -> Result<Self, EngineError> {
        log::info!("Initializing engine...");
        config.validate()?;

        let events = Arc::new(EventBus::new());
        let dispatcher = events.spawn_dispatcher()?;

        Ok(Self {
            config,
            scene: Arc::new(SceneGraph::new()),
            events,
            dispatcher: Some(dispatcher),
            loader,
            contexts: Vec::new(),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared scene graph
    pub fn scene(&self) -> &Arc<SceneGraph> {
        &self.scene
    }

    /// Event bus; subscribe listeners here
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Sender that queues events for asynchronous delivery
    pub fn event_sender(&self) -> Option<EventSender> {
        self.dispatcher.as_ref().map(EventDispatcher::sender)
    }

    /// Resource loader
    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    /// Ids of contexts that have not been stopped or joined
    pub fn context_ids(&self) -> Vec<ContextId> {
        self.contexts.iter().map(ContextHandle::id).collect()
    }

    /// Start a context thread for `window`
    ///
    /// The backend is created by `backend_factory` on the new thread, which
    /// then owns the context and runs its frame loop until it is stopped,
    /// reaches `window.max_frames`, the backend reports a close request or
    /// a frame fails.
    pub fn spawn_context<F>(&mut self, window: WindowConfig, backend_factory: F) -> Result<ContextId, EngineError>
    where
        F: FnOnce(&WindowConfig) -> Result<BoxedBackend, RenderError> + Send + 'static,
    {
        self.spawn_context_with_id(ContextId::next(), window, backend_factory)
    }

    /// Start a context thread under an id allocated with [`ContextId::next`]
    ///
    /// Lets callers set per-context state such as
    /// [`NodeRef::exclude_draw`](crate::scene::NodeRef::exclude_draw) before
    /// the first frame runs.
    pub fn spawn_context_with_id<F>(
        &mut self,
        id: ContextId,
        window: WindowConfig,
        backend_factory: F,
    ) -> Result<ContextId, EngineError>
    where
        F: FnOnce(&WindowConfig) -> Result<BoxedBackend, RenderError> + Send + 'static,
    {
        window.validate()?;
        if self.contexts.iter().any(|handle| handle.id() == id) {
            return Err(EngineError::DuplicateContext(id));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let title = window.title.clone();
        let shared = ContextShared {
            id,
            window,
            scene: Arc::clone(&self.scene),
            events: EventRoute {
                bus: Arc::clone(&self.events),
                sender: self.event_sender(),
            },
            stop: Arc::clone(&stop),
            frame_time: self.config.target_frame_time(),
        };

        let thread = thread::Builder::new()
            .name(format!("render-{title}"))
            .spawn(move || run_context(shared, backend_factory))?;

        log::info!("Spawned context {id} '{title}'");
        self.contexts.push(ContextHandle { id, title, stop, thread });
        Ok(id)
    }

    /// Start one context per window listed in the configuration
    pub fn spawn_configured<F>(&mut self, backend_factory: F) -> Result<Vec<ContextId>, EngineError>
    where
        F: Fn(&WindowConfig) -> Result<BoxedBackend, RenderError> + Clone + Send + 'static,
    {
        self.config
            .windows
            .clone()
            .into_iter()
            .map(|window| self.spawn_context(window, backend_factory.clone()))
            .collect()
    }

    /// Stop one context and wait for it
    pub fn stop_context(&mut self, id: ContextId) -> Result<ContextReport, EngineError> {
        let index = self
            .contexts
            .iter()
            .position(|handle| handle.id() == id)
            .ok_or(EngineError::UnknownContext(id))?;
        self.contexts.remove(index).stop()
    }

    /// Wait for every context to finish on its own
    pub fn wait(&mut self) -> Result<Vec<ContextReport>, EngineError> {
        self.contexts.drain(..).map(ContextHandle::join).collect()
    }

    /// Stop every context, then the event dispatcher
    ///
    /// All threads are joined even if one of them panicked; the first
    /// panic is reported.
    pub fn shutdown(&mut self) -> Result<Vec<ContextReport>, EngineError> {
        log::info!("Engine shutdown requested");
        for handle in &self.contexts {
            handle.request_stop();
        }

        let mut reports = Vec::with_capacity(self.contexts.len());
        let mut first_error = None;
        for handle in self.contexts.drain(..) {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(e) => {
                    log::error!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown();
        }
        log::info!("Engine shutdown complete");

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.contexts.is_empty() && self.dispatcher.is_none() {
            return;
        }
        if let Err(e) = self.shutdown() {
            log::error!("Engine shutdown failed: {e}");
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("scene", &self.scene)
            .field("events", &self.events)
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}

fn run_context<F>(shared: ContextShared, backend_factory: F) -> ContextReport
where
    F: FnOnce(&WindowConfig) -> Result<BoxedBackend, RenderError>,
{
    let ContextShared { id, window, scene, events, stop, frame_time } = shared;
    let mut report = ContextReport {
        id,
        title: window.title.clone(),
        frames: 0,
        close_requested: false,
        error: None,
    };

    let backend = match backend_factory(&window) {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("{id}: backend creation failed: {e}");
            report.error = Some(e);
            return report;
        }
    };

    let mut context = RenderContext::with_id(id, window.title.clone(), backend);
    let mut clock = FrameClock::new(frame_time);

    while !stop.load(Ordering::Acquire) {
        let delta_time = clock.tick();
        match run_frame(&mut context, &scene, &window, &events, delta_time) {
            Ok(close_requested) => {
                report.frames += 1;
                if close_requested {
                    log::info!("{id}: close requested");
                    report.close_requested = true;
                    break;
                }
            }
            Err(e) => {
                log::error!("{id}: frame {} failed, tearing down context: {e}", report.frames);
                report.error = Some(e);
                break;
            }
        }

        if window.max_frames.is_some_and(|max| report.frames >= max) {
            break;
        }
        clock.pace();
    }

    log::info!("{id}: context loop exited after {} frames", report.frames);
    report
}

/// One frame; returns whether the backend asked to close
fn run_frame(
    context: &mut RenderContext,
    scene: &SceneGraph,
    window: &WindowConfig,
    events: &EventRoute,
    delta_time: f32,
) -> Result<bool, RenderError> {
    let mut close_requested = false;
    for kind in context.poll_events()? {
        close_requested |= kind == EventKind::WindowClose;
        events.deliver(Event::new(context.id(), kind));
    }

    if window.drive_updates {
        scene.update(delta_time);
    }

    let clear_color = window.clear_color;
    context.add_render_task(RenderTask::new(priority::CLEAR, move |gpu| gpu.clear(clear_color)).with_label("clear"));
    scene.register_draw(context);

    context.render()?;
    context.present()?;
    context.refresh();
    context.collect_garbage()?;
    Ok(close_requested)
}
