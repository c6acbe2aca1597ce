//! Window and input events
//!
//! Backends report raw [`EventKind`]s; the context thread tags them with its
//! [`ContextId`] and hands them to the [`EventBus`]. Listeners register with
//! an [`EventMask`] so they only see what they asked for, and are held
//! weakly: dropping the last `Arc` to a listener unsubscribes it.
//!
//! Delivery follows a chain of responsibility. Listeners are called in
//! subscription order and a listener that returns `true` consumes the event,
//! stopping further forwarding.

use crate::render::ContextId;
use bitflags::bitflags;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    /// Key went down
    Press,
    /// Key went up
    Release,
    /// Key held long enough to auto-repeat
    Repeat,
}

/// Raw event as reported by a window backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Close requested
    WindowClose,
    /// Focus gained or lost
    WindowFocus {
        /// Whether the window now has focus
        focused: bool,
    },
    /// Framebuffer resized
    WindowResize {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
    /// Window moved on screen
    WindowMove {
        /// Left edge in screen coordinates
        x: i32,
        /// Top edge in screen coordinates
        y: i32,
    },
    /// Keyboard input
    Key {
        /// Platform key code
        key: u32,
        /// Transition
        action: KeyAction,
    },
    /// Cursor moved
    MouseMove {
        /// Cursor x in window coordinates
        x: f64,
        /// Cursor y in window coordinates
        y: f64,
    },
}

impl EventKind {
    /// Mask bit matching this event
    pub fn mask(&self) -> EventMask {
        match self {
            Self::WindowClose => EventMask::WINDOW_CLOSE,
            Self::WindowFocus { .. } => EventMask::WINDOW_FOCUS,
            Self::WindowResize { .. } => EventMask::WINDOW_RESIZE,
            Self::WindowMove { .. } => EventMask::WINDOW_MOVE,
            Self::Key { .. } => EventMask::KEY,
            Self::MouseMove { .. } => EventMask::MOUSE_MOVE,
        }
    }
}

/// Event tagged with the context it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Originating context
    pub context: ContextId,
    /// What happened
    pub kind: EventKind,
}

impl Event {
    /// Tag `kind` with its context
    pub fn new(context: ContextId, kind: EventKind) -> Self {
        Self { context, kind }
    }
}

bitflags! {
    /// Filter selecting which events a listener receives
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// [`EventKind::WindowClose`]
        const WINDOW_CLOSE = 1 << 0;
        /// [`EventKind::WindowFocus`]
        const WINDOW_FOCUS = 1 << 1;
        /// [`EventKind::WindowResize`]
        const WINDOW_RESIZE = 1 << 2;
        /// [`EventKind::WindowMove`]
        const WINDOW_MOVE = 1 << 3;
        /// [`EventKind::Key`]
        const KEY = 1 << 4;
        /// [`EventKind::MouseMove`]
        const MOUSE_MOVE = 1 << 5;

        /// Every window event
        const WINDOW = Self::WINDOW_CLOSE.bits()
            | Self::WINDOW_FOCUS.bits()
            | Self::WINDOW_RESIZE.bits()
            | Self::WINDOW_MOVE.bits();
        /// Keyboard and mouse
        const INPUT = Self::KEY.bits() | Self::MOUSE_MOVE.bits();
    }
}

/// Receiver of events
///
/// Called from whichever thread delivers the event, which is the
/// dispatcher thread when one is running.
pub trait EventListener: Send + Sync {
    /// Handle an event; return true to consume it
    fn on_event(&self, event: &Event) -> bool;
}

/// Token returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    mask: EventMask,
    listener: Weak<dyn EventListener>,
}

/// Event system errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The dispatcher thread has shut down
    #[error("Event dispatcher is no longer running")]
    DispatcherClosed,
}

/// Publish/subscribe hub with weakly held listeners
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus without listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for the events in `mask`
    ///
    /// The bus keeps only a weak reference.
    pub fn subscribe<L>(&self, listener: &Arc<L>, mask: EventMask) -> SubscriptionId
    where
        L: EventListener + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Arc<dyn EventListener> = listener.clone();
        self.subscriptions.write().push(Subscription {
            id,
            mask,
            listener: Arc::downgrade(&listener),
        });
        log::trace!("Subscribed listener {id:?} for {mask:?}");
        id
    }

    /// Remove a subscription; false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    /// Number of subscriptions whose listener is still alive
    pub fn listener_count(&self) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|subscription| subscription.listener.strong_count() > 0)
            .count()
    }

    /// Deliver `event` synchronously on the calling thread
    ///
    /// Returns whether a listener consumed it. Subscriptions whose listener
    /// has been dropped are pruned.
    pub fn publish(&self, event: &Event) -> bool {
        let bit = event.kind.mask();
        let mut saw_dead = false;

        // Listeners run without the lock held so they may subscribe or publish
        let targets: Vec<Arc<dyn EventListener>> = self
            .subscriptions
            .read()
            .iter()
            .filter_map(|subscription| {
                let listener = subscription.listener.upgrade();
                saw_dead |= listener.is_none();
                listener.filter(|_| subscription.mask.contains(bit))
            })
            .collect();

        if saw_dead {
            self.prune();
        }

        targets.iter().any(|listener| listener.on_event(event))
    }

    /// Drop subscriptions whose listener is gone
    pub fn prune(&self) {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.listener.strong_count() > 0);
        let pruned = before - subscriptions.len();
        if pruned > 0 {
            log::trace!("Pruned {pruned} dead event listeners");
        }
    }

    /// Move delivery to a dedicated thread
    ///
    /// Events sent through the returned dispatcher's senders are published
    /// in order on that thread. The thread exits when the dispatcher is shut
    /// down or every sender has been dropped, whichever comes first.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> std::io::Result<EventDispatcher> {
        let (sender, receiver) = unbounded();
        let (stop, stop_rx) = bounded(1);
        let bus = Arc::clone(self);
        let thread = thread::Builder::new()
            .name("event-dispatch".into())
            .spawn(move || dispatch_loop(&bus, &receiver, &stop_rx))?;

        log::debug!("Started event dispatcher thread");
        Ok(EventDispatcher {
            sender: EventSender { sender },
            stop,
            thread: Some(thread),
        })
    }
}

fn dispatch_loop(bus: &EventBus, receiver: &Receiver<Event>, stop: &Receiver<()>) {
    loop {
        select! {
            recv(receiver) -> event => match event {
                Ok(event) => {
                    bus.publish(&event);
                }
                Err(_) => break,
            },
            recv(stop) -> _ => {
                // Deliver what was queued before the stop request
                for event in receiver.try_iter() {
                    bus.publish(&event);
                }
                break;
            }
        }
    }
    log::debug!("Event dispatcher thread exiting");
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}

/// Cloneable handle that queues events for the dispatcher thread
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<Event>,
}

impl EventSender {
    /// Queue an event
    pub fn send(&self, event: Event) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::DispatcherClosed)
    }
}

/// Owner of the dispatcher thread
#[derive(Debug)]
pub struct EventDispatcher {
    sender: EventSender,
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    /// New sender feeding this dispatcher
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Stop the dispatcher thread and wait for it
    ///
    /// Events already queued are delivered first. Outstanding
    /// [`EventSender`] clones do not keep the thread alive; sending through
    /// them afterwards fails with [`EventError::DispatcherClosed`].
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(thread) = self.thread.take() else { return };
        // Full or disconnected both mean the thread is already stopping
        let _ = self.stop.try_send(());
        if thread.join().is_err() {
            log::error!("Event dispatcher thread panicked");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.join();
    }
}
