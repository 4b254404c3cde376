//! Bridge lifecycle events over `tokio::sync::broadcast`.
//!
//! [`BridgeEvent`] groups one enum per area (engine, context, push, bundle).
//! [`EventBus`] is the shared sender; [`EventStream`] is a receiver that can
//! skip events a consumer does not care about. Hosts and tests use these to
//! observe what the bridge did without reaching into its state.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{BridgeEvent, EngineEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus.emit(BridgeEvent::Engine(EngineEvent::Resumed)).ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event, BridgeEvent::Engine(EngineEvent::Resumed));
//! # }
//! ```
//!
//! `emit` fails only when nobody is subscribed, and the bridge ignores that
//! case. A receiver that falls behind gets `RecvError::Lagged(n)` and can keep
//! reading.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeEvent {
    Engine(EngineEvent),
    Context(ContextEvent),
    Push(PushEvent),
    Bundle(BundleEvent),
}

impl BridgeEvent {
    /// Short label for logs.
    pub fn description(&self) -> &str {
        match self {
            BridgeEvent::Engine(e) => e.description(),
            BridgeEvent::Context(e) => e.description(),
            BridgeEvent::Push(e) => e.description(),
            BridgeEvent::Bundle(e) => e.description(),
        }
    }

    /// Failed provisioning is an error, an expired push a warning; the
    /// remaining milestones are info and everything else debug.
    pub fn severity(&self) -> EventSeverity {
        match self {
            BridgeEvent::Bundle(BundleEvent::Failed { .. }) => EventSeverity::Error,
            BridgeEvent::Push(PushEvent::Expired { .. }) => EventSeverity::Warning,
            BridgeEvent::Engine(EngineEvent::Initialized { .. })
            | BridgeEvent::Push(PushEvent::Delivered { .. })
            | BridgeEvent::Push(PushEvent::Skipped { .. })
            | BridgeEvent::Bundle(BundleEvent::Provisioned { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Core engine lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EngineEvent {
    /// The engine's init entry point returned.
    Initialized { duration_ms: u64 },
    Suspended,
    Resumed,
}

impl EngineEvent {
    fn description(&self) -> &str {
        match self {
            EngineEvent::Initialized { .. } => "Core engine initialized",
            EngineEvent::Suspended => "Core engine suspended",
            EngineEvent::Resumed => "Core engine resumed",
        }
    }
}

/// Foreground context lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ContextEvent {
    /// A new foreground context is current.
    Installed {
        generation: u64,
        /// Generation of the context it replaced, if any.
        superseded: Option<u64>,
    },
    /// A foreground context released its handles.
    Disposed { generation: u64 },
}

impl ContextEvent {
    fn description(&self) -> &str {
        match self {
            ContextEvent::Installed { .. } => "Foreground context installed",
            ContextEvent::Disposed { .. } => "Foreground context disposed",
        }
    }
}

/// Standalone push processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PushEvent {
    /// A push context was opened and handed to the engine.
    Started { token: u64 },
    /// The engine answered and the listener was called.
    Delivered { token: u64 },
    /// The engine did not answer in time; the context was disposed.
    Expired { token: u64 },
    /// The push was not run because the lifecycle gate was closed.
    Skipped { reason: String },
}

impl PushEvent {
    fn description(&self) -> &str {
        match self {
            PushEvent::Started { .. } => "Push processing started",
            PushEvent::Delivered { .. } => "Push result delivered",
            PushEvent::Expired { .. } => "Push processing timed out",
            PushEvent::Skipped { .. } => "Push processing skipped",
        }
    }
}

/// Bundle provisioning at cold start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BundleEvent {
    Provisioned {
        asset_id: String,
        bytes: u64,
        duration_ms: u64,
    },
    Failed {
        asset_id: String,
        message: String,
    },
}

impl BundleEvent {
    fn description(&self) -> &str {
        match self {
            BundleEvent::Provisioned { .. } => "Bundle provisioned",
            BundleEvent::Failed { .. } => "Bundle provisioning failed",
        }
    }
}

/// Broadcast sender shared by every bridge component. Clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// `capacity` is how far a subscriber may fall behind before it sees
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of receivers the event reached; `Err` when there are none.
    pub fn emit(&self, event: BridgeEvent) -> Result<usize, SendError<BridgeEvent>> {
        self.sender.send(event)
    }

    /// Sees only events emitted after this call.
    pub fn subscribe(&self) -> Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&BridgeEvent) -> bool + Send + Sync>;

/// Receiver half of the bus, optionally narrowed by a predicate.
///
/// ```rust
/// use core_runtime::events::{BridgeEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let push_only = event_bus
///     .stream()
///     .filter(|event| matches!(event, BridgeEvent::Push(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<BridgeEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<BridgeEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Keep only events for which `predicate` returns true. Replaces any
    /// earlier filter.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&BridgeEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            filter: Some(Box::new(predicate)),
            ..self
        }
    }

    fn wants(&self, event: &BridgeEvent) -> bool {
        self.filter.as_ref().map_or(true, |keep| keep(event))
    }

    /// Waits for the next matching event.
    ///
    /// Errors are passed through from the underlying receiver: `Lagged(n)`
    /// after `n` events were overwritten, `Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<BridgeEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.wants(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking [`recv`](Self::recv). `None` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Option<Result<BridgeEvent, RecvError>> {
        use broadcast::error::TryRecvError;

        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.wants(&event) {
                return Some(Ok(event));
            }
        }
    }

    /// Everything matching that is already buffered. Lag gaps are skipped.
    pub fn drain(&mut self) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Some(Ok(event)) => events.push(event),
                Some(Err(RecvError::Lagged(_))) => continue,
                Some(Err(RecvError::Closed)) | None => return events,
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
