//! Push Runner
//!
//! Standalone push processing. It runs in processes that may never install a
//! foreground context, so it only depends on the engine and the registry's
//! push contexts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{CoreEngine, PushCallbacks, PushResultListener, PushToken};
use core_runtime::events::{BridgeEvent, EventBus, PushEvent};
use once_cell::sync::{Lazy, OnceCell};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, info, warn};

use crate::marshal::CallbackMarshaler;
use crate::registry::HandleRegistry;

static PROCESS_GUARD: Lazy<Arc<PushInitGuard>> = Lazy::new(|| Arc::new(PushInitGuard::new()));

/// Runs the engine's push-init entry point at most once.
///
/// Concurrent callers block until the first one finishes.
#[derive(Debug, Default)]
pub struct PushInitGuard {
    cell: OnceCell<PathBuf>,
}

impl PushInitGuard {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Guard shared by the whole process.
    pub fn process() -> Arc<PushInitGuard> {
        Arc::clone(&PROCESS_GUARD)
    }

    /// Returns `Ok(true)` if this call ran the init entry point. A failed
    /// init leaves the guard unset so the next caller tries again.
    pub fn ensure(&self, engine: &dyn CoreEngine, bundle_path: &Path) -> Result<bool> {
        let mut ran = false;
        let initialized = self.cell.get_or_try_init(|| {
            info!(bundle = %bundle_path.display(), "Initializing push subsystem");
            let started = Instant::now();
            engine.push_init(bundle_path).map_err(|error| {
                warn!(error = %error, "Push subsystem init failed");
                error
            })?;
            info!(
                duration_ms = started.elapsed().as_millis() as u64,
                "Push subsystem initialized"
            );
            ran = true;
            Ok::<_, BridgeError>(bundle_path.to_path_buf())
        })?;

        if !ran && initialized.as_path() != bundle_path {
            debug!(
                initialized = %initialized.display(),
                requested = %bundle_path.display(),
                "Push subsystem already initialized with another bundle"
            );
        }
        Ok(ran)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn bundle_path(&self) -> Option<&Path> {
        self.cell.get().map(PathBuf::as_path)
    }
}

/// How a push call with a deadline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The listener received the engine's result.
    Delivered,
    /// The engine did not answer in time; the listener got `on_no_result`.
    TimedOut,
    /// The context was disposed without a result (e.g. thread attach failed).
    Abandoned,
}

pub struct PushRunner {
    engine: Arc<dyn CoreEngine>,
    registry: Arc<HandleRegistry>,
    callbacks: Arc<dyn PushCallbacks>,
    guard: Arc<PushInitGuard>,
    events: EventBus,
}

impl PushRunner {
    pub fn new(
        engine: Arc<dyn CoreEngine>,
        marshaler: Arc<CallbackMarshaler>,
        guard: Arc<PushInitGuard>,
        events: EventBus,
    ) -> Self {
        Self {
            engine,
            registry: Arc::clone(marshaler.registry()),
            callbacks: marshaler,
            guard,
            events,
        }
    }

    pub fn ensure_push_subsystem_initialized(&self, bundle_path: &Path) -> Result<bool> {
        self.guard.ensure(self.engine.as_ref(), bundle_path)
    }

    /// Hands `payload` to the engine. The result reaches `listener` through
    /// the push callback, after which the push context is disposed.
    pub fn run_push(
        &self,
        payload: &str,
        home_dir: &Path,
        bundle_path: &Path,
        listener: Arc<dyn PushResultListener>,
    ) -> Result<PushToken> {
        self.start(payload, home_dir, bundle_path, listener, None)
    }

    /// Like [`run_push`](Self::run_push), but disposes the push context and
    /// reports "no result" if the engine has not answered within `timeout`.
    ///
    /// The engine's push entry point itself is not interrupted.
    pub async fn run_push_with_timeout(
        &self,
        payload: &str,
        home_dir: &Path,
        bundle_path: &Path,
        listener: Arc<dyn PushResultListener>,
        timeout: Duration,
    ) -> Result<PushOutcome> {
        let (completion, mut done) = oneshot::channel();
        let token = self.start(payload, home_dir, bundle_path, listener, Some(completion))?;

        match time::timeout(timeout, &mut done).await {
            Ok(Ok(())) => Ok(PushOutcome::Delivered),
            Ok(Err(_)) => Ok(PushOutcome::Abandoned),
            Err(_) => match self.registry.take_push(token) {
                Some(context) => {
                    warn!(push = %token, timeout_ms = timeout.as_millis() as u64, "Push timed out");
                    context.abandon();
                    let _ = self.events.emit(BridgeEvent::Push(PushEvent::Expired {
                        token: token.as_u64(),
                    }));
                    Ok(PushOutcome::TimedOut)
                }
                // The callback claimed the context right at the deadline;
                // it either delivers or abandons, and says which.
                None => match done.await {
                    Ok(()) => Ok(PushOutcome::Delivered),
                    Err(_) => Ok(PushOutcome::Abandoned),
                },
            },
        }
    }

    fn start(
        &self,
        payload: &str,
        home_dir: &Path,
        bundle_path: &Path,
        listener: Arc<dyn PushResultListener>,
        completion: Option<oneshot::Sender<()>>,
    ) -> Result<PushToken> {
        self.ensure_push_subsystem_initialized(bundle_path)?;

        let token = self.registry.open_push(listener, completion);
        debug!(push = %token, payload_len = payload.len(), "Running push");
        let _ = self.events.emit(BridgeEvent::Push(PushEvent::Started {
            token: token.as_u64(),
        }));

        if let Err(error) = self
            .engine
            .push(payload, home_dir, Arc::clone(&self.callbacks), token)
        {
            warn!(push = %token, error = %error, "Engine rejected push");
            drop(self.registry.take_push(token));
            return Err(error);
        }
        Ok(token)
    }
}
