//! Platform Listener Seams
//!
//! Listener objects belong to the platform layer (Java objects on Android).
//! They are safe to call from any thread once that thread is attached to the
//! platform's managed environment, see [`ThreadAttacher`].

use crate::engine::PushResult;
use crate::error::Result;

/// Receives the engine's "background work finished" signal.
pub trait BackgroundReadyListener: Send + Sync {
    fn on_background_ready(&self);
}

/// Receives processed push results.
pub trait PushResultListener: Send + Sync {
    fn on_result(&self, result: &PushResult);

    /// Called when a push call finished without producing a result.
    fn on_no_result(&self) {}
}

/// Attaches native threads to the platform's managed-object environment.
pub trait ThreadAttacher: Send + Sync {
    /// Attaches the calling thread if it is not attached yet. Idempotent.
    fn ensure_current_thread_attached(&self) -> Result<()>;
}
