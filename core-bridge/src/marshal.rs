//! Callback Marshaler
//!
//! Routes the engine's callbacks, which arrive on engine-owned threads, to
//! the context that owns their target. JavaScript-bound callbacks always hop
//! through the context's dispatcher; platform-bound callbacks run inline after
//! the calling thread is attached to the platform.

use std::sync::{Arc, Weak};

use bridge_traits::{
    CoreEngine, EngineCallbacks, JsArg, JsDispatcher, JsGlobalNames, NativeBuffer, PushCallbacks,
    PushResult, PushToken, ThreadAttacher,
};
use core_runtime::events::{BridgeEvent, EventBus, PushEvent};
use core_runtime::logging::ENGINE_LOG_TARGET;
use tracing::{debug, info, trace, warn};

use crate::registry::{ForegroundContext, HandleRegistry};

pub struct CallbackMarshaler {
    registry: Arc<HandleRegistry>,
    engine: Weak<dyn CoreEngine>,
    attacher: Arc<dyn ThreadAttacher>,
    globals: JsGlobalNames,
    events: EventBus,
}

impl CallbackMarshaler {
    /// The engine is held weakly; it owns the marshaler as its callback table.
    pub fn new(
        registry: Arc<HandleRegistry>,
        engine: &Arc<dyn CoreEngine>,
        attacher: Arc<dyn ThreadAttacher>,
        globals: JsGlobalNames,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            engine: Arc::downgrade(engine),
            attacher,
            globals,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    fn dispatch_target(&self) -> Option<(Arc<ForegroundContext>, Arc<dyn JsDispatcher>)> {
        let context = self.registry.current()?;
        let dispatcher = context.dispatcher()?;
        Some((context, dispatcher))
    }

    fn attach(&self, callback: &str) -> bool {
        match self.attacher.ensure_current_thread_attached() {
            Ok(()) => true,
            Err(error) => {
                warn!(callback, error = %error, "Cannot attach engine thread; dropping callback");
                false
            }
        }
    }
}

impl EngineCallbacks for CallbackMarshaler {
    fn on_log(&self, message: &str) {
        let Some((context, dispatcher)) = self.dispatch_target() else {
            info!(target: ENGINE_LOG_TARGET, "{}", message);
            return;
        };

        let listener = self.globals.log_listener.clone();
        let line = message.to_owned();
        let job = Box::new(move || {
            let Some(runtime) = context.runtime() else {
                trace!(generation = context.generation(), "Log line for disposed context dropped");
                return;
            };
            if let Err(error) = runtime.call_global_function(&listener, JsArg::Utf8(&line)) {
                warn!(listener = %listener, error = %error, "Log listener failed");
            }
        });

        if let Err(error) = dispatcher.invoke_async(job) {
            debug!(error = %error, "Log dispatch failed; writing directly");
            info!(target: ENGINE_LOG_TARGET, "{}", message);
        }
    }

    fn on_sync_signal(&self) {
        let Some((_, dispatcher)) = self.dispatch_target() else {
            debug!("Sync signal dropped: no foreground dispatcher");
            return;
        };

        let engine = Weak::clone(&self.engine);
        let job = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.sync_receive();
            }
        });

        if let Err(error) = dispatcher.invoke_async(job) {
            warn!(error = %error, "Sync signal dropped");
        }
    }

    fn on_sync(&self, buffer: NativeBuffer) {
        let Some((context, dispatcher)) = self.dispatch_target() else {
            debug!(bytes = buffer.len(), "Sync message dropped: no foreground dispatcher");
            return;
        };

        let listener = self.globals.sync_listener.clone();
        let job = Box::new(move || {
            if let Some(runtime) = context.runtime() {
                match runtime.call_global_function(&listener, JsArg::Bytes(buffer.as_slice())) {
                    Ok(true) => trace!(bytes = buffer.len(), "Sync message delivered"),
                    Ok(false) => {}
                    Err(error) => warn!(listener = %listener, error = %error, "Sync listener failed"),
                }
            }
            drop(buffer);
        });

        // A rejected job is dropped here, releasing the buffer with it.
        if let Err(error) = dispatcher.invoke_async(job) {
            warn!(error = %error, "Sync message dropped");
        }
    }

    fn on_background_ready(&self) {
        let Some(listener) = self.registry.current().and_then(|c| c.background_ready()) else {
            debug!("Background-ready dropped: no listener");
            return;
        };
        if self.attach("background_ready") {
            listener.on_background_ready();
        }
    }

    fn on_push_app(&self, result: PushResult) {
        let Some(listener) = self.registry.current().and_then(|c| c.push_result()) else {
            debug!("Foreground push result dropped: no listener");
            return;
        };
        if self.attach("push_app") {
            listener.on_result(&result);
        }
    }
}

impl PushCallbacks for CallbackMarshaler {
    fn on_push(&self, result: PushResult, token: PushToken) {
        let Some(context) = self.registry.take_push(token) else {
            warn!(push = %token, "Push result for unknown or expired context dropped");
            return;
        };

        if !self.attach("push") {
            context.abandon();
            return;
        }
        context.deliver(&result);
        let _ = self.events.emit(BridgeEvent::Push(PushEvent::Delivered {
            token: token.as_u64(),
        }));
    }
}
