//! Foreground Bridge
//!
//! Installs the foreground context and publishes the bridge object through
//! which JavaScript sends sync messages into the engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_traits::error::Result;
use bridge_traits::{CoreEngine, EngineCallbacks, EnginePaths, HostObject, JsGlobalNames};
use core_runtime::events::{BridgeEvent, ContextEvent, EngineEvent, EventBus};
use tracing::{debug, info, warn};

use crate::marshal::CallbackMarshaler;
use crate::registry::{ForegroundHandles, HandleRegistry};

/// Name of the method published on the bridge object.
pub const SYNC_METHOD: &str = "sync";

pub struct ForegroundBridge {
    engine: Arc<dyn CoreEngine>,
    registry: Arc<HandleRegistry>,
    marshaler: Arc<CallbackMarshaler>,
    globals: JsGlobalNames,
    events: EventBus,
}

impl ForegroundBridge {
    pub fn new(
        engine: Arc<dyn CoreEngine>,
        marshaler: Arc<CallbackMarshaler>,
        globals: JsGlobalNames,
        events: EventBus,
    ) -> Self {
        Self {
            registry: Arc::clone(marshaler.registry()),
            engine,
            marshaler,
            globals,
            events,
        }
    }

    /// Calls the engine's init entry point with the marshaler as its callbacks.
    pub fn init_engine(&self, paths: &EnginePaths) -> Result<Duration> {
        info!(
            app_id = %paths.app_id,
            bundle = %paths.bundle_path.display(),
            "Initializing core engine"
        );
        let started = Instant::now();
        let callbacks: Arc<dyn EngineCallbacks> = self.marshaler.clone();
        self.engine.init(paths, callbacks)?;
        let elapsed = started.elapsed();

        info!(duration_ms = elapsed.as_millis() as u64, "Core engine initialized");
        let _ = self.events.emit(BridgeEvent::Engine(EngineEvent::Initialized {
            duration_ms: elapsed.as_millis() as u64,
        }));
        Ok(elapsed)
    }

    /// Makes `handles` the foreground context and publishes the bridge object
    /// on its runtime. Must run on that runtime's JS thread.
    ///
    /// Returns the generation of the new context. Any earlier context is
    /// disposed, and the object published for it is replaced.
    pub fn install(&self, handles: ForegroundHandles) -> Result<u64> {
        let runtime = Arc::clone(handles.runtime());
        let installation = self.registry.install(handles);
        let generation = installation.context.generation();

        if let Some(previous) = installation.superseded {
            self.emit_context(ContextEvent::Disposed {
                generation: previous,
            });
        }
        self.emit_context(ContextEvent::Installed {
            generation,
            superseded: installation.superseded,
        });

        let object = self.bridge_object(generation);
        if let Err(error) = runtime.install_global_object(&self.globals.bridge_object, object) {
            warn!(generation, error = %error, "Publishing bridge object failed");
            if self.registry.clear_if_current(generation) {
                self.emit_context(ContextEvent::Disposed { generation });
            }
            return Err(error);
        }

        debug!(generation, object = %self.globals.bridge_object, "Bridge object published");
        Ok(generation)
    }

    /// Disposes the current foreground context, if any.
    pub fn uninstall(&self) -> Option<u64> {
        let generation = self.registry.clear()?;
        self.emit_context(ContextEvent::Disposed { generation });
        Some(generation)
    }

    pub fn suspend(&self) {
        self.engine.suspend();
        let _ = self.events.emit(BridgeEvent::Engine(EngineEvent::Suspended));
    }

    pub fn resume(&self) {
        self.engine.resume();
        let _ = self.events.emit(BridgeEvent::Engine(EngineEvent::Resumed));
    }

    fn bridge_object(&self, generation: u64) -> HostObject {
        let engine = Arc::downgrade(&self.engine);
        let registry = Arc::downgrade(&self.registry);
        let events = self.events.clone();

        HostObject::new()
            .with_method(SYNC_METHOD, move |message: &[u8]| {
                if let Some(engine) = engine.upgrade() {
                    engine.sync_send(message);
                }
            })
            .with_release_hook(move || {
                // Runtime teardown; a replacement install already moved on.
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                if registry.clear_if_current(generation) {
                    let _ = events.emit(BridgeEvent::Context(ContextEvent::Disposed { generation }));
                }
            })
    }

    fn emit_context(&self, event: ContextEvent) {
        let _ = self.events.emit(BridgeEvent::Context(event));
    }
}
