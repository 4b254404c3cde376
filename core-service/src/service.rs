//! Host-facing bridge service.

use std::fmt;
use std::sync::Arc;

use bridge_traits::{CoreEngine, PushResultListener, PushToken};
use core_bridge::{
    BundleProvisioner, CallbackMarshaler, ForegroundBridge, ForegroundHandles, HandleRegistry,
    PushInitGuard, PushOutcome, PushRunner,
};
use core_runtime::config::BridgeConfig;
use core_runtime::events::{BridgeEvent, EventBus, PushEvent};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::lifecycle::{LifecycleGate, LifecycleState, PushSkip};

/// Everything the platform layer calls into.
///
/// One service per process; it wraps the process-wide engine.
pub struct BridgeService {
    config: BridgeConfig,
    registry: Arc<HandleRegistry>,
    foreground: ForegroundBridge,
    push: PushRunner,
    provisioner: BundleProvisioner,
    gate: LifecycleGate,
    events: EventBus,
    init_lock: Mutex<()>,
}

impl BridgeService {
    /// Builds a service on the process-wide registry and push-init guard.
    pub fn new(config: BridgeConfig, engine: Arc<dyn CoreEngine>) -> Result<Self> {
        Self::with_registry(
            config,
            engine,
            HandleRegistry::global(),
            PushInitGuard::process(),
        )
    }

    /// Builds a service on its own registry and guard.
    pub fn with_registry(
        config: BridgeConfig,
        engine: Arc<dyn CoreEngine>,
        registry: Arc<HandleRegistry>,
        guard: Arc<PushInitGuard>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::default();
        let marshaler = Arc::new(CallbackMarshaler::new(
            Arc::clone(&registry),
            &engine,
            Arc::clone(&config.thread_attacher),
            config.js_globals.clone(),
            events.clone(),
        ));
        let foreground = ForegroundBridge::new(
            Arc::clone(&engine),
            Arc::clone(&marshaler),
            config.js_globals.clone(),
            events.clone(),
        );
        let push = PushRunner::new(engine, marshaler, guard, events.clone());
        let provisioner = BundleProvisioner::new(Arc::clone(&config.asset_store), events.clone());

        Ok(Self {
            config,
            registry,
            foreground,
            push,
            provisioner,
            gate: LifecycleGate::new(),
            events,
            init_lock: Mutex::new(()),
        })
    }

    /// Provisions both bundles, then initializes the engine if needed.
    ///
    /// Returns `true` if this call initialized the engine.
    pub fn cold_start(&self) -> Result<bool> {
        self.provisioner
            .provision(&self.config.main_bundle, &self.config.push_bundle)?;
        self.maybe_init()
    }

    /// Initializes the engine unless this service already did.
    pub fn maybe_init(&self) -> Result<bool> {
        let _guard = self.init_lock.lock();
        if self.gate.is_initialized() {
            debug!("Core engine already initialized");
            return Ok(false);
        }
        self.foreground.init_engine(&self.config.engine_paths())?;
        self.gate.mark_initialized();
        Ok(true)
    }

    /// Installs a foreground context. Call on the JS thread of `handles`.
    pub fn install_js(&self, handles: ForegroundHandles) -> Result<u64> {
        Ok(self.foreground.install(handles)?)
    }

    pub fn uninstall_js(&self) -> Option<u64> {
        self.foreground.uninstall()
    }

    pub fn maybe_suspend(&self) {
        if self.gate.enter_background() {
            self.foreground.suspend();
        } else {
            debug!("Suspend before init; engine untouched");
        }
    }

    pub fn maybe_resume(&self) {
        if self.gate.enter_foreground() {
            self.foreground.resume();
        } else {
            debug!("Resume before init; engine untouched");
        }
    }

    /// Allows push handling again if the UI is not visible.
    pub fn refresh_push_permission(&self) {
        self.gate.refresh_push_permission();
    }

    /// Runs a push through the engine unless the lifecycle gate is closed.
    ///
    /// Returns `None` when the push was skipped.
    pub fn maybe_run_push(
        &self,
        payload: &str,
        listener: Arc<dyn PushResultListener>,
    ) -> Result<Option<PushToken>> {
        if let Err(skip) = self.gate.check_push() {
            self.skip_push(skip);
            return Ok(None);
        }
        let token = self.push.run_push(
            payload,
            &self.config.home_dir,
            &self.config.push_bundle.destination,
            listener,
        )?;
        Ok(Some(token))
    }

    /// Like [`maybe_run_push`](Self::maybe_run_push), bounded by the
    /// configured push timeout.
    pub async fn maybe_run_push_with_timeout(
        &self,
        payload: &str,
        listener: Arc<dyn PushResultListener>,
    ) -> Result<Option<PushOutcome>> {
        if let Err(skip) = self.gate.check_push() {
            self.skip_push(skip);
            return Ok(None);
        }
        let outcome = self
            .push
            .run_push_with_timeout(
                payload,
                &self.config.home_dir,
                &self.config.push_bundle.destination,
                listener,
                self.config.push_timeout,
            )
            .await?;
        Ok(Some(outcome))
    }

    fn skip_push(&self, skip: PushSkip) {
        info!(reason = %skip, "Won't run push handler");
        let _ = self.events.emit(BridgeEvent::Push(PushEvent::Skipped {
            reason: skip.to_string(),
        }));
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.gate.state()
    }

    pub fn is_initialized(&self) -> bool {
        self.gate.is_initialized()
    }
}

#[cfg(feature = "desktop-shims")]
impl BridgeService {
    /// Installs a foreground context backed by a QuickJS host, on its JS thread.
    pub fn install_quickjs(
        self: &Arc<Self>,
        host: &bridge_desktop::QuickJsHost,
        background_ready: Option<Arc<dyn bridge_traits::BackgroundReadyListener>>,
        push_result: Option<Arc<dyn PushResultListener>>,
    ) -> Result<u64> {
        let mut handles =
            ForegroundHandles::new(host.runtime()).with_dispatcher(host.dispatcher());
        if let Some(listener) = background_ready {
            handles = handles.with_background_ready(listener);
        }
        if let Some(listener) = push_result {
            handles = handles.with_push_result(listener);
        }
        let service = Arc::clone(self);
        Ok(host.run_blocking(move || service.foreground.install(handles))?)
    }
}

impl fmt::Debug for BridgeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeService")
            .field("app_id", &self.config.app_id)
            .field("initialized", &self.gate.is_initialized())
            .field("state", &self.gate.state())
            .field("registry", &self.registry)
            .finish()
    }
}
