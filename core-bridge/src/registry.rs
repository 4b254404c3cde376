//! Handle Registry
//!
//! Process-wide owner of the bridge's cross-runtime handles: at most one
//! foreground context, plus one transient context per in-flight push call.
//!
//! Foreground contexts are shared as `Arc` snapshots. Callbacks in flight
//! keep their own strong reference, so replacing or clearing a context never
//! frees memory under them; disposal only empties the context's handles and
//! the callback observes that instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge_traits::{
    BackgroundReadyListener, JsDispatcher, JsRuntime, PushResult, PushResultListener, PushToken,
};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, trace};

static GLOBAL_REGISTRY: Lazy<Arc<HandleRegistry>> = Lazy::new(|| Arc::new(HandleRegistry::new()));

/// Capabilities held by a foreground context.
#[derive(Clone)]
pub struct ForegroundHandles {
    runtime: Arc<dyn JsRuntime>,
    dispatcher: Option<Arc<dyn JsDispatcher>>,
    background_ready: Option<Arc<dyn BackgroundReadyListener>>,
    push_result: Option<Arc<dyn PushResultListener>>,
}

impl ForegroundHandles {
    pub fn new(runtime: Arc<dyn JsRuntime>) -> Self {
        Self {
            runtime,
            dispatcher: None,
            background_ready: None,
            push_result: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn JsDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_background_ready(mut self, listener: Arc<dyn BackgroundReadyListener>) -> Self {
        self.background_ready = Some(listener);
        self
    }

    pub fn with_push_result(mut self, listener: Arc<dyn PushResultListener>) -> Self {
        self.push_result = Some(listener);
        self
    }

    pub fn runtime(&self) -> &Arc<dyn JsRuntime> {
        &self.runtime
    }
}

impl fmt::Debug for ForegroundHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForegroundHandles")
            .field("dispatcher", &self.dispatcher.is_some())
            .field("background_ready", &self.background_ready.is_some())
            .field("push_result", &self.push_result.is_some())
            .finish()
    }
}

/// The installed foreground context.
///
/// Accessors return `None` once the context was disposed.
pub struct ForegroundContext {
    generation: u64,
    handles: RwLock<Option<ForegroundHandles>>,
}

impl ForegroundContext {
    fn new(generation: u64, handles: ForegroundHandles) -> Self {
        Self {
            generation,
            handles: RwLock::new(Some(handles)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_disposed(&self) -> bool {
        self.handles.read().is_none()
    }

    pub fn runtime(&self) -> Option<Arc<dyn JsRuntime>> {
        self.handles.read().as_ref().map(|h| Arc::clone(&h.runtime))
    }

    pub fn dispatcher(&self) -> Option<Arc<dyn JsDispatcher>> {
        self.handles.read().as_ref().and_then(|h| h.dispatcher.clone())
    }

    pub fn background_ready(&self) -> Option<Arc<dyn BackgroundReadyListener>> {
        self.handles
            .read()
            .as_ref()
            .and_then(|h| h.background_ready.clone())
    }

    pub fn push_result(&self) -> Option<Arc<dyn PushResultListener>> {
        self.handles.read().as_ref().and_then(|h| h.push_result.clone())
    }

    /// Detaches the handles. The caller drops them.
    fn take_handles(&self) -> Option<ForegroundHandles> {
        self.handles.write().take()
    }
}

impl fmt::Debug for ForegroundContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForegroundContext")
            .field("generation", &self.generation)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Outcome of [`HandleRegistry::install`].
#[derive(Debug, Clone)]
pub struct Installation {
    pub context: Arc<ForegroundContext>,
    /// Generation of the context that was replaced and disposed.
    pub superseded: Option<u64>,
}

/// Transient context of one push call.
///
/// Consumed by [`deliver`](Self::deliver) or [`abandon`](Self::abandon), so
/// it is disposed exactly once.
pub struct PushContext {
    token: PushToken,
    listener: Arc<dyn PushResultListener>,
    completion: Option<oneshot::Sender<()>>,
}

impl PushContext {
    pub fn token(&self) -> PushToken {
        self.token
    }

    /// Hands the result to the listener and disposes the context.
    pub fn deliver(mut self, result: &PushResult) {
        self.listener.on_result(result);
        if let Some(completion) = self.completion.take() {
            // The waiter may have given up already.
            let _ = completion.send(());
        }
        trace!(push = %self.token, "Push context disposed after delivery");
    }

    /// Reports "no result" to the listener and disposes the context.
    pub fn abandon(self) {
        self.listener.on_no_result();
        trace!(push = %self.token, "Push context abandoned");
    }
}

impl fmt::Debug for PushContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushContext")
            .field("token", &self.token)
            .field("awaited", &self.completion.is_some())
            .finish()
    }
}

/// Owner of the foreground context and the in-flight push contexts.
pub struct HandleRegistry {
    foreground: RwLock<Option<Arc<ForegroundContext>>>,
    next_generation: AtomicU64,
    pushes: Mutex<HashMap<PushToken, PushContext>>,
    next_push: AtomicU64,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            foreground: RwLock::new(None),
            next_generation: AtomicU64::new(0),
            pushes: Mutex::new(HashMap::new()),
            next_push: AtomicU64::new(0),
        }
    }

    /// Registry shared by the whole process (C trampolines route through it).
    pub fn global() -> Arc<HandleRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Makes `handles` the current foreground context.
    ///
    /// The previous context, if any, is disposed before this returns; no
    /// reader can observe both contexts holding handles at once.
    pub fn install(&self, handles: ForegroundHandles) -> Installation {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let context = Arc::new(ForegroundContext::new(generation, handles));

        let (superseded, released) = {
            let mut slot = self.foreground.write();
            let previous = slot.take();
            let released = previous.as_ref().and_then(|old| old.take_handles());
            *slot = Some(Arc::clone(&context));
            (previous.map(|old| old.generation()), released)
        };
        // Dropped outside the lock; handle destructors may call back in.
        drop(released);

        debug!(generation, superseded = ?superseded, "Foreground context installed");
        Installation {
            context,
            superseded,
        }
    }

    /// Current foreground context, if one is installed.
    pub fn current(&self) -> Option<Arc<ForegroundContext>> {
        self.foreground.read().clone()
    }

    /// Disposes the current context. Returns its generation.
    pub fn clear(&self) -> Option<u64> {
        self.dispose_current(|_| true)
    }

    /// Disposes the current context only if it is still `generation`.
    pub fn clear_if_current(&self, generation: u64) -> bool {
        self.dispose_current(|current| current.generation() == generation)
            .is_some()
    }

    fn dispose_current(&self, matches: impl FnOnce(&ForegroundContext) -> bool) -> Option<u64> {
        let (generation, released) = {
            let mut slot = self.foreground.write();
            if !slot.as_deref().is_some_and(matches) {
                return None;
            }
            let previous = slot.take()?;
            (previous.generation(), previous.take_handles())
        };
        // Dropped outside the lock, as in `install`.
        drop(released);

        debug!(generation, "Foreground context cleared");
        Some(generation)
    }

    /// Opens a push context and returns the token the engine will echo back.
    pub fn open_push(
        &self,
        listener: Arc<dyn PushResultListener>,
        completion: Option<oneshot::Sender<()>>,
    ) -> PushToken {
        let token = PushToken(self.next_push.fetch_add(1, Ordering::SeqCst) + 1);
        let context = PushContext {
            token,
            listener,
            completion,
        };
        self.pushes.lock().insert(token, context);
        trace!(push = %token, "Push context opened");
        token
    }

    /// Removes the push context for `token`. Succeeds at most once per token.
    pub fn take_push(&self, token: PushToken) -> Option<PushContext> {
        self.pushes.lock().remove(&token)
    }

    pub fn pending_pushes(&self) -> usize {
        self.pushes.lock().len()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field(
                "foreground",
                &self.current().map(|context| context.generation()),
            )
            .field("pending_pushes", &self.pending_pushes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{error::Result, HostObject, JsArg};
    use std::sync::atomic::AtomicUsize;

    struct NullRuntime;

    impl JsRuntime for NullRuntime {
        fn call_global_function(&self, _name: &str, _arg: JsArg<'_>) -> Result<bool> {
            Ok(false)
        }

        fn install_global_object(&self, _name: &str, _object: HostObject) -> Result<()> {
            Ok(())
        }
    }

    struct CountingListener {
        background: AtomicUsize,
    }

    impl BackgroundReadyListener for CountingListener {
        fn on_background_ready(&self) {
            self.background.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingPushListener {
        results: Mutex<Vec<PushResult>>,
        no_result: AtomicUsize,
    }

    impl PushResultListener for RecordingPushListener {
        fn on_result(&self, result: &PushResult) {
            self.results.lock().push(result.clone());
        }

        fn on_no_result(&self) {
            self.no_result.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handles_with_listener(listener: &Arc<CountingListener>) -> ForegroundHandles {
        ForegroundHandles::new(Arc::new(NullRuntime))
            .with_background_ready(Arc::clone(listener) as Arc<dyn BackgroundReadyListener>)
    }

    #[test]
    fn test_install_supersedes_and_releases_previous() {
        let registry = HandleRegistry::new();
        let bg1 = Arc::new(CountingListener {
            background: AtomicUsize::new(0),
        });
        let bg2 = Arc::new(CountingListener {
            background: AtomicUsize::new(0),
        });

        let first = registry.install(handles_with_listener(&bg1));
        assert_eq!(first.superseded, None);
        assert_eq!(Arc::strong_count(&bg1), 2);

        let second = registry.install(handles_with_listener(&bg2));
        assert_eq!(second.superseded, Some(first.context.generation()));
        assert!(first.context.is_disposed());
        assert!(first.context.background_ready().is_none());
        assert_eq!(Arc::strong_count(&bg1), 1);

        let current = registry.current().unwrap();
        assert_eq!(current.generation(), second.context.generation());
        assert!(current.background_ready().is_some());
    }

    #[test]
    fn test_clear_disposes_current() {
        let registry = HandleRegistry::new();
        let installation = registry.install(ForegroundHandles::new(Arc::new(NullRuntime)));

        assert_eq!(registry.clear(), Some(installation.context.generation()));
        assert!(registry.current().is_none());
        assert!(installation.context.runtime().is_none());
        assert_eq!(registry.clear(), None);
    }

    #[test]
    fn test_clear_if_current_ignores_stale_generation() {
        let registry = HandleRegistry::new();
        let first = registry.install(ForegroundHandles::new(Arc::new(NullRuntime)));
        let second = registry.install(ForegroundHandles::new(Arc::new(NullRuntime)));

        assert!(!registry.clear_if_current(first.context.generation()));
        assert!(registry.current().is_some());

        assert!(registry.clear_if_current(second.context.generation()));
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_generations_increase() {
        let registry = HandleRegistry::new();
        let a = registry.install(ForegroundHandles::new(Arc::new(NullRuntime)));
        let b = registry.install(ForegroundHandles::new(Arc::new(NullRuntime)));
        assert!(b.context.generation() > a.context.generation());
    }

    #[test]
    fn test_push_context_taken_once() {
        let registry = HandleRegistry::new();
        let listener = Arc::new(RecordingPushListener::default());
        let token = registry.open_push(listener.clone(), None);
        assert_eq!(registry.pending_pushes(), 1);

        let context = registry.take_push(token).unwrap();
        assert!(registry.take_push(token).is_none());
        assert_eq!(registry.pending_pushes(), 0);

        let result = PushResult {
            message_id: "m1".to_string(),
            ..PushResult::default()
        };
        context.deliver(&result);
        assert_eq!(listener.results.lock().len(), 1);
        assert_eq!(Arc::strong_count(&listener), 1);
    }

    #[test]
    fn test_push_tokens_are_distinct() {
        let registry = HandleRegistry::new();
        let listener: Arc<dyn PushResultListener> = Arc::new(RecordingPushListener::default());
        let a = registry.open_push(Arc::clone(&listener), None);
        let b = registry.open_push(listener, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_abandon_reports_no_result() {
        let registry = HandleRegistry::new();
        let listener = Arc::new(RecordingPushListener::default());
        let token = registry.open_push(listener.clone(), None);

        registry.take_push(token).unwrap().abandon();

        assert_eq!(listener.no_result.load(Ordering::SeqCst), 1);
        assert!(listener.results.lock().is_empty());
    }

    #[test]
    fn test_deliver_signals_completion() {
        let registry = HandleRegistry::new();
        let (tx, mut rx) = oneshot::channel();
        let token = registry.open_push(Arc::new(RecordingPushListener::default()), Some(tx));

        registry.take_push(token).unwrap().deliver(&PushResult::default());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_context() {
        let registry = Arc::new(HandleRegistry::new());
        registry.install(ForegroundHandles::new(Arc::new(NullRuntime)));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let mut last = 0;
                        if let Some(context) = registry.current() {
                            assert!(context.generation() >= last);
                            last = context.generation();
                            // A snapshot stays readable even if it was superseded meanwhile.
                            let _ = context.runtime();
                        }
                        let _ = last;
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            registry.install(ForegroundHandles::new(Arc::new(NullRuntime)));
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(registry.current().is_some());
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = HandleRegistry::global();
        let b = HandleRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
