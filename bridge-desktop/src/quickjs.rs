//! QuickJS-backed JavaScript host.
//!
//! [`QuickJsHost`] owns a dedicated JS thread. The QuickJS runtime, its
//! context and every published [`HostObject`] live in that thread's local
//! storage and never leave it; other threads reach them only by queueing
//! jobs through the [`QueueDispatcher`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle, ThreadId};

use bridge_traits::{
    error::{BridgeError, Result},
    HostObject, JsArg, JsDispatcher, JsRuntime,
};
use rquickjs::{Context, Ctx, FromJs, Function, Object, Runtime, TypedArray, Value};
use tracing::{debug, error, info, warn};

use crate::dispatcher::{JsThreadQueue, QueueDispatcher, DEFAULT_QUEUE_CAPACITY};

/// Upper bound on promise jobs run after a single task.
const MAX_PENDING_JOBS: usize = 1000;

struct JsThreadState {
    context: Context,
    runtime: Runtime,
    objects: RefCell<HashMap<String, HostObject>>,
}

impl JsThreadState {
    fn new() -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| {
            BridgeError::OperationFailed(format!("failed to create QuickJS runtime: {e}"))
        })?;
        let context = Context::full(&runtime).map_err(|e| {
            BridgeError::OperationFailed(format!("failed to create QuickJS context: {e}"))
        })?;
        Ok(Self {
            context,
            runtime,
            objects: RefCell::new(HashMap::new()),
        })
    }

    fn drain_pending_jobs(&self) {
        let mut executed = 0;
        while self.runtime.is_job_pending() {
            match self.runtime.execute_pending_job() {
                Ok(true) => {
                    executed += 1;
                    if executed >= MAX_PENDING_JOBS {
                        warn!(
                            executed,
                            "Stopped running promise jobs (possible infinite loop)"
                        );
                        break;
                    }
                }
                Ok(false) => break,
                Err(job_exception) => {
                    error!("Promise job failed: {:?}", job_exception);
                    break;
                }
            }
        }
    }

    /// Drops published objects before the context, firing their release hooks.
    fn release(self) {
        let objects = std::mem::take(&mut *self.objects.borrow_mut());
        let count = objects.len();
        drop(objects);
        debug!(count, "Released host objects");
        drop(self);
    }
}

thread_local! {
    static JS_STATE: RefCell<Option<JsThreadState>> = const { RefCell::new(None) };
}

fn with_state<R>(f: impl FnOnce(&JsThreadState) -> Result<R>) -> Result<R> {
    JS_STATE.with(|cell| {
        let guard = cell.try_borrow().map_err(|_| {
            BridgeError::OperationFailed("JS runtime is being torn down".to_string())
        })?;
        let state = guard
            .as_ref()
            .ok_or_else(|| BridgeError::NotAvailable("JS runtime is shut down".to_string()))?;
        f(state)
    })
}

fn js_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> BridgeError {
    if !matches!(err, rquickjs::Error::Exception) {
        return BridgeError::Script(err.to_string());
    }
    let exception: Value = ctx.catch();
    let message = exception
        .as_object()
        .and_then(|obj| obj.get::<_, String>("message").ok())
        .unwrap_or_else(|| format!("{:?}", exception));
    BridgeError::Script(message)
}

/// [`JsRuntime`] handle for a [`QuickJsHost`].
///
/// Cheap to share; every call checks that it runs on the host's JS thread.
#[derive(Debug)]
pub struct QuickJsRuntime {
    thread_id: ThreadId,
}

impl QuickJsRuntime {
    pub fn is_js_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn ensure_js_thread(&self, operation: &str) -> Result<()> {
        if self.is_js_thread() {
            Ok(())
        } else {
            Err(BridgeError::WrongThread(format!(
                "{operation} called from {:?}",
                thread::current().name().unwrap_or("unnamed thread")
            )))
        }
    }
}

impl JsRuntime for QuickJsRuntime {
    fn call_global_function(&self, name: &str, arg: JsArg<'_>) -> Result<bool> {
        self.ensure_js_thread("call_global_function")?;
        with_state(|state| {
            state.context.with(|ctx| {
                let value: Value = ctx.globals().get(name).map_err(|e| js_error(&ctx, e))?;
                let Some(function) = value.as_function() else {
                    return Ok(false);
                };
                let outcome = match arg {
                    JsArg::Utf8(text) => function.call::<_, Value>((text,)),
                    JsArg::Bytes(bytes) => TypedArray::<u8>::new(ctx.clone(), bytes.to_vec())
                        .and_then(|array| function.call::<_, Value>((array,))),
                };
                outcome.map(|_| true).map_err(|e| js_error(&ctx, e))
            })
        })
    }

    fn install_global_object(&self, name: &str, object: HostObject) -> Result<()> {
        self.ensure_js_thread("install_global_object")?;
        let previous = with_state(|state| {
            state.context.with(|ctx| {
                build_object(&ctx, &object)
                    .and_then(|target| ctx.globals().set(name, target))
                    .map_err(|e| js_error(&ctx, e))
            })?;
            Ok(state.objects.borrow_mut().insert(name.to_string(), object))
        })?;
        if previous.is_some() {
            debug!(global = name, "Replaced host object");
        }
        // Outside the state borrow: release hooks may run arbitrary code.
        drop(previous);
        Ok(())
    }
}

fn build_object<'js>(ctx: &Ctx<'js>, object: &HostObject) -> rquickjs::Result<Object<'js>> {
    let target = Object::new(ctx.clone())?;
    for (method_name, method) in object.methods() {
        let method = Arc::clone(method);
        let label = method_name.clone();
        let function = Function::new(
            ctx.clone(),
            move |message: TypedArray<'_, u8>| -> rquickjs::Result<()> {
                let bytes = message
                    .as_bytes()
                    .ok_or_else(|| rquickjs::Error::new_from_js("detached buffer", "Uint8Array"))?;
                catch_unwind(AssertUnwindSafe(|| method(bytes))).map_err(|_| {
                    error!(method = %label, "Host method panicked");
                    rquickjs::Error::Unknown
                })
            },
        )?
        .with_name(method_name.as_str())?;
        target.set(method_name.as_str(), function)?;
    }
    Ok(target)
}

fn eval_on_js_thread<T>(source: String) -> Result<T>
where
    T: for<'js> FromJs<'js>,
{
    with_state(|state| {
        let value = state
            .context
            .with(|ctx| ctx.eval::<T, _>(source).map_err(|e| js_error(&ctx, e)))?;
        state.drain_pending_jobs();
        Ok(value)
    })
}

fn js_thread_main(mut queue: JsThreadQueue, ready: mpsc::Sender<Result<()>>) {
    match JsThreadState::new() {
        Ok(state) => {
            JS_STATE.with(|cell| *cell.borrow_mut() = Some(state));
            if ready.send(Ok(())).is_err() {
                return;
            }
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    }

    while let Some(job) = queue.next_job() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("JS thread job panicked");
        }
        let _ = with_state(|state| {
            state.drain_pending_jobs();
            Ok(())
        });
    }

    if let Some(state) = JS_STATE.with(|cell| cell.borrow_mut().take()) {
        state.release();
    }
    info!("JS thread stopped");
}

/// A QuickJS runtime running on its own thread.
pub struct QuickJsHost {
    runtime: Arc<QuickJsRuntime>,
    dispatcher: Arc<QueueDispatcher>,
    thread: Option<JoinHandle<()>>,
}

impl QuickJsHost {
    pub fn start() -> Result<Self> {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Starts the JS thread with a job queue of `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let (dispatcher, queue) = QueueDispatcher::channel(capacity);
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("js-thread".to_string())
            .spawn(move || js_thread_main(queue, ready_tx))?;
        let thread_id = thread.thread().id();

        ready_rx.recv().map_err(|_| {
            BridgeError::OperationFailed("JS thread exited during startup".to_string())
        })??;

        info!(capacity = dispatcher.capacity(), "QuickJS host started");

        Ok(Self {
            runtime: Arc::new(QuickJsRuntime { thread_id }),
            dispatcher: Arc::new(dispatcher),
            thread: Some(thread),
        })
    }

    pub fn runtime(&self) -> Arc<QuickJsRuntime> {
        Arc::clone(&self.runtime)
    }

    pub fn dispatcher(&self) -> Arc<QueueDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Runs `f` on the JS thread and waits for its result.
    ///
    /// Runs inline when already on the JS thread.
    pub fn run_blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> Result<R> + Send + 'static,
    {
        if self.runtime.is_js_thread() {
            return f();
        }
        let (tx, rx) = mpsc::channel();
        self.dispatcher.invoke_async(Box::new(move || {
            let _ = tx.send(f());
        }))?;
        rx.recv().map_err(|_| {
            BridgeError::OperationFailed("JS thread stopped before the job finished".to_string())
        })?
    }

    /// Evaluates `source` in the global scope and converts the result.
    pub fn eval<T>(&self, source: &str) -> Result<T>
    where
        T: for<'js> FromJs<'js> + Send + 'static,
    {
        let source = source.to_string();
        self.run_blocking(move || eval_on_js_thread::<T>(source))
    }

    /// Waits until every job queued before this call has run.
    pub fn flush(&self) -> Result<()> {
        self.run_blocking(|| Ok(()))
    }

    /// Stops the JS thread and releases published host objects on it.
    pub fn shutdown(&mut self) {
        self.dispatcher.close();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // Dropped from one of its own jobs; the loop exits on its own.
            return;
        }
        if thread.join().is_err() {
            error!("JS thread panicked during shutdown");
        }
    }
}

impl Drop for QuickJsHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for QuickJsHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickJsHost")
            .field("running", &self.thread.is_some())
            .field("queue_capacity", &self.dispatcher.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_eval_returns_value() {
        let host = QuickJsHost::start().unwrap();
        let value: i32 = host.eval("1 + 2").unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_runtime_rejects_other_threads() {
        let host = QuickJsHost::start().unwrap();
        let runtime = host.runtime();

        let err = runtime
            .call_global_function("anything", JsArg::Utf8("x"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::WrongThread(_)));
    }

    #[test]
    fn test_missing_global_is_not_an_error() {
        let host = QuickJsHost::start().unwrap();
        let runtime = host.runtime();

        let called = host
            .run_blocking(move || runtime.call_global_function("__nobody", JsArg::Utf8("x")))
            .unwrap();
        assert!(!called);

        host.eval::<()>("globalThis.__notAFunction = 5;").unwrap();
        let runtime = host.runtime();
        let called = host
            .run_blocking(move || runtime.call_global_function("__notAFunction", JsArg::Utf8("x")))
            .unwrap();
        assert!(!called);
    }

    #[test]
    fn test_bytes_arrive_as_uint8array() {
        let host = QuickJsHost::start().unwrap();
        host.eval::<()>(
            "globalThis.seen = ''; \
             globalThis.__listener = (m) => { seen = [m instanceof Uint8Array, m.length, m[0], m[2]].join(','); };",
        )
        .unwrap();

        let runtime = host.runtime();
        let called = host
            .run_blocking(move || {
                runtime.call_global_function("__listener", JsArg::Bytes(&[7, 8, 9]))
            })
            .unwrap();

        assert!(called);
        assert_eq!(host.eval::<String>("seen").unwrap(), "true,3,7,9");
    }

    #[test]
    fn test_utf8_argument() {
        let host = QuickJsHost::start().unwrap();
        host.eval::<()>("globalThis.lines = []; globalThis.__log = (l) => lines.push(l);")
            .unwrap();

        let runtime = host.runtime();
        host.run_blocking(move || runtime.call_global_function("__log", JsArg::Utf8("hello")))
            .unwrap();

        assert_eq!(host.eval::<String>("lines.join('|')").unwrap(), "hello");
    }

    #[test]
    fn test_listener_exception_becomes_script_error() {
        let host = QuickJsHost::start().unwrap();
        host.eval::<()>("globalThis.__bad = () => { throw new Error('boom'); };")
            .unwrap();

        let runtime = host.runtime();
        let err = host
            .run_blocking(move || runtime.call_global_function("__bad", JsArg::Utf8("x")))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Script(message) if message.contains("boom")));
    }

    #[test]
    fn test_host_object_method_receives_bytes() {
        let host = QuickJsHost::start().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let object = HostObject::new().with_method("sync", move |bytes| {
            sink.lock().unwrap().push(bytes.to_vec());
        });

        let runtime = host.runtime();
        host.run_blocking(move || runtime.install_global_object("__kc", object))
            .unwrap();
        host.eval::<()>("__kc.sync(new Uint8Array([1, 2, 3]));").unwrap();

        assert_eq!(*received.lock().unwrap(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_host_method_rejects_non_binary_argument() {
        let host = QuickJsHost::start().unwrap();
        let object = HostObject::new().with_method("sync", |_| {});
        let runtime = host.runtime();
        host.run_blocking(move || runtime.install_global_object("__kc", object))
            .unwrap();

        let result = host.eval::<()>("__kc.sync('text');");
        assert!(matches!(result, Err(BridgeError::Script(_))));
    }

    #[test]
    fn test_replacing_and_shutdown_release_objects() {
        let mut host = QuickJsHost::start().unwrap();
        let released = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&released);
            let object = HostObject::new()
                .with_method("sync", |_| {})
                .with_release_hook(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            let runtime = host.runtime();
            host.run_blocking(move || runtime.install_global_object("__kc", object))
                .unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);

        host.shutdown();
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(matches!(host.flush(), Err(BridgeError::QueueClosed)));
    }

    #[test]
    fn test_pending_promise_jobs_are_drained() {
        let host = QuickJsHost::start().unwrap();
        host.eval::<()>("globalThis.v = 0; Promise.resolve().then(() => { v = 1; });")
            .unwrap();
        assert_eq!(host.eval::<i32>("v").unwrap(), 1);
    }

    #[test]
    fn test_dispatched_jobs_run_on_js_thread_in_order() {
        let host = QuickJsHost::start().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for value in 0..10 {
            let order = Arc::clone(&order);
            let runtime = host.runtime();
            host.dispatcher()
                .invoke_async(Box::new(move || {
                    assert!(runtime.is_js_thread());
                    order.lock().unwrap().push(value);
                }))
                .unwrap();
        }
        host.flush().unwrap();

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
