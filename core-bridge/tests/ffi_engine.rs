//! The C function-table adapter against an in-process fake engine.
//!
//! Trampoline state is process-wide, so the whole flow runs in one test.

use std::collections::VecDeque;
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use bridge_traits::error::Result;
use bridge_traits::{
    BackgroundReadyListener, CoreEngine, EngineCallbacks, EnginePaths, HostObject, JsArg,
    JsDispatcher, JsGlobalNames, JsJob, JsRuntime, PushResult, PushResultListener,
};
use core_bridge::ffi::{
    c_free, BackgroundReadyFn, BackgroundTimeFn, EngineTable, FfiEngine, LogFn, PushResultFn,
    SyncFn, SyncSignalFn,
};
use core_bridge::{
    CallbackMarshaler, ForegroundHandles, HandleRegistry, PushInitGuard, PushRunner,
};
use core_runtime::events::EventBus;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Fake engine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct RegisteredCallbacks {
    background_ready: BackgroundReadyFn,
    sync_signal: SyncSignalFn,
    sync: SyncFn,
    log: LogFn,
    push_app: PushResultFn,
    background_time: BackgroundTimeFn,
}

#[derive(Default)]
struct FakeEngine {
    callbacks: Option<RegisteredCallbacks>,
    init_args: Vec<String>,
    data: usize,
    sent: Vec<Vec<u8>>,
    receives: usize,
    suspends: usize,
    resumes: usize,
    push_inits: Vec<String>,
    pending_push: Option<(String, PushResultFn, usize)>,
}

static FAKE: Lazy<Mutex<FakeEngine>> = Lazy::new(|| Mutex::new(FakeEngine::default()));
static RELEASED: AtomicUsize = AtomicUsize::new(0);

unsafe fn owned(text: *const c_char) -> String {
    CStr::from_ptr(text).to_string_lossy().into_owned()
}

unsafe extern "C" fn fake_init(
    background_ready: BackgroundReadyFn,
    sync_signal: SyncSignalFn,
    sync: SyncFn,
    log: LogFn,
    push_app: PushResultFn,
    background_time: BackgroundTimeFn,
    home_dir: *const c_char,
    tmp_dir: *const c_char,
    bundle_path: *const c_char,
    app_id: *const c_char,
) {
    let mut fake = FAKE.lock();
    fake.callbacks = Some(RegisteredCallbacks {
        background_ready,
        sync_signal,
        sync,
        log,
        push_app,
        background_time,
    });
    fake.init_args = vec![owned(home_dir), owned(tmp_dir), owned(bundle_path), owned(app_id)];
}

unsafe extern "C" fn fake_suspend() {
    FAKE.lock().suspends += 1;
}

unsafe extern "C" fn fake_resume() {
    FAKE.lock().resumes += 1;
}

unsafe extern "C" fn fake_sync_send(message: *const u8, len: usize) {
    let bytes = std::slice::from_raw_parts(message, len).to_vec();
    FAKE.lock().sent.push(bytes);
}

unsafe extern "C" fn fake_sync_receive() {
    FAKE.lock().receives += 1;
}

unsafe extern "C" fn fake_push_init(bundle_path: *const c_char) {
    FAKE.lock().push_inits.push(owned(bundle_path));
}

unsafe extern "C" fn fake_push(
    payload: *const c_char,
    _home_dir: *const c_char,
    on_push: PushResultFn,
    data: *mut c_void,
) {
    FAKE.lock().pending_push = Some((owned(payload), on_push, data as usize));
}

unsafe extern "C" fn fake_get_data() -> *mut c_void {
    FAKE.lock().data as *mut c_void
}

unsafe extern "C" fn fake_set_data(data: *mut c_void) {
    FAKE.lock().data = data as usize;
}

unsafe extern "C" fn counting_release(ptr: *mut c_void) {
    RELEASED.fetch_add(1, Ordering::SeqCst);
    c_free(ptr);
}

fn table() -> EngineTable {
    EngineTable {
        init: fake_init,
        suspend: fake_suspend,
        resume: fake_resume,
        sync_send: fake_sync_send,
        sync_receive: fake_sync_receive,
        push_init: fake_push_init,
        push: fake_push,
        get_data: fake_get_data,
        set_data: fake_set_data,
        release_buffer: counting_release,
    }
}

fn registered() -> RegisteredCallbacks {
    FAKE.lock().callbacks.expect("engine initialized")
}

/// Hands `bytes` to `on_sync` in a malloc'd buffer, from an engine thread.
fn fire_sync(bytes: &'static [u8]) {
    let callbacks = registered();
    thread::spawn(move || unsafe {
        let buffer = libc::malloc(bytes.len().max(1));
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.cast::<u8>(), bytes.len());
        (callbacks.sync)(buffer, bytes.len(), std::ptr::null_mut());
    })
    .join()
    .unwrap();
}

fn fire_log(line: &'static str) {
    let callbacks = registered();
    thread::spawn(move || unsafe {
        let line = CString::new(line).unwrap();
        (callbacks.log)(line.as_ptr(), std::ptr::null_mut());
    })
    .join()
    .unwrap();
}

// ---------------------------------------------------------------------------
// Host-side fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Runtime {
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl JsRuntime for Runtime {
    fn call_global_function(&self, name: &str, arg: JsArg<'_>) -> Result<bool> {
        let bytes = match arg {
            JsArg::Utf8(text) => text.as_bytes().to_vec(),
            JsArg::Bytes(bytes) => bytes.to_vec(),
        };
        self.calls.lock().push((name.to_string(), bytes));
        Ok(true)
    }

    fn install_global_object(&self, _name: &str, _object: HostObject) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Dispatcher {
    jobs: Mutex<VecDeque<JsJob>>,
}

impl Dispatcher {
    fn run_all(&self) {
        loop {
            let job = self.jobs.lock().pop_front();
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }
}

impl JsDispatcher for Dispatcher {
    fn invoke_async(&self, job: JsJob) -> Result<()> {
        self.jobs.lock().push_back(job);
        Ok(())
    }
}

#[derive(Default)]
struct Listeners {
    background: AtomicUsize,
    results: Mutex<Vec<PushResult>>,
}

impl BackgroundReadyListener for Listeners {
    fn on_background_ready(&self) {
        self.background.fetch_add(1, Ordering::SeqCst);
    }
}

impl PushResultListener for Listeners {
    fn on_result(&self, result: &PushResult) {
        self.results.lock().push(result.clone());
    }
}

#[test]
fn test_engine_table_round_trip() {
    let engine: Arc<dyn CoreEngine> = Arc::new(unsafe { FfiEngine::from_table(table()) });
    let registry = Arc::new(HandleRegistry::new());
    let events = EventBus::default();
    let marshaler = Arc::new(CallbackMarshaler::new(
        Arc::clone(&registry),
        &engine,
        Arc::new(bridge_desktop::DesktopThreadAttacher),
        JsGlobalNames::default(),
        events.clone(),
    ));

    // A stale pointer in the data slot is cleared on init.
    FAKE.lock().data = 0xdead;
    let callbacks: Arc<dyn EngineCallbacks> = marshaler.clone();
    engine
        .init(
            &EnginePaths {
                home_dir: PathBuf::from("/data/home"),
                tmp_dir: PathBuf::from("/data/tmp"),
                bundle_path: PathBuf::from("/data/main.bundle"),
                app_id: "app.test".to_string(),
            },
            callbacks,
        )
        .unwrap();
    assert_eq!(
        FAKE.lock().init_args,
        vec!["/data/home", "/data/tmp", "/data/main.bundle", "app.test"]
    );
    assert_eq!(FAKE.lock().data, 0);

    // Outbound entry points.
    engine.sync_send(b"abc");
    engine.suspend();
    engine.resume();
    {
        let fake = FAKE.lock();
        assert_eq!(fake.sent, vec![b"abc".to_vec()]);
        assert_eq!((fake.suspends, fake.resumes), (1, 1));
    }

    // No context yet: log falls back, buffers are still released.
    fire_log("before install");
    fire_sync(b"dropped");
    assert_eq!(RELEASED.load(Ordering::SeqCst), 1);

    let runtime = Arc::new(Runtime::default());
    let dispatcher = Arc::new(Dispatcher::default());
    let listeners = Arc::new(Listeners::default());
    registry.install(
        ForegroundHandles::new(runtime.clone())
            .with_dispatcher(dispatcher.clone())
            .with_background_ready(listeners.clone())
            .with_push_result(listeners.clone()),
    );

    fire_log("hello");
    fire_sync(b"\x01\x02");
    let sync_signal = registered().sync_signal;
    thread::spawn(move || unsafe { sync_signal(std::ptr::null_mut()) })
        .join()
        .unwrap();
    assert!(runtime.calls.lock().is_empty());
    dispatcher.run_all();

    assert_eq!(
        *runtime.calls.lock(),
        vec![
            ("__kc_logListener".to_string(), b"hello".to_vec()),
            ("__kc_syncListener".to_string(), vec![1, 2]),
        ]
    );
    assert_eq!(RELEASED.load(Ordering::SeqCst), 2);
    assert_eq!(FAKE.lock().receives, 1);

    let callbacks = registered();
    unsafe {
        (callbacks.background_ready)(std::ptr::null_mut());
        assert_eq!((callbacks.background_time)(), 0.0);
    }
    assert_eq!(listeners.background.load(Ordering::SeqCst), 1);

    let fields: Vec<CString> = ["key", "id-1", "text", "Room", "Alice", "hi"]
        .iter()
        .map(|field| CString::new(*field).unwrap())
        .collect();
    unsafe {
        (callbacks.push_app)(
            fields[0].as_ptr(),
            fields[1].as_ptr(),
            fields[2].as_ptr(),
            fields[3].as_ptr(),
            fields[4].as_ptr(),
            fields[5].as_ptr(),
            std::ptr::null_mut(),
        );
    }
    assert_eq!(listeners.results.lock()[0].message_id, "id-1");

    // Standalone push: the token travels as the opaque data pointer.
    let runner = PushRunner::new(
        Arc::clone(&engine),
        marshaler,
        Arc::new(PushInitGuard::new()),
        events,
    );
    // A path the engine cannot take leaves init pending for the next push.
    assert!(runner
        .ensure_push_subsystem_initialized(Path::new("/data/push\0.bundle"))
        .is_err());
    assert!(FAKE.lock().push_inits.is_empty());

    let push_listener = Arc::new(Listeners::default());
    let token = runner
        .run_push(
            "{\"payload\":1}",
            Path::new("/data/home"),
            Path::new("/data/push.bundle"),
            push_listener.clone(),
        )
        .unwrap();
    let (payload, on_push, data) = FAKE.lock().pending_push.take().unwrap();
    assert_eq!(payload, "{\"payload\":1}");
    assert_eq!(data as u64, token.as_u64());
    assert_eq!(FAKE.lock().push_inits, vec!["/data/push.bundle"]);

    thread::spawn(move || unsafe {
        let fields: Vec<CString> = ["k", "id-2", "text", "R", "P", "body"]
            .iter()
            .map(|field| CString::new(*field).unwrap())
            .collect();
        on_push(
            fields[0].as_ptr(),
            fields[1].as_ptr(),
            fields[2].as_ptr(),
            fields[3].as_ptr(),
            fields[4].as_ptr(),
            fields[5].as_ptr(),
            data as *mut c_void,
        );
    })
    .join()
    .unwrap();

    assert_eq!(push_listener.results.lock()[0].text, "body");
    assert_eq!(registry.pending_pushes(), 0);
    assert!(unsafe { FfiEngine::from_table(table()) }.data_slot_is_clear());
}
