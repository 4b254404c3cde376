//! C ABI adapter for the statically linked core engine.
//!
//! The engine exposes a fixed table of entry points and calls back through
//! plain function pointers plus an opaque `void*`. The trampolines here turn
//! those calls into [`EngineCallbacks`] / [`PushCallbacks`] calls. The engine's
//! own data slot is kept null; context ownership lives in the
//! [`HandleRegistry`](crate::registry::HandleRegistry), and the only value
//! ever passed as `void*` is a [`PushToken`].

use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{
    CoreEngine, EngineCallbacks, EnginePaths, NativeBuffer, PushCallbacks, PushResult, PushToken,
    ReleaseFn,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use core_runtime::logging::ENGINE_LOG_TARGET;
use tracing::{error, info, warn};

pub type BackgroundReadyFn = unsafe extern "C" fn(data: *mut c_void);
pub type SyncSignalFn = unsafe extern "C" fn(data: *mut c_void);
pub type SyncFn = unsafe extern "C" fn(buffer: *mut c_void, len: usize, data: *mut c_void);
pub type LogFn = unsafe extern "C" fn(message: *const c_char, data: *mut c_void);
pub type PushResultFn = unsafe extern "C" fn(
    room_key: *const c_char,
    message_id: *const c_char,
    message_type: *const c_char,
    room_name: *const c_char,
    profile_name: *const c_char,
    text: *const c_char,
    data: *mut c_void,
);
pub type BackgroundTimeFn = unsafe extern "C" fn() -> f64;

pub type InitFn = unsafe extern "C" fn(
    on_background_ready: BackgroundReadyFn,
    on_sync_signal: SyncSignalFn,
    on_sync: SyncFn,
    on_log: LogFn,
    on_push_app: PushResultFn,
    get_background_time: BackgroundTimeFn,
    home_dir: *const c_char,
    tmp_dir: *const c_char,
    bundle_path: *const c_char,
    app_id: *const c_char,
);

/// Releases a buffer allocated by the engine with `malloc`.
///
/// # Safety
///
/// `ptr` must be null or a live `malloc` allocation.
pub unsafe extern "C" fn c_free(ptr: *mut c_void) {
    libc::free(ptr);
}

/// Entry points exported by the engine.
#[derive(Clone, Copy)]
pub struct EngineTable {
    pub init: InitFn,
    pub suspend: unsafe extern "C" fn(),
    pub resume: unsafe extern "C" fn(),
    pub sync_send: unsafe extern "C" fn(message: *const u8, len: usize),
    pub sync_receive: unsafe extern "C" fn(),
    pub push_init: unsafe extern "C" fn(bundle_path: *const c_char),
    pub push: unsafe extern "C" fn(
        payload: *const c_char,
        home_dir: *const c_char,
        on_push: PushResultFn,
        data: *mut c_void,
    ),
    pub get_data: unsafe extern "C" fn() -> *mut c_void,
    pub set_data: unsafe extern "C" fn(data: *mut c_void),
    /// Frees buffers handed to `on_sync`. [`c_free`] for the stock engine.
    pub release_buffer: ReleaseFn,
}

impl std::fmt::Debug for EngineTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineTable").finish_non_exhaustive()
    }
}

struct TrampolineState {
    callbacks: Option<Arc<dyn EngineCallbacks>>,
    push: Option<Arc<dyn PushCallbacks>>,
    release: ReleaseFn,
    /// Arguments of the latest init; the engine may keep the pointers.
    init_args: Vec<CString>,
}

static STATE: Lazy<RwLock<TrampolineState>> = Lazy::new(|| {
    RwLock::new(TrampolineState {
        callbacks: None,
        push: None,
        release: c_free,
        init_args: Vec::new(),
    })
});

fn engine_callbacks() -> Option<Arc<dyn EngineCallbacks>> {
    STATE.read().callbacks.clone()
}

/// Runs `f` without letting a panic unwind into engine frames.
fn shield(callback: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback, "Engine callback panicked");
    }
}

unsafe fn lossy(text: *const c_char) -> String {
    if text.is_null() {
        return String::new();
    }
    CStr::from_ptr(text).to_string_lossy().into_owned()
}

unsafe extern "C" fn on_background_ready(_data: *mut c_void) {
    shield("background_ready", || {
        if let Some(callbacks) = engine_callbacks() {
            callbacks.on_background_ready();
        }
    });
}

unsafe extern "C" fn on_sync_signal(_data: *mut c_void) {
    shield("sync_signal", || {
        if let Some(callbacks) = engine_callbacks() {
            callbacks.on_sync_signal();
        }
    });
}

unsafe extern "C" fn on_sync(buffer: *mut c_void, len: usize, _data: *mut c_void) {
    // Owned before anything else so every path releases it.
    let release = STATE.read().release;
    let buffer = NativeBuffer::from_raw_parts(buffer.cast(), len, release);
    shield("sync", move || match engine_callbacks() {
        Some(callbacks) => callbacks.on_sync(buffer),
        None => drop(buffer),
    });
}

unsafe extern "C" fn on_log(message: *const c_char, _data: *mut c_void) {
    let message = lossy(message);
    shield("log", || match engine_callbacks() {
        Some(callbacks) => callbacks.on_log(&message),
        None => info!(target: ENGINE_LOG_TARGET, "{}", message),
    });
}

unsafe fn push_result(fields: [*const c_char; 6]) -> PushResult {
    let [room_key, message_id, message_type, room_name, profile_name, text] = fields;
    PushResult {
        room_key: lossy(room_key),
        message_id: lossy(message_id),
        message_type: lossy(message_type),
        room_name: lossy(room_name),
        profile_name: lossy(profile_name),
        text: lossy(text),
    }
}

unsafe extern "C" fn on_push_app(
    room_key: *const c_char,
    message_id: *const c_char,
    message_type: *const c_char,
    room_name: *const c_char,
    profile_name: *const c_char,
    text: *const c_char,
    _data: *mut c_void,
) {
    let result = push_result([room_key, message_id, message_type, room_name, profile_name, text]);
    shield("push_app", move || {
        if let Some(callbacks) = engine_callbacks() {
            callbacks.on_push_app(result);
        }
    });
}

unsafe extern "C" fn on_push(
    room_key: *const c_char,
    message_id: *const c_char,
    message_type: *const c_char,
    room_name: *const c_char,
    profile_name: *const c_char,
    text: *const c_char,
    data: *mut c_void,
) {
    let result = push_result([room_key, message_id, message_type, room_name, profile_name, text]);
    let token = PushToken(data as usize as u64);
    shield("push", move || {
        let callbacks = STATE.read().push.clone();
        match callbacks {
            Some(callbacks) => callbacks.on_push(result, token),
            None => warn!(push = %token, "Push result before any push call; dropped"),
        }
    });
}

unsafe extern "C" fn get_background_time() -> f64 {
    panic::catch_unwind(|| {
        engine_callbacks()
            .map(|callbacks| callbacks.background_time_remaining())
            .unwrap_or(0.0)
    })
    .unwrap_or(0.0)
}

fn c_string(label: &str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| BridgeError::OperationFailed(format!("{label} contains a NUL byte")))
}

fn c_path(label: &str, path: &Path) -> Result<CString> {
    let value = path
        .to_str()
        .ok_or_else(|| BridgeError::OperationFailed(format!("{label} is not valid UTF-8")))?;
    c_string(label, value)
}

/// [`CoreEngine`] backed by the engine's C entry points.
///
/// Trampoline state is process-wide, like the engine itself; create one
/// `FfiEngine` per process.
#[derive(Debug)]
pub struct FfiEngine {
    table: EngineTable,
}

impl FfiEngine {
    /// # Safety
    ///
    /// Every entry in `table` must point at a function with the declared
    /// signature that stays callable for the rest of the process.
    pub unsafe fn from_table(table: EngineTable) -> Self {
        STATE.write().release = table.release_buffer;
        Self { table }
    }

    /// `true` while the engine's opaque data slot holds nothing.
    pub fn data_slot_is_clear(&self) -> bool {
        unsafe { (self.table.get_data)().is_null() }
    }
}

impl CoreEngine for FfiEngine {
    fn init(&self, paths: &EnginePaths, callbacks: Arc<dyn EngineCallbacks>) -> Result<()> {
        let args = vec![
            c_path("home dir", &paths.home_dir)?,
            c_path("tmp dir", &paths.tmp_dir)?,
            c_path("bundle path", &paths.bundle_path)?,
            c_string("app id", &paths.app_id)?,
        ];
        let pointers: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();

        {
            let mut state = STATE.write();
            state.callbacks = Some(callbacks);
            state.init_args = args;
        }

        unsafe {
            (self.table.set_data)(ptr::null_mut());
            (self.table.init)(
                on_background_ready,
                on_sync_signal,
                on_sync,
                on_log,
                on_push_app,
                get_background_time,
                pointers[0],
                pointers[1],
                pointers[2],
                pointers[3],
            );
        }
        Ok(())
    }

    fn suspend(&self) {
        unsafe { (self.table.suspend)() }
    }

    fn resume(&self) {
        unsafe { (self.table.resume)() }
    }

    fn sync_send(&self, message: &[u8]) {
        unsafe { (self.table.sync_send)(message.as_ptr(), message.len()) }
    }

    fn sync_receive(&self) {
        unsafe { (self.table.sync_receive)() }
    }

    fn push_init(&self, bundle_path: &Path) -> Result<()> {
        let path = c_path("push bundle path", bundle_path)?;
        unsafe { (self.table.push_init)(path.as_ptr()) };
        Ok(())
    }

    fn push(
        &self,
        payload: &str,
        home_dir: &Path,
        callbacks: Arc<dyn PushCallbacks>,
        token: PushToken,
    ) -> Result<()> {
        let payload = c_string("push payload", payload)?;
        let home_dir = c_path("home dir", home_dir)?;
        STATE.write().push = Some(callbacks);

        let data = token.as_u64() as usize as *mut c_void;
        unsafe { (self.table.push)(payload.as_ptr(), home_dir.as_ptr(), on_push, data) };
        Ok(())
    }
}
