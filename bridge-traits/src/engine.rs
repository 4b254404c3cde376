//! Core Engine Seam
//!
//! The native core engine is an opaque component reached through a C
//! function table. This module describes it as a trait so the bridge can be
//! driven by the real engine (see `core_bridge::ffi`) or by test doubles.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Six-field result of a processed push payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub room_key: String,
    pub message_id: String,
    pub message_type: String,
    pub room_name: String,
    pub profile_name: String,
    pub text: String,
}

/// Opaque token identifying one in-flight push call.
///
/// The engine receives the token as its per-call data value and hands it back
/// with the result. It never points at Rust memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PushToken(pub u64);

impl PushToken {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PushToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "push#{}", self.0)
    }
}

/// Release routine for buffers allocated by the engine.
pub type ReleaseFn = unsafe extern "C" fn(*mut c_void);

enum Storage {
    Owned(Vec<u8>),
    Foreign {
        ptr: NonNull<u8>,
        len: usize,
        release: ReleaseFn,
    },
}

/// Exclusively owned byte buffer handed over by the engine.
///
/// The backing memory is released exactly once, when the buffer is dropped.
pub struct NativeBuffer {
    storage: Storage,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

// SAFETY: a foreign buffer is owned exclusively by this value once the engine
// hands it over, and the engine's release routine may run on any thread.
unsafe impl Send for NativeBuffer {}

impl NativeBuffer {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            storage: Storage::Owned(bytes),
            on_release: None,
        }
    }

    /// Takes ownership of an engine-allocated buffer.
    ///
    /// A null `ptr` yields an empty buffer and `release` is never called.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes until `release(ptr)` runs,
    /// and nothing else may release it.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize, release: ReleaseFn) -> Self {
        let storage = match NonNull::new(ptr) {
            Some(ptr) => Storage::Foreign { ptr, len, release },
            None => Storage::Owned(Vec::new()),
        };
        Self {
            storage,
            on_release: None,
        }
    }

    /// Registers a hook that runs right after the memory is released.
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(bytes) => bytes,
            // SAFETY: guaranteed by the `from_raw_parts` contract.
            Storage::Foreign { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self.storage, Storage::Foreign { .. })
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        if let Storage::Foreign { ptr, release, .. } =
            std::mem::replace(&mut self.storage, Storage::Owned(Vec::new()))
        {
            // SAFETY: the storage was swapped out above, so this runs once.
            unsafe { release(ptr.as_ptr().cast::<c_void>()) };
        }
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("len", &self.len())
            .field("foreign", &self.is_foreign())
            .finish()
    }
}

/// Arguments of the engine's init entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    pub home_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub bundle_path: PathBuf,
    pub app_id: String,
}

/// Entry points of the core engine.
///
/// Every method may be called from any thread. `sync_send` is invoked from
/// the JavaScript thread and must not block on another thread.
pub trait CoreEngine: Send + Sync {
    fn init(&self, paths: &EnginePaths, callbacks: Arc<dyn EngineCallbacks>) -> Result<()>;

    fn suspend(&self);

    fn resume(&self);

    fn sync_send(&self, message: &[u8]);

    fn sync_receive(&self);

    /// Push-subsystem init. An `Err` means init did not run.
    fn push_init(&self, bundle_path: &Path) -> Result<()>;

    fn push(
        &self,
        payload: &str,
        home_dir: &Path,
        callbacks: Arc<dyn PushCallbacks>,
        token: PushToken,
    ) -> Result<()>;
}

/// Callbacks the engine issues for the foreground context.
///
/// The engine calls these on threads it owns; implementations decide whether
/// to drop, run inline, or re-dispatch onto the JavaScript thread.
pub trait EngineCallbacks: Send + Sync {
    fn on_log(&self, message: &str);

    fn on_sync_signal(&self);

    fn on_sync(&self, buffer: NativeBuffer);

    fn on_background_ready(&self);

    fn on_push_app(&self, result: PushResult);

    /// Seconds of background execution left. `0.0` means unknown.
    fn background_time_remaining(&self) -> f64 {
        0.0
    }
}

/// Completion callback of a standalone push call.
pub trait PushCallbacks: Send + Sync {
    fn on_push(&self, result: PushResult, token: PushToken);
}
