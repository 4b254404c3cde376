//! JavaScript Runtime Seams
//!
//! The JavaScript runtime and its global object are single-threaded. Anything
//! that touches them goes through a [`JsDispatcher`] and runs on the JS thread.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Argument passed to a global JavaScript function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsArg<'a> {
    /// Passed as a JS string.
    Utf8(&'a str),
    /// Passed as a fresh `Uint8Array` of exactly this length.
    Bytes(&'a [u8]),
}

/// Names of the globals shared between the bridge and JavaScript code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsGlobalNames {
    /// Object published by the bridge; carries the `sync` method.
    pub bridge_object: String,
    /// Listener JavaScript assigns to receive engine log lines.
    pub log_listener: String,
    /// Listener JavaScript assigns to receive inbound sync messages.
    pub sync_listener: String,
}

impl Default for JsGlobalNames {
    fn default() -> Self {
        Self {
            bridge_object: "__kc".to_string(),
            log_listener: "__kc_logListener".to_string(),
            sync_listener: "__kc_syncListener".to_string(),
        }
    }
}

pub type HostMethod = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Native object published on the runtime's global object.
///
/// Each method takes one binary argument and returns nothing. The release
/// hook runs when the runtime lets go of the object, either because it was
/// replaced or because the runtime shut down.
#[derive(Default)]
pub struct HostObject {
    methods: Vec<(String, HostMethod)>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl HostObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&[u8]) + Send + Sync + 'static,
    ) -> Self {
        self.methods.push((name.into(), Arc::new(method)));
        self
    }

    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn methods(&self) -> &[(String, HostMethod)] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&HostMethod> {
        self.methods
            .iter()
            .find(|(method_name, _)| method_name == name)
            .map(|(_, method)| method)
    }
}

impl Drop for HostObject {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.methods.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("HostObject")
            .field("methods", &names)
            .field("has_release_hook", &self.on_release.is_some())
            .finish()
    }
}

/// Handle to a JavaScript execution environment.
///
/// The handle itself may be shared across threads, but both operations must
/// be called on the JS thread. Implementations return
/// [`BridgeError::WrongThread`](crate::BridgeError::WrongThread) otherwise.
pub trait JsRuntime: Send + Sync {
    /// Calls `globalThis[name](arg)`.
    ///
    /// Returns `Ok(false)` when the global is missing or not a function.
    fn call_global_function(&self, name: &str, arg: JsArg<'_>) -> Result<bool>;

    /// Publishes `object` as `globalThis[name]`, replacing any earlier object.
    fn install_global_object(&self, name: &str, object: HostObject) -> Result<()>;
}

pub type JsJob = Box<dyn FnOnce() + Send + 'static>;

/// Schedules work onto the JavaScript thread.
///
/// Jobs run in FIFO order and never inline on the calling thread.
pub trait JsDispatcher: Send + Sync {
    fn invoke_async(&self, job: JsJob) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_global_names() {
        let names = JsGlobalNames::default();
        assert_eq!(names.bridge_object, "__kc");
        assert_eq!(names.log_listener, "__kc_logListener");
        assert_eq!(names.sync_listener, "__kc_syncListener");
    }

    #[test]
    fn test_host_object_methods() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let object = HostObject::new().with_method("sync", move |bytes| {
            counter.fetch_add(bytes.len(), Ordering::SeqCst);
        });

        let method = object.method("sync").unwrap();
        method(&[1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(object.method("missing").is_none());
        assert_eq!(object.methods().len(), 1);
    }

    #[test]
    fn test_host_object_release_hook_runs_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let object = HostObject::new().with_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(format!("{object:?}").contains("has_release_hook: true"));
        drop(object);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
