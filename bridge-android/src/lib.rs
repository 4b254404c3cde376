//! Android Bridge Implementations
//!
//! JNI-backed implementations of the platform seams in `bridge-traits`:
//!
//! - [`JniThreadAttacher`]: attaches engine threads to the Java VM
//! - [`JniBackgroundReadyListener`]: calls `onBackgroundReady()` on a Java object
//! - [`JniPushResultListener`]: calls `onResult(String x6)` on a Java object
//! - [`LogcatSink`]: forwards log entries to logcat
//! - [`ApkAssetStore`]: reads the bundles packaged in the APK
//!
//! # Platform Support
//!
//! Compiled only for `target_os = "android"`; on other targets the crate is
//! empty.
//!
//! # Examples
//!
//! ```ignore
//! #[no_mangle]
//! pub extern "system" fn Java_io_example_Bridge_receivePush(
//!     mut env: JNIEnv,
//!     _class: JClass,
//!     payload: JString,
//!     handler: JObject,
//! ) {
//!     let listener = JniPushResultListener::new(&mut env, &handler)?;
//!     service.maybe_run_push(&payload, Arc::new(listener))?;
//! }
//! ```

#![cfg(target_os = "android")]

pub mod assets;
pub mod attach;
pub mod listeners;
pub mod logcat;

pub use assets::ApkAssetStore;
pub use attach::JniThreadAttacher;
pub use listeners::{JniBackgroundReadyListener, JniPushResultListener};
pub use logcat::LogcatSink;

use bridge_traits::BridgeError;

/// Maps a JNI failure into [`BridgeError::OperationFailed`].
pub(crate) fn jni_err(context: &str, e: jni::errors::Error) -> BridgeError {
    BridgeError::OperationFailed(format!("{context}: {e}"))
}
