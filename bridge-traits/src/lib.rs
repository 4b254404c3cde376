//! # Host Bridge Traits
//!
//! Seams between the bridge, the native core engine, the JavaScript runtime
//! and the mobile platform layer.
//!
//! ## Overview
//!
//! The bridge never talks to a concrete engine, JS engine or platform API
//! directly. Each collaborator is reached through a trait defined here and
//! implemented per host:
//!
//! | Collaborator | Traits | Implementations |
//! |--------------|--------|-----------------|
//! | Core engine  | [`CoreEngine`], [`EngineCallbacks`], [`PushCallbacks`] | `core_bridge::ffi::FfiEngine` |
//! | JavaScript   | [`JsRuntime`], [`JsDispatcher`] | `bridge-desktop` (QuickJS), host apps |
//! | Platform     | [`BackgroundReadyListener`], [`PushResultListener`], [`ThreadAttacher`] | `bridge-android`, `bridge-desktop` |
//! | Assets       | [`AssetStore`] | `bridge-desktop::FsAssetStore`, host apps |
//! | Logging      | [`LoggerSink`] | `bridge-android::LogcatSink`, [`ConsoleLogger`] |
//!
//! ## Threading
//!
//! Every trait requires `Send + Sync`. The engine calls back on threads it
//! owns, so objects that are only valid on the JavaScript thread are reached
//! through a [`JsDispatcher`]; [`JsRuntime`] implementations reject calls
//! made from any other thread with [`BridgeError::WrongThread`].
//!
//! ## Error Handling
//!
//! All seams report failures as [`BridgeError`]. Adapters convert their
//! platform errors into it and keep the message actionable.

pub mod assets;
pub mod engine;
pub mod error;
pub mod js;
pub mod listener;
pub mod log;

pub use error::BridgeError;

pub use assets::AssetStore;
pub use engine::{
    CoreEngine, EngineCallbacks, EnginePaths, NativeBuffer, PushCallbacks, PushResult, PushToken,
    ReleaseFn,
};
pub use js::{HostMethod, HostObject, JsArg, JsDispatcher, JsGlobalNames, JsJob, JsRuntime};
pub use listener::{BackgroundReadyListener, PushResultListener, ThreadAttacher};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
