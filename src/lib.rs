//! Workspace umbrella crate.
//!
//! This crate exists to expose feature flags that map onto the individual
//! workspace crates. Host applications can depend on `native-bridge` and
//! enable `desktop-shims` (QuickJS host, filesystem assets) or `android`
//! (JNI listeners and thread attachment) without wiring each crate.

#[cfg(any(feature = "desktop-shims", feature = "android"))]
pub use core_service::*;

#[cfg(feature = "android")]
pub use bridge_android;
