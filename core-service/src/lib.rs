//! Core service façade.
//!
//! [`BridgeService`] wires configuration, the core engine and the bridge
//! components together and adds the platform's lifecycle gating on top:
//! the engine is initialized once, suspended and resumed with UI
//! visibility, and standalone pushes only run while the UI is hidden.
//! Desktop hosts enable `desktop-shims` for the QuickJS host and
//! filesystem assets from `bridge-desktop`.

pub mod error;
pub mod lifecycle;
pub mod service;

pub use error::{CoreError, Result};
pub use lifecycle::{LifecycleGate, LifecycleState, PushSkip};
pub use service::BridgeService;

pub use core_bridge::{ForegroundHandles, PushOutcome};
pub use core_runtime::config::{BridgeConfig, BridgeConfigBuilder, BundleAsset};
pub use core_runtime::events::{BridgeEvent, EventBus, EventStream};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{FsAssetStore, QuickJsHost};
