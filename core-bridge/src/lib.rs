//! # Core Bridge
//!
//! Moves data and control signals between the native core engine, the
//! JavaScript runtime and the platform layer.
//!
//! ## Components
//!
//! - [`registry::HandleRegistry`]: owns the foreground context and the
//!   transient push contexts.
//! - [`marshal::CallbackMarshaler`]: receives engine callbacks on engine
//!   threads and routes them to the owning context.
//! - [`foreground::ForegroundBridge`]: installs contexts, publishes the JS
//!   bridge object, forwards suspend/resume.
//! - [`push::PushRunner`]: standalone push processing with a once-per-process
//!   push-subsystem init.
//! - [`provision::BundleProvisioner`]: copies bundles out of the asset store.
//! - [`ffi::FfiEngine`]: the engine's C function table behind [`CoreEngine`].
//!
//! ## Example
//!
//! ```ignore
//! let registry = HandleRegistry::global();
//! let marshaler = Arc::new(CallbackMarshaler::new(
//!     Arc::clone(&registry),
//!     &engine,
//!     config.thread_attacher.clone(),
//!     config.js_globals.clone(),
//!     events.clone(),
//! ));
//! let foreground = ForegroundBridge::new(engine.clone(), marshaler.clone(), config.js_globals.clone(), events.clone());
//! foreground.init_engine(&config.engine_paths())?;
//! ```
//!
//! [`CoreEngine`]: bridge_traits::CoreEngine

pub mod ffi;
pub mod foreground;
pub mod marshal;
pub mod provision;
pub mod push;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use foreground::{ForegroundBridge, SYNC_METHOD};
pub use marshal::CallbackMarshaler;
pub use provision::{BundleProvisioner, ProvisionError};
pub use push::{PushInitGuard, PushOutcome, PushRunner};
pub use registry::{ForegroundContext, ForegroundHandles, HandleRegistry, Installation, PushContext};
