//! # Core Runtime Module
//!
//! Ambient infrastructure shared by the bridge crates:
//! - Configuration management (`BridgeConfig` builder)
//! - Logging and tracing infrastructure
//! - Bridge event bus
//!
//! ## Overview
//!
//! Nothing in this crate knows about the engine or JavaScript. It establishes
//! the logging conventions, configuration validation and event broadcasting
//! used by `core-bridge` and `core-service`.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
