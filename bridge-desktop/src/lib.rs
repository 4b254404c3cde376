//! # Desktop Bridge Implementations
//!
//! Host adapters for desktop platforms (macOS, Windows, Linux) and for tests.
//!
//! ## Overview
//!
//! - [`QuickJsHost`]: a QuickJS runtime on a dedicated JS thread, exposing a
//!   [`JsRuntime`](bridge_traits::JsRuntime) handle and a
//!   [`JsDispatcher`](bridge_traits::JsDispatcher)
//! - [`QueueDispatcher`] / [`JsThreadQueue`]: bounded FIFO job queue onto the JS thread
//! - [`FsAssetStore`]: bundle assets served from a directory
//! - [`DesktopThreadAttacher`]: no-op, desktop threads need no attachment
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::QuickJsHost;
//!
//! let host = QuickJsHost::start()?;
//! let runtime = host.runtime();
//! let dispatcher = host.dispatcher();
//! // hand both to the bridge's install call
//! ```

mod assets;
mod attach;
mod dispatcher;
mod quickjs;

pub use assets::FsAssetStore;
pub use attach::DesktopThreadAttacher;
pub use dispatcher::{JsThreadQueue, QueueDispatcher, DEFAULT_QUEUE_CAPACITY};
pub use quickjs::{QuickJsHost, QuickJsRuntime};
