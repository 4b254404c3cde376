//! Read-only bundle assets shipped with the application.

use std::io::Read;

use crate::error::Result;

/// Read-only asset store (APK assets on Android, a directory on desktop).
pub trait AssetStore: Send + Sync {
    /// Opens the asset named `id` for reading.
    ///
    /// Returns [`BridgeError::AssetNotFound`](crate::BridgeError::AssetNotFound)
    /// when no such asset exists.
    fn open(&self, id: &str) -> Result<Box<dyn Read + Send>>;
}
