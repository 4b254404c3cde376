//! # Bridge Configuration Module
//!
//! Provides configuration management for the native bridge.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `BridgeConfig` holding the paths the engine is initialized with, the two
//! bundle assets provisioned at cold start, and the platform capabilities the
//! bridge depends on. It enforces fail-fast validation so a misconfigured host
//! is rejected before the engine is touched.
//!
//! ## Required Settings
//!
//! - home and tmp directories, application id
//! - main and push bundle assets with their writable destinations
//! - `AssetStore` - read-only bundle source
//!
//! ## Optional Settings (with defaults)
//!
//! - `ThreadAttacher` - desktop default: no-op attacher (`desktop-shims`)
//! - JS global names - `__kc`, `__kc_logListener`, `__kc_syncListener`
//! - push timeout - 25 seconds
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::BridgeConfig;
//! use std::sync::Arc;
//!
//! let config = BridgeConfig::builder()
//!     .home_dir("/data/user/0/app/files")
//!     .tmp_dir("/data/user/0/app/cache")
//!     .app_id("com.example.app")
//!     .main_bundle("main.bundle", "/data/user/0/app/files/main.bundle")
//!     .push_bundle("push.bundle", "/data/user/0/app/files/push.bundle")
//!     .asset_store(Arc::new(MyAssetStore))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AssetStore, EnginePaths, JsGlobalNames, ThreadAttacher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default time a push call may take before its context is disposed.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(25);

/// Upper bound accepted for the push timeout.
pub const MAX_PUSH_TIMEOUT: Duration = Duration::from_secs(300);

/// A read-only asset and the writable path it is copied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleAsset {
    pub asset_id: String,
    pub destination: PathBuf,
}

impl BundleAsset {
    pub fn new(asset_id: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            asset_id: asset_id.into(),
            destination: destination.into(),
        }
    }
}

/// Bridge configuration.
///
/// Use [`BridgeConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Engine home directory (persistent storage)
    pub home_dir: PathBuf,

    /// Engine scratch directory
    pub tmp_dir: PathBuf,

    /// Application identifier passed to the engine
    pub app_id: String,

    /// Main application bundle
    pub main_bundle: BundleAsset,

    /// Push-handler bundle
    pub push_bundle: BundleAsset,

    /// Source of the read-only bundle assets (required)
    pub asset_store: Arc<dyn AssetStore>,

    /// Attaches engine threads before platform listeners are called
    pub thread_attacher: Arc<dyn ThreadAttacher>,

    /// Names of the globals shared with JavaScript
    pub js_globals: JsGlobalNames,

    /// Time after which an unanswered push call is abandoned
    pub push_timeout: Duration,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("home_dir", &self.home_dir)
            .field("tmp_dir", &self.tmp_dir)
            .field("app_id", &self.app_id)
            .field("main_bundle", &self.main_bundle)
            .field("push_bundle", &self.push_bundle)
            .field("asset_store", &"AssetStore { ... }")
            .field("thread_attacher", &"ThreadAttacher { ... }")
            .field("js_globals", &self.js_globals)
            .field("push_timeout", &self.push_timeout)
            .finish()
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Arguments for the engine's init entry point.
    ///
    /// The engine boots from the provisioned main bundle.
    pub fn engine_paths(&self) -> EnginePaths {
        EnginePaths {
            home_dir: self.home_dir.clone(),
            tmp_dir: self.tmp_dir.clone(),
            bundle_path: self.main_bundle.destination.clone(),
            app_id: self.app_id.clone(),
        }
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Paths and the application id are not empty
    /// - Both bundles name an asset and a destination, and the destinations differ
    /// - JS global names are non-empty and distinct
    /// - Push timeout is within (0, 300s]
    pub fn validate(&self) -> Result<()> {
        if self.home_dir.as_os_str().is_empty() {
            return Err(Error::Config("Home directory cannot be empty".to_string()));
        }

        if self.tmp_dir.as_os_str().is_empty() {
            return Err(Error::Config("Tmp directory cannot be empty".to_string()));
        }

        if self.app_id.trim().is_empty() {
            return Err(Error::Config("Application id cannot be empty".to_string()));
        }

        for (label, bundle) in [("Main", &self.main_bundle), ("Push", &self.push_bundle)] {
            if bundle.asset_id.trim().is_empty() {
                return Err(Error::Config(format!("{label} bundle asset id cannot be empty")));
            }
            if bundle.destination.as_os_str().is_empty() {
                return Err(Error::Config(format!(
                    "{label} bundle destination cannot be empty"
                )));
            }
        }

        if self.main_bundle.destination == self.push_bundle.destination {
            return Err(Error::Config(format!(
                "Main and push bundles must not share a destination ({})",
                self.main_bundle.destination.display()
            )));
        }

        let names = &self.js_globals;
        let all = [
            &names.bridge_object,
            &names.log_listener,
            &names.sync_listener,
        ];
        if all.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::Config("JS global names cannot be empty".to_string()));
        }
        if names.bridge_object == names.log_listener
            || names.bridge_object == names.sync_listener
            || names.log_listener == names.sync_listener
        {
            return Err(Error::Config("JS global names must be distinct".to_string()));
        }

        if self.push_timeout.is_zero() {
            return Err(Error::Config(
                "Push timeout must be greater than 0".to_string(),
            ));
        }

        if self.push_timeout > MAX_PUSH_TIMEOUT {
            return Err(Error::Config(format!(
                "Push timeout exceeds maximum of {} seconds",
                MAX_PUSH_TIMEOUT.as_secs()
            )));
        }

        Ok(())
    }
}

fn asset_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AssetStore".to_string(),
        message: "AssetStore implementation is required to provision the main and push bundles. \
                 Desktop: use bridge_desktop::FsAssetStore rooted at the bundle directory. \
                 Android: use bridge_android::ApkAssetStore over the APK AssetManager."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_thread_attacher() -> Result<Arc<dyn ThreadAttacher>> {
    use bridge_desktop::DesktopThreadAttacher;

    let attacher: Arc<dyn ThreadAttacher> = Arc::new(DesktopThreadAttacher);
    Ok(attacher)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_thread_attacher() -> Result<Arc<dyn ThreadAttacher>> {
    Err(Error::CapabilityMissing {
        capability: "ThreadAttacher".to_string(),
        message: "ThreadAttacher implementation is required before platform listeners can be \
                 called from engine threads. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the no-op attacher. \
                 Android: inject bridge_android::JniThreadAttacher."
            .to_string(),
    })
}

/// Builder for constructing [`BridgeConfig`] instances.
#[derive(Default)]
pub struct BridgeConfigBuilder {
    home_dir: Option<PathBuf>,
    tmp_dir: Option<PathBuf>,
    app_id: Option<String>,
    main_bundle: Option<BundleAsset>,
    push_bundle: Option<BundleAsset>,
    asset_store: Option<Arc<dyn AssetStore>>,
    thread_attacher: Option<Arc<dyn ThreadAttacher>>,
    js_globals: Option<JsGlobalNames>,
    push_timeout: Option<Duration>,
}

impl BridgeConfigBuilder {
    /// Sets the engine home directory.
    pub fn home_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.home_dir = Some(path.into());
        self
    }

    /// Sets the engine scratch directory.
    pub fn tmp_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tmp_dir = Some(path.into());
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Sets the main bundle asset and the path it is provisioned to.
    ///
    /// The engine is initialized with `destination` as its bundle path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::BridgeConfig;
    ///
    /// let builder = BridgeConfig::builder()
    ///     .main_bundle("main.bundle", "/data/main.bundle");
    /// ```
    pub fn main_bundle(mut self, asset_id: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        self.main_bundle = Some(BundleAsset::new(asset_id, destination));
        self
    }

    /// Sets the push-handler bundle asset and the path it is provisioned to.
    pub fn push_bundle(mut self, asset_id: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        self.push_bundle = Some(BundleAsset::new(asset_id, destination));
        self
    }

    /// Sets the asset store (required).
    pub fn asset_store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.asset_store = Some(store);
        self
    }

    /// Sets the thread attacher.
    ///
    /// If not provided, the desktop no-op attacher is used when the
    /// `desktop-shims` feature is enabled.
    pub fn thread_attacher(mut self, attacher: Arc<dyn ThreadAttacher>) -> Self {
        self.thread_attacher = Some(attacher);
        self
    }

    pub fn js_globals(mut self, names: JsGlobalNames) -> Self {
        self.js_globals = Some(names);
        self
    }

    /// Sets the push timeout.
    ///
    /// Default: 25 seconds
    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = Some(timeout);
        self
    }

    /// Builds the final `BridgeConfig` instance.
    ///
    /// Returns an error if a required setting or capability is missing, or
    /// if [`BridgeConfig::validate`] rejects the values.
    pub fn build(self) -> Result<BridgeConfig> {
        let home_dir = self.home_dir.ok_or_else(|| {
            Error::Config("Home directory is required. Use .home_dir() to set it.".to_string())
        })?;

        let tmp_dir = self.tmp_dir.ok_or_else(|| {
            Error::Config("Tmp directory is required. Use .tmp_dir() to set it.".to_string())
        })?;

        let app_id = self.app_id.ok_or_else(|| {
            Error::Config("Application id is required. Use .app_id() to set it.".to_string())
        })?;

        let main_bundle = self.main_bundle.ok_or_else(|| {
            Error::Config("Main bundle is required. Use .main_bundle() to set it.".to_string())
        })?;

        let push_bundle = self.push_bundle.ok_or_else(|| {
            Error::Config("Push bundle is required. Use .push_bundle() to set it.".to_string())
        })?;

        let asset_store = self.asset_store.ok_or_else(asset_store_missing_error)?;

        let thread_attacher = match self.thread_attacher {
            Some(attacher) => attacher,
            None => provide_default_thread_attacher()?,
        };

        let config = BridgeConfig {
            home_dir,
            tmp_dir,
            app_id,
            main_bundle,
            push_bundle,
            asset_store,
            thread_attacher,
            js_globals: self.js_globals.unwrap_or_default(),
            push_timeout: self.push_timeout.unwrap_or(DEFAULT_PUSH_TIMEOUT),
        };

        config.validate()?;

        Ok(config)
    }
}
