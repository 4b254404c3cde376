//! Bundle Provisioner
//!
//! Copies the main and push bundles out of the read-only asset store into
//! writable storage at cold start. Destinations are overwritten every time.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bridge_traits::{AssetStore, BridgeError};
use core_runtime::config::BundleAsset;
use core_runtime::events::{BridgeEvent, BundleEvent, EventBus};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Cannot open bundle asset {asset_id}: {source}")]
    Asset {
        asset_id: String,
        #[source]
        source: BridgeError,
    },

    #[error("Cannot read bundle asset {asset_id}: {source}")]
    Read {
        asset_id: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write bundle to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    /// The failure is an I/O error on either side of the copy.
    pub fn is_io(&self) -> bool {
        match self {
            ProvisionError::Asset { source, .. } => matches!(source, BridgeError::Io(_)),
            ProvisionError::Read { .. } | ProvisionError::Write { .. } => true,
        }
    }
}

pub struct BundleProvisioner {
    store: Arc<dyn AssetStore>,
    events: EventBus,
}

impl BundleProvisioner {
    pub fn new(store: Arc<dyn AssetStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Copies asset `asset_id` to `destination` and returns the byte count.
    ///
    /// The asset is read completely before the destination is opened, so a
    /// failed read leaves an existing destination file as it was.
    pub fn copy_bundle(&self, asset_id: &str, destination: &Path) -> Result<u64, ProvisionError> {
        let mut reader = self
            .store
            .open(asset_id)
            .map_err(|source| ProvisionError::Asset {
                asset_id: asset_id.to_string(),
                source,
            })?;

        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|source| ProvisionError::Read {
                asset_id: asset_id.to_string(),
                source,
            })?;
        drop(reader);

        let write_error = |source: io::Error| ProvisionError::Write {
            path: destination.to_path_buf(),
            source,
        };
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(destination, &contents).map_err(write_error)?;

        Ok(contents.len() as u64)
    }

    /// Provisions the main bundle, then the push bundle. Stops at the first failure.
    pub fn provision(&self, main: &BundleAsset, push: &BundleAsset) -> Result<(), ProvisionError> {
        for bundle in [main, push] {
            self.provision_one(bundle)?;
        }
        Ok(())
    }

    fn provision_one(&self, bundle: &BundleAsset) -> Result<u64, ProvisionError> {
        let started = Instant::now();
        match self.copy_bundle(&bundle.asset_id, &bundle.destination) {
            Ok(bytes) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    asset = %bundle.asset_id,
                    destination = %bundle.destination.display(),
                    bytes,
                    duration_ms,
                    "Bundle provisioned"
                );
                let _ = self.events.emit(BridgeEvent::Bundle(BundleEvent::Provisioned {
                    asset_id: bundle.asset_id.clone(),
                    bytes,
                    duration_ms,
                }));
                Ok(bytes)
            }
            Err(e) => {
                error!(asset = %bundle.asset_id, error = %e, "Bundle provisioning failed");
                let _ = self.events.emit(BridgeEvent::Bundle(BundleEvent::Failed {
                    asset_id: bundle.asset_id.clone(),
                    message: e.to_string(),
                }));
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for BundleProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleProvisioner").finish_non_exhaustive()
    }
}
