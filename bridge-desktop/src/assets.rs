//! Directory-backed read-only asset store.

use bridge_traits::{
    error::{BridgeError, Result},
    AssetStore,
};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Serves bundle assets from a directory, mirroring an APK's `assets/` tree.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id);
        let escapes = id.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(BridgeError::AssetNotFound(format!(
                "{id} (asset ids must be relative paths inside the asset root)"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetStore for FsAssetStore {
    fn open(&self, id: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.resolve(id)?;
        match File::open(&path) {
            Ok(file) => {
                debug!(asset = id, "Opened asset");
                Ok(Box::new(file))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BridgeError::AssetNotFound(id.to_string()))
            }
            Err(e) => Err(BridgeError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_existing_asset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.bundle"), b"bundle-bytes").unwrap();
        let store = FsAssetStore::new(dir.path());

        let mut contents = Vec::new();
        store
            .open("main.bundle")
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();

        assert_eq!(contents, b"bundle-bytes");
    }

    #[test]
    fn test_open_nested_asset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("push")).unwrap();
        std::fs::write(dir.path().join("push/push.bundle"), b"p").unwrap();
        let store = FsAssetStore::new(dir.path());

        assert!(store.open("push/push.bundle").is_ok());
    }

    #[test]
    fn test_missing_asset() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        let err = store.open("missing.bundle").err().unwrap();
        assert!(matches!(err, BridgeError::AssetNotFound(id) if id == "missing.bundle"));
    }

    #[test]
    fn test_rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path().join("assets"));

        assert!(matches!(
            store.open("../secret").err().unwrap(),
            BridgeError::AssetNotFound(_)
        ));
        assert!(store.open("/etc/passwd").is_err());
        assert!(store.open("").is_err());
    }
}
