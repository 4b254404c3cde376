//! Bundle assets packaged in the APK.

use std::ffi::CString;
use std::io::{Cursor, Read};
use std::ptr::NonNull;

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::AssetStore;
use jni::objects::{GlobalRef, JObject};
use jni::{JNIEnv, JavaVM};
use ndk::asset::AssetManager;
use tracing::debug;

use crate::jni_err;

const GET_ASSETS_SIG: &str = "()Landroid/content/res/AssetManager;";

/// [`AssetStore`] over the APK's `AAssetManager`.
///
/// The Java `AssetManager` is pinned with a [`GlobalRef`] so the native
/// handle stays valid for the store's lifetime.
pub struct ApkAssetStore {
    manager: NonNull<ndk_sys::AAssetManager>,
    _java: GlobalRef,
}

// AAssetManager may be used from any thread.
unsafe impl Send for ApkAssetStore {}
unsafe impl Sync for ApkAssetStore {}

impl ApkAssetStore {
    /// Wraps a `android.content.res.AssetManager` received over JNI.
    pub fn from_java(env: &mut JNIEnv, asset_manager: &JObject) -> Result<Self> {
        let java = env
            .new_global_ref(asset_manager)
            .map_err(|e| jni_err("new_global_ref", e))?;
        let raw = unsafe {
            ndk_sys::AAssetManager_fromJava(env.get_raw().cast(), java.as_obj().as_raw().cast())
        };
        let manager = NonNull::new(raw)
            .ok_or_else(|| BridgeError::NotAvailable("AAssetManager_fromJava returned null".into()))?;
        Ok(Self {
            manager,
            _java: java,
        })
    }

    /// Uses the assets of the context registered with `ndk-context`.
    pub fn from_android_context() -> Result<Self> {
        let ctx = ndk_context::android_context();
        if ctx.context().is_null() {
            return Err(BridgeError::NotAvailable("Android context not initialized".into()));
        }
        let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }
            .map_err(|e| jni_err("JavaVM::from_raw", e))?;
        let mut env = vm
            .attach_current_thread_permanently()
            .map_err(|e| jni_err("attach_current_thread_permanently", e))?;
        let context = unsafe { JObject::from_raw(ctx.context().cast()) };
        let assets = env
            .call_method(&context, "getAssets", GET_ASSETS_SIG, &[])
            .and_then(|value| value.l())
            .map_err(|e| jni_err("getAssets", e))?;
        Self::from_java(&mut env, &assets)
    }
}

/// Reads an opened asset to the end; `None` means the asset does not exist.
fn load<R: Read>(asset_id: &str, asset: Option<R>) -> Result<Vec<u8>> {
    let mut asset = asset.ok_or_else(|| BridgeError::AssetNotFound(asset_id.to_string()))?;
    let mut bytes = Vec::new();
    asset.read_to_end(&mut bytes)?;
    debug!(asset = asset_id, bytes = bytes.len(), "Read APK asset");
    Ok(bytes)
}

impl AssetStore for ApkAssetStore {
    fn open(&self, asset_id: &str) -> Result<Box<dyn Read + Send>> {
        let name = CString::new(asset_id)
            .map_err(|_| BridgeError::AssetNotFound(asset_id.to_string()))?;
        let manager = unsafe { AssetManager::from_ptr(self.manager) };
        let bytes = load(asset_id, manager.open(&name))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

impl std::fmt::Debug for ApkAssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApkAssetStore").finish_non_exhaustive()
    }
}
