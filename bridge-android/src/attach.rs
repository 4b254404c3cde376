//! Thread attachment for engine-owned threads.

use std::sync::Arc;

use bridge_traits::{error::Result, ThreadAttacher};
use jni::JavaVM;

use crate::jni_err;

/// Attaches the calling thread to the Java VM for the rest of its life.
///
/// Engine threads are long-lived and call back repeatedly, so attachment is
/// permanent rather than scoped to one call.
#[derive(Clone)]
pub struct JniThreadAttacher {
    vm: Arc<JavaVM>,
}

impl JniThreadAttacher {
    pub fn new(vm: Arc<JavaVM>) -> Self {
        Self { vm }
    }

    pub fn vm(&self) -> &Arc<JavaVM> {
        &self.vm
    }
}

impl ThreadAttacher for JniThreadAttacher {
    fn ensure_current_thread_attached(&self) -> Result<()> {
        self.vm
            .attach_current_thread_permanently()
            .map(|_| ())
            .map_err(|e| jni_err("attach_current_thread_permanently", e))
    }
}

impl std::fmt::Debug for JniThreadAttacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JniThreadAttacher").finish_non_exhaustive()
    }
}
