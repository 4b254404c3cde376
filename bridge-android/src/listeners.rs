//! Platform listener objects held across threads.
//!
//! Each listener pins its Java object with a [`GlobalRef`], which is released
//! when the listener is dropped. Calls attach the current thread first; the
//! callback marshaler has already done so, but listeners may also be driven
//! directly.

use std::sync::Arc;

use bridge_traits::error::Result;
use bridge_traits::{BackgroundReadyListener, PushResult, PushResultListener};
use jni::objects::{GlobalRef, JObject, JValue};
use jni::{JNIEnv, JavaVM};
use tracing::warn;

use crate::jni_err;

const BACKGROUND_READY_SIG: &str = "()V";
const PUSH_RESULT_SIG: &str = "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;\
Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V";

/// Local references created per call; freed when the frame pops.
const LOCAL_FRAME_CAPACITY: i32 = 16;

fn pin(env: &mut JNIEnv, target: &JObject) -> Result<(Arc<JavaVM>, GlobalRef)> {
    let vm = env.get_java_vm().map_err(|e| jni_err("get_java_vm", e))?;
    let target = env
        .new_global_ref(target)
        .map_err(|e| jni_err("new_global_ref", e))?;
    Ok((Arc::new(vm), target))
}

/// Clears a pending Java exception so later JNI calls on this thread work.
fn clear_exception(env: &mut JNIEnv, method: &str) {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
        warn!(method, "Java listener threw");
    }
}

pub struct JniBackgroundReadyListener {
    vm: Arc<JavaVM>,
    target: GlobalRef,
}

impl JniBackgroundReadyListener {
    pub fn new(env: &mut JNIEnv, target: &JObject) -> Result<Self> {
        let (vm, target) = pin(env, target)?;
        Ok(Self { vm, target })
    }

    fn call(&self) -> Result<()> {
        let mut env = self
            .vm
            .attach_current_thread_permanently()
            .map_err(|e| jni_err("attach_current_thread_permanently", e))?;
        let outcome = env.call_method(
            self.target.as_obj(),
            "onBackgroundReady",
            BACKGROUND_READY_SIG,
            &[],
        );
        if outcome.is_err() {
            clear_exception(&mut env, "onBackgroundReady");
        }
        outcome.map(|_| ()).map_err(|e| jni_err("onBackgroundReady", e))
    }
}

impl BackgroundReadyListener for JniBackgroundReadyListener {
    fn on_background_ready(&self) {
        if let Err(e) = self.call() {
            warn!(error = %e, "Background-ready listener failed");
        }
    }
}

pub struct JniPushResultListener {
    vm: Arc<JavaVM>,
    target: GlobalRef,
}

impl JniPushResultListener {
    pub fn new(env: &mut JNIEnv, target: &JObject) -> Result<Self> {
        let (vm, target) = pin(env, target)?;
        Ok(Self { vm, target })
    }

    fn call(&self, result: &PushResult) -> Result<()> {
        let mut env = self
            .vm
            .attach_current_thread_permanently()
            .map_err(|e| jni_err("attach_current_thread_permanently", e))?;
        let target = self.target.as_obj();

        let outcome = env.with_local_frame(LOCAL_FRAME_CAPACITY, |env| -> jni::errors::Result<()> {
            let fields = [
                env.new_string(&result.room_key)?,
                env.new_string(&result.message_id)?,
                env.new_string(&result.message_type)?,
                env.new_string(&result.room_name)?,
                env.new_string(&result.profile_name)?,
                env.new_string(&result.text)?,
            ];
            let args: Vec<JValue> = fields
                .iter()
                .map(|field| JValue::Object(field.as_ref()))
                .collect();
            env.call_method(target, "onResult", PUSH_RESULT_SIG, &args)?;
            Ok(())
        });
        if outcome.is_err() {
            clear_exception(&mut env, "onResult");
        }
        outcome.map_err(|e| jni_err("onResult", e))
    }
}

impl PushResultListener for JniPushResultListener {
    fn on_result(&self, result: &PushResult) {
        if let Err(e) = self.call(result) {
            warn!(error = %e, message_id = %result.message_id, "Push result listener failed");
        }
    }
}
