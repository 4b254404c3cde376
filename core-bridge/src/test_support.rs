//! Recording fakes shared by the unit tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{
    BackgroundReadyListener, CoreEngine, EngineCallbacks, EnginePaths, HostObject, JsArg,
    JsDispatcher, JsJob, JsRuntime, LogEntry, LogLevel, LoggerSink, PushCallbacks, PushResult,
    PushResultListener, PushToken, ThreadAttacher,
};
use core_runtime::logging::{LoggerSinkLayer, ENGINE_LOG_TARGET};
use mockall::mock;
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;

mock! {
    pub Engine {}

    impl CoreEngine for Engine {
        fn init(&self, paths: &EnginePaths, callbacks: Arc<dyn EngineCallbacks>) -> Result<()>;
        fn suspend(&self);
        fn resume(&self);
        fn sync_send(&self, message: &[u8]);
        fn sync_receive(&self);
        fn push_init(&self, bundle_path: &Path) -> Result<()>;
        fn push(
            &self,
            payload: &str,
            home_dir: &Path,
            callbacks: Arc<dyn PushCallbacks>,
            token: PushToken,
        ) -> Result<()>;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedArg {
    Utf8(String),
    Bytes(Vec<u8>),
}

/// Runtime that records global calls and published objects.
#[derive(Default)]
pub struct RecordingRuntime {
    pub listeners: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<(String, RecordedArg)>>,
    pub objects: Mutex<Vec<(String, HostObject)>>,
    pub fail_install: bool,
}

impl RecordingRuntime {
    pub fn with_listeners(names: &[&str]) -> Self {
        Self {
            listeners: Mutex::new(names.iter().map(|name| name.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, RecordedArg)> {
        self.calls.lock().clone()
    }

    /// Invokes a method of the most recently published object.
    pub fn call_host(&self, object: &str, method: &str, bytes: &[u8]) -> bool {
        let objects = self.objects.lock();
        let Some((_, host)) = objects.iter().rev().find(|(name, _)| name == object) else {
            return false;
        };
        match host.method(method) {
            Some(method) => {
                method(bytes);
                true
            }
            None => false,
        }
    }

    /// Drops every published object, as a runtime teardown would.
    pub fn teardown(&self) {
        let objects = std::mem::take(&mut *self.objects.lock());
        drop(objects);
    }
}

impl JsRuntime for RecordingRuntime {
    fn call_global_function(&self, name: &str, arg: JsArg<'_>) -> Result<bool> {
        if !self.listeners.lock().iter().any(|listener| listener == name) {
            return Ok(false);
        }
        let recorded = match arg {
            JsArg::Utf8(text) => RecordedArg::Utf8(text.to_string()),
            JsArg::Bytes(bytes) => RecordedArg::Bytes(bytes.to_vec()),
        };
        self.calls.lock().push((name.to_string(), recorded));
        Ok(true)
    }

    fn install_global_object(&self, name: &str, object: HostObject) -> Result<()> {
        if self.fail_install {
            return Err(BridgeError::Script("install rejected".to_string()));
        }
        let replaced = {
            let mut objects = self.objects.lock();
            let previous = objects
                .iter()
                .position(|(existing, _)| existing == name)
                .map(|index| objects.remove(index));
            objects.push((name.to_string(), object));
            previous
        };
        drop(replaced);
        Ok(())
    }
}

/// Dispatcher that queues jobs until the test drains them.
#[derive(Default)]
pub struct ManualDispatcher {
    jobs: Mutex<VecDeque<JsJob>>,
    pub closed: bool,
}

impl ManualDispatcher {
    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.jobs.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl JsDispatcher for ManualDispatcher {
    fn invoke_async(&self, job: JsJob) -> Result<()> {
        if self.closed {
            return Err(BridgeError::QueueClosed);
        }
        self.jobs.lock().push_back(job);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingAttacher {
    pub attached: AtomicUsize,
    pub fail: bool,
    /// Held before answering.
    pub delay: Duration,
}

impl ThreadAttacher for CountingAttacher {
    fn ensure_current_thread_attached(&self) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(BridgeError::NotAvailable("no vm".to_string()));
        }
        self.attached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingBackgroundListener {
    pub calls: AtomicUsize,
}

impl BackgroundReadyListener for CountingBackgroundListener {
    fn on_background_ready(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingPushListener {
    pub results: Mutex<Vec<PushResult>>,
    pub no_result: AtomicUsize,
}

impl RecordingPushListener {
    pub fn results(&self) -> Vec<PushResult> {
        self.results.lock().clone()
    }
}

impl PushResultListener for RecordingPushListener {
    fn on_result(&self, result: &PushResult) {
        self.results.lock().push(result.clone());
    }

    fn on_no_result(&self) {
        self.no_result.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn push_result(message_id: &str) -> PushResult {
    PushResult {
        room_key: "room-key".to_string(),
        message_id: message_id.to_string(),
        message_type: "text".to_string(),
        room_name: "Room".to_string(),
        profile_name: "Alice".to_string(),
        text: format!("hello {message_id}"),
    }
}

/// Host sink that keeps every entry.
#[derive(Default)]
pub struct RecordingSink {
    pub entries: Mutex<Vec<LogEntry>>,
}

impl RecordingSink {
    /// Messages written under the engine log target.
    pub fn engine_lines(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.target == ENGINE_LOG_TARGET)
            .map(|entry| entry.message.clone())
            .collect()
    }
}

impl LoggerSink for RecordingSink {
    fn log(&self, entry: LogEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Trace
    }
}

/// Runs `f` under a subscriber that records into a fresh [`RecordingSink`].
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let layer = LoggerSinkLayer::new(Some(sink.clone() as Arc<dyn LoggerSink>), false);
    let subscriber = tracing_subscriber::registry().with(layer);
    let output = tracing::subscriber::with_default(subscriber, f);
    (output, sink)
}
