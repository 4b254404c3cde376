//! Bounded FIFO job queue feeding the JavaScript thread.
//!
//! [`QueueDispatcher`] is the producer side handed to the bridge; it never
//! blocks, so engine threads cannot stall on a slow JS thread. The single
//! consumer, [`JsThreadQueue`], drains jobs in submission order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::{
    error::{BridgeError, Result},
    JsDispatcher, JsJob,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default queue capacity used by [`QuickJsHost`](crate::QuickJsHost).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Task {
    Run(JsJob),
    Stop,
}

/// Producer half of the JS thread queue.
pub struct QueueDispatcher {
    sender: mpsc::Sender<Task>,
    capacity: usize,
    closed: Arc<AtomicBool>,
}

/// Consumer half of the JS thread queue. Owned by the JS thread.
pub struct JsThreadQueue {
    receiver: mpsc::Receiver<Task>,
    closed: Arc<AtomicBool>,
}

impl QueueDispatcher {
    /// Creates a connected dispatcher/queue pair.
    pub fn channel(capacity: usize) -> (QueueDispatcher, JsThreadQueue) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let closed = Arc::new(AtomicBool::new(false));
        (
            QueueDispatcher {
                sender,
                capacity,
                closed: Arc::clone(&closed),
            },
            JsThreadQueue { receiver, closed },
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops the consumer. Jobs still queued are dropped without running.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // A full queue wakes the consumer anyway; it sees the flag after its
        // current job.
        if self.sender.try_send(Task::Stop).is_err() {
            debug!("JS queue full while closing; consumer stops after current job");
        }
    }
}

impl JsDispatcher for QueueDispatcher {
    fn invoke_async(&self, job: JsJob) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::QueueClosed);
        }
        self.sender.try_send(Task::Run(job)).map_err(|err| match err {
            TrySendError::Full(_) => {
                warn!(capacity = self.capacity, "JS queue full, job rejected");
                BridgeError::QueueFull {
                    capacity: self.capacity,
                }
            }
            TrySendError::Closed(_) => BridgeError::QueueClosed,
        })
    }
}

impl JsThreadQueue {
    /// Blocks until the next job arrives.
    ///
    /// Returns `None` once the dispatcher was closed or every producer was
    /// dropped. Must not be called from inside an async runtime.
    pub fn next_job(&mut self) -> Option<JsJob> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        match self.receiver.blocking_recv() {
            Some(Task::Run(job)) if !self.closed.load(Ordering::Acquire) => Some(job),
            _ => None,
        }
    }
}
