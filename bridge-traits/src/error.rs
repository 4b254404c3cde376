use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Called off the JavaScript thread: {0}")]
    WrongThread(String),

    #[error("Dispatcher queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Dispatcher queue is closed")]
    QueueClosed,

    #[error("Script error: {0}")]
    Script(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
