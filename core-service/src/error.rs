use bridge_traits::BridgeError;
use core_bridge::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Bundle provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
