use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    /// An app-shell asset could not be fetched or stored. Fatal to install.
    #[error("Mandatory asset {url} could not be cached: {reason}")]
    MandatoryAsset { url: String, reason: String },

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unknown client {0}")]
    UnknownClient(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

impl OfflineError {
    /// True when the failure came from the network transport.
    pub fn is_network(&self) -> bool {
        matches!(self, OfflineError::Bridge(e) if e.is_network())
    }
}

pub type Result<T> = std::result::Result<T, OfflineError>;
