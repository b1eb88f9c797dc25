//! Unified error type for all observers.
//!
//! [`ObserverError`] wraps the errors of the readback that produces a
//! snapshot and of the observers that render it, so a reporting function
//! can use `?` on both.

use thiserror::Error;

use crate::error::DeviceError;

/// Unified error type for observer operations.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Error reading the counters back from the device.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Error from the JSON observer.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;
