//! Error type shared by the device, the queue and the counters.
//!
//! Every fallible operation in the crate returns [`Result`], so a driver can
//! propagate allocation failures and device faults with `?` all the way up
//! to `main`.

use thiserror::Error;

/// Errors raised by device memory, bulk dispatch and counter operations.
///
/// None of these are retried inside the crate: an allocation failure or an
/// execution fault is reported to the caller as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device memory arena cannot satisfy the request.
    #[error("device allocation of {requested} bytes failed ({available} of {capacity} bytes available)")]
    AllocationFailure {
        /// Bytes requested (`usize::MAX` when the size computation overflowed).
        requested: usize,
        /// Bytes still free in the arena.
        available: usize,
        /// Total size of the arena.
        capacity: usize,
    },

    /// A submitted bulk operation faulted; reported at the next blocking wait.
    #[error("device execution fault: {0}")]
    ExecutionFault(String),

    /// The address is not a live allocation of this device.
    #[error("invalid device free at {0:#x}")]
    InvalidFree(usize),

    /// The counter buffer has already been released.
    #[error("device buffer already released")]
    Released,

    /// No device on the platform matches the selector.
    #[error("no device matches selector: {0}")]
    NoDevice(String),
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_allocation_failure() {
        let err = DeviceError::AllocationFailure {
            requested: 64,
            available: 32,
            capacity: 128,
        };
        assert_eq!(
            err.to_string(),
            "device allocation of 64 bytes failed (32 of 128 bytes available)"
        );
    }

    #[test]
    fn test_display_invalid_free() {
        assert_eq!(
            DeviceError::InvalidFree(0x100).to_string(),
            "invalid device free at 0x100"
        );
    }

    #[test]
    fn test_display_execution_fault() {
        let err = DeviceError::ExecutionFault("boom".to_string());
        assert_eq!(err.to_string(), "device execution fault: boom");
    }
}
