//! Error types for device drivers and feeds.
//!
//! Workers never let a transient error escape as a crash: connection and
//! communication failures demote the device status (Lost/Error) and the
//! next cycle retries. The variants here exist so drivers can report
//! what went wrong and so logs stay meaningful.

use thiserror::Error;

/// Error produced by device drivers and the weather feed client.
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("connection failed: {device} - {reason}")]
    ConnectionFailed { device: String, reason: String },

    #[error("communication error: {device} - {reason}")]
    Communication { device: String, reason: String },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("weather feed error: {0}")]
    Feed(String),

    #[error("malformed feed payload: {0}")]
    MalformedFeed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DeviceError {
    pub fn connection_failed(device: impl Into<String>, reason: impl Into<String>) -> Self {
        DeviceError::ConnectionFailed {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub fn communication(device: impl Into<String>, reason: impl Into<String>) -> Self {
        DeviceError::Communication {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that a later poll cycle may clear on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeviceError::ConnectionFailed { .. }
                | DeviceError::Communication { .. }
                | DeviceError::Timeout(_)
                | DeviceError::Feed(_)
        )
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeviceError::Timeout(e.to_string())
        } else {
            DeviceError::Feed(e.to_string())
        }
    }
}

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
