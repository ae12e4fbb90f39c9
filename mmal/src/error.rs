// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for pipeline operations.
//!
//! This module defines the error type returned by the core, mapping native
//! status codes to a single error kind and adding variants for configuration
//! errors detected on the Rust side.

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while building or driving a pipeline.
///
/// Configuration errors (invalid state transitions, missing pools) are raised
/// synchronously to the requesting call. A non-success status from the native
/// layer is always reported as [`Error::Native`], carrying the status and the
/// name of the operation that failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A native call returned a non-success status.
    #[error("{operation} failed: {} ({status})", status_text(.status))]
    Native {
        /// Name of the failed operation, prefixed with the object it targeted.
        operation: String,
        /// Raw status code returned by the native layer.
        status: mmal_sys::Status,
    },

    /// The object is not in a state that allows the requested transition.
    #[error("{object}: cannot {action} while {state}")]
    InvalidState {
        object: String,
        action: &'static str,
        state: String,
    },

    /// A port was enabled without a viable buffer pool.
    #[error("{0}: no viable buffer pool (buffer count and size must be non-zero)")]
    MissingPool(String),

    /// A pool was torn down while some of its buffers were still checked out.
    #[error("Pool {name} still has {outstanding} of {headers} buffer(s) checked out")]
    PoolNotDrained {
        name: String,
        headers: u32,
        outstanding: u32,
    },

    /// Retrieval from a queue that has been destroyed.
    #[error("Queue destroyed")]
    QueueDestroyed,

    /// The output port already carries a connection.
    #[error("{0}: already connected")]
    AlreadyConnected(String),

    /// The native layer does not know the requested component kind.
    #[error("Unknown component kind: {0}")]
    UnknownComponent(String),

    /// An argument was rejected before reaching the native layer.
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// A bounded wait elapsed.
    #[error("Timeout")]
    Timeout,

    /// Failed to parse or serialize a configuration document.
    #[error("Configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Failed to read a configuration file.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

fn status_text(status: &mmal_sys::Status) -> &'static str {
    mmal_sys::status_to_string(*status)
}

impl Error {
    /// Converts a native status code to a Rust [`Result`].
    ///
    /// # Arguments
    ///
    /// * `status` - The raw status code returned by a native call
    /// * `operation` - Name of the call, used in the error message
    ///
    /// # Returns
    ///
    /// - `Ok(())` if `status == MMAL_SUCCESS`
    /// - `Err(Error::Native { .. })` for any other status
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let status = native.enable_port(handle, Some(callback));
    /// Error::from_status(status, format!("{name}: enable port"))?;
    /// ```
    pub fn from_status(status: mmal_sys::Status, operation: impl Into<String>) -> Result<()> {
        match status {
            mmal_sys::MMAL_SUCCESS => Ok(()),
            status => Err(Error::Native {
                operation: operation.into(),
                status,
            }),
        }
    }

    /// Returns the native status code if this error came from a native call.
    pub fn status(&self) -> Option<mmal_sys::Status> {
        match self {
            Error::Native { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_maps_to_ok() {
        assert!(Error::from_status(mmal_sys::MMAL_SUCCESS, "noop").is_ok());
    }

    #[test]
    fn failure_carries_status_and_operation() {
        let err = Error::from_status(mmal_sys::MMAL_ENOSPC, "camera: enable port").unwrap_err();
        assert_eq!(err.status(), Some(mmal_sys::MMAL_ENOSPC));
        let message = err.to_string();
        assert!(message.contains("camera: enable port"));
        assert!(message.contains("out of resources"));
    }
}
