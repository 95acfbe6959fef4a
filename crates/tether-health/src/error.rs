// ABOUTME: Error types for the tether-health crate.
// ABOUTME: Covers transport construction failures; call-level failures travel as tonic statuses.

use thiserror::Error;

/// Errors raised while building the health-check transport.
#[derive(Error, Debug)]
pub enum HealthError {
    /// Invalid endpoint address format.
    #[error("invalid endpoint address: {0}")]
    InvalidAddress(String),

    /// Failed to connect to the endpoint.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl From<tonic::transport::Error> for HealthError {
    fn from(err: tonic::transport::Error) -> Self {
        HealthError::ConnectionFailed(err.to_string())
    }
}
