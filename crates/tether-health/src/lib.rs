// ABOUTME: Self-healing streaming health checks for RPC client channels.
// ABOUTME: Provides the retrying watch client, backoff policy, transport seam, and a tonic adapter.

pub mod attempt;
pub mod backoff;
pub mod client;
pub mod error;
pub mod grpc;
pub mod proto;
pub mod transport;

// Call attempts
pub use attempt::{AttemptOutcome, CallAttempt};

// Backoff policy
pub use backoff::{BackoffConfig, BackoffState};

// The retrying client
pub use client::{HealthCallback, HealthCheckClient, HealthCheckConfig, HealthEvent};

// Error types
pub use error::HealthError;

// tonic transport adapter
pub use grpc::{GrpcHealthTransport, GrpcTransportConfig};

// Health protocol payloads
pub use proto::{HealthCheckRequest, HealthCheckResponse, ServingStatus, HEALTH_WATCH_PATH};

// Transport seam
pub use transport::{HealthStream, HealthTransport};
