// ABOUTME: Transport seam between the health-check client and the connected channel.
// ABOUTME: Defines a call as a method path plus opaque request/response byte frames.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tonic::Status;

/// Response frames of one in-flight call.
///
/// Yields one `Bytes` frame per response message. The terminal status
/// arrives as an `Err` item, or as the end of the stream for a close
/// without trailers. Dropping the stream cancels the call.
pub type HealthStream = BoxStream<'static, Result<Bytes, Status>>;

/// A connected transport capable of carrying the streaming health check.
///
/// Implemented over a real channel by
/// [`GrpcHealthTransport`](crate::grpc::GrpcHealthTransport) and by
/// scripted mocks in tests.
#[async_trait]
pub trait HealthTransport: Send + Sync + 'static {
    /// Whether the transport can currently carry a call.
    fn is_usable(&self) -> bool;

    /// Open one streaming call at `path` with the given request payload.
    async fn start_call(&self, path: &str, payload: Bytes) -> Result<HealthStream, Status>;
}
