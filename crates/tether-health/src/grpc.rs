// ABOUTME: tonic-backed transport for the streaming health check.
// ABOUTME: Connects a channel tuned for long-lived watch calls and issues raw-byte streaming calls.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use futures::StreamExt;
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};

use crate::error::HealthError;
use crate::transport::{HealthStream, HealthTransport};

/// Configuration for the health-check transport channel.
#[derive(Debug, Clone)]
pub struct GrpcTransportConfig {
    /// Server address to connect to (e.g., "http://localhost:50051").
    pub address: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Interval between HTTP/2 keep-alive pings, or None to disable.
    /// Keep-alive matters here: the watch stream is long-lived and mostly
    /// silent, and middleboxes reset idle connections.
    pub keep_alive_interval: Option<Duration>,
    /// Timeout waiting for a keep-alive response.
    pub keep_alive_timeout: Duration,
    /// Enable TLS (auto-detected from an https:// address).
    pub use_tls: bool,
}

impl GrpcTransportConfig {
    /// Create a config with defaults, detecting TLS from the URL scheme.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into().trim().to_string();
        let use_tls = address.to_lowercase().starts_with("https://");
        Self {
            address,
            connect_timeout: Duration::from_secs(20),
            keep_alive_interval: Some(Duration::from_secs(10)),
            keep_alive_timeout: Duration::from_secs(20),
            use_tls,
        }
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set custom keep-alive timing.
    pub fn with_keep_alive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self.keep_alive_timeout = timeout;
        self
    }

    /// Disable keep-alive pings.
    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive_interval = None;
        self
    }
}

/// [`HealthTransport`] over a tonic channel.
#[derive(Debug)]
pub struct GrpcHealthTransport {
    channel: Channel,
}

impl GrpcHealthTransport {
    /// Connect a new channel with the given configuration.
    pub async fn connect(config: GrpcTransportConfig) -> Result<Self, HealthError> {
        let mut endpoint = Endpoint::from_shared(config.address.clone())
            .map_err(|e| HealthError::InvalidAddress(e.to_string()))?
            .connect_timeout(config.connect_timeout);

        if let Some(interval) = config.keep_alive_interval {
            endpoint = endpoint
                .http2_keep_alive_interval(interval)
                .keep_alive_timeout(config.keep_alive_timeout)
                .keep_alive_while_idle(true);
        }
        if config.use_tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new())
                .map_err(|e| HealthError::ConnectionFailed(format!("TLS config error: {}", e)))?;
        }

        let channel = endpoint.connect().await?;
        tracing::debug!(
            address = %config.address,
            use_tls = config.use_tls,
            keep_alive = config.keep_alive_interval.is_some(),
            "health-check channel connected"
        );
        Ok(Self { channel })
    }

    /// Wrap an already-connected channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl HealthTransport for GrpcHealthTransport {
    fn is_usable(&self) -> bool {
        // The channel reconnects lazily; failures surface per call.
        true
    }

    async fn start_call(&self, path: &str, payload: Bytes) -> Result<HealthStream, Status> {
        let path = parse_path(path)?;
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("transport not ready: {}", e)))?;
        let response = grpc
            .server_streaming(Request::new(payload), path, RawCodec)
            .await?;
        Ok(response.into_inner().boxed())
    }
}

fn parse_path(path: &str) -> Result<PathAndQuery, Status> {
    PathAndQuery::try_from(path)
        .map_err(|_| Status::internal(format!("invalid call path: {}", path)))
}

/// Codec passing request and response payloads through as raw bytes.
#[derive(Debug, Clone, Default)]
struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Bytes>, Status> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GrpcTransportConfig::new("http://localhost:50051");
        assert_eq!(config.address, "http://localhost:50051");
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.keep_alive_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.keep_alive_timeout, Duration::from_secs(20));
        assert!(!config.use_tls);
    }

    #[test]
    fn test_config_detects_tls_from_scheme() {
        assert!(GrpcTransportConfig::new("https://example.com:443").use_tls);
        assert!(GrpcTransportConfig::new("HTTPS://example.com:443").use_tls);
        assert!(!GrpcTransportConfig::new("http://example.com:80").use_tls);
    }

    #[test]
    fn test_config_trims_whitespace() {
        let config = GrpcTransportConfig::new("  https://example.com:443  ");
        assert_eq!(config.address, "https://example.com:443");
        assert!(config.use_tls);
    }

    #[test]
    fn test_config_builder() {
        let config = GrpcTransportConfig::new("http://localhost:50051")
            .with_connect_timeout(Duration::from_secs(5))
            .with_keep_alive(Duration::from_secs(30), Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.keep_alive_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.keep_alive_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_without_keep_alive() {
        let config = GrpcTransportConfig::new("http://localhost:50051").without_keep_alive();
        assert!(config.keep_alive_interval.is_none());
    }

    #[test]
    fn test_parse_path() {
        assert!(parse_path("/grpc.health.v1.Health/Watch").is_ok());
        assert!(parse_path("not a path").is_err());
    }

    #[tokio::test]
    async fn test_connect_invalid_address() {
        let config = GrpcTransportConfig::new("");
        let result = GrpcHealthTransport::connect(config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_connection_refused() {
        let config = GrpcTransportConfig::new("http://127.0.0.1:1")
            .with_connect_timeout(Duration::from_millis(100));
        let result = GrpcHealthTransport::connect(config).await;
        assert!(matches!(
            result.unwrap_err(),
            HealthError::ConnectionFailed(_)
        ));
    }
}
