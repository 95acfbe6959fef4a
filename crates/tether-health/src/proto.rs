// ABOUTME: Message types for the grpc.health.v1 health-checking protocol.
// ABOUTME: Hand-modeled prost messages so the crate builds without a protobuf toolchain.

/// Full method path of the streaming health watch.
pub const HEALTH_WATCH_PATH: &str = "/grpc.health.v1.Health/Watch";

/// Request for the health of a service.
///
/// An empty `service` asks about the server as a whole.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HealthCheckRequest {
    #[prost(string, tag = "1")]
    pub service: ::prost::alloc::string::String,
}

/// One health report on the watch stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HealthCheckResponse {
    #[prost(enumeration = "ServingStatus", tag = "1")]
    pub status: i32,
}

impl HealthCheckResponse {
    /// Decoded serving status, mapping unrecognized values to `Unknown`.
    pub fn serving_status(&self) -> ServingStatus {
        ServingStatus::try_from(self.status).unwrap_or(ServingStatus::Unknown)
    }
}

/// Serving status reported by the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServingStatus {
    /// The peer could not determine the status.
    Unknown = 0,
    /// The service is up and serving.
    Serving = 1,
    /// The service is known to be down.
    NotServing = 2,
    /// The peer does not know the requested service.
    ServiceUnknown = 3,
}

impl ServingStatus {
    /// Whether this status indicates a usable peer.
    pub fn is_serving(self) -> bool {
        self == ServingStatus::Serving
    }
}
