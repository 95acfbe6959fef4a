// ABOUTME: One concrete attempt of the streaming health-check call.
// ABOUTME: Drives the response stream to its terminal status and reports the outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use prost::Message;
use tokio_util::sync::CancellationToken;
use tonic::Code;

use crate::client::{HealthCallback, HealthCheckConfig, HealthEvent};
use crate::proto::{HealthCheckRequest, HealthCheckResponse};
use crate::transport::HealthTransport;

/// Terminal outcome of one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Terminal status code of the call.
    pub code: Code,
    /// Whether the owning client should retry. False only when the peer
    /// reported that the health-check protocol itself is unsupported.
    pub retryable: bool,
    /// Whether this attempt received at least one response.
    pub saw_response: bool,
}

/// A single execution of the health-check RPC.
///
/// Constructed and driven by [`HealthCheckClient`](crate::client::HealthCheckClient);
/// all per-attempt state lives on the attempt's own task, so response
/// handling and terminal-status handling never race.
pub struct CallAttempt {
    transport: Arc<dyn HealthTransport>,
    path: String,
    service: String,
    unsupported_code: Code,
    token: CancellationToken,
    cancelled: AtomicBool,
    seen_response: Arc<AtomicBool>,
    on_event: HealthCallback,
}

impl CallAttempt {
    /// Create an attempt bound to the owning client's cancellation scope.
    pub fn new(
        transport: Arc<dyn HealthTransport>,
        config: &HealthCheckConfig,
        parent: &CancellationToken,
        seen_response: Arc<AtomicBool>,
        on_event: HealthCallback,
    ) -> Self {
        Self {
            transport,
            path: config.path.clone(),
            service: config.service.clone(),
            unsupported_code: config.unsupported_code,
            token: parent.child_token(),
            cancelled: AtomicBool::new(false),
            seen_response,
            on_event,
        }
    }

    /// Request cancellation of this attempt.
    ///
    /// Safe to call from any thread, any number of times; only the first
    /// call has effect. Returns whether this call performed the
    /// cancellation.
    pub fn cancel(&self) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::debug!(service = %self.service, "cancelling health-check attempt");
            self.token.cancel();
            true
        } else {
            false
        }
    }

    /// Drive the attempt to its terminal outcome.
    ///
    /// Sends the health-check request, forwards each decoded response to
    /// the owning client's callback, and resolves with the terminal status.
    /// Cancellation (from [`cancel`](Self::cancel) or the owning client's
    /// shutdown) resolves with `Code::Cancelled`.
    pub async fn run(&self) -> AttemptOutcome {
        if !self.transport.is_usable() {
            tracing::debug!(service = %self.service, "transport not usable, skipping attempt");
            return self.finish(Code::Unavailable, false);
        }

        let request = HealthCheckRequest {
            service: self.service.clone(),
        };
        let payload = Bytes::from(request.encode_to_vec());

        let mut stream = tokio::select! {
            biased;
            _ = self.token.cancelled() => return self.finish(Code::Cancelled, false),
            opened = self.transport.start_call(&self.path, payload) => match opened {
                Ok(stream) => stream,
                Err(status) => {
                    tracing::debug!(
                        service = %self.service,
                        code = ?status.code(),
                        "health-check call failed to start"
                    );
                    return self.finish(status.code(), false);
                }
            },
        };

        let mut saw_response = false;
        let code = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break Code::Cancelled,
                frame = stream.next() => match frame {
                    Some(Ok(bytes)) => match HealthCheckResponse::decode(bytes) {
                        Ok(response) => {
                            saw_response = true;
                            self.seen_response.store(true, Ordering::Relaxed);
                            let status = response.serving_status();
                            tracing::debug!(
                                service = %self.service,
                                status = ?status,
                                "health status received"
                            );
                            (self.on_event)(HealthEvent::StatusChanged(status));
                        }
                        Err(err) => {
                            tracing::warn!(
                                service = %self.service,
                                error = %err,
                                "failed to decode health response, cancelling attempt"
                            );
                            self.cancel();
                        }
                    },
                    Some(Err(status)) => break status.code(),
                    // Stream ended without a terminal status.
                    None => break Code::Unknown,
                },
            }
        };
        drop(stream);
        self.finish(code, saw_response)
    }

    fn finish(&self, code: Code, saw_response: bool) -> AttemptOutcome {
        AttemptOutcome {
            code,
            retryable: code != self.unsupported_code,
            saw_response,
        }
    }
}
