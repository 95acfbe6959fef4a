// ABOUTME: Self-healing streaming health-check client.
// ABOUTME: Restarts the health watch on failure, backing off until the peer proves itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::Code;

use crate::attempt::CallAttempt;
use crate::backoff::{BackoffConfig, BackoffState};
use crate::proto::{ServingStatus, HEALTH_WATCH_PATH};
use crate::transport::HealthTransport;

/// Health updates delivered to the owner of a [`HealthCheckClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// The peer reported a serving status on the watch stream.
    StatusChanged(ServingStatus),
    /// The peer does not implement the health-check protocol. The client
    /// stops checking; the connection should be assumed healthy.
    Unsupported,
}

/// Callback invoked by the client whenever a health update arrives.
///
/// Runs on the client's driver task; implementations should hand off work
/// rather than block.
pub type HealthCallback = Arc<dyn Fn(HealthEvent) + Send + Sync>;

/// Configuration for a health-check client.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Service name sent in the health-check request.
    pub service: String,
    /// Full method path of the streaming watch call.
    pub path: String,
    /// Status code the peer uses to signal the protocol is unsupported.
    pub unsupported_code: Code,
    /// Retry backoff policy.
    pub backoff: BackoffConfig,
}

impl HealthCheckConfig {
    /// Create a config for `service` with default path and backoff.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            path: HEALTH_WATCH_PATH.to_string(),
            unsupported_code: Code::Unimplemented,
            backoff: BackoffConfig::default(),
        }
    }

    /// Set a custom method path for the watch call.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the status code that means "health checking unsupported".
    pub fn with_unsupported_code(mut self, code: Code) -> Self {
        self.unsupported_code = code;
        self
    }

    /// Set the retry backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Long-lived health checker for one connected transport.
///
/// Runs one call attempt at a time on a dedicated driver task. A failed
/// attempt is retried: immediately once any attempt has ever received a
/// response (the peer proved itself, so the failure is presumed
/// transient), otherwise after an escalating backoff delay. The client
/// only stops when [`orphan`](Self::orphan) is called or the peer signals
/// the protocol is unsupported.
pub struct HealthCheckClient {
    transport: Arc<dyn HealthTransport>,
    config: HealthCheckConfig,
    on_event: HealthCallback,
    seen_response: Arc<AtomicBool>,
    shutdown: CancellationToken,
    started: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl HealthCheckClient {
    /// Create a client. No call is made until [`start`](Self::start).
    pub fn new(
        transport: Arc<dyn HealthTransport>,
        config: HealthCheckConfig,
        on_event: HealthCallback,
    ) -> Self {
        Self {
            transport,
            config,
            on_event,
            seen_response: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            driver: Mutex::new(None),
        }
    }

    /// Begin the first call attempt. No-op when already started or
    /// orphaned.
    pub fn start(&self) {
        if self.shutdown.is_cancelled() {
            tracing::debug!(service = %self.config.service, "not starting orphaned health-check client");
            return;
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(service = %self.config.service, "health-check client already started");
            return;
        }

        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let on_event = Arc::clone(&self.on_event);
        let seen_response = Arc::clone(&self.seen_response);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            run_driver(transport, config, on_event, seen_response, shutdown).await;
        });
        *self.driver.lock().unwrap() = Some(handle);
    }

    /// Stop checking: cancel the in-flight attempt and any pending retry.
    ///
    /// Idempotent and safe to call concurrently with an attempt completing;
    /// a result that arrives after this call is discarded.
    pub fn orphan(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!(service = %self.config.service, "health-check client orphaned");
        }
        self.shutdown.cancel();
    }

    /// Whether the client has been orphaned.
    pub fn is_orphaned(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Whether any attempt has ever received a response.
    pub fn seen_response(&self) -> bool {
        self.seen_response.load(Ordering::Relaxed)
    }

    /// Wait for the driver task to wind down.
    pub async fn join(&self) {
        let handle = self.driver.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for HealthCheckClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// The retry loop: one attempt at a time, backoff between failures until
/// the peer has proven itself at least once.
async fn run_driver(
    transport: Arc<dyn HealthTransport>,
    config: HealthCheckConfig,
    on_event: HealthCallback,
    seen_response: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let mut backoff = BackoffState::new(config.backoff.clone());
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let attempt = CallAttempt::new(
            Arc::clone(&transport),
            &config,
            &shutdown,
            Arc::clone(&seen_response),
            Arc::clone(&on_event),
        );
        let outcome = attempt.run().await;

        if shutdown.is_cancelled() {
            tracing::debug!(service = %config.service, "discarding attempt outcome after orphan");
            break;
        }
        if !outcome.retryable {
            tracing::info!(
                service = %config.service,
                code = ?outcome.code,
                "peer does not support health checking, assuming healthy"
            );
            on_event(HealthEvent::Unsupported);
            break;
        }
        if seen_response.load(Ordering::Relaxed) {
            tracing::debug!(
                service = %config.service,
                code = ?outcome.code,
                "health stream ended after a proven response, restarting immediately"
            );
            backoff.reset();
            continue;
        }

        let delay = backoff.next_delay();
        tracing::debug!(
            service = %config.service,
            code = ?outcome.code,
            delay_ms = delay.as_millis() as u64,
            "health stream failed before any response, backing off"
        );
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!(service = %config.service, "health-check driver stopped");
}
