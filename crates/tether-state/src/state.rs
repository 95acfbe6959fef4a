// ABOUTME: Connectivity state machine for one connection-like entity.
// ABOUTME: Tracks the current state and fans transitions out to registered watchers asynchronously.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tonic::Status;

/// Connectivity state of a connection.
///
/// `Shutdown` is terminal: once a tracker reports it, no further
/// transitions occur. There is no implied order among the other states;
/// a connection may move between them arbitrarily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// No connection attempt in progress.
    Idle,
    /// A connection attempt is in progress.
    Connecting,
    /// Connected and usable.
    Ready,
    /// A recent attempt failed; a retry is expected.
    TransientFailure,
    /// Permanently shut down.
    Shutdown,
}

impl ConnectivityState {
    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        self == ConnectivityState::Shutdown
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Idle => "idle",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Ready => "ready",
            ConnectivityState::TransientFailure => "transient-failure",
            ConnectivityState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Capability for receiving connectivity state transitions.
///
/// Notifications are delivered on a dedicated task, never on the stack of
/// the `set_state` caller, and in order for any single watcher. No ordering
/// holds across different watchers.
#[async_trait]
pub trait ConnectivityWatcher: Send + Sync + 'static {
    /// Called once per observed transition. `status` carries the error
    /// associated with a non-`Ready` state, when one is known.
    async fn on_state_change(&self, state: ConnectivityState, status: Option<Status>);
}

/// Identifies one watcher registration on a [`ConnectivityTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

type Notification = (ConnectivityState, Option<Status>);

struct WatcherEntry {
    queue: mpsc::UnboundedSender<Notification>,
}

struct TrackerInner {
    state: ConnectivityState,
    status: Option<Status>,
    watchers: HashMap<u64, WatcherEntry>,
    next_id: u64,
}

/// Tracks the connectivity state of one connection and notifies watchers.
///
/// Each registered watcher gets its own delivery queue and task, so a slow
/// watcher never delays `set_state` or other watchers. Dropping the tracker
/// while it is not shut down sends every remaining watcher a final
/// `Shutdown` notification.
pub struct ConnectivityTracker {
    name: String,
    inner: Mutex<TrackerInner>,
}

impl ConnectivityTracker {
    /// Create a tracker with a diagnostic name and an initial state.
    pub fn new(name: impl Into<String>, initial: ConnectivityState) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(TrackerInner {
                state: initial,
                status: None,
                watchers: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Diagnostic name of the tracked connection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Never blocks on notification delivery.
    pub fn state(&self) -> ConnectivityState {
        self.inner.lock().unwrap().state
    }

    /// Status associated with the current state, when one is known.
    /// Meaningful while the state is not `Ready`.
    pub fn status(&self) -> Option<Status> {
        self.inner.lock().unwrap().status.clone()
    }

    /// Number of currently retained watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.lock().unwrap().watchers.len()
    }

    /// Register a watcher.
    ///
    /// If the current state differs from `last_observed`, the watcher is
    /// immediately (but asynchronously) notified of the current state, so a
    /// transition that happened before registration is never missed. When
    /// the tracker is already shut down the watcher receives that final
    /// notification and is not retained.
    pub fn add_watcher(
        &self,
        last_observed: ConnectivityState,
        watcher: Arc<dyn ConnectivityWatcher>,
    ) -> WatcherId {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        tokio::spawn(async move {
            while let Some((state, status)) = rx.recv().await {
                watcher.on_state_change(state, status).await;
            }
        });

        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        if inner.state != last_observed {
            let _ = tx.send((inner.state, inner.status.clone()));
        }
        if inner.state == ConnectivityState::Shutdown {
            tracing::debug!(tracker = %self.name, "watcher registered after shutdown, not retained");
        } else {
            inner.watchers.insert(id, WatcherEntry { queue: tx });
        }
        WatcherId(id)
    }

    /// Unregister a watcher without notification. Idempotent.
    pub fn remove_watcher(&self, id: WatcherId) {
        self.inner.lock().unwrap().watchers.remove(&id.0);
    }

    /// Transition to `state`, recording `status` and notifying all watchers.
    ///
    /// A no-op when the state is unchanged or the tracker is already shut
    /// down. Transitioning to `Shutdown` clears the watcher set after the
    /// final notification is queued, so callers need not unregister.
    pub fn set_state(&self, state: ConnectivityState, status: Option<Status>, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == state {
            return;
        }
        if inner.state == ConnectivityState::Shutdown {
            tracing::warn!(
                tracker = %self.name,
                requested = %state,
                reason,
                "ignoring state transition after shutdown"
            );
            return;
        }
        tracing::debug!(
            tracker = %self.name,
            from = %inner.state,
            to = %state,
            reason,
            "connectivity state changed"
        );
        inner.state = state;
        inner.status = status;
        for entry in inner.watchers.values() {
            let _ = entry.queue.send((inner.state, inner.status.clone()));
        }
        if state == ConnectivityState::Shutdown {
            inner.watchers.clear();
        }
    }
}

impl Drop for ConnectivityTracker {
    fn drop(&mut self) {
        let Ok(inner) = self.inner.get_mut() else {
            return;
        };
        if inner.state == ConnectivityState::Shutdown {
            return;
        }
        for entry in inner.watchers.values() {
            let _ = entry.queue.send((ConnectivityState::Shutdown, None));
        }
        inner.watchers.clear();
    }
}

impl fmt::Debug for ConnectivityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityTracker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
