// ABOUTME: Deadline-bounded single-shot watch over a ConnectivityTracker.
// ABOUTME: Resolves with the next state transition or a timeout, whichever fires first.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tonic::Status;

use crate::state::{ConnectivityState, ConnectivityTracker, ConnectivityWatcher};

/// Result of a deadline-bounded state watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The state changed away from the caller's last observed state.
    Changed(ConnectivityState),
    /// The deadline passed with no transition. Not an error on the
    /// connection itself; the watch simply ran out of time.
    TimedOut,
}

/// Internal watcher that forwards observed states into the watch task.
struct ForwardingWatcher {
    tx: mpsc::UnboundedSender<ConnectivityState>,
}

#[async_trait]
impl ConnectivityWatcher for ForwardingWatcher {
    async fn on_state_change(&self, state: ConnectivityState, _status: Option<Status>) {
        let _ = self.tx.send(state);
    }
}

/// A single-shot watch for the next state transition, bounded by a deadline.
///
/// Registers one internal watcher on the tracker and arms the deadline;
/// exactly one of the two resolves the watch. Whichever fires first wins:
/// a transition disarms the timer, a timeout unregisters the watcher. The
/// losing path is a no-op by construction, so the caller sees exactly one
/// [`WatchOutcome`] no matter how close the race.
pub struct StateWatch {
    done: oneshot::Receiver<WatchOutcome>,
}

impl StateWatch {
    /// Watch `tracker` for a transition away from `last_observed`.
    ///
    /// If the tracker's state already differs, the watch resolves
    /// immediately with the current state.
    pub fn new(
        tracker: Arc<ConnectivityTracker>,
        last_observed: ConnectivityState,
        deadline: Instant,
    ) -> Self {
        let (done_tx, done_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = tracker.add_watcher(last_observed, Arc::new(ForwardingWatcher { tx }));

        tokio::spawn(async move {
            let outcome = tokio::select! {
                observed = rx.recv() => match observed {
                    Some(state) => WatchOutcome::Changed(state),
                    // The watcher was never retained (tracker already shut
                    // down with nothing to report): the state can no longer
                    // change, so wait out the deadline.
                    None => {
                        tokio::time::sleep_until(deadline).await;
                        WatchOutcome::TimedOut
                    }
                },
                _ = tokio::time::sleep_until(deadline) => WatchOutcome::TimedOut,
            };
            tracker.remove_watcher(id);
            let _ = done_tx.send(outcome);
        });

        Self { done: done_rx }
    }

    /// Watch for a connection that never came up and thus can never change
    /// state. Resolves `TimedOut` at the deadline instead of hanging.
    pub fn unconnected(deadline: Instant) -> Self {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = done_tx.send(WatchOutcome::TimedOut);
        });
        Self { done: done_rx }
    }

    /// Wait for the watch to resolve.
    pub async fn outcome(self) -> WatchOutcome {
        self.done.await.unwrap_or(WatchOutcome::TimedOut)
    }
}

/// Await the next state transition on `tracker`, bounded by `deadline`.
///
/// Convenience wrapper over [`StateWatch`] for callers that just want to
/// block until the connection moves past `last_observed` or time runs out.
pub async fn wait_for_state_change(
    tracker: Arc<ConnectivityTracker>,
    last_observed: ConnectivityState,
    deadline: Instant,
) -> WatchOutcome {
    StateWatch::new(tracker, last_observed, deadline).outcome().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker(initial: ConnectivityState) -> Arc<ConnectivityTracker> {
        Arc::new(ConnectivityTracker::new("conn-1", initial))
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_on_transition() {
        let tracker = tracker(ConnectivityState::Idle);
        let watch = StateWatch::new(
            Arc::clone(&tracker),
            ConnectivityState::Idle,
            Instant::now() + Duration::from_secs(5),
        );

        tracker.set_state(ConnectivityState::Connecting, None, "connect started");

        assert_eq!(
            watch.outcome().await,
            WatchOutcome::Changed(ConnectivityState::Connecting)
        );
        // The internal watcher is unregistered once the watch resolves.
        assert_eq!(tracker.watcher_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_immediately_when_state_already_differs() {
        let tracker = tracker(ConnectivityState::Ready);
        let watch = StateWatch::new(
            Arc::clone(&tracker),
            ConnectivityState::Idle,
            Instant::now() + Duration::from_secs(5),
        );

        assert_eq!(
            watch.outcome().await,
            WatchOutcome::Changed(ConnectivityState::Ready)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_no_transition() {
        let tracker = tracker(ConnectivityState::Idle);
        let started = Instant::now();
        let watch = StateWatch::new(
            Arc::clone(&tracker),
            ConnectivityState::Idle,
            started + Duration::from_millis(100),
        );

        assert_eq!(watch.outcome().await, WatchOutcome::TimedOut);
        assert!(Instant::now() - started >= Duration::from_millis(100));

        // The watcher is gone; a later transition reaches nobody.
        assert_eq!(tracker.watcher_count(), 0);
        tracker.set_state(ConnectivityState::Ready, None, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconnected_watch_times_out() {
        let watch = StateWatch::unconnected(Instant::now() + Duration::from_millis(100));
        assert_eq!(watch.outcome().await, WatchOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_resolves_watch() {
        let tracker = tracker(ConnectivityState::Ready);
        let watch = StateWatch::new(
            Arc::clone(&tracker),
            ConnectivityState::Ready,
            Instant::now() + Duration::from_secs(5),
        );

        tracker.set_state(ConnectivityState::Shutdown, None, "channel destroyed");

        assert_eq!(
            watch.outcome().await,
            WatchOutcome::Changed(ConnectivityState::Shutdown)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_on_shutdown_tracker_with_shutdown_observed_times_out() {
        let tracker = tracker(ConnectivityState::Ready);
        tracker.set_state(ConnectivityState::Shutdown, None, "channel destroyed");

        // The caller already knows about the shutdown; nothing can ever
        // change again, so the watch behaves like an unconnected one.
        let watch = StateWatch::new(
            Arc::clone(&tracker),
            ConnectivityState::Shutdown,
            Instant::now() + Duration::from_millis(100),
        );
        assert_eq!(watch.outcome().await, WatchOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_state_change_helper() {
        let tracker = tracker(ConnectivityState::Idle);
        let wait = tokio::spawn(wait_for_state_change(
            Arc::clone(&tracker),
            ConnectivityState::Idle,
            Instant::now() + Duration::from_secs(5),
        ));

        tracker.set_state(ConnectivityState::Ready, None, "connected");

        assert_eq!(
            wait.await.unwrap(),
            WatchOutcome::Changed(ConnectivityState::Ready)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_watches_each_resolve_once() {
        let tracker = tracker(ConnectivityState::Idle);
        let deadline = Instant::now() + Duration::from_secs(5);
        let watch_a = StateWatch::new(Arc::clone(&tracker), ConnectivityState::Idle, deadline);
        let watch_b = StateWatch::new(Arc::clone(&tracker), ConnectivityState::Idle, deadline);

        tracker.set_state(ConnectivityState::Connecting, None, "connect started");

        assert_eq!(
            watch_a.outcome().await,
            WatchOutcome::Changed(ConnectivityState::Connecting)
        );
        assert_eq!(
            watch_b.outcome().await,
            WatchOutcome::Changed(ConnectivityState::Connecting)
        );
    }
}
