// ABOUTME: Connectivity state tracking for RPC client channels.
// ABOUTME: Provides the state tracker, watcher notification, and deadline-bounded watches.

pub mod state;
pub mod watch;

// State machine and watcher registration
pub use state::{ConnectivityState, ConnectivityTracker, ConnectivityWatcher, WatcherId};

// Deadline-bounded watches
pub use watch::{wait_for_state_change, StateWatch, WatchOutcome};
