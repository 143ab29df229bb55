//! In-flight request accounting for the "network idle" navigation wait.
//!
//! The browser backend feeds request lifecycle events into a
//! [`NetworkActivity`]; the navigation wait polls [`NetworkActivity::snapshot`]
//! and stops once [`is_snapshot_quiet`] holds.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Quiet period required before the network counts as idle
pub const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Requests allowed to stay open while the page still counts as idle
pub const MAX_INFLIGHT: usize = 0;

/// Point-in-time view of a page's network traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub inflight: usize,
    pub since_last_activity: Duration,
}

/// Whether `snapshot` shows at most `max_inflight` open requests and no
/// request started or finished within `window`.
pub fn is_snapshot_quiet(snapshot: &NetworkSnapshot, window: Duration, max_inflight: usize) -> bool {
    snapshot.inflight <= max_inflight && snapshot.since_last_activity >= window
}

#[derive(Debug)]
struct ActivityState {
    inflight: HashSet<String>,
    last_activity: Instant,
}

/// Tracks open requests by id. Shared between the event listener thread and
/// the thread waiting for navigation.
#[derive(Debug)]
pub struct NetworkActivity {
    state: Mutex<ActivityState>,
}

impl Default for NetworkActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkActivity {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ActivityState {
                inflight: HashSet::new(),
                last_activity: Instant::now(),
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ActivityState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// A request was sent. Redirects reuse the id and count once.
    pub fn request_started(&self, request_id: &str) {
        self.with_state(|s| {
            s.inflight.insert(request_id.to_string());
            s.last_activity = Instant::now();
        });
    }

    /// A request finished loading or failed.
    pub fn request_finished(&self, request_id: &str) {
        self.with_state(|s| {
            s.inflight.remove(request_id);
            s.last_activity = Instant::now();
        });
    }

    /// Restart the quiet window without touching the open requests.
    pub fn touch(&self) {
        self.with_state(|s| s.last_activity = Instant::now());
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        self.with_state(|s| NetworkSnapshot {
            inflight: s.inflight.len(),
            since_last_activity: s.last_activity.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(inflight: usize, quiet_ms: u64) -> NetworkSnapshot {
        NetworkSnapshot {
            inflight,
            since_last_activity: Duration::from_millis(quiet_ms),
        }
    }

    #[test]
    fn quiet_needs_no_open_requests_and_a_full_window() {
        let window = NETWORK_QUIET_WINDOW;
        assert!(is_snapshot_quiet(&snapshot(0, 500), window, MAX_INFLIGHT));
        assert!(is_snapshot_quiet(&snapshot(0, 2_000), window, MAX_INFLIGHT));
        assert!(!is_snapshot_quiet(&snapshot(0, 499), window, MAX_INFLIGHT));
        // A long-polling request keeps the page busy however long it is silent
        assert!(!is_snapshot_quiet(&snapshot(1, 10_000), window, MAX_INFLIGHT));
        assert!(is_snapshot_quiet(&snapshot(2, 600), window, 2));
    }

    #[test]
    fn tracks_requests_by_id() {
        let activity = NetworkActivity::new();
        activity.request_started("1");
        activity.request_started("2");
        // Redirect hop of request 1
        activity.request_started("1");
        assert_eq!(activity.snapshot().inflight, 2);

        activity.request_finished("1");
        activity.request_finished("unknown");
        assert_eq!(activity.snapshot().inflight, 1);
        activity.request_finished("2");
        assert_eq!(activity.snapshot().inflight, 0);
    }

    #[test]
    fn activity_restarts_the_quiet_window() {
        let activity = NetworkActivity::new();
        std::thread::sleep(Duration::from_millis(30));
        assert!(activity.snapshot().since_last_activity >= Duration::from_millis(30));

        activity.touch();
        assert!(activity.snapshot().since_last_activity < Duration::from_millis(30));

        std::thread::sleep(Duration::from_millis(30));
        activity.request_finished("late");
        let snap = activity.snapshot();
        assert_eq!(snap.inflight, 0);
        assert!(!is_snapshot_quiet(&snap, Duration::from_millis(30), MAX_INFLIGHT));
    }
}
