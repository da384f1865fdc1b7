//! # Refresh Coalescing Queue
//!
//! Bookkeeping for per-shelf refresh requests.
//!
//! ## Overview
//!
//! At most one refresh is in flight per shelf key at a time. A request for
//! a key that is already in flight is appended to a pending FIFO
//! (deduplicated by key) instead of issuing a second concurrent fetch. A
//! debounce timer drains the queue one key per tick and re-arms while keys
//! remain, which bounds request fan-out during bursts (rapid tab
//! switching) while guaranteeing every distinct request eventually
//! executes at least once.
//!
//! This type is the pure state machine: a set for dedup, a FIFO for order,
//! an in-flight set, and a timer-armed flag. The engine owns the actual
//! timer tasks and fetch dispatch, driving this queue through
//! [`request`](RefreshQueue::request), [`drain_tick`](RefreshQueue::drain_tick),
//! and [`complete`](RefreshQueue::complete).

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// Decision returned by [`RefreshQueue::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The key is not in flight; the caller must dispatch the fetch now.
    Dispatch,
    /// The key is in flight and was queued. When `arm_timer` is set the
    /// caller must start the debounce timer; otherwise one is already
    /// running.
    Queued { arm_timer: bool },
    /// The key is in flight and already queued; nothing to do.
    AlreadyPending,
}

/// Result of one debounce tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainTick {
    /// The key to re-request, if any was pending.
    pub dispatch: Option<String>,
    /// Whether further keys remain and the timer must re-arm.
    pub rearm: bool,
}

#[derive(Debug, Default)]
struct QueueInner {
    /// Keys awaiting dispatch, oldest first
    pending: VecDeque<String>,
    /// Mirror of `pending` for O(1) dedup
    queued: HashSet<String>,
    /// Keys with a fetch currently in flight
    in_flight: HashSet<String>,
    /// Whether a debounce timer is currently scheduled
    timer_armed: bool,
}

/// Coalescing queue for per-shelf refresh requests.
#[derive(Debug, Default)]
pub struct RefreshQueue {
    inner: Mutex<QueueInner>,
}

impl RefreshQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a refresh request for `key` and decide what the caller does.
    pub fn request(&self, key: &str) -> RequestOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.in_flight.contains(key) {
            if inner.queued.contains(key) {
                debug!(key, "refresh already pending, coalescing");
                return RequestOutcome::AlreadyPending;
            }
            inner.queued.insert(key.to_string());
            inner.pending.push_back(key.to_string());
            let arm_timer = !inner.timer_armed;
            if arm_timer {
                inner.timer_armed = true;
            }
            debug!(key, arm_timer, "refresh in flight, queued");
            return RequestOutcome::Queued { arm_timer };
        }

        // Dispatching now supersedes any stale queued copy of the key.
        if inner.queued.remove(key) {
            inner.pending.retain(|k| k != key);
        }
        inner.in_flight.insert(key.to_string());
        RequestOutcome::Dispatch
    }

    /// Pop the next pending key after a debounce delay.
    ///
    /// The popped key must be fed back through [`request`](Self::request):
    /// if its fetch is still in flight it re-queues, otherwise it
    /// dispatches. `rearm` reports whether more keys remain.
    pub fn drain_tick(&self) -> DrainTick {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let dispatch = inner.pending.pop_front();
        if let Some(key) = &dispatch {
            inner.queued.remove(key);
        }
        let rearm = !inner.pending.is_empty();
        inner.timer_armed = rearm;
        DrainTick { dispatch, rearm }
    }

    /// Release a key whose fetch finished (successfully or not).
    pub fn complete(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.in_flight.remove(key);
    }

    /// Whether a fetch for `key` is currently in flight.
    pub fn is_in_flight(&self, key: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.in_flight.contains(key)
    }

    /// Number of keys awaiting dispatch.
    pub fn pending_len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_dispatches() {
        let queue = RefreshQueue::new();
        assert_eq!(queue.request("reading"), RequestOutcome::Dispatch);
        assert!(queue.is_in_flight("reading"));
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn concurrent_request_is_queued_once() {
        let queue = RefreshQueue::new();
        assert_eq!(queue.request("reading"), RequestOutcome::Dispatch);

        assert_eq!(
            queue.request("reading"),
            RequestOutcome::Queued { arm_timer: true }
        );
        // Third and later requests coalesce into the queued one
        assert_eq!(queue.request("reading"), RequestOutcome::AlreadyPending);
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn independent_keys_do_not_coalesce() {
        let queue = RefreshQueue::new();
        assert_eq!(queue.request("reading"), RequestOutcome::Dispatch);
        assert_eq!(queue.request("to-read"), RequestOutcome::Dispatch);
        assert!(queue.is_in_flight("reading"));
        assert!(queue.is_in_flight("to-read"));
    }

    #[test]
    fn timer_arms_only_once() {
        let queue = RefreshQueue::new();
        queue.request("a");
        queue.request("b");

        assert_eq!(queue.request("a"), RequestOutcome::Queued { arm_timer: true });
        assert_eq!(queue.request("b"), RequestOutcome::Queued { arm_timer: false });
    }

    #[test]
    fn drain_preserves_fifo_order() {
        let queue = RefreshQueue::new();
        queue.request("a");
        queue.request("b");
        queue.request("a");
        queue.request("b");

        let tick = queue.drain_tick();
        assert_eq!(tick.dispatch.as_deref(), Some("a"));
        assert!(tick.rearm);

        let tick = queue.drain_tick();
        assert_eq!(tick.dispatch.as_deref(), Some("b"));
        assert!(!tick.rearm);

        let tick = queue.drain_tick();
        assert_eq!(tick.dispatch, None);
        assert!(!tick.rearm);
    }

    #[test]
    fn drained_key_still_in_flight_requeues() {
        let queue = RefreshQueue::new();
        queue.request("a");
        queue.request("a");

        let tick = queue.drain_tick();
        assert_eq!(tick.dispatch.as_deref(), Some("a"));

        // Fetch has not completed yet, so the re-request queues again
        assert_eq!(
            queue.request("a"),
            RequestOutcome::Queued { arm_timer: true }
        );
    }

    #[test]
    fn completed_key_dispatches_on_drain() {
        let queue = RefreshQueue::new();
        queue.request("a");
        queue.request("a");
        queue.complete("a");

        let tick = queue.drain_tick();
        assert_eq!(tick.dispatch.as_deref(), Some("a"));
        assert_eq!(queue.request("a"), RequestOutcome::Dispatch);
    }

    #[test]
    fn dispatch_supersedes_stale_queued_copy() {
        let queue = RefreshQueue::new();
        queue.request("a");
        queue.request("a");
        queue.complete("a");

        // New user request arrives before the timer fires; the queued copy
        // must not cause a redundant second fetch afterwards.
        assert_eq!(queue.request("a"), RequestOutcome::Dispatch);
        assert_eq!(queue.pending_len(), 0);
    }
}
