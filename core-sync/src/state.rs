//! # Sync State Store
//!
//! Holds exactly one [`SyncState`] value and a single-writer
//! read-modify-publish primitive.
//!
//! ## Overview
//!
//! Every mutation of the sync state goes through [`StateStore::update`],
//! which reads the latest value, computes its replacement, and publishes it
//! under one writer lock. This is the engine's entire concurrency control:
//! interleaved async operations cannot silently discard each other's
//! changes because no mutation ever derives a new state from a captured,
//! possibly stale copy.
//!
//! Subscribers observe snapshots through a `tokio::sync::watch` channel
//! with latest-value semantics; snapshots are totally ordered by publish
//! time. A disposed guard prevents any publish after the owning engine has
//! been torn down, which is how results of in-flight operations arriving
//! after teardown are discarded.

use core_library::{BookList, DisplayItem, Shelf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// Payload of the steady [`SyncState::Loaded`] state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedState {
    /// All shelves, ordered by display order
    pub shelves: Vec<Shelf>,
    /// The user's curated lists (metadata only)
    pub book_lists: Vec<BookList>,
    /// UI hint that a refresh is in progress; not a lock
    pub is_refreshing: bool,
    /// The currently displayed list, if any
    pub selected_list_url: Option<String>,
    /// Resolved items of the selected list
    pub list_items: Vec<DisplayItem>,
    /// Whether the selected list's items are being resolved
    pub is_loading_list_items: bool,
}

impl LoadedState {
    /// Look up a shelf by key.
    pub fn shelf(&self, key: &str) -> Option<&Shelf> {
        self.shelves.iter().find(|s| s.key == key)
    }

    /// The shelf currently holding a work, if any.
    pub fn shelf_of_work(&self, work_id: &str) -> Option<&Shelf> {
        self.shelves.iter().find(|s| s.contains_work(work_id))
    }
}

/// The synchronization state machine.
///
/// `Loaded` persists across refreshes (a refresh flips `is_refreshing` on
/// the same variant instead of reverting to `Loading`), so the UI never
/// loses previously shown data. `Error` is reachable only when there is no
/// prior data to preserve or a user-invoked mutation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum SyncState {
    /// Nothing loaded yet
    Initial,
    /// First load in progress, no data to show
    Loading,
    /// The steady state
    Loaded(LoadedState),
    /// Load failed with no prior data to fall back on
    Error { message: String },
}

impl SyncState {
    /// The loaded payload, if this is the steady state.
    pub fn as_loaded(&self) -> Option<&LoadedState> {
        match self {
            SyncState::Loaded(loaded) => Some(loaded),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, SyncState::Loaded(_))
    }

    /// Short variant name for logging.
    pub fn variant_name(&self) -> &'static str {
        match self {
            SyncState::Initial => "initial",
            SyncState::Loading => "loading",
            SyncState::Loaded(_) => "loaded",
            SyncState::Error { .. } => "error",
        }
    }
}

/// Single-snapshot state container with a single-writer publish primitive.
pub struct StateStore {
    /// Serializes every read-modify-publish cycle
    writer: Mutex<()>,
    sender: watch::Sender<SyncState>,
    disposed: AtomicBool,
}

impl StateStore {
    /// Create a store holding [`SyncState::Initial`].
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SyncState::Initial);
        Self {
            writer: Mutex::new(()),
            sender,
            disposed: AtomicBool::new(false),
        }
    }

    /// The latest published snapshot.
    pub fn current(&self) -> SyncState {
        self.sender.borrow().clone()
    }

    /// Subscribe to published snapshots (latest-value semantics).
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.sender.subscribe()
    }

    /// Replace the state unconditionally.
    ///
    /// Returns `false` when the store is disposed and the write was
    /// discarded.
    pub fn publish(&self, next: SyncState) -> bool {
        self.update(|_| Some(next))
    }

    /// Read-modify-publish under the writer lock.
    ///
    /// `f` receives the latest value and returns the replacement, or
    /// `None` to leave the state untouched (no notification is sent).
    /// Returns whether a new state was published.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&SyncState) -> Option<SyncState>,
    {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if self.disposed.load(Ordering::SeqCst) {
            debug!("discarding state write after dispose");
            return false;
        }
        let next = {
            let current = self.sender.borrow();
            f(&current)
        };
        match next {
            Some(state) => {
                debug!(state = state.variant_name(), "publishing sync state");
                self.sender.send_replace(state);
                true
            }
            None => false,
        }
    }

    /// Mark the store torn down. All later writes are discarded.
    pub fn dispose(&self) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &self.current().variant_name())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::Shelf;

    fn loaded_with_shelf(key: &str) -> SyncState {
        SyncState::Loaded(LoadedState {
            shelves: vec![Shelf {
                key: key.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn starts_initial() {
        let store = StateStore::new();
        assert_eq!(store.current(), SyncState::Initial);
    }

    #[tokio::test]
    async fn publish_notifies_subscribers() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        assert!(store.publish(SyncState::Loading));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SyncState::Loading);
    }

    #[tokio::test]
    async fn update_reads_latest_value() {
        let store = StateStore::new();
        store.publish(loaded_with_shelf("reading"));

        let applied = store.update(|current| {
            let loaded = current.as_loaded()?;
            let mut next = loaded.clone();
            next.is_refreshing = true;
            Some(SyncState::Loaded(next))
        });
        assert!(applied);

        let loaded = store.current().as_loaded().cloned().unwrap();
        assert!(loaded.is_refreshing);
        assert_eq!(loaded.shelves[0].key, "reading");
    }

    #[tokio::test]
    async fn update_returning_none_is_a_no_op() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        let applied = store.update(|current| current.as_loaded().map(|_| SyncState::Loading));
        assert!(!applied);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.current(), SyncState::Initial);
    }

    #[tokio::test]
    async fn disposed_store_discards_writes() {
        let store = StateStore::new();
        store.publish(SyncState::Loading);
        store.dispose();

        assert!(!store.publish(loaded_with_shelf("reading")));
        assert_eq!(store.current(), SyncState::Loading);
        assert!(store.is_disposed());
    }

    #[tokio::test]
    async fn snapshots_are_ordered_by_publish_time() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        store.publish(SyncState::Loading);
        store.publish(loaded_with_shelf("read"));

        // Latest-value semantics: the subscriber observes the newest state
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_loaded());
    }

    #[test]
    fn state_serialization() {
        let state = loaded_with_shelf("reading");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("reading"));

        let deserialized: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, state);
    }

    #[test]
    fn shelf_lookup_helpers() {
        let mut loaded = LoadedState::default();
        let mut shelf = Shelf {
            key: "to-read".to_string(),
            ..Default::default()
        };
        shelf.books.push(core_library::Book {
            work_id: "W1".to_string(),
            ..Default::default()
        });
        loaded.shelves.push(shelf);

        assert!(loaded.shelf("to-read").is_some());
        assert!(loaded.shelf("read").is_none());
        assert_eq!(loaded.shelf_of_work("W1").unwrap().key, "to-read");
        assert!(loaded.shelf_of_work("W2").is_none());
    }
}
