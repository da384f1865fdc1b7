//! # Sync Engine
//!
//! Orchestrates shelf and list synchronization against the remote library
//! service.
//!
//! ## Overview
//!
//! The `SyncEngine` is the public-facing component of the sync module. It
//! coordinates between the collaborators to:
//! - Load shelves and curated lists, serving stale data while revalidating
//! - Progressively reveal shelves on the first forced load after login
//! - Apply optimistic mutations (move/remove/sort) after remote confirmation
//! - Coalesce per-shelf refresh bursts through the `RefreshQueue`
//! - Run background redirect-repair and orphan-cleanup passes
//! - React to externally-owned authentication transitions
//!
//! ## State rules
//!
//! Every mutation derives its replacement from the latest store value via
//! [`StateStore::update`], never from a copy captured earlier; this is the
//! engine's entire concurrency control. `Loaded` is never demoted to
//! `Error` by a load or refresh failure once good data exists, and
//! authentication failures never surface as `Error` at all.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<SyncEngine>) {
//! let _listener = engine.spawn_auth_listener();
//! engine.initialize().await;
//!
//! let mut states = engine.subscribe();
//! while states.changed().await.is_ok() {
//!     println!("sync state: {:?}", states.borrow().variant_name());
//! }
//! # }
//! ```

use bridge_traits::{
    Clock, ListService, SettingsStore, ShelfStore, ShelfTarget, WorkResolver,
};
use core_auth::{AuthState, AuthStateSource};
use core_library::{Book, BookList, Loan, Shelf, ShelfSort};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::redirect::RedirectResolver;
use crate::scheduler::{RefreshQueue, RequestOutcome};
use crate::state::{LoadedState, StateStore, SyncState};

/// Preference key holding the currently selected list URL.
pub const SELECTED_LIST_KEY: &str = "shelves.selected_list_url";

/// Prefix of per-book display-adjustment preference keys. The suffix is the
/// edition id; records whose edition is no longer on any shelf are removed
/// by the orphan cleanup pass.
pub const BOOK_DISPLAY_PREFIX: &str = "book_display.";

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Age beyond which a shelf is considered stale
    pub staleness_threshold: Duration,

    /// Delay before the refresh queue drains one pending key
    pub refresh_debounce: Duration,

    /// Retries for a forced load that fails with no data to fall back on.
    /// The first request after a credential exchange races the server's
    /// session propagation, so one retry is usually enough.
    pub post_login_retry_attempts: u32,

    /// Delay before each post-login retry
    pub post_login_retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::from_secs(5 * 60),
            refresh_debounce: Duration::from_millis(200),
            post_login_retry_attempts: 1,
            post_login_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Orchestrator for shelf and list synchronization.
pub struct SyncEngine {
    /// Configuration
    config: SyncConfig,

    /// Shelf data access
    shelf_store: Arc<dyn ShelfStore>,

    /// Curated list access
    list_service: Arc<dyn ListService>,

    /// Preference storage
    settings: Arc<dyn SettingsStore>,

    /// Injectable time source
    clock: Arc<dyn Clock>,

    /// Externally-owned authentication state
    auth: Arc<AuthStateSource>,

    /// The single sync state snapshot
    store: Arc<StateStore>,

    /// Per-shelf refresh coalescing
    refresh_queue: Arc<RefreshQueue>,

    /// Background redirect repair
    resolver: Arc<RedirectResolver>,

    /// Current loans keyed by edition id
    loans: Arc<RwLock<HashMap<String, Loan>>>,

    /// Guard against re-entrant auth transition handling
    auth_handling: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Create a new sync engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration
    /// * `shelf_store` - Shelf data collaborator
    /// * `list_service` - Curated list collaborator
    /// * `work_resolver` - Work-redirect resolution collaborator
    /// * `settings` - Preference storage
    /// * `clock` - Time source
    /// * `auth` - Authentication state source to observe
    pub fn new(
        config: SyncConfig,
        shelf_store: Arc<dyn ShelfStore>,
        list_service: Arc<dyn ListService>,
        work_resolver: Arc<dyn WorkResolver>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        auth: Arc<AuthStateSource>,
    ) -> Self {
        let store = Arc::new(StateStore::new());
        let resolver = Arc::new(RedirectResolver::new(
            Arc::clone(&shelf_store),
            work_resolver,
            Arc::clone(&store),
        ));

        Self {
            config,
            shelf_store,
            list_service,
            settings,
            clock,
            auth,
            store,
            refresh_queue: Arc::new(RefreshQueue::new()),
            resolver,
            loans: Arc::new(RwLock::new(HashMap::new())),
            auth_handling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The latest published sync state.
    pub fn state(&self) -> SyncState {
        self.store.current()
    }

    /// Subscribe to sync state snapshots (latest-value semantics).
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.store.subscribe()
    }

    /// Current loans keyed by edition id.
    pub async fn current_loans(&self) -> HashMap<String, Loan> {
        self.loans.read().await.clone()
    }

    /// Tear down the engine. Results of still-running operations are
    /// discarded by the state store's disposed guard.
    pub fn dispose(&self) {
        self.store.dispose();
    }

    /// Clone for background task (avoids Arc<Arc<...>>)
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            shelf_store: Arc::clone(&self.shelf_store),
            list_service: Arc::clone(&self.list_service),
            settings: Arc::clone(&self.settings),
            clock: Arc::clone(&self.clock),
            auth: Arc::clone(&self.auth),
            store: Arc::clone(&self.store),
            refresh_queue: Arc::clone(&self.refresh_queue),
            resolver: Arc::clone(&self.resolver),
            loans: Arc::clone(&self.loans),
            auth_handling: Arc::clone(&self.auth_handling),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Initialize the engine: load shelves and loans concurrently, then
    /// schedule the background redirect-repair and orphan-cleanup passes.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        info!("initializing shelf sync engine");
        tokio::join!(self.load_shelves(false), self.refresh_loans(false));

        let engine = self.clone_for_task();
        tokio::spawn(async move {
            engine.resolver.run_pass().await;
        });

        let engine = self.clone_for_task();
        tokio::spawn(async move {
            engine.cleanup_orphaned_book_settings().await;
        });
    }

    /// Consume auth transitions on a dedicated task.
    ///
    /// Transitions are processed one at a time, outside the notification
    /// itself, so a handler-triggered state change can never be observed
    /// mid-notification by this listener.
    pub fn spawn_auth_listener(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.auth.subscribe();
        let engine = self.clone_for_task();
        tokio::spawn(async move {
            let mut previous = *rx.borrow();
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                if engine.store.is_disposed() {
                    break;
                }
                let next = *rx.borrow_and_update();
                engine.handle_auth_transition(previous, next).await;
                previous = next;
            }
        })
    }

    async fn handle_auth_transition(&self, previous: AuthState, next: AuthState) {
        if self.auth_handling.swap(true, Ordering::SeqCst) {
            // The listener task is a single consumer; this guard is for
            // host code that calls the handler directly.
            debug!("auth transition handler busy, dropping transition");
            return;
        }
        debug!(from = %previous, to = %next, "handling auth transition");

        match next {
            AuthState::Authenticated if !previous.is_authenticated() => {
                if !self.store.current().is_loaded() {
                    self.load_shelves(true).await;
                }
            }
            AuthState::Unauthenticated => {
                info!("signed out, resetting sync state");
                self.shelf_store.clear_cache().await;
                self.loans.write().await.clear();
                self.store.publish(SyncState::Initial);
            }
            _ => {}
        }

        self.auth_handling.store(false, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Loading & refreshing
    // ------------------------------------------------------------------

    /// Load shelves and (when not already cached) lists.
    ///
    /// With existing data the current `Loaded` state is re-emitted with
    /// `is_refreshing` set before the fetch (stale-while-revalidate). A
    /// forced load with no existing data takes the progressive path so the
    /// user sees shelves appear one at a time instead of a blank spinner.
    #[instrument(skip(self))]
    pub async fn load_shelves(&self, force_refresh: bool) {
        if !self.auth.current().is_authenticated() {
            debug!("not authenticated, skipping shelf load");
            return;
        }

        let had_loaded = self.store.current().is_loaded();
        if had_loaded {
            self.store.update(|latest| {
                let loaded = latest.as_loaded()?;
                let mut next = loaded.clone();
                next.is_refreshing = true;
                Some(SyncState::Loaded(next))
            });
        } else {
            self.store.publish(SyncState::Loading);
        }

        if force_refresh && !had_loaded {
            self.progressive_load().await;
            return;
        }

        let lists_cached = self
            .store
            .current()
            .as_loaded()
            .map(|l| !l.book_lists.is_empty())
            .unwrap_or(false);

        let (shelves_res, lists_res) = if lists_cached {
            (self.shelf_store.get_shelves(force_refresh).await, None)
        } else {
            let (shelves, lists) = tokio::join!(
                self.shelf_store.get_shelves(force_refresh),
                self.list_service.get_book_lists()
            );
            (shelves, Some(lists))
        };

        match shelves_res {
            Ok(shelves) => {
                let lists_reloaded = matches!(&lists_res, Some(Ok(_)));
                let fresh_lists = match lists_res {
                    Some(Ok(lists)) => Some(lists),
                    Some(Err(e)) => {
                        warn!(error = %e, "list fetch failed, keeping cached lists");
                        None
                    }
                    None => None,
                };
                self.publish_loaded(shelves, fresh_lists);
                if lists_reloaded {
                    self.restore_list_selection().await;
                }
            }
            Err(e) => self.handle_load_failure(e.into(), had_loaded),
        }
    }

    /// Refresh shelves, lists, and loans concurrently.
    #[instrument(skip(self))]
    pub async fn refresh_shelves(&self) {
        if !self.auth.current().is_authenticated() {
            debug!("not authenticated, skipping refresh");
            return;
        }

        let had_loaded = self.store.current().is_loaded();
        if had_loaded {
            self.store.update(|latest| {
                let loaded = latest.as_loaded()?;
                let mut next = loaded.clone();
                next.is_refreshing = true;
                Some(SyncState::Loaded(next))
            });
        } else {
            self.store.publish(SyncState::Loading);
        }

        let (shelves_res, lists_res, loans_res) = tokio::join!(
            self.shelf_store.get_shelves(true),
            self.list_service.get_book_lists(),
            self.shelf_store.get_user_loans(true)
        );

        match loans_res {
            Ok(loans) => *self.loans.write().await = loans,
            // Loan refresh is background work and never surfaces
            Err(e) => debug!(error = %e, "loan refresh failed"),
        }

        match shelves_res {
            Ok(shelves) => {
                let fresh_lists = match lists_res {
                    Ok(lists) => Some(lists),
                    Err(e) => {
                        warn!(error = %e, "list fetch failed, keeping cached lists");
                        None
                    }
                };
                let lists_reloaded = fresh_lists.is_some();
                self.publish_loaded(shelves, fresh_lists);
                if lists_reloaded {
                    self.restore_list_selection().await;
                }
            }
            Err(e) => self.handle_load_failure(e.into(), had_loaded),
        }
    }

    /// Refresh one shelf, coalescing concurrent requests per key.
    #[instrument(skip(self))]
    pub async fn refresh_shelf(&self, key: &str) {
        match self.refresh_queue.request(key) {
            RequestOutcome::Dispatch => self.do_refresh_shelf(key).await,
            RequestOutcome::Queued { arm_timer } => {
                debug!(key, "refresh coalesced behind in-flight fetch");
                if arm_timer {
                    self.spawn_drain_timer();
                }
            }
            RequestOutcome::AlreadyPending => debug!(key, "refresh already pending"),
        }
    }

    /// Refresh one shelf only if its data is older than the staleness
    /// threshold.
    pub async fn refresh_shelf_if_stale(&self, key: &str) {
        let Some(shelf) = self
            .store
            .current()
            .as_loaded()
            .and_then(|l| l.shelf(key).cloned())
        else {
            return;
        };
        let threshold = chrono::Duration::from_std(self.config.staleness_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        if shelf.is_stale(threshold, self.clock.now()) {
            self.refresh_shelf(key).await;
        } else {
            debug!(key, "shelf is fresh, skipping refresh");
        }
    }

    /// Run a redirect-repair pass over the current snapshot.
    pub async fn run_redirect_pass(&self) -> usize {
        self.resolver.run_pass().await
    }

    async fn do_refresh_shelf(&self, key: &str) {
        self.store.update(|latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            next.is_refreshing = true;
            Some(SyncState::Loaded(next))
        });

        let result = self.fetch_full_shelf(key, true).await;
        self.refresh_queue.complete(key);

        match result {
            Ok(shelf) => {
                self.store.update(move |latest| {
                    let loaded = latest.as_loaded()?;
                    let mut next = loaded.clone();
                    next.is_refreshing = false;
                    match next.shelves.iter_mut().find(|s| s.key == shelf.key) {
                        Some(slot) => *slot = shelf,
                        None => next.shelves.push(shelf),
                    }
                    Some(SyncState::Loaded(next))
                });

                // Refreshed data may expose redirected works
                let engine = self.clone_for_task();
                tokio::spawn(async move {
                    engine.resolver.run_pass().await;
                });
            }
            Err(e) => {
                if e.is_auth_failure() {
                    debug!(key, error = %e, "shelf refresh rejected: not authenticated");
                } else {
                    warn!(key, error = %e, "shelf refresh failed, keeping cached entry");
                }
                self.store.update(|latest| {
                    let loaded = latest.as_loaded()?;
                    let mut next = loaded.clone();
                    next.is_refreshing = false;
                    Some(SyncState::Loaded(next))
                });
            }
        }
    }

    fn spawn_drain_timer(&self) {
        let engine = self.clone_for_task();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.refresh_debounce).await;
            engine.drain_refresh_queue().await;
        });
    }

    async fn drain_refresh_queue(&self) {
        if self.store.is_disposed() {
            return;
        }
        let tick = self.refresh_queue.drain_tick();
        if tick.rearm {
            self.spawn_drain_timer();
        }
        let Some(key) = tick.dispatch else {
            return;
        };
        match self.refresh_queue.request(&key) {
            RequestOutcome::Dispatch => self.do_refresh_shelf(&key).await,
            RequestOutcome::Queued { arm_timer } => {
                if arm_timer {
                    self.spawn_drain_timer();
                }
            }
            RequestOutcome::AlreadyPending => {}
        }
    }

    // ------------------------------------------------------------------
    // Progressive load
    // ------------------------------------------------------------------

    /// Forced load with no cached data: reveal shelves one at a time.
    async fn progressive_load(&self) {
        let mut attempt = 0;
        loop {
            match self.progressive_pass().await {
                Ok(()) => return,
                Err(e) if e.is_auth_failure() => {
                    debug!(error = %e, "progressive load rejected: not authenticated");
                    self.store.publish(SyncState::Initial);
                    return;
                }
                Err(e) => {
                    if attempt < self.config.post_login_retry_attempts {
                        attempt += 1;
                        info!(error = %e, attempt, "forced load failed, retrying after delay");
                        tokio::time::sleep(self.config.post_login_retry_delay).await;
                        continue;
                    }
                    warn!(error = %e, "progressive load failed");
                    self.store.publish(SyncState::Error {
                        message: e.to_string(),
                    });
                    return;
                }
            }
        }
    }

    async fn progressive_pass(&self) -> Result<()> {
        let keys = self.shelf_store.get_configured_shelf_keys().await?;

        // Lists load concurrently with the shelf loop and merge into the
        // final emission.
        let list_service = Arc::clone(&self.list_service);
        let lists_task = tokio::spawn(async move { list_service.get_book_lists().await });

        let had_keys = !keys.is_empty();
        let mut shelves: Vec<Shelf> = Vec::new();
        let mut last_err: Option<SyncError> = None;

        for key in keys {
            match self.fetch_full_shelf(&key, true).await {
                Ok(shelf) => {
                    shelves.push(shelf);
                    let partial = shelves.clone();
                    self.store.update(move |_latest| {
                        Some(SyncState::Loaded(LoadedState {
                            shelves: partial,
                            is_refreshing: true,
                            ..Default::default()
                        }))
                    });
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    warn!(key = %key, error = %e, "shelf fetch failed during progressive load");
                    last_err = Some(e);
                }
            }
        }

        if had_keys && shelves.is_empty() {
            return Err(last_err
                .unwrap_or_else(|| SyncError::Task("all shelf fetches failed".to_string())));
        }

        let lists = match lists_task.await {
            Ok(Ok(lists)) => lists,
            Ok(Err(e)) => {
                warn!(error = %e, "list fetch failed during progressive load");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "list fetch task failed");
                Vec::new()
            }
        };

        let lists_loaded = !lists.is_empty();
        self.store.update(move |_latest| {
            Some(SyncState::Loaded(LoadedState {
                shelves,
                book_lists: lists,
                is_refreshing: false,
                ..Default::default()
            }))
        });
        if lists_loaded {
            self.restore_list_selection().await;
        }
        Ok(())
    }

    /// Fetch every page of a shelf before constructing its value.
    async fn fetch_full_shelf(&self, key: &str, force_refresh: bool) -> Result<Shelf> {
        let page = self
            .shelf_store
            .get_shelf_page(key, None, force_refresh)
            .await?;
        let mut shelf = page.shelf;
        let mut cursor = page.next_cursor;

        while let Some(next) = cursor {
            if shelf.total_count > 0 && shelf.books.len() >= shelf.total_count {
                break;
            }
            let page = self
                .shelf_store
                .get_shelf_page(key, Some(next), force_refresh)
                .await?;
            if page.shelf.books.is_empty() {
                break;
            }
            shelf.books.extend(page.shelf.books);
            cursor = page.next_cursor;
        }

        if shelf.books.len() != shelf.total_count {
            debug!(
                key,
                fetched = shelf.books.len(),
                reported = shelf.total_count,
                "server total disagrees with fetched count"
            );
            shelf.total_count = shelf.books.len();
        }
        shelf.last_synced_at = Some(self.clock.now());
        Ok(shelf)
    }

    /// Replace `Loaded` with fresh shelves, carrying over the list
    /// selection slot (and cached lists when no fresh ones arrived).
    fn publish_loaded(&self, shelves: Vec<Shelf>, fresh_lists: Option<Vec<BookList>>) {
        let now = self.clock.now();
        self.store.update(move |latest| {
            let prior = latest.as_loaded();
            let mut shelves = shelves;
            for shelf in shelves.iter_mut() {
                if shelf.last_synced_at.is_none() {
                    shelf.last_synced_at = Some(now);
                }
            }
            Some(SyncState::Loaded(LoadedState {
                shelves,
                book_lists: fresh_lists
                    .or_else(|| prior.map(|p| p.book_lists.clone()))
                    .unwrap_or_default(),
                is_refreshing: false,
                selected_list_url: prior.and_then(|p| p.selected_list_url.clone()),
                list_items: prior.map(|p| p.list_items.clone()).unwrap_or_default(),
                is_loading_list_items: prior.map(|p| p.is_loading_list_items).unwrap_or(false),
            }))
        });
    }

    fn handle_load_failure(&self, err: SyncError, had_loaded: bool) {
        if err.is_auth_failure() {
            // The auth layer owns recovery; never show an error for this
            debug!(error = %err, "shelf load rejected: not authenticated");
            if had_loaded {
                self.clear_refreshing_flag();
            } else {
                self.store.publish(SyncState::Initial);
            }
            return;
        }

        warn!(error = %err, "shelf load failed");
        if had_loaded {
            // Never replace good data with an error
            self.clear_refreshing_flag();
        } else {
            self.store.publish(SyncState::Error {
                message: err.to_string(),
            });
        }
    }

    fn clear_refreshing_flag(&self) {
        self.store.update(|latest| {
            let loaded = latest.as_loaded()?;
            if !loaded.is_refreshing {
                return None;
            }
            let mut next = loaded.clone();
            next.is_refreshing = false;
            Some(SyncState::Loaded(next))
        });
    }

    async fn refresh_loans(&self, force_refresh: bool) {
        match self.shelf_store.get_user_loans(force_refresh).await {
            Ok(loans) => {
                debug!(count = loans.len(), "loans refreshed");
                *self.loans.write().await = loans;
            }
            // Loan refresh is background work and never surfaces
            Err(e) => debug!(error = %e, "loan refresh failed"),
        }
    }

    // ------------------------------------------------------------------
    // Shelf mutations
    // ------------------------------------------------------------------

    /// Move a book onto a shelf (or off every shelf).
    ///
    /// The remote call is awaited first; the local transaction then
    /// removes the work from every other shelf and replaces or appends it
    /// on the target, enforcing the one-shelf-per-work invariant against a
    /// single state value. Returns whether the move succeeded.
    #[instrument(skip(self, book), fields(work_id = %book.work_id, target = %target))]
    pub async fn move_book_to_shelf(&self, book: &Book, target: ShelfTarget) -> bool {
        if let Err(e) = self.shelf_store.set_book_shelf(book, &target).await {
            self.report_mutation_failure("move book", e);
            return false;
        }

        let target_key = target.key().map(str::to_string);
        let book = book.clone();
        self.store.update(move |latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            for shelf in next.shelves.iter_mut() {
                if Some(shelf.key.as_str()) == target_key.as_deref() {
                    match shelf.books.iter().position(|b| b.work_id == book.work_id) {
                        // Edition changed while keeping the work: replace
                        // in place, order preserved
                        Some(pos) => shelf.books[pos] = book.clone(),
                        None => {
                            shelf.books.push(book.clone());
                            shelf.total_count += 1;
                            shelf.resort();
                        }
                    }
                } else if let Some(pos) =
                    shelf.books.iter().position(|b| b.work_id == book.work_id)
                {
                    shelf.books.remove(pos);
                    shelf.total_count = shelf.total_count.saturating_sub(1);
                }
            }
            Some(SyncState::Loaded(next))
        });
        true
    }

    /// Remove a book from the named shelf.
    #[instrument(skip(self, book), fields(work_id = %book.work_id, key))]
    pub async fn remove_book_from_shelf(&self, book: &Book, key: &str) {
        if let Err(e) = self.shelf_store.remove_book_from_shelf(book, key).await {
            self.report_mutation_failure("remove book", e);
            return;
        }

        let work_id = book.work_id.clone();
        let key = key.to_string();
        self.store.update(move |latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            let shelf = next.shelves.iter_mut().find(|s| s.key == key)?;
            let pos = shelf.books.iter().position(|b| b.work_id == work_id)?;
            shelf.books.remove(pos);
            shelf.total_count = shelf.total_count.saturating_sub(1);
            Some(SyncState::Loaded(next))
        });
    }

    /// Change a shelf's sort configuration.
    #[instrument(skip(self))]
    pub async fn update_shelf_sort(&self, key: &str, sort: ShelfSort) {
        if let Err(e) = self.shelf_store.update_shelf_sort(key, sort).await {
            self.report_mutation_failure("update sort", e);
            return;
        }

        let key = key.to_string();
        self.store.update(move |latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            let shelf = next.shelves.iter_mut().find(|s| s.key == key)?;
            shelf.sort = sort;
            shelf.resort();
            Some(SyncState::Loaded(next))
        });
    }

    /// Show or hide a shelf.
    #[instrument(skip(self))]
    pub async fn set_shelf_visibility(&self, key: &str, visible: bool) {
        let updated = match self.shelf_store.update_shelf_visibility(key, visible).await {
            Ok(shelf) => shelf,
            Err(e) => {
                self.report_mutation_failure("update visibility", e);
                return;
            }
        };

        let key = key.to_string();
        self.store.update(move |latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            let shelf = next.shelves.iter_mut().find(|s| s.key == key)?;
            shelf.is_visible = updated.is_visible;
            shelf.display_order = updated.display_order;
            Some(SyncState::Loaded(next))
        });
    }

    // ------------------------------------------------------------------
    // List selection & mutations
    // ------------------------------------------------------------------

    /// Select a list for display and resolve its seeds.
    #[instrument(skip(self))]
    pub async fn select_list(&self, url: &str, force_refresh: bool) {
        let applied = self.store.update(|latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            next.selected_list_url = Some(url.to_string());
            next.list_items = Vec::new();
            next.is_loading_list_items = true;
            Some(SyncState::Loaded(next))
        });
        if !applied {
            debug!(url, "cannot select a list before shelves are loaded");
            return;
        }

        if let Err(e) = self.settings.set_string(SELECTED_LIST_KEY, url).await {
            // Persistence is an optimization; selection still works
            warn!(error = %e, "failed to persist list selection");
        }

        self.load_list_items(url, force_refresh).await;
    }

    /// Clear the displayed-list slot.
    pub async fn clear_list_selection(&self) {
        self.store.update(|latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            next.selected_list_url = None;
            next.list_items = Vec::new();
            next.is_loading_list_items = false;
            Some(SyncState::Loaded(next))
        });
        if let Err(e) = self.settings.remove(SELECTED_LIST_KEY).await {
            warn!(error = %e, "failed to clear persisted list selection");
        }
    }

    /// Re-resolve the currently displayed list.
    pub async fn refresh_current_list(&self) {
        let Some(url) = self
            .store
            .current()
            .as_loaded()
            .and_then(|l| l.selected_list_url.clone())
        else {
            debug!("no list selected, nothing to refresh");
            return;
        };
        self.mark_list_loading();
        self.load_list_items(&url, true).await;
    }

    /// Add a book to a list, then refresh list metadata and the displayed
    /// list if it was the mutated one.
    #[instrument(skip(self, book), fields(work_id = %book.work_id, list_url))]
    pub async fn add_book_to_list(&self, book: &Book, list_url: &str) {
        if let Err(e) = self.list_service.add_seed(list_url, book).await {
            self.report_mutation_failure("add to list", e);
            return;
        }
        self.refresh_list_metadata(list_url).await;
    }

    /// Remove a book from the currently displayed list.
    #[instrument(skip(self, book), fields(work_id = %book.work_id))]
    pub async fn remove_book_from_current_list(&self, book: &Book) {
        let Some(url) = self
            .store
            .current()
            .as_loaded()
            .and_then(|l| l.selected_list_url.clone())
        else {
            warn!("no list selected, cannot remove book");
            return;
        };
        if let Err(e) = self.list_service.remove_seed(&url, book).await {
            self.report_mutation_failure("remove from list", e);
            return;
        }
        self.refresh_list_metadata(&url).await;
    }

    fn mark_list_loading(&self) {
        self.store.update(|latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            next.is_loading_list_items = true;
            Some(SyncState::Loaded(next))
        });
    }

    async fn load_list_items(&self, url: &str, force_refresh: bool) {
        let result = self.list_service.get_list_seeds(url, force_refresh).await;
        let url = url.to_string();
        match result {
            Ok(items) => {
                self.store.update(move |latest| {
                    let loaded = latest.as_loaded()?;
                    // The selection may have changed while resolving
                    if loaded.selected_list_url.as_deref() != Some(url.as_str()) {
                        return None;
                    }
                    let mut next = loaded.clone();
                    next.list_items = items;
                    next.is_loading_list_items = false;
                    Some(SyncState::Loaded(next))
                });
            }
            Err(e) => {
                // Keep the list selected; present an empty item set so the
                // UI can distinguish "selected but failed" from "nothing
                // selected"
                warn!(url = %url, error = %e, "list seed resolution failed");
                self.store.update(move |latest| {
                    let loaded = latest.as_loaded()?;
                    if loaded.selected_list_url.as_deref() != Some(url.as_str()) {
                        return None;
                    }
                    let mut next = loaded.clone();
                    next.list_items = Vec::new();
                    next.is_loading_list_items = false;
                    Some(SyncState::Loaded(next))
                });
            }
        }
    }

    async fn refresh_list_metadata(&self, mutated_url: &str) {
        match self.list_service.get_book_lists().await {
            Ok(lists) => {
                self.store.update(move |latest| {
                    let loaded = latest.as_loaded()?;
                    let mut next = loaded.clone();
                    next.book_lists = lists;
                    Some(SyncState::Loaded(next))
                });
            }
            Err(e) => warn!(error = %e, "list metadata refresh failed"),
        }

        let displayed = self
            .store
            .current()
            .as_loaded()
            .and_then(|l| l.selected_list_url.clone());
        if displayed.as_deref() == Some(mutated_url) {
            self.mark_list_loading();
            self.load_list_items(mutated_url, true).await;
        }
    }

    async fn restore_list_selection(&self) {
        let persisted = match self.settings.get_string(SELECTED_LIST_KEY).await {
            Ok(Some(url)) => url,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "selection restore read failed");
                return;
            }
        };

        let current = self.store.current();
        let Some(loaded) = current.as_loaded() else {
            return;
        };
        // Don't clobber a selection the user already made
        if loaded.selected_list_url.is_some() {
            return;
        }
        if !loaded.book_lists.iter().any(|l| l.url == persisted) {
            debug!(url = %persisted, "persisted list no longer exists");
            return;
        }

        self.select_list(&persisted, false).await;
    }

    // ------------------------------------------------------------------
    // Background maintenance
    // ------------------------------------------------------------------

    /// Remove per-book display records whose edition is no longer on any
    /// loaded shelf.
    async fn cleanup_orphaned_book_settings(&self) {
        let keys = match self.settings.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                debug!(error = %e, "settings scan failed, skipping orphan cleanup");
                return;
            }
        };

        let referenced: HashSet<String> = self
            .store
            .current()
            .as_loaded()
            .map(|loaded| {
                loaded
                    .shelves
                    .iter()
                    .flat_map(|s| s.books.iter())
                    .filter(|b| !b.edition_id.is_empty())
                    .map(|b| b.edition_id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut removed = 0usize;
        for key in keys.iter().filter(|k| k.starts_with(BOOK_DISPLAY_PREFIX)) {
            let edition_id = &key[BOOK_DISPLAY_PREFIX.len()..];
            if referenced.contains(edition_id) {
                continue;
            }
            match self.settings.remove(key).await {
                Ok(()) => removed += 1,
                Err(e) => debug!(key = %key, error = %e, "orphan cleanup remove failed"),
            }
        }
        if removed > 0 {
            info!(removed, "cleaned up orphaned book display settings");
        }
    }

    fn report_mutation_failure(&self, context: &str, e: bridge_traits::BridgeError) {
        if e.is_auth_failure() {
            debug!(context, error = %e, "mutation rejected: not authenticated");
            return;
        }
        if e.is_cache_failure() {
            warn!(context, error = %e, "cache failure during mutation");
            return;
        }
        error!(context, error = %e, "mutation failed");
        self.store.publish(SyncState::Error {
            message: e.to_string(),
        });
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.store.current().variant_name())
            .field("auth", &self.auth.current())
            .finish()
    }
}
