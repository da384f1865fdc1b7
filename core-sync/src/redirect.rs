//! # Redirect Resolver
//!
//! Background repair pass for books whose canonical work record moved
//! server-side.
//!
//! ## Overview
//!
//! When the remote service merges or redirects a work record, the shelf
//! entry keeps its old work id but loses its metadata: placeholder title,
//! no authors, no cover. This pass scans every book across every shelf in
//! the current snapshot, resolves such candidates through
//! [`WorkResolver`] (single hop), and publishes **one** consolidated state
//! update after the whole scan. The remote side is then reconciled with a
//! detached remove-old/add-new sequence per candidate; its failure is
//! logged and never surfaces, leaving the remote briefly inconsistent
//! until a later pass.
//!
//! The pass is best-effort and non-blocking: it never transitions the
//! primary state to `Error`, and at most one pass runs at a time.

use bridge_traits::{ResolvedWork, ShelfStore, WorkResolver};
use core_library::Book;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::state::{StateStore, SyncState};

/// A candidate whose redirect resolved to a new work identity.
#[derive(Debug, Clone)]
struct ResolvedCandidate {
    shelf_key: String,
    old_work_id: String,
    updated: Book,
}

/// Background scanner that repairs redirected work records.
pub struct RedirectResolver {
    shelf_store: Arc<dyn ShelfStore>,
    work_resolver: Arc<dyn WorkResolver>,
    store: Arc<StateStore>,
    /// Serializes passes; a trigger while one runs is dropped, not queued
    pass_guard: Mutex<()>,
}

impl RedirectResolver {
    pub fn new(
        shelf_store: Arc<dyn ShelfStore>,
        work_resolver: Arc<dyn WorkResolver>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            shelf_store,
            work_resolver,
            store,
            pass_guard: Mutex::new(()),
        }
    }

    /// Run one scan-and-repair pass over the current snapshot.
    ///
    /// Returns the number of books repaired locally.
    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> usize {
        let Ok(_guard) = self.pass_guard.try_lock() else {
            debug!("redirect pass already running, skipping");
            return 0;
        };

        let snapshot = self.store.current();
        let Some(loaded) = snapshot.as_loaded() else {
            return 0;
        };

        let candidates: Vec<(String, Book)> = loaded
            .shelves
            .iter()
            .flat_map(|shelf| {
                shelf
                    .books
                    .iter()
                    .filter(|book| book.needs_redirect_check())
                    .map(|book| (shelf.key.clone(), book.clone()))
            })
            .collect();

        if candidates.is_empty() {
            return 0;
        }
        debug!(count = candidates.len(), "scanning redirect candidates");

        let mut resolved = Vec::new();
        for (shelf_key, book) in candidates {
            match self.work_resolver.resolve_work_redirect(&book.work_id).await {
                Ok(record) => {
                    let new_work_id = record
                        .new_work_id
                        .filter(|id| !id.is_empty() && *id != book.work_id);
                    match new_work_id {
                        Some(new_work_id) => {
                            let updated = repaired_book(&book, new_work_id, &record.resolved);
                            resolved.push(ResolvedCandidate {
                                shelf_key,
                                old_work_id: book.work_id.clone(),
                                updated,
                            });
                        }
                        None => {
                            debug!(work_id = %book.work_id, "work record is not a redirect");
                        }
                    }
                }
                // Best-effort: resolution failures never surface
                Err(e) => debug!(work_id = %book.work_id, error = %e, "redirect resolution failed"),
            }
        }

        if resolved.is_empty() {
            return 0;
        }

        // One consolidated publish, re-reading the latest store value so a
        // concurrent user mutation is never clobbered.
        let applied = self.store.update(|latest| {
            let loaded = latest.as_loaded()?;
            let mut next = loaded.clone();
            let mut changed = false;
            for candidate in &resolved {
                let Some(shelf) = next
                    .shelves
                    .iter_mut()
                    .find(|s| s.key == candidate.shelf_key)
                else {
                    continue;
                };
                if let Some(slot) = shelf
                    .books
                    .iter_mut()
                    .find(|b| b.work_id == candidate.old_work_id)
                {
                    *slot = candidate.updated.clone();
                    changed = true;
                }
            }
            changed.then_some(SyncState::Loaded(next))
        });

        if applied {
            info!(count = resolved.len(), "repaired redirected works");
        }

        // Fire-and-forget remote reconciliation per candidate. Failure
        // leaves the remote side stale until a later pass.
        let repaired = resolved.len();
        for candidate in resolved {
            let shelf_store = Arc::clone(&self.shelf_store);
            tokio::spawn(async move {
                if let Err(e) = shelf_store
                    .remove_work_from_shelf(&candidate.old_work_id, &candidate.shelf_key)
                    .await
                {
                    warn!(
                        work_id = %candidate.old_work_id,
                        shelf = %candidate.shelf_key,
                        error = %e,
                        "redirect reconciliation: remove failed"
                    );
                    return;
                }
                if let Err(e) = shelf_store
                    .add_work_to_shelf(&candidate.updated.work_id, &candidate.shelf_key)
                    .await
                {
                    warn!(
                        work_id = %candidate.updated.work_id,
                        shelf = %candidate.shelf_key,
                        error = %e,
                        "redirect reconciliation: add failed"
                    );
                }
            });
        }

        repaired
    }
}

/// Build the repaired book from the resolved record.
///
/// Metadata comes from the resolved record where present; cover data falls
/// back to whatever the stale entry still carried.
fn repaired_book(book: &Book, new_work_id: String, resolved: &ResolvedWork) -> Book {
    let mut updated = book.clone();
    updated.work_id = new_work_id;
    if let Some(title) = &resolved.title {
        if !title.trim().is_empty() {
            updated.title = title.clone();
        }
    }
    if !resolved.authors.is_empty() {
        updated.authors = resolved.authors.clone();
    }
    updated.cover_url = resolved.cover_url.clone().or(updated.cover_url);
    updated.cover_edition_id = resolved.cover_edition_id.clone().or(updated.cover_edition_id);
    updated
}
