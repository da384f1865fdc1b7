//! Shelf Data Access
//!
//! Abstracts the remote library service and its local cache for shelf
//! (reading-status collection) data. The engine treats this trait as the
//! single source of remote truth; cache behavior is an implementation
//! detail behind the `force_refresh` flags.

use async_trait::async_trait;
use core_library::{Book, Loan, Shelf, ShelfSort};
use std::collections::HashMap;

use crate::error::Result;

/// Target of a shelf-assignment mutation.
///
/// Moving a book either places it on a named shelf or removes it from all
/// shelves entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShelfTarget {
    /// Place the book on the shelf with this key.
    Shelf(String),
    /// Remove the book from every shelf.
    Unshelved,
}

impl ShelfTarget {
    /// The target shelf key, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            ShelfTarget::Shelf(key) => Some(key),
            ShelfTarget::Unshelved => None,
        }
    }
}

impl std::fmt::Display for ShelfTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShelfTarget::Shelf(key) => write!(f, "{}", key),
            ShelfTarget::Unshelved => write!(f, "(unshelved)"),
        }
    }
}

/// One page of a shelf fetch.
///
/// `shelf` carries the shelf metadata (name, sort, server-reported total)
/// plus this page's books. A non-`None` cursor means more pages follow;
/// the engine never builds a `Shelf` value from a partial fetch.
#[derive(Debug, Clone)]
pub struct ShelfPage {
    pub shelf: Shelf,
    pub next_cursor: Option<String>,
}

/// Shelf data access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::shelves::ShelfStore;
///
/// async fn shelf_names(store: &dyn ShelfStore) -> bridge_traits::Result<Vec<String>> {
///     let shelves = store.get_shelves(false).await?;
///     Ok(shelves.into_iter().map(|s| s.name).collect())
/// }
/// ```
#[async_trait]
pub trait ShelfStore: Send + Sync {
    /// Fetch all shelves, fully populated.
    ///
    /// With `force_refresh` the implementation must bypass its cache.
    async fn get_shelves(&self, force_refresh: bool) -> Result<Vec<Shelf>>;

    /// Fetch one page of a single shelf.
    ///
    /// `cursor` of `None` requests the first page. The returned
    /// [`ShelfPage`] carries the next cursor until the server-reported
    /// total has been delivered.
    async fn get_shelf_page(
        &self,
        key: &str,
        cursor: Option<String>,
        force_refresh: bool,
    ) -> Result<ShelfPage>;

    /// The set of shelf keys configured for this user, in display order.
    async fn get_configured_shelf_keys(&self) -> Result<Vec<String>>;

    /// Current loans/entitlements keyed by edition id.
    async fn get_user_loans(&self, force_refresh: bool) -> Result<HashMap<String, Loan>>;

    /// Drop all locally cached shelf data. Invoked on logout.
    async fn clear_cache(&self);

    /// Update a shelf's visibility, returning the updated shelf metadata.
    async fn update_shelf_visibility(&self, key: &str, visible: bool) -> Result<Shelf>;

    /// Update a shelf's sort configuration on the server.
    async fn update_shelf_sort(&self, key: &str, sort: ShelfSort) -> Result<()>;

    /// Assign a book to a shelf (or remove it from all shelves).
    ///
    /// This is the remote half of the move transaction; the engine applies
    /// the local mutation only after this call succeeds.
    async fn set_book_shelf(&self, book: &Book, target: &ShelfTarget) -> Result<()>;

    /// Remove a book from the named shelf.
    async fn remove_book_from_shelf(&self, book: &Book, key: &str) -> Result<()>;

    /// Add a bare work reference to a shelf.
    ///
    /// Used by redirect reconciliation, where only the corrected work id is
    /// known.
    async fn add_work_to_shelf(&self, work_id: &str, key: &str) -> Result<()>;

    /// Remove a bare work reference from a shelf.
    async fn remove_work_from_shelf(&self, work_id: &str, key: &str) -> Result<()>;
}
