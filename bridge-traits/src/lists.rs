//! Curated List Access
//!
//! Abstracts the user's curated lists. Lists hold opaque "seed" references
//! (books or authors); resolving seeds into display items happens behind
//! this trait, and only the resolved result is held in engine state.

use async_trait::async_trait;
use core_library::{Book, BookList, DisplayItem};

use crate::error::Result;

/// Curated list service trait
#[async_trait]
pub trait ListService: Send + Sync {
    /// Fetch the user's curated lists (metadata only).
    async fn get_book_lists(&self) -> Result<Vec<BookList>>;

    /// Resolve a list's seeds into an ordered display-item sequence.
    async fn get_list_seeds(&self, url: &str, force_refresh: bool) -> Result<Vec<DisplayItem>>;

    /// Add a book seed to a list.
    async fn add_seed(&self, list_url: &str, book: &Book) -> Result<()>;

    /// Remove a book seed from a list.
    async fn remove_seed(&self, list_url: &str, book: &Book) -> Result<()>;
}
