//! # Shelf Synchronization Module
//!
//! Owns the user's shelves and curated lists and keeps them consistent
//! between the local cache and the remote library service.
//!
//! ## Overview
//!
//! This module manages the shelf synchronization state machine, including:
//! - Loading and refreshing shelves via [`bridge_traits::ShelfStore`]
//! - Optimistic local mutations (move/remove/sort) applied after remote
//!   confirmation
//! - Per-shelf refresh coalescing with a debounced drain queue
//! - A best-effort background pass that repairs redirected work records
//! - Reactions to externally-owned authentication transitions
//!
//! ## Components
//!
//! - **State Store** (`state`): single-snapshot sync state with a
//!   single-writer read-modify-publish primitive and disposed guard
//! - **Refresh Queue** (`scheduler`): coalescing/debounce bookkeeping for
//!   per-shelf refresh requests
//! - **Redirect Resolver** (`redirect`): background repair of books whose
//!   canonical work record moved server-side
//! - **Sync Engine** (`engine`): the public orchestrator

pub mod engine;
pub mod error;
pub mod redirect;
pub mod scheduler;
pub mod state;

pub use engine::{SyncConfig, SyncEngine};
pub use error::{Result, SyncError};
pub use redirect::RedirectResolver;
pub use scheduler::{DrainTick, RefreshQueue, RequestOutcome};
pub use state::{LoadedState, StateStore, SyncState};
