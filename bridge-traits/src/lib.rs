//! # Host Bridge Traits
//!
//! Collaborator traits that must be implemented by the host application.
//!
//! ## Overview
//!
//! This crate defines the contract between the shelf synchronization engine
//! and the application shell. Each trait represents a capability the engine
//! requires but that is owned elsewhere: the remote library service client,
//! the curated-list service, work-record resolution, and preference storage.
//!
//! ## Traits
//!
//! ### Remote Data
//! - [`ShelfStore`](shelves::ShelfStore) - Shelf data against the remote service and local cache
//! - [`ListService`](lists::ListService) - Curated lists and seed resolution
//! - [`WorkResolver`](works::WorkResolver) - Canonical work-record redirect resolution
//!
//! ### Storage & Utilities
//! - [`SettingsStore`](settings::SettingsStore) - Key-value preferences storage
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Host
//! implementations should map transport-level failures onto the taxonomy the
//! engine's recovery rules are written against: authentication failures are
//! never surfaced to the user by the engine, cache failures are logged and
//! discarded, network and server failures follow the stale-preservation
//! rules of the sync state machine.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod error;
pub mod lists;
pub mod settings;
pub mod shelves;
pub mod time;
pub mod works;

pub use error::{BridgeError, Result};
pub use lists::ListService;
pub use settings::SettingsStore;
pub use shelves::{ShelfPage, ShelfStore, ShelfTarget};
pub use time::{Clock, SystemClock};
pub use works::{ResolvedWork, WorkRecord, WorkResolver};
