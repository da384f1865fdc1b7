//! # Authentication State
//!
//! The authentication state machine consumed by the sync engine.
//!
//! ## Overview
//!
//! Authentication itself (OAuth flow, token refresh, deep links) lives in
//! the application shell; this crate only models the resulting state
//! machine and its change notifications. The shell drives an
//! [`AuthStateSource`] through `{Initial, Loading, Authenticated,
//! Unauthenticated}` and the engine reacts to the transitions, never to
//! anything deeper.

pub mod source;
pub mod types;

pub use source::AuthStateSource;
pub use types::AuthState;
