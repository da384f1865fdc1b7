//! Workspace placeholder crate.
//!
//! This crate exists so host applications can depend on `rsc-workspace` and
//! pull in the shelf synchronization engine (`core-sync`) together with its
//! collaborator contract (`bridge-traits`) without wiring each workspace
//! crate individually.
