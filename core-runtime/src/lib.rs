//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the reading shelf core:
//! - Logging and tracing infrastructure
//! - Shared runtime error type
//!
//! ## Overview
//!
//! This crate establishes the logging conventions used throughout the
//! system. Every other crate logs through `tracing`; the host calls
//! [`logging::init_logging`] once at startup to choose format and level.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
