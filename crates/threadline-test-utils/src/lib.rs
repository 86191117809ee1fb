#![deny(unsafe_code)]

//! Shared test utilities for the Threadline workspace.
//!
//! Provides an in-memory backend, config builders, and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! threadline-test-utils = { workspace = true }
//! ```

pub mod backend;
pub mod config;
pub mod tracing_setup;

pub use backend::{Op, Request, ScriptedBackend};
