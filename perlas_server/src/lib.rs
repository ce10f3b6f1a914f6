//! HTTP server for the Perlas wallet ledger.
//!
//! The binary in `main.rs` wires configuration, logging and metrics around
//! the router built by [`api::create_router`]; the pieces are exposed here
//! so integration tests can drive the router directly.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
