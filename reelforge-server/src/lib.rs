//! Library target for `reelforge-server`, split out from the `main.rs`
//! binary so integration tests can build the router directly against
//! `AppState` instead of spawning a real process.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
