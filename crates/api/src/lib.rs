//! MarkSwift API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! WebSocket transport, claim processor) so integration tests and the binary
//! entrypoint can both access them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod processor;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
