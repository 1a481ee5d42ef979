//! Domain types and pure logic for the MarkSwift conversion queue.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! notification layer, the admission queue, and the HTTP server alike.

pub mod config;
pub mod error;
pub mod estimation;
pub mod job;
pub mod types;
