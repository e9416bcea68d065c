//! hashfs — a content-addressed blob store served over HTTP.
//!
//! Objects are stored under the SHA-256 of their bytes. The binary entry
//! point is in `main.rs`; modules are exposed here for integration tests.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
