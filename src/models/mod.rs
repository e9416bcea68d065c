//! Core data models for the content-addressed store.
//!
//! `object` maps the SQLite metadata table; `pricing` is the static
//! capability document served at `/`.

pub mod object;
pub mod pricing;
