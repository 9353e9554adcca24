//! Anchored Templates - replication of anchored metadata graphs from templates.
//!
//! A template is an ordinary entity in a metadata repository. Creating an
//! element from it copies the entity, and optionally everything anchored to
//! the same aggregate, while linking the copies to shared entities outside it.

pub mod cli;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export FromRef at crate root for di-macros generated code
pub use di::FromRef;
