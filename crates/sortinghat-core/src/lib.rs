//! Core types and trait definitions for the Sorting Hat identity importer.
//!
//! This crate is deliberately free of database and runtime dependencies.
//! The store backend and the import engine both depend on it.

pub mod decision;
pub mod diff;
pub mod error;
pub mod record;
pub mod stats;
pub mod store;
pub mod text;

pub use error::{Error, Result};
