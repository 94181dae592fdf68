//! Storage layer
//!
//! SQLite-backed relational store with versioned migrations.

pub mod migrations;
mod sqlite;

pub use sqlite::{Batch, Result, StorageError, Store};
