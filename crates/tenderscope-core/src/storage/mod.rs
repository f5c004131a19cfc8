//! # Persistent Storage
//!
//! Disk-backed implementations of the store traits.

mod redb_store;

pub use redb_store::RedbStore;
