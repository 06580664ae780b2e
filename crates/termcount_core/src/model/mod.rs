//! Domain model for content items and their category relationships.
//!
//! # Responsibility
//! - Define identifiers and read-only views of items owned by the content store.
//! - Define the count directions produced by status transitions.
//!
//! # Invariants
//! - Core code never mutates an `Item`; it only reads snapshots.
//! - Category counts are owned by the persistence layer, never held here.

pub mod category;
pub mod item;
