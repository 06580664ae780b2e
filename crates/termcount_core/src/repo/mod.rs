//! Persistence implementations of the collaborator contracts.
//!
//! # Responsibility
//! - Keep SQL details out of the reconciliation core.
//! - Enforce the count floor and delta atomicity at the storage boundary.

pub mod taxonomy_repo;
