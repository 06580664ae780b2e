//! Count reconciliation core.
//!
//! # Responsibility
//! - Decide per event whether category counts move up, down or not at all.
//! - Deduplicate overlapping events inside one session.
//! - Propagate parent transitions to inheriting dependents, falling back to
//!   an authoritative recount when the dependent volume is too large.
//!
//! # Invariants
//! - Each `(item, scheme, direction, category)` is applied at most once per session.
//! - No count arithmetic happens here; all mutation goes through `CountStore`
//!   or a registered scheme override.

pub mod classifier;
pub mod engine;
pub mod expander;
pub mod guard;
pub mod ledger;
pub mod overrides;
pub mod transition;
