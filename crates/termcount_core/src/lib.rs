//! Incremental category count reconciliation.
//!
//! Keeps per-category "active item" counts consistent as items change status
//! or gain/lose categories, using O(1) deltas where safe and authoritative
//! recounts where not.

pub mod config;
pub mod count;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use config::{ConfigError, ConfigOverrides, CountingConfig, SharedConfig, VolumeLimit};
pub use count::classifier::StatusClassifier;
pub use count::engine::{
    ReconcileError, ReconcileEvent, ReconcileResult, ReconcileSummary, ReconciliationEngine,
    Session,
};
pub use count::expander::{effective_status, expand, DependentItem};
pub use count::guard::{check as check_volume, GuardDecision};
pub use count::ledger::DedupLedger;
pub use count::overrides::{
    FallbackOutcome, FallbackStrategy, OverrideRegistry, OverrideRegistryError, SchemeOverride,
};
pub use count::transition::resolve as resolve_transition;
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::category::{CategoryId, Direction, Transition};
pub use model::item::{Item, ItemId, StatusSource, INHERIT_STATUS};
pub use repo::taxonomy_repo::SqliteTaxonomyStore;
pub use store::{ContentStore, CountStore, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
