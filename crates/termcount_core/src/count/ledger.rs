//! Per-session dedup ledger.
//!
//! # Invariants
//! - A ledger lives exactly as long as one session; it is never shared or persisted.
//! - For a given `(item, scheme, direction)` key, each category id is returned
//!   by `record_if_new` at most once.

use crate::model::category::{CategoryId, Direction};
use crate::model::item::ItemId;
use std::collections::{BTreeMap, BTreeSet};

type LedgerKey = (ItemId, String, Direction);

/// Tracks which category changes were already applied in this session.
#[derive(Debug, Default)]
pub struct DedupLedger {
    applied: BTreeMap<LedgerKey, BTreeSet<CategoryId>>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ids not yet recorded for the key and records them.
    ///
    /// Input order is preserved; repeated ids inside one batch are returned once.
    pub fn record_if_new(
        &mut self,
        item_id: ItemId,
        scheme: &str,
        direction: Direction,
        category_ids: &[CategoryId],
    ) -> Vec<CategoryId> {
        let recorded = self
            .applied
            .entry((item_id, scheme.to_string(), direction))
            .or_default();
        category_ids
            .iter()
            .copied()
            .filter(|id| recorded.insert(*id))
            .collect()
    }

    /// Total recorded `(key, category)` entries.
    pub fn len(&self) -> usize {
        self.applied.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
