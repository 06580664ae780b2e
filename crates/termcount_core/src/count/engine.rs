//! Reconciliation engine and per-event sessions.
//!
//! # Responsibility
//! - Turn status transitions and relationship changes into count requests.
//! - Propagate parent transitions to inheriting dependents.
//! - Switch an item to an authoritative recount of its whole inheriting
//!   subtree when its dependent volume exceeds the configured limit.
//!
//! # Invariants
//! - A session snapshots configuration at start and owns a fresh ledger.
//! - All category ids of an item are retrieved before the first mutation for
//!   that item, so a retrieval failure never leaves the item half-applied.
//! - Collaborator failures are returned to the caller; nothing is retried.
//! - Dependents are processed in expander order.
//! - A fallback recounts the union of categories of the item and every
//!   inheriting descendant; none of those descendants gets a delta.

use crate::config::{CountingConfig, SharedConfig};
use crate::count::classifier::StatusClassifier;
use crate::count::expander::{effective_status, expand, DependentItem};
use crate::count::guard::{check, GuardDecision};
use crate::count::ledger::DedupLedger;
use crate::count::overrides::{FallbackOutcome, FallbackStrategy, OverrideRegistry};
use crate::count::transition::resolve;
use crate::model::category::{CategoryId, Direction};
use crate::model::item::{Item, ItemId};
use crate::store::{ContentStore, CountStore, StoreError};
use log::{debug, error, info};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Reconciliation failure surfaced to the event source.
#[derive(Debug)]
pub enum ReconcileError {
    /// Reading items, schemes or relationships failed.
    Retrieval { item_id: ItemId, source: StoreError },
    /// A delta, recount or cache invalidation failed.
    Mutation { scheme: String, source: StoreError },
    /// A scheme override reported failure.
    Override { scheme: String, message: String },
    /// The registered fallback strategy reported failure.
    Fallback { item_id: ItemId, message: String },
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retrieval { item_id, source } => {
                write!(f, "failed to load count inputs for item {item_id}: {source}")
            }
            Self::Mutation { scheme, source } => {
                write!(f, "failed to update counts in scheme `{scheme}`: {source}")
            }
            Self::Override { scheme, message } => {
                write!(f, "count override for scheme `{scheme}` failed: {message}")
            }
            Self::Fallback { item_id, message } => {
                write!(f, "fallback strategy failed for item {item_id}: {message}")
            }
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Retrieval { source, .. } | Self::Mutation { source, .. } => Some(source),
            Self::Override { .. } | Self::Fallback { .. } => None,
        }
    }
}

/// Lifecycle notification delivered by the event-source layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    StatusTransitioned {
        item: Item,
        old_status: String,
        new_status: String,
    },
    RelationshipAdded {
        item_id: ItemId,
        scheme: String,
        category_ids: Vec<CategoryId>,
    },
    RelationshipRemoved {
        item_id: ItemId,
        scheme: String,
        category_ids: Vec<CategoryId>,
    },
}

/// What one or more events did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Items classified (top-level item plus expanded dependents).
    pub items_visited: usize,
    /// Category ids sent to `apply_count_delta` as increments.
    pub incremented: usize,
    /// Category ids sent to `apply_count_delta` as decrements.
    pub decremented: usize,
    /// Rows reported changed by `apply_count_delta`.
    pub rows_affected: usize,
    /// Category ids dropped by the ledger.
    pub duplicates_skipped: usize,
    pub overrides_invoked: usize,
    pub recounts: usize,
    pub fallbacks: usize,
}

impl ReconcileSummary {
    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &ReconcileSummary) {
        self.items_visited += other.items_visited;
        self.incremented += other.incremented;
        self.decremented += other.decremented;
        self.rows_affected += other.rows_affected;
        self.duplicates_skipped += other.duplicates_skipped;
        self.overrides_invoked += other.overrides_invoked;
        self.recounts += other.recounts;
        self.fallbacks += other.fallbacks;
    }

    /// Returns whether nothing was mutated or delegated.
    pub fn is_noop(&self) -> bool {
        self.incremented == 0
            && self.decremented == 0
            && self.overrides_invoked == 0
            && self.recounts == 0
            && self.fallbacks == 0
    }
}

/// Category ids of one scheme scheduled for mutation.
struct SchemeTarget {
    scheme: String,
    category_ids: Vec<CategoryId>,
}

/// Count reconciliation orchestrator.
///
/// Holds the collaborators and process-wide configuration; all per-event
/// state lives in [`Session`].
pub struct ReconciliationEngine<C, S> {
    content: C,
    counts: S,
    overrides: OverrideRegistry,
    fallback: Option<Arc<dyn FallbackStrategy>>,
    config: SharedConfig,
}

impl<C: ContentStore, S: CountStore> ReconciliationEngine<C, S> {
    pub fn new(content: C, counts: S, config: SharedConfig) -> Self {
        Self {
            content,
            counts,
            overrides: OverrideRegistry::new(),
            fallback: None,
            config,
        }
    }

    /// Uses `overrides` for per-scheme counting.
    pub fn with_overrides(mut self, overrides: OverrideRegistry) -> Self {
        info!(
            "event=overrides_registered module=count count={} schemes={}",
            overrides.len(),
            overrides.schemes().join(",")
        );
        self.overrides = overrides;
        self
    }

    /// Installs the hook consulted when the volume guard trips.
    pub fn with_fallback_strategy(mut self, strategy: Arc<dyn FallbackStrategy>) -> Self {
        self.fallback = Some(strategy);
        self
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn counts(&self) -> &S {
        &self.counts
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Starts a session bound to the current configuration snapshot.
    pub fn begin_session(&self) -> Session<'_, C, S> {
        let config = self.config.snapshot();
        let session = Session {
            engine: self,
            id: Uuid::new_v4(),
            classifier: StatusClassifier::new(config.counted_statuses.clone()),
            config,
            ledger: DedupLedger::new(),
        };
        debug!(
            "event=session_start module=count session_id={} counted_statuses={} volume_limit={}",
            session.id,
            session.classifier.counted_statuses().count(),
            session.config.dependent_volume_limit.as_raw()
        );
        session
    }

    /// Handles one event in its own session.
    pub fn handle(&self, event: ReconcileEvent) -> ReconcileResult<ReconcileSummary> {
        self.begin_session().apply(event)
    }

    /// Recounts every category of one item and its inheriting subtree.
    ///
    /// Entry point for deferred work that only carries an item id. A missing
    /// item is a no-op.
    pub fn recount_item(&self, item_id: ItemId) -> ReconcileResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let Some(item) = self.load_item(item_id)? else {
            debug!("event=recount_item module=count status=skipped item_id={item_id} reason=not_found");
            return Ok(summary);
        };

        let config = self.config.snapshot();
        let classifier = StatusClassifier::new(config.counted_statuses.clone());
        let dependents = expand(&self.content, &item, &item.status, &config.leaf_kinds)
            .map_err(|source| retrieval_error(item.id, source))?;
        let targets = self.subtree_targets(&item, &dependents, &config.leaf_kinds)?;
        summary.items_visited += 1;
        self.recount_targets(item.id, targets, &classifier, &mut summary)?;
        info!(
            "event=recount_item module=count status=ok item_id={} recounts={} overrides={}",
            item_id, summary.recounts, summary.overrides_invoked
        );
        Ok(summary)
    }

    fn load_item(&self, item_id: ItemId) -> ReconcileResult<Option<Item>> {
        self.content
            .get_item(item_id)
            .map_err(|source| retrieval_error(item_id, source))
    }

    /// Collects non-empty category sets of every applicable scheme.
    fn collect_targets(&self, item: &Item) -> ReconcileResult<Vec<SchemeTarget>> {
        let schemes = self
            .content
            .get_applicable_schemes(&item.kind)
            .map_err(|source| retrieval_error(item.id, source))?;

        let mut targets = Vec::with_capacity(schemes.len());
        for scheme in schemes {
            let category_ids = self
                .content
                .get_category_instances(item.id, &scheme)
                .map_err(|source| retrieval_error(item.id, source))?;
            if !category_ids.is_empty() {
                targets.push(SchemeTarget {
                    scheme,
                    category_ids,
                });
            }
        }
        Ok(targets)
    }

    /// Unions category ids per scheme over `item` and all inheriting
    /// descendants reachable through `dependents`.
    fn subtree_targets(
        &self,
        item: &Item,
        dependents: &[DependentItem],
        leaf_kinds: &BTreeSet<String>,
    ) -> ReconcileResult<BTreeMap<String, BTreeSet<CategoryId>>> {
        let mut union: BTreeMap<String, BTreeSet<CategoryId>> = BTreeMap::new();
        let mut visited = BTreeSet::from([item.id]);
        self.merge_targets(item, &mut union)?;

        let mut pending: VecDeque<Item> =
            dependents.iter().map(|dependent| dependent.item.clone()).collect();
        while let Some(current) = pending.pop_front() {
            if !visited.insert(current.id) {
                continue;
            }
            self.merge_targets(&current, &mut union)?;
            let children = expand(&self.content, &current, &current.status, leaf_kinds)
                .map_err(|source| retrieval_error(current.id, source))?;
            pending.extend(children.into_iter().map(|child| child.item));
        }
        Ok(union)
    }

    fn merge_targets(
        &self,
        item: &Item,
        union: &mut BTreeMap<String, BTreeSet<CategoryId>>,
    ) -> ReconcileResult<()> {
        for target in self.collect_targets(item)? {
            union
                .entry(target.scheme)
                .or_default()
                .extend(target.category_ids);
        }
        Ok(())
    }

    /// Recounts each scheme's ids in ascending order; override schemes get
    /// the ids through their override instead.
    fn recount_targets(
        &self,
        item_id: ItemId,
        targets: BTreeMap<String, BTreeSet<CategoryId>>,
        classifier: &StatusClassifier,
        summary: &mut ReconcileSummary,
    ) -> ReconcileResult<()> {
        for (scheme, category_ids) in targets {
            let category_ids: Vec<CategoryId> = category_ids.into_iter().collect();
            if self.overrides.scheme_has_override(&scheme) {
                self.invoke_override(&category_ids, &scheme)?;
                summary.overrides_invoked += 1;
                continue;
            }

            for category_id in &category_ids {
                let count = self
                    .counts
                    .recount_authoritative(*category_id, &scheme, classifier)
                    .map_err(|source| mutation_error(&scheme, source))?;
                debug!(
                    "event=recount module=count status=ok item_id={} scheme={} category_id={} count={}",
                    item_id, scheme, category_id, count
                );
                summary.recounts += 1;
            }
            self.counts
                .invalidate_cache(&category_ids, &scheme)
                .map_err(|source| mutation_error(&scheme, source))?;
        }
        Ok(())
    }

    fn invoke_override(&self, category_ids: &[CategoryId], scheme: &str) -> ReconcileResult<()> {
        self.overrides
            .invoke_override(category_ids, scheme)
            .map(|_| ())
            .map_err(|message| {
                error!(
                    "event=count_override module=count status=error scheme={scheme} error={message}"
                );
                ReconcileError::Override {
                    scheme: scheme.to_string(),
                    message,
                }
            })
    }
}

/// Scope of one top-level event and everything it synchronously triggers.
///
/// A session that returned an error should be dropped; retries start a new
/// session so the ledger is re-derived from current associations.
pub struct Session<'e, C, S> {
    engine: &'e ReconciliationEngine<C, S>,
    id: Uuid,
    config: Arc<CountingConfig>,
    classifier: StatusClassifier,
    ledger: DedupLedger,
}

impl<C: ContentStore, S: CountStore> Session<'_, C, S> {
    /// Correlation id used in log events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration snapshot taken at session start.
    pub fn config(&self) -> &CountingConfig {
        &self.config
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Applies one event inside this session.
    pub fn apply(&mut self, event: ReconcileEvent) -> ReconcileResult<ReconcileSummary> {
        match event {
            ReconcileEvent::StatusTransitioned {
                item,
                old_status,
                new_status,
            } => self.status_transitioned(&item, &old_status, &new_status),
            ReconcileEvent::RelationshipAdded {
                item_id,
                scheme,
                category_ids,
            } => self.relationship_added(item_id, &scheme, &category_ids),
            ReconcileEvent::RelationshipRemoved {
                item_id,
                scheme,
                category_ids,
            } => self.relationship_removed(item_id, &scheme, &category_ids),
        }
    }

    /// Reconciles a lifecycle status change of `item` and its dependents.
    pub fn status_transitioned(
        &mut self,
        item: &Item,
        old_status: &str,
        new_status: &str,
    ) -> ReconcileResult<ReconcileSummary> {
        self.reconcile_transition(item, old_status, new_status)
    }

    /// Reconciles categories newly linked to an item.
    pub fn relationship_added(
        &mut self,
        item_id: ItemId,
        scheme: &str,
        category_ids: &[CategoryId],
    ) -> ReconcileResult<ReconcileSummary> {
        self.reconcile_relationship(item_id, scheme, category_ids, Direction::Increment)
    }

    /// Reconciles categories unlinked from an item.
    pub fn relationship_removed(
        &mut self,
        item_id: ItemId,
        scheme: &str,
        category_ids: &[CategoryId],
    ) -> ReconcileResult<ReconcileSummary> {
        self.reconcile_relationship(item_id, scheme, category_ids, Direction::Decrement)
    }

    fn reconcile_transition(
        &mut self,
        item: &Item,
        old_status: &str,
        new_status: &str,
    ) -> ReconcileResult<ReconcileSummary> {
        let mut summary = ReconcileSummary {
            items_visited: 1,
            ..ReconcileSummary::default()
        };
        let Some(direction) = resolve(&self.classifier, old_status, new_status).direction() else {
            debug!(
                "event=transition module=count status=noop session_id={} item_id={} old={} new={}",
                self.id, item.id, old_status, new_status
            );
            return Ok(summary);
        };

        let engine = self.engine;
        let dependents = expand(&engine.content, item, new_status, &self.config.leaf_kinds)
            .map_err(|source| retrieval_error(item.id, source))?;

        if check(dependents.len(), self.config.dependent_volume_limit) == GuardDecision::Fallback {
            self.fallback(item, &dependents, &mut summary)?;
            return Ok(summary);
        }

        for target in engine.collect_targets(item)? {
            self.apply_direction(
                item.id,
                &target.scheme,
                direction,
                &target.category_ids,
                &mut summary,
            )?;
        }
        debug!(
            "event=transition module=count status=ok session_id={} item_id={} direction={} dependents={}",
            self.id,
            item.id,
            direction,
            dependents.len()
        );

        for dependent in &dependents {
            let nested =
                self.reconcile_transition(&dependent.item, old_status, dependent.status.as_str())?;
            summary.merge(&nested);
        }
        Ok(summary)
    }

    fn reconcile_relationship(
        &mut self,
        item_id: ItemId,
        scheme: &str,
        category_ids: &[CategoryId],
        direction: Direction,
    ) -> ReconcileResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let engine = self.engine;
        let Some(item) = engine.load_item(item_id)? else {
            debug!(
                "event=relationship module=count status=skipped session_id={} item_id={} reason=not_found",
                self.id, item_id
            );
            return Ok(summary);
        };
        summary.items_visited += 1;

        let status = effective_status(&engine.content, &item)
            .map_err(|source| retrieval_error(item_id, source))?;
        if !self.classifier.is_counted(status.as_str()) {
            debug!(
                "event=relationship module=count status=noop session_id={} item_id={} scheme={} effective_status={}",
                self.id,
                item_id,
                scheme,
                status.as_str()
            );
            return Ok(summary);
        }

        self.apply_direction(item_id, scheme, direction, category_ids, &mut summary)?;
        Ok(summary)
    }

    fn apply_direction(
        &mut self,
        item_id: ItemId,
        scheme: &str,
        direction: Direction,
        category_ids: &[CategoryId],
        summary: &mut ReconcileSummary,
    ) -> ReconcileResult<()> {
        let fresh = self
            .ledger
            .record_if_new(item_id, scheme, direction, category_ids);
        summary.duplicates_skipped += category_ids.len() - fresh.len();
        if fresh.is_empty() {
            return Ok(());
        }

        let engine = self.engine;
        if engine.overrides.scheme_has_override(scheme) {
            engine.invoke_override(&fresh, scheme)?;
            summary.overrides_invoked += 1;
            return Ok(());
        }

        let rows = engine
            .counts
            .apply_count_delta(&fresh, scheme, direction)
            .map_err(|source| {
                error!(
                    "event=count_delta module=count status=error session_id={} item_id={} scheme={} direction={} error={}",
                    self.id, item_id, scheme, direction, source
                );
                mutation_error(scheme, source)
            })?;
        engine
            .counts
            .invalidate_cache(&fresh, scheme)
            .map_err(|source| mutation_error(scheme, source))?;

        match direction {
            Direction::Increment => summary.incremented += fresh.len(),
            Direction::Decrement => summary.decremented += fresh.len(),
        }
        summary.rows_affected += rows;
        Ok(())
    }

    fn fallback(
        &mut self,
        item: &Item,
        dependents: &[DependentItem],
        summary: &mut ReconcileSummary,
    ) -> ReconcileResult<()> {
        let dependent_count = dependents.len();
        summary.fallbacks += 1;
        info!(
            "event=volume_fallback module=count session_id={} item_id={} dependents={} limit={}",
            self.id,
            item.id,
            dependent_count,
            self.config.dependent_volume_limit.as_raw()
        );

        let engine = self.engine;
        if let Some(strategy) = engine.fallback.as_ref() {
            let outcome = strategy.handle(item, dependent_count).map_err(|message| {
                ReconcileError::Fallback {
                    item_id: item.id,
                    message,
                }
            })?;
            if outcome == FallbackOutcome::Handled {
                return Ok(());
            }
        }

        let targets = engine.subtree_targets(item, dependents, &self.config.leaf_kinds)?;
        engine.recount_targets(item.id, targets, &self.classifier, summary)
    }
}

fn retrieval_error(item_id: ItemId, source: StoreError) -> ReconcileError {
    error!("event=retrieval module=count status=error item_id={item_id} error={source}");
    ReconcileError::Retrieval { item_id, source }
}

fn mutation_error(scheme: &str, source: StoreError) -> ReconcileError {
    ReconcileError::Mutation {
        scheme: scheme.to_string(),
        source,
    }
}
