//! Collaborator contracts consumed by the reconciliation engine.
//!
//! # Responsibility
//! - Define read access to items, schemes and relationships (`ContentStore`).
//! - Define the count mutation boundary (`CountStore`).
//!
//! # Invariants
//! - Sequences returned by `ContentStore` are ordered deterministically
//!   (ascending id) so repeated runs issue identical call sequences.
//! - `CountStore::apply_count_delta` is one atomic statement per call and
//!   floors decrements at zero; the engine never re-checks the floor.
//! - An unknown scheme yields empty results, never an error.

use crate::count::classifier::StatusClassifier;
use crate::db::DbError;
use crate::model::category::{CategoryId, Direction};
use crate::model::item::{Item, ItemId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Collaborator failure.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    ItemNotFound(ItemId),
    /// A referenced category-instance does not exist in the given scheme.
    CategoryNotFound {
        category_id: CategoryId,
        scheme: String,
    },
    InvalidData(String),
    MissingRequiredTable(&'static str),
    /// Backend is reachable in principle but refused the call.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::CategoryNotFound {
                category_id,
                scheme,
            } => write!(f, "category {category_id} not found in scheme `{scheme}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read-only view of items and their category relationships.
pub trait ContentStore {
    /// Loads one item, `None` when it does not exist.
    fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>>;
    /// Returns scheme names registered for an item kind, sorted.
    fn get_applicable_schemes(&self, item_kind: &str) -> StoreResult<Vec<String>>;
    /// Returns category-instance ids linked to the item in one scheme, ascending.
    fn get_category_instances(&self, item_id: ItemId, scheme: &str)
        -> StoreResult<Vec<CategoryId>>;
    /// Returns direct children of the item, ascending by id.
    fn get_dependents(&self, item_id: ItemId) -> StoreResult<Vec<Item>>;
}

/// Mutation boundary for aggregate counts.
pub trait CountStore {
    /// Adds +1/-1 to every listed category of `scheme` in one atomic statement.
    ///
    /// Decrements never take a count below zero. Returns rows affected.
    fn apply_count_delta(
        &self,
        category_ids: &[CategoryId],
        scheme: &str,
        direction: Direction,
    ) -> StoreResult<usize>;

    /// Recomputes one category count from its current relationships.
    ///
    /// `classifier` is the caller's counted-status snapshot. Returns the new count.
    fn recount_authoritative(
        &self,
        category_id: CategoryId,
        scheme: &str,
        classifier: &StatusClassifier,
    ) -> StoreResult<u64>;

    /// Notifies downstream caches that counts in `scheme` changed.
    fn invalidate_cache(&self, category_ids: &[CategoryId], scheme: &str) -> StoreResult<()>;
}
