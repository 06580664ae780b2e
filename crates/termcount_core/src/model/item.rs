//! Content item model.
//!
//! # Responsibility
//! - Describe one content unit as seen by the reconciliation engine.
//! - Model status inheritance explicitly instead of via a magic string check
//!   scattered through call sites.
//!
//! # Invariants
//! - An item whose stored status is [`INHERIT_STATUS`] takes its effective
//!   status from its parent at the moment the engine looks at it.
//! - An inheriting item without a parent keeps the literal `inherit` status,
//!   which is not a counted status under any sane configuration.

use serde::{Deserialize, Serialize};

/// Stable identifier of a content item.
pub type ItemId = i64;

/// Stored status value marking an item whose lifecycle follows its parent.
pub const INHERIT_STATUS: &str = "inherit";

/// Read-only snapshot of one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Item type (`post`, `page`, `attachment`, ...). Serialized as `type`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Stored lifecycle status.
    pub status: String,
    pub parent_id: Option<ItemId>,
}

impl Item {
    pub fn new(id: ItemId, kind: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            status: status.into(),
            parent_id: None,
        }
    }

    /// Sets the parent item id.
    pub fn with_parent(mut self, parent_id: ItemId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Returns whether the stored status defers to the parent.
    pub fn inherits_status(&self) -> bool {
        self.status == INHERIT_STATUS
    }
}

/// Where an effective status value came from.
///
/// Resolved once when an item is loaded or expanded, then consumed uniformly
/// by the status classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSource {
    /// The item's own stored status.
    Own(String),
    /// Status taken from the parent item.
    Inherited(String),
}

impl StatusSource {
    /// Concrete status value used for classification.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Own(status) | Self::Inherited(status) => status.as_str(),
        }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, Self::Inherited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{Item, StatusSource};

    #[test]
    fn inherit_status_is_detected_by_exact_match() {
        assert!(Item::new(1, "attachment", "inherit").inherits_status());
        assert!(!Item::new(2, "attachment", "Inherit").inherits_status());
        assert!(!Item::new(3, "post", "published").inherits_status());
    }

    #[test]
    fn status_source_exposes_concrete_value() {
        let inherited = StatusSource::Inherited("published".to_string());
        assert_eq!(inherited.as_str(), "published");
        assert!(inherited.is_inherited());
        assert!(!StatusSource::Own("draft".to_string()).is_inherited());
    }

    #[test]
    fn item_serializes_kind_as_type() {
        let item = Item::new(7, "post", "draft").with_parent(3);
        let value = serde_json::to_value(&item).expect("item should serialize");
        assert_eq!(value["type"], "post");
        assert_eq!(value["parent_id"], 3);
    }
}
