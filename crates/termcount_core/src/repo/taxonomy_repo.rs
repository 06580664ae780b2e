//! SQLite implementation of the content and count collaborators.
//!
//! # Responsibility
//! - Serve items, scheme registrations and relationships to the engine.
//! - Execute count deltas and authoritative recounts as single statements.
//! - Provide the write helpers an event-source layer uses to mutate content.
//!
//! # Invariants
//! - Deltas are one `UPDATE` each; decrements carry `count > 0` so the
//!   stored count never goes negative.
//! - Recount resolves `inherit` through the parent chain the same way the
//!   engine does, bounded at 16 levels.
//! - Link/unlink helpers never touch counts; reconciliation is the caller's job.

use crate::count::classifier::StatusClassifier;
use crate::model::category::{CategoryId, Direction};
use crate::model::item::{Item, ItemId, INHERIT_STATUS};
use crate::store::{ContentStore, CountStore, StoreError, StoreResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const REQUIRED_TABLES: &[&str] = &[
    "items",
    "schemes",
    "scheme_object_kinds",
    "categories",
    "item_categories",
];

/// SQLite-backed item/category store.
#[derive(Clone, Copy)]
pub struct SqliteTaxonomyStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaxonomyStore<'conn> {
    /// Constructs a store from a migrated connection.
    ///
    /// # Errors
    /// - `MissingRequiredTable` when migrations have not been applied.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        for &table in REQUIRED_TABLES {
            if !table_exists(conn, table)? {
                return Err(StoreError::MissingRequiredTable(table));
            }
        }
        Ok(Self { conn })
    }

    /// Creates a scheme if it does not exist yet.
    pub fn create_scheme(&self, name: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO schemes (name) VALUES (?1);",
            [name],
        )?;
        Ok(())
    }

    /// Makes `scheme` applicable to items of `object_kind`.
    pub fn register_scheme_for_kind(&self, scheme: &str, object_kind: &str) -> StoreResult<()> {
        self.create_scheme(scheme)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO scheme_object_kinds (scheme, object_kind) VALUES (?1, ?2);",
            params![scheme, object_kind],
        )?;
        Ok(())
    }

    /// Creates one category-instance with a zero count.
    pub fn create_category(&self, scheme: &str, name: &str) -> StoreResult<CategoryId> {
        self.create_scheme(scheme)?;
        self.conn.execute(
            "INSERT INTO categories (scheme, name, count) VALUES (?1, ?2, 0);",
            params![scheme, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts one item and returns its id.
    pub fn create_item(
        &self,
        kind: &str,
        status: &str,
        parent_id: Option<ItemId>,
    ) -> StoreResult<ItemId> {
        self.conn.execute(
            "INSERT INTO items (kind, status, parent_id) VALUES (?1, ?2, ?3);",
            params![kind, status, parent_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Writes a new status and returns the previous one.
    pub fn set_item_status(&self, item_id: ItemId, status: &str) -> StoreResult<String> {
        let previous: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM items WHERE id = ?1;",
                [item_id],
                |row| row.get(0),
            )
            .optional()?;
        let previous = previous.ok_or(StoreError::ItemNotFound(item_id))?;

        self.conn.execute(
            "UPDATE items SET status = ?2 WHERE id = ?1;",
            params![item_id, status],
        )?;
        Ok(previous)
    }

    /// Links categories to an item; returns the ids that were not linked before.
    pub fn link(
        &self,
        item_id: ItemId,
        category_ids: &[CategoryId],
    ) -> StoreResult<Vec<CategoryId>> {
        let mut linked = Vec::new();
        for category_id in category_ids {
            let changed = self.conn.execute(
                "INSERT OR IGNORE INTO item_categories (item_id, category_id) VALUES (?1, ?2);",
                params![item_id, category_id],
            )?;
            if changed == 1 {
                linked.push(*category_id);
            }
        }
        Ok(linked)
    }

    /// Unlinks categories from an item; returns the ids that were linked.
    pub fn unlink(
        &self,
        item_id: ItemId,
        category_ids: &[CategoryId],
    ) -> StoreResult<Vec<CategoryId>> {
        let mut unlinked = Vec::new();
        for category_id in category_ids {
            let changed = self.conn.execute(
                "DELETE FROM item_categories WHERE item_id = ?1 AND category_id = ?2;",
                params![item_id, category_id],
            )?;
            if changed == 1 {
                unlinked.push(*category_id);
            }
        }
        Ok(unlinked)
    }

    /// Reads the stored count of one category.
    pub fn category_count(&self, category_id: CategoryId) -> StoreResult<u64> {
        let count: Option<i64> = self
            .conn
            .query_row(
                "SELECT count FROM categories WHERE id = ?1;",
                [category_id],
                |row| row.get(0),
            )
            .optional()?;
        let count = count.ok_or_else(|| {
            StoreError::InvalidData(format!("category {category_id} does not exist"))
        })?;
        parse_count(count)
    }

    /// Reads the cache version bumped by `invalidate_cache`.
    pub fn scheme_cache_version(&self, scheme: &str) -> StoreResult<i64> {
        let version: Option<i64> = self
            .conn
            .query_row(
                "SELECT cache_version FROM schemes WHERE name = ?1;",
                [scheme],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.unwrap_or(0))
    }
}

impl ContentStore for SqliteTaxonomyStore<'_> {
    fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, kind, status, parent_id FROM items WHERE id = ?1;",
                [id],
                parse_item_row,
            )
            .optional()?;
        Ok(item)
    }

    fn get_applicable_schemes(&self, item_kind: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT scheme
             FROM scheme_object_kinds
             WHERE object_kind = ?1
             ORDER BY scheme ASC;",
        )?;
        let schemes = stmt
            .query_map([item_kind], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schemes)
    }

    fn get_category_instances(
        &self,
        item_id: ItemId,
        scheme: &str,
    ) -> StoreResult<Vec<CategoryId>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id
             FROM item_categories ic
             INNER JOIN categories c ON c.id = ic.category_id
             WHERE ic.item_id = ?1
               AND c.scheme = ?2
             ORDER BY c.id ASC;",
        )?;
        let ids = stmt
            .query_map(params![item_id, scheme], |row| row.get::<_, CategoryId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn get_dependents(&self, item_id: ItemId) -> StoreResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, status, parent_id
             FROM items
             WHERE parent_id = ?1
             ORDER BY id ASC;",
        )?;
        let items = stmt
            .query_map([item_id], parse_item_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }
}

impl CountStore for SqliteTaxonomyStore<'_> {
    fn apply_count_delta(
        &self,
        category_ids: &[CategoryId],
        scheme: &str,
        direction: Direction,
    ) -> StoreResult<usize> {
        if category_ids.is_empty() {
            return Ok(0);
        }

        let assignment = match direction {
            Direction::Increment => "count = count + 1",
            Direction::Decrement => "count = count - 1",
        };
        let floor = match direction {
            Direction::Increment => "",
            Direction::Decrement => " AND count > 0",
        };
        let sql = format!(
            "UPDATE categories
             SET {assignment}
             WHERE scheme = ?1{floor}
               AND id IN ({});",
            placeholders(2, category_ids.len())
        );

        let mut bind_values = vec![Value::Text(scheme.to_string())];
        bind_values.extend(category_ids.iter().map(|id| Value::Integer(*id)));
        Ok(self.conn.execute(&sql, params_from_iter(bind_values))?)
    }

    fn recount_authoritative(
        &self,
        category_id: CategoryId,
        scheme: &str,
        classifier: &StatusClassifier,
    ) -> StoreResult<u64> {
        let counted: Vec<&str> = classifier.counted_statuses().collect();
        let predicate = if counted.is_empty() {
            "0".to_string()
        } else {
            format!("status IN ({})", placeholders(4, counted.len()))
        };
        let sql = format!(
            "UPDATE categories
             SET count = (
                WITH RECURSIVE chain(item_id, ancestor_id, status, depth) AS (
                    SELECT i.id, i.id, i.status, 0
                    FROM item_categories ic
                    INNER JOIN items i ON i.id = ic.item_id
                    WHERE ic.category_id = ?1
                    UNION ALL
                    SELECT chain.item_id, p.id, p.status, chain.depth + 1
                    FROM chain
                    INNER JOIN items a ON a.id = chain.ancestor_id
                    INNER JOIN items p ON p.id = a.parent_id
                    WHERE chain.status = ?3
                      AND chain.depth < 16
                )
                SELECT COUNT(DISTINCT item_id) FROM chain WHERE {predicate}
             )
             WHERE id = ?1
               AND scheme = ?2
             RETURNING count;"
        );

        let mut bind_values = vec![
            Value::Integer(category_id),
            Value::Text(scheme.to_string()),
            Value::Text(INHERIT_STATUS.to_string()),
        ];
        bind_values.extend(counted.iter().map(|status| Value::Text((*status).to_string())));

        let count: Option<i64> = self
            .conn
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))
            .optional()?;
        match count {
            Some(value) => parse_count(value),
            None => Err(StoreError::CategoryNotFound {
                category_id,
                scheme: scheme.to_string(),
            }),
        }
    }

    fn invalidate_cache(&self, category_ids: &[CategoryId], scheme: &str) -> StoreResult<()> {
        if category_ids.is_empty() {
            return Ok(());
        }
        self.conn.execute(
            "UPDATE schemes SET cache_version = cache_version + 1 WHERE name = ?1;",
            [scheme],
        )?;
        Ok(())
    }
}

fn parse_item_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get("id")?,
        kind: row.get("kind")?,
        status: row.get("status")?,
        parent_id: row.get("parent_id")?,
    })
}

fn parse_count(value: i64) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative count `{value}` in categories")))
}

/// Builds `?start, ?start+1, ...` with `len` numbered placeholders.
fn placeholders(start: usize, len: usize) -> String {
    (start..start + len)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::placeholders;

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
        assert_eq!(placeholders(4, 1), "?4");
        assert_eq!(placeholders(1, 0), "");
    }
}
