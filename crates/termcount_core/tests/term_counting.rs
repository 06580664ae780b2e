use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use termcount_core::db::{open_db, open_db_in_memory};
use termcount_core::{
    CategoryId, ContentStore, CountingConfig, ItemId, OverrideRegistry, ReconciliationEngine,
    SchemeOverride, SharedConfig, SqliteTaxonomyStore, VolumeLimit,
};

type Engine<'conn> = ReconciliationEngine<SqliteTaxonomyStore<'conn>, SqliteTaxonomyStore<'conn>>;

fn engine_with(conn: &Connection, config: CountingConfig) -> Engine<'_> {
    let store = SqliteTaxonomyStore::try_new(conn).unwrap();
    store.register_scheme_for_kind("category", "post").unwrap();
    ReconciliationEngine::new(store, store, SharedConfig::new(config))
}

fn engine(conn: &Connection) -> Engine<'_> {
    engine_with(conn, CountingConfig::default())
}

/// Inserts an item the way a content store does: relationships first, then
/// the `new -> status` transition, all inside one session.
fn create_item(
    engine: &Engine<'_>,
    kind: &str,
    status: &str,
    parent: Option<ItemId>,
    categories: &[CategoryId],
) -> ItemId {
    let store = engine.content();
    let id = store.create_item(kind, status, parent).unwrap();
    let mut session = engine.begin_session();
    let linked = store.link(id, categories).unwrap();
    session.relationship_added(id, "category", &linked).unwrap();
    let item = store.get_item(id).unwrap().unwrap();
    session.status_transitioned(&item, "new", status).unwrap();
    id
}

fn update_status(engine: &Engine<'_>, id: ItemId, status: &str) {
    let store = engine.content();
    let old = store.set_item_status(id, status).unwrap();
    let item = store.get_item(id).unwrap().unwrap();
    engine
        .begin_session()
        .status_transitioned(&item, &old, status)
        .unwrap();
}

/// Replaces the item's categories in one session.
fn set_categories(engine: &Engine<'_>, id: ItemId, categories: &[CategoryId]) {
    let store = engine.content();
    let current = store.get_category_instances(id, "category").unwrap();
    let stale: Vec<_> = current
        .iter()
        .copied()
        .filter(|category| !categories.contains(category))
        .collect();

    let mut session = engine.begin_session();
    let removed = store.unlink(id, &stale).unwrap();
    session
        .relationship_removed(id, "category", &removed)
        .unwrap();
    let added = store.link(id, categories).unwrap();
    session.relationship_added(id, "category", &added).unwrap();
}

fn add_category(engine: &Engine<'_>, id: ItemId, category: CategoryId) {
    let added = engine.content().link(id, &[category]).unwrap();
    engine
        .begin_session()
        .relationship_added(id, "category", &added)
        .unwrap();
}

fn remove_category(engine: &Engine<'_>, id: ItemId, category: CategoryId) {
    let removed = engine.content().unlink(id, &[category]).unwrap();
    engine
        .begin_session()
        .relationship_removed(id, "category", &removed)
        .unwrap();
}

fn count(engine: &Engine<'_>, category: CategoryId) -> u64 {
    engine.content().category_count(category).unwrap()
}

#[test]
fn publishing_with_one_category_counts_once() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();

    create_item(&engine, "post", "published", None, &[news]);

    assert_eq!(count(&engine, news), 1);
}

#[test]
fn multiple_published_items_are_counted() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();

    for _ in 0..3 {
        create_item(&engine, "post", "published", None, &[news]);
    }

    assert_eq!(count(&engine, news), 3);
}

#[test]
fn draft_items_are_not_counted() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();

    create_item(&engine, "post", "draft", None, &[news]);

    assert_eq!(count(&engine, news), 0);
}

#[test]
fn unpublishing_returns_count_to_zero() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();

    let id = create_item(&engine, "post", "published", None, &[news]);
    update_status(&engine, id, "draft");

    assert_eq!(count(&engine, news), 0);
}

#[test]
fn adding_category_to_published_item_increments() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();
    let ids: Vec<_> = (0..3)
        .map(|_| create_item(&engine, "post", "published", None, &[]))
        .collect();

    add_category(&engine, ids[0], news);

    assert_eq!(count(&engine, news), 1);
}

#[test]
fn removing_category_from_published_item_decrements() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();
    let ids: Vec<_> = (0..3)
        .map(|_| create_item(&engine, "post", "published", None, &[news]))
        .collect();

    remove_category(&engine, ids[0], news);

    assert_eq!(count(&engine, news), 2);
}

const STATUS_PAIRS: &[(&str, &str)] = &[
    ("published", "published"),
    ("draft", "published"),
    ("published", "draft"),
    ("draft", "draft"),
];

#[test]
fn adding_category_after_status_change() {
    for (old_status, new_status) in STATUS_PAIRS {
        let conn = open_db_in_memory().unwrap();
        let engine = engine(&conn);
        let news = engine.content().create_category("category", "news").unwrap();
        let ids: Vec<_> = (0..3)
            .map(|_| create_item(&engine, "post", old_status, None, &[]))
            .collect();

        update_status(&engine, ids[0], new_status);
        add_category(&engine, ids[0], news);

        let expected = u64::from(*new_status == "published");
        assert_eq!(
            count(&engine, news),
            expected,
            "{old_status} -> {new_status}"
        );
    }
}

#[test]
fn removing_category_after_status_change() {
    for (old_status, new_status) in STATUS_PAIRS {
        let conn = open_db_in_memory().unwrap();
        let engine = engine(&conn);
        let news = engine.content().create_category("category", "news").unwrap();
        let ids: Vec<_> = (0..3)
            .map(|_| create_item(&engine, "post", old_status, None, &[news]))
            .collect();

        update_status(&engine, ids[0], new_status);
        remove_category(&engine, ids[0], news);

        let expected = if *old_status == "draft" { 0 } else { 2 };
        assert_eq!(
            count(&engine, news),
            expected,
            "{old_status} -> {new_status}"
        );
    }
}

#[test]
fn replacing_categories_moves_the_count() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();
    let sport = engine.content().create_category("category", "sport").unwrap();
    let id = create_item(&engine, "post", "published", None, &[news]);

    set_categories(&engine, id, &[sport]);

    assert_eq!(count(&engine, news), 0);
    assert_eq!(count(&engine, sport), 1);
}

#[test]
fn inheriting_attachment_of_published_parent_is_counted() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    engine
        .content()
        .register_scheme_for_kind("category", "attachment")
        .unwrap();
    let news = engine.content().create_category("category", "news").unwrap();
    let post = create_item(&engine, "post", "published", None, &[]);
    let attachment = create_item(&engine, "attachment", "inherit", Some(post), &[]);

    add_category(&engine, attachment, news);

    assert_eq!(count(&engine, news), 1);
}

#[test]
fn unattached_attachment_is_not_counted() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    engine
        .content()
        .register_scheme_for_kind("category", "attachment")
        .unwrap();
    let news = engine.content().create_category("category", "news").unwrap();
    let attachment = create_item(&engine, "attachment", "inherit", None, &[]);

    add_category(&engine, attachment, news);

    assert_eq!(count(&engine, news), 0);
}

fn publish_post_with_attachments(config: CountingConfig) -> u64 {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_with(&conn, config);
    engine
        .content()
        .register_scheme_for_kind("category", "attachment")
        .unwrap();
    let news = engine.content().create_category("category", "news").unwrap();
    let post = create_item(&engine, "post", "draft", None, &[news]);
    for _ in 0..11 {
        create_item(&engine, "attachment", "inherit", Some(post), &[news]);
    }
    assert_eq!(count(&engine, news), 0);

    update_status(&engine, post, "published");
    count(&engine, news)
}

#[test]
fn publishing_parent_counts_inheriting_attachments() {
    assert_eq!(publish_post_with_attachments(CountingConfig::default()), 12);
}

#[test]
fn publishing_parent_over_volume_limit_recounts_to_same_total() {
    let config = CountingConfig::default().volume_limit(VolumeLimit::Max(5));
    assert_eq!(publish_post_with_attachments(config), 12);
}

/// Publishes a post in `news` whose 6 attachments are only in `photos`;
/// returns `(news, photos)` counts.
fn publish_post_with_photo_attachments(config: CountingConfig) -> (u64, u64) {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_with(&conn, config);
    engine
        .content()
        .register_scheme_for_kind("category", "attachment")
        .unwrap();
    let news = engine.content().create_category("category", "news").unwrap();
    let photos = engine.content().create_category("category", "photos").unwrap();
    let post = create_item(&engine, "post", "draft", None, &[news]);
    for _ in 0..6 {
        create_item(&engine, "attachment", "inherit", Some(post), &[photos]);
    }

    update_status(&engine, post, "published");
    (count(&engine, news), count(&engine, photos))
}

#[test]
fn categories_only_on_attachments_count_the_same_with_or_without_fallback() {
    let limited = |max| CountingConfig::default().volume_limit(VolumeLimit::Max(max));
    let incremental = publish_post_with_photo_attachments(limited(1000));
    let fallback = publish_post_with_photo_attachments(limited(5));

    assert_eq!(incremental, (1, 6));
    assert_eq!(fallback, incremental);
}

#[test]
fn unpublishing_parent_over_volume_limit_recounts_to_zero() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_with(
        &conn,
        CountingConfig::default().volume_limit(VolumeLimit::Max(2)),
    );
    engine
        .content()
        .register_scheme_for_kind("category", "attachment")
        .unwrap();
    let news = engine.content().create_category("category", "news").unwrap();
    let post = create_item(&engine, "post", "published", None, &[news]);
    for _ in 0..3 {
        create_item(&engine, "attachment", "inherit", Some(post), &[news]);
    }
    assert_eq!(count(&engine, news), 4);

    update_status(&engine, post, "draft");

    assert_eq!(count(&engine, news), 0);
}

#[test]
fn deferred_recount_repairs_a_drifted_count() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let news = engine.content().create_category("category", "news").unwrap();
    let id = create_item(&engine, "post", "published", None, &[news]);
    conn.execute("UPDATE categories SET count = 40 WHERE id = ?1;", [news])
        .unwrap();

    let summary = engine.recount_item(id).unwrap();

    assert_eq!(summary.recounts, 1);
    assert_eq!(count(&engine, news), 1);
    assert!(engine.recount_item(987654).unwrap().is_noop());
}

struct FixedCountOverride {
    db_path: PathBuf,
}

impl SchemeOverride for FixedCountOverride {
    fn scheme(&self) -> &str {
        "test-taxonomy"
    }

    fn update_counts(&self, category_ids: &[CategoryId]) -> Result<(), String> {
        let conn = Connection::open(&self.db_path).map_err(|err| err.to_string())?;
        for category_id in category_ids {
            conn.execute(
                "UPDATE categories SET count = 10 WHERE id = ?1;",
                [category_id],
            )
            .map_err(|err| err.to_string())?;
        }
        Ok(())
    }
}

#[test]
fn scheme_override_replaces_default_arithmetic() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("counts.db");
    let conn = open_db(&db_path).unwrap();

    let mut overrides = OverrideRegistry::new();
    overrides
        .register(Arc::new(FixedCountOverride {
            db_path: db_path.clone(),
        }))
        .unwrap();
    let engine = engine(&conn).with_overrides(overrides);
    let store = engine.content();
    store.register_scheme_for_kind("test-taxonomy", "post").unwrap();
    let term = store.create_category("test-taxonomy", "test term").unwrap();
    let post = create_item(&engine, "post", "published", None, &[]);

    let linked = store.link(post, &[term]).unwrap();
    let summary = engine
        .begin_session()
        .relationship_added(post, "test-taxonomy", &linked)
        .unwrap();

    assert_eq!(summary.overrides_invoked, 1);
    assert_eq!(summary.incremented, 0);
    assert_eq!(count(&engine, term), 10);
}
