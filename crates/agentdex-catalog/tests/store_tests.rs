use agentdex_catalog::import::parse_records;
use agentdex_catalog::CatalogStore;
use agentdex_core::error::Error;
use agentdex_core::types::AgentRecord;
use rusqlite::Connection;

fn agent(name: &str, use_case: &str) -> AgentRecord {
    let mut rec = AgentRecord::new(name);
    rec.use_case = use_case.to_string();
    rec
}

#[test]
fn dedup_keeps_earliest_row_and_is_idempotent() {
    let store = CatalogStore::open_in_memory().expect("open");
    store
        .insert_many(&[agent("X", "first"), agent("Y", "only"), agent("X", "second"), agent("X", "third")])
        .expect("insert");
    assert_eq!(store.count().expect("count"), 4);

    assert_eq!(store.dedup().expect("dedup"), 2);
    let rows = store.scan_all().expect("scan");
    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["X", "Y"]);
    assert_eq!(rows[0].use_case, "first");

    assert_eq!(store.dedup().expect("second dedup"), 0);
    assert_eq!(store.count().expect("count"), 2);
}

#[test]
fn lookup_missing_name_is_not_found() {
    let store = CatalogStore::open_in_memory().expect("open");
    store.insert_many(&[agent("A", "x")]).expect("insert");
    assert_eq!(store.lookup_by_name("A").expect("lookup").use_case, "x");
    assert!(matches!(store.lookup_by_name("Nope"), Err(Error::NotFound(_))));
}

#[test]
fn update_missing_name_is_not_found() {
    let store = CatalogStore::open_in_memory().expect("open");
    assert!(matches!(store.update(&agent("ghost", "")), Err(Error::NotFound(_))));
    assert!(matches!(store.update_prices("ghost", "a", "b"), Err(Error::NotFound(_))));
}

#[test]
fn enriched_flag_is_never_cleared_by_update() {
    let store = CatalogStore::open_in_memory().expect("open");
    store.insert_many(&[agent("A", "x")]).expect("insert");

    let mut rec = store.lookup_by_name("A").expect("lookup");
    rec.enriched = true;
    rec.latency = "fast".into();
    store.update(&rec).expect("raise flag");

    rec.enriched = false;
    rec.latency = "slow".into();
    store.update(&rec).expect("second update");

    let stored = store.lookup_by_name("A").expect("lookup");
    assert!(stored.enriched);
    assert_eq!(stored.latency, "slow");
    assert!(store.scan_unenriched().expect("scan").is_empty());
}

#[test]
fn update_many_skips_vanished_names() {
    let store = CatalogStore::open_in_memory().expect("open");
    store.insert_many(&[agent("A", "x"), agent("B", "y")]).expect("insert");
    let mut a = agent("A", "x2");
    a.enriched = true;
    let written = store.update_many(&[a, agent("gone", "z")]).expect("update_many");
    assert_eq!(written, 1);
    let unenriched: Vec<_> = store.scan_unenriched().expect("scan").into_iter().map(|r| r.name).collect();
    assert_eq!(unenriched, ["B"]);
}

#[test]
fn update_prices_touches_only_price_fields() {
    let store = CatalogStore::open_in_memory().expect("open");
    store.insert_many(&[agent("A", "keep me")]).expect("insert");
    store.update_prices("A", "$1", "$2").expect("prices");
    let rec = store.lookup_by_name("A").expect("lookup");
    assert_eq!((rec.input_price.as_str(), rec.output_price.as_str()), ("$1", "$2"));
    assert_eq!(rec.use_case, "keep me");
}

#[test]
fn legacy_table_without_flag_column_opens_and_reads_unenriched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("agents.db");
    {
        let conn = Connection::open(&path).expect("raw open");
        conn.execute_batch(
            "CREATE TABLE agents (name TEXT NOT NULL, provider TEXT NOT NULL DEFAULT '',
                use_case TEXT NOT NULL DEFAULT '', category TEXT NOT NULL DEFAULT '',
                input_price TEXT NOT NULL DEFAULT '', output_price TEXT NOT NULL DEFAULT '',
                integration TEXT NOT NULL DEFAULT '', free_tier TEXT NOT NULL DEFAULT '',
                latency TEXT NOT NULL DEFAULT '', website TEXT NOT NULL DEFAULT '',
                alternatives TEXT NOT NULL DEFAULT '');
             INSERT INTO agents (name, use_case) VALUES ('Old', 'legacy row');",
        )
        .expect("legacy schema");
    }

    let store = CatalogStore::open(&path).expect("open legacy");
    let rows = store.scan_unenriched().expect("scan");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].enriched);
    drop(store);

    // reopening must not try to add the column again
    let store = CatalogStore::open(&path).expect("reopen");
    assert_eq!(store.count().expect("count"), 1);
}

#[test]
fn imported_rows_start_unenriched() {
    let batch = parse_records(r#"[{"Name": "A", "Use Case": "x", "Category": "Content"}]"#).expect("parse");
    let store = CatalogStore::open_in_memory().expect("open");
    store.insert_many(&batch.records).expect("insert");
    let rec = store.lookup_by_name("A").expect("lookup");
    assert_eq!(rec.category, "Content");
    assert!(!rec.enriched);
}
