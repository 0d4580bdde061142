use std::env;
use std::path::PathBuf;

use streaming_iterator::StreamingIterator;

use pooldb::config::{Config, DbConfig, PoolConfig};
use pooldb::{DatabaseManager, SqlValue};

const SCHEMA: &str = "\
-- repository item table
DROP TABLE item;
CREATE TABLE item (
  item_id integer PRIMARY KEY,
  title varchar(128),
  active boolean,
  created timestamp
);
";

fn path_to_testdb(name: &str) -> PathBuf {
    env::temp_dir().join(format!("pooldb_it_{}_{}.db", std::process::id(), name))
}

fn manager_for(name: &str, max_connections: usize) -> (DatabaseManager, PathBuf) {
    let path = path_to_testdb(name);
    let _ = std::fs::remove_file(&path);
    let cfg = Config {
        db: DbConfig::default(),
        pool: PoolConfig {
            url: format!("sqlite:{}", path.display()),
            max_connections,
            retry_wait_ms: 10,
            max_attempts: 3,
        },
    };
    let m = DatabaseManager::new(cfg).expect("manager should build");
    m.load_script(SCHEMA).expect("schema should load");
    (m, path)
}

#[test]
fn test_schema_load_and_crud_round_trip() {
    let (m, path) = manager_for("crud", 4);

    let mut row = m.create("item").unwrap();
    row.set_text("title", "On the Origin of Species").unwrap();
    row.set_bool("active", true).unwrap();
    m.update(&row).unwrap();

    let id = row.int_column("item_id").unwrap();
    let found = m.find("item", id).unwrap().expect("row should exist");
    assert_eq!(found.text_column("title"), Some("On the Origin of Species"));
    assert_eq!(found.bool_column("active"), Some(true));
    assert!(found.is_null("created"));

    assert_eq!(m.delete("item", id).unwrap(), 1);
    assert!(m.find("item", id).unwrap().is_none());

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_sequential_ids_are_strictly_increasing() {
    let (m, path) = manager_for("ids", 2);

    let mut last = 0;
    for _ in 0..25 {
        let row = m.create("item").unwrap();
        let id = row.int_column("item_id").unwrap();
        assert!(id > last, "id {} should exceed {}", id, last);
        last = id;
    }

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_pool_reuses_connections_across_operations() {
    let (m, path) = manager_for("reuse", 2);

    for _ in 0..10 {
        m.create("item").unwrap();
    }
    let status = m.pool_status();
    // Every operation checks its connection back in, so the pool never needs
    // to grow past one connection for this sequential workload.
    assert_eq!(status.used, 0);
    assert!(status.size <= 2);

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_concurrent_readers_share_the_pool() {
    let (m, path) = manager_for("readers", 4);

    let mut row = m.create("item").unwrap();
    row.set_text("title", "shared").unwrap();
    m.update(&row).unwrap();
    let id = row.int_column("item_id").unwrap();

    let m = std::sync::Arc::new(m);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let m = m.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..10 {
                let found = m.find("item", id).unwrap().expect("row should exist");
                assert_eq!(found.text_column("title"), Some("shared"));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!(m.pool_status().size <= 4);

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_query_streams_rows_in_key_order() {
    let (m, path) = manager_for("stream", 2);

    for title in ["first", "second", "third"] {
        let mut row = m.create("item").unwrap();
        row.set_text("title", title).unwrap();
        m.update(&row).unwrap();
    }

    let mut it = m
        .query(
            Some("item"),
            "SELECT * FROM item ORDER BY item_id",
            &[],
        )
        .unwrap();
    let mut titles = Vec::new();
    while let Some(row) = it.next() {
        titles.push(String::from(row.text_column("title").unwrap()));
    }
    assert_eq!(titles, vec!["first", "second", "third"]);

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_find_by_unique_binds_hostile_values_safely() {
    let (m, path) = manager_for("binding", 2);

    let mut row = m.create("item").unwrap();
    row.set_text("title", "x' OR '1'='1").unwrap();
    m.update(&row).unwrap();

    // The quoted value matches only as data, never as SQL.
    let found = m
        .find_by_unique("item", "title", &SqlValue::from("x' OR '1'='1"))
        .unwrap();
    assert!(found.is_some());
    let none = m
        .find_by_unique("item", "title", &SqlValue::from("' OR 1=1 --"))
        .unwrap();
    assert!(none.is_none());

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_rerunning_the_schema_script_resets_the_table() {
    let (m, path) = manager_for("reload", 2);

    m.create("item").unwrap();
    let applied = m.load_script(SCHEMA).unwrap();
    assert_eq!(applied, 2);
    let count = m
        .query_single(None, "SELECT COUNT(*) AS n FROM item", &[])
        .unwrap()
        .expect("count row");
    assert_eq!(count.int_column("n"), Some(0));

    let _ = std::fs::remove_file(path);
}
