//! Tests for TableManager
//!
//! These tests verify:
//! - Table creation, drop, and catalog consistency
//! - Record validation and CRUD by ordinal
//! - Lazy index builds that follow mutations
//! - Reopening a root and diagnostics

use std::fs;
use std::path::PathBuf;

use tabula::table::{analyze, CATALOG_NAME};
use tabula::{Config, Record, Schema, TableManager, TabulaError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_manager() -> (TempDir, PathBuf, TableManager) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    let config = Config::builder().data_dir(&path).btree_order(4).build();
    let manager = TableManager::open(config).unwrap();
    (temp_dir, path, manager)
}

fn reopen(path: &PathBuf) -> TableManager {
    TableManager::open(Config::builder().data_dir(path).build()).unwrap()
}

fn users_schema() -> Schema {
    Schema::parse("Id:int,username:string:16").unwrap()
}

fn user(id: i32, name: &str) -> Record {
    vec![Some(Value::Integer(id)), Some(Value::Text(name.to_string()))]
}

fn catalog_rows_for(manager: &TableManager, name: &str) -> usize {
    manager
        .catalog_entries()
        .unwrap()
        .iter()
        .filter(|e| e.table_name == name)
        .count()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_create_table_layout_and_catalog() {
    let (_temp, path, mut manager) = setup_temp_manager();

    manager.create_table("users", &users_schema()).unwrap();

    assert!(path.join("users").join("metadata.meta").is_file());
    assert!(path.join("users").join("data.dat").is_file());
    assert!(path.join("users").join("blobs").is_dir());
    assert!(path.join(CATALOG_NAME).join("data.dat").is_file());

    assert_eq!(catalog_rows_for(&manager, "users"), 1);
    let entry = &manager.catalog_entries().unwrap()[0];
    assert_eq!(entry.schema, "Id:int,username:string:16");
    assert!(entry.blob_fields.is_empty());
    assert!(entry.created_at.is_some());
    assert_eq!(manager.tables().unwrap(), vec!["users"]);
}

#[test]
fn test_drop_table_removes_catalog_row() {
    let (_temp, path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager.create_table("orders", &users_schema()).unwrap();

    manager.drop_table("users").unwrap();

    assert!(!path.join("users").exists());
    assert_eq!(catalog_rows_for(&manager, "users"), 0);
    assert_eq!(catalog_rows_for(&manager, "orders"), 1);
    assert_eq!(manager.catalog_info().row_count, 1);
    assert!(matches!(
        manager.insert_record("users", &user(1, "x")),
        Err(TabulaError::TableNotFound(_))
    ));
    assert!(matches!(manager.drop_table("users"), Err(TabulaError::TableNotFound(_))));
}

#[test]
fn test_create_rejects_duplicates_and_reserved_names() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();

    assert!(matches!(
        manager.create_table("users", &users_schema()),
        Err(TabulaError::TableAlreadyExists(_))
    ));
    assert!(matches!(
        manager.create_table("__CATALOG", &users_schema()),
        Err(TabulaError::InvalidArgument(_))
    ));
    assert!(matches!(
        manager.create_table("  ", &users_schema()),
        Err(TabulaError::InvalidArgument(_))
    ));
    assert!(matches!(
        manager.create_table("../escape", &users_schema()),
        Err(TabulaError::InvalidArgument(_))
    ));
    assert_eq!(catalog_rows_for(&manager, "users"), 1);
}

#[test]
fn test_catalog_is_read_only_to_callers() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();

    assert!(matches!(
        manager.insert_record(CATALOG_NAME, &user(1, "x")),
        Err(TabulaError::InvalidArgument(_))
    ));
    assert!(matches!(manager.drop_table(CATALOG_NAME), Err(TabulaError::InvalidArgument(_))));

    let rows = manager.get_all_records(CATALOG_NAME).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Some(Value::Text("users".to_string())));
    assert_eq!(manager.get_record(CATALOG_NAME, 0).unwrap(), rows[0]);
}

#[test]
fn test_table_names_are_case_insensitive() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("Users", &users_schema()).unwrap();

    manager.insert_record("USERS", &user(1, "Alice")).unwrap();
    assert_eq!(manager.table_info("users").unwrap().row_count, 1);

    manager.drop_table("users").unwrap();
    assert_eq!(catalog_rows_for(&manager, "Users"), 0);
}

#[test]
fn test_recreate_after_external_removal_replaces_stale_catalog_row() {
    let (_temp, path, mut manager) = setup_temp_manager();
    manager.create_table("Users", &users_schema()).unwrap();
    fs::remove_dir_all(path.join("Users")).unwrap();

    manager
        .create_table("users", &Schema::parse("Id:int").unwrap())
        .unwrap();

    let entries = manager.catalog_entries().unwrap();
    let matching: Vec<_> = entries
        .iter()
        .filter(|e| e.table_name.eq_ignore_ascii_case("users"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].table_name, "users");
    assert_eq!(matching[0].schema, "Id:int");
    assert_eq!(manager.catalog_info().row_count, 1);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_insert_validation() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();

    let short = vec![Some(Value::Integer(1))];
    let wrong_type = vec![Some(Value::Text("1".to_string())), Some(Value::Text("a".to_string()))];
    let too_long = user(1, "a name that is far too long");

    for bad in [short, wrong_type, too_long] {
        assert!(matches!(
            manager.insert_record("users", &bad),
            Err(TabulaError::InvalidArgument(_))
        ));
    }
    assert_eq!(manager.table_info("users").unwrap().row_count, 0);

    // Absent values and exactly max length are fine
    manager.insert_record("users", &[None, None]).unwrap();
    manager.insert_record("users", &user(2, "sixteen chars!!!")).unwrap();
    assert_eq!(manager.table_info("users").unwrap().row_count, 2);
}

#[test]
fn test_batch_insert_is_all_or_nothing() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();

    let batch = vec![user(1, "ok"), vec![Some(Value::Boolean(true)), None], user(3, "ok")];
    assert!(manager.insert_records("users", &batch).is_err());
    assert!(manager.get_all_records("users").unwrap().is_empty());

    manager
        .insert_records("users", &[user(1, "a"), user(2, "b")])
        .unwrap();
    assert_eq!(manager.table_info("users").unwrap().row_count, 2);
}

// =============================================================================
// CRUD Tests
// =============================================================================

#[test]
fn test_read_after_write() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();

    let rows: Vec<Record> = (0..25).map(|i| user(i, &format!("user{}", i))).collect();
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(manager.insert_record("users", row).unwrap(), i);
    }

    for (i, row) in rows.iter().enumerate() {
        assert_eq!(&manager.get_record("users", i).unwrap(), row);
    }
    // Second read is served from the row cache
    assert_eq!(manager.get_record("users", 3).unwrap(), rows[3]);
    assert_eq!(manager.get_all_records("users").unwrap(), rows);
}

#[test]
fn test_get_record_out_of_range() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager.insert_record("users", &user(1, "a")).unwrap();

    assert!(matches!(
        manager.get_record("users", 1),
        Err(TabulaError::RecordOutOfRange { index: 1, len: 1 })
    ));
}

#[test]
fn test_delete_shifts_records() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    let rows: Vec<Record> = (0..5).map(|i| user(i, &format!("u{}", i))).collect();
    manager.insert_records("users", &rows).unwrap();

    // Populate the cache, then delete
    manager.get_record("users", 2).unwrap();
    manager.delete_record("users", 2).unwrap();

    assert_eq!(manager.table_info("users").unwrap().row_count, 4);
    assert_eq!(manager.get_record("users", 2).unwrap(), rows[3]);
}

#[test]
fn test_delete_records_batch() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    let rows: Vec<Record> = (0..6).map(|i| user(i, &format!("u{}", i))).collect();
    manager.insert_records("users", &rows).unwrap();

    manager.delete_records("users", &[1, 4, 1, 0]).unwrap();

    let remaining = manager.get_all_records("users").unwrap();
    assert_eq!(remaining, vec![rows[2].clone(), rows[3].clone(), rows[5].clone()]);
    assert!(matches!(
        manager.delete_records("users", &[7]),
        Err(TabulaError::RecordOutOfRange { .. })
    ));
}

#[test]
fn test_update_keeps_position() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager
        .insert_records("users", &[user(1, "Alice"), user(2, "Bob"), user(3, "Carol")])
        .unwrap();

    manager.update_record("users", 1, &user(2, "Robert")).unwrap();

    assert_eq!(manager.get_record("users", 1).unwrap(), user(2, "Robert"));
    assert_eq!(manager.table_info("users").unwrap().row_count, 3);
    assert!(matches!(
        manager.update_record("users", 3, &user(4, "x")),
        Err(TabulaError::RecordOutOfRange { .. })
    ));
}

#[test]
fn test_mutations_touch_catalog() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    let before = manager.catalog_entries().unwrap()[0].updated_at.unwrap();

    std::thread::sleep(std::time::Duration::from_millis(5));
    manager.insert_record("users", &user(1, "a")).unwrap();

    let entries = manager.catalog_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].updated_at.unwrap() > before);
    assert_eq!(entries[0].created_at, Some(before));
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_concrete_search_scenario() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager
        .insert_records("users", &[user(1, "Alice"), user(2, "Bob"), user(3, "Alice")])
        .unwrap();

    manager.build_index("users", "username", false).unwrap();
    assert_eq!(manager.search_exact("users", "username", "Alice").unwrap(), vec![0, 2]);
    assert_eq!(manager.search_prefix("users", "username", "Ali").unwrap(), vec![0, 2]);
    assert_eq!(
        manager.search_range("users", "username", Some("Bob"), Some("Bob")).unwrap(),
        vec![1]
    );
}

#[test]
fn test_search_builds_lazily_and_follows_mutations() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager
        .insert_records("users", &[user(1, "Alice"), user(2, "Bob"), user(3, "Alice")])
        .unwrap();

    assert_eq!(manager.search_exact("users", "username", "Bob").unwrap(), vec![1]);

    manager.delete_record("users", 0).unwrap();
    assert_eq!(manager.search_exact("users", "username", "Bob").unwrap(), vec![0]);
    assert_eq!(manager.search_exact("users", "username", "Alice").unwrap(), vec![1]);

    manager.update_record("users", 1, &user(3, "Zed")).unwrap();
    assert!(manager.search_exact("users", "username", "Alice").unwrap().is_empty());
    assert_eq!(manager.search_top_k("users", "username", 1, true).unwrap(), vec![1]);
}

#[test]
fn test_search_helpers() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager
        .insert_records("users", &[user(1, "a"), user(2, "b"), user(3, "c"), user(4, "b")])
        .unwrap();

    let mut gt = manager.search_greater_than("users", "username", "a", false).unwrap();
    gt.sort_unstable();
    assert_eq!(gt, vec![1, 2, 3]);
    assert_eq!(manager.search_less_than("users", "username", "b", false).unwrap(), vec![0]);

    let records = manager.search_records_exact("users", "username", "b").unwrap();
    assert_eq!(records, vec![user(2, "b"), user(4, "b")]);

    assert!(matches!(
        manager.search_exact("users", "email", "x"),
        Err(TabulaError::UnknownField(_))
    ));
    assert!(matches!(
        manager.build_index("users", "email", true),
        Err(TabulaError::UnknownField(_))
    ));
}

// =============================================================================
// Persistence and Diagnostics Tests
// =============================================================================

#[test]
fn test_reopen_preserves_tables() {
    let (_temp, path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager
        .insert_records("users", &[user(1, "Alice"), user(2, "Bob")])
        .unwrap();
    drop(manager);

    let mut manager = reopen(&path);
    let info = manager.table_info("users").unwrap();
    assert_eq!(info.row_count, 2);
    assert_eq!(info.schema, users_schema());
    assert_eq!(manager.all_table_info().unwrap().len(), 1);
    assert_eq!(manager.search_exact("users", "username", "Bob").unwrap(), vec![1]);
    assert_eq!(catalog_rows_for(&manager, "users"), 1);
}

#[test]
fn test_diagnostics_on_healthy_root() {
    let (_temp, _path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    let rows: Vec<Record> = (0..40).map(|i| user(i, &format!("user{}", i % 7))).collect();
    manager.insert_records("users", &rows).unwrap();

    let report = analyze(&mut manager).unwrap();

    assert!(!report.has_errors(), "{:?}", report);
    assert!(!report.has_warnings(), "{:?}", report);
    assert_eq!(report.catalog_rows, 1);
    let table = &report.tables[0];
    assert_eq!(table.row_count, 40);
    assert_eq!(table.indexes.len(), 2);
    let names = table.indexes.iter().find(|i| i.field == "username").unwrap();
    assert_eq!(names.keys, 7);
    assert_eq!(names.sample_key.as_deref(), Some("user0"));
    assert_eq!(names.sample_hits, 6);
}

#[test]
fn test_diagnostics_finds_catalog_drift() {
    let (_temp, path, mut manager) = setup_temp_manager();
    manager.create_table("users", &users_schema()).unwrap();
    manager.create_table("orders", &users_schema()).unwrap();

    fs::remove_dir_all(path.join("orders")).unwrap();
    fs::create_dir(path.join("stray")).unwrap();
    fs::write(
        path.join("stray").join("metadata.meta"),
        fs::read_to_string(path.join("users").join("metadata.meta")).unwrap(),
    )
    .unwrap();
    fs::write(path.join("stray").join("data.dat"), b"").unwrap();

    let report = analyze(&mut manager).unwrap();

    assert!(report.has_errors());
    assert!(report.catalog_issues.iter().any(|i| i.contains("orders")));
    let stray = report.tables.iter().find(|t| t.name == "stray").unwrap();
    assert!(stray.errors.iter().any(|e| e.contains("no catalog row")));
}
