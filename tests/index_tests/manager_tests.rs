//! Tests for IndexManager
//!
//! These tests verify:
//! - Building indexes from a record store
//! - Fail-fast queries against unbuilt indexes
//! - One-sided and top-K queries
//! - Invalidation

use tabula::index::IndexManager;
use tabula::schema::{Record, Schema, Value};
use tabula::storage::RecordStore;
use tabula::TabulaError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_index(rows: &[(i32, Option<&str>)]) -> (TempDir, IndexManager) {
    let temp_dir = TempDir::new().unwrap();
    let schema = Schema::parse("Id:int,username:string:16").unwrap();
    let store = RecordStore::create(temp_dir.path(), &schema).unwrap();

    let records: Vec<Record> = rows
        .iter()
        .map(|(id, name)| vec![Some(Value::Integer(*id)), name.map(|n| Value::Text(n.to_string()))])
        .collect();
    store.append_records(&records).unwrap();

    (temp_dir, IndexManager::new(store, 4))
}

fn sorted(mut ids: Vec<usize>) -> Vec<usize> {
    ids.sort_unstable();
    ids
}

// =============================================================================
// Build Tests
// =============================================================================

#[test]
fn test_build_and_search() {
    let (_temp, mut indexes) = setup_index(&[(1, Some("Alice")), (2, Some("Bob")), (3, Some("Alice"))]);

    assert_eq!(indexes.build_index("username").unwrap(), 3);
    assert!(indexes.is_built("USERNAME"));

    assert_eq!(indexes.search_exact("username", "Alice").unwrap(), vec![0, 2]);
    assert_eq!(indexes.search_prefix("username", "Ali").unwrap(), vec![0, 2]);
    assert_eq!(indexes.search_range("username", Some("Bob"), Some("Bob")).unwrap(), vec![1]);
}

#[test]
fn test_unknown_field() {
    let (_temp, mut indexes) = setup_index(&[(1, Some("Alice"))]);
    assert!(matches!(
        indexes.build_index("email"),
        Err(TabulaError::UnknownField(ref f)) if f == "email"
    ));
}

#[test]
fn test_query_before_build_fails() {
    let (_temp, indexes) = setup_index(&[(1, Some("Alice"))]);
    assert!(matches!(
        indexes.search_exact("username", "Alice"),
        Err(TabulaError::IndexNotBuilt(_))
    ));
    assert!(matches!(
        indexes.search_top_k("username", 1, false),
        Err(TabulaError::IndexNotBuilt(_))
    ));
}

#[test]
fn test_integer_keys_are_rendered_text() {
    let (_temp, mut indexes) = setup_index(&[(10, None), (9, None), (100, None)]);
    indexes.build_index("Id").unwrap();

    assert_eq!(indexes.search_exact("Id", "9").unwrap(), vec![1]);
    // Ordinal ordering: "10" < "100" < "9"
    assert_eq!(indexes.search_top_k("Id", 3, false).unwrap(), vec![0, 2, 1]);
}

#[test]
fn test_absent_values_index_as_empty_key() {
    let (_temp, mut indexes) = setup_index(&[(1, None), (2, Some("x")), (3, None)]);
    indexes.build_index("username").unwrap();
    assert_eq!(indexes.search_exact("username", "").unwrap(), vec![0, 2]);
}

// =============================================================================
// One-Sided and Top-K Tests
// =============================================================================

#[test]
fn test_greater_and_less_than() {
    let rows = [(0, Some("a")), (1, Some("b")), (2, Some("c")), (3, Some("b")), (4, Some("d"))];
    let (_temp, mut indexes) = setup_index(&rows);
    indexes.build_index("username").unwrap();

    assert_eq!(sorted(indexes.search_greater_than("username", "b", false).unwrap()), vec![2, 4]);
    assert_eq!(sorted(indexes.search_greater_than("username", "b", true).unwrap()), vec![1, 2, 3, 4]);
    assert_eq!(sorted(indexes.search_less_than("username", "c", false).unwrap()), vec![0, 1, 3]);
    assert_eq!(sorted(indexes.search_less_than("username", "c", true).unwrap()), vec![0, 1, 2, 3]);
}

#[test]
fn test_top_k() {
    let rows = [(0, Some("m")), (1, Some("c")), (2, Some("x")), (3, Some("a")), (4, Some("q"))];
    let (_temp, mut indexes) = setup_index(&rows);
    indexes.build_index("username").unwrap();

    assert_eq!(indexes.search_top_k("username", 2, false).unwrap(), vec![3, 1]);
    assert_eq!(indexes.search_top_k("username", 2, true).unwrap(), vec![2, 4]);
    assert_eq!(indexes.search_top_k("username", 10, false).unwrap().len(), 5);
    assert!(indexes.search_top_k("username", 0, true).unwrap().is_empty());
}

// =============================================================================
// Invalidation Tests
// =============================================================================

#[test]
fn test_drop_index_and_drop_all() {
    let (_temp, mut indexes) = setup_index(&[(1, Some("Alice"))]);
    indexes.build_index("username").unwrap();
    indexes.build_index("Id").unwrap();
    assert_eq!(indexes.built_fields(), vec!["id", "username"]);

    assert!(indexes.drop_index("Username"));
    assert!(!indexes.drop_index("username"));
    assert!(indexes.is_built("id"));

    indexes.drop_all();
    assert!(!indexes.is_built("id"));
}
