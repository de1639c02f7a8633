//! Index Manager
//!
//! Owns one B+Tree per indexed field of a single table.

use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::time::Instant;

use crate::error::{Result, TabulaError};
use crate::storage::RecordStore;

use super::btree::{BPlusTree, RecordId};

/// Field name -> B+Tree map for one table; field names are case-insensitive
#[derive(Debug, Clone)]
pub struct IndexManager {
    store: RecordStore,
    order: usize,
    indexes: HashMap<String, BPlusTree>,
}

impl IndexManager {
    pub fn new(store: RecordStore, order: usize) -> Self {
        Self {
            store,
            order,
            indexes: HashMap::new(),
        }
    }

    /// Build (or rebuild) the index for `field` from every current record.
    ///
    /// Keys are the rendered field values; absent values index as `""`.
    /// Returns the number of records indexed.
    pub fn build_index(&mut self, field: &str) -> Result<usize> {
        let started = Instant::now();
        let (schema, _) = self.store.load_schema_and_field_count()?;
        let position = schema
            .position(field)
            .ok_or_else(|| TabulaError::UnknownField(field.to_string()))?;

        let mut tree = BPlusTree::new(self.order);
        let records = self.store.read_all()?;
        for (id, record) in records.iter().enumerate() {
            let key = record
                .get(position)
                .and_then(|v| v.as_ref())
                .map(|v| v.to_string())
                .unwrap_or_default();
            tree.insert(&key, id);
        }

        self.indexes.insert(field.to_lowercase(), tree);
        tracing::debug!(
            field,
            records = records.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "built index"
        );
        Ok(records.len())
    }

    pub fn is_built(&self, field: &str) -> bool {
        self.indexes.contains_key(&field.to_lowercase())
    }

    /// Borrow the tree behind a built index
    pub fn tree(&self, field: &str) -> Result<&BPlusTree> {
        self.indexes
            .get(&field.to_lowercase())
            .ok_or_else(|| TabulaError::IndexNotBuilt(field.to_string()))
    }

    /// Lowercased names of every built index
    pub fn built_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.indexes.keys().cloned().collect();
        fields.sort();
        fields
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn search_exact(&self, field: &str, key: &str) -> Result<Vec<RecordId>> {
        Ok(self.tree(field)?.search(key))
    }

    pub fn search_prefix(&self, field: &str, prefix: &str) -> Result<Vec<RecordId>> {
        Ok(self.tree(field)?.search_prefix(prefix))
    }

    /// Inclusive range; `None` leaves that side open
    pub fn search_range(&self, field: &str, min: Option<&str>, max: Option<&str>) -> Result<Vec<RecordId>> {
        Ok(self.tree(field)?.search_range(min, max))
    }

    /// Records whose key is above `key` (or equal to it when `inclusive`)
    pub fn search_greater_than(&self, field: &str, key: &str, inclusive: bool) -> Result<Vec<RecordId>> {
        let tree = self.tree(field)?;
        let ids = tree.search_range(Some(key), None);
        Ok(if inclusive { ids } else { subtract(ids, &tree.search(key)) })
    }

    /// Records whose key is below `key` (or equal to it when `inclusive`)
    pub fn search_less_than(&self, field: &str, key: &str, inclusive: bool) -> Result<Vec<RecordId>> {
        let tree = self.tree(field)?;
        let ids = tree.search_range(None, Some(key));
        Ok(if inclusive { ids } else { subtract(ids, &tree.search(key)) })
    }

    /// First `k` record ids in key order, or the last `k` reversed when
    /// `descending`.
    ///
    /// Descending walks the whole tree: leaves only link forward.
    pub fn search_top_k(&self, field: &str, k: usize, descending: bool) -> Result<Vec<RecordId>> {
        let tree = self.tree(field)?;
        let all = tree
            .traverse(Bound::Unbounded, Bound::Unbounded)
            .flat_map(|(_, ids)| ids.iter().copied());

        if !descending {
            return Ok(all.take(k).collect());
        }
        let mut ids: Vec<RecordId> = all.collect();
        ids.reverse();
        ids.truncate(k);
        Ok(ids)
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Discard one index; returns whether it existed
    pub fn drop_index(&mut self, field: &str) -> bool {
        self.indexes.remove(&field.to_lowercase()).is_some()
    }

    /// Discard every index
    pub fn drop_all(&mut self) {
        if !self.indexes.is_empty() {
            tracing::trace!(count = self.indexes.len(), "dropping indexes");
        }
        self.indexes.clear();
    }
}

fn subtract(ids: Vec<RecordId>, exclude: &[RecordId]) -> Vec<RecordId> {
    let exclude: HashSet<RecordId> = exclude.iter().copied().collect();
    ids.into_iter().filter(|id| !exclude.contains(id)).collect()
}
