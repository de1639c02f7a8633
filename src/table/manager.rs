//! Table Manager
//!
//! Coordinates record stores, indexes, blobs, and the catalog for every
//! table under one root directory.
//!
//! ## Table Lifecycle
//! ```text
//! NonExistent ──create_table──▶ Created ──drop_table──▶ Dropped
//!                                 │  ▲
//!              insert/update/delete  │  search (lazy index build)
//!                                 ▼  │
//!                           indexes dropped, catalog touched
//! ```
//!
//! Every mutation drops the table's indexes and row cache and bumps the
//! catalog's `UpdatedAt`. Indexes are rebuilt on the next search.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{Result, TabulaError};
use crate::index::{BPlusTree, IndexManager, RecordId};
use crate::schema::{checked_ticks, FieldType, Record, Schema, Value};
use crate::storage::{MetadataHeader, RecordStore, METADATA_FILENAME};

use super::blob::{BlobRefs, BlobStore};
use super::cache::RowCache;

/// Reserved directory holding the system catalog
pub const CATALOG_NAME: &str = "__catalog";

/// Schema of the system catalog
pub const CATALOG_SCHEMA: &str =
    "TableName:string:128,Schema:string:2048,BlobFields:string:1024,CreatedAt:datetime,UpdatedAt:datetime";

const CATALOG_KEY_FIELD: &str = "TableName";
const CATALOG_UPDATED_AT: usize = 4;

/// Snapshot of one table's location, schema, and size
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub directory: PathBuf,
    pub metadata_path: PathBuf,
    pub data_path: PathBuf,
    pub schema: Schema,
    pub row_count: usize,
}

/// One decoded catalog row
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Ordinal position in the catalog data file
    pub index: usize,
    pub table_name: String,
    pub schema: String,
    pub blob_fields: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A blob reference held by one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReference {
    pub record_index: usize,
    /// Reference string as stored in the data file
    pub reference: String,
    pub path: Option<PathBuf>,
}

/// A file in a blob directory that no record references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanBlob {
    pub file_name: String,
    pub path: PathBuf,
}

/// In-memory state for one open table
#[derive(Debug)]
struct TableDefinition {
    name: String,
    directory: PathBuf,
    schema: Schema,
    store: RecordStore,
    indexes: IndexManager,
    blobs: BlobStore,
    cache: RowCache,
    row_count: usize,
}

impl TableDefinition {
    fn load(name: &str, directory: PathBuf, config: &Config) -> Result<Self> {
        let header = MetadataHeader::read(&directory.join(METADATA_FILENAME))?;
        let schema = header.schema()?;
        let store = RecordStore::open_dir(&directory)
            .with_expected_schema_text(header.schema_text)
            .with_io_buffer_size(config.io_buffer_size)
            .with_tail_policy(config.tail_policy);
        let blobs = BlobStore::new(&directory);
        blobs.ensure_dir()?;
        let row_count = store.record_count()?;

        Ok(Self {
            name: name.to_string(),
            indexes: IndexManager::new(store.clone(), config.btree_order),
            cache: RowCache::new(config.row_cache_capacity),
            directory,
            schema,
            store,
            blobs,
            row_count,
        })
    }

    fn info(&self) -> TableInfo {
        TableInfo {
            name: self.name.clone(),
            directory: self.directory.clone(),
            metadata_path: self.store.metadata_path().to_path_buf(),
            data_path: self.store.data_path().to_path_buf(),
            schema: self.schema.clone(),
            row_count: self.row_count,
        }
    }

    /// Build the index for `field` unless a current one exists
    fn ensure_index(&mut self, field: &str) -> Result<()> {
        if self.schema.position(field).is_none() {
            return Err(TabulaError::UnknownField(field.to_string()));
        }
        if !self.indexes.is_built(field) {
            self.indexes.build_index(field)?;
        }
        Ok(())
    }

    /// Forget everything derived from record positions
    fn invalidate(&mut self) {
        self.indexes.drop_all();
        self.cache.clear();
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.row_count {
            return Err(TabulaError::RecordOutOfRange {
                index,
                len: self.row_count,
            });
        }
        Ok(())
    }

    fn read_stored(&self, index: usize) -> Result<Record> {
        self.check_index(index)?;
        self.store
            .read_record(index)?
            .ok_or(TabulaError::RecordOutOfRange {
                index,
                len: self.row_count,
            })
    }

    /// Replace blob values with owned references, collecting them in `refs`
    fn materialize(&self, record: &[Option<Value>], refs: &mut BlobRefs) -> Result<Record> {
        let mut values = Vec::with_capacity(record.len());
        for (field, value) in self.schema.fields().iter().zip(record) {
            let stored = match value {
                Some(v) if field.field_type == FieldType::Blob => {
                    Some(self.blobs.normalize(&field.name, v, refs)?)
                }
                other => other.clone(),
            };
            values.push(stored);
        }
        Ok(values)
    }

    /// Remove files written for a write that never landed
    fn discard_created(&self, refs: &BlobRefs) {
        if !refs.created.is_empty() {
            tracing::debug!(table = %self.name, files = refs.created.len(), "discarding blobs of failed write");
            self.blobs.cleanup(&refs.created, &HashSet::new());
        }
    }

    /// Replace blob references with resolved paths
    fn hydrate(&self, mut record: Record) -> Record {
        for position in self.schema.blob_positions() {
            if let Some(slot) = record.get_mut(position) {
                let path = match slot {
                    Some(Value::Text(reference)) => self.blobs.resolve(reference),
                    _ => None,
                };
                if let Some(path) = path {
                    *slot = Some(Value::Text(path.display().to_string()));
                }
            }
        }
        record
    }

    fn blob_refs(&self, record: &[Option<Value>]) -> HashSet<String> {
        self.schema
            .blob_positions()
            .into_iter()
            .filter_map(|p| record.get(p).and_then(|v| v.as_ref()))
            .filter_map(|v| v.as_text())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Every reference held by any current record
    fn all_blob_refs(&self) -> Result<HashSet<String>> {
        let mut refs = HashSet::new();
        for record in self.store.read_all()? {
            refs.extend(self.blob_refs(&record));
        }
        Ok(refs)
    }

    /// Remove files `old` referenced that neither `new` nor any remaining
    /// record still references. Never fails the caller.
    fn cleanup_blobs(&self, old: &HashSet<String>, new: &HashSet<String>) {
        let candidates: HashSet<String> = old.difference(new).cloned().collect();
        if candidates.is_empty() {
            return;
        }
        match self.all_blob_refs() {
            Ok(referenced) => self.blobs.cleanup(&candidates, &referenced),
            Err(e) => tracing::warn!(table = %self.name, error = %e, "skipping blob cleanup"),
        }
    }

    fn blob_field_position(&self, field: &str) -> Result<usize> {
        let position = self
            .schema
            .position(field)
            .ok_or_else(|| TabulaError::UnknownField(field.to_string()))?;
        if self.schema.fields()[position].field_type != FieldType::Blob {
            return Err(TabulaError::BlobFieldTypeMismatch(format!(
                "field '{}' is not a blob field",
                field
            )));
        }
        Ok(position)
    }
}

/// Manages every table under one root directory
pub struct TableManager {
    config: Config,
    root: PathBuf,
    /// Open tables keyed by lowercased name
    tables: HashMap<String, TableDefinition>,
    catalog: TableDefinition,
}

impl TableManager {
    /// Open (or initialize) the table root named by `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let root = config.data_dir.clone();
        fs::create_dir_all(&root)?;
        let catalog = Self::open_catalog(&root, &config)?;

        tracing::info!(root = %root.display(), catalog_rows = catalog.row_count, "table manager ready");
        Ok(Self {
            config,
            root,
            tables: HashMap::new(),
            catalog,
        })
    }

    fn open_catalog(root: &Path, config: &Config) -> Result<TableDefinition> {
        let dir = root.join(CATALOG_NAME);
        if !dir.join(METADATA_FILENAME).is_file() {
            fs::create_dir_all(&dir)?;
            RecordStore::create(&dir, &Schema::parse(CATALOG_SCHEMA)?)?;
            tracing::debug!(dir = %dir.display(), "initialized catalog");
        }
        TableDefinition::load(CATALOG_NAME, dir, config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_catalog_name(name: &str) -> bool {
        name.eq_ignore_ascii_case(CATALOG_NAME)
    }

    // =========================================================================
    // Table Lifecycle
    // =========================================================================

    /// Create a table directory with an empty data file and a catalog row
    pub fn create_table(&mut self, name: &str, schema: &Schema) -> Result<()> {
        validate_table_name(name)?;
        if Self::is_catalog_name(name) {
            return Err(TabulaError::InvalidArgument(format!(
                "'{}' is reserved for the catalog",
                name
            )));
        }
        if schema.is_empty() {
            return Err(TabulaError::InvalidArgument("schema has no fields".to_string()));
        }
        if self.find_table_dir(name)?.is_some() {
            return Err(TabulaError::TableAlreadyExists(name.to_string()));
        }

        let dir = self.root.join(name);
        fs::create_dir_all(&dir)?;
        RecordStore::create(&dir, schema)?;
        let table = TableDefinition::load(name, dir, &self.config)?;
        self.tables.insert(name.to_lowercase(), table);

        // Stale rows from a directory removed behind our back
        self.remove_catalog_entries(name)?;
        self.add_catalog_entry(name, schema)?;

        tracing::info!(table = name, schema = %schema, "created table");
        Ok(())
    }

    /// Delete a table's directory and catalog row
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        if Self::is_catalog_name(name) {
            return Err(TabulaError::InvalidArgument(
                "the catalog cannot be dropped".to_string(),
            ));
        }
        let dir = self
            .find_table_dir(name)?
            .ok_or_else(|| TabulaError::TableNotFound(name.to_string()))?;

        let stored_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        self.remove_catalog_entries(&stored_name)?;
        self.tables.remove(&name.to_lowercase());
        fs::remove_dir_all(&dir)?;

        tracing::info!(table = name, "dropped table");
        Ok(())
    }

    /// Names of every user table, sorted
    pub fn tables(&mut self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .table_dirs()?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn table_info(&mut self, name: &str) -> Result<TableInfo> {
        Ok(self.user_table(name)?.info())
    }

    /// Info for every user table that loads; broken tables are logged and skipped
    pub fn all_table_info(&mut self) -> Result<Vec<TableInfo>> {
        let mut infos = Vec::new();
        for name in self.tables()? {
            match self.user_table(&name) {
                Ok(table) => infos.push(table.info()),
                Err(e) => tracing::warn!(table = %name, error = %e, "failed to load table"),
            }
        }
        Ok(infos)
    }

    pub fn catalog_info(&self) -> TableInfo {
        self.catalog.info()
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Validate, store blobs, and append one record. Returns its index.
    pub fn insert_record(&mut self, name: &str, record: &[Option<Value>]) -> Result<usize> {
        let table = self.user_table(name)?;
        validate_record(&table.schema, record)?;
        let mut refs = BlobRefs::default();
        let written = table
            .materialize(record, &mut refs)
            .and_then(|stored| table.store.append_record(&stored));
        if let Err(e) = written {
            table.discard_created(&refs);
            return Err(e);
        }

        let index = table.row_count;
        table.row_count += 1;
        table.invalidate();
        tracing::debug!(table = name, index, "inserted record");

        self.touch_catalog(name)?;
        Ok(index)
    }

    /// Insert many records; nothing is written unless every record validates
    pub fn insert_records(&mut self, name: &str, records: &[Record]) -> Result<()> {
        let table = self.user_table(name)?;
        for record in records {
            validate_record(&table.schema, record)?;
        }

        let mut refs = BlobRefs::default();
        let written = records
            .iter()
            .map(|record| table.materialize(record, &mut refs))
            .collect::<Result<Vec<_>>>()
            .and_then(|stored| table.store.append_records(&stored));
        if let Err(e) = written {
            table.discard_created(&refs);
            return Err(e);
        }

        table.row_count += records.len();
        table.invalidate();
        tracing::debug!(table = name, count = records.len(), "inserted records");

        self.touch_catalog(name)
    }

    /// Read one record with blob fields resolved to paths.
    ///
    /// The catalog can be read by name; its rows come back as stored.
    pub fn get_record(&mut self, name: &str, index: usize) -> Result<Record> {
        if Self::is_catalog_name(name) {
            return self.catalog.read_stored(index);
        }

        let table = self.user_table(name)?;
        if let Some(record) = table.cache.get(index) {
            return Ok(record);
        }
        let record = table.hydrate(table.read_stored(index)?);
        table.cache.put(index, record.clone());
        Ok(record)
    }

    /// Read every record with blob fields resolved to paths
    pub fn get_all_records(&mut self, name: &str) -> Result<Vec<Record>> {
        if Self::is_catalog_name(name) {
            return self.catalog.store.read_all();
        }

        let table = self.user_table(name)?;
        let records = table.store.read_all()?;
        Ok(records.into_iter().map(|r| table.hydrate(r)).collect())
    }

    /// Replace the record at `index`, keeping its position
    pub fn update_record(&mut self, name: &str, index: usize, record: &[Option<Value>]) -> Result<()> {
        let table = self.user_table(name)?;
        table.check_index(index)?;
        validate_record(&table.schema, record)?;
        Self::apply_update(table, index, record)?;
        tracing::debug!(table = name, index, "updated record");

        self.touch_catalog(name)
    }

    /// Remove the record at `index`; later records shift down by one
    pub fn delete_record(&mut self, name: &str, index: usize) -> Result<()> {
        let table = self.user_table(name)?;
        Self::apply_delete(table, index)?;
        tracing::debug!(table = name, index, "deleted record");

        self.touch_catalog(name)
    }

    /// Remove several records; indexes refer to positions before the call
    pub fn delete_records(&mut self, name: &str, indexes: &[usize]) -> Result<()> {
        let table = self.user_table(name)?;
        let mut ordered: Vec<usize> = indexes.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        ordered.dedup();
        if let Some(&highest) = ordered.first() {
            table.check_index(highest)?;
        }

        for &index in &ordered {
            Self::apply_delete(table, index)?;
        }
        tracing::debug!(table = name, count = ordered.len(), "deleted records");

        self.touch_catalog(name)
    }

    fn apply_update(table: &mut TableDefinition, index: usize, record: &[Option<Value>]) -> Result<Record> {
        let old = table.read_stored(index)?;
        let old_refs = table.blob_refs(&old);
        let mut new_refs = BlobRefs::default();
        let written = table
            .materialize(record, &mut new_refs)
            .and_then(|stored| table.store.edit_record(index, &stored).map(|()| stored));
        let stored = match written {
            Ok(stored) => stored,
            Err(e) => {
                table.discard_created(&new_refs);
                return Err(e);
            }
        };
        table.invalidate();
        table.cleanup_blobs(&old_refs, &new_refs.held);
        Ok(stored)
    }

    fn apply_delete(table: &mut TableDefinition, index: usize) -> Result<()> {
        let old = table.read_stored(index)?;
        let old_refs = table.blob_refs(&old);
        table.store.delete_record(index)?;
        table.row_count = table.row_count.saturating_sub(1);
        table.invalidate();
        table.cleanup_blobs(&old_refs, &HashSet::new());
        Ok(())
    }

    // =========================================================================
    // Indexes and Search
    // =========================================================================

    /// Build the index for `field`; `force` rebuilds a current one
    pub fn build_index(&mut self, name: &str, field: &str, force: bool) -> Result<()> {
        let table = self.user_table(name)?;
        if force {
            table.indexes.drop_index(field);
        }
        table.ensure_index(field)
    }

    pub fn search_exact(&mut self, name: &str, field: &str, key: &str) -> Result<Vec<RecordId>> {
        let table = self.indexed_table(name, field)?;
        table.indexes.search_exact(field, key)
    }

    pub fn search_prefix(&mut self, name: &str, field: &str, prefix: &str) -> Result<Vec<RecordId>> {
        let table = self.indexed_table(name, field)?;
        table.indexes.search_prefix(field, prefix)
    }

    pub fn search_range(
        &mut self,
        name: &str,
        field: &str,
        min: Option<&str>,
        max: Option<&str>,
    ) -> Result<Vec<RecordId>> {
        let table = self.indexed_table(name, field)?;
        table.indexes.search_range(field, min, max)
    }

    pub fn search_greater_than(
        &mut self,
        name: &str,
        field: &str,
        key: &str,
        inclusive: bool,
    ) -> Result<Vec<RecordId>> {
        let table = self.indexed_table(name, field)?;
        table.indexes.search_greater_than(field, key, inclusive)
    }

    pub fn search_less_than(
        &mut self,
        name: &str,
        field: &str,
        key: &str,
        inclusive: bool,
    ) -> Result<Vec<RecordId>> {
        let table = self.indexed_table(name, field)?;
        table.indexes.search_less_than(field, key, inclusive)
    }

    pub fn search_top_k(&mut self, name: &str, field: &str, k: usize, descending: bool) -> Result<Vec<RecordId>> {
        let table = self.indexed_table(name, field)?;
        table.indexes.search_top_k(field, k, descending)
    }

    /// Exact search returning hydrated records instead of positions
    pub fn search_records_exact(&mut self, name: &str, field: &str, key: &str) -> Result<Vec<Record>> {
        let ids = self.search_exact(name, field, key)?;
        ids.into_iter().map(|id| self.get_record(name, id)).collect()
    }

    /// Borrow the current index tree for one field, building it if needed
    pub fn index_tree(&mut self, name: &str, field: &str) -> Result<&BPlusTree> {
        let table = self.indexed_table(name, field)?;
        table.indexes.tree(field)
    }

    fn indexed_table(&mut self, name: &str, field: &str) -> Result<&mut TableDefinition> {
        let table = self.user_table(name)?;
        table.ensure_index(field)?;
        Ok(table)
    }

    // =========================================================================
    // Blobs
    // =========================================================================

    /// Resolved path of the blob held by one record, if it holds one
    pub fn blob_path(&mut self, name: &str, index: usize, field: &str) -> Result<Option<PathBuf>> {
        let table = self.user_table(name)?;
        let position = table.blob_field_position(field)?;
        let record = table.read_stored(index)?;
        Ok(match record.get(position) {
            Some(Some(Value::Text(reference))) => table.blobs.resolve(reference),
            _ => None,
        })
    }

    /// Bytes of the blob held by one record
    pub fn read_blob(&mut self, name: &str, index: usize, field: &str) -> Result<Vec<u8>> {
        let table = self.user_table(name)?;
        let position = table.blob_field_position(field)?;
        match table.read_stored(index)?.get(position) {
            Some(Some(Value::Text(reference))) => table.blobs.read(reference),
            _ => Err(TabulaError::BlobNotFound(format!("{}[{}].{}", name, index, field))),
        }
    }

    /// Store `bytes` as the new blob for one record, reclaiming the old file.
    /// Returns the new blob's path.
    pub fn replace_blob(&mut self, name: &str, index: usize, field: &str, bytes: Vec<u8>) -> Result<PathBuf> {
        let table = self.user_table(name)?;
        let position = table.blob_field_position(field)?;
        let mut record = table.read_stored(index)?;
        record[position] = Some(Value::Bytes(bytes));

        let stored = Self::apply_update(table, index, &record)?;
        let path = match stored.get(position) {
            Some(Some(Value::Text(reference))) => table.blobs.resolve(reference),
            _ => None,
        }
        .ok_or_else(|| TabulaError::BlobNotFound(format!("{}[{}].{}", name, index, field)))?;

        self.touch_catalog(name)?;
        Ok(path)
    }

    /// Clear one record's blob field, reclaiming its file
    pub fn delete_blob(&mut self, name: &str, index: usize, field: &str) -> Result<()> {
        let table = self.user_table(name)?;
        let position = table.blob_field_position(field)?;
        let mut record = table.read_stored(index)?;
        if record[position].is_none() {
            return Ok(());
        }
        record[position] = None;
        Self::apply_update(table, index, &record)?;

        self.touch_catalog(name)
    }

    /// Every non-empty reference held in one blob field
    pub fn list_blobs(&mut self, name: &str, field: &str) -> Result<Vec<BlobReference>> {
        let table = self.user_table(name)?;
        let position = table.blob_field_position(field)?;
        let records = table.store.read_all()?;

        Ok(records
            .iter()
            .enumerate()
            .filter_map(|(record_index, record)| match record.get(position) {
                Some(Some(Value::Text(reference))) if !reference.is_empty() => Some(BlobReference {
                    record_index,
                    reference: reference.clone(),
                    path: table.blobs.resolve(reference),
                }),
                _ => None,
            })
            .collect())
    }

    /// Files in the table's blob directory that no record references
    pub fn list_orphan_blobs(&mut self, name: &str) -> Result<Vec<OrphanBlob>> {
        let table = self.user_table(name)?;
        let referenced = table.all_blob_refs()?;
        Ok(table
            .blobs
            .orphans(&referenced)?
            .into_iter()
            .map(|file_name| OrphanBlob {
                path: table.blobs.blob_dir().join(&file_name),
                file_name,
            })
            .collect())
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Decode every catalog row
    pub fn catalog_entries(&self) -> Result<Vec<CatalogEntry>> {
        let rows = self.catalog.store.read_all()?;
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let text = |i: usize| match row.get(i) {
                    Some(Some(Value::Text(s))) => s.clone(),
                    _ => String::new(),
                };
                let time = |i: usize| match row.get(i) {
                    Some(Some(Value::DateTime(dt))) => Some(*dt),
                    _ => None,
                };
                CatalogEntry {
                    index,
                    table_name: text(0),
                    schema: text(1),
                    blob_fields: text(2)
                        .split('|')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    created_at: time(3),
                    updated_at: time(CATALOG_UPDATED_AT),
                }
            })
            .collect())
    }

    fn add_catalog_entry(&mut self, name: &str, schema: &Schema) -> Result<()> {
        let blob_fields: Vec<&str> = schema
            .fields()
            .iter()
            .filter(|f| f.field_type == FieldType::Blob)
            .map(|f| f.name.as_str())
            .collect();
        let now = Utc::now();
        let row: Record = vec![
            Some(Value::Text(name.to_string())),
            Some(Value::Text(schema.to_string())),
            Some(Value::Text(blob_fields.join("|"))),
            Some(Value::DateTime(now)),
            Some(Value::DateTime(now)),
        ];

        self.catalog.store.append_record(&row)?;
        self.catalog.row_count += 1;
        self.catalog.invalidate();
        Ok(())
    }

    fn remove_catalog_entries(&mut self, name: &str) -> Result<()> {
        // Table names are case-insensitive; match every spelling of `name`
        let mut matches: Vec<usize> = self
            .catalog_entries()?
            .into_iter()
            .filter(|entry| entry.table_name.eq_ignore_ascii_case(name))
            .map(|entry| entry.index)
            .collect();
        if matches.is_empty() {
            return Ok(());
        }

        matches.sort_unstable_by(|a, b| b.cmp(a));
        for index in matches {
            self.catalog.store.delete_record(index)?;
            self.catalog.row_count = self.catalog.row_count.saturating_sub(1);
        }
        self.catalog.invalidate();
        Ok(())
    }

    /// Set `UpdatedAt` on the table's catalog row to now
    fn touch_catalog(&mut self, name: &str) -> Result<()> {
        let name = self
            .tables
            .get(&name.to_lowercase())
            .map_or_else(|| name.to_string(), |t| t.name.clone());
        self.catalog.ensure_index(CATALOG_KEY_FIELD)?;
        let matches = self.catalog.indexes.search_exact(CATALOG_KEY_FIELD, &name)?;
        let Some(&index) = matches.first() else {
            tracing::warn!(table = %name, "no catalog row to touch");
            return Ok(());
        };

        let mut row = self.catalog.read_stored(index)?;
        if row.len() <= CATALOG_UPDATED_AT {
            return Ok(());
        }
        row[CATALOG_UPDATED_AT] = Some(Value::DateTime(Utc::now()));
        self.catalog.store.edit_record(index, &row)?;
        self.catalog.invalidate();
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Open a user table, loading it from disk on first use
    fn user_table(&mut self, name: &str) -> Result<&mut TableDefinition> {
        if Self::is_catalog_name(name) {
            return Err(TabulaError::InvalidArgument(
                "operation not permitted on the catalog".to_string(),
            ));
        }

        let key = name.to_lowercase();
        if !self.tables.contains_key(&key) {
            let dir = self
                .find_table_dir(name)?
                .ok_or_else(|| TabulaError::TableNotFound(name.to_string()))?;
            let stored_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string());
            let table = TableDefinition::load(&stored_name, dir, &self.config)?;
            self.tables.insert(key.clone(), table);
        }

        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| TabulaError::TableNotFound(name.to_string()))?;
        if !table.directory.is_dir() {
            return Err(TabulaError::TableNotFound(name.to_string()));
        }
        Ok(table)
    }

    /// Table directory for `name`, matched case-insensitively
    fn find_table_dir(&self, name: &str) -> Result<Option<PathBuf>> {
        let exact = self.root.join(name);
        if exact.is_dir() {
            return Ok(Some(exact));
        }
        Ok(self
            .table_dirs()?
            .into_iter()
            .find(|(dir_name, _)| dir_name.eq_ignore_ascii_case(name))
            .map(|(_, path)| path))
    }

    /// `(name, path)` of every user table directory under the root
    pub(crate) fn table_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_catalog_name(&name) {
                continue;
            }
            dirs.push((name, entry.path()));
        }
        dirs.sort();
        Ok(dirs)
    }
}

fn validate_table_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TabulaError::InvalidArgument("table name is required".to_string()));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(TabulaError::InvalidArgument(format!(
            "table name '{}' is not a plain directory name",
            name
        )));
    }
    Ok(())
}

/// Check record shape and per-field types; absent values always pass
fn validate_record(schema: &Schema, record: &[Option<Value>]) -> Result<()> {
    if record.len() != schema.len() {
        return Err(TabulaError::InvalidArgument(format!(
            "record has {} fields, schema has {}",
            record.len(),
            schema.len()
        )));
    }

    for (field, value) in schema.fields().iter().zip(record) {
        let Some(value) = value else { continue };
        let ok = match (field.field_type, value) {
            (FieldType::Integer, Value::Integer(_)) => true,
            (FieldType::Boolean, Value::Boolean(_)) => true,
            (FieldType::DateTime, Value::DateTime(dt)) => {
                checked_ticks(dt)?;
                true
            }
            (FieldType::String, Value::Text(s)) => {
                if field.max_length > 0 && s.chars().count() > field.max_length {
                    return Err(TabulaError::InvalidArgument(format!(
                        "field '{}' exceeds max length {}",
                        field.name, field.max_length
                    )));
                }
                true
            }
            (FieldType::Blob, Value::Text(_) | Value::Bytes(_)) => true,
            _ => false,
        };
        if !ok {
            return Err(TabulaError::InvalidArgument(format!(
                "field '{}' requires a {} value, got {}",
                field.name,
                field.field_type.token(),
                value.kind()
            )));
        }
    }
    Ok(())
}
