//! Diagnostics
//!
//! Read-mostly health check over a table root. Errors mean the catalog and
//! the files disagree or data is unreadable; warnings are maintenance items
//! such as orphan blobs.

use std::ops::Bound;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use crate::error::Result;
use crate::schema::FieldType;
use crate::storage::{MetadataHeader, RecordStore, METADATA_FILENAME};

use super::manager::TableManager;

/// Findings for a whole table root
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticsReport {
    pub root: PathBuf,
    pub catalog_rows: usize,
    pub catalog_issues: Vec<String>,
    pub tables: Vec<TableDiagnostics>,
}

impl DiagnosticsReport {
    pub fn has_errors(&self) -> bool {
        !self.catalog_issues.is_empty() || self.tables.iter().any(|t| !t.errors.is_empty())
    }

    pub fn has_warnings(&self) -> bool {
        self.tables.iter().any(|t| !t.warnings.is_empty())
    }
}

/// Findings for one table
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableDiagnostics {
    pub name: String,
    pub row_count: usize,
    pub data_file_len: u64,
    pub truncated_tail: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub indexes: Vec<IndexDiagnostics>,
}

/// Rebuild timing and structure of one field's index
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexDiagnostics {
    pub field: String,
    pub build_micros: u64,
    pub keys: usize,
    pub height: usize,
    /// First key in order, checked with an exact search
    pub sample_key: Option<String>,
    pub sample_hits: usize,
    pub invariant_violations: Vec<String>,
}

/// Inspect every table under the manager's root
pub fn analyze(manager: &mut TableManager) -> Result<DiagnosticsReport> {
    let entries = manager.catalog_entries()?;
    let dirs = manager.table_dirs()?;
    let mut report = DiagnosticsReport {
        root: manager.root().to_path_buf(),
        catalog_rows: entries.len(),
        ..Default::default()
    };

    // -------------------------------------------------------------------------
    // Catalog vs directories
    // -------------------------------------------------------------------------
    for entry in &entries {
        if entry.table_name.trim().is_empty() {
            report
                .catalog_issues
                .push(format!("catalog row {} has no table name", entry.index));
            continue;
        }
        if !dirs.iter().any(|(name, _)| name.eq_ignore_ascii_case(&entry.table_name)) {
            report.catalog_issues.push(format!(
                "catalog references '{}' but its directory is missing",
                entry.table_name
            ));
        }
    }

    for (name, dir) in &dirs {
        let matching: Vec<_> = entries
            .iter()
            .filter(|e| e.table_name.eq_ignore_ascii_case(name))
            .collect();
        let mut table = TableDiagnostics {
            name: name.clone(),
            ..Default::default()
        };

        match matching.len() {
            1 => {}
            0 => table.errors.push("no catalog row".to_string()),
            n => table.errors.push(format!("{} catalog rows", n)),
        }

        // ---------------------------------------------------------------------
        // Metadata and data file
        // ---------------------------------------------------------------------
        let header = match MetadataHeader::read(&dir.join(METADATA_FILENAME)) {
            Ok(header) => header,
            Err(e) => {
                table.errors.push(format!("metadata unreadable: {}", e));
                report.tables.push(table);
                continue;
            }
        };
        if let Some(entry) = matching.first() {
            if entry.schema != header.schema_text {
                table.errors.push(format!(
                    "metadata schema '{}' differs from catalog schema '{}'",
                    header.schema_text, entry.schema
                ));
            }
        }

        let info = match manager.table_info(name) {
            Ok(info) => info,
            Err(e) => {
                table.errors.push(format!("table failed to load: {}", e));
                report.tables.push(table);
                continue;
            }
        };
        table.row_count = info.row_count;

        match RecordStore::open_dir(dir).scan() {
            Ok(scan) => {
                table.data_file_len = scan.file_len;
                table.truncated_tail = scan.truncated_tail;
                if scan.records != info.row_count {
                    table.errors.push(format!(
                        "row count {} but data file holds {} records",
                        info.row_count, scan.records
                    ));
                }
                if scan.truncated_tail {
                    table
                        .errors
                        .push("data file ends in a truncated record".to_string());
                }
            }
            Err(e) => table.errors.push(format!("data file unreadable: {}", e)),
        }

        // ---------------------------------------------------------------------
        // Blobs
        // ---------------------------------------------------------------------
        let blob_fields: Vec<String> = info
            .schema
            .fields()
            .iter()
            .filter(|f| f.field_type == FieldType::Blob)
            .map(|f| f.name.clone())
            .collect();
        for field in &blob_fields {
            match manager.list_blobs(name, field) {
                Ok(refs) => {
                    for blob in refs.iter().filter(|b| !b.path.as_ref().is_some_and(|p| p.is_file())) {
                        table.errors.push(format!(
                            "record {} field '{}' references missing blob '{}'",
                            blob.record_index, field, blob.reference
                        ));
                    }
                }
                Err(e) => table.errors.push(format!("listing blobs for '{}' failed: {}", field, e)),
            }
        }
        match manager.list_orphan_blobs(name) {
            Ok(orphans) => table
                .warnings
                .extend(orphans.into_iter().map(|o| format!("orphan blob '{}'", o.file_name))),
            Err(e) => table.warnings.push(format!("orphan scan failed: {}", e)),
        }

        // ---------------------------------------------------------------------
        // Indexes
        // ---------------------------------------------------------------------
        let fields: Vec<String> = info.schema.fields().iter().map(|f| f.name.clone()).collect();
        for field in fields {
            match check_index_lookup(manager, name, &field) {
                Ok(index) => {
                    if !index.invariant_violations.is_empty() {
                        table.errors.push(format!(
                            "index '{}' violates {} structural invariants",
                            field,
                            index.invariant_violations.len()
                        ));
                    }
                    table.indexes.push(index);
                }
                Err(e) => table.errors.push(format!("index '{}' failed to build: {}", field, e)),
            }
        }

        report.tables.push(table);
    }

    tracing::info!(
        tables = report.tables.len(),
        catalog_rows = report.catalog_rows,
        errors = report.has_errors(),
        warnings = report.has_warnings(),
        "diagnostics complete"
    );
    Ok(report)
}

fn check_index_lookup(manager: &mut TableManager, table: &str, field: &str) -> Result<IndexDiagnostics> {
    let started = Instant::now();
    manager.build_index(table, field, true)?;
    let build_micros = started.elapsed().as_micros() as u64;

    let tree = manager.index_tree(table, field)?;
    let sample_key = tree
        .traverse(Bound::Unbounded, Bound::Unbounded)
        .next()
        .map(|(key, _)| key.to_string());
    let sample_hits = sample_key.as_deref().map_or(0, |k| tree.search(k).len());

    Ok(IndexDiagnostics {
        field: field.to_string(),
        build_micros,
        keys: tree.key_count(),
        height: tree.height(),
        sample_key,
        sample_hits,
        invariant_violations: tree.check_invariants(),
    })
}
