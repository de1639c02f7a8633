//! Table Module
//!
//! Named tables on top of the record store and index layers.
//!
//! ## Responsibilities
//! - Create and drop table directories, tracked by the `__catalog` table
//! - Validate records against the schema before any write
//! - Own blob files referenced by blob fields
//! - Rebuild indexes lazily after mutations
//! - Cross-check catalog, files, blobs, and indexes (diagnostics)
//!
//! ## Root Layout
//! ```text
//! {root}/
//!   ├── __catalog/
//!   │     ├── metadata.meta
//!   │     └── data.dat        TableName | Schema | BlobFields | CreatedAt | UpdatedAt
//!   └── users/
//!         ├── metadata.meta
//!         ├── data.dat
//!         └── blobs/
//!               └── Avatar_9c1e...b4.bin
//! ```

mod blob;
mod cache;
mod diagnostics;
mod manager;

pub use blob::{BlobRefs, BlobStore, BLOB_DIRNAME};
pub use cache::RowCache;
pub use diagnostics::{analyze, DiagnosticsReport, IndexDiagnostics, TableDiagnostics};
pub use manager::{
    BlobReference, CatalogEntry, OrphanBlob, TableInfo, TableManager, CATALOG_NAME, CATALOG_SCHEMA,
};
