//! Storage Module
//!
//! Flat-file record storage driven by a metadata header.
//!
//! ## Responsibilities
//! - Write and validate the per-table metadata header
//! - Append length-prefixed records to the data file
//! - Locate records by ordinal with a linear scan
//! - Edit and delete records by splicing bytes and truncating
//!
//! ## Metadata File (`metadata.meta`)
//! ```text
//! line 1: Id:int,Name:string:16,IsActive:bool,CreatedAt:datetime,Data:blob
//! line 2: FFFF7FFF...   (hex offset bitmap, see schema::layout)
//! ```
//!
//! ## Data File (`data.dat`)
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Record 0                                             │
//! │ ┌─────────┬─────────┬─────────┬─────────┬────┬─────┐ │
//! │ │ Len (4) │ Field 0 │ Len (4) │ Field 1 │ .. │     │ │
//! │ └─────────┴─────────┴─────────┴─────────┴────┴─────┘ │
//! ├──────────────────────────────────────────────────────┤
//! │ Record 1 ...                                         │
//! └──────────────────────────────────────────────────────┘
//! ```
//! Lengths are i32 little-endian. There is no record delimiter: boundaries
//! come from reading `field_count` fields, where the field count is decoded
//! from the metadata bitmap.

mod iterator;
mod metadata;
mod store;

pub use iterator::{RawRecord, RecordIterator};
pub use metadata::MetadataHeader;
pub use store::{RecordStore, ScanReport};

// =============================================================================
// Shared Constants
// =============================================================================

/// Metadata file name inside a table directory
pub const METADATA_FILENAME: &str = "metadata.meta";

/// Data file name inside a table directory
pub const DATA_FILENAME: &str = "data.dat";

/// Size of the length prefix in front of each field
pub(crate) const LENGTH_PREFIX_SIZE: u64 = 4;
