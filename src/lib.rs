//! # Tabula
//!
//! An embedded, single-process table store with:
//! - Schema-described flat files (metadata header + length-prefixed records)
//! - In-memory B+Tree secondary indexes, rebuilt on demand
//! - File-backed blob fields owned by each table
//! - A system catalog kept as an ordinary table
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Table Manager                          │
//! │        (validation, catalog upkeep, lazy index builds)      │
//! └──────┬───────────────────┬──────────────────────┬───────────┘
//!        │                   │                      │
//!        ▼                   ▼                      ▼
//! ┌─────────────┐     ┌─────────────┐        ┌─────────────┐
//! │ Blob Store  │     │   Index     │        │  Row Cache  │
//! │  (blobs/)   │     │  Manager    │        │    (LRU)    │
//! └─────────────┘     └──────┬──────┘        └─────────────┘
//!                            │ B+Tree per field
//!                            ▼
//!                     ┌─────────────┐
//!                     │ Record Store│  metadata.meta + data.dat
//!                     └──────┬──────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │Schema Codec │  layout, offset bitmap, values
//!                     └─────────────┘
//! ```
//!
//! All calls are synchronous and assume one actor per table root.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod schema;
pub mod storage;
pub mod index;
pub mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TabulaError};
pub use config::{Config, TailPolicy};
pub use schema::{Field, FieldType, Record, Schema, Value};
pub use table::TableManager;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Tabula
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
