//! Index Module
//!
//! In-memory secondary indexes over a table's fields.
//!
//! ## Responsibilities
//! - Ordered multi-map from rendered field values to record positions
//! - Exact, prefix, range, one-sided, and top-K lookups
//! - Explicit invalidation; indexes are rebuilt from the data file on demand
//!
//! ## Structure
//! ```text
//!                [ Internal: "Carol" ]
//!                 /                 \
//!   [ Leaf: "Alice" "Bob" ] ──next──▶ [ Leaf: "Carol" "Dave" ]
//!        {0,2}    {1}                    {3}     {4}
//! ```
//!
//! Nothing here is persisted. Restarting the process means rebuilding
//! every index the workload touches.

mod btree;
mod manager;

pub use btree::{BPlusTree, NodeId, RecordId, Traverse, DEFAULT_ORDER};
pub use manager::IndexManager;
