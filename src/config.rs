//! Configuration for Tabula
//!
//! Centralized configuration with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TabulaError};

/// Main configuration for a Tabula table root
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory holding one sub-directory per table
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── __catalog/       (system catalog)
    ///     └── {table}/
    ///           ├── metadata.meta
    ///           ├── data.dat
    ///           └── blobs/
    pub data_dir: PathBuf,

    /// Buffer size used when shifting bytes during record removal
    pub io_buffer_size: usize,

    /// What to do when a data file ends in a partially written record
    pub tail_policy: TailPolicy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// B+Tree order (max children per internal node), clamped to at least 4
    pub btree_order: usize,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Rows cached per table for `get_record` (0 disables the cache)
    pub row_cache_capacity: usize,
}

/// Handling of truncated trailing records in a data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailPolicy {
    /// Stop scanning at the truncated record and treat it as end of data
    Ignore,

    /// Surface the truncated record as a `DataCorrupt` error
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tabula_data"),
            io_buffer_size: 64 * 1024, // 64 KB
            tail_policy: TailPolicy::Ignore,
            btree_order: 32,
            row_cache_capacity: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a config from a `key = value` file.
    ///
    /// Blank lines and lines starting with `#` are skipped. Keys not listed
    /// below are ignored.
    ///
    /// ```text
    /// data_dir = ./tables
    /// btree_order = 64
    /// row_cache_capacity = 512
    /// io_buffer_size = 65536
    /// tail_policy = error
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TabulaError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let mut builder = Config::builder();
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line = line_no + 1, "skipping malformed config line");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            builder = match key {
                "data_dir" => builder.data_dir(value),
                "btree_order" => builder.btree_order(parse_number(key, value)?),
                "row_cache_capacity" => builder.row_cache_capacity(parse_number(key, value)?),
                "io_buffer_size" => builder.io_buffer_size(parse_number(key, value)?),
                "tail_policy" => builder.tail_policy(match value.to_ascii_lowercase().as_str() {
                    "ignore" => TailPolicy::Ignore,
                    "error" => TailPolicy::Error,
                    other => {
                        return Err(TabulaError::Config(format!(
                            "tail_policy must be 'ignore' or 'error', got '{}'",
                            other
                        )))
                    }
                }),
                unknown => {
                    tracing::warn!(key = unknown, "ignoring unknown config key");
                    builder
                }
            };
        }

        Ok(builder.build())
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| TabulaError::Config(format!("{} must be a number, got '{}'", key, value)))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all tables)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the shift buffer size (in bytes)
    pub fn io_buffer_size(mut self, size: usize) -> Self {
        self.config.io_buffer_size = size.max(1);
        self
    }

    /// Set the truncated-tail policy
    pub fn tail_policy(mut self, policy: TailPolicy) -> Self {
        self.config.tail_policy = policy;
        self
    }

    /// Set the B+Tree order
    pub fn btree_order(mut self, order: usize) -> Self {
        self.config.btree_order = order.max(4);
        self
    }

    /// Set the per-table row cache capacity
    pub fn row_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.row_cache_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
