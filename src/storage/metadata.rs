//! Metadata Header
//!
//! Reads and writes the two-line header describing a table's schema.

use std::fs;
use std::path::Path;

use crate::error::{Result, TabulaError};
use crate::schema::{bitmap_from_hex, bitmap_to_hex, decode_field_count, OffsetBitmap, Schema};

/// Parsed contents of a metadata file
#[derive(Debug, Clone)]
pub struct MetadataHeader {
    /// Schema text exactly as stored on line 1
    pub schema_text: String,
    /// Decoded offset bitmap from line 2
    pub bitmap: OffsetBitmap,
}

impl MetadataHeader {
    /// Build the header for a schema
    pub fn for_schema(schema: &Schema) -> Self {
        Self {
            schema_text: schema.to_string(),
            bitmap: schema.layout().bitmap(),
        }
    }

    /// Write the header, replacing any existing file
    pub fn write(&self, path: &Path) -> Result<()> {
        let contents = format!("{}\n{}\n", self.schema_text, bitmap_to_hex(&self.bitmap));
        fs::write(path, contents)?;
        Ok(())
    }

    /// Read and validate a header
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut lines = text.lines();

        let schema_text = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                TabulaError::MetadataCorrupt(format!("{}: schema line missing", path.display()))
            })?;
        let bitmap_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                TabulaError::MetadataCorrupt(format!(
                    "{}: offset bitmap line missing",
                    path.display()
                ))
            })?;

        Ok(Self {
            schema_text: schema_text.trim_end_matches('\r').to_string(),
            bitmap: bitmap_from_hex(bitmap_line)?,
        })
    }

    /// Parse the schema line
    pub fn schema(&self) -> Result<Schema> {
        Schema::parse(&self.schema_text)
    }

    /// Number of length-prefixed fields per record
    pub fn field_count(&self) -> usize {
        decode_field_count(&self.bitmap)
    }
}
