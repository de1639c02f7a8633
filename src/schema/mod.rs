//! Schema Module
//!
//! Typed field lists and their binary layout.
//!
//! ## Responsibilities
//! - Parse and print the canonical `name:type[:maxlen]` schema text
//! - Compute the nominal fixed-width layout of a record
//! - Encode field boundaries as the bit-packed offset map stored in metadata
//! - Convert field values to and from their on-disk byte runs
//!
//! ## Schema Text
//! ```text
//! Id:int,Name:string:16,IsActive:bool,CreatedAt:datetime,Data:blob
//! └─┬──┘ └─────┬──────┘
//!   │          └── string with max length 16 (default 50)
//!   └── name:type
//! ```

mod layout;
mod value;

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TabulaError};

pub use layout::{
    bitmap_from_hex, bitmap_to_hex, decode_field_count, decode_offsets, encode_offset_bitmap,
    trim_trailing_zeros, Layout, OffsetBitmap,
};
pub use value::{checked_ticks, decode_value, encode_value, Record, Value};
pub(crate) use value::decode_text;

/// Max length applied to string fields declared without one
pub const DEFAULT_STRING_LENGTH: usize = 50;

/// Supported field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    String,
    Boolean,
    DateTime,
    Blob,
}

impl FieldType {
    /// Type token used in schema text
    pub fn token(self) -> &'static str {
        match self {
            FieldType::Integer => "int",
            FieldType::String => "string",
            FieldType::Boolean => "bool",
            FieldType::DateTime => "datetime",
            FieldType::Blob => "blob",
        }
    }
}

impl FromStr for FieldType {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int" => Ok(FieldType::Integer),
            "string" => Ok(FieldType::String),
            "bool" => Ok(FieldType::Boolean),
            "datetime" => Ok(FieldType::DateTime),
            "blob" => Ok(FieldType::Blob),
            _ => Err(TabulaError::UnknownFieldType(s.to_string())),
        }
    }
}

/// A single named, typed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// Only meaningful for `String`; 0 means the default of 50 characters
    pub max_length: usize,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            max_length: 0,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Nominal width in bytes used by the layout computation.
    ///
    /// Strings (and blob references) are sized for two bytes per character.
    pub fn nominal_size(&self) -> usize {
        match self.field_type {
            FieldType::Integer => 4,
            FieldType::Boolean => 1,
            FieldType::DateTime => 8,
            FieldType::String | FieldType::Blob => {
                let chars = if self.max_length > 0 {
                    self.max_length
                } else {
                    DEFAULT_STRING_LENGTH
                };
                chars * 2
            }
        }
    }
}

/// Ordered field list; order defines on-disk field order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Parse `name:type[:maxlen]` definitions separated by commas
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(TabulaError::InvalidArgument("schema text is empty".to_string()));
        }

        let mut fields = Vec::new();
        for def in text.split(',') {
            let mut parts = def.split(':');
            let name = parts.next().unwrap_or_default();
            if name.is_empty() {
                return Err(TabulaError::InvalidArgument(format!(
                    "field definition '{}' has no name",
                    def
                )));
            }

            let type_token = parts.next().ok_or_else(|| {
                TabulaError::InvalidArgument(format!("field '{}' has no type", name))
            })?;
            let field_type: FieldType = type_token.parse()?;

            let max_length = match parts.next() {
                Some(len) => len.parse().map_err(|_| {
                    TabulaError::InvalidArgument(format!(
                        "field '{}' has invalid max length '{}'",
                        name, len
                    ))
                })?,
                None => 0,
            };

            fields.push(Field {
                name: name.to_string(),
                field_type,
                max_length,
            });
        }

        Ok(Self { fields })
    }

    /// Build from a list of single-field definitions
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Result<Self> {
        let joined: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
        Self::parse(&joined.join(","))
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive field lookup, returning the field position
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name).map(|i| &self.fields[i])
    }

    /// Positions of all blob-typed fields
    pub fn blob_positions(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.field_type == FieldType::Blob)
            .map(|(i, _)| i)
            .collect()
    }

    /// Compute the nominal layout for this schema
    pub fn layout(&self) -> Layout {
        Layout::compute(self)
    }
}

impl FromStr for Schema {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", field.name, field.field_type.token())?;
            if field.field_type == FieldType::String && field.max_length > 0 {
                write!(f, ":{}", field.max_length)?;
            }
        }
        Ok(())
    }
}
