//! Field values and their byte encoding
//!
//! - Integer:  i32 little-endian (4 bytes)
//! - Boolean:  one byte, 0 or 1
//! - DateTime: i64 little-endian tick count (100ns since 0001-01-01 UTC)
//! - String / Blob reference: UTF-8 bytes
//! - Absent value: zero-length run

use std::fmt;

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TabulaError};

use super::FieldType;

/// One row's worth of values in schema order; `None` is an absent value
pub type Record = Vec<Option<Value>>;

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// A typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i32),
    Text(String),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    /// Raw payload; only accepted by blob fields, which store it as a file
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Short name of the variant, used in validation messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Text(_) => "string",
            Value::Boolean(_) => "bool",
            Value::DateTime(_) => "datetime",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Value::Bytes(b) => f.write_str(&super::layout::to_hex(b)),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Encode a value to its on-disk byte run.
///
/// Fails with `InvalidArgument` for a datetime outside the i64 tick range.
pub fn encode_value(value: Option<&Value>) -> Result<Vec<u8>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    match value {
        Value::Integer(i) => buf.put_i32_le(*i),
        Value::Boolean(b) => buf.put_u8(u8::from(*b)),
        Value::DateTime(dt) => buf.put_i64_le(checked_ticks(dt)?),
        Value::Text(s) => buf.put_slice(s.as_bytes()),
        Value::Bytes(b) => buf.put_slice(b),
    }
    Ok(buf)
}

/// Tick count for `dt`, or `InvalidArgument` when it does not fit an i64
pub fn checked_ticks(dt: &DateTime<Utc>) -> Result<i64> {
    to_ticks(dt).ok_or_else(|| {
        TabulaError::InvalidArgument(format!("datetime {} is outside the storable tick range", dt.to_rfc3339()))
    })
}

/// Decode a byte run using the field's declared type.
///
/// An empty run is an absent value. Runs that do not fit the declared type
/// fall back to lossy UTF-8 text.
pub fn decode_value(bytes: &[u8], field_type: FieldType) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }

    let mut buf = bytes;
    let decoded = match field_type {
        FieldType::Integer if bytes.len() >= 4 => Some(Value::Integer(buf.get_i32_le())),
        FieldType::Boolean => Some(Value::Boolean(buf.get_u8() != 0)),
        FieldType::DateTime if bytes.len() >= 8 => from_ticks(buf.get_i64_le()).map(Value::DateTime),
        FieldType::String | FieldType::Blob => {
            Some(Value::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
        _ => None,
    };

    decoded.or_else(|| Some(decode_text(bytes)))
}

/// Decode a byte run with no schema type available
pub(crate) fn decode_text(bytes: &[u8]) -> Value {
    Value::Text(String::from_utf8_lossy(bytes).into_owned())
}

fn to_ticks(dt: &DateTime<Utc>) -> Option<i64> {
    let sub_second = i64::from(dt.timestamp_subsec_nanos()) / 100;
    dt.timestamp()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(UNIX_EPOCH_TICKS)?
        .checked_add(sub_second)
}

fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let since_epoch = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = since_epoch.rem_euclid(TICKS_PER_SECOND) * 100;
    DateTime::from_timestamp(secs, nanos as u32)
}
