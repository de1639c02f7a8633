//! Record Store
//!
//! Reads, appends, edits, and deletes records in a single data file.
//! Every operation opens the files it needs and closes them before
//! returning; no handles are held between calls.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;

use crate::config::TailPolicy;
use crate::error::{Result, TabulaError};
use crate::schema::{decode_text, decode_value, encode_value, Record, Schema, Value};

use super::iterator::{RawRecord, RecordIterator};
use super::{MetadataHeader, DATA_FILENAME, METADATA_FILENAME};

/// Result of a full scan over the data file
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Number of complete records
    pub records: usize,
    /// Whether the scan stopped at a partially written record
    pub truncated_tail: bool,
    /// Size of the data file in bytes
    pub file_len: u64,
}

/// Handle to one metadata + data file pair
#[derive(Debug, Clone)]
pub struct RecordStore {
    metadata_path: PathBuf,
    data_path: PathBuf,
    /// Schema text callers expect; checked against line 1 of the metadata
    expected_schema: Option<String>,
    io_buffer_size: usize,
    tail_policy: TailPolicy,
}

impl RecordStore {
    /// Default buffer size for byte shifting
    const DEFAULT_IO_BUFFER: usize = 64 * 1024;

    /// Attach to an existing metadata/data file pair
    pub fn open(metadata_path: impl Into<PathBuf>, data_path: impl Into<PathBuf>) -> Self {
        Self {
            metadata_path: metadata_path.into(),
            data_path: data_path.into(),
            expected_schema: None,
            io_buffer_size: Self::DEFAULT_IO_BUFFER,
            tail_policy: TailPolicy::Ignore,
        }
    }

    /// Attach to the standard file names inside a table directory
    pub fn open_dir(dir: &Path) -> Self {
        Self::open(dir.join(METADATA_FILENAME), dir.join(DATA_FILENAME))
    }

    /// Write a fresh metadata header and an empty data file
    pub fn create(dir: &Path, schema: &Schema) -> Result<Self> {
        let store = Self::open_dir(dir).with_expected_schema(schema);
        MetadataHeader::for_schema(schema).write(&store.metadata_path)?;
        File::create(&store.data_path)?;
        tracing::debug!(dir = %dir.display(), schema = %schema, "created record store");
        Ok(store)
    }

    /// Require the stored schema text to equal this schema
    pub fn with_expected_schema(self, schema: &Schema) -> Self {
        self.with_expected_schema_text(schema.to_string())
    }

    /// Require line 1 of the metadata to equal `text` exactly
    pub fn with_expected_schema_text(mut self, text: impl Into<String>) -> Self {
        self.expected_schema = Some(text.into());
        self
    }

    pub fn with_io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size.max(1);
        self
    }

    pub fn with_tail_policy(mut self, policy: TailPolicy) -> Self {
        self.tail_policy = policy;
        self
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    // =========================================================================
    // Header
    // =========================================================================

    /// Read the schema and the derived field count from the metadata file.
    ///
    /// Fails with `SchemaMismatch` when an expected schema was supplied and
    /// the stored schema text differs.
    pub fn load_schema_and_field_count(&self) -> Result<(Schema, usize)> {
        let header = MetadataHeader::read(&self.metadata_path)?;
        if let Some(expected) = &self.expected_schema {
            if *expected != header.schema_text {
                return Err(TabulaError::SchemaMismatch {
                    expected: expected.clone(),
                    found: header.schema_text,
                });
            }
        }
        let schema = header.schema()?;
        Ok((schema, header.field_count()))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append one record at end of file
    pub fn append_record(&self, record: &[Option<Value>]) -> Result<()> {
        let (_, field_count) = self.load_schema_and_field_count()?;
        check_field_count(record, field_count)?;
        let encoded = encode_record(record)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.data_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encoded)?;
        writer.flush()?;

        tracing::debug!(bytes = encoded.len(), "appended record");
        Ok(())
    }

    /// Append many records with a single open; nothing is written unless
    /// every record encodes
    pub fn append_records(&self, records: &[Record]) -> Result<()> {
        let (_, field_count) = self.load_schema_and_field_count()?;
        let mut encoded = Vec::new();
        for record in records {
            check_field_count(record, field_count)?;
            encoded.extend_from_slice(&encode_record(record)?);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.data_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encoded)?;
        writer.flush()?;

        tracing::debug!(count = records.len(), "appended records");
        Ok(())
    }

    /// Replace the record at `index` with `record`.
    ///
    /// The old byte range is spliced out and the new encoding written in its
    /// place, so the record keeps its ordinal position.
    pub fn edit_record(&self, index: usize, record: &[Option<Value>]) -> Result<()> {
        let (_, field_count) = self.load_schema_and_field_count()?;
        check_field_count(record, field_count)?;
        let encoded = encode_record(record)?;
        let (start, end) = self
            .find_offsets(field_count, index)?
            .ok_or_else(|| self.out_of_range(index, field_count))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.data_path)?;
        let file_len = file.metadata()?.len();

        let new_end = start + encoded.len() as u64;
        if new_end != end {
            shift_tail(&mut file, end, new_end, file_len, self.io_buffer_size)?;
        }
        file.seek(SeekFrom::Start(start))?;
        file.write_all(&encoded)?;
        file.flush()?;

        tracing::debug!(index, old_len = end - start, new_len = encoded.len(), "edited record");
        Ok(())
    }

    /// Remove the record at `index`, compacting the file
    pub fn delete_record(&self, index: usize) -> Result<()> {
        let (_, field_count) = self.load_schema_and_field_count()?;
        let (start, end) = self
            .find_offsets(field_count, index)?
            .ok_or_else(|| self.out_of_range(index, field_count))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.data_path)?;
        let file_len = file.metadata()?.len();
        shift_tail(&mut file, end, start, file_len, self.io_buffer_size)?;

        tracing::debug!(index, removed = end - start, "deleted record");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Byte range `[start, end)` of the record at `index`, if it exists
    pub fn try_get_record_offsets(&self, index: usize) -> Result<Option<(u64, u64)>> {
        let (_, field_count) = self.load_schema_and_field_count()?;
        self.find_offsets(field_count, index)
    }

    /// Number of complete records in the data file
    pub fn record_count(&self) -> Result<usize> {
        Ok(self.scan()?.records)
    }

    /// Walk the whole file without decoding payloads
    pub fn scan(&self) -> Result<ScanReport> {
        let (_, field_count) = self.load_schema_and_field_count()?;
        let mut iter = self.iter_raw(field_count, false)?;
        let mut records = 0;
        for raw in iter.by_ref() {
            raw?;
            records += 1;
        }
        Ok(ScanReport {
            records,
            truncated_tail: iter.truncated(),
            file_len: std::fs::metadata(&self.data_path)?.len(),
        })
    }

    /// Decode every complete record
    pub fn read_all(&self) -> Result<Vec<Record>> {
        let (schema, field_count) = self.load_schema_and_field_count()?;
        self.iter_raw(field_count, true)?
            .map(|raw| raw.map(|r| decode_record(&schema, &r)))
            .collect()
    }

    /// Decode the record at `index`, or `None` past the last complete record
    pub fn read_record(&self, index: usize) -> Result<Option<Record>> {
        let (schema, field_count) = self.load_schema_and_field_count()?;
        match self.iter_raw(field_count, true)?.nth(index) {
            Some(raw) => Ok(Some(decode_record(&schema, &raw?))),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn iter_raw(&self, field_count: usize, load_payload: bool) -> Result<RecordIterator> {
        let file = File::open(&self.data_path)?;
        RecordIterator::new(file, field_count, load_payload, self.tail_policy)
    }

    fn find_offsets(&self, field_count: usize, index: usize) -> Result<Option<(u64, u64)>> {
        match self.iter_raw(field_count, false)?.nth(index) {
            Some(raw) => {
                let raw = raw?;
                Ok(Some((raw.start, raw.end)))
            }
            None => Ok(None),
        }
    }

    fn out_of_range(&self, index: usize, field_count: usize) -> TabulaError {
        let len = self
            .iter_raw(field_count, false)
            .map(|iter| iter.filter(|r| r.is_ok()).count())
            .unwrap_or(0);
        TabulaError::RecordOutOfRange { index, len }
    }
}

/// Record boundaries come only from the field count, so every write must match it
fn check_field_count(record: &[Option<Value>], field_count: usize) -> Result<()> {
    if record.len() != field_count {
        return Err(TabulaError::InvalidArgument(format!(
            "record has {} fields, data file expects {}",
            record.len(),
            field_count
        )));
    }
    Ok(())
}

/// Encode a record as consecutive `(i32 length, payload)` pairs
pub(crate) fn encode_record(record: &[Option<Value>]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for value in record {
        let payload = encode_value(value.as_ref())?;
        let len = i32::try_from(payload.len()).map_err(|_| {
            TabulaError::InvalidArgument(format!("field payload of {} bytes is too large", payload.len()))
        })?;
        buf.put_i32_le(len);
        buf.put_slice(&payload);
    }
    Ok(buf)
}

/// Decode raw payloads with schema types; extra fields decode as text
fn decode_record(schema: &Schema, raw: &RawRecord) -> Record {
    raw.fields
        .iter()
        .enumerate()
        .map(|(i, bytes)| match schema.fields().get(i) {
            Some(field) => decode_value(bytes, field.field_type),
            None if bytes.is_empty() => None,
            None => Some(decode_text(bytes)),
        })
        .collect()
}

/// Move the bytes `[from, file_len)` so they start at `to`, then set the
/// file length to match. Copies in bounded chunks, front-to-back when
/// shrinking and back-to-front when growing.
fn shift_tail(file: &mut File, from: u64, to: u64, file_len: u64, buf_size: usize) -> Result<()> {
    let tail_len = file_len.saturating_sub(from);
    let mut buf = vec![0u8; buf_size];

    if to < from {
        let mut copied = 0u64;
        while copied < tail_len {
            let chunk = (tail_len - copied).min(buf_size as u64) as usize;
            file.seek(SeekFrom::Start(from + copied))?;
            file.read_exact(&mut buf[..chunk])?;
            file.seek(SeekFrom::Start(to + copied))?;
            file.write_all(&buf[..chunk])?;
            copied += chunk as u64;
        }
    } else if to > from {
        let mut remaining = tail_len;
        while remaining > 0 {
            let chunk = remaining.min(buf_size as u64) as usize;
            remaining -= chunk as u64;
            file.seek(SeekFrom::Start(from + remaining))?;
            file.read_exact(&mut buf[..chunk])?;
            file.seek(SeekFrom::Start(to + remaining))?;
            file.write_all(&buf[..chunk])?;
        }
    }

    file.set_len(to + tail_len)?;
    Ok(())
}
