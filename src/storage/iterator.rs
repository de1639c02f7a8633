//! Record Iterator
//!
//! Sequential scan over the length-prefixed records of a data file.

use std::fs::File;
use std::io::{BufReader, Read};

use crate::config::TailPolicy;
use crate::error::{Result, TabulaError};

use super::LENGTH_PREFIX_SIZE;

/// One record as stored on disk
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// File offset of the first length prefix
    pub start: u64,
    /// File offset one past the last payload byte
    pub end: u64,
    /// Field payloads; empty when the scan skips payloads
    pub fields: Vec<Vec<u8>>,
}

/// Iterator over complete records in file order
///
/// A record whose declared lengths run past end-of-file is truncated: the
/// scan stops there and `truncated()` reports it, or an error is yielded
/// under `TailPolicy::Error`.
pub struct RecordIterator {
    reader: BufReader<File>,
    file_len: u64,
    position: u64,
    field_count: usize,
    load_payload: bool,
    tail_policy: TailPolicy,
    truncated: bool,
    done: bool,
}

impl RecordIterator {
    pub(super) fn new(
        file: File,
        field_count: usize,
        load_payload: bool,
        tail_policy: TailPolicy,
    ) -> Result<Self> {
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            file_len,
            position: 0,
            field_count,
            load_payload,
            tail_policy,
            truncated: false,
            done: false,
        })
    }

    /// Whether the scan stopped at a partially written record
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    fn read_record(&mut self) -> Result<Option<RawRecord>> {
        let start = self.position;
        let mut fields = Vec::with_capacity(if self.load_payload { self.field_count } else { 0 });

        for _ in 0..self.field_count {
            if self.position + LENGTH_PREFIX_SIZE > self.file_len {
                return Ok(None);
            }
            let mut prefix = [0u8; 4];
            self.reader.read_exact(&mut prefix)?;
            self.position += LENGTH_PREFIX_SIZE;

            // Negative lengths are treated as empty fields
            let len = i32::from_le_bytes(prefix).max(0) as u64;
            if self.position + len > self.file_len {
                return Ok(None);
            }

            if self.load_payload {
                let mut payload = vec![0u8; len as usize];
                self.reader.read_exact(&mut payload)?;
                fields.push(payload);
            } else {
                self.reader.seek_relative(len as i64)?;
            }
            self.position += len;
        }

        Ok(Some(RawRecord {
            start,
            end: self.position,
            fields,
        }))
    }
}

impl Iterator for RecordIterator {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.file_len {
            return None;
        }

        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                self.truncated = true;
                tracing::warn!(
                    offset = self.position,
                    file_len = self.file_len,
                    "truncated record at end of data file"
                );
                match self.tail_policy {
                    TailPolicy::Ignore => None,
                    TailPolicy::Error => Some(Err(TabulaError::DataCorrupt(format!(
                        "truncated record at offset {}",
                        self.position
                    )))),
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
