// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Journal record encoding and checksum.
//!
//! On-disk layout, all integers big-endian:
//!
//! ```text
//! status:i32  recordLength:i32  headerLength:i32  time:i64  sequence:i32  crc32:i32
//! gtridLength:u8  gtrid:[u8]  nameCount:i32  (nameLength:u16  name:[u8])*  endRecord:i32
//! ```
//!
//! `recordLength` counts every byte after itself. The CRC covers the same fields
//! except `crc32` and `gtridLength`, with names in sorted order.

use std::collections::BTreeSet;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::uid::{Uid, MAX_UID_LENGTH};

use super::{JournalError, TxStatus};

/// Size of the fixed record header: status, length, header length, time,
/// sequence and checksum.
pub const RECORD_HEADER_LENGTH: i32 = 4 + 4 + 4 + 8 + 4 + 4;

/// Marker closing every record ("xntB").
pub const END_RECORD: i32 = 0x786e_7442;

/// Bytes of `recordLength` that do not depend on the gtrid or the names:
/// header length, time, sequence, crc, gtrid length, name count, end marker.
pub(crate) const FIXED_RECORD_LENGTH: usize = 4 + 8 + 4 + 4 + 1 + 4 + 4;

/// Longest unique name the record format can carry.
pub const MAX_UNIQUE_NAME_LENGTH: usize = i16::MAX as usize;

/// One status transition of one transaction.
#[derive(Clone, PartialEq, Eq)]
pub struct LogRecord {
    status: TxStatus,
    record_length: i32,
    header_length: i32,
    time: i64,
    sequence: i32,
    crc32: i32,
    gtrid: Uid,
    unique_names: BTreeSet<String>,
    end_record: i32,
}

impl LogRecord {
    /// Builds a record and computes its length and checksum.
    pub fn new(
        status: TxStatus,
        gtrid: Uid,
        unique_names: BTreeSet<String>,
        time: i64,
        sequence: i32,
    ) -> Result<Self, JournalError> {
        if gtrid.len() > MAX_UID_LENGTH {
            return Err(JournalError::GtridTooLong(gtrid.len()));
        }
        for name in &unique_names {
            validate_unique_name(name)?;
        }

        let mut record = Self {
            status,
            record_length: 0,
            header_length: RECORD_HEADER_LENGTH,
            time,
            sequence,
            crc32: 0,
            gtrid,
            unique_names,
            end_record: END_RECORD,
        };
        record.record_length = record.calculate_record_length();
        record.crc32 = record.calculate_crc32();
        Ok(record)
    }

    /// Rebuilds a record from decoded fields without recomputing anything.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        status: TxStatus,
        record_length: i32,
        header_length: i32,
        time: i64,
        sequence: i32,
        crc32: i32,
        gtrid: Uid,
        unique_names: BTreeSet<String>,
        end_record: i32,
    ) -> Self {
        Self {
            status,
            record_length,
            header_length,
            time,
            sequence,
            crc32,
            gtrid,
            unique_names,
            end_record,
        }
    }

    #[inline]
    pub fn status(&self) -> TxStatus {
        self.status
    }

    #[inline]
    pub fn gtrid(&self) -> &Uid {
        &self.gtrid
    }

    #[inline]
    pub fn unique_names(&self) -> &BTreeSet<String> {
        &self.unique_names
    }

    #[inline]
    pub fn time(&self) -> i64 {
        self.time
    }

    #[inline]
    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    #[inline]
    pub fn crc32(&self) -> i32 {
        self.crc32
    }

    #[inline]
    pub fn record_length(&self) -> i32 {
        self.record_length
    }

    #[inline]
    pub fn header_length(&self) -> i32 {
        self.header_length
    }

    #[inline]
    pub fn end_record(&self) -> i32 {
        self.end_record
    }

    /// Number of bytes the record occupies on disk.
    #[inline]
    pub fn encoded_len(&self) -> u64 {
        self.calculate_record_length() as u64 + 8
    }

    fn names_length(&self) -> usize {
        self.unique_names.iter().map(|name| 2 + name.len()).sum()
    }

    fn calculate_record_length(&self) -> i32 {
        (FIXED_RECORD_LENGTH + self.gtrid.len() + self.names_length()) as i32
    }

    /// Recomputes the checksum from the record's fields.
    pub fn calculate_crc32(&self) -> i32 {
        let mut buf =
            BytesMut::with_capacity(24 + self.gtrid.len() + 4 + self.names_length() + 4);
        buf.put_i32(self.status.code());
        buf.put_i32(self.calculate_record_length());
        buf.put_i32(self.header_length);
        buf.put_i64(self.time);
        buf.put_i32(self.sequence);
        buf.put_slice(self.gtrid.as_bytes());
        self.put_names(&mut buf);
        buf.put_i32(self.end_record);

        crc32fast::hash(&buf) as i32
    }

    /// Whether the stored checksum matches the record's content.
    #[inline]
    pub fn is_crc32_correct(&self) -> bool {
        self.calculate_crc32() == self.crc32
    }

    fn put_names(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.unique_names.len() as i32);
        for name in &self.unique_names {
            buf.put_u16(name.len() as u16);
            buf.put_slice(name.as_bytes());
        }
    }

    /// Appends the on-disk form of this record to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.status.code());
        buf.put_i32(self.record_length);
        buf.put_i32(self.header_length);
        buf.put_i64(self.time);
        buf.put_i32(self.sequence);
        buf.put_i32(self.crc32);
        buf.put_u8(self.gtrid.len() as u8);
        buf.put_slice(self.gtrid.as_bytes());
        self.put_names(buf);
        buf.put_i32(self.end_record);
    }

    /// Returns the on-disk form of this record.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len() as usize);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Returns a copy of this record with `resolved` names removed, or `None`
    /// when no name is left. Time and sequence are preserved; length and
    /// checksum are recomputed.
    pub(crate) fn without_names(&self, resolved: &BTreeSet<String>) -> Option<Self> {
        let remaining: BTreeSet<String> =
            self.unique_names.difference(resolved).cloned().collect();
        if remaining.is_empty() {
            return None;
        }
        let mut record = Self {
            unique_names: remaining,
            ..self.clone()
        };
        record.record_length = record.calculate_record_length();
        record.crc32 = record.calculate_crc32();
        Some(record)
    }
}

/// Checks that a resource unique name can be stored in a record.
pub fn validate_unique_name(name: &str) -> Result<(), JournalError> {
    if name.is_empty() {
        return Err(JournalError::InvalidName {
            name: name.to_string(),
            reason: "name is empty",
        });
    }
    if !name.is_ascii() {
        return Err(JournalError::InvalidName {
            name: name.to_string(),
            reason: "name must be ASCII",
        });
    }
    if name.len() > MAX_UNIQUE_NAME_LENGTH {
        return Err(JournalError::InvalidName {
            name: name.to_string(),
            reason: "name is too long",
        });
    }
    Ok(())
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("status", &self.status)
            .field("record_length", &self.record_length)
            .field("header_length", &self.header_length)
            .field("time", &self.time)
            .field("sequence", &self.sequence)
            .field("crc32", &self.crc32)
            .field("gtrid", &self.gtrid)
            .field("unique_names", &self.unique_names)
            .finish()
    }
}
