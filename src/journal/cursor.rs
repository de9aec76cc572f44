// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Forward-only reader over the records of one journal file.

use std::collections::BTreeSet;

use bytes::{Buf, Bytes};

use crate::uid::Uid;

use super::record::FIXED_RECORD_LENGTH;
use super::{JournalError, LogRecord, TxStatus, END_RECORD};

/// Reads the records between the header and the header's write offset.
///
/// A corrupted record yields [`JournalError::Corrupted`] and the cursor moves
/// past it when the record length can be trusted, so callers tolerating
/// corruption can keep reading.
#[derive(Debug)]
pub struct LogCursor {
    data: Bytes,
    base: u64,
    offset: usize,
}

impl LogCursor {
    /// Creates a cursor over `data`, the bytes of the used record area, which
    /// starts at file offset `base`.
    pub fn new(data: Bytes, base: u64) -> Self {
        Self {
            data,
            base,
            offset: 0,
        }
    }

    /// File offset of the next record.
    #[inline]
    pub fn offset_in_log(&self) -> u64 {
        self.base + self.offset as u64
    }

    /// Reads the next record, or `None` at the end of the used area.
    pub fn read_record(&mut self, skip_crc_check: bool) -> Result<Option<LogRecord>, JournalError> {
        if self.offset >= self.data.len() {
            tracing::trace!(position = self.offset_in_log(), "end of transaction log file reached");
            return Ok(None);
        }

        let position = self.offset_in_log();
        let remaining = &self.data[self.offset..];
        if remaining.len() < 8 {
            self.offset = self.data.len();
            return Err(corrupted(position, "truncated record header".to_string()));
        }

        let record_length = i32::from_be_bytes([remaining[4], remaining[5], remaining[6], remaining[7]]);
        if record_length < FIXED_RECORD_LENGTH as i32 {
            // Cannot find the next record without a usable length.
            self.offset = self.data.len();
            return Err(corrupted(
                position,
                format!("invalid record length {}", record_length),
            ));
        }

        let total = record_length as usize + 8;
        if total > remaining.len() {
            self.offset += total;
            return Err(corrupted(
                position,
                format!(
                    "record terminator outside of file bounds: {} of {}, recordLength: {}",
                    position + total as u64,
                    self.base + self.data.len() as u64,
                    record_length
                ),
            ));
        }

        let record = self.data.slice(self.offset..self.offset + total);
        self.offset += total;
        decode_record(&record, skip_crc_check)
            .map(Some)
            .map_err(|reason| corrupted(position, reason))
    }
}

impl Iterator for LogCursor {
    type Item = Result<LogRecord, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record(false).transpose()
    }
}

fn corrupted(position: u64, reason: String) -> JournalError {
    JournalError::Corrupted { position, reason }
}

/// Decodes exactly one on-disk record. `buf` must span the whole record.
pub(crate) fn decode_record(buf: &[u8], skip_crc_check: bool) -> Result<LogRecord, String> {
    if buf.len() < 8 + FIXED_RECORD_LENGTH {
        return Err(format!("record of {} bytes is too short", buf.len()));
    }

    let mut cur = buf;
    let status_code = cur.get_i32();
    let record_length = cur.get_i32();
    if record_length < 0 || record_length as usize + 8 != buf.len() {
        return Err(format!(
            "record length mismatch, recordLength: {}, available: {}",
            record_length,
            buf.len() - 8
        ));
    }
    let record_length = record_length as usize;

    let end_code = i32::from_be_bytes([
        buf[buf.len() - 4],
        buf[buf.len() - 3],
        buf[buf.len() - 2],
        buf[buf.len() - 1],
    ]);
    if end_code != END_RECORD {
        return Err("no record terminator found".to_string());
    }

    let header_length = cur.get_i32();
    let time = cur.get_i64();
    let sequence = cur.get_i32();
    let crc32 = cur.get_i32();
    let gtrid_size = cur.get_u8() as usize;

    if FIXED_RECORD_LENGTH + gtrid_size > record_length {
        return Err(format!("GTRID size too long: {}", gtrid_size));
    }
    let gtrid = Uid::from(&cur[..gtrid_size]);
    cur.advance(gtrid_size);

    let name_count = cur.get_i32();
    if name_count < 0 {
        return Err(format!("negative unique name count {}", name_count));
    }

    let mut read = FIXED_RECORD_LENGTH + gtrid_size;
    let mut unique_names = BTreeSet::new();
    for i in 0..name_count {
        if read + 2 > record_length {
            return Err(format!(
                "unique names too long, {} out of {}, recordLength: {}",
                i + 1,
                name_count,
                record_length
            ));
        }
        let length = cur.get_u16() as usize;
        read += 2 + length;
        if read > record_length {
            return Err(format!(
                "unique names too long, {} out of {}, length: {}, currentReadCount: {}, recordLength: {}",
                i + 1,
                name_count,
                length,
                read,
                record_length
            ));
        }
        let name = std::str::from_utf8(&cur[..length])
            .ok()
            .filter(|name| name.is_ascii())
            .ok_or_else(|| format!("unique name {} is not ASCII", i + 1))?
            .to_string();
        cur.advance(length);
        unique_names.insert(name);
    }

    if read != record_length {
        return Err(format!(
            "record length mismatch, recordLength: {}, content: {}",
            record_length, read
        ));
    }
    let end_record = cur.get_i32();

    let status = TxStatus::from_code(status_code)
        .ok_or_else(|| format!("unknown status code {}", status_code))?;

    let record = LogRecord::from_parts(
        status,
        record_length as i32,
        header_length,
        time,
        sequence,
        crc32,
        gtrid,
        unique_names,
        end_record,
    );

    if !skip_crc_check && !record.is_crc32_correct() {
        return Err(format!(
            "invalid CRC, recorded: {}, calculated: {}",
            record.crc32(),
            record.calculate_crc32()
        ));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn record(status: TxStatus, seq: i32, names: &[&str]) -> LogRecord {
        LogRecord::new(
            status,
            Uid::from(format!("server-{:08}-{:04}", seq, seq).into_bytes()),
            names.iter().map(|s| s.to_string()).collect(),
            1_000 + seq as i64,
            seq,
        )
        .unwrap()
    }

    fn area(records: &[LogRecord]) -> BytesMut {
        let mut buf = BytesMut::new();
        for r in records {
            r.encode(&mut buf);
        }
        buf
    }

    #[test]
    fn test_reads_back_all_fields() {
        let written = vec![
            record(TxStatus::Committing, 1, &["a", "b"]),
            record(TxStatus::Committed, 2, &["a"]),
            record(TxStatus::Unknown, 3, &["b"]),
        ];
        let mut cursor = LogCursor::new(area(&written).freeze(), 21);

        for expected in &written {
            let read = cursor.read_record(false).unwrap().unwrap();
            assert_eq!(read.status(), expected.status());
            assert_eq!(read.gtrid(), expected.gtrid());
            assert_eq!(read.time(), expected.time());
            assert_eq!(read.sequence(), expected.sequence());
            assert_eq!(read.unique_names(), expected.unique_names());
            assert!(read.is_crc32_correct());
        }
        assert!(cursor.read_record(false).unwrap().is_none());
    }

    #[test]
    fn test_offset_in_log_advances_per_record() {
        let written = vec![
            record(TxStatus::Committing, 1, &["a"]),
            record(TxStatus::Committed, 2, &["a", "b"]),
        ];
        let mut cursor = LogCursor::new(area(&written).freeze(), 21);
        assert_eq!(cursor.offset_in_log(), 21);

        cursor.read_record(false).unwrap().unwrap();
        assert_eq!(cursor.offset_in_log(), 21 + written[0].encoded_len());

        let second = cursor.read_record(false).unwrap().unwrap();
        assert_eq!(second.sequence(), 2);
        let end = 21 + written.iter().map(LogRecord::encoded_len).sum::<u64>();
        assert_eq!(cursor.offset_in_log(), end);
        assert!(cursor.read_record(false).unwrap().is_none());
        assert_eq!(cursor.offset_in_log(), end);
    }

    #[test]
    fn test_iterator() {
        let written = vec![
            record(TxStatus::Committing, 1, &["a"]),
            record(TxStatus::Committed, 2, &["a"]),
        ];
        let cursor = LogCursor::new(area(&written).freeze(), 21);
        let read: Vec<_> = cursor.collect::<Result<_, _>>().unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn test_bad_crc_then_continue() {
        let written = vec![
            record(TxStatus::Committing, 1, &["a"]),
            record(TxStatus::Committing, 2, &["b"]),
        ];
        let mut buf = area(&written);
        // Corrupt the time field of the first record.
        buf[13] ^= 0xFF;
        let mut cursor = LogCursor::new(buf.freeze(), 21);

        match cursor.read_record(false) {
            Err(JournalError::Corrupted { position, reason }) => {
                assert_eq!(position, 21);
                assert!(reason.contains("invalid CRC"), "{}", reason);
            }
            other => panic!("expected corruption, got {:?}", other),
        }
        let next = cursor.read_record(false).unwrap().unwrap();
        assert_eq!(next.sequence(), 2);
    }

    #[test]
    fn test_bad_crc_skipped_when_asked() {
        let mut buf = area(&[record(TxStatus::Committing, 1, &["a"])]);
        buf[13] ^= 0xFF;
        let mut cursor = LogCursor::new(buf.freeze(), 21);
        let read = cursor.read_record(true).unwrap().unwrap();
        assert!(!read.is_crc32_correct());
    }

    #[test]
    fn test_missing_terminator() {
        let mut buf = area(&[record(TxStatus::Committing, 1, &["a"])]);
        let len = buf.len();
        buf[len - 1] = 0;
        let mut cursor = LogCursor::new(buf.freeze(), 21);
        let err = cursor.read_record(false).unwrap_err();
        assert!(err.to_string().contains("no record terminator found"), "{}", err);
        assert!(cursor.read_record(false).unwrap().is_none());
    }

    #[test]
    fn test_terminator_outside_bounds() {
        let buf = area(&[record(TxStatus::Committing, 1, &["a"])]);
        let truncated = buf.freeze().slice(..30);
        let mut cursor = LogCursor::new(truncated, 21);
        let err = cursor.read_record(false).unwrap_err();
        assert!(err.to_string().contains("outside of file bounds"), "{}", err);
        assert!(cursor.read_record(false).unwrap().is_none());
    }

    #[test]
    fn test_gtrid_too_long() {
        let mut buf = area(&[record(TxStatus::Committing, 1, &["a"])]);
        buf[28] = 0xFF;
        let mut cursor = LogCursor::new(buf.freeze(), 21);
        let err = cursor.read_record(false).unwrap_err();
        assert!(err.to_string().contains("GTRID size too long"), "{}", err);
    }

    #[test]
    fn test_names_too_long() {
        let r = record(TxStatus::Committing, 1, &["abc"]);
        let mut buf = area(&[r.clone()]);
        let name_len_offset = 29 + r.gtrid().len() + 4;
        buf[name_len_offset] = 0x7F;
        let mut cursor = LogCursor::new(buf.freeze(), 21);
        let err = cursor.read_record(false).unwrap_err();
        assert!(err.to_string().contains("unique names too long"), "{}", err);
    }
}
