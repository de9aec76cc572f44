// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! One pre-allocated journal file and its header.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::header::{LogHeader, LogState, HEADER_LENGTH};
use super::io::{read_exact_at, write_all_at};
use super::{JournalError, LogCursor, LogRecord};

const ZERO_PAGE: [u8; 4096] = [0u8; 4096];

/// Appends records to a fixed-size journal file.
///
/// Offsets are reserved with [`reserve`](Self::reserve) by one thread at a
/// time, then the bytes may be written by several threads concurrently, each
/// at its own offset.
#[derive(Debug)]
pub struct LogAppender {
    path: PathBuf,
    file: Arc<File>,
    header: LogHeader,
}

impl LogAppender {
    /// Creates (or overwrites) a journal file holding `capacity` bytes of
    /// records after the header. The file is filled with zeros.
    pub fn create(path: &Path, capacity: u64, format_id: i32, timestamp: i64) -> Result<(), JournalError> {
        if path.is_dir() {
            return Err(JournalError::IsDirectory(path.to_path_buf()));
        }
        if path.exists() {
            fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let total = HEADER_LENGTH + capacity;
        let mut writer = BufWriter::new(&file);
        let mut left = total;
        while left > 0 {
            let chunk = left.min(ZERO_PAGE.len() as u64) as usize;
            writer.write_all(&ZERO_PAGE[..chunk])?;
            left -= chunk as u64;
        }
        writer.flush()?;
        drop(writer);

        let file = Arc::new(file);
        LogHeader::initialize(Arc::clone(&file), path, total, format_id, timestamp)?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), capacity, timestamp, "created log file");
        Ok(())
    }

    /// Opens an existing journal file. `max_file_length` bounds the write offset.
    pub fn open(path: &Path, max_file_length: u64) -> Result<Self, JournalError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file = Arc::new(file);
        let header = LogHeader::read(Arc::clone(&file), path, max_file_length)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.header.timestamp()
    }

    #[inline]
    pub fn state(&self) -> LogState {
        self.header.state()
    }

    pub fn set_timestamp(&self, timestamp: i64) -> Result<(), JournalError> {
        self.header.set_timestamp(timestamp)
    }

    pub fn set_state(&self, state: LogState) -> Result<(), JournalError> {
        self.header.set_state(state)
    }

    pub fn rewind(&self) -> Result<(), JournalError> {
        self.header.rewind()
    }

    /// Bytes available for records in an empty file.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.header.max_file_length() - HEADER_LENGTH
    }

    /// Reserves `len` bytes at the current write offset and advances it.
    ///
    /// Returns `None` when the record does not fit; the offset is left
    /// untouched so the caller can rotate. Callers must serialize reservations.
    pub fn reserve(&self, len: u64) -> Result<Option<u64>, JournalError> {
        let position = self.header.position();
        let end = position + len;
        if end > self.header.max_file_length() {
            return Ok(None);
        }
        self.header.set_position(end)?;
        Ok(Some(position))
    }

    /// Writes an encoded record at an offset obtained from [`reserve`](Self::reserve).
    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<(), JournalError> {
        write_all_at(&self.file, bytes, offset)?;
        Ok(())
    }

    /// Reserves space for `record` and writes it. Returns `false` when the
    /// record does not fit.
    pub fn append(&self, record: &LogRecord) -> Result<bool, JournalError> {
        match self.reserve(record.encoded_len())? {
            Some(offset) => {
                self.write_at(offset, &record.to_bytes())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flushes written records and the header to stable storage.
    pub fn force(&self) -> Result<(), JournalError> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Returns a cursor over the records written so far.
    pub fn cursor(&self) -> Result<LogCursor, JournalError> {
        let end = self.header.position();
        let mut data = vec![0u8; (end - HEADER_LENGTH) as usize];
        read_exact_at(&self.file, &mut data, HEADER_LENGTH)?;
        Ok(LogCursor::new(data.into(), HEADER_LENGTH))
    }

    /// Marks the file clean and syncs it.
    pub fn close(&self) -> Result<(), JournalError> {
        self.header.set_state(LogState::Clean)?;
        self.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), "closed log file");
        Ok(())
    }
}
