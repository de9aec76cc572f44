// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Fixed-layout header at the start of each journal file.
//!
//! Layout, big-endian: `formatId:i32 @0, timestamp:i64 @4, state:u8 @12,
//! position:i64 @13`. Each field is rewritten in place on its own.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use super::io::{read_exact_at, write_all_at};
use super::JournalError;

pub const FORMAT_ID_HEADER: u64 = 0;
pub const TIMESTAMP_HEADER: u64 = FORMAT_ID_HEADER + 4;
pub const STATE_HEADER: u64 = TIMESTAMP_HEADER + 8;
pub const CURRENT_POSITION_HEADER: u64 = STATE_HEADER + 1;
/// Total header size; the first record starts here.
pub const HEADER_LENGTH: u64 = CURRENT_POSITION_HEADER + 8;

/// Clean/unclean flag. A file left UNCLEAN was not shut down properly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Clean,
    Unclean,
}

impl LogState {
    pub const CLEAN_BYTE: u8 = 0;
    /// `-1` as a signed byte.
    pub const UNCLEAN_BYTE: u8 = 0xFF;

    #[inline]
    pub fn to_byte(self) -> u8 {
        match self {
            LogState::Clean => Self::CLEAN_BYTE,
            LogState::Unclean => Self::UNCLEAN_BYTE,
        }
    }

    /// Anything but the clean byte counts as unclean.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        if byte == Self::CLEAN_BYTE {
            LogState::Clean
        } else {
            LogState::Unclean
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogState::Clean => "CLEAN",
            LogState::Unclean => "UNCLEAN",
        }
    }
}

/// In-memory view of a journal file header, kept in sync with the file.
#[derive(Debug)]
pub struct LogHeader {
    file: Arc<File>,
    path: PathBuf,
    max_file_length: u64,
    format_id: AtomicI32,
    timestamp: AtomicI64,
    state: AtomicU8,
    position: AtomicU64,
}

impl LogHeader {
    /// Reads the header of an existing file.
    pub fn read(file: Arc<File>, path: &Path, max_file_length: u64) -> Result<Self, JournalError> {
        let mut raw = [0u8; HEADER_LENGTH as usize];
        read_exact_at(&file, &mut raw, FORMAT_ID_HEADER).map_err(|e| {
            JournalError::InvalidHeader {
                path: path.to_path_buf(),
                reason: format!("cannot read header: {}", e),
            }
        })?;

        let format_id = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&raw[4..12]);
        let timestamp = i64::from_be_bytes(ts);
        let state = raw[12];
        let mut pos = [0u8; 8];
        pos.copy_from_slice(&raw[13..21]);
        let position = i64::from_be_bytes(pos);

        let header = Self {
            file,
            path: path.to_path_buf(),
            max_file_length,
            format_id: AtomicI32::new(format_id),
            timestamp: AtomicI64::new(timestamp),
            state: AtomicU8::new(state),
            position: AtomicU64::new(0),
        };
        let position = u64::try_from(position).map_err(|_| JournalError::InvalidPosition {
            position: 0,
            min: HEADER_LENGTH,
            max: max_file_length,
        })?;
        header.check_position(position)?;
        header.position.store(position, Ordering::Release);

        tracing::debug!(
            path = %header.path.display(),
            timestamp,
            state = LogState::from_byte(state).as_str(),
            position,
            "read log header"
        );
        Ok(header)
    }

    /// Writes a fresh header to `file` and returns its view.
    pub fn initialize(
        file: Arc<File>,
        path: &Path,
        max_file_length: u64,
        format_id: i32,
        timestamp: i64,
    ) -> Result<Self, JournalError> {
        let mut raw = [0u8; HEADER_LENGTH as usize];
        raw[0..4].copy_from_slice(&format_id.to_be_bytes());
        raw[4..12].copy_from_slice(&timestamp.to_be_bytes());
        raw[12] = LogState::CLEAN_BYTE;
        raw[13..21].copy_from_slice(&(HEADER_LENGTH as i64).to_be_bytes());
        write_all_at(&file, &raw, FORMAT_ID_HEADER)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            max_file_length,
            format_id: AtomicI32::new(format_id),
            timestamp: AtomicI64::new(timestamp),
            state: AtomicU8::new(LogState::CLEAN_BYTE),
            position: AtomicU64::new(HEADER_LENGTH),
        })
    }

    #[inline]
    pub fn format_id(&self) -> i32 {
        self.format_id.load(Ordering::Acquire)
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp.load(Ordering::Acquire)
    }

    #[inline]
    pub fn state(&self) -> LogState {
        LogState::from_byte(self.state.load(Ordering::Acquire))
    }

    /// Offset where the next record goes.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_file_length(&self) -> u64 {
        self.max_file_length
    }

    pub fn set_format_id(&self, format_id: i32) -> Result<(), JournalError> {
        write_all_at(&self.file, &format_id.to_be_bytes(), FORMAT_ID_HEADER)?;
        self.format_id.store(format_id, Ordering::Release);
        Ok(())
    }

    pub fn set_timestamp(&self, timestamp: i64) -> Result<(), JournalError> {
        write_all_at(&self.file, &timestamp.to_be_bytes(), TIMESTAMP_HEADER)?;
        self.timestamp.store(timestamp, Ordering::Release);
        Ok(())
    }

    pub fn set_state(&self, state: LogState) -> Result<(), JournalError> {
        write_all_at(&self.file, &[state.to_byte()], STATE_HEADER)?;
        self.state.store(state.to_byte(), Ordering::Release);
        Ok(())
    }

    /// Moves the write offset. Rejects offsets inside the header or past the
    /// end of the file.
    pub fn set_position(&self, position: u64) -> Result<(), JournalError> {
        self.check_position(position)?;
        write_all_at(
            &self.file,
            &(position as i64).to_be_bytes(),
            CURRENT_POSITION_HEADER,
        )?;
        self.position.store(position, Ordering::Release);
        Ok(())
    }

    /// Moves the write offset back to the first record slot.
    pub fn rewind(&self) -> Result<(), JournalError> {
        self.set_position(HEADER_LENGTH)
    }

    fn check_position(&self, position: u64) -> Result<(), JournalError> {
        if position < HEADER_LENGTH || position > self.max_file_length {
            return Err(JournalError::InvalidPosition {
                position,
                min: HEADER_LENGTH,
                max: self.max_file_length,
            });
        }
        Ok(())
    }
}
