// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Journal error types.

use std::path::PathBuf;

/// Errors that can occur in journal operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("cannot {operation}, disk journal is not open")]
    NotOpen { operation: &'static str },

    /// A record failed a structural or checksum check. `position` is the file
    /// offset of the record.
    #[error("corrupted log found at position {position} ({reason})")]
    Corrupted { position: u64, reason: String },

    /// The dangling records alone do not fit in the passive file. The
    /// configured log size is too small.
    #[error(
        "moving {dangling} in-flight transactions to the rollover log file would overflow it \
         ({needed} bytes needed, {capacity} available)"
    )]
    Overflow {
        dangling: usize,
        needed: u64,
        capacity: u64,
    },

    #[error("record of {size} bytes can never fit in a log file of {capacity} bytes")]
    RecordTooLarge { size: u64, capacity: u64 },

    #[error("transaction log files are not of the same length ({part1} vs {part2}), assuming they're corrupt")]
    LengthMismatch { part1: u64, part2: u64 },

    #[error("invalid log header in {path}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("invalid position {position} (valid range {min}..={max})")]
    InvalidPosition { position: u64, min: u64, max: u64 },

    #[error("invalid unique name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("GTRID of {0} bytes is too long")]
    GtridTooLong(usize),

    #[error("cannot log a record without unique names")]
    NoUniqueNames,

    #[error("log file {0} is a directory")]
    IsDirectory(PathBuf),

    #[error("cannot migrate a journal to itself")]
    SelfMigration,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
