// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Crash-durable write-ahead journal of transaction status transitions.
//!
//! The coordinator writes a COMMITTING record naming every resource of a
//! transaction before it tells any resource to commit, and a terminal record
//! (COMMITTED, UNKNOWN or ROLLEDBACK) as resources finish. A COMMITTING record
//! whose names have not all been resolved by later records is *dangling*: the
//! recoverer must finish committing those branches after a crash.
//!
//! [`DiskJournal`] keeps two pre-allocated files. Records go to the active
//! one; when it fills up, the dangling records are copied to the other file,
//! which then becomes active.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use xacoord::journal::{DiskJournal, Journal, TxStatus};
//! use xacoord::time::MonotonicClock;
//! use xacoord::uid::UidGenerator;
//! use xacoord::Configuration;
//!
//! let config = Configuration::in_directory("/var/lib/xacoord");
//! let clock = Arc::new(MonotonicClock::new());
//! let journal = DiskJournal::new(&config, clock.clone());
//! journal.open()?;
//!
//! let gtrid = UidGenerator::new(b"node-1".to_vec(), clock).generate_uid();
//! let names: BTreeSet<String> = ["orders-db".to_string()].into();
//! journal.log(TxStatus::Committing, &gtrid, &names)?;
//! journal.force()?;
//! assert_eq!(journal.collect_dangling_records()?.len(), 1);
//! journal.shutdown();
//! # Ok::<(), xacoord::journal::JournalError>(())
//! ```

mod appender;
mod cursor;
mod disk;
mod error;
mod header;
mod io;
mod null;
mod record;
mod status;

pub use appender::LogAppender;
pub use cursor::LogCursor;
pub use disk::DiskJournal;
pub use error::JournalError;
pub use header::{LogHeader, LogState, HEADER_LENGTH};
pub use null::NullJournal;
pub use record::{
    validate_unique_name, LogRecord, END_RECORD, MAX_UNIQUE_NAME_LENGTH, RECORD_HEADER_LENGTH,
};
pub use status::TxStatus;

use std::collections::{BTreeMap, BTreeSet};

use crate::uid::Uid;

/// COMMITTING records not yet fully resolved, keyed by GTRID. Each record
/// only carries the names still unresolved.
pub type DanglingRecords = BTreeMap<Uid, LogRecord>;

/// A transaction log.
pub trait Journal: Send + Sync {
    /// Opens the journal. Returns whether it had been closed cleanly.
    fn open(&self) -> Result<LogState, JournalError>;

    /// Whether records can currently be written.
    fn is_open(&self) -> bool;

    /// Appends one status transition of `gtrid` for the resources in
    /// `unique_names`.
    fn log(
        &self,
        status: TxStatus,
        gtrid: &Uid,
        unique_names: &BTreeSet<String>,
    ) -> Result<(), JournalError>;

    /// Makes every record logged so far durable.
    fn force(&self) -> Result<(), JournalError>;

    /// Replays the journal and returns the dangling COMMITTING records.
    fn collect_dangling_records(&self) -> Result<DanglingRecords, JournalError>;

    /// Flushes and releases the journal. A no-op when not open.
    fn close(&self) -> Result<(), JournalError>;

    /// Closes the journal, logging instead of returning failures.
    fn shutdown(&self) {
        if let Err(e) = self.close() {
            tracing::error!(
                error = %e,
                "error shutting down journal, transaction log integrity could be compromised"
            );
        }
    }
}

/// Applies the dangling-record rules to a stream of records.
///
/// COMMITTING (re)registers a GTRID with its names; COMMITTED, UNKNOWN and
/// ROLLEDBACK remove their names from it and drop the GTRID once none is left.
/// Corrupted records, bad checksums included, are skipped when
/// `skip_corrupted` is set and fatal otherwise.
pub fn collect_dangling(
    cursor: &mut LogCursor,
    skip_corrupted: bool,
) -> Result<DanglingRecords, JournalError> {
    let mut dangling = DanglingRecords::new();
    let mut committing = 0usize;
    let mut resolved = 0usize;

    while let Some(record) = next_record(cursor, false, skip_corrupted)? {
        let status = record.status();
        if status == TxStatus::Committing {
            dangling.insert(record.gtrid().clone(), record);
            committing += 1;
        } else if status.resolves_commit() {
            if let Some(pending) = dangling.get(record.gtrid()) {
                match pending.without_names(record.unique_names()) {
                    Some(remaining) => {
                        dangling.insert(record.gtrid().clone(), remaining);
                    }
                    None => {
                        dangling.remove(record.gtrid());
                        resolved += 1;
                    }
                }
            }
        }
    }

    tracing::debug!(
        committing,
        resolved,
        dangling = dangling.len(),
        "collected dangling records"
    );
    Ok(dangling)
}

/// Reads the next record, skipping corrupted ones when asked to.
pub(crate) fn next_record(
    cursor: &mut LogCursor,
    skip_crc_check: bool,
    skip_corrupted: bool,
) -> Result<Option<LogRecord>, JournalError> {
    loop {
        match cursor.read_record(skip_crc_check) {
            Err(e @ JournalError::Corrupted { .. }) if skip_corrupted => {
                tracing::error!(error = %e, "skipping corrupted log");
            }
            other => return other,
        }
    }
}
