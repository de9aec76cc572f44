// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Journal that records nothing.

use std::collections::BTreeSet;

use super::{DanglingRecords, Journal, JournalError, LogState, TxStatus};
use crate::uid::Uid;

/// A [`Journal`] that discards every record.
///
/// Transactions coordinated with it are not recoverable after a crash: the
/// recoverer sees no commit intent and rolls every in-doubt branch back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

impl NullJournal {
    pub fn new() -> Self {
        Self
    }
}

impl Journal for NullJournal {
    fn is_open(&self) -> bool {
        true
    }

    fn open(&self) -> Result<LogState, JournalError> {
        Ok(LogState::Clean)
    }

    fn log(&self, _: TxStatus, _: &Uid, _: &BTreeSet<String>) -> Result<(), JournalError> {
        Ok(())
    }

    fn force(&self) -> Result<(), JournalError> {
        Ok(())
    }

    fn collect_dangling_records(&self) -> Result<DanglingRecords, JournalError> {
        Ok(DanglingRecords::new())
    }

    fn close(&self) -> Result<(), JournalError> {
        Ok(())
    }
}
