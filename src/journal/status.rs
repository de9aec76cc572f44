// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction status codes.

use std::fmt;

/// Lifecycle status of a global transaction.
///
/// The discriminants are the XA/JTA status codes and are what the journal
/// stores on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum TxStatus {
    Active = 0,
    MarkedRollback = 1,
    Prepared = 2,
    Committed = 3,
    RolledBack = 4,
    Unknown = 5,
    NoTransaction = 6,
    Preparing = 7,
    Committing = 8,
    RollingBack = 9,
}

impl TxStatus {
    /// Returns the on-disk code.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parses an on-disk code.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => TxStatus::Active,
            1 => TxStatus::MarkedRollback,
            2 => TxStatus::Prepared,
            3 => TxStatus::Committed,
            4 => TxStatus::RolledBack,
            5 => TxStatus::Unknown,
            6 => TxStatus::NoTransaction,
            7 => TxStatus::Preparing,
            8 => TxStatus::Committing,
            9 => TxStatus::RollingBack,
            _ => return None,
        })
    }

    /// Whether a record with this status resolves names of an earlier
    /// COMMITTING record.
    ///
    /// ROLLEDBACK resolves because a one-phase commit may roll back after
    /// COMMITTING was written. UNKNOWN resolves because heuristic outcomes are
    /// reported, not retried.
    #[inline]
    pub fn resolves_commit(self) -> bool {
        matches!(
            self,
            TxStatus::Committed | TxStatus::Unknown | TxStatus::RolledBack
        )
    }

    /// Whether the journal keeps this status when log filtering is enabled.
    #[inline]
    pub fn survives_filter(self) -> bool {
        matches!(
            self,
            TxStatus::Committing | TxStatus::Committed | TxStatus::Unknown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Active => "ACTIVE",
            TxStatus::MarkedRollback => "MARKED_ROLLBACK",
            TxStatus::Prepared => "PREPARED",
            TxStatus::Committed => "COMMITTED",
            TxStatus::RolledBack => "ROLLEDBACK",
            TxStatus::Unknown => "UNKNOWN",
            TxStatus::NoTransaction => "NO_TRANSACTION",
            TxStatus::Preparing => "PREPARING",
            TxStatus::Committing => "COMMITTING",
            TxStatus::RollingBack => "ROLLING_BACK",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
