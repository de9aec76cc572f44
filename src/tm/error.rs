// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Coordinator error types.

use std::fmt;

use crate::journal::{JournalError, TxStatus};
use crate::resource::XaError;
use crate::uid::Uid;

/// Protocol phase in which a resource failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Commit,
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Prepare => "prepare",
            Phase::Commit => "commit",
            Phase::Rollback => "rollback",
        })
    }
}

/// How resources deviated from the coordinator's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicKind {
    /// Resources committed although rollback was decided.
    Commit,
    /// Every resource rolled back although commit was decided.
    Rollback,
    /// Some resources committed, others rolled back.
    Mixed,
    /// The outcome of some resources cannot be determined.
    Hazard,
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeuristicKind::Commit => "heuristic commit",
            HeuristicKind::Rollback => "heuristic rollback",
            HeuristicKind::Mixed => "heuristic mixed",
            HeuristicKind::Hazard => "heuristic hazard",
        })
    }
}

/// Why a transaction asked to commit was rolled back instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackReason {
    RollbackOnly,
    TimedOut,
    /// A resource voted to abort during prepare.
    PrepareVeto { resource: String, cause: XaError },
    /// The only branch group rolled back during a one-phase commit.
    OnePhase { resource: String },
    /// A resource failed to end its branch.
    DelistFailed { resource: String, cause: XaError },
    /// A synchronization failed before completion.
    BeforeCompletion(String),
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackReason::RollbackOnly => f.write_str("transaction was marked as rollback only"),
            RollbackReason::TimedOut => f.write_str("transaction timed out"),
            RollbackReason::PrepareVeto { resource, cause } => {
                write!(f, "resource {} voted to abort ({})", resource, cause)
            }
            RollbackReason::OnePhase { resource } => {
                write!(f, "resource {} rolled back during one-phase commit", resource)
            }
            RollbackReason::DelistFailed { resource, cause } => {
                write!(f, "cannot end branch on resource {} ({})", resource, cause)
            }
            RollbackReason::BeforeCompletion(reason) => {
                write!(f, "synchronization failed before completion ({})", reason)
            }
        }
    }
}

/// Errors that can occur in coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum TmError {
    #[error("nested transactions not supported")]
    NestedNotSupported,

    #[error("no transaction started on this context")]
    NoTransaction,

    #[error("transaction manager is shutting down")]
    ShuttingDown,

    #[error("cannot {operation} transaction {gtrid} in status {status}")]
    InvalidState {
        gtrid: Uid,
        status: TxStatus,
        operation: &'static str,
    },

    #[error("another transaction is already bound to this context")]
    AlreadyBound,

    #[error("transaction timeout must be positive or zero, got {0}")]
    InvalidTimeout(i64),

    #[error("transaction {gtrid} rolled back: {reason}")]
    Rollback { gtrid: Uid, reason: RollbackReason },

    #[error("transaction {gtrid} completed with a {kind} outcome on {resources:?}")]
    Heuristic {
        gtrid: Uid,
        kind: HeuristicKind,
        resources: Vec<String>,
    },

    /// Resources failed during a phase. Prepared branches left behind are
    /// resolved by recovery.
    #[error("{phase} failed on {resources:?} for transaction {gtrid}")]
    PhaseFailed {
        gtrid: Uid,
        phase: Phase,
        resources: Vec<String>,
    },

    #[error("resource {resource} failed: {source}")]
    Resource {
        resource: String,
        #[source]
        source: XaError,
    },

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}

impl TmError {
    /// Returns the phase a failure belongs to, when it has one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            TmError::PhaseFailed { phase, .. } => Some(*phase),
            TmError::Rollback {
                reason: RollbackReason::PrepareVeto { .. },
                ..
            } => Some(Phase::Prepare),
            TmError::Heuristic { .. } => Some(Phase::Commit),
            _ => None,
        }
    }
}
