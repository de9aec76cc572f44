// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction coordination.
//!
//! [`TransactionManager`] demarcates global transactions bound to a
//! [`TxContext`] and drives two-phase commit over the enlisted resources.
//! Resources that report the same resource manager id share one XA branch.
//!
//! ```text
//!   begin ──► ACTIVE ──► PREPARING ──► PREPARED ──► COMMITTING ──► COMMITTED
//!               │            │                           │
//!               ▼            ▼                           ▼
//!        MARKED_ROLLBACK ──► ROLLING_BACK ──► ROLLEDBACK  UNKNOWN (heuristic)
//! ```

mod context;
mod error;
mod inflight;
mod manager;
mod timeout;
mod transaction;
mod twopc;

pub use context::TxContext;
pub use error::{HeuristicKind, Phase, RollbackReason, TmError};
pub use inflight::InFlightRegistry;
pub use manager::TransactionManager;
pub use timeout::TimeoutSweeper;
pub use transaction::{Synchronization, SynchronizationError, Transaction};
pub use twopc::{BranchOutcome, PrepareOutcome};

pub(crate) use twopc::{commit_branch, rollback_branch};
