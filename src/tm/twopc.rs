// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-branch protocol steps and their outcomes.
//!
//! Every XA call made during completion is mapped to a closed outcome type so
//! the coordinator handles each possible result explicitly. Heuristically
//! completed branches are forgotten here, once their outcome is recorded.

use crate::resource::{Vote, XaError, XaResource};
use crate::uid::Xid;

use super::HeuristicKind;

/// Outcome of phase 1 for one branch group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    Prepared,
    /// Nothing to commit. The branch is already completed.
    ReadOnly,
    /// The resource refused to commit.
    VoteAbort(XaError),
    /// The resource could not be asked. Treated like a veto.
    Failure(XaError),
}

/// Outcome of commit or rollback for one branch group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    Committed,
    RolledBack,
    Heuristic(HeuristicKind),
    /// The resource no longer knows the branch.
    NotFound,
    Failure(XaError),
}

pub(crate) fn prepare_branch(resource: &dyn XaResource, xid: &Xid) -> PrepareOutcome {
    match resource.prepare(xid) {
        Ok(Vote::Ok) => PrepareOutcome::Prepared,
        Ok(Vote::ReadOnly) => PrepareOutcome::ReadOnly,
        Err(e @ XaError::Rollback(_)) => PrepareOutcome::VoteAbort(e),
        Err(e) if e.is_heuristic() => PrepareOutcome::VoteAbort(e),
        Err(e) => PrepareOutcome::Failure(e),
    }
}

pub(crate) fn commit_branch(resource: &dyn XaResource, xid: &Xid, one_phase: bool) -> BranchOutcome {
    match resource.commit(xid, one_phase) {
        Ok(()) => BranchOutcome::Committed,
        Err(XaError::NoSuchBranch) => BranchOutcome::NotFound,
        Err(XaError::Rollback(_)) if one_phase => BranchOutcome::RolledBack,
        Err(XaError::Rollback(_)) => BranchOutcome::Heuristic(HeuristicKind::Rollback),
        Err(XaError::HeuristicCommit) => {
            forget(resource, xid);
            BranchOutcome::Committed
        }
        Err(e) => match heuristic_kind(&e) {
            Some(kind) => {
                forget(resource, xid);
                BranchOutcome::Heuristic(kind)
            }
            None => BranchOutcome::Failure(e),
        },
    }
}

pub(crate) fn rollback_branch(resource: &dyn XaResource, xid: &Xid) -> BranchOutcome {
    match resource.rollback(xid) {
        Ok(()) => BranchOutcome::RolledBack,
        Err(XaError::NoSuchBranch) => BranchOutcome::NotFound,
        Err(XaError::HeuristicRollback) => {
            forget(resource, xid);
            BranchOutcome::RolledBack
        }
        Err(e) => match heuristic_kind(&e) {
            Some(kind) => {
                forget(resource, xid);
                BranchOutcome::Heuristic(kind)
            }
            None => BranchOutcome::Failure(e),
        },
    }
}

fn heuristic_kind(error: &XaError) -> Option<HeuristicKind> {
    match error {
        XaError::HeuristicCommit => Some(HeuristicKind::Commit),
        XaError::HeuristicRollback => Some(HeuristicKind::Rollback),
        XaError::HeuristicMixed => Some(HeuristicKind::Mixed),
        XaError::HeuristicHazard => Some(HeuristicKind::Hazard),
        _ => None,
    }
}

fn forget(resource: &dyn XaResource, xid: &Xid) {
    if let Err(e) = resource.forget(xid) {
        tracing::warn!(%xid, error = %e, "cannot forget heuristically completed branch");
    }
}

/// Combines the heuristic outcomes of a completion.
///
/// `committing` is the coordinator's decision and `any_as_decided` whether at
/// least one branch group completed the way it was told to. Heuristics
/// agreeing with the decision are ignored.
pub(crate) fn combine_heuristics(
    kinds: &[HeuristicKind],
    committing: bool,
    any_as_decided: bool,
) -> Option<HeuristicKind> {
    let (agreeing, opposite) = if committing {
        (HeuristicKind::Commit, HeuristicKind::Rollback)
    } else {
        (HeuristicKind::Rollback, HeuristicKind::Commit)
    };
    let any_as_decided = any_as_decided || kinds.contains(&agreeing);
    let kinds: Vec<_> = kinds.iter().copied().filter(|k| *k != agreeing).collect();
    if kinds.is_empty() {
        return None;
    }

    Some(if kinds.contains(&HeuristicKind::Mixed) {
        HeuristicKind::Mixed
    } else if kinds.iter().all(|k| *k == opposite) && !any_as_decided {
        opposite
    } else if kinds.contains(&opposite) {
        HeuristicKind::Mixed
    } else {
        HeuristicKind::Hazard
    })
}
