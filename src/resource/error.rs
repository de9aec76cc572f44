// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Resource error types.

/// Errors reported by an XA resource branch.
///
/// The heuristic variants mean the resource took a unilateral decision that
/// the coordinator must report and eventually `forget`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XaError {
    /// The resource rolled the branch back (or refuses to commit it).
    #[error("branch rolled back: {0}")]
    Rollback(String),

    #[error("branch heuristically committed")]
    HeuristicCommit,

    #[error("branch heuristically rolled back")]
    HeuristicRollback,

    #[error("branch heuristically committed in part and rolled back in part")]
    HeuristicMixed,

    #[error("branch outcome unknown, it may have been heuristically completed")]
    HeuristicHazard,

    /// The resource does not know the branch. During phase 2 and recovery this
    /// means the branch is already completed.
    #[error("no such branch")]
    NoSuchBranch,

    /// The resource manager is unavailable. The call may succeed if retried.
    #[error("resource manager unavailable: {0}")]
    ResourceFailure(String),

    #[error("resource manager error: {0}")]
    ResourceError(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl XaError {
    /// Returns true if retrying the call later may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, XaError::ResourceFailure(_))
    }

    /// Returns true for the heuristic completion variants.
    #[inline]
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            XaError::HeuristicCommit
                | XaError::HeuristicRollback
                | XaError::HeuristicMixed
                | XaError::HeuristicHazard
        )
    }
}

/// Errors that can occur while registering resources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrarError {
    #[error("a resource named {0:?} is already registered")]
    DuplicateName(String),

    #[error("invalid resource name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
}
