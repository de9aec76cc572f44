// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Global transaction state.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, MutexGuard};

use crate::journal::TxStatus;
use crate::resource::{HolderState, HolderStateMachine, StateChange, XaResource};
use crate::uid::{Uid, Xid};

/// Error returned by [`Synchronization::before_completion`].
pub type SynchronizationError = Box<dyn std::error::Error + Send + Sync>;

/// Callbacks run around transaction completion.
pub trait Synchronization: Send + Sync {
    /// Called before commit starts. An error rolls the transaction back.
    fn before_completion(&self) -> Result<(), SynchronizationError> {
        Ok(())
    }

    /// Called once the transaction reached its final status.
    fn after_completion(&self, status: TxStatus);
}

/// Association of one enlisted resource with its branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BranchState {
    Started,
    Suspended,
    Ended,
}

pub(crate) struct Branch {
    pub(crate) unique_name: String,
    pub(crate) resource: Arc<dyn XaResource>,
    pub(crate) state: BranchState,
    holder: HolderStateMachine,
}

impl Branch {
    /// A freshly started branch whose session is in the caller's hands.
    pub(crate) fn started(unique_name: &str, resource: Arc<dyn XaResource>) -> Self {
        Self {
            unique_name: unique_name.to_string(),
            resource,
            state: BranchState::Started,
            holder: HolderStateMachine::with_state(HolderState::Accessible),
        }
    }

    /// Moves the session holder to `to` unless it is already there.
    pub(crate) fn set_holder(&self, to: HolderState) {
        if self.holder.state() == to {
            return;
        }
        if let Err(e) = self.holder.transition(to) {
            tracing::warn!(resource = %self.unique_name, error = %e, "cannot change session holder state");
        }
    }
}

/// Resources sharing one resource manager, and therefore one XA branch.
///
/// Only the first branch (the leader) is prepared and committed.
pub(crate) struct BranchGroup {
    pub(crate) xid: Xid,
    pub(crate) rm_id: Option<String>,
    pub(crate) branches: Vec<Branch>,
}

impl BranchGroup {
    #[inline]
    pub(crate) fn leader(&self) -> &Branch {
        &self.branches[0]
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|b| b.unique_name.as_str())
    }
}

pub(crate) struct TransactionState {
    pub(crate) status: TxStatus,
    pub(crate) groups: Vec<BranchGroup>,
    pub(crate) deadline: Instant,
    pub(crate) timed_out: bool,
}

impl TransactionState {
    /// Unique names of every enlisted resource.
    pub(crate) fn unique_names(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .flat_map(BranchGroup::names)
            .map(str::to_string)
            .collect()
    }

    fn branch(&self, unique_name: &str) -> Option<&Branch> {
        self.groups
            .iter()
            .flat_map(|group| group.branches.iter())
            .find(|b| b.unique_name == unique_name)
    }

    /// Hands every session back to its pool.
    pub(crate) fn release_holders(&self) {
        for branch in self.groups.iter().flat_map(|group| group.branches.iter()) {
            branch.set_holder(HolderState::InPool);
        }
    }

    pub(crate) fn find_branch(&mut self, unique_name: &str) -> Option<(Xid, &mut Branch)> {
        self.groups.iter_mut().find_map(|group| {
            let xid = group.xid.clone();
            group
                .branches
                .iter_mut()
                .find(|b| b.unique_name == unique_name)
                .map(|branch| (xid, branch))
        })
    }
}

/// A global transaction.
///
/// Shared between the owning context, the in-flight registry and the timeout
/// sweeper. Coordinator operations hold the state lock for their whole
/// duration, so at most one of them acts on a transaction at a time.
pub struct Transaction {
    gtrid: Uid,
    state: Mutex<TransactionState>,
    synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
}

impl Transaction {
    pub(crate) fn new(gtrid: Uid, deadline: Instant) -> Self {
        Self {
            gtrid,
            state: Mutex::new(TransactionState {
                status: TxStatus::Active,
                groups: Vec::new(),
                deadline,
                timed_out: false,
            }),
            synchronizations: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn gtrid(&self) -> &Uid {
        &self.gtrid
    }

    pub fn status(&self) -> TxStatus {
        self.state.lock().status
    }

    /// Whether the timeout sweeper rolled this transaction back.
    pub fn timed_out(&self) -> bool {
        self.state.lock().timed_out
    }

    /// Unique names of the enlisted resources.
    pub fn enlisted_resources(&self) -> BTreeSet<String> {
        self.state.lock().unique_names()
    }

    /// State of the session enlisted under `unique_name`.
    pub fn resource_state(&self, unique_name: &str) -> Option<HolderState> {
        self.state.lock().branch(unique_name).map(|b| b.holder.state())
    }

    /// Subscribes to the state changes of the session enlisted under
    /// `unique_name`. The session goes back to [`HolderState::InPool`] when
    /// the transaction completes.
    pub fn subscribe_resource(&self, unique_name: &str) -> Option<Receiver<StateChange>> {
        self.state.lock().branch(unique_name).map(|b| b.holder.subscribe())
    }

    /// Registers callbacks run around completion, in registration order.
    pub fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) {
        self.synchronizations.lock().push(synchronization);
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock()
    }

    #[inline]
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, TransactionState>> {
        self.state.try_lock()
    }

    pub(crate) fn synchronizations(&self) -> Vec<Arc<dyn Synchronization>> {
        self.synchronizations.lock().clone()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Transaction");
        s.field("gtrid", &self.gtrid);
        match self.state.try_lock() {
            Some(state) => s
                .field("status", &state.status)
                .field("resources", &state.unique_names()),
            None => s.field("status", &"<locked>"),
        };
        s.finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transaction {}", self.gtrid)
    }
}
