// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The boundary between the coordinator and the resources it drives.
//!
//! A resource manager (a database, a message broker) exposes one
//! [`XaResource`] per session. The coordinator only ever uses the XA verbs:
//!
//! ```text
//! start ─► end ─► prepare ─► commit      (two-phase)
//! start ─► end ─► commit(one_phase)      (single branch group)
//! start ─► end ─► rollback
//! recover ─► commit | rollback ─► forget (recovery)
//! ```
//!
//! A [`ResourceProducer`] represents a registered resource: it has a unique
//! name (the name stored in journal records), hands out sessions and switches
//! into recovery mode when asked to.

mod error;
mod registrar;
mod state;

pub use error::{RegistrarError, XaError};
pub use registrar::ResourceRegistrar;
pub use state::{HolderState, HolderStateMachine, IllegalTransition, StateChange};

use std::sync::Arc;

use crate::uid::Xid;

/// Result of `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// The branch is prepared and must be committed or rolled back.
    Ok,
    /// The branch did no work. It is already completed and takes no part in
    /// phase 2.
    ReadOnly,
}

/// Flags for [`XaResource::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFlag {
    NoFlags,
    /// Join a branch already started on the same resource manager.
    Join,
    /// Resume a suspended branch.
    Resume,
}

/// Flags for [`XaResource::end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFlag {
    Success,
    /// The work done in the branch must be rolled back.
    Fail,
    /// Dissociate the branch temporarily.
    Suspend,
}

/// An XA resource branch.
///
/// Implementations must be thread safe: the coordinator, the timeout sweeper
/// and the recoverer may call them from different threads.
pub trait XaResource: Send + Sync {
    /// Associates the session with a branch.
    fn start(&self, _xid: &Xid, _flag: StartFlag) -> Result<(), XaError> {
        Ok(())
    }

    /// Dissociates the session from a branch.
    fn end(&self, _xid: &Xid, _flag: EndFlag) -> Result<(), XaError> {
        Ok(())
    }

    /// Asks the resource to vote on the branch outcome.
    ///
    /// An `Err` is a vote to abort.
    fn prepare(&self, xid: &Xid) -> Result<Vote, XaError>;

    /// Commits the branch. With `one_phase` the branch was never prepared.
    fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError>;

    fn rollback(&self, xid: &Xid) -> Result<(), XaError>;

    /// Lists the prepared branches the resource still holds.
    fn recover(&self) -> Result<Vec<Xid>, XaError>;

    /// Discards a heuristically completed branch.
    fn forget(&self, xid: &Xid) -> Result<(), XaError>;

    /// Identity of the underlying resource manager.
    ///
    /// Resources returning the same id inside one transaction share a single
    /// branch: only the first one is prepared and committed, the others join
    /// it. `None` never matches anything.
    fn resource_manager_id(&self) -> Option<&str> {
        None
    }
}

/// A registered resource.
pub trait ResourceProducer: Send + Sync {
    /// Name recorded in journal records. Must be unique and ASCII.
    fn unique_name(&self) -> &str;

    /// Switches to recovery mode and returns the resource to scan.
    fn start_recovery(&self) -> Result<Arc<dyn XaResource>, XaError>;

    /// Leaves recovery mode. Always called after a successful
    /// `start_recovery`, even when recovery failed.
    fn end_recovery(&self) -> Result<(), XaError>;

    /// Marks the resource failed after a recovery error, or healthy again.
    fn set_failed(&self, failed: bool);

    fn is_failed(&self) -> bool;

    /// Opens a session to enlist in a transaction.
    fn create_session(&self) -> Result<Arc<dyn XaResource>, XaError>;
}
