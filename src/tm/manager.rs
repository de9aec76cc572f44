// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction manager: demarcation and the two-phase commit driver.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Configuration;
use crate::journal::{validate_unique_name, Journal, JournalError, TxStatus};
use crate::resource::{EndFlag, HolderState, StartFlag, XaError, XaResource};
use crate::uid::{Uid, UidGenerator};

use super::error::{Phase, RollbackReason, TmError};
use super::transaction::{Branch, BranchGroup, BranchState, Transaction, TransactionState};
use super::twopc::{
    combine_heuristics, commit_branch, prepare_branch, rollback_branch, BranchOutcome,
    PrepareOutcome,
};
use super::{HeuristicKind, InFlightRegistry, TxContext};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Coordinates global transactions over XA resources.
///
/// Transactions are bound to a caller-owned [`TxContext`]. Durable decisions
/// go to the [`Journal`]: a COMMITTING record is forced before any branch is
/// asked to commit, so recovery can finish the job after a crash.
pub struct TransactionManager {
    journal: Arc<dyn Journal>,
    uids: Arc<UidGenerator>,
    in_flight: Arc<InFlightRegistry>,
    default_timeout: Duration,
    graceful_shutdown_interval: Duration,
    warn_about_zero_resource_transaction: bool,
    shutting_down: AtomicBool,
}

impl TransactionManager {
    /// Creates a manager writing to `journal`, which must already be open.
    pub fn new(
        config: &Configuration,
        journal: Arc<dyn Journal>,
        uids: Arc<UidGenerator>,
        in_flight: Arc<InFlightRegistry>,
    ) -> Self {
        Self {
            journal,
            uids,
            in_flight,
            default_timeout: config.default_transaction_timeout,
            graceful_shutdown_interval: config.graceful_shutdown_interval,
            warn_about_zero_resource_transaction: config.warn_about_zero_resource_transaction,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Starts a transaction and binds it to `ctx`.
    pub fn begin(&self, ctx: &mut TxContext) -> Result<Arc<Transaction>, TmError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(TmError::ShuttingDown);
        }
        if ctx.transaction().is_some() {
            return Err(TmError::NestedNotSupported);
        }
        if !self.journal.is_open() {
            return Err(JournalError::NotOpen {
                operation: "begin a transaction",
            }
            .into());
        }

        let timeout = ctx.timeout().unwrap_or(self.default_timeout);
        let transaction = Arc::new(Transaction::new(
            self.uids.generate_uid(),
            Instant::now() + timeout,
        ));
        // Registered before the GTRID can appear anywhere else.
        self.in_flight.insert(Arc::clone(&transaction));
        ctx.bind(Arc::clone(&transaction));

        tracing::debug!(gtrid = %transaction.gtrid(), ?timeout, "transaction begun");
        Ok(transaction)
    }

    /// Enlists a resource session in the transaction bound to `ctx`.
    ///
    /// A session whose resource manager id matches an already enlisted one
    /// joins that branch instead of starting a new one.
    pub fn enlist_resource(
        &self,
        ctx: &TxContext,
        unique_name: &str,
        resource: Arc<dyn XaResource>,
    ) -> Result<(), TmError> {
        let transaction = current(ctx)?;
        validate_unique_name(unique_name)?;

        let mut state = transaction.lock();
        if state.status != TxStatus::Active {
            return Err(invalid_state(&transaction, state.status, "enlist a resource in"));
        }

        if let Some((xid, branch)) = state.find_branch(unique_name) {
            let flag = match branch.state {
                BranchState::Started => return Ok(()),
                BranchState::Suspended => StartFlag::Resume,
                BranchState::Ended => StartFlag::Join,
            };
            branch
                .resource
                .start(&xid, flag)
                .map_err(|e| resource_error(unique_name, e))?;
            branch.state = BranchState::Started;
            branch.set_holder(HolderState::Accessible);
            return Ok(());
        }

        let branch = Branch::started(unique_name, Arc::clone(&resource));
        let rm_id = resource.resource_manager_id().map(str::to_string);
        let joined = match rm_id.as_deref() {
            Some(id) => state
                .groups
                .iter_mut()
                .find(|group| group.rm_id.as_deref() == Some(id)),
            None => None,
        };

        match joined {
            Some(group) => {
                resource
                    .start(&group.xid, StartFlag::Join)
                    .map_err(|e| resource_error(unique_name, e))?;
                tracing::debug!(
                    gtrid = %transaction.gtrid(),
                    resource = unique_name,
                    joined = %group.leader().unique_name,
                    "joined branch of the same resource manager"
                );
                group.branches.push(branch);
            }
            None => {
                let xid = self.uids.generate_xid(transaction.gtrid());
                resource
                    .start(&xid, StartFlag::NoFlags)
                    .map_err(|e| resource_error(unique_name, e))?;
                tracing::debug!(gtrid = %transaction.gtrid(), resource = unique_name, %xid, "enlisted resource");
                state.groups.push(BranchGroup {
                    xid,
                    rm_id,
                    branches: vec![branch],
                });
            }
        }
        Ok(())
    }

    /// Ends the association of a resource with its branch.
    ///
    /// `EndFlag::Fail`, or a failure to end, marks the transaction rollback
    /// only.
    pub fn delist_resource(
        &self,
        ctx: &TxContext,
        unique_name: &str,
        flag: EndFlag,
    ) -> Result<(), TmError> {
        let transaction = current(ctx)?;
        let mut state = transaction.lock();

        let result = {
            let (xid, branch) = state.find_branch(unique_name).ok_or_else(|| {
                resource_error(unique_name, XaError::Protocol("resource is not enlisted".into()))
            })?;
            if branch.state != BranchState::Started {
                return Ok(());
            }
            let result = branch.resource.end(&xid, flag);
            branch.state = match flag {
                EndFlag::Suspend => BranchState::Suspended,
                EndFlag::Success | EndFlag::Fail => BranchState::Ended,
            };
            branch.set_holder(HolderState::NotAccessible);
            result
        };

        if (flag == EndFlag::Fail || result.is_err()) && state.status == TxStatus::Active {
            state.status = TxStatus::MarkedRollback;
        }
        result.map_err(|e| resource_error(unique_name, e))
    }

    /// Commits the transaction bound to `ctx`.
    ///
    /// The context is unbound once the transaction completed, whatever the
    /// outcome. A transaction marked rollback only, timed out, or vetoed by
    /// a resource is rolled back and reported as [`TmError::Rollback`].
    pub fn commit(&self, ctx: &mut TxContext) -> Result<(), TmError> {
        let transaction = current(ctx)?;
        let status = transaction.status();
        if !matches!(status, TxStatus::Active | TxStatus::MarkedRollback) {
            return Err(invalid_state(&transaction, status, "commit"));
        }

        // Synchronizations may inspect the transaction, so they run unlocked.
        let before_completion = if status == TxStatus::Active {
            run_before_completion(&transaction)
        } else {
            Ok(())
        };

        let mut state = transaction.lock();
        if !matches!(state.status, TxStatus::Active | TxStatus::MarkedRollback) {
            return Err(invalid_state(&transaction, state.status, "commit"));
        }
        let result = self.commit_locked(transaction.gtrid(), &mut state, before_completion);
        let status = state.status;
        drop(state);

        self.complete(&transaction, status);
        ctx.unbind_if(&transaction);
        result
    }

    /// Rolls back the transaction bound to `ctx` and unbinds it.
    pub fn rollback(&self, ctx: &mut TxContext) -> Result<(), TmError> {
        let transaction = current(ctx)?;
        let mut state = transaction.lock();
        if !matches!(state.status, TxStatus::Active | TxStatus::MarkedRollback) {
            return Err(invalid_state(&transaction, state.status, "roll back"));
        }

        if let Err((resource, e)) = end_branches(&mut state, EndFlag::Success) {
            tracing::warn!(gtrid = %transaction.gtrid(), resource, error = %e, "cannot end branch before rollback");
        }
        let targets = all_groups(&state);
        let result = self.rollback_groups(transaction.gtrid(), &mut state, &targets);
        let status = state.status;
        drop(state);

        self.complete(&transaction, status);
        ctx.unbind_if(&transaction);
        result
    }

    /// Status of the transaction bound to `ctx`.
    pub fn get_status(&self, ctx: &TxContext) -> TxStatus {
        ctx.transaction()
            .map_or(TxStatus::NoTransaction, |transaction| transaction.status())
    }

    /// Marks the transaction bound to `ctx` so that it can only roll back.
    pub fn set_rollback_only(&self, ctx: &TxContext) -> Result<(), TmError> {
        let transaction = current(ctx)?;
        let mut state = transaction.lock();
        match state.status {
            TxStatus::Active | TxStatus::MarkedRollback => {
                state.status = TxStatus::MarkedRollback;
                Ok(())
            }
            status => Err(invalid_state(&transaction, status, "mark rollback only")),
        }
    }

    /// Sets the timeout, in seconds, of transactions begun on `ctx`.
    ///
    /// Zero restores the default.
    pub fn set_transaction_timeout(&self, ctx: &mut TxContext, seconds: i64) -> Result<(), TmError> {
        if seconds < 0 {
            return Err(TmError::InvalidTimeout(seconds));
        }
        ctx.set_timeout((seconds > 0).then(|| Duration::from_secs(seconds.unsigned_abs())));
        Ok(())
    }

    /// Detaches the transaction from `ctx`, suspending its branches.
    pub fn suspend(&self, ctx: &mut TxContext) -> Result<Arc<Transaction>, TmError> {
        let transaction = current(ctx)?;
        {
            let mut state = transaction.lock();
            let mut failure = None;
            for group in state.groups.iter_mut() {
                for branch in group.branches.iter_mut() {
                    if branch.state != BranchState::Started {
                        continue;
                    }
                    if let Err(e) = branch.resource.end(&group.xid, EndFlag::Suspend) {
                        failure.get_or_insert_with(|| resource_error(&branch.unique_name, e));
                        continue;
                    }
                    branch.state = BranchState::Suspended;
                    branch.set_holder(HolderState::NotAccessible);
                }
            }
            if let Some(e) = failure {
                if state.status == TxStatus::Active {
                    state.status = TxStatus::MarkedRollback;
                }
                return Err(e);
            }
        }

        ctx.unbind();
        tracing::debug!(gtrid = %transaction.gtrid(), "transaction suspended");
        Ok(transaction)
    }

    /// Binds a suspended transaction to `ctx` and resumes its branches.
    pub fn resume(&self, ctx: &mut TxContext, transaction: Arc<Transaction>) -> Result<(), TmError> {
        if let Some(current) = ctx.transaction() {
            if current.gtrid() == transaction.gtrid() {
                return Ok(());
            }
            return Err(TmError::AlreadyBound);
        }

        {
            let mut state = transaction.lock();
            if !matches!(state.status, TxStatus::Active | TxStatus::MarkedRollback) {
                return Err(invalid_state(&transaction, state.status, "resume"));
            }
            for group in state.groups.iter_mut() {
                for branch in group.branches.iter_mut() {
                    if branch.state != BranchState::Suspended {
                        continue;
                    }
                    branch
                        .resource
                        .start(&group.xid, StartFlag::Resume)
                        .map_err(|e| resource_error(&branch.unique_name, e))?;
                    branch.state = BranchState::Started;
                    branch.set_holder(HolderState::Accessible);
                }
            }
        }

        tracing::debug!(gtrid = %transaction.gtrid(), "transaction resumed");
        ctx.bind(transaction);
        Ok(())
    }

    /// Rolls back every ACTIVE transaction past its deadline.
    ///
    /// Transactions busy in another coordinator call are skipped until the
    /// next sweep. Their owners see [`RollbackReason::TimedOut`] on commit.
    pub fn sweep_timeouts(&self) -> usize {
        let now = Instant::now();
        let mut timed_out = 0;

        for transaction in self.in_flight.snapshot() {
            let Some(mut state) = transaction.try_lock() else {
                continue;
            };
            if state.status != TxStatus::Active || now < state.deadline {
                continue;
            }

            tracing::warn!(gtrid = %transaction.gtrid(), "transaction timed out, rolling back");
            state.timed_out = true;
            if let Err((resource, e)) = end_branches(&mut state, EndFlag::Fail) {
                tracing::warn!(gtrid = %transaction.gtrid(), resource, error = %e, "cannot end branch of timed out transaction");
            }
            let groups = all_groups(&state);
            if let Err(e) = self.rollback_groups(transaction.gtrid(), &mut state, &groups) {
                tracing::error!(gtrid = %transaction.gtrid(), error = %e, "cannot roll back timed out transaction");
            }
            state.release_holders();
            state.groups.clear();
            state.status = TxStatus::MarkedRollback;
            timed_out += 1;
        }
        timed_out
    }

    /// Rejects new transactions, then waits up to the graceful shutdown
    /// interval for in-flight ones to complete.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let deadline = Instant::now() + self.graceful_shutdown_interval;
        tracing::info!(in_flight = self.in_flight.len(), "shutting down transaction manager");
        while !self.in_flight.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_POLL_INTERVAL.min(deadline - now));
        }

        let remaining = self.in_flight.snapshot();
        if remaining.is_empty() {
            tracing::info!("transaction manager shut down");
            return;
        }
        tracing::warn!(
            remaining = remaining.len(),
            "still in-flight transactions after the graceful shutdown interval"
        );
        for transaction in remaining {
            tracing::warn!(gtrid = %transaction.gtrid(), status = %transaction.status(), "in-flight transaction");
        }
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    #[inline]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Timestamp of the oldest in-flight GTRID.
    #[inline]
    pub fn oldest_in_flight_timestamp(&self) -> Option<i64> {
        self.in_flight.oldest_timestamp()
    }

    #[inline]
    pub fn in_flight(&self) -> &Arc<InFlightRegistry> {
        &self.in_flight
    }

    fn commit_locked(
        &self,
        gtrid: &Uid,
        state: &mut TransactionState,
        before_completion: Result<(), String>,
    ) -> Result<(), TmError> {
        if state.status == TxStatus::Active && Instant::now() >= state.deadline {
            tracing::warn!(%gtrid, "transaction timed out before commit");
            state.timed_out = true;
            state.status = TxStatus::MarkedRollback;
        }

        let abort_reason = if state.status == TxStatus::MarkedRollback {
            Some(if state.timed_out {
                RollbackReason::TimedOut
            } else {
                RollbackReason::RollbackOnly
            })
        } else {
            before_completion.err().map(RollbackReason::BeforeCompletion)
        };
        if let Some(reason) = abort_reason {
            if let Err((resource, e)) = end_branches(state, EndFlag::Fail) {
                tracing::warn!(%gtrid, resource, error = %e, "cannot end branch before rollback");
            }
            let targets = all_groups(state);
            self.rollback_groups(gtrid, state, &targets)?;
            return Err(TmError::Rollback {
                gtrid: gtrid.clone(),
                reason,
            });
        }

        if let Err((resource, cause)) = end_branches(state, EndFlag::Success) {
            let targets = all_groups(state);
            self.rollback_groups(gtrid, state, &targets)?;
            return Err(TmError::Rollback {
                gtrid: gtrid.clone(),
                reason: RollbackReason::DelistFailed { resource, cause },
            });
        }

        if !self.journal.is_open() {
            self.abort_after_journal_failure(gtrid, state);
            return Err(JournalError::NotOpen {
                operation: "commit a transaction",
            }
            .into());
        }

        match state.groups.len() {
            0 => {
                if self.warn_about_zero_resource_transaction {
                    tracing::warn!(%gtrid, "committing a transaction without any enlisted resource");
                }
                state.status = TxStatus::Committed;
                Ok(())
            }
            1 => self.commit_one_phase(gtrid, state),
            _ => self.commit_two_phase(gtrid, state),
        }
    }

    fn commit_one_phase(&self, gtrid: &Uid, state: &mut TransactionState) -> Result<(), TmError> {
        let names = state.unique_names();
        state.status = TxStatus::Committing;
        // No branch is prepared, so nothing can be in doubt: no force needed.
        if let Err(e) = self.journal.log(TxStatus::Committing, gtrid, &names) {
            self.abort_after_journal_failure(gtrid, state);
            return Err(e.into());
        }

        let group = &state.groups[0];
        let leader = group.leader().unique_name.clone();
        let outcome = commit_branch(group.leader().resource.as_ref(), &group.xid, true);
        tracing::debug!(%gtrid, resource = %leader, ?outcome, "one-phase commit");

        match outcome {
            BranchOutcome::Committed | BranchOutcome::NotFound => {
                state.status = TxStatus::Committed;
                self.journal.log(TxStatus::Committed, gtrid, &names)?;
                Ok(())
            }
            BranchOutcome::RolledBack => {
                state.status = TxStatus::RolledBack;
                self.journal.log(TxStatus::RolledBack, gtrid, &names)?;
                Err(TmError::Rollback {
                    gtrid: gtrid.clone(),
                    reason: RollbackReason::OnePhase { resource: leader },
                })
            }
            BranchOutcome::Heuristic(kind) => {
                state.status = TxStatus::Unknown;
                self.journal.log(TxStatus::Unknown, gtrid, &names)?;
                Err(TmError::Heuristic {
                    gtrid: gtrid.clone(),
                    kind,
                    resources: names.into_iter().collect(),
                })
            }
            BranchOutcome::Failure(e) => {
                tracing::error!(%gtrid, resource = %leader, error = %e, "one-phase commit failed");
                state.status = TxStatus::Unknown;
                Err(TmError::PhaseFailed {
                    gtrid: gtrid.clone(),
                    phase: Phase::Commit,
                    resources: vec![leader],
                })
            }
        }
    }

    fn commit_two_phase(&self, gtrid: &Uid, state: &mut TransactionState) -> Result<(), TmError> {
        state.status = TxStatus::Preparing;
        if let Err(e) = self.journal.log(TxStatus::Preparing, gtrid, &state.unique_names()) {
            self.abort_after_journal_failure(gtrid, state);
            return Err(e.into());
        }

        let mut prepared = Vec::new();
        let mut read_only = Vec::new();
        let mut veto = None;
        for (ndx, group) in state.groups.iter().enumerate() {
            let leader = group.leader();
            match prepare_branch(leader.resource.as_ref(), &group.xid) {
                PrepareOutcome::Prepared => prepared.push(ndx),
                PrepareOutcome::ReadOnly => {
                    tracing::debug!(%gtrid, resource = %leader.unique_name, "resource voted read-only");
                    read_only.push(ndx);
                }
                PrepareOutcome::VoteAbort(cause) | PrepareOutcome::Failure(cause) => {
                    tracing::warn!(%gtrid, resource = %leader.unique_name, error = %cause, "resource refused to prepare");
                    veto = Some((leader.unique_name.clone(), cause));
                    break;
                }
            }
        }

        if let Some((resource, cause)) = veto {
            let targets: Vec<usize> = all_groups(state)
                .into_iter()
                .filter(|ndx| !read_only.contains(ndx))
                .collect();
            self.rollback_groups(gtrid, state, &targets)?;
            return Err(TmError::Rollback {
                gtrid: gtrid.clone(),
                reason: RollbackReason::PrepareVeto { resource, cause },
            });
        }

        if prepared.is_empty() {
            tracing::debug!(%gtrid, "all resources voted read-only");
            state.status = TxStatus::Committed;
            return Ok(());
        }

        let names = group_names(state, &prepared);
        state.status = TxStatus::Prepared;
        let logged = self
            .journal
            .log(TxStatus::Prepared, gtrid, &names)
            .and_then(|()| self.journal.log(TxStatus::Committing, gtrid, &names))
            .and_then(|()| self.journal.force());
        if let Err(e) = logged {
            tracing::error!(%gtrid, error = %e, "cannot journal commit decision, rolling back");
            if let Err(e) = self.rollback_groups(gtrid, state, &prepared) {
                tracing::error!(%gtrid, error = %e, "rollback after journal failure incomplete");
            }
            return Err(e.into());
        }
        state.status = TxStatus::Committing;

        let mut committed = BTreeSet::new();
        let mut heuristic = BTreeSet::new();
        let mut kinds = Vec::new();
        let mut failed = Vec::new();
        for &ndx in &prepared {
            let group = &state.groups[ndx];
            let leader = group.leader();
            match commit_branch(leader.resource.as_ref(), &group.xid, false) {
                BranchOutcome::Committed | BranchOutcome::NotFound => {
                    committed.extend(group.names().map(str::to_string));
                }
                BranchOutcome::RolledBack => {
                    kinds.push(HeuristicKind::Rollback);
                    heuristic.extend(group.names().map(str::to_string));
                }
                BranchOutcome::Heuristic(kind) => {
                    tracing::error!(%gtrid, resource = %leader.unique_name, %kind, "heuristic outcome during commit");
                    kinds.push(kind);
                    heuristic.extend(group.names().map(str::to_string));
                }
                BranchOutcome::Failure(e) => {
                    tracing::error!(%gtrid, resource = %leader.unique_name, error = %e, "commit failed, leaving branch to recovery");
                    failed.extend(group.names().map(str::to_string));
                }
            }
        }

        match combine_heuristics(&kinds, true, !committed.is_empty()) {
            None if failed.is_empty() => {
                state.status = TxStatus::Committed;
                self.journal.log(TxStatus::Committed, gtrid, &names)?;
                Ok(())
            }
            None => {
                state.status = TxStatus::Unknown;
                if !committed.is_empty() {
                    self.journal.log(TxStatus::Committed, gtrid, &committed)?;
                }
                Err(TmError::PhaseFailed {
                    gtrid: gtrid.clone(),
                    phase: Phase::Commit,
                    resources: failed,
                })
            }
            Some(kind) => {
                state.status = TxStatus::Unknown;
                let terminal: BTreeSet<String> = committed.union(&heuristic).cloned().collect();
                self.journal.log(TxStatus::Unknown, gtrid, &terminal)?;
                Err(TmError::Heuristic {
                    gtrid: gtrid.clone(),
                    kind,
                    resources: heuristic.into_iter().collect(),
                })
            }
        }
    }

    /// Rolls back the branch groups at `targets` and journals the outcome.
    fn rollback_groups(
        &self,
        gtrid: &Uid,
        state: &mut TransactionState,
        targets: &[usize],
    ) -> Result<(), TmError> {
        state.status = TxStatus::RollingBack;

        let mut rolled_back = BTreeSet::new();
        let mut heuristic = BTreeSet::new();
        let mut kinds = Vec::new();
        let mut failed = Vec::new();
        for &ndx in targets {
            let group = &state.groups[ndx];
            let leader = group.leader();
            match rollback_branch(leader.resource.as_ref(), &group.xid) {
                BranchOutcome::RolledBack | BranchOutcome::NotFound => {
                    rolled_back.extend(group.names().map(str::to_string));
                }
                BranchOutcome::Committed => {
                    kinds.push(HeuristicKind::Commit);
                    heuristic.extend(group.names().map(str::to_string));
                }
                BranchOutcome::Heuristic(kind) => {
                    tracing::error!(%gtrid, resource = %leader.unique_name, %kind, "heuristic outcome during rollback");
                    kinds.push(kind);
                    heuristic.extend(group.names().map(str::to_string));
                }
                BranchOutcome::Failure(e) => {
                    tracing::warn!(%gtrid, resource = %leader.unique_name, error = %e, "rollback failed, leaving branch to recovery");
                    failed.extend(group.names().map(str::to_string));
                }
            }
        }

        if !rolled_back.is_empty() {
            self.journal.log(TxStatus::RolledBack, gtrid, &rolled_back)?;
        }
        if let Some(kind) = combine_heuristics(&kinds, false, !rolled_back.is_empty()) {
            state.status = TxStatus::Unknown;
            self.journal.log(TxStatus::Unknown, gtrid, &heuristic)?;
            return Err(TmError::Heuristic {
                gtrid: gtrid.clone(),
                kind,
                resources: heuristic.into_iter().collect(),
            });
        }

        state.status = TxStatus::RolledBack;
        if failed.is_empty() {
            Ok(())
        } else {
            Err(TmError::PhaseFailed {
                gtrid: gtrid.clone(),
                phase: Phase::Rollback,
                resources: failed,
            })
        }
    }

    fn abort_after_journal_failure(&self, gtrid: &Uid, state: &mut TransactionState) {
        tracing::error!(%gtrid, "cannot write to the journal, rolling back");
        let targets = all_groups(state);
        if let Err(e) = self.rollback_groups(gtrid, state, &targets) {
            tracing::error!(%gtrid, error = %e, "rollback after journal failure incomplete");
        }
    }

    /// Runs the after-completion callbacks and forgets the transaction.
    fn complete(&self, transaction: &Transaction, status: TxStatus) {
        transaction.lock().release_holders();
        for synchronization in transaction.synchronizations() {
            synchronization.after_completion(status);
        }
        self.in_flight.remove(transaction.gtrid());
        tracing::debug!(gtrid = %transaction.gtrid(), %status, "transaction completed");
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("in_flight", &self.in_flight.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

fn current(ctx: &TxContext) -> Result<Arc<Transaction>, TmError> {
    ctx.transaction().cloned().ok_or(TmError::NoTransaction)
}

fn invalid_state(transaction: &Transaction, status: TxStatus, operation: &'static str) -> TmError {
    TmError::InvalidState {
        gtrid: transaction.gtrid().clone(),
        status,
        operation,
    }
}

fn resource_error(unique_name: &str, source: XaError) -> TmError {
    TmError::Resource {
        resource: unique_name.to_string(),
        source,
    }
}

fn run_before_completion(transaction: &Transaction) -> Result<(), String> {
    for synchronization in transaction.synchronizations() {
        if let Err(e) = synchronization.before_completion() {
            tracing::warn!(gtrid = %transaction.gtrid(), error = %e, "synchronization failed before completion");
            return Err(e.to_string());
        }
    }
    Ok(())
}

/// Ends every started or suspended branch. Returns the first failure.
fn end_branches(state: &mut TransactionState, flag: EndFlag) -> Result<(), (String, XaError)> {
    let mut failure = None;
    for group in state.groups.iter_mut() {
        for branch in group.branches.iter_mut() {
            if branch.state == BranchState::Ended {
                continue;
            }
            if let Err(e) = branch.resource.end(&group.xid, flag) {
                failure.get_or_insert_with(|| (branch.unique_name.clone(), e));
            }
            branch.state = BranchState::Ended;
        }
    }
    failure.map_or(Ok(()), Err)
}

fn all_groups(state: &TransactionState) -> Vec<usize> {
    (0..state.groups.len()).collect()
}

fn group_names(state: &TransactionState, indices: &[usize]) -> BTreeSet<String> {
    indices
        .iter()
        .flat_map(|&ndx| state.groups[ndx].names())
        .map(str::to_string)
        .collect()
}
