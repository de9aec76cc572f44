// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! One recovery pass: resolve in-doubt branches against the journal.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::Configuration;
use crate::journal::{DanglingRecords, Journal, TxStatus};
use crate::resource::{ResourceProducer, XaResource};
use crate::time::Clock;
use crate::tm::{commit_branch, rollback_branch, BranchOutcome, InFlightRegistry};
use crate::uid::{Uid, Xid};

use super::RecoveryError;

/// Summary of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// In-doubt branches committed because the journal holds a COMMITTING
    /// record naming their resource.
    pub committed: usize,
    /// In-doubt branches rolled back by presumed abort.
    pub rolled_back: usize,
    /// In-doubt branches left alone: foreign, from another node, or possibly
    /// still in flight.
    pub skipped: usize,
    /// Resources whose recovery failed during the pass.
    pub failed_resources: Vec<String>,
    /// Resources named in dangling records but not registered.
    pub missing_resources: BTreeSet<String>,
}

/// Dependencies shared by full and incremental recovery.
pub(crate) struct RecoveryContext {
    journal: Arc<dyn Journal>,
    in_flight: Arc<InFlightRegistry>,
    clock: Arc<dyn Clock>,
    server_id: Vec<u8>,
    current_node_only: bool,
}

/// State accumulated while resources are recovered.
pub(crate) struct Pass {
    horizon: i64,
    dangling: DanglingRecords,
    report: RecoveryReport,
    committed: BTreeMap<Uid, BTreeSet<String>>,
    unknown: BTreeMap<Uid, BTreeSet<String>>,
}

impl Pass {
    pub(crate) fn fail(&mut self, unique_name: &str) {
        self.report.failed_resources.push(unique_name.to_string());
    }

    pub(crate) fn dangling(&self) -> &DanglingRecords {
        &self.dangling
    }

    pub(crate) fn report_mut(&mut self) -> &mut RecoveryReport {
        &mut self.report
    }
}

impl RecoveryContext {
    pub(crate) fn new(
        config: &Configuration,
        journal: Arc<dyn Journal>,
        in_flight: Arc<InFlightRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            journal,
            in_flight,
            clock,
            server_id: config.server_id_bytes(),
            current_node_only: config.current_node_only_recovery,
        }
    }

    /// Starts a pass.
    ///
    /// The horizon is taken before the journal is read, so a transaction
    /// begun afterwards is never mistaken for an abandoned one.
    pub(crate) fn begin(&self) -> Result<Pass, RecoveryError> {
        let horizon = self
            .in_flight
            .oldest_timestamp()
            .unwrap_or_else(|| self.clock.now_millis());
        let dangling = self.journal.collect_dangling_records()?;
        tracing::debug!(horizon, dangling = dangling.len(), "recovery pass started");

        Ok(Pass {
            horizon,
            dangling,
            report: RecoveryReport::default(),
            committed: BTreeMap::new(),
            unknown: BTreeMap::new(),
        })
    }

    /// Recovers the in-doubt branches of one resource.
    ///
    /// `end_recovery` is called whenever `start_recovery` succeeded.
    pub(crate) fn recover_producer(
        &self,
        pass: &mut Pass,
        producer: &dyn ResourceProducer,
    ) -> Result<(), RecoveryError> {
        let name = producer.unique_name();
        let resource = producer
            .start_recovery()
            .map_err(|e| RecoveryError::resource(name, e))?;

        let result = self.recover_branches(pass, name, resource.as_ref());
        if let Err(e) = producer.end_recovery() {
            tracing::warn!(resource = name, error = %e, "cannot end recovery");
        }
        result
    }

    fn recover_branches(
        &self,
        pass: &mut Pass,
        name: &str,
        resource: &dyn XaResource,
    ) -> Result<(), RecoveryError> {
        let xids = resource
            .recover()
            .map_err(|e| RecoveryError::resource(name, e))?;
        tracing::debug!(resource = name, in_doubt = xids.len(), "resource reported in-doubt branches");

        let mut in_doubt = BTreeSet::new();
        for xid in xids {
            if !self.is_recoverable(&xid, pass.horizon) {
                pass.report.skipped += 1;
                continue;
            }
            let gtrid = xid.gtrid().clone();
            in_doubt.insert(gtrid.clone());

            let committing = pass
                .dangling
                .get(&gtrid)
                .is_some_and(|record| record.unique_names().contains(name));
            if committing {
                self.commit(pass, name, resource, &xid)?;
            } else {
                self.rollback(pass, name, resource, &xid)?;
            }
        }

        // A dangling name without an in-doubt branch was committed before the
        // terminal record could be written.
        for gtrid in pass.dangling.keys() {
            let named = pass.dangling[gtrid].unique_names().contains(name);
            if named && !in_doubt.contains(gtrid) && self.is_recoverable_gtrid(gtrid, pass.horizon) {
                pass.committed
                    .entry(gtrid.clone())
                    .or_default()
                    .insert(name.to_string());
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        pass: &mut Pass,
        name: &str,
        resource: &dyn XaResource,
        xid: &Xid,
    ) -> Result<(), RecoveryError> {
        let gtrid = xid.gtrid().clone();
        match commit_branch(resource, xid, false) {
            BranchOutcome::Committed | BranchOutcome::NotFound => {
                tracing::info!(resource = name, %xid, "committed in-doubt branch");
                pass.report.committed += 1;
                pass.committed.entry(gtrid).or_default().insert(name.to_string());
            }
            BranchOutcome::RolledBack => {
                tracing::error!(resource = name, %xid, "in-doubt branch heuristically rolled back during recovery commit");
                pass.unknown.entry(gtrid).or_default().insert(name.to_string());
            }
            BranchOutcome::Heuristic(kind) => {
                tracing::error!(resource = name, %xid, %kind, "heuristic outcome during recovery commit");
                pass.unknown.entry(gtrid).or_default().insert(name.to_string());
            }
            BranchOutcome::Failure(e) => return Err(RecoveryError::resource(name, e)),
        }
        Ok(())
    }

    fn rollback(
        &self,
        pass: &mut Pass,
        name: &str,
        resource: &dyn XaResource,
        xid: &Xid,
    ) -> Result<(), RecoveryError> {
        match rollback_branch(resource, xid) {
            BranchOutcome::RolledBack | BranchOutcome::NotFound => {
                tracing::info!(resource = name, %xid, "rolled back in-doubt branch (presumed abort)");
                pass.report.rolled_back += 1;
            }
            BranchOutcome::Committed => {
                tracing::error!(resource = name, %xid, "in-doubt branch heuristically committed during recovery rollback");
            }
            BranchOutcome::Heuristic(kind) => {
                tracing::error!(resource = name, %xid, %kind, "heuristic outcome during recovery rollback");
            }
            BranchOutcome::Failure(e) => return Err(RecoveryError::resource(name, e)),
        }
        Ok(())
    }

    /// Journals the names resolved during the pass and returns its report.
    pub(crate) fn finish(&self, pass: Pass) -> Result<RecoveryReport, RecoveryError> {
        let Pass {
            committed,
            unknown,
            report,
            ..
        } = pass;

        for (gtrid, names) in &committed {
            self.journal.log(TxStatus::Committed, gtrid, names)?;
        }
        for (gtrid, names) in &unknown {
            self.journal.log(TxStatus::Unknown, gtrid, names)?;
        }
        if !committed.is_empty() || !unknown.is_empty() {
            self.journal.force()?;
        }
        Ok(report)
    }

    fn is_recoverable(&self, xid: &Xid, horizon: i64) -> bool {
        if !xid.is_ours() {
            tracing::debug!(%xid, "skipping branch with foreign format id");
            return false;
        }
        self.is_recoverable_gtrid(xid.gtrid(), horizon)
    }

    fn is_recoverable_gtrid(&self, gtrid: &Uid, horizon: i64) -> bool {
        if self.current_node_only && gtrid.extract_server_id() != self.server_id.as_slice() {
            tracing::debug!(%gtrid, "skipping branch of another node");
            return false;
        }
        if gtrid.extract_timestamp() >= horizon || self.in_flight.contains(gtrid) {
            tracing::debug!(%gtrid, "skipping branch of a possibly in-flight transaction");
            return false;
        }
        true
    }
}

impl std::fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("server_id", &String::from_utf8_lossy(&self.server_id))
            .field("current_node_only", &self.current_node_only)
            .finish()
    }
}
