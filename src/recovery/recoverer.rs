// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Full recovery over every registered resource.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Configuration;
use crate::journal::Journal;
use crate::resource::ResourceRegistrar;
use crate::time::Clock;
use crate::tm::InFlightRegistry;

use super::pass::RecoveryContext;
use super::{IncrementalRecoverer, RecoveryError, RecoveryReport};

/// Resolves the in-doubt branches of every registered resource.
///
/// Branches whose GTRID has a dangling COMMITTING record naming their
/// resource are committed; every other in-doubt branch older than the oldest
/// in-flight transaction is rolled back (presumed abort).
///
/// Concurrent calls to [`run`](Recoverer::run) collapse into one: a caller
/// finding a pass in progress gets [`RecoveryError::AlreadyRunning`].
pub struct Recoverer {
    context: Arc<RecoveryContext>,
    registrar: Arc<ResourceRegistrar>,
    running: AtomicBool,
    pass_lock: Arc<Mutex<()>>,
    executions: AtomicU64,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Recoverer {
    pub fn new(
        config: &Configuration,
        journal: Arc<dyn Journal>,
        registrar: Arc<ResourceRegistrar>,
        in_flight: Arc<InFlightRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            context: Arc::new(RecoveryContext::new(config, journal, in_flight, clock)),
            registrar,
            running: AtomicBool::new(false),
            pass_lock: Arc::new(Mutex::new(())),
            executions: AtomicU64::new(0),
            committed: AtomicUsize::new(0),
            rolled_back: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Runs one recovery pass over every registered resource.
    ///
    /// A failing resource is marked failed and reported; the other resources
    /// are still recovered. Journal failures abort the pass.
    pub fn run(&self) -> Result<RecoveryReport, RecoveryError> {
        let _running = RunningGuard::acquire(&self.running).ok_or(RecoveryError::AlreadyRunning)?;
        let _pass = self.pass_lock.lock();
        self.executions.fetch_add(1, Ordering::Relaxed);

        let result = self.run_pass();
        match &result {
            Ok(report) => {
                self.committed.store(report.committed, Ordering::Relaxed);
                self.rolled_back.store(report.rolled_back, Ordering::Relaxed);
                tracing::info!(
                    committed = report.committed,
                    rolled_back = report.rolled_back,
                    skipped = report.skipped,
                    failed = report.failed_resources.len(),
                    missing = report.missing_resources.len(),
                    "recovery pass completed"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "recovery pass failed");
                *self.last_error.lock() = Some(e.to_string());
            }
        }
        result
    }

    fn run_pass(&self) -> Result<RecoveryReport, RecoveryError> {
        let mut pass = self.context.begin()?;
        let mut last_error = None;

        for producer in self.registrar.resources() {
            let name = producer.unique_name();
            match self.context.recover_producer(&mut pass, producer.as_ref()) {
                Ok(()) => {
                    if producer.is_failed() {
                        tracing::info!(resource = name, "resource recovered, no longer failed");
                        producer.set_failed(false);
                    }
                }
                Err(e) => {
                    tracing::warn!(resource = name, error = %e, "resource recovery failed, marking resource failed");
                    producer.set_failed(true);
                    pass.fail(name);
                    last_error = Some(e.to_string());
                }
            }
        }

        let missing: Vec<String> = pass
            .dangling()
            .values()
            .flat_map(|record| record.unique_names())
            .filter(|name| self.registrar.get(name).is_none())
            .cloned()
            .collect();
        for name in missing {
            if pass.report_mut().missing_resources.insert(name.clone()) {
                tracing::warn!(resource = %name, "dangling record names an unregistered resource, skipping it until registered");
            }
        }

        let report = self.context.finish(pass)?;
        *self.last_error.lock() = last_error;
        Ok(report)
    }

    /// Returns a recoverer scoped to single resources, serialized with the
    /// full passes of this recoverer.
    pub fn incremental(&self) -> IncrementalRecoverer {
        IncrementalRecoverer::new(Arc::clone(&self.context), Arc::clone(&self.pass_lock))
    }

    /// Number of passes started since creation.
    pub fn executions_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Branches committed by the last successful pass.
    pub fn committed_count(&self) -> usize {
        self.committed.load(Ordering::Relaxed)
    }

    /// Branches rolled back by the last successful pass.
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back.load(Ordering::Relaxed)
    }

    /// Error of the last pass, `None` when it fully succeeded.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Recoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recoverer")
            .field("context", &self.context)
            .field("executions", &self.executions_count())
            .field("running", &self.is_running())
            .finish()
    }
}
