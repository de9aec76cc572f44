// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Process-wide wiring of the coordinator, its journal and recovery.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::Configuration;
use crate::journal::{DiskJournal, Journal, JournalError, LogState};
use crate::recovery::{BackgroundRecovery, Recoverer, RecoveryError};
use crate::resource::{RegistrarError, ResourceProducer, ResourceRegistrar};
use crate::time::{Clock, MonotonicClock};
use crate::tm::{InFlightRegistry, TimeoutSweeper, TransactionManager};
use crate::uid::UidGenerator;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("registration error: {0}")]
    Registrar(#[from] RegistrarError),

    #[error("cannot start background worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("services have been shut down")]
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    ShutDown,
}

#[derive(Debug, Default)]
struct Workers {
    background_recovery: Option<BackgroundRecovery>,
    timeout_sweeper: Option<TimeoutSweeper>,
}

/// The coordinator and everything it depends on, with an explicit lifecycle.
///
/// One instance is meant to exist per process. [`init`](TmServices::init)
/// opens the journal, recovers what a previous run left in doubt and starts
/// the background workers; [`shutdown`](TmServices::shutdown) undoes it.
pub struct TmServices {
    config: Configuration,
    journal: Arc<dyn Journal>,
    registrar: Arc<ResourceRegistrar>,
    manager: Arc<TransactionManager>,
    recoverer: Arc<Recoverer>,
    lifecycle: Mutex<Lifecycle>,
    workers: Mutex<Workers>,
}

impl TmServices {
    /// Creates the services with a [`DiskJournal`] at the configured paths.
    pub fn new(config: Configuration) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let journal = Arc::new(DiskJournal::new(&config, Arc::clone(&clock)));
        Self::with_journal(config, journal, clock)
    }

    /// Creates the services around an existing journal.
    pub fn with_journal(config: Configuration, journal: Arc<dyn Journal>, clock: Arc<dyn Clock>) -> Self {
        let registrar = Arc::new(ResourceRegistrar::new());
        let in_flight = Arc::new(InFlightRegistry::new());
        let uids = Arc::new(UidGenerator::new(config.server_id_bytes(), Arc::clone(&clock)));
        let manager = Arc::new(TransactionManager::new(
            &config,
            Arc::clone(&journal),
            uids,
            Arc::clone(&in_flight),
        ));
        let recoverer = Arc::new(Recoverer::new(
            &config,
            Arc::clone(&journal),
            Arc::clone(&registrar),
            in_flight,
            clock,
        ));

        Self {
            config,
            journal,
            registrar,
            manager,
            recoverer,
            lifecycle: Mutex::new(Lifecycle::Created),
            workers: Mutex::new(Workers::default()),
        }
    }

    /// Opens the journal, runs startup recovery and starts the background
    /// workers. Calling it again while running does nothing.
    pub fn init(&self) -> Result<(), ServicesError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::ShutDown => return Err(ServicesError::ShutDown),
            Lifecycle::Created => {}
        }

        if self.journal.open()? == LogState::Unclean {
            tracing::warn!("journal was not closed cleanly, recovery will resolve in-doubt branches");
        }

        // Resource failures are reported per resource and retried later.
        if let Err(e) = self.recoverer.run() {
            self.journal.shutdown();
            return Err(e.into());
        }

        let mut workers = self.workers.lock();
        if !self.config.background_recovery_interval.is_zero() {
            workers.background_recovery = Some(BackgroundRecovery::start(
                Arc::clone(&self.recoverer),
                self.config.background_recovery_interval,
            )?);
        }
        if !self.config.timeout_sweep_interval.is_zero() {
            workers.timeout_sweeper = Some(TimeoutSweeper::start(
                Arc::clone(&self.manager),
                self.config.timeout_sweep_interval,
            )?);
        }

        *lifecycle = Lifecycle::Running;
        tracing::info!(resources = self.registrar.len(), "transaction services started");
        Ok(())
    }

    /// Registers a resource.
    ///
    /// While the services are running, the resource is recovered right away;
    /// if that fails, it is unregistered again and the error returned.
    pub fn register_resource(&self, producer: Arc<dyn ResourceProducer>) -> Result<(), ServicesError> {
        self.registrar.register(Arc::clone(&producer))?;
        if !self.is_running() {
            return Ok(());
        }

        if let Err(e) = self.recoverer.incremental().recover(producer.as_ref()) {
            self.registrar.unregister(producer.unique_name());
            return Err(e.into());
        }
        Ok(())
    }

    pub fn unregister_resource(&self, unique_name: &str) -> Option<Arc<dyn ResourceProducer>> {
        self.registrar.unregister(unique_name)
    }

    /// Drains the coordinator, stops the workers and closes the journal.
    pub fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Running {
            *lifecycle = Lifecycle::ShutDown;
            return;
        }

        self.manager.shutdown();
        {
            let mut workers = self.workers.lock();
            if let Some(mut sweeper) = workers.timeout_sweeper.take() {
                sweeper.stop();
            }
            if let Some(mut background) = workers.background_recovery.take() {
                background.stop();
            }
        }
        self.journal.shutdown();

        *lifecycle = Lifecycle::ShutDown;
        tracing::info!("transaction services shut down");
    }

    pub fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    #[inline]
    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    #[inline]
    pub fn recoverer(&self) -> &Arc<Recoverer> {
        &self.recoverer
    }

    #[inline]
    pub fn registrar(&self) -> &Arc<ResourceRegistrar> {
        &self.registrar
    }

    #[inline]
    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    #[inline]
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }
}

impl Drop for TmServices {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TmServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmServices")
            .field("lifecycle", &*self.lifecycle.lock())
            .field("registrar", &self.registrar)
            .field("manager", &self.manager)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::TxStatus;
    use crate::resource::XaError;
    use crate::testing::{MockProducer, MockXaResource};
    use crate::tm::{TmError, TxContext};
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Configuration {
        Configuration::in_directory(dir.path())
            .with_server_id("services-test")
            .with_max_log_size_in_mb(1)
            .with_background_recovery_interval(Duration::ZERO)
            .with_graceful_shutdown_interval(Duration::from_millis(100))
    }

    fn producer(name: &str) -> Arc<MockProducer> {
        Arc::new(MockProducer::new(name, Arc::new(MockXaResource::new())))
    }

    #[test]
    fn test_lifecycle() {
        let dir = TempDir::new().unwrap();
        let services = TmServices::new(config(&dir));
        assert!(!services.is_running());

        services.init().unwrap();
        services.init().unwrap();
        assert!(services.is_running());
        assert_eq!(services.recoverer().executions_count(), 1);

        services.shutdown();
        services.shutdown();
        assert!(!services.is_running());
        assert!(matches!(services.init(), Err(ServicesError::ShutDown)));

        let mut ctx = TxContext::new();
        assert!(matches!(
            services.transaction_manager().begin(&mut ctx),
            Err(TmError::ShuttingDown)
        ));
    }

    #[test]
    fn test_commit_through_services() {
        let dir = TempDir::new().unwrap();
        let services = TmServices::new(config(&dir));
        let db = producer("db");
        let queue = producer("queue");
        services.register_resource(db.clone()).unwrap();
        services.register_resource(queue.clone()).unwrap();
        services.init().unwrap();

        let tm = services.transaction_manager();
        let mut ctx = TxContext::new();
        tm.begin(&mut ctx).unwrap();
        for p in [&db, &queue] {
            let session = p.create_session().unwrap();
            tm.enlist_resource(&ctx, p.unique_name(), session).unwrap();
        }
        tm.commit(&mut ctx).unwrap();

        assert_eq!(db.resource().commit_count(), 1);
        assert_eq!(queue.resource().commit_count(), 1);
        assert!(services.journal().collect_dangling_records().unwrap().is_empty());
    }

    #[test]
    fn test_startup_recovery_after_crash() {
        let dir = TempDir::new().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let db = producer("db");

        let gtrid = {
            let journal = DiskJournal::new(&config(&dir), Arc::clone(&clock));
            journal.open().unwrap();
            let uids = UidGenerator::new(config(&dir).server_id_bytes(), Arc::clone(&clock));
            let gtrid = uids.generate_uid();
            db.resource().add_in_doubt(uids.generate_xid(&gtrid));
            let names: BTreeSet<String> = ["db".to_string()].into();
            journal.log(TxStatus::Committing, &gtrid, &names).unwrap();
            journal.force().unwrap();
            // Dropped without close, like a crash.
            gtrid
        };
        std::thread::sleep(Duration::from_millis(5));

        let services = TmServices::new(config(&dir));
        services.register_resource(db.clone()).unwrap();
        services.init().unwrap();

        assert_eq!(services.recoverer().committed_count(), 1);
        assert!(db.resource().in_doubt().is_empty());
        assert!(!services
            .journal()
            .collect_dangling_records()
            .unwrap()
            .contains_key(&gtrid));
    }

    #[test]
    fn test_registration_while_running_recovers_resource() {
        let dir = TempDir::new().unwrap();
        let services = TmServices::new(config(&dir));
        services.init().unwrap();

        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let uids = UidGenerator::new(config(&dir).server_id_bytes(), clock);
        let late = producer("late");
        late.resource().add_in_doubt(uids.generate_xid(&uids.generate_uid()));
        std::thread::sleep(Duration::from_millis(5));

        services.register_resource(late.clone()).unwrap();
        assert!(late.resource().in_doubt().is_empty());
        assert_eq!(late.resource().rollback_count(), 1);

        let broken = producer("broken");
        broken.set_start_recovery_error(Some(XaError::ResourceFailure("unreachable".into())));
        assert!(matches!(
            services.register_resource(broken.clone()),
            Err(ServicesError::Recovery(_))
        ));
        assert!(services.registrar().get("broken").is_none());
        assert!(broken.is_failed());

        assert!(matches!(
            services.register_resource(late),
            Err(ServicesError::Registrar(RegistrarError::DuplicateName(_)))
        ));
    }

    #[test]
    fn test_background_workers_started() {
        let dir = TempDir::new().unwrap();
        let services = TmServices::new(
            config(&dir).with_background_recovery_interval(Duration::from_millis(10)),
        );
        services.init().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(services.recoverer().executions_count() >= 2);
        services.shutdown();

        let executions = services.recoverer().executions_count();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(services.recoverer().executions_count(), executions);
    }
}
