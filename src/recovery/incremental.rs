// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Recovery scoped to a single resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::resource::ResourceProducer;

use super::pass::RecoveryContext;
use super::{RecoveryError, RecoveryReport};

/// Recovers one resource, typically right after it was registered.
///
/// Dangling records naming a resource that was not registered during the
/// last full pass are resolved here once the resource shows up. Runs are
/// serialized with the full passes of the [`Recoverer`](super::Recoverer)
/// that created this value.
#[derive(Debug, Clone)]
pub struct IncrementalRecoverer {
    context: Arc<RecoveryContext>,
    pass_lock: Arc<Mutex<()>>,
}

impl IncrementalRecoverer {
    pub(crate) fn new(context: Arc<RecoveryContext>, pass_lock: Arc<Mutex<()>>) -> Self {
        Self { context, pass_lock }
    }

    /// Recovers the in-doubt branches of `producer`.
    ///
    /// On failure the producer is marked failed and the error returned;
    /// branches resolved before the failure are journaled anyway.
    pub fn recover(&self, producer: &dyn ResourceProducer) -> Result<RecoveryReport, RecoveryError> {
        let _pass = self.pass_lock.lock();
        let name = producer.unique_name();
        tracing::debug!(resource = name, "incremental recovery started");

        let mut pass = self.context.begin()?;
        let result = self.context.recover_producer(&mut pass, producer);
        if result.is_err() {
            pass.fail(name);
        }
        let report = self.context.finish(pass)?;

        match result {
            Ok(()) => {
                producer.set_failed(false);
                tracing::info!(
                    resource = name,
                    committed = report.committed,
                    rolled_back = report.rolled_back,
                    "incremental recovery completed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(resource = name, error = %e, "incremental recovery failed, marking resource failed");
                producer.set_failed(true);
                Err(e)
            }
        }
    }
}
