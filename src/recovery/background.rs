// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Periodic recovery.

use std::sync::Arc;
use std::time::Duration;

use crate::periodic::PeriodicTask;

use super::{Recoverer, RecoveryError};

/// Runs [`Recoverer::run`] on a background thread at a fixed interval.
#[derive(Debug)]
pub struct BackgroundRecovery {
    task: PeriodicTask,
}

impl BackgroundRecovery {
    pub fn start(recoverer: Arc<Recoverer>, interval: Duration) -> std::io::Result<Self> {
        let task = PeriodicTask::spawn("xacoord-recovery", interval, move || {
            // Other failures are logged by the recoverer itself.
            if let Err(RecoveryError::AlreadyRunning) = recoverer.run() {
                tracing::debug!("recovery already running, skipping scheduled pass");
            }
        })?;
        Ok(Self { task })
    }

    /// Stops scheduling passes. A pass in progress completes first.
    pub fn stop(&mut self) {
        self.task.stop();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}
