// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Rolls back transactions that outlive their timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::periodic::PeriodicTask;

use super::TransactionManager;

/// Periodically calls [`TransactionManager::sweep_timeouts`].
#[derive(Debug)]
pub struct TimeoutSweeper {
    task: PeriodicTask,
}

impl TimeoutSweeper {
    pub fn start(manager: Arc<TransactionManager>, interval: Duration) -> std::io::Result<Self> {
        let task = PeriodicTask::spawn("xacoord-timeouts", interval, move || {
            let timed_out = manager.sweep_timeouts();
            if timed_out > 0 {
                tracing::info!(timed_out, "rolled back timed out transactions");
            }
        })?;
        Ok(Self { task })
    }

    /// Stops sweeping. Also done on drop.
    pub fn stop(&mut self) {
        self.task.stop();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}
