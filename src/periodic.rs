// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Background thread running a job at a fixed interval.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

/// Runs a job every `interval` on a dedicated thread until stopped.
///
/// Stopping wakes the thread immediately instead of waiting for the current
/// interval to elapse. A job already running is allowed to finish.
#[derive(Debug)]
pub(crate) struct PeriodicTask {
    name: &'static str,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub(crate) fn spawn<F>(name: &'static str, interval: Duration, mut job: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => job(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        tracing::debug!(task = name, ?interval, "periodic task started");
        Ok(Self {
            name,
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stops the task and waits for its thread to exit.
    pub(crate) fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(task = self.name, "periodic task panicked");
            } else {
                tracing::debug!(task = self.name, "periodic task stopped");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_runs_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut task = PeriodicTask::spawn("test-task", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(task.is_running());
        task.stop();
        assert!(!task.is_running());

        let after_stop = runs.load(Ordering::SeqCst);
        assert!(after_stop >= 2);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_does_not_wait_for_interval() {
        let task = PeriodicTask::spawn("idle-task", Duration::from_secs(3600), || {}).unwrap();
        let started = Instant::now();
        drop(task);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
