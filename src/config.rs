// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the coordinator, its journal and the recoverer.

use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of server id bytes embedded in a GTRID.
///
/// A GTRID is limited to 64 bytes and the generator appends 12 bytes of
/// timestamp and sequence to the server id.
pub const MAX_SERVER_ID_LENGTH: usize = 51;

/// Server id used when none is configured.
pub const DEFAULT_SERVER_ID: &str = "xacoord";

/// Configuration consumed by [`TmServices`](crate::TmServices) and the
/// components it wires together.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Identity embedded in every generated GTRID. Must be unique per
    /// coordinator sharing the same resources.
    pub server_id: Option<String>,
    /// First journal file.
    pub log_part1_filename: PathBuf,
    /// Second journal file.
    pub log_part2_filename: PathBuf,
    /// Pre-allocated size of each journal file.
    pub max_log_size_in_mb: u64,
    /// Whether `force()` actually fsyncs. Disabling it trades durability for
    /// throughput.
    pub forced_write_enabled: bool,
    /// Serialize every journal write behind one mutex.
    pub conservative_journaling: bool,
    /// Skip corrupted journal records instead of failing.
    pub skip_corrupted_logs: bool,
    /// Only persist COMMITTING, COMMITTED and UNKNOWN records.
    pub filter_log_status: bool,
    /// Delay between background recovery passes. Zero disables them.
    pub background_recovery_interval: Duration,
    /// How long shutdown waits for in-flight transactions to finish.
    pub graceful_shutdown_interval: Duration,
    /// Timeout applied by `begin()` when the context did not set one.
    pub default_transaction_timeout: Duration,
    /// How often the timeout sweeper checks in-flight transactions.
    pub timeout_sweep_interval: Duration,
    /// Only recover branches whose GTRID carries this node's server id.
    pub current_node_only_recovery: bool,
    /// Warn when a transaction commits without any enlisted resource.
    pub warn_about_zero_resource_transaction: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            server_id: None,
            log_part1_filename: PathBuf::from("btm1.tlog"),
            log_part2_filename: PathBuf::from("btm2.tlog"),
            max_log_size_in_mb: 2,
            forced_write_enabled: true,
            conservative_journaling: false,
            skip_corrupted_logs: false,
            filter_log_status: false,
            background_recovery_interval: Duration::from_secs(60),
            graceful_shutdown_interval: Duration::from_secs(60),
            default_transaction_timeout: Duration::from_secs(60),
            timeout_sweep_interval: Duration::from_secs(1),
            current_node_only_recovery: true,
            warn_about_zero_resource_transaction: true,
        }
    }
}

impl Configuration {
    /// Creates a configuration whose journal files live in `dir`.
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            log_part1_filename: dir.join("btm1.tlog"),
            log_part2_filename: dir.join("btm2.tlog"),
            ..Self::default()
        }
    }

    /// Sets the server id.
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Sets both journal file paths.
    pub fn with_log_files(mut self, part1: impl Into<PathBuf>, part2: impl Into<PathBuf>) -> Self {
        self.log_part1_filename = part1.into();
        self.log_part2_filename = part2.into();
        self
    }

    /// Sets the pre-allocated size of each journal file.
    pub fn with_max_log_size_in_mb(mut self, size: u64) -> Self {
        self.max_log_size_in_mb = size;
        self
    }

    pub fn with_forced_write_enabled(mut self, enabled: bool) -> Self {
        self.forced_write_enabled = enabled;
        self
    }

    pub fn with_conservative_journaling(mut self, enabled: bool) -> Self {
        self.conservative_journaling = enabled;
        self
    }

    pub fn with_skip_corrupted_logs(mut self, skip: bool) -> Self {
        self.skip_corrupted_logs = skip;
        self
    }

    pub fn with_filter_log_status(mut self, filter: bool) -> Self {
        self.filter_log_status = filter;
        self
    }

    /// Sets the background recovery interval. Zero disables background recovery.
    pub fn with_background_recovery_interval(mut self, interval: Duration) -> Self {
        self.background_recovery_interval = interval;
        self
    }

    pub fn with_graceful_shutdown_interval(mut self, interval: Duration) -> Self {
        self.graceful_shutdown_interval = interval;
        self
    }

    pub fn with_default_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.default_transaction_timeout = timeout;
        self
    }

    pub fn with_timeout_sweep_interval(mut self, interval: Duration) -> Self {
        self.timeout_sweep_interval = interval;
        self
    }

    pub fn with_current_node_only_recovery(mut self, enabled: bool) -> Self {
        self.current_node_only_recovery = enabled;
        self
    }

    pub fn with_warn_about_zero_resource_transaction(mut self, enabled: bool) -> Self {
        self.warn_about_zero_resource_transaction = enabled;
        self
    }

    /// Size in bytes of the record area of each journal file.
    #[inline]
    pub fn max_log_size_in_bytes(&self) -> u64 {
        self.max_log_size_in_mb * 1024 * 1024
    }

    /// Returns the server id bytes embedded in GTRIDs.
    ///
    /// Non-ASCII characters are dropped and the result is truncated to
    /// [`MAX_SERVER_ID_LENGTH`] bytes. Falls back to [`DEFAULT_SERVER_ID`].
    pub fn server_id_bytes(&self) -> Vec<u8> {
        let configured = match self.server_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => {
                tracing::warn!(
                    server_id = DEFAULT_SERVER_ID,
                    "no server id configured, using the default; \
                     this is unsafe when several coordinators share resources"
                );
                DEFAULT_SERVER_ID
            }
        };

        let mut bytes: Vec<u8> = configured.bytes().filter(u8::is_ascii).collect();
        if bytes.len() != configured.len() {
            tracing::warn!(server_id = configured, "dropping non-ASCII characters from server id");
        }
        if bytes.len() > MAX_SERVER_ID_LENGTH {
            tracing::warn!(
                server_id = configured,
                max = MAX_SERVER_ID_LENGTH,
                "server id too long, truncating"
            );
            bytes.truncate(MAX_SERVER_ID_LENGTH);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert_eq!(config.max_log_size_in_mb, 2);
        assert!(config.forced_write_enabled);
        assert!(!config.conservative_journaling);
        assert!(!config.skip_corrupted_logs);
        assert!(config.current_node_only_recovery);
        assert_eq!(config.max_log_size_in_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_builder() {
        let config = Configuration::in_directory("/tmp/journal")
            .with_server_id("node-1")
            .with_max_log_size_in_mb(1)
            .with_skip_corrupted_logs(true)
            .with_background_recovery_interval(Duration::ZERO);

        assert_eq!(config.log_part1_filename, PathBuf::from("/tmp/journal/btm1.tlog"));
        assert_eq!(config.log_part2_filename, PathBuf::from("/tmp/journal/btm2.tlog"));
        assert_eq!(config.server_id.as_deref(), Some("node-1"));
        assert_eq!(config.max_log_size_in_mb, 1);
        assert!(config.skip_corrupted_logs);
        assert_eq!(config.background_recovery_interval, Duration::ZERO);
    }

    #[test]
    fn test_server_id_bytes() {
        assert_eq!(Configuration::default().server_id_bytes(), DEFAULT_SERVER_ID.as_bytes());
        assert_eq!(
            Configuration::default().with_server_id("nöde").server_id_bytes(),
            b"nde".to_vec()
        );

        let long = "x".repeat(80);
        let bytes = Configuration::default().with_server_id(long).server_id_bytes();
        assert_eq!(bytes.len(), MAX_SERVER_ID_LENGTH);
    }
}
