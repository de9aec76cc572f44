// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Clock trait definition.

use std::time::Duration;

/// Source of millisecond timestamps.
pub trait Clock: Send + Sync {
    /// Returns milliseconds since the Unix epoch. Never decreases.
    fn now_millis(&self) -> i64;

    /// Blocks until `now_millis()` is strictly greater than `millis`.
    fn wait_until_past(&self, millis: i64) {
        while self.now_millis() <= millis {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
