// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Wall clock that never goes backwards.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::Clock;

/// Millisecond wall clock with a non-decreasing guarantee.
///
/// If the system clock steps back, `now_millis()` keeps returning the highest
/// value seen so far until the system clock catches up. Unlike a logical clock
/// it does not increment on every call: two calls within the same millisecond
/// return the same value, which GTRID generation disambiguates with a sequence
/// number.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_millis: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn physical_time_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> i64 {
        let physical = Self::physical_time_millis();
        let previous = self.last_millis.fetch_max(physical, Ordering::AcqRel);
        previous.max(physical)
    }
}
