// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Millisecond clocks used for GTRIDs, journal headers and record times.
//!
//! Every timestamp the coordinator persists or compares comes from a [`Clock`].
//! The default [`MonotonicClock`] follows the wall clock but never goes
//! backwards, so GTRID ordering and journal header ordering stay consistent
//! across NTP step adjustments.
//!
//! # Example
//!
//! ```
//! use xacoord::time::{Clock, MonotonicClock};
//!
//! let clock = MonotonicClock::new();
//! let a = clock.now_millis();
//! let b = clock.now_millis();
//! assert!(b >= a);
//! ```

mod clock;
mod monotonic;

pub use clock::Clock;
pub use monotonic::MonotonicClock;
