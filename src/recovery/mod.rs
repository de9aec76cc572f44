// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Presumed-abort recovery of in-doubt branches.
//!
//! After a crash, resources may hold prepared branches the coordinator never
//! finished. A branch is committed only if the journal still holds a
//! dangling COMMITTING record naming its resource; any other branch of ours
//! that is older than every in-flight transaction is rolled back.

mod background;
mod error;
mod incremental;
mod pass;
mod recoverer;

pub use background::BackgroundRecovery;
pub use error::RecoveryError;
pub use incremental::IncrementalRecoverer;
pub use pass::RecoveryReport;
pub use recoverer::Recoverer;
