// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Recovery error types.

use thiserror::Error;

use crate::journal::JournalError;
use crate::resource::XaError;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("a recovery pass is already running")]
    AlreadyRunning,

    #[error("cannot read journal during recovery: {0}")]
    Journal(#[from] JournalError),

    #[error("error recovering resource {resource}: {source}")]
    Resource {
        resource: String,
        #[source]
        source: XaError,
    },
}

impl RecoveryError {
    pub(crate) fn resource(resource: &str, source: XaError) -> Self {
        RecoveryError::Resource {
            resource: resource.to_string(),
            source,
        }
    }
}
