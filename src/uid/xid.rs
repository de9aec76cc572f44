// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! XA branch identifiers.

use std::fmt;

use super::Uid;

/// Format id stamped on every branch this coordinator creates.
///
/// Recovery ignores branches with any other format id: they belong to some
/// other transaction manager.
pub const FORMAT_ID: i32 = 0x4274_6d00;

/// An XA branch identifier: a GTRID plus a branch qualifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    format_id: i32,
    gtrid: Uid,
    bqual: Uid,
}

impl Xid {
    /// Creates a branch identifier carrying [`FORMAT_ID`].
    pub fn new(gtrid: Uid, bqual: Uid) -> Self {
        Self::with_format_id(FORMAT_ID, gtrid, bqual)
    }

    /// Creates a branch identifier with an arbitrary format id, as reported
    /// by a resource during recovery.
    pub fn with_format_id(format_id: i32, gtrid: Uid, bqual: Uid) -> Self {
        Self {
            format_id,
            gtrid,
            bqual,
        }
    }

    #[inline]
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    #[inline]
    pub fn gtrid(&self) -> &Uid {
        &self.gtrid
    }

    #[inline]
    pub fn bqual(&self) -> &Uid {
        &self.bqual
    }

    /// Whether this branch was created by a coordinator of this kind.
    #[inline]
    pub fn is_ours(&self) -> bool {
        self.format_id == FORMAT_ID
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.format_id, self.gtrid, self.bqual)
    }
}

impl fmt::Debug for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xid({})", self)
    }
}
