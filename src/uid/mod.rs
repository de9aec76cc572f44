// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Global transaction identifiers and XA branch identifiers.
//!
//! A GTRID is `[server id][timestamp:i64 BE][sequence:i32 BE]`. The embedded
//! timestamp gives GTRIDs a total order that the in-flight registry and the
//! recoverer rely on: older transactions sort first, ties are broken by the raw
//! bytes.

mod generator;
mod xid;

pub use generator::UidGenerator;
pub use xid::{Xid, FORMAT_ID};

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

/// Bytes appended to the server id: 8 for the timestamp, 4 for the sequence.
pub const UID_SUFFIX_LENGTH: usize = 12;

/// Largest identifier the journal can store (its length is a single byte).
pub const MAX_UID_LENGTH: usize = 64;

/// Global transaction identifier.
///
/// Immutable and cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Uid {
    bytes: Bytes,
}

impl Uid {
    /// Wraps raw identifier bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Parses the uppercase or lowercase hex form produced by `Display`.
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self::new(hex::decode(hex_str)?))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the server id prefix, or an empty slice when the identifier is
    /// too short to carry one.
    pub fn extract_server_id(&self) -> &[u8] {
        match self.bytes.len().checked_sub(UID_SUFFIX_LENGTH) {
            Some(end) => &self.bytes[..end],
            None => &[],
        }
    }

    /// Returns the embedded creation time in milliseconds, or 0 when the
    /// identifier is shorter than 12 bytes.
    pub fn extract_timestamp(&self) -> i64 {
        match self.bytes.len().checked_sub(UID_SUFFIX_LENGTH) {
            Some(start) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&self.bytes[start..start + 8]);
                i64::from_be_bytes(raw)
            }
            None => 0,
        }
    }

    /// Returns the embedded sequence number, or 0 when the identifier is
    /// shorter than 12 bytes.
    pub fn extract_sequence(&self) -> i32 {
        match self.bytes.len().checked_sub(4) {
            Some(start) if self.bytes.len() >= UID_SUFFIX_LENGTH => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&self.bytes[start..]);
                i32::from_be_bytes(raw)
            }
            _ => 0,
        }
    }
}

impl Ord for Uid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.extract_timestamp()
            .cmp(&other.extract_timestamp())
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

impl PartialOrd for Uid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.bytes))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

impl From<Vec<u8>> for Uid {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Uid {
    fn from(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }
}
