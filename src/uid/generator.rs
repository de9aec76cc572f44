// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! GTRID generation.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::time::Clock;

use super::{Uid, Xid, MAX_UID_LENGTH, UID_SUFFIX_LENGTH};

/// Generates identifiers unique for the lifetime of a server id.
pub struct UidGenerator {
    server_id: Vec<u8>,
    sequence: AtomicI32,
    clock: Arc<dyn Clock>,
}

impl UidGenerator {
    /// Creates a generator. `server_id` is truncated so generated identifiers
    /// never exceed [`MAX_UID_LENGTH`] bytes.
    pub fn new(server_id: impl Into<Vec<u8>>, clock: Arc<dyn Clock>) -> Self {
        let mut server_id = server_id.into();
        server_id.truncate(MAX_UID_LENGTH - UID_SUFFIX_LENGTH);
        Self {
            server_id,
            sequence: AtomicI32::new(0),
            clock,
        }
    }

    #[inline]
    pub fn server_id(&self) -> &[u8] {
        &self.server_id
    }

    /// Generates a new GTRID.
    pub fn generate_uid(&self) -> Uid {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let timestamp = self.clock.now_millis();

        let mut buf = BytesMut::with_capacity(self.server_id.len() + UID_SUFFIX_LENGTH);
        buf.put_slice(&self.server_id);
        buf.put_i64(timestamp);
        buf.put_i32(sequence);
        Uid::new(buf.freeze())
    }

    /// Generates a branch identifier for `gtrid` with a fresh branch qualifier.
    pub fn generate_xid(&self, gtrid: &Uid) -> Xid {
        Xid::new(gtrid.clone(), self.generate_uid())
    }
}

impl std::fmt::Debug for UidGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UidGenerator")
            .field("server_id", &String::from_utf8_lossy(&self.server_id))
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}
