// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Registry of in-flight transactions.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Transaction;
use crate::uid::Uid;

/// Transactions between `begin()` and completion, ordered by GTRID timestamp.
///
/// The recoverer never touches a branch whose GTRID is at least as recent as
/// the oldest entry here: such a transaction may still be executing.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    transactions: RwLock<BTreeMap<Uid, Arc<Transaction>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, transaction: Arc<Transaction>) {
        self.transactions
            .write()
            .insert(transaction.gtrid().clone(), transaction);
    }

    pub(crate) fn remove(&self, gtrid: &Uid) -> Option<Arc<Transaction>> {
        self.transactions.write().remove(gtrid)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }

    pub fn contains(&self, gtrid: &Uid) -> bool {
        self.transactions.read().contains_key(gtrid)
    }

    /// Timestamp embedded in the oldest in-flight GTRID.
    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.transactions
            .read()
            .keys()
            .next()
            .map(Uid::extract_timestamp)
    }

    /// Consistent copy of the registry, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Transaction>> {
        self.transactions.read().values().cloned().collect()
    }
}
