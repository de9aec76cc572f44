// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Caller-owned transaction context.

use std::sync::Arc;
use std::time::Duration;

use super::Transaction;

/// Binds at most one transaction to a caller.
///
/// Every coordinator operation takes the context explicitly. A context is
/// usually owned by one thread; moving a transaction between contexts is done
/// with [`suspend`](super::TransactionManager::suspend) and
/// [`resume`](super::TransactionManager::resume).
#[derive(Debug, Default)]
pub struct TxContext {
    current: Option<Arc<Transaction>>,
    timeout: Option<Duration>,
}

impl TxContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transaction bound to this context.
    #[inline]
    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        self.current.as_ref()
    }

    /// Timeout applied by the next `begin()`, `None` for the default.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub(crate) fn bind(&mut self, transaction: Arc<Transaction>) {
        self.current = Some(transaction);
    }

    pub(crate) fn unbind(&mut self) -> Option<Arc<Transaction>> {
        self.current.take()
    }

    /// Unbinds `transaction` if it is the one bound here.
    pub(crate) fn unbind_if(&mut self, transaction: &Transaction) {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.gtrid() == transaction.gtrid())
        {
            self.current = None;
        }
    }
}
