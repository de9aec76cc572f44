// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! xacoord: a two-phase-commit transaction coordinator with a crash-durable
//! dual-file journal and presumed-abort recovery.
//!
//! The crate drives XA-style resources (databases, message brokers) through
//! prepare and commit. Every commit decision is journaled before any resource
//! is told to commit, so that after a crash the [`Recoverer`] can commit what
//! was decided and roll back everything else.
//!
//! # Example
//!
//! ```no_run
//! use xacoord::tm::TxContext;
//! use xacoord::{Configuration, TmServices};
//!
//! let services = TmServices::new(Configuration::in_directory("/var/lib/xacoord").with_server_id("node-1"));
//! // services.register_resource(...) for every resource
//! services.init()?;
//!
//! let tm = services.transaction_manager();
//! let mut ctx = TxContext::new();
//! tm.begin(&mut ctx)?;
//! // tm.enlist_resource(&ctx, "orders-db", session)?;
//! tm.commit(&mut ctx)?;
//!
//! services.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod journal;
mod periodic;
pub mod recovery;
pub mod resource;
pub mod services;
pub mod time;
pub mod tm;
pub mod uid;

#[cfg(test)]
mod testing;

pub use config::Configuration;
pub use journal::{DiskJournal, Journal, JournalError, NullJournal, TxStatus};
pub use recovery::{Recoverer, RecoveryError, RecoveryReport};
pub use resource::{ResourceProducer, XaError, XaResource};
pub use services::{ServicesError, TmServices};
pub use tm::{TmError, Transaction, TransactionManager, TxContext};
pub use uid::{Uid, UidGenerator, Xid};
