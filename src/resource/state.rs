// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of a pooled resource session.
//!
//! ```text
//!            acquire                 release in tx
//! IN_POOL ──────────► ACCESSIBLE ─────────────────► NOT_ACCESSIBLE
//!    ▲  ◄──────────────   │  ▲  ◄───────────────────     │
//!    │   release          │  └──── reused in same tx ────┘
//!    │                    │                               │
//!    └────────────────────┼───── transaction completed ───┘
//!                         ▼
//!                      CLOSED  (reachable from every state)
//! ```
//!
//! Pools observe transitions by subscribing to the state machine instead of
//! registering callbacks.

use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// State of a pooled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolderState {
    /// Idle in the pool.
    InPool,
    /// Handed out to a caller.
    Accessible,
    /// Released by the caller but still enlisted in a transaction.
    NotAccessible,
    /// Closed. Terminal.
    Closed,
}

impl HolderState {
    /// Returns true if moving from `self` to `to` is allowed.
    pub fn can_transition_to(self, to: HolderState) -> bool {
        use HolderState::*;
        matches!(
            (self, to),
            (InPool, Accessible)
                | (Accessible, InPool)
                | (Accessible, NotAccessible)
                | (NotAccessible, Accessible)
                | (NotAccessible, InPool)
                | (InPool | Accessible | NotAccessible, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HolderState::InPool => "IN_POOL",
            HolderState::Accessible => "ACCESSIBLE",
            HolderState::NotAccessible => "NOT_ACCESSIBLE",
            HolderState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for HolderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: HolderState,
    pub to: HolderState,
}

/// Error returned by [`HolderStateMachine::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal state transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: HolderState,
    pub to: HolderState,
}

struct Inner {
    state: HolderState,
    subscribers: Vec<Sender<StateChange>>,
}

/// Holds the state of one session and publishes its transitions.
pub struct HolderStateMachine {
    inner: Mutex<Inner>,
}

impl HolderStateMachine {
    /// Creates a machine in the [`HolderState::InPool`] state.
    pub fn new() -> Self {
        Self::with_state(HolderState::InPool)
    }

    pub fn with_state(state: HolderState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                subscribers: Vec::new(),
            }),
        }
    }

    #[inline]
    pub fn state(&self) -> HolderState {
        self.inner.lock().state
    }

    /// Returns a channel receiving every subsequent transition.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<StateChange> {
        let (tx, rx) = unbounded();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Moves to `to` and notifies subscribers.
    ///
    /// Subscribers are notified while the state lock is held, so events are
    /// delivered in transition order.
    pub fn transition(&self, to: HolderState) -> Result<StateChange, IllegalTransition> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        if !from.can_transition_to(to) {
            return Err(IllegalTransition { from, to });
        }
        inner.state = to;

        let change = StateChange { from, to };
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(change).is_ok());
        tracing::trace!(%from, %to, "holder state changed");
        Ok(change)
    }
}

impl Default for HolderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HolderStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HolderStateMachine")
            .field("state", &self.state())
            .finish()
    }
}
