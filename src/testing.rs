// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Scriptable test doubles.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::resource::{EndFlag, ResourceProducer, StartFlag, Vote, XaError, XaResource};
use crate::time::Clock;
use crate::uid::Xid;

/// A call received by a [`MockXaResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Start(Xid, StartFlag),
    End(Xid, EndFlag),
    Prepare(Xid),
    Commit(Xid, bool),
    Rollback(Xid),
    Recover,
    Forget(Xid),
}

#[derive(Debug, Default)]
struct MockState {
    in_doubt: Vec<Xid>,
    calls: Vec<MockCall>,
    vote: Option<Vote>,
    end_error: Option<XaError>,
    prepare_error: Option<XaError>,
    commit_error: Option<XaError>,
    rollback_error: Option<XaError>,
    recover_error: Option<XaError>,
    recovery_delay: Duration,
}

/// An in-memory XA resource that records every call.
///
/// Prepared branches are tracked so that `recover` returns them until they
/// are committed or rolled back.
#[derive(Debug, Default)]
pub struct MockXaResource {
    rm_id: Option<String>,
    state: Mutex<MockState>,
}

impl MockXaResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rm_id(rm_id: &str) -> Self {
        Self {
            rm_id: Some(rm_id.to_string()),
            ..Self::default()
        }
    }

    pub fn add_in_doubt(&self, xid: Xid) {
        self.state.lock().in_doubt.push(xid);
    }

    pub fn in_doubt(&self) -> Vec<Xid> {
        self.state.lock().in_doubt.clone()
    }

    pub fn set_vote(&self, vote: Vote) {
        self.state.lock().vote = Some(vote);
    }

    pub fn set_end_error(&self, error: Option<XaError>) {
        self.state.lock().end_error = error;
    }

    pub fn set_prepare_error(&self, error: Option<XaError>) {
        self.state.lock().prepare_error = error;
    }

    pub fn set_commit_error(&self, error: Option<XaError>) {
        self.state.lock().commit_error = error;
    }

    pub fn set_rollback_error(&self, error: Option<XaError>) {
        self.state.lock().rollback_error = error;
    }

    pub fn set_recover_error(&self, error: Option<XaError>) {
        self.state.lock().recover_error = error;
    }

    pub fn set_recovery_delay(&self, delay: Duration) {
        self.state.lock().recovery_delay = delay;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, matcher: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| matcher(c)).count()
    }

    pub fn prepare_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Prepare(_)))
    }

    pub fn commit_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Commit(..)))
    }

    pub fn rollback_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Rollback(_)))
    }

    pub fn forget_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Forget(_)))
    }
}

impl XaResource for MockXaResource {
    fn start(&self, xid: &Xid, flag: StartFlag) -> Result<(), XaError> {
        self.state.lock().calls.push(MockCall::Start(xid.clone(), flag));
        Ok(())
    }

    fn end(&self, xid: &Xid, flag: EndFlag) -> Result<(), XaError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::End(xid.clone(), flag));
        state.end_error.clone().map_or(Ok(()), Err)
    }

    fn prepare(&self, xid: &Xid) -> Result<Vote, XaError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Prepare(xid.clone()));
        if let Some(e) = state.prepare_error.clone() {
            return Err(e);
        }
        let vote = state.vote.unwrap_or(Vote::Ok);
        if vote == Vote::Ok {
            state.in_doubt.push(xid.clone());
        }
        Ok(vote)
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Commit(xid.clone(), one_phase));
        if let Some(e) = state.commit_error.clone() {
            return Err(e);
        }
        state.in_doubt.retain(|x| x != xid);
        Ok(())
    }

    fn rollback(&self, xid: &Xid) -> Result<(), XaError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Rollback(xid.clone()));
        if let Some(e) = state.rollback_error.clone() {
            return Err(e);
        }
        state.in_doubt.retain(|x| x != xid);
        Ok(())
    }

    fn recover(&self) -> Result<Vec<Xid>, XaError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(MockCall::Recover);
            state.recovery_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let state = self.state.lock();
        match state.recover_error.clone() {
            Some(e) => Err(e),
            None => Ok(state.in_doubt.clone()),
        }
    }

    fn forget(&self, xid: &Xid) -> Result<(), XaError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Forget(xid.clone()));
        let before = state.in_doubt.len();
        state.in_doubt.retain(|x| x != xid);
        if state.in_doubt.len() == before {
            return Err(XaError::NoSuchBranch);
        }
        Ok(())
    }

    fn resource_manager_id(&self) -> Option<&str> {
        self.rm_id.as_deref()
    }
}

/// A producer handing out one shared [`MockXaResource`].
#[derive(Debug)]
pub struct MockProducer {
    name: String,
    resource: Arc<MockXaResource>,
    failed: AtomicBool,
    start_recovery_error: Mutex<Option<XaError>>,
    recoveries_started: AtomicUsize,
    recoveries_ended: AtomicUsize,
}

impl MockProducer {
    pub fn new(name: &str, resource: Arc<MockXaResource>) -> Self {
        Self {
            name: name.to_string(),
            resource,
            failed: AtomicBool::new(false),
            start_recovery_error: Mutex::new(None),
            recoveries_started: AtomicUsize::new(0),
            recoveries_ended: AtomicUsize::new(0),
        }
    }

    pub fn resource(&self) -> &Arc<MockXaResource> {
        &self.resource
    }

    pub fn set_start_recovery_error(&self, error: Option<XaError>) {
        *self.start_recovery_error.lock() = error;
    }

    pub fn recoveries_started(&self) -> usize {
        self.recoveries_started.load(Ordering::SeqCst)
    }

    pub fn recoveries_ended(&self) -> usize {
        self.recoveries_ended.load(Ordering::SeqCst)
    }
}

impl ResourceProducer for MockProducer {
    fn unique_name(&self) -> &str {
        &self.name
    }

    fn start_recovery(&self) -> Result<Arc<dyn XaResource>, XaError> {
        if let Some(e) = self.start_recovery_error.lock().clone() {
            return Err(e);
        }
        self.recoveries_started.fetch_add(1, Ordering::SeqCst);
        Ok(self.resource.clone())
    }

    fn end_recovery(&self) -> Result<(), XaError> {
        self.recoveries_ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::SeqCst);
    }

    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn create_session(&self) -> Result<Arc<dyn XaResource>, XaError> {
        Ok(self.resource.clone())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            millis: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn wait_until_past(&self, millis: i64) {
        let now = self.now_millis();
        if now <= millis {
            self.advance(millis - now + 1);
        }
    }
}
