//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;
use xa_coordinator::xa::{XA_OK, XA_RDONLY};
use xa_coordinator::{async_trait, Result, Status, Synchronization, TransactionError, XaError, XaResource, Xid};

/// Installs a test subscriber honouring `RUST_LOG`; repeated calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Resource operations that can be made to fail or stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SetTimeout,
    Start,
    End,
    Prepare,
    Commit,
    Rollback,
    Forget,
}

/// One recorded call on a [`MockResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetTimeout,
    Start(i32),
    End(i32),
    Prepare,
    Commit(bool),
    Rollback,
    Forget,
}

/// Resource adapter that records every call and fails on demand.
pub struct MockResource {
    rm: Uuid,
    log: Mutex<Vec<(Option<Xid>, Call)>>,
    failures: Mutex<HashMap<Op, i32>>,
    delays: Mutex<HashMap<Op, Duration>>,
    read_only: AtomicBool,
}

impl MockResource {
    /// A resource with its own resource manager.
    pub fn new() -> Arc<Self> {
        Self::with_rm(Uuid::new_v4())
    }

    /// A second resource of the same resource manager as `other`.
    pub fn same_rm(other: &MockResource) -> Arc<Self> {
        Self::with_rm(other.rm)
    }

    fn with_rm(rm: Uuid) -> Arc<Self> {
        Arc::new(Self {
            rm,
            log: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            read_only: AtomicBool::new(false),
        })
    }

    /// Makes every later `op` fail with `code`.
    pub fn fail(&self, op: Op, code: i32) {
        self.failures.lock().unwrap().insert(op, code);
    }

    /// Makes every later `op` sleep for `delay` before it is recorded.
    pub fn delay(&self, op: Op, delay: Duration) {
        self.delays.lock().unwrap().insert(op, delay);
    }

    /// Makes `prepare` vote read-only.
    pub fn vote_read_only(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().iter().map(|(_, call)| call.clone()).collect()
    }

    /// Calls issued for `xid`.
    pub fn calls_for(&self, xid: &Xid) -> Vec<Call> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(logged, _)| logged.as_ref() == Some(xid))
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn prepared(&self) -> bool {
        self.count(&Call::Prepare) > 0
    }

    pub fn committed(&self) -> bool {
        self.count(&Call::Commit(false)) > 0
    }

    pub fn rolled_back(&self) -> bool {
        self.count(&Call::Rollback) > 0
    }

    async fn stall(&self, op: Op) {
        let delay = self.delays.lock().unwrap().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, xid: Option<&Xid>, call: Call, op: Op) -> std::result::Result<(), XaError> {
        self.log.lock().unwrap().push((xid.cloned(), call));
        match self.failures.lock().unwrap().get(&op) {
            Some(code) => Err(XaError::new(*code, format!("injected {op:?} failure"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl XaResource for MockResource {
    fn resource_manager_id(&self) -> Uuid {
        self.rm
    }

    async fn set_transaction_timeout(&self, _timeout: Duration) -> std::result::Result<bool, XaError> {
        self.stall(Op::SetTimeout).await;
        self.record(None, Call::SetTimeout, Op::SetTimeout)?;
        Ok(true)
    }

    async fn start(&self, xid: &Xid, flags: i32) -> std::result::Result<(), XaError> {
        self.stall(Op::Start).await;
        self.record(Some(xid), Call::Start(flags), Op::Start)
    }

    async fn end(&self, xid: &Xid, flags: i32) -> std::result::Result<(), XaError> {
        self.stall(Op::End).await;
        self.record(Some(xid), Call::End(flags), Op::End)
    }

    async fn prepare(&self, xid: &Xid) -> std::result::Result<i32, XaError> {
        self.stall(Op::Prepare).await;
        self.record(Some(xid), Call::Prepare, Op::Prepare)?;
        Ok(if self.read_only.load(Ordering::SeqCst) {
            XA_RDONLY
        } else {
            XA_OK
        })
    }

    async fn commit(&self, xid: &Xid, one_phase: bool) -> std::result::Result<(), XaError> {
        self.stall(Op::Commit).await;
        self.record(Some(xid), Call::Commit(one_phase), Op::Commit)
    }

    async fn rollback(&self, xid: &Xid) -> std::result::Result<(), XaError> {
        self.stall(Op::Rollback).await;
        self.record(Some(xid), Call::Rollback, Op::Rollback)
    }

    async fn forget(&self, xid: &Xid) -> std::result::Result<(), XaError> {
        self.stall(Op::Forget).await;
        self.record(Some(xid), Call::Forget, Op::Forget)
    }
}

/// Synchronization that records its callbacks.
#[derive(Default)]
pub struct RecordingSynchronization {
    name: &'static str,
    before: AtomicUsize,
    after: Mutex<Vec<Status>>,
    fail_before: bool,
    fail_after: bool,
    order: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingSynchronization {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_before: true,
            ..Self::default()
        })
    }

    pub fn failing_after() -> Arc<Self> {
        Arc::new(Self {
            fail_after: true,
            ..Self::default()
        })
    }

    /// Appends `"<name>:before"` / `"<name>:after"` to a shared log.
    pub fn ordered(name: &'static str, order: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            order: Some(Arc::clone(order)),
            ..Self::default()
        })
    }

    pub fn before_count(&self) -> usize {
        self.before.load(Ordering::SeqCst)
    }

    pub fn after_statuses(&self) -> Vec<Status> {
        self.after.lock().unwrap().clone()
    }

    fn note(&self, phase: &str) {
        if let Some(order) = &self.order {
            order.lock().unwrap().push(format!("{}:{phase}", self.name));
        }
    }
}

impl Synchronization for RecordingSynchronization {
    fn before_completion(&self) -> Result<()> {
        self.before.fetch_add(1, Ordering::SeqCst);
        self.note("before");
        if self.fail_before {
            return Err(TransactionError::synchronization("injected before_completion failure"));
        }
        Ok(())
    }

    fn after_completion(&self, status: Status) -> Result<()> {
        self.after.lock().unwrap().push(status);
        self.note("after");
        if self.fail_after {
            return Err(TransactionError::synchronization("injected after_completion failure"));
        }
        Ok(())
    }
}
