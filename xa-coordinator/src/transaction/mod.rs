//! Transactions and transaction branches.
//!
//! A [`Transaction`] is a cheap, clonable handle. Every mutating operation
//! takes the transaction's completion lock, so enlistment, suspension, join
//! and the commit and rollback protocols never interleave for one
//! transaction. Status, the rollback-only flag and the scratch map are read
//! without the lock.
//!
//! Each transaction owns one absolute deadline. A task spawned at
//! construction rolls the transaction back when the deadline passes unless a
//! completion protocol ran first; both contend for the same lock, so exactly
//! one of them completes the transaction.

mod completion;
mod synchronization;

pub use synchronization::Synchronization;

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use xa_core::xa::{XA_TMFAIL, XA_TMJOIN, XA_TMNOFLAGS, XA_TMRESUME, XA_TMSUCCESS, XA_TMSUSPEND};
use xa_core::{Result, Status, TransactionError, XaError, XaResource, Xid};

use crate::lock;
use completion::ErrorCollector;

/// Caller supplied value stored in a transaction's scratch map.
pub type TransactionResource = Arc<dyn Any + Send + Sync>;

/// Receives lifecycle notifications for transactions created by a manager.
pub(crate) trait TransactionObserver: Send + Sync {
    fn created(&self, transaction: &Transaction);
    fn status_changed(&self, transaction: &Transaction, status: Status);
}

pub(crate) fn flag_name(flags: i32) -> &'static str {
    match flags {
        XA_TMNOFLAGS => "TMNOFLAGS",
        XA_TMJOIN => "TMJOIN",
        XA_TMRESUME => "TMRESUME",
        XA_TMSUCCESS => "TMSUCCESS",
        XA_TMFAIL => "TMFAIL",
        XA_TMSUSPEND => "TMSUSPEND",
        _ => "TM?",
    }
}

fn same_instance(a: &dyn XaResource, b: &dyn XaResource) -> bool {
    std::ptr::eq(
        a as *const dyn XaResource as *const (),
        b as *const dyn XaResource as *const (),
    )
}

/// Association of an enlisted resource with this transaction's branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Association {
    /// Started and currently associated.
    Active,
    /// Ended with TMSUSPEND, resumes with TMRESUME.
    Suspended,
    /// Enlisted while the transaction was suspended, not started yet.
    Deferred,
    /// Ended with TMSUCCESS or TMFAIL.
    Ended(i32),
}

struct Enlistment {
    resource: Arc<dyn XaResource>,
    association: Association,
    /// Started with TMJOIN; completes through the enlistment it joined.
    joined: bool,
}

#[derive(Default)]
struct State {
    enlisted: Vec<Enlistment>,
    synchronizations: VecDeque<Arc<dyn Synchronization>>,
    interposed: VecDeque<Arc<dyn Synchronization>>,
}

impl State {
    fn position(&self, resource: &dyn XaResource) -> Option<usize> {
        self.enlisted
            .iter()
            .position(|e| same_instance(e.resource.as_ref(), resource))
    }

    fn shares_manager(&self, resource: &dyn XaResource) -> bool {
        self.enlisted.iter().any(|e| {
            e.association != Association::Deferred
                && !same_instance(e.resource.as_ref(), resource)
                && e.resource.is_same_rm(resource)
        })
    }
}

/// Status changes waiting for the observer, in transition order.
#[derive(Default)]
struct Notifications {
    pending: VecDeque<Status>,
    draining: bool,
}

struct Inner {
    xid: Xid,
    parent: Option<Xid>,
    expires: Instant,
    status: watch::Sender<Status>,
    transitions: Mutex<()>,
    notifications: Mutex<Notifications>,
    rollback_only: AtomicBool,
    suspended: AtomicBool,
    joined: AtomicBool,
    branches: Mutex<Vec<Transaction>>,
    resources: Mutex<HashMap<String, TransactionResource>>,
    state: AsyncMutex<State>,
    timer: CancellationToken,
    observer: Option<Arc<dyn TransactionObserver>>,
}

/// Handle to a transaction or transaction branch.
///
/// Clones refer to the same transaction; equality is identity.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

/// Non-owning reference used by the manager to track transactions.
#[derive(Clone)]
pub(crate) struct WeakTransaction(Weak<Inner>);

impl WeakTransaction {
    pub(crate) fn upgrade(&self) -> Option<Transaction> {
        self.0.upgrade().map(|inner| Transaction { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Transaction {
    /// Creates a root transaction that rolls back automatically after `timeout`.
    ///
    /// Fails with `IllegalArgument` if `timeout` is zero, and with
    /// `IllegalState` outside a Tokio runtime.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::root(timeout, None)
    }

    pub(crate) fn root(
        timeout: Duration,
        observer: Option<Arc<dyn TransactionObserver>>,
    ) -> Result<Self> {
        if timeout.is_zero() {
            return Err(TransactionError::illegal_argument(
                "transaction timeout must be positive",
            ));
        }
        let expires = Instant::now().checked_add(timeout).ok_or_else(|| {
            TransactionError::illegal_argument(format!("transaction timeout {timeout:?} too large"))
        })?;

        let transaction = Self::create(Xid::generate(), None, expires, observer)?;
        tracing::debug!(xid = %transaction.xid(), ?timeout, "begin");
        Ok(transaction)
    }

    /// Creates a branch sharing this transaction's global id and deadline.
    ///
    /// Fails with `IllegalArgument` once this transaction has expired or
    /// rolled back.
    pub fn branch(&self) -> Result<Self> {
        let live = matches!(self.status(), Status::Active | Status::MarkedRollback);
        if !live || self.is_expired() {
            return Err(TransactionError::illegal_argument(format!(
                "{} is {} and expired={}",
                self.xid(),
                self.status(),
                self.is_expired()
            )));
        }

        let branch = Self::create(
            self.xid().branch(),
            Some(self.xid().clone()),
            self.inner.expires,
            self.inner.observer.clone(),
        )?;
        lock(&self.inner.branches).push(branch.clone());
        tracing::debug!(xid = %branch.xid(), parent = %self.xid(), "branch");
        Ok(branch)
    }

    fn create(
        xid: Xid,
        parent: Option<Xid>,
        expires: Instant,
        observer: Option<Arc<dyn TransactionObserver>>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransactionError::illegal_state("transactions require a Tokio runtime"))?;
        let (status, _) = watch::channel(Status::Active);

        let transaction = Self {
            inner: Arc::new(Inner {
                xid,
                parent,
                expires,
                status,
                transitions: Mutex::new(()),
                notifications: Mutex::new(Notifications::default()),
                rollback_only: AtomicBool::new(false),
                suspended: AtomicBool::new(false),
                joined: AtomicBool::new(false),
                branches: Mutex::new(Vec::new()),
                resources: Mutex::new(HashMap::new()),
                state: AsyncMutex::new(State::default()),
                timer: CancellationToken::new(),
                observer,
            }),
        };

        let cancelled = transaction.inner.timer.clone();
        let scheduled = transaction.clone();
        let deadline = tokio::time::Instant::from_std(expires);
        runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => scheduled.timed_rollback().await,
            }
        });

        if let Some(observer) = &transaction.inner.observer {
            observer.created(&transaction);
            lock(&transaction.inner.notifications)
                .pending
                .push_back(Status::Active);
            transaction.notify();
        }
        Ok(transaction)
    }

    pub(crate) fn downgrade(&self) -> WeakTransaction {
        WeakTransaction(Arc::downgrade(&self.inner))
    }

    /// Returns the transaction identifier.
    pub fn xid(&self) -> &Xid {
        &self.inner.xid
    }

    /// Returns the identifier of the transaction this branch was created from.
    pub fn parent_xid(&self) -> Option<&Xid> {
        self.inner.parent.as_ref()
    }

    /// Returns the current status.
    pub fn status(&self) -> Status {
        *self.inner.status.borrow()
    }

    /// Returns `true` once the transaction was marked for rollback.
    pub fn rollback_only(&self) -> bool {
        self.inner.rollback_only.load(Ordering::SeqCst)
    }

    /// Returns `true` while suspended.
    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::SeqCst)
    }

    /// Returns `true` once this branch has been joined into another transaction.
    pub fn is_joined(&self) -> bool {
        self.inner.joined.load(Ordering::SeqCst)
    }

    /// Returns the absolute deadline.
    pub fn expires(&self) -> Instant {
        self.inner.expires
    }

    /// Returns the time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.inner.expires.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.inner.expires
    }

    /// Returns the branches created directly from this transaction.
    pub fn branches(&self) -> Vec<Transaction> {
        lock(&self.inner.branches).clone()
    }

    /// Waits until the transaction reaches a terminal status.
    pub async fn wait_for_completion(&self) -> Status {
        let mut receiver = self.inner.status.subscribe();
        let status = match receiver.wait_for(Status::is_terminal).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        };
        status
    }

    fn update_status(&self, status: Status) -> bool {
        self.transition(|current| (current != status).then_some(status))
    }

    /// Moves to the status chosen by `next` from the current one, if any.
    ///
    /// `next` runs under the transition lock. The observer is called after
    /// the lock is released, so it may itself change the status; changes
    /// reach it in the order they happened.
    fn transition(&self, next: impl FnOnce(Status) -> Option<Status>) -> bool {
        {
            let _ordered = lock(&self.inner.transitions);
            let mut entered = None;
            self.inner.status.send_if_modified(|current| match next(*current) {
                Some(status) => {
                    *current = status;
                    entered = Some(status);
                    true
                }
                None => false,
            });
            let Some(status) = entered else {
                return false;
            };
            tracing::trace!(xid = %self.inner.xid, %status, "status");
            if self.inner.observer.is_some() {
                lock(&self.inner.notifications).pending.push_back(status);
            }
        }
        self.notify();
        true
    }

    /// Delivers queued status changes unless another caller already is.
    fn notify(&self) {
        let Some(observer) = &self.inner.observer else {
            return;
        };
        {
            let mut notifications = lock(&self.inner.notifications);
            if notifications.draining {
                return;
            }
            notifications.draining = true;
        }
        loop {
            let status = {
                let mut notifications = lock(&self.inner.notifications);
                match notifications.pending.pop_front() {
                    Some(status) => status,
                    None => {
                        notifications.draining = false;
                        return;
                    }
                }
            };
            observer.status_changed(self, status);
        }
    }

    fn assert_status(&self, allowed: &[Status]) -> Result<()> {
        let status = self.status();
        if allowed.contains(&status) {
            return Ok(());
        }
        let expected: Vec<&str> = allowed.iter().map(Status::name).collect();
        Err(TransactionError::illegal_state(format!(
            "{} is {}, expected one of {}",
            self.xid(),
            status,
            expected.join(" ")
        )))
    }

    fn check_expired(&self) -> Result<()> {
        if self.is_expired() {
            return Err(TransactionError::illegal_state_caused(
                format!("{} has passed its deadline", self.xid()),
                TransactionError::timeout(self.xid()),
            ));
        }
        Ok(())
    }

    fn check_for_rollback(&self) -> Result<()> {
        let status = self.status();
        if matches!(status, Status::MarkedRollback | Status::RolledBack) {
            return Err(TransactionError::rollback(
                format!("{} is {}", self.xid(), status),
                None,
            ));
        }
        Ok(())
    }

    fn check_scratch_access(&self) -> Result<()> {
        self.assert_status(&[Status::Active])?;
        if self.is_suspended() {
            return Err(TransactionError::illegal_state(format!(
                "{} is suspended",
                self.xid()
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Scratch resources and synchronizations
    // ========================================================================

    /// Looks up a scratch value.
    ///
    /// Only permitted while ACTIVE and not suspended.
    pub fn get_resource(&self, key: &str) -> Result<Option<TransactionResource>> {
        self.check_scratch_access()?;
        Ok(lock(&self.inner.resources).get(key).cloned())
    }

    /// Stores a scratch value, or removes it when `value` is `None`.
    ///
    /// Only permitted while ACTIVE and not suspended.
    pub fn put_resource(&self, key: impl Into<String>, value: Option<TransactionResource>) -> Result<()> {
        self.check_scratch_access()?;
        let mut resources = lock(&self.inner.resources);
        match value {
            Some(value) => {
                resources.insert(key.into(), value);
            }
            None => {
                resources.remove(&key.into());
            }
        }
        Ok(())
    }

    /// Registers a completion callback.
    pub async fn register_synchronization(&self, sync: Arc<dyn Synchronization>) -> Result<()> {
        self.check_for_rollback()?;
        let mut state = self.inner.state.lock().await;
        self.assert_status(&[Status::Active])?;
        state.synchronizations.push_back(sync);
        Ok(())
    }

    /// Registers a completion callback that runs after the plain ones before
    /// completion, and before them after completion.
    pub async fn register_interposed_synchronization(
        &self,
        sync: Arc<dyn Synchronization>,
    ) -> Result<()> {
        self.check_for_rollback()?;
        let mut state = self.inner.state.lock().await;
        self.assert_status(&[Status::Active])?;
        state.interposed.push_back(sync);
        Ok(())
    }

    /// Marks the transaction so the only possible outcome is rollback.
    ///
    /// Does not wait for the completion lock and may be called from
    /// [`Synchronization::before_completion`] or a status listener. The mark
    /// and the move to PREPARING are ordered by the transition lock: a mark
    /// that succeeds always stops a commit that has not reached PREPARING,
    /// and once PREPARING is reached the mark is refused with `IllegalState`.
    pub fn set_rollback_only(&self) -> Result<()> {
        let mut refused = None;
        self.transition(|current| match current {
            Status::Active => {
                self.inner.rollback_only.store(true, Ordering::SeqCst);
                Some(Status::MarkedRollback)
            }
            Status::MarkedRollback | Status::RollingBack => {
                self.inner.rollback_only.store(true, Ordering::SeqCst);
                None
            }
            other => {
                refused = Some(other);
                None
            }
        });
        if let Some(status) = refused {
            return Err(TransactionError::illegal_state(format!(
                "{} is {}",
                self.xid(),
                status
            )));
        }
        tracing::debug!(xid = %self.xid(), "rollback-only");
        Ok(())
    }

    // ========================================================================
    // Resource enlistment
    // ========================================================================

    /// Associates a resource with this transaction.
    ///
    /// Returns `false` if the resource instance is already associated. While
    /// the transaction is suspended the physical start is deferred until
    /// [`resume`](Self::resume).
    pub async fn enlist_resource(&self, resource: Arc<dyn XaResource>) -> Result<bool> {
        self.check_expired()?;
        let mut state = self.inner.state.lock().await;
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;
        self.enlist_locked(&mut state, resource).await
    }

    async fn enlist_locked(&self, state: &mut State, resource: Arc<dyn XaResource>) -> Result<bool> {
        if let Some(index) = state.position(resource.as_ref()) {
            let flags = match state.enlisted[index].association {
                Association::Active | Association::Deferred => return Ok(false),
                _ if self.is_suspended() => return Ok(false),
                Association::Suspended => XA_TMRESUME,
                Association::Ended(XA_TMFAIL) => {
                    return Err(TransactionError::illegal_state(format!(
                        "{} resource was delisted with TMFAIL",
                        self.xid()
                    )))
                }
                Association::Ended(_) => XA_TMJOIN,
            };
            self.start(&resource, flags)
                .await
                .map_err(|e| self.start_failed(e.into()))?;
            state.enlisted[index].association = Association::Active;
            return Ok(true);
        }

        if self.is_suspended() {
            tracing::trace!(xid = %self.xid(), op = "enlist:deferred");
            state.enlisted.push(Enlistment {
                resource,
                association: Association::Deferred,
                joined: false,
            });
            return Ok(true);
        }

        let joined = state.shares_manager(resource.as_ref());
        self.start_new(&resource, joined)
            .await
            .map_err(|e| self.start_failed(e))?;
        state.enlisted.push(Enlistment {
            resource,
            association: Association::Active,
            joined,
        });
        Ok(true)
    }

    fn start_failed(&self, cause: TransactionError) -> TransactionError {
        TransactionError::illegal_state_caused(format!("{} failed to start resource", self.xid()), cause)
    }

    async fn start_new(&self, resource: &Arc<dyn XaResource>, join: bool) -> Result<()> {
        let timeout = resource.set_transaction_timeout(self.remaining()).await;
        let flags = if join { XA_TMJOIN } else { XA_TMNOFLAGS };
        match self.start(resource, flags).await {
            Ok(()) => {
                if let Err(error) = timeout {
                    tracing::info!(xid = %self.xid(), %error, "set transaction timeout failed");
                }
                Ok(())
            }
            Err(error) => {
                let mut error = TransactionError::from(error);
                if let Err(timeout_error) = timeout {
                    error.add_suppressed(timeout_error.into());
                }
                Err(error)
            }
        }
    }

    async fn start(&self, resource: &Arc<dyn XaResource>, flags: i32) -> std::result::Result<(), XaError> {
        tracing::trace!(xid = %self.xid(), op = "enlist", flags = flag_name(flags));
        resource.start(self.xid(), flags).await
    }

    async fn end(&self, resource: &Arc<dyn XaResource>, flags: i32) -> std::result::Result<(), XaError> {
        tracing::trace!(xid = %self.xid(), op = "delist", flags = flag_name(flags));
        resource.end(self.xid(), flags).await
    }

    /// Ends a resource's association with `flag` (TMSUCCESS, TMFAIL or TMSUSPEND).
    ///
    /// Returns `false` if the resource is not associated or was already
    /// delisted with the same flag. Resources ended with TMSUCCESS or TMFAIL
    /// still take part in completion.
    pub async fn delist_resource(&self, resource: &dyn XaResource, flag: i32) -> Result<bool> {
        if !matches!(flag, XA_TMSUCCESS | XA_TMFAIL | XA_TMSUSPEND) {
            return Err(TransactionError::illegal_argument(format!(
                "invalid delist flag {flag:#x}"
            )));
        }
        let mut state = self.inner.state.lock().await;
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;

        let Some(index) = state.position(resource) else {
            return Ok(false);
        };
        match (state.enlisted[index].association, flag) {
            (Association::Ended(ended), _) if ended == flag => Ok(false),
            (Association::Ended(ended), _) => Err(TransactionError::illegal_state(format!(
                "{} resource already delisted with {}",
                self.xid(),
                flag_name(ended)
            ))),
            (Association::Suspended | Association::Deferred, XA_TMSUSPEND) => Ok(false),
            (Association::Deferred, _) => {
                state.enlisted.remove(index);
                Ok(true)
            }
            (Association::Active | Association::Suspended, _) => {
                let resource = Arc::clone(&state.enlisted[index].resource);
                self.end(&resource, flag).await.map_err(|e| {
                    TransactionError::illegal_state_caused(
                        format!("{} failed to delist resource", self.xid()),
                        e.into(),
                    )
                })?;
                state.enlisted[index].association = if flag == XA_TMSUSPEND {
                    Association::Suspended
                } else {
                    Association::Ended(flag)
                };
                Ok(true)
            }
        }
    }

    // ========================================================================
    // Suspend, resume and join
    // ========================================================================

    /// Suspends every actively associated resource.
    ///
    /// Status does not change. The scratch map is inaccessible until
    /// [`resume`](Self::resume).
    pub async fn suspend(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;
        if self.inner.suspended.swap(true, Ordering::SeqCst) {
            return Err(TransactionError::illegal_state(format!(
                "{} is already suspended",
                self.xid()
            )));
        }

        let mut errors = ErrorCollector::default();
        for entry in state.enlisted.iter_mut() {
            if entry.association != Association::Active {
                continue;
            }
            match self.end(&entry.resource, XA_TMSUSPEND).await {
                Ok(()) => entry.association = Association::Suspended,
                Err(error) => errors.push(error.into()),
            }
        }
        tracing::debug!(xid = %self.xid(), "suspend");
        errors.into_result().map_err(|cause| {
            TransactionError::illegal_state_caused(format!("{} failed to suspend", self.xid()), cause)
        })
    }

    /// Resumes suspended resources and starts resources enlisted while suspended.
    pub async fn resume(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;
        if !self.inner.suspended.swap(false, Ordering::SeqCst) {
            return Err(TransactionError::illegal_state(format!(
                "{} is not suspended",
                self.xid()
            )));
        }

        let mut errors = ErrorCollector::default();
        for index in 0..state.enlisted.len() {
            let resource = Arc::clone(&state.enlisted[index].resource);
            match state.enlisted[index].association {
                Association::Suspended => match self.start(&resource, XA_TMRESUME).await {
                    Ok(()) => state.enlisted[index].association = Association::Active,
                    Err(error) => errors.push(error.into()),
                },
                Association::Deferred => {
                    let joined = state.shares_manager(resource.as_ref());
                    match self.start_new(&resource, joined).await {
                        Ok(()) => {
                            let entry = &mut state.enlisted[index];
                            entry.association = Association::Active;
                            entry.joined = joined;
                        }
                        Err(error) => errors.push(error),
                    }
                }
                Association::Active | Association::Ended(_) => {}
            }
        }
        tracing::debug!(xid = %self.xid(), "resume");
        errors.into_result().map_err(|cause| {
            TransactionError::illegal_state_caused(format!("{} failed to resume", self.xid()), cause)
        })
    }

    /// Merges `branch` into this transaction.
    ///
    /// The branch's synchronizations are told [`Status::NoTransaction`] and
    /// move here; its resources are ended with TMSUCCESS on the branch and
    /// enlisted here. The branch stays ACTIVE and is skipped when an ancestor
    /// completes until it is completed on its own.
    ///
    /// Locks this transaction, then `branch`.
    pub async fn join(&self, branch: &Transaction) -> Result<()> {
        if self == branch || !self.xid().same_global_transaction(branch.xid()) {
            return Err(TransactionError::illegal_argument(format!(
                "{} cannot join {}",
                branch.xid(),
                self.xid()
            )));
        }
        self.check_expired()?;

        let mut state = self.inner.state.lock().await;
        let mut merged = branch.inner.state.lock().await;
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;
        branch.assert_status(&[Status::Active])?;
        if branch.inner.joined.swap(true, Ordering::SeqCst) {
            return Err(TransactionError::illegal_state(format!(
                "{} was already joined",
                branch.xid()
            )));
        }
        branch.inner.timer.cancel();
        branch.inner.suspended.store(false, Ordering::SeqCst);

        let mut errors = ErrorCollector::default();
        for sync in merged.synchronizations.drain(..) {
            errors.push_result(sync.after_completion(Status::NoTransaction));
            state.synchronizations.push_back(sync);
        }
        for sync in merged.interposed.drain(..) {
            errors.push_result(sync.after_completion(Status::NoTransaction));
            state.interposed.push_back(sync);
        }
        for entry in std::mem::take(&mut merged.enlisted) {
            if matches!(entry.association, Association::Active | Association::Suspended) {
                if let Err(error) = branch.end(&entry.resource, XA_TMSUCCESS).await {
                    errors.push(error.into());
                }
            }
            if let Err(error) = self.enlist_locked(&mut state, entry.resource).await {
                errors.push(error);
            }
        }

        tracing::debug!(xid = %branch.xid(), into = %self.xid(), "join");
        errors.into_result().map_err(|cause| {
            TransactionError::illegal_state_caused(
                format!("{} failed to join {}", branch.xid(), self.xid()),
                cause,
            )
        })
    }

    /// Every branch below this one, parents before their children.
    fn descendants(&self) -> Vec<Transaction> {
        let mut pending = self.branches();
        let mut found = Vec::new();
        while let Some(branch) = pending.pop() {
            pending.extend(branch.branches());
            found.push(branch);
        }
        found
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("xid", &self.inner.xid.to_string())
            .field("status", &self.status())
            .field("rollback_only", &self.rollback_only())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.inner.xid, self.status())
    }
}
