//! Transaction manager and the explicit transaction context.
//!
//! The manager never stores a "current" transaction itself. Callers own a
//! [`TransactionContext`] per logical unit of work (a task, a request) and pass
//! it to every call that needs the bound transaction. `begin` on a context that
//! already holds a transaction creates a branch and binds it on top; `commit`
//! and `rollback` unbind the top transaction before completing it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use xa_core::{Result, Status, TransactionError, Xid};

use crate::config::{TransactionManagerConfig, DEFAULT_TRANSACTION_TIMEOUT};
use crate::listener::{ListenerId, TransactionRegistry, TransactionSubscription};
use crate::transaction::{Synchronization, Transaction, TransactionObserver, TransactionResource};

/// Stack of transactions bound to one caller.
///
/// The top of the stack is the current transaction.
#[derive(Debug, Default)]
pub struct TransactionContext {
    stack: Vec<Transaction>,
}

impl TransactionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the currently bound transaction.
    pub fn current(&self) -> Option<&Transaction> {
        self.stack.last()
    }

    /// Returns how many transactions are bound.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns `true` if no transaction is bound.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub(crate) fn push(&mut self, transaction: Transaction) {
        self.stack.push(transaction);
    }

    pub(crate) fn pop(&mut self) -> Option<Transaction> {
        self.stack.pop()
    }

    pub(crate) fn clear(&mut self) {
        self.stack.clear();
    }
}

struct ManagerInner {
    timeout: RwLock<Duration>,
    registry: Arc<TransactionRegistry>,
}

/// Creates transactions, binds them to contexts and publishes their status
/// changes.
///
/// Clones share the same registry, listeners and timeout.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl TransactionManager {
    /// Creates a manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TransactionManagerConfig::default())
    }

    /// Creates a manager from `config`.
    pub fn with_config(config: TransactionManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                timeout: RwLock::new(config.default_timeout()),
                registry: Arc::new(TransactionRegistry::new(config.event_buffer_capacity())),
            }),
        }
    }

    /// Returns the timeout applied to new root transactions.
    pub fn timeout(&self) -> Duration {
        *self.inner.timeout.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the timeout for future root transactions; zero restores
    /// [`DEFAULT_TRANSACTION_TIMEOUT`].
    pub fn set_timeout(&self, timeout: Duration) {
        let timeout = if timeout.is_zero() {
            DEFAULT_TRANSACTION_TIMEOUT
        } else {
            timeout
        };
        *self.inner.timeout.write().unwrap_or_else(PoisonError::into_inner) = timeout;
        tracing::debug!(?timeout, "default transaction timeout");
    }

    /// Sets the timeout for future root transactions in seconds.
    pub fn set_transaction_timeout(&self, seconds: u32) {
        self.set_timeout(Duration::from_secs(u64::from(seconds)));
    }

    // ========================================================================
    // Demarcation
    // ========================================================================

    /// Starts a transaction and binds it to `ctx`.
    ///
    /// With nothing bound this is a root transaction using the manager's
    /// timeout; otherwise it is a branch of the bound transaction.
    pub fn begin(&self, ctx: &mut TransactionContext) -> Result<Transaction> {
        let transaction = match ctx.current() {
            Some(current) => current.branch()?,
            None => {
                let observer: Arc<dyn TransactionObserver> = self.inner.registry.clone();
                Transaction::root(self.timeout(), Some(observer))?
            }
        };
        ctx.push(transaction.clone());
        Ok(transaction)
    }

    /// Unbinds and commits the current transaction.
    pub async fn commit(&self, ctx: &mut TransactionContext) -> Result<()> {
        let transaction = Self::take(ctx)?;
        transaction.commit().await
    }

    /// Unbinds and rolls back the current transaction.
    pub async fn rollback(&self, ctx: &mut TransactionContext) -> Result<()> {
        let transaction = Self::take(ctx)?;
        transaction.rollback().await
    }

    /// Unbinds and suspends the current transaction, returning it.
    ///
    /// The transaction stays bound if suspension fails.
    pub async fn suspend(&self, ctx: &mut TransactionContext) -> Result<Transaction> {
        let transaction = Self::take(ctx)?;
        if let Err(error) = transaction.suspend().await {
            ctx.push(transaction);
            return Err(error);
        }
        Ok(transaction)
    }

    /// Resumes `transaction` and binds it to `ctx`.
    ///
    /// If a transaction is already bound it must belong to the same global
    /// transaction.
    pub async fn resume(&self, ctx: &mut TransactionContext, transaction: Transaction) -> Result<()> {
        if let Some(current) = ctx.current() {
            if !current.xid().same_global_transaction(transaction.xid()) {
                return Err(TransactionError::illegal_state(format!(
                    "cannot resume {} while {} is bound",
                    transaction.xid(),
                    current.xid()
                )));
            }
        }
        transaction.resume().await?;
        ctx.push(transaction);
        Ok(())
    }

    /// Unbinds every transaction from `ctx` without completing any.
    pub fn clear_thread_state(&self, ctx: &mut TransactionContext) {
        if !ctx.is_empty() {
            tracing::debug!(depth = ctx.depth(), "clearing bound transactions");
        }
        ctx.clear();
    }

    fn take(ctx: &mut TransactionContext) -> Result<Transaction> {
        ctx.pop()
            .ok_or_else(|| TransactionError::illegal_state("no transaction bound"))
    }

    fn bound(ctx: &TransactionContext) -> Result<&Transaction> {
        ctx.current()
            .ok_or_else(|| TransactionError::illegal_state("no transaction bound"))
    }

    // ========================================================================
    // Accessors for the bound transaction
    // ========================================================================

    /// Returns the bound transaction.
    pub fn transaction(&self, ctx: &TransactionContext) -> Option<Transaction> {
        ctx.current().cloned()
    }

    /// Returns the identifier of the bound transaction.
    pub fn transaction_key(&self, ctx: &TransactionContext) -> Option<Xid> {
        ctx.current().map(|tx| tx.xid().clone())
    }

    /// Returns the status of the bound transaction, or
    /// [`Status::NoTransaction`].
    pub fn status(&self, ctx: &TransactionContext) -> Status {
        ctx.current().map_or(Status::NoTransaction, Transaction::status)
    }

    /// Marks the bound transaction rollback-only.
    pub fn set_rollback_only(&self, ctx: &TransactionContext) -> Result<()> {
        Self::bound(ctx)?.set_rollback_only()
    }

    /// Returns whether the bound transaction is marked rollback-only.
    pub fn get_rollback_only(&self, ctx: &TransactionContext) -> Result<bool> {
        Ok(Self::bound(ctx)?.rollback_only())
    }

    /// Stores a scratch value on the bound transaction.
    pub fn put_resource(
        &self,
        ctx: &TransactionContext,
        key: impl Into<String>,
        value: Option<TransactionResource>,
    ) -> Result<()> {
        Self::bound(ctx)?.put_resource(key, value)
    }

    /// Looks up a scratch value on the bound transaction.
    pub fn get_resource(&self, ctx: &TransactionContext, key: &str) -> Result<Option<TransactionResource>> {
        Self::bound(ctx)?.get_resource(key)
    }

    /// Registers an interposed synchronization on the bound transaction.
    pub async fn register_interposed_synchronization(
        &self,
        ctx: &TransactionContext,
        sync: Arc<dyn Synchronization>,
    ) -> Result<()> {
        Self::bound(ctx)?.register_interposed_synchronization(sync).await
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Calls `visitor` for each live transaction this manager created until it
    /// returns `Some`.
    pub fn visit<V>(&self, visitor: impl FnMut(&Transaction) -> Option<V>) -> Option<V> {
        self.inner.registry.visit(visitor)
    }

    /// Registers a callback run synchronously on every status change.
    ///
    /// The callback runs on the task performing the transition, after the
    /// status has changed and outside the transaction's locks. It may call
    /// `set_rollback_only` but must not complete or enlist on the transaction
    /// it is given.
    pub fn listen<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Transaction) + Send + Sync + 'static,
    {
        self.inner.registry.add_listener(Arc::new(listener))
    }

    /// Removes a callback registered with [`listen`](Self::listen).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.registry.remove_listener(id)
    }

    /// Returns a feed of status changes from now on.
    pub fn subscribe(&self) -> TransactionSubscription {
        self.inner.registry.subscribe()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}
