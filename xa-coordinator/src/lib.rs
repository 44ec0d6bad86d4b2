//! In-process XA two-phase-commit transaction coordinator.
//!
//! A [`Transaction`] drives any number of enlisted [`XaResource`] adapters
//! through prepare and commit (or rollback), with branches sharing one
//! global transaction id, completion callbacks, and an automatic rollback
//! once the deadline passes. A [`TransactionManager`] binds transactions to
//! an explicit [`TransactionContext`], turns nested `begin` calls into
//! branches and publishes every status change to listeners and subscribers.
//!
//! # Example
//!
//! ```ignore
//! use xa_coordinator::{TransactionContext, TransactionManager};
//!
//! let manager = TransactionManager::new();
//! let mut ctx = TransactionContext::new();
//!
//! let tx = manager.begin(&mut ctx)?;
//! tx.enlist_resource(orders.clone()).await?;
//! tx.enlist_resource(ledger.clone()).await?;
//! manager.commit(&mut ctx).await?;
//! ```
//!
//! The engine needs a Tokio runtime: each transaction schedules its timed
//! rollback as a task.

#![warn(missing_docs)]

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod config_file;
pub mod listener;
pub mod manager;
pub mod transaction;

pub use config::{ConfigError, TransactionManagerConfig, TransactionManagerConfigBuilder};
pub use config_file::FileConfig;
pub use listener::{ListenerId, TransactionEvent, TransactionSubscription};
pub use manager::{TransactionContext, TransactionManager};
pub use transaction::{Synchronization, Transaction, TransactionResource};
pub use xa_core::{
    async_trait, describe_status, describe_xa_code, xa, Result, Status, TransactionError,
    XaError, XaResource, Xid,
};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
