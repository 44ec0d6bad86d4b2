//! Completion callbacks.

use xa_core::{Result, Status};

/// Callback notified around transaction completion.
///
/// `before_completion` runs only on the commit path, before any resource is
/// asked to prepare; a failure there forces rollback. `after_completion`
/// runs once the transaction reaches a terminal status, or with
/// [`Status::NoTransaction`] when a branch is merged into its parent by a
/// join.
///
/// Callbacks run while the transaction's completion lock is held, so they
/// must not commit, roll back, enlist into or register on the same
/// transaction. Reading its status and calling
/// [`set_rollback_only`](crate::Transaction::set_rollback_only) are safe.
pub trait Synchronization: Send + Sync {
    /// Invoked before the commit protocol starts.
    fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after the transaction completed with `status`.
    fn after_completion(&self, status: Status) -> Result<()> {
        let _ = status;
        Ok(())
    }
}
