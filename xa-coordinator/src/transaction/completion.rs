//! Commit and rollback protocols.

use std::collections::VecDeque;
use std::sync::Arc;

use xa_core::xa::{
    XAER_NOTA, XA_HEURCOM, XA_HEURHAZ, XA_HEURMIX, XA_HEURRB, XA_OK, XA_RDONLY, XA_TMFAIL,
    XA_TMSUCCESS,
};
use xa_core::{Result, Status, TransactionError, XaError, XaResource};

use super::{Association, State, Synchronization, Transaction};

// ============================================================================
// Error aggregation
// ============================================================================

/// Accumulates failures of one completion attempt.
///
/// The most specific error (heuristic, then rollback, then anything else;
/// earliest on ties) becomes the primary error and every other failure is
/// attached to it as suppressed detail. Secondary errors are attached only
/// when a primary error exists.
#[derive(Debug, Default)]
pub(crate) struct ErrorCollector {
    errors: Vec<TransactionError>,
    secondary: Vec<TransactionError>,
}

fn severity(error: &TransactionError) -> u8 {
    if error.is_heuristic() {
        2
    } else if error.is_rollback() {
        1
    } else {
        0
    }
}

impl ErrorCollector {
    pub(crate) fn push(&mut self, error: TransactionError) {
        self.errors.push(error);
    }

    pub(crate) fn push_result(&mut self, result: Result<()>) {
        if let Err(error) = result {
            self.push(error);
        }
    }

    pub(crate) fn push_secondary(&mut self, error: TransactionError) {
        self.secondary.push(error);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn into_result(self) -> Result<()> {
        let mut primary_index = None;
        let mut best = 0;
        for (index, error) in self.errors.iter().enumerate() {
            if primary_index.is_none() || severity(error) > best {
                primary_index = Some(index);
                best = severity(error);
            }
        }

        let Some(index) = primary_index else {
            for error in &self.secondary {
                tracing::warn!(%error, "ignored failure after successful completion");
            }
            return Ok(());
        };

        let mut errors = self.errors;
        let mut primary = errors.remove(index);
        for error in errors.into_iter().chain(self.secondary) {
            primary.add_suppressed(error);
        }
        Err(primary)
    }
}

// ============================================================================
// Protocol bookkeeping
// ============================================================================

/// Participants and callbacks taken out of the transaction state as the
/// protocol advances, so a failed commit can continue as a rollback.
#[derive(Default)]
struct Completion {
    synchronizations: Vec<Arc<dyn Synchronization>>,
    interposed: Vec<Arc<dyn Synchronization>>,
    delisted: VecDeque<Arc<dyn XaResource>>,
    prepared: VecDeque<Arc<dyn XaResource>>,
}

enum BranchOutcome {
    Committed,
    RolledBack,
    Merged,
}

impl Transaction {
    /// Commits this transaction and every branch below it.
    ///
    /// Branches are completed first, deepest first. Branches that were
    /// completed on their own keep their outcome; a branch that rolled back
    /// turns the result into a heuristic error and this transaction rolls
    /// back. Joined branches that are still active are skipped.
    ///
    /// Fails with `IllegalState` if the transaction already completed or its
    /// deadline has passed, with a rollback error if it rolled back instead,
    /// and with a heuristic error if participants disagree.
    pub async fn commit(&self) -> Result<()> {
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;
        self.check_expired()?;

        let intends_commit = !self.rollback_only();
        let mut errors = ErrorCollector::default();
        let (mut committed, mut rolled_back) = (false, false);
        for branch in self.descendants().into_iter().rev() {
            let commit = intends_commit && errors.is_empty();
            let (outcome, error) = branch.complete_branch(commit).await;
            match outcome {
                BranchOutcome::Committed => committed = true,
                BranchOutcome::RolledBack => rolled_back = true,
                BranchOutcome::Merged => {}
            }
            if let Some(error) = error {
                errors.push(error);
            }
        }
        if intends_commit && rolled_back {
            let message = format!("{} has rolled back branches", self.xid());
            errors.push(if committed {
                TransactionError::heuristic_mixed(message, None)
            } else {
                TransactionError::heuristic_rollback(message, None)
            });
        } else if !intends_commit && committed {
            let message = format!("{} has committed branches", self.xid());
            errors.push(if rolled_back {
                TransactionError::heuristic_mixed(message, None)
            } else {
                TransactionError::heuristic_commit(message, None)
            });
        }

        let mut state = self.inner.state.lock().await;
        if errors.is_empty() {
            // rollback-only is handled by the commit protocol itself
            return self.commit_locked(&mut state).await;
        }
        errors.push_result(self.rollback_locked(&mut state).await);
        errors.into_result()
    }

    /// Rolls back this transaction and every branch below it.
    ///
    /// A branch that already committed on its own turns the result into a
    /// heuristic commit, or heuristic mixed if others rolled back.
    pub async fn rollback(&self) -> Result<()> {
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;

        let mut errors = ErrorCollector::default();
        let (mut committed, mut rolled_back) = (false, false);
        for branch in self.descendants().into_iter().rev() {
            let (outcome, error) = branch.complete_branch(false).await;
            match outcome {
                BranchOutcome::Committed => committed = true,
                BranchOutcome::RolledBack => rolled_back = true,
                BranchOutcome::Merged => {}
            }
            if let Some(error) = error {
                errors.push(error);
            }
        }
        if committed {
            let message = format!("{} has committed branches", self.xid());
            errors.push(if rolled_back {
                TransactionError::heuristic_mixed(message, None)
            } else {
                TransactionError::heuristic_commit(message, None)
            });
        }

        let mut state = self.inner.state.lock().await;
        errors.push_result(self.rollback_locked(&mut state).await);
        errors.into_result()
    }

    async fn complete_branch(&self, commit: bool) -> (BranchOutcome, Option<TransactionError>) {
        let mut state = self.inner.state.lock().await;
        match self.status() {
            Status::Committed => return (BranchOutcome::Committed, None),
            Status::RolledBack => return (BranchOutcome::RolledBack, None),
            _ if self.is_joined() => return (BranchOutcome::Merged, None),
            _ => {}
        }

        let result = if commit {
            self.commit_locked(&mut state).await
        } else {
            self.rollback_locked(&mut state).await
        };
        let outcome = if self.status() == Status::Committed {
            BranchOutcome::Committed
        } else {
            BranchOutcome::RolledBack
        };
        (outcome, result.err())
    }

    pub(super) async fn timed_rollback(&self) {
        let mut state = self.inner.state.lock().await;
        if self.status().is_terminal() || self.is_joined() {
            return;
        }
        tracing::debug!(xid = %self.xid(), "deadline passed");
        if let Err(error) = self.rollback_locked(&mut state).await {
            tracing::warn!(xid = %self.xid(), %error, "timed rollback failure");
        }
    }

    async fn rollback_locked(&self, state: &mut State) -> Result<()> {
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;
        self.continue_rollback(state, Completion::default()).await
    }

    async fn commit_locked(&self, state: &mut State) -> Result<()> {
        self.assert_status(&[Status::Active, Status::MarkedRollback])?;

        if self.rollback_only() {
            let mut error =
                TransactionError::rollback(format!("{} is marked rollback-only", self.xid()), None);
            if let Err(rollback_error) = self.continue_rollback(state, Completion::default()).await {
                error.add_suppressed(rollback_error);
            }
            return Err(error);
        }

        self.inner.timer.cancel();
        let mut completion = Completion::default();
        match self.prepare_and_commit(state, &mut completion).await {
            Ok(mut errors) => {
                self.after_completion(&completion, Status::Committed, &mut errors);
                tracing::debug!(xid = %self.xid(), "commit");
                errors.into_result()
            }
            Err(cause) => {
                let mut error =
                    TransactionError::rollback(format!("{} failed to commit", self.xid()), Some(cause));
                if let Err(rollback_error) = self.continue_rollback(state, completion).await {
                    error.add_suppressed(rollback_error);
                }
                Err(error)
            }
        }
    }

    /// Runs the commit path up to COMMITTED.
    ///
    /// An `Err` means the transaction must roll back; phase 2 failures are
    /// returned in the collector because phase 2 always runs to completion.
    async fn prepare_and_commit(
        &self,
        state: &mut State,
        completion: &mut Completion,
    ) -> Result<ErrorCollector> {
        let xid = self.xid();

        tracing::trace!(%xid, op = "before-synch");
        while let Some(sync) = state.synchronizations.pop_front() {
            completion.synchronizations.push(Arc::clone(&sync));
            sync.before_completion()?;
        }
        while let Some(sync) = state.interposed.pop_front() {
            completion.interposed.push(Arc::clone(&sync));
            sync.before_completion()?;
        }
        if self.rollback_only() {
            return Err(TransactionError::illegal_state(format!(
                "{xid} was marked rollback-only before completion"
            )));
        }

        self.end_all(state, completion, XA_TMSUCCESS, false)
            .await
            .into_result()?;

        tracing::trace!(%xid, op = "commit-phase-1");
        if !self.transition(|current| (current == Status::Active).then_some(Status::Preparing)) {
            return Err(TransactionError::illegal_state(format!(
                "{xid} was marked rollback-only before prepare"
            )));
        }
        while let Some(resource) = completion.delisted.pop_front() {
            match resource.prepare(xid).await {
                Ok(XA_OK) => completion.prepared.push_back(resource),
                Ok(XA_RDONLY) => tracing::trace!(%xid, op = "prepare", vote = "XA_RDONLY"),
                Ok(vote) => {
                    completion.prepared.push_back(resource);
                    return Err(XaError::new(vote, "unexpected prepare vote").into());
                }
                Err(error) => {
                    if !error.is_rollback() {
                        completion.prepared.push_back(resource);
                    }
                    return Err(error.into());
                }
            }
        }
        self.update_status(Status::Prepared);

        tracing::trace!(%xid, op = "commit-phase-2");
        self.update_status(Status::Committing);
        let mut errors = ErrorCollector::default();
        while let Some(resource) = completion.prepared.pop_front() {
            self.commit_resource(&resource, &mut errors).await;
        }
        self.update_status(Status::Committed);
        Ok(errors)
    }

    async fn commit_resource(&self, resource: &Arc<dyn XaResource>, errors: &mut ErrorCollector) {
        let xid = self.xid();
        let Err(error) = resource.commit(xid, false).await else {
            return;
        };
        match error.code() {
            XA_RDONLY => {}
            XA_HEURCOM => {
                if let Err(forget_error) = self.forget(resource).await {
                    errors.push_secondary(forget_error.into());
                }
            }
            XA_HEURRB => {
                let error = TransactionError::heuristic_rollback(
                    format!("{xid} resource rolled back"),
                    Some(error.into()),
                );
                errors.push(self.forget_heuristic(resource, error).await);
            }
            XA_HEURMIX | XA_HEURHAZ => {
                let error = TransactionError::heuristic_mixed(
                    format!("{xid} resource reported {}", xa_core::describe_xa_code(error.code())),
                    Some(error.into()),
                );
                errors.push(self.forget_heuristic(resource, error).await);
            }
            _ => errors.push(TransactionError::rollback(
                format!("{xid} resource failed to commit"),
                Some(error.into()),
            )),
        }
    }

    async fn rollback_resource(&self, resource: &Arc<dyn XaResource>, errors: &mut ErrorCollector) {
        let xid = self.xid();
        let Err(error) = resource.rollback(xid).await else {
            return;
        };
        match error.code() {
            _ if error.is_rollback() => {}
            XAER_NOTA => {}
            XA_HEURRB => {
                if let Err(forget_error) = self.forget(resource).await {
                    errors.push_secondary(forget_error.into());
                }
            }
            XA_HEURCOM => {
                let error = TransactionError::heuristic_commit(
                    format!("{xid} resource committed"),
                    Some(error.into()),
                );
                errors.push(self.forget_heuristic(resource, error).await);
            }
            XA_HEURMIX | XA_HEURHAZ => {
                let error = TransactionError::heuristic_mixed(
                    format!("{xid} resource reported {}", xa_core::describe_xa_code(error.code())),
                    Some(error.into()),
                );
                errors.push(self.forget_heuristic(resource, error).await);
            }
            _ => errors.push(error.into()),
        }
    }

    async fn forget(&self, resource: &Arc<dyn XaResource>) -> std::result::Result<(), XaError> {
        tracing::trace!(xid = %self.xid(), op = "forget");
        resource.forget(self.xid()).await
    }

    async fn forget_heuristic(
        &self,
        resource: &Arc<dyn XaResource>,
        mut error: TransactionError,
    ) -> TransactionError {
        if let Err(forget_error) = self.forget(resource).await {
            error.add_suppressed(forget_error.into());
        }
        error
    }

    /// Ends every started association with `flag` and moves the branch
    /// owners into `completion`. Failures do not stop the remaining ends.
    async fn end_all(
        &self,
        state: &mut State,
        completion: &mut Completion,
        flag: i32,
        suspended_first: bool,
    ) -> ErrorCollector {
        let order = if suspended_first {
            [Association::Suspended, Association::Active]
        } else {
            [Association::Active, Association::Suspended]
        };

        let mut errors = ErrorCollector::default();
        for association in order {
            for entry in state.enlisted.iter().filter(|e| e.association == association) {
                if let Err(error) = self.end(&entry.resource, flag).await {
                    errors.push(error.into());
                }
            }
        }

        for entry in state.enlisted.drain(..) {
            match entry.association {
                Association::Deferred => {
                    tracing::trace!(xid = %self.xid(), op = "drop", reason = "never started");
                }
                _ if entry.joined => {}
                _ => completion.delisted.push_back(entry.resource),
            }
        }
        errors
    }

    async fn continue_rollback(&self, state: &mut State, mut completion: Completion) -> Result<()> {
        let xid = self.xid();
        self.inner.timer.cancel();
        self.inner
            .rollback_only
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.update_status(Status::MarkedRollback);

        completion.synchronizations.extend(state.synchronizations.drain(..));
        completion.interposed.extend(state.interposed.drain(..));
        let mut errors = self.end_all(state, &mut completion, XA_TMFAIL, true).await;

        tracing::trace!(%xid, op = "rollback");
        self.update_status(Status::RollingBack);
        let pending: Vec<_> = completion
            .prepared
            .drain(..)
            .chain(completion.delisted.drain(..))
            .collect();
        for resource in &pending {
            self.rollback_resource(resource, &mut errors).await;
        }
        self.update_status(Status::RolledBack);

        self.after_completion(&completion, Status::RolledBack, &mut errors);
        tracing::debug!(%xid, "rollback");
        errors.into_result()
    }

    fn after_completion(&self, completion: &Completion, status: Status, errors: &mut ErrorCollector) {
        tracing::trace!(xid = %self.xid(), op = "after-synch");
        for sync in completion.interposed.iter().chain(&completion.synchronizations) {
            errors.push_result(sync.after_completion(status));
        }
    }
}
