//! Error types for transaction operations.
//!
//! Every variant carries a list of suppressed errors: secondary failures that
//! happened while handling the primary one (a rollback that failed after a
//! failed commit, a `forget` that failed after a heuristic outcome). They are
//! kept for diagnostics and never replace the primary error.

use thiserror::Error;

use crate::xa::XaError;

/// The main error type for transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Operation not permitted in the current status.
    #[error("illegal state: {message}")]
    IllegalState {
        /// What was attempted.
        message: String,
        /// Underlying failure, if any.
        #[source]
        cause: Option<Box<TransactionError>>,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// Invalid input, such as a zero timeout or a mismatched global id.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// What was wrong.
        message: String,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// The transaction rolled back instead of committing.
    #[error("rolled back: {message}")]
    Rollback {
        /// Where the rollback was decided.
        message: String,
        /// Failure that forced the rollback.
        #[source]
        cause: Option<Box<TransactionError>>,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// Some or all work was rolled back although commit was decided.
    #[error("heuristic rollback: {message}")]
    HeuristicRollback {
        /// Which participant reported the outcome.
        message: String,
        /// Originating resource or branch failure.
        #[source]
        cause: Option<Box<TransactionError>>,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// Some or all work was committed although rollback was decided.
    #[error("heuristic commit: {message}")]
    HeuristicCommit {
        /// Which participant reported the outcome.
        message: String,
        /// Originating resource or branch failure.
        #[source]
        cause: Option<Box<TransactionError>>,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// Participants reached different outcomes.
    #[error("heuristic mixed: {message}")]
    HeuristicMixed {
        /// Which participant reported the outcome.
        message: String,
        /// Originating resource or branch failure.
        #[source]
        cause: Option<Box<TransactionError>>,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// The transaction passed its deadline.
    #[error("{xid} expired")]
    Timeout {
        /// Text form of the expired transaction's id.
        xid: String,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// A resource adapter reported an XA failure.
    #[error("resource error: {source}")]
    Resource {
        /// The adapter's error.
        #[source]
        source: XaError,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },

    /// A synchronization callback failed.
    #[error("synchronization failure: {message}")]
    Synchronization {
        /// The callback's description of the failure.
        message: String,
        /// Secondary failures.
        suppressed: Vec<TransactionError>,
    },
}

fn boxed(cause: Option<TransactionError>) -> Option<Box<TransactionError>> {
    cause.map(Box::new)
}

impl TransactionError {
    /// Creates an [`IllegalState`](Self::IllegalState) error without a cause.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
            cause: None,
            suppressed: Vec::new(),
        }
    }

    /// Creates an [`IllegalState`](Self::IllegalState) error caused by `cause`.
    pub fn illegal_state_caused(message: impl Into<String>, cause: TransactionError) -> Self {
        Self::IllegalState {
            message: message.into(),
            cause: Some(Box::new(cause)),
            suppressed: Vec::new(),
        }
    }

    /// Creates an [`IllegalArgument`](Self::IllegalArgument) error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
            suppressed: Vec::new(),
        }
    }

    /// Creates a [`Rollback`](Self::Rollback) error.
    pub fn rollback(message: impl Into<String>, cause: Option<TransactionError>) -> Self {
        Self::Rollback {
            message: message.into(),
            cause: boxed(cause),
            suppressed: Vec::new(),
        }
    }

    /// Creates a [`HeuristicRollback`](Self::HeuristicRollback) error.
    pub fn heuristic_rollback(message: impl Into<String>, cause: Option<TransactionError>) -> Self {
        Self::HeuristicRollback {
            message: message.into(),
            cause: boxed(cause),
            suppressed: Vec::new(),
        }
    }

    /// Creates a [`HeuristicCommit`](Self::HeuristicCommit) error.
    pub fn heuristic_commit(message: impl Into<String>, cause: Option<TransactionError>) -> Self {
        Self::HeuristicCommit {
            message: message.into(),
            cause: boxed(cause),
            suppressed: Vec::new(),
        }
    }

    /// Creates a [`HeuristicMixed`](Self::HeuristicMixed) error.
    pub fn heuristic_mixed(message: impl Into<String>, cause: Option<TransactionError>) -> Self {
        Self::HeuristicMixed {
            message: message.into(),
            cause: boxed(cause),
            suppressed: Vec::new(),
        }
    }

    /// Creates a [`Timeout`](Self::Timeout) error for the given transaction id.
    pub fn timeout(xid: impl ToString) -> Self {
        Self::Timeout {
            xid: xid.to_string(),
            suppressed: Vec::new(),
        }
    }

    /// Creates a [`Synchronization`](Self::Synchronization) error.
    pub fn synchronization(message: impl Into<String>) -> Self {
        Self::Synchronization {
            message: message.into(),
            suppressed: Vec::new(),
        }
    }

    fn suppressed_mut(&mut self) -> &mut Vec<TransactionError> {
        match self {
            Self::IllegalState { suppressed, .. }
            | Self::IllegalArgument { suppressed, .. }
            | Self::Rollback { suppressed, .. }
            | Self::HeuristicRollback { suppressed, .. }
            | Self::HeuristicCommit { suppressed, .. }
            | Self::HeuristicMixed { suppressed, .. }
            | Self::Timeout { suppressed, .. }
            | Self::Resource { suppressed, .. }
            | Self::Synchronization { suppressed, .. } => suppressed,
        }
    }

    /// Attaches a secondary failure.
    pub fn add_suppressed(&mut self, error: TransactionError) {
        self.suppressed_mut().push(error);
    }

    /// Attaches a secondary failure, returning `self`.
    pub fn with_suppressed(mut self, error: TransactionError) -> Self {
        self.add_suppressed(error);
        self
    }

    /// Returns the secondary failures in the order they occurred.
    pub fn suppressed(&self) -> &[TransactionError] {
        match self {
            Self::IllegalState { suppressed, .. }
            | Self::IllegalArgument { suppressed, .. }
            | Self::Rollback { suppressed, .. }
            | Self::HeuristicRollback { suppressed, .. }
            | Self::HeuristicCommit { suppressed, .. }
            | Self::HeuristicMixed { suppressed, .. }
            | Self::Timeout { suppressed, .. }
            | Self::Resource { suppressed, .. }
            | Self::Synchronization { suppressed, .. } => suppressed,
        }
    }

    /// Returns the underlying transaction failure, if this error wraps one.
    pub fn cause(&self) -> Option<&TransactionError> {
        match self {
            Self::IllegalState { cause, .. }
            | Self::Rollback { cause, .. }
            | Self::HeuristicRollback { cause, .. }
            | Self::HeuristicCommit { cause, .. }
            | Self::HeuristicMixed { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` for [`Rollback`](Self::Rollback).
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }

    /// Returns `true` for the heuristic outcome variants.
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            Self::HeuristicRollback { .. } | Self::HeuristicCommit { .. } | Self::HeuristicMixed { .. }
        )
    }

    /// Returns `true` for [`IllegalState`](Self::IllegalState).
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }

    /// Returns the XA code if this error wraps a resource failure.
    pub fn xa_code(&self) -> Option<i32> {
        match self {
            Self::Resource { source, .. } => Some(source.code()),
            _ => None,
        }
    }
}

impl From<XaError> for TransactionError {
    fn from(source: XaError) -> Self {
        Self::Resource {
            source,
            suppressed: Vec::new(),
        }
    }
}

/// A specialized `Result` type for transaction operations.
pub type Result<T> = std::result::Result<T, TransactionError>;
