//! XA flags, return codes and the resource adapter contract.
//!
//! Values follow the X/Open XA specification so that adapters wrapping
//! existing resource managers can pass codes through unchanged.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::xid::Xid;

// Flags for `start` and `end`.

/// Plain `start` of a new association.
pub const XA_TMNOFLAGS: i32 = 0x00000000;
/// `start` on a branch another resource of the same manager already holds,
/// or on a branch this resource ended with TMSUCCESS.
pub const XA_TMJOIN: i32 = 0x00200000;
/// `start` after an `end` with TMSUSPEND.
pub const XA_TMRESUME: i32 = 0x08000000;
/// `end` before commit; the work is kept.
pub const XA_TMSUCCESS: i32 = 0x04000000;
/// `end` before rollback; the branch may not be joined again.
pub const XA_TMFAIL: i32 = 0x20000000;
/// `end` that keeps the association resumable.
pub const XA_TMSUSPEND: i32 = 0x02000000;
/// Recovery scan start. Not issued by the coordinator.
pub const XA_TMSTARTRSCAN: i32 = 0x01000000;
/// Recovery scan end. Not issued by the coordinator.
pub const XA_TMENDRSCAN: i32 = 0x00800000;
/// One-phase commit. The coordinator always commits in two phases.
pub const XA_TMONEPHASE: i32 = 0x40000000;

// Prepare votes and heuristic outcomes.

/// Prepare vote: ready to commit.
pub const XA_OK: i32 = 0;
/// Prepare vote: nothing to commit, skip phase 2.
pub const XA_RDONLY: i32 = 3;
/// Transient failure; treated as a plain failure, never retried.
pub const XA_RETRY: i32 = 4;
/// Some work committed, some rolled back.
pub const XA_HEURMIX: i32 = 5;
/// The resource rolled back on its own.
pub const XA_HEURRB: i32 = 6;
/// The resource committed on its own.
pub const XA_HEURCOM: i32 = 7;
/// The outcome may have been decided by the resource and is unknown.
pub const XA_HEURHAZ: i32 = 8;
/// The association must be resumed where it was suspended.
pub const XA_NOMIGRATE: i32 = 9;

// Rollback codes: the resource has already rolled back.

/// First rollback code.
pub const XA_RBBASE: i32 = 100;
/// Rolled back, reason unknown.
pub const XA_RBROLLBACK: i32 = XA_RBBASE;
/// Rolled back after a communication failure.
pub const XA_RBCOMMFAIL: i32 = XA_RBBASE + 1;
/// Rolled back to break a deadlock.
pub const XA_RBDEADLOCK: i32 = XA_RBBASE + 2;
/// Rolled back on an integrity violation.
pub const XA_RBINTEGRITY: i32 = XA_RBBASE + 3;
/// Rolled back for some other reason.
pub const XA_RBOTHER: i32 = XA_RBBASE + 4;
/// Rolled back on a protocol error inside the resource.
pub const XA_RBPROTO: i32 = XA_RBBASE + 5;
/// Rolled back because the branch ran too long.
pub const XA_RBTIMEOUT: i32 = XA_RBBASE + 6;
/// Rolled back, a new transaction may succeed.
pub const XA_RBTRANSIENT: i32 = XA_RBBASE + 7;
/// Last rollback code.
pub const XA_RBEND: i32 = XA_RBTRANSIENT;

// Resource manager errors.

/// An asynchronous call is still outstanding.
pub const XAER_ASYNC: i32 = -2;
/// The resource failed while working on the branch.
pub const XAER_RMERR: i32 = -3;
/// Unknown xid; during rollback this means nothing is left to undo.
pub const XAER_NOTA: i32 = -4;
/// Bad arguments.
pub const XAER_INVAL: i32 = -5;
/// Call made in the wrong association state.
pub const XAER_PROTO: i32 = -6;
/// The resource manager is unreachable.
pub const XAER_RMFAIL: i32 = -7;
/// The xid is already in use.
pub const XAER_DUPID: i32 = -8;
/// The resource is doing work outside any global transaction.
pub const XAER_OUTSIDE: i32 = -9;

/// Describes an XA code by its symbolic name, e.g. `XA_HEURCOM`.
///
/// Unknown codes are rendered as `XA_<n>`.
pub fn describe_xa_code(code: i32) -> String {
    let name = match code {
        XA_OK => "XA_OK",
        XA_RDONLY => "XA_RDONLY",
        XA_RETRY => "XA_RETRY",
        XA_HEURMIX => "XA_HEURMIX",
        XA_HEURRB => "XA_HEURRB",
        XA_HEURCOM => "XA_HEURCOM",
        XA_HEURHAZ => "XA_HEURHAZ",
        XA_NOMIGRATE => "XA_NOMIGRATE",
        XA_RBROLLBACK => "XA_RBBASE",
        XA_RBCOMMFAIL => "XA_RBCOMMFAIL",
        XA_RBDEADLOCK => "XA_RBDEADLOCK",
        XA_RBINTEGRITY => "XA_RBINTEGRITY",
        XA_RBOTHER => "XA_RBOTHER",
        XA_RBPROTO => "XA_RBPROTO",
        XA_RBTIMEOUT => "XA_RBTIMEOUT",
        XA_RBTRANSIENT => "XA_RBTRANSIENT",
        XAER_ASYNC => "XAER_ASYNC",
        XAER_RMERR => "XAER_RMERR",
        XAER_NOTA => "XAER_NOTA",
        XAER_INVAL => "XAER_INVAL",
        XAER_PROTO => "XAER_PROTO",
        XAER_RMFAIL => "XAER_RMFAIL",
        XAER_DUPID => "XAER_DUPID",
        XAER_OUTSIDE => "XAER_OUTSIDE",
        _ => return format!("XA_{code}"),
    };
    name.to_string()
}

// ============================================================================
// XA Error
// ============================================================================

/// Failure reported by a resource adapter, carrying an XA code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", code_name(.code))]
pub struct XaError {
    code: i32,
    message: String,
}

fn code_name(code: &i32) -> String {
    describe_xa_code(*code)
}

impl XaError {
    /// Creates an error with the given code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an error whose message is the symbolic name of the code.
    pub fn from_code(code: i32) -> Self {
        Self::new(code, describe_xa_code(code))
    }

    /// Returns the XA code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Returns the adapter supplied message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` for codes in the `XA_RB*` range.
    pub fn is_rollback(&self) -> bool {
        (XA_RBBASE..=XA_RBEND).contains(&self.code)
    }

    /// Returns `true` for the heuristic outcome codes.
    pub fn is_heuristic(&self) -> bool {
        matches!(self.code, XA_HEURMIX | XA_HEURRB | XA_HEURCOM | XA_HEURHAZ)
    }

    /// Returns `true` if the call may be reissued.
    pub fn is_retry(&self) -> bool {
        self.code == XA_RETRY
    }
}

// ============================================================================
// XA Resource Trait
// ============================================================================

/// Contract for a resource manager participating in a transaction.
///
/// The coordinator holds adapters as `Arc<dyn XaResource>` and issues every
/// verb against an explicit [`Xid`]. Adapters must be safe to call from any
/// task; the coordinator never issues two verbs for the same transaction
/// concurrently.
#[async_trait]
pub trait XaResource: Send + Sync {
    /// Returns the identity of the underlying resource manager.
    ///
    /// Two adapters reporting the same id share transaction branches.
    fn resource_manager_id(&self) -> Uuid;

    /// Determines whether this adapter and `other` front the same resource manager.
    fn is_same_rm(&self, other: &dyn XaResource) -> bool {
        self.resource_manager_id() == other.resource_manager_id()
    }

    /// Propagates the remaining transaction time to the resource manager.
    ///
    /// Returns `false` if the resource manager does not support timeouts.
    async fn set_transaction_timeout(&self, timeout: Duration) -> Result<bool, XaError>;

    /// Starts work on behalf of a branch.
    ///
    /// `flags` is one of [`XA_TMNOFLAGS`], [`XA_TMJOIN`] or [`XA_TMRESUME`].
    async fn start(&self, xid: &Xid, flags: i32) -> Result<(), XaError>;

    /// Ends work on behalf of a branch.
    ///
    /// `flags` is one of [`XA_TMSUCCESS`], [`XA_TMFAIL`] or [`XA_TMSUSPEND`].
    async fn end(&self, xid: &Xid, flags: i32) -> Result<(), XaError>;

    /// Asks the resource manager to prepare, returning [`XA_OK`] or [`XA_RDONLY`].
    async fn prepare(&self, xid: &Xid) -> Result<i32, XaError>;

    /// Commits the branch.
    async fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError>;

    /// Rolls the branch back.
    async fn rollback(&self, xid: &Xid) -> Result<(), XaError>;

    /// Forgets a heuristically completed branch.
    async fn forget(&self, xid: &Xid) -> Result<(), XaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Flag and Code Tests
    // ========================================================================

    #[test]
    fn test_flags_are_distinct_bits() {
        let flags = [
            XA_TMJOIN,
            XA_TMRESUME,
            XA_TMSUCCESS,
            XA_TMFAIL,
            XA_TMSUSPEND,
            XA_TMSTARTRSCAN,
            XA_TMENDRSCAN,
            XA_TMONEPHASE,
        ];
        for (i, a) in flags.iter().enumerate() {
            assert_eq!(a.count_ones(), 1);
            for b in &flags[i + 1..] {
                assert_eq!(a & b, 0);
            }
        }
    }

    #[test]
    fn test_rollback_range() {
        assert_eq!(XA_RBBASE, 100);
        assert_eq!(XA_RBEND, 107);
        assert_eq!(XA_RBTIMEOUT, 106);
    }

    #[test]
    fn test_describe_xa_code() {
        assert_eq!(describe_xa_code(XA_RBBASE), "XA_RBBASE");
        assert_eq!(describe_xa_code(XA_HEURCOM), "XA_HEURCOM");
        assert_eq!(describe_xa_code(XAER_RMFAIL), "XAER_RMFAIL");
        assert_eq!(describe_xa_code(34), "XA_34");
    }

    // ========================================================================
    // XaError Tests
    // ========================================================================

    #[test]
    fn test_xa_error_display() {
        let err = XaError::new(XA_HEURMIX, "partial outcome");
        assert_eq!(err.to_string(), "XA_HEURMIX: partial outcome");
        assert_eq!(XaError::from_code(XAER_NOTA).message(), "XAER_NOTA");
    }

    #[test]
    fn test_xa_error_classification() {
        assert!(XaError::from_code(XA_RBDEADLOCK).is_rollback());
        assert!(!XaError::from_code(XA_RBBASE - 1).is_rollback());
        assert!(!XaError::from_code(XA_RBEND + 1).is_rollback());
        assert!(XaError::from_code(XA_HEURHAZ).is_heuristic());
        assert!(!XaError::from_code(XA_RDONLY).is_heuristic());
        assert!(XaError::from_code(XA_RETRY).is_retry());
    }

    // ========================================================================
    // XaResource Tests
    // ========================================================================

    struct Fixed(Uuid);

    #[async_trait]
    impl XaResource for Fixed {
        fn resource_manager_id(&self) -> Uuid {
            self.0
        }
        async fn set_transaction_timeout(&self, _: Duration) -> Result<bool, XaError> {
            Ok(false)
        }
        async fn start(&self, _: &Xid, _: i32) -> Result<(), XaError> {
            Ok(())
        }
        async fn end(&self, _: &Xid, _: i32) -> Result<(), XaError> {
            Ok(())
        }
        async fn prepare(&self, _: &Xid) -> Result<i32, XaError> {
            Ok(XA_OK)
        }
        async fn commit(&self, _: &Xid, _: bool) -> Result<(), XaError> {
            Ok(())
        }
        async fn rollback(&self, _: &Xid) -> Result<(), XaError> {
            Ok(())
        }
        async fn forget(&self, _: &Xid) -> Result<(), XaError> {
            Ok(())
        }
    }

    #[test]
    fn test_is_same_rm_compares_manager_ids() {
        let rm = Uuid::new_v4();
        let a = Fixed(rm);
        let b = Fixed(rm);
        let c = Fixed(Uuid::new_v4());
        assert!(a.is_same_rm(&b));
        assert!(!a.is_same_rm(&c));
    }
}
