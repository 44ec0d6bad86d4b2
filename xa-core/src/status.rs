//! Transaction status values.

use std::fmt;

/// Status of a transaction as observed by the coordinator.
///
/// Numeric codes follow the JTA status constants so they can be exchanged
/// with resource adapters and monitoring tools that expect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Work may be performed and resources enlisted.
    Active,
    /// The transaction can only be rolled back.
    MarkedRollback,
    /// Every participant voted to commit.
    Prepared,
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
    /// The status cannot be determined.
    Unknown,
    /// No transaction is associated with the caller.
    NoTransaction,
    /// Participants are being asked to prepare.
    Preparing,
    /// Participants are being asked to commit.
    Committing,
    /// Participants are being asked to roll back.
    RollingBack,
}

impl Status {
    /// Returns the JTA status code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Active => 0,
            Self::MarkedRollback => 1,
            Self::Prepared => 2,
            Self::Committed => 3,
            Self::RolledBack => 4,
            Self::Unknown => 5,
            Self::NoTransaction => 6,
            Self::Preparing => 7,
            Self::Committing => 8,
            Self::RollingBack => 9,
        }
    }

    /// Maps a JTA status code back to a status.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Active,
            1 => Self::MarkedRollback,
            2 => Self::Prepared,
            3 => Self::Committed,
            4 => Self::RolledBack,
            5 => Self::Unknown,
            6 => Self::NoTransaction,
            7 => Self::Preparing,
            8 => Self::Committing,
            9 => Self::RollingBack,
            _ => return None,
        })
    }

    /// Returns the symbolic name, e.g. `STATUS_ACTIVE`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "STATUS_ACTIVE",
            Self::MarkedRollback => "STATUS_MARKED_ROLLBACK",
            Self::Prepared => "STATUS_PREPARED",
            Self::Committed => "STATUS_COMMITTED",
            Self::RolledBack => "STATUS_ROLLEDBACK",
            Self::Unknown => "STATUS_UNKNOWN",
            Self::NoTransaction => "STATUS_NO_TRANSACTION",
            Self::Preparing => "STATUS_PREPARING",
            Self::Committing => "STATUS_COMMITTING",
            Self::RollingBack => "STATUS_ROLLING_BACK",
        }
    }

    /// Returns `true` once the transaction reached COMMITTED or ROLLEDBACK.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Returns `true` while a completion protocol is running.
    pub fn is_completing(&self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::Prepared | Self::Committing | Self::RollingBack
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Describes a raw status code, falling back to `STATUS_X<n>` for unknown codes.
pub fn describe_status(code: i32) -> String {
    match Status::from_code(code) {
        Some(status) => status.name().to_string(),
        None => format!("STATUS_X{code}"),
    }
}
