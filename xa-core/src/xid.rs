//! Transaction identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransactionError};
use crate::id;

/// Format identifier stamped on every [`Xid`] generated by this crate.
pub const XID_FORMAT_ID: i32 = 63224;

/// Prefix of the textual form.
pub const XID_TAG: &str = "xid";

/// XA transaction identifier.
///
/// The global transaction id is shared by a root transaction and all of its
/// branches; the branch qualifier is unique per transaction. Generated ids
/// are verifiable (see [`crate::id`]) and render as
/// `xid-<format id>+<global id>+<branch qualifier>` with both ids in base32.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl Xid {
    /// Maximum length for global transaction ID.
    pub const MAXGTRIDSIZE: usize = 64;
    /// Maximum length for branch qualifier.
    pub const MAXBQUALSIZE: usize = 64;

    /// Creates an identifier from explicit parts.
    ///
    /// Fails with `IllegalArgument` if either part exceeds its maximum size.
    pub fn new(
        format_id: i32,
        global_transaction_id: &[u8],
        branch_qualifier: &[u8],
    ) -> Result<Self> {
        if global_transaction_id.len() > Self::MAXGTRIDSIZE {
            return Err(TransactionError::illegal_argument(format!(
                "global transaction id exceeds maximum size of {} bytes",
                Self::MAXGTRIDSIZE
            )));
        }
        if branch_qualifier.len() > Self::MAXBQUALSIZE {
            return Err(TransactionError::illegal_argument(format!(
                "branch qualifier exceeds maximum size of {} bytes",
                Self::MAXBQUALSIZE
            )));
        }

        Ok(Self {
            format_id,
            global_transaction_id: global_transaction_id.to_vec(),
            branch_qualifier: branch_qualifier.to_vec(),
        })
    }

    /// Generates an identifier for a new root transaction.
    pub fn generate() -> Self {
        Self {
            format_id: XID_FORMAT_ID,
            global_transaction_id: id::generate().to_vec(),
            branch_qualifier: id::generate().to_vec(),
        }
    }

    /// Generates an identifier for a new branch of the same global transaction.
    pub fn branch(&self) -> Self {
        Self {
            format_id: self.format_id,
            global_transaction_id: self.global_transaction_id.clone(),
            branch_qualifier: id::generate().to_vec(),
        }
    }

    /// Returns the format identifier.
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    /// Returns the global transaction identifier.
    pub fn global_transaction_id(&self) -> &[u8] {
        &self.global_transaction_id
    }

    /// Returns the branch qualifier.
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }

    /// Returns `true` if both identifiers belong to the same global transaction.
    pub fn same_global_transaction(&self, other: &Xid) -> bool {
        self.format_id == other.format_id
            && self.global_transaction_id == other.global_transaction_id
    }

    /// Parses and verifies the textual form produced by [`Display`](fmt::Display).
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || TransactionError::illegal_argument(format!("invalid xid {text:?}"));

        let rest = text
            .strip_prefix(XID_TAG)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(invalid)?;
        let mut parts = rest.split('+');
        let (Some(format_id), Some(gtrid), Some(bqual), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let format_id: i32 = format_id.parse().map_err(|_| invalid())?;
        if format_id != XID_FORMAT_ID {
            return Err(invalid());
        }
        let gtrid = id::decode(gtrid)?;
        let bqual = id::decode(bqual)?;
        id::verify(&gtrid, None)?;
        id::verify(&bqual, None)?;
        Self::new(format_id, &gtrid, &bqual)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}+{}+{}",
            XID_TAG,
            self.format_id,
            id::encode(&self.global_transaction_id),
            id::encode(&self.branch_qualifier)
        )
    }
}

impl FromStr for Xid {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Default for Xid {
    fn default() -> Self {
        Self::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xid_new() {
        let xid = Xid::new(42, b"global-txn-123", b"branch-001").unwrap();
        assert_eq!(xid.format_id(), 42);
        assert_eq!(xid.global_transaction_id(), b"global-txn-123");
        assert_eq!(xid.branch_qualifier(), b"branch-001");
    }

    #[test]
    fn test_xid_size_limits() {
        let long = vec![0u8; Xid::MAXGTRIDSIZE + 1];
        assert!(Xid::new(0, &long, b"").is_err());
        assert!(Xid::new(0, b"", &long).is_err());
    }

    #[test]
    fn test_xid_generate() {
        let a = Xid::generate();
        let b = Xid::generate();
        assert_eq!(a.format_id(), XID_FORMAT_ID);
        assert_eq!(a.global_transaction_id().len(), id::ID_LEN);
        assert_ne!(a.global_transaction_id(), b.global_transaction_id());
        assert_ne!(a.global_transaction_id(), a.branch_qualifier());
    }

    #[test]
    fn test_branch_shares_global_id() {
        let root = Xid::generate();
        let branch = root.branch();
        assert!(root.same_global_transaction(&branch));
        assert_ne!(root, branch);
        assert!(!root.same_global_transaction(&Xid::generate()));
    }

    #[test]
    fn test_display_format() {
        let xid = Xid::generate();
        let text = xid.to_string();
        assert!(text.starts_with("xid-63224+"));
        let parts: Vec<&str> = text.split('+').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 39);
        assert!(parts[1]
            .bytes()
            .all(|c| c.is_ascii_lowercase() || (b'2'..=b'7').contains(&c)));
    }

    #[test]
    fn test_parse_generated() {
        let xid = Xid::generate().branch();
        let parsed: Xid = xid.to_string().parse().unwrap();
        assert_eq!(parsed, xid);
    }

    #[test]
    fn test_parse_rejects_foreign_ids() {
        assert!(Xid::parse("xid-63224+abc").is_err());
        assert!(Xid::parse("tx-63224+aaaa+aaaa").is_err());
        let other = Xid::new(XID_FORMAT_ID, &[7u8; 24], &[9u8; 24]).unwrap();
        assert!(Xid::parse(&other.to_string()).is_err());
    }
}
