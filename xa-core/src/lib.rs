//! Core types for the XA transaction coordinator.
//!
//! This crate holds the pieces shared by the coordinator and by resource
//! adapters: transaction identifiers, XA flags and return codes, the
//! transaction status vocabulary, the error taxonomy and the
//! [`XaResource`] contract.

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod status;
pub mod xa;
pub mod xid;

pub use async_trait::async_trait;
pub use error::{Result, TransactionError};
pub use status::{describe_status, Status};
pub use xa::{describe_xa_code, XaError, XaResource};
pub use xid::Xid;
