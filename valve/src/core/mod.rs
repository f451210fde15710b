//! Core components of the valve admission-control library
//!
//! This module contains the fundamental building blocks:
//! - [`store`]: Storage trait, in-memory store and the transactional overlay
//! - [`policy`]: Policy records and the write-once policy manager
//! - [`bucket`]: Per-caller quota state
//! - [`admission`]: The fixed-window admission engine
//! - [`dispatcher`]: Delegated calls into registered target services
//! - [`batch`]: Atomic batch execution and the [`Gateway`] entry point
//! - [`verify`]: Call-chain checks that target services run before trusting a request

pub mod admission;
pub mod batch;
pub mod bucket;
pub mod dispatcher;
pub mod policy;
pub mod store;
pub mod verify;

pub use admission::{Admission, admit, check, create_bucket};
pub use batch::{
    AdmissionRecord, Batch, BatchContext, BatchError, BatchReceipt, Gateway, Outcome, Request,
    RequestKind, RequestSummary,
};
pub use bucket::{Bucket, BucketId, OwnerId};
pub use dispatcher::{Authority, InvocationContext, Target, TargetRegistry, call};
pub use policy::{Policy, PolicyId, TargetServiceId, create_policy, get_policy};
pub use store::{MemoryStore, MemoryStoreBuilder, Store, Transaction};
pub use verify::{verify_admission, verify_delegated};

use std::error::Error;
use std::fmt;

/// Errors that can occur while managing quota state or admitting calls
///
/// Every variant aborts the enclosing batch. None of them are retried by
/// the library; retry policy belongs to the caller.
///
/// # Example
///
/// ```
/// use valve::{MemoryStore, ValveError, create_policy};
///
/// let mut store = MemoryStore::new();
///
/// // A policy needs at least one request per window
/// match create_policy(&mut store, "svc".into(), 1, 0, 60) {
///     Err(ValveError::InvalidPolicy(reason)) => println!("rejected: {reason}"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValveError {
    /// A policy or bucket already exists for the requested key
    AlreadyExists(String),
    /// A referenced policy, bucket or target is not known
    NotFound(String),
    /// Policy parameters are out of range (`max_requests` or `window_seconds` is zero)
    InvalidPolicy(String),
    /// The caller is not allowed to act on the bucket or target
    Unauthorized(String),
    /// No tokens left in the current window
    QuotaExceeded {
        /// Seconds until the current window ends and the bucket refills
        retry_after: u64,
    },
    /// The delegated call into the target service failed
    TargetCallFailed(String),
    /// A target found no successful admission check earlier in the batch
    AdmissionRequired,
    /// Store failure or another internal error
    Internal(String),
}

impl ValveError {
    /// Short, stable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ValveError::AlreadyExists(_) => "already_exists",
            ValveError::NotFound(_) => "not_found",
            ValveError::InvalidPolicy(_) => "invalid_policy",
            ValveError::Unauthorized(_) => "unauthorized",
            ValveError::QuotaExceeded { .. } => "quota_exceeded",
            ValveError::TargetCallFailed(_) => "target_call_failed",
            ValveError::AdmissionRequired => "admission_required",
            ValveError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for ValveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValveError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            ValveError::NotFound(what) => write!(f, "not found: {what}"),
            ValveError::InvalidPolicy(reason) => write!(f, "invalid policy: {reason}"),
            ValveError::Unauthorized(reason) => write!(f, "unauthorized: {reason}"),
            ValveError::QuotaExceeded { retry_after } => {
                write!(f, "rate limit exceeded, retry after {retry_after}s")
            }
            ValveError::TargetCallFailed(msg) => write!(f, "target call failed: {msg}"),
            ValveError::AdmissionRequired => write!(f, "admission check required"),
            ValveError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl Error for ValveError {}
