//! # Valve
//!
//! Per-caller admission control for protected target services.
//!
//! ## Overview
//!
//! Valve gates calls to a target service behind a quota: each caller may
//! make at most `max_requests` calls per `window_seconds` to one
//! `(target service, endpoint)` pair. Quotas use a **fixed window**: the full
//! quota becomes available again the instant the window ends, with no
//! gradual refill in between.
//!
//! Two admission patterns are supported:
//!
//! - **Cooperative**: the caller submits a [`Request::Check`] followed by a
//!   direct [`Request::Invoke`] of the target in the same batch. The target
//!   calls [`verify_admission`] to confirm that the check came right before
//!   it. Each guarded call needs its own check.
//! - **Delegated**: the caller submits a single [`Request::Call`]; the gateway
//!   checks the quota and forwards the call itself. The target needs no
//!   knowledge of the gateway.
//!
//! Every [`Batch`] is atomic: if any request fails, nothing the batch did is
//! kept, including quota spent by an earlier check.
//!
//! ## Quick Start
//!
//! ```
//! use valve::{Batch, Gateway, MemoryStore, PolicyId, Request, ValveError};
//! use std::time::SystemTime;
//!
//! let mut gateway = Gateway::new(MemoryStore::new());
//! let now = SystemTime::now();
//! let policy = PolicyId::new("svc-a", 111);
//!
//! // 5 calls per minute, then create alice's bucket
//! gateway
//!     .submit(
//!         Batch::new("alice")
//!             .with(Request::CreatePolicy {
//!                 target_service_id: "svc-a".into(),
//!                 endpoint_id: 111,
//!                 max_requests: 5,
//!                 window_seconds: 60,
//!             })
//!             .with(Request::CreateBucket {
//!                 policy_id: policy.clone(),
//!                 owner_id: "alice".into(),
//!             }),
//!         now,
//!     )
//!     .unwrap();
//!
//! for _ in 0..5 {
//!     gateway.submit(Batch::new("alice").check(policy.clone()), now).unwrap();
//! }
//!
//! let err = gateway
//!     .submit(Batch::new("alice").check(policy.clone()), now)
//!     .unwrap_err();
//! assert!(matches!(err.error, ValveError::QuotaExceeded { .. }));
//! ```
//!
//! ## Writing a Target
//!
//! ```
//! use valve::{InvocationContext, Target, TargetServiceId, verify_admission};
//!
//! struct Adder {
//!     id: TargetServiceId,
//! }
//!
//! impl Target for Adder {
//!     fn invoke(
//!         &self,
//!         ctx: &InvocationContext<'_>,
//!         data: &[u8],
//!         _refs: &[String],
//!     ) -> Result<Vec<u8>, String> {
//!         // Refuse to run unless endpoint 111 was checked earlier in the batch
//!         verify_admission(ctx.batch, &self.id, 111).map_err(|e| e.to_string())?;
//!         let sum: u64 = data.iter().map(|b| u64::from(*b)).sum();
//!         Ok(sum.to_le_bytes().to_vec())
//!     }
//! }
//! ```
//!
//! ## Thread Safety
//!
//! The gateway itself is not thread-safe. Batches touching the same bucket
//! must be serialized, for example with a mutex:
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use valve::{Gateway, MemoryStore};
//!
//! let gateway = Arc::new(Mutex::new(Gateway::new(MemoryStore::new())));
//! ```
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing

pub mod core;

pub use core::{
    Admission, AdmissionRecord, Authority, Batch, BatchContext, BatchError, BatchReceipt, Bucket,
    BucketId, Gateway, InvocationContext, MemoryStore, MemoryStoreBuilder, Outcome, OwnerId,
    Policy, PolicyId, Request, RequestKind, RequestSummary, Store, Target, TargetRegistry,
    TargetServiceId, Transaction, ValveError, admit, call, check, create_bucket, create_policy,
    get_policy, verify_admission, verify_delegated,
};

// Re-export the store module so benchmarks can access it
pub use crate::core::store;
