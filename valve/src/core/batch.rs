//! Atomic batch execution
//!
//! A [`Batch`] is an ordered list of requests submitted by one caller. The
//! [`Gateway`] runs them in order on a [`Transaction`] and commits only if
//! every request succeeded; the first error discards all effects of the
//! batch, including quota already spent by earlier requests.
//!
//! While a batch runs, targets can inspect it through [`BatchContext`]:
//! the ordered list of requests, the position of the request being served,
//! and an [`AdmissionRecord`] for every check that succeeded so far.

use super::admission::{Admission, check, create_bucket};
use super::bucket::{Bucket, BucketId, OwnerId};
use super::dispatcher::{Authority, InvocationContext, Target, TargetRegistry, call};
use super::policy::{Policy, PolicyId, TargetServiceId, create_policy};
use super::store::{Store, Transaction};
use super::ValveError;
use std::error::Error;
use std::fmt;
use std::time::SystemTime;

/// One request inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Register a new policy
    CreatePolicy {
        target_service_id: TargetServiceId,
        endpoint_id: u32,
        max_requests: u32,
        window_seconds: u32,
    },
    /// Create the caller's bucket under a policy
    CreateBucket {
        policy_id: PolicyId,
        owner_id: OwnerId,
    },
    /// Cooperative admission check
    Check {
        policy_id: PolicyId,
        owner_id: OwnerId,
    },
    /// Delegated call: check, then forward to the target
    Call {
        policy_id: PolicyId,
        owner_id: OwnerId,
        target_service_id: TargetServiceId,
        data: Vec<u8>,
        refs: Vec<String>,
    },
    /// Direct call to a target, guarded only by the target itself
    Invoke {
        target_service_id: TargetServiceId,
        data: Vec<u8>,
        refs: Vec<String>,
    },
}

/// Kind of a request, as seen by targets inspecting the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    CreatePolicy,
    CreateBucket,
    Check,
    Call,
    Invoke,
}

/// What a target can see of each request in the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub kind: RequestKind,
    /// Service the request is addressed to, `None` for gateway-only requests
    pub target_service_id: Option<TargetServiceId>,
    /// Policy the request refers to, if any
    pub policy_id: Option<PolicyId>,
}

impl From<&Request> for RequestSummary {
    fn from(request: &Request) -> Self {
        match request {
            Request::CreatePolicy {
                target_service_id,
                endpoint_id,
                ..
            } => RequestSummary {
                kind: RequestKind::CreatePolicy,
                target_service_id: None,
                policy_id: Some(PolicyId::new(target_service_id.clone(), *endpoint_id)),
            },
            Request::CreateBucket { policy_id, .. } => RequestSummary {
                kind: RequestKind::CreateBucket,
                target_service_id: None,
                policy_id: Some(policy_id.clone()),
            },
            Request::Check { policy_id, .. } => RequestSummary {
                kind: RequestKind::Check,
                target_service_id: None,
                policy_id: Some(policy_id.clone()),
            },
            Request::Call {
                policy_id,
                target_service_id,
                ..
            } => RequestSummary {
                kind: RequestKind::Call,
                target_service_id: Some(target_service_id.clone()),
                policy_id: Some(policy_id.clone()),
            },
            Request::Invoke {
                target_service_id, ..
            } => RequestSummary {
                kind: RequestKind::Invoke,
                target_service_id: Some(target_service_id.clone()),
                policy_id: None,
            },
        }
    }
}

/// Requests submitted together by one caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Authenticated submitter of the batch
    pub caller: OwnerId,
    pub requests: Vec<Request>,
}

impl Batch {
    pub fn new(caller: impl Into<OwnerId>) -> Self {
        Batch {
            caller: caller.into(),
            requests: Vec::new(),
        }
    }

    /// Append a request
    pub fn with(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    /// Append an admission check on the caller's own bucket
    pub fn check(self, policy_id: PolicyId) -> Self {
        let owner_id = self.caller.clone();
        self.with(Request::Check {
            policy_id,
            owner_id,
        })
    }

    /// Append a delegated call through the caller's own bucket
    pub fn call(self, policy_id: PolicyId, data: Vec<u8>, refs: Vec<String>) -> Self {
        let owner_id = self.caller.clone();
        let target_service_id = policy_id.target_service_id.clone();
        self.with(Request::Call {
            policy_id,
            owner_id,
            target_service_id,
            data,
            refs,
        })
    }

    /// Append a direct call to a target
    pub fn invoke(
        self,
        target_service_id: impl Into<TargetServiceId>,
        data: Vec<u8>,
        refs: Vec<String>,
    ) -> Self {
        self.with(Request::Invoke {
            target_service_id: target_service_id.into(),
            data,
            refs,
        })
    }
}

/// Mark left in the batch by a successful admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRecord {
    /// Service protected by the checked policy
    pub target_service_id: TargetServiceId,
    /// Caller whose bucket paid for the check
    pub caller: OwnerId,
    pub policy_id: PolicyId,
    /// Index of the check within the batch
    pub position: usize,
}

/// View of the running batch
#[derive(Debug, Clone)]
pub struct BatchContext {
    /// Submitter of the batch
    pub caller: OwnerId,
    requests: Vec<RequestSummary>,
    admissions: Vec<AdmissionRecord>,
    current: usize,
}

impl BatchContext {
    pub fn new(caller: OwnerId, requests: Vec<RequestSummary>) -> Self {
        BatchContext {
            caller,
            requests,
            admissions: Vec::new(),
            current: 0,
        }
    }

    /// All requests in the batch, in execution order
    pub fn requests(&self) -> &[RequestSummary] {
        &self.requests
    }

    /// Checks that have succeeded so far
    pub fn admissions(&self) -> &[AdmissionRecord] {
        &self.admissions
    }

    /// Index of the request being executed
    pub fn current_index(&self) -> usize {
        self.current
    }

    fn record_admission(&mut self, admission: &Admission) {
        self.admissions.push(AdmissionRecord {
            target_service_id: admission.policy_id.target_service_id.clone(),
            caller: self.caller.clone(),
            policy_id: admission.policy_id.clone(),
            position: self.current,
        });
    }
}

/// Result of one request in a committed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    PolicyCreated(PolicyId),
    BucketCreated(BucketId),
    Admitted(Admission),
    /// Response of a target service
    Returned(Vec<u8>),
}

/// Results of a committed batch, one per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    pub outcomes: Vec<Outcome>,
}

/// Why a batch was rolled back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    /// Index of the failing request
    pub index: usize,
    pub error: ValveError,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request {} failed: {}", self.index, self.error)
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Admission-control gateway over a store and a set of targets
///
/// The gateway is not thread-safe. Batches that touch the same bucket
/// must not run concurrently; share it behind a mutex or a single owner
/// task.
///
/// # Example
///
/// ```
/// use valve::{Batch, Gateway, MemoryStore, Outcome, PolicyId, Request};
/// use std::time::SystemTime;
///
/// let mut gateway = Gateway::new(MemoryStore::new());
/// let now = SystemTime::now();
/// let policy_id = PolicyId::new("svc", 111);
///
/// let setup = Batch::new("alice")
///     .with(Request::CreatePolicy {
///         target_service_id: "svc".into(),
///         endpoint_id: 111,
///         max_requests: 5,
///         window_seconds: 60,
///     })
///     .with(Request::CreateBucket {
///         policy_id: policy_id.clone(),
///         owner_id: "alice".into(),
///     });
/// gateway.submit(setup, now).unwrap();
///
/// let receipt = gateway.submit(Batch::new("alice").check(policy_id), now).unwrap();
/// match &receipt.outcomes[0] {
///     Outcome::Admitted(admission) => assert_eq!(admission.tokens_remaining, 4),
///     other => panic!("unexpected outcome: {other:?}"),
/// }
/// ```
pub struct Gateway<S: Store> {
    store: S,
    targets: TargetRegistry,
}

impl<S: Store> Gateway<S> {
    pub fn new(store: S) -> Self {
        Gateway {
            store,
            targets: TargetRegistry::new(),
        }
    }

    pub fn with_targets(store: S, targets: TargetRegistry) -> Self {
        Gateway { store, targets }
    }

    /// Register a target service the gateway can call
    pub fn register_target(
        &mut self,
        id: impl Into<TargetServiceId>,
        target: impl Target + 'static,
    ) -> Option<Box<dyn Target>> {
        self.targets.register(id, target)
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Look up a committed policy
    pub fn policy(&self, id: &PolicyId) -> Result<Option<Policy>, ValveError> {
        self.store.get_policy(id).map_err(ValveError::Internal)
    }

    /// Look up a committed bucket
    pub fn bucket(&self, id: &BucketId) -> Result<Option<Bucket>, ValveError> {
        self.store.get_bucket(id).map_err(ValveError::Internal)
    }

    /// Run a batch atomically
    ///
    /// Requests run in order. If one fails, the batch stops there, nothing
    /// it wrote is kept, and the error names the failing request.
    pub fn submit(&mut self, batch: Batch, now: SystemTime) -> Result<BatchReceipt, BatchError> {
        let summaries = batch.requests.iter().map(RequestSummary::from).collect();
        let mut ctx = BatchContext::new(batch.caller, summaries);
        let mut tx = Transaction::new(&mut self.store);
        let mut outcomes = Vec::with_capacity(batch.requests.len());

        for (index, request) in batch.requests.into_iter().enumerate() {
            ctx.current = index;
            let outcome = execute(&mut tx, &self.targets, &mut ctx, request, now)
                .map_err(|error| BatchError { index, error })?;
            outcomes.push(outcome);
        }

        tx.commit().map_err(|e| BatchError {
            index: outcomes.len(),
            error: ValveError::Internal(e),
        })?;

        Ok(BatchReceipt { outcomes })
    }
}

fn execute<S: Store + ?Sized>(
    store: &mut S,
    targets: &TargetRegistry,
    ctx: &mut BatchContext,
    request: Request,
    now: SystemTime,
) -> Result<Outcome, ValveError> {
    match request {
        Request::CreatePolicy {
            target_service_id,
            endpoint_id,
            max_requests,
            window_seconds,
        } => create_policy(
            store,
            target_service_id,
            endpoint_id,
            max_requests,
            window_seconds,
        )
        .map(Outcome::PolicyCreated),
        Request::CreateBucket {
            policy_id,
            owner_id,
        } => {
            if owner_id != ctx.caller {
                return Err(ValveError::Unauthorized(format!(
                    "{} cannot create a bucket for {owner_id}",
                    ctx.caller
                )));
            }
            create_bucket(store, &policy_id, &owner_id, now).map(Outcome::BucketCreated)
        }
        Request::Check {
            policy_id,
            owner_id,
        } => {
            let admission = check(store, &policy_id, &owner_id, &ctx.caller, now)?;
            ctx.record_admission(&admission);
            Ok(Outcome::Admitted(admission))
        }
        Request::Call {
            policy_id,
            owner_id,
            target_service_id,
            data,
            refs,
        } => call(
            store,
            targets,
            ctx,
            &policy_id,
            &owner_id,
            &target_service_id,
            &data,
            &refs,
            now,
        )
        .map(Outcome::Returned),
        Request::Invoke {
            target_service_id,
            data,
            refs,
        } => {
            let target = targets
                .get(&target_service_id)
                .ok_or_else(|| ValveError::NotFound(format!("target {target_service_id}")))?;
            let invocation = InvocationContext {
                authority: Authority {
                    caller: ctx.caller.clone(),
                    delegated_by: None,
                },
                batch: &*ctx,
            };
            target
                .invoke(&invocation, &data, &refs)
                .map(Outcome::Returned)
                .map_err(ValveError::TargetCallFailed)
        }
    }
}
