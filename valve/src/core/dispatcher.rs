//! Delegated calls into target services
//!
//! In the delegated pattern the gateway runs the admission check itself
//! and then forwards the call, so the target needs no knowledge of quotas.
//! Targets are registered in a [`TargetRegistry`] and invoked through the
//! [`Target`] trait.

use super::admission::check;
use super::batch::BatchContext;
use super::bucket::OwnerId;
use super::policy::{PolicyId, TargetServiceId, get_policy};
use super::{ValveError, store::Store};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Who a target is acting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    /// The caller that submitted the batch
    pub caller: OwnerId,
    /// Policy the gateway checked before forwarding, for delegated calls
    pub delegated_by: Option<PolicyId>,
}

/// Everything a target can inspect about the call it is serving
pub struct InvocationContext<'a> {
    /// Authority the call is made with
    pub authority: Authority,
    /// The batch the call is part of
    pub batch: &'a BatchContext,
}

/// A protected service the gateway can call
///
/// `data` is the opaque call payload and `refs` are extra references the
/// caller passes through untouched. Errors are reported as plain messages
/// and surface to the caller as [`ValveError::TargetCallFailed`].
pub trait Target: Send + Sync {
    fn invoke(
        &self,
        ctx: &InvocationContext<'_>,
        data: &[u8],
        refs: &[String],
    ) -> Result<Vec<u8>, String>;
}

/// Registered target services, by id
#[derive(Default)]
pub struct TargetRegistry {
    targets: BTreeMap<TargetServiceId, Box<dyn Target>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target, returning the one it replaces
    pub fn register(
        &mut self,
        id: impl Into<TargetServiceId>,
        target: impl Target + 'static,
    ) -> Option<Box<dyn Target>> {
        self.targets.insert(id.into(), Box::new(target))
    }

    pub fn get(&self, id: &TargetServiceId) -> Option<&dyn Target> {
        self.targets.get(id).map(|target| target.as_ref())
    }

    pub fn contains(&self, id: &TargetServiceId) -> bool {
        self.targets.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TargetServiceId> {
        self.targets.keys()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.targets.keys()).finish()
    }
}

/// Check quota, then forward the call to the policy's target
///
/// The target is only invoked after the admission check succeeded, and it
/// runs with the authority of the original caller delegated through
/// `policy_id`. If the target fails, the error is returned as
/// [`ValveError::TargetCallFailed`]; the token spent by the check is only
/// given back if the surrounding batch is rolled back, which
/// [`Gateway::submit`](super::Gateway::submit) always does on error.
///
/// # Errors
///
/// - [`ValveError::NotFound`]: policy, bucket or target missing
/// - [`ValveError::Unauthorized`]: `target_service_id` is not the policy's
///   target, or `caller` does not own the bucket
/// - [`ValveError::QuotaExceeded`]: no tokens left; the target is not called
/// - [`ValveError::TargetCallFailed`]: the target returned an error
#[allow(clippy::too_many_arguments)]
pub fn call<S: Store + ?Sized>(
    store: &mut S,
    targets: &TargetRegistry,
    batch: &BatchContext,
    policy_id: &PolicyId,
    owner_id: &OwnerId,
    target_service_id: &TargetServiceId,
    data: &[u8],
    refs: &[String],
    now: SystemTime,
) -> Result<Vec<u8>, ValveError> {
    let policy = get_policy(store, policy_id)?;
    if policy.target_service_id != *target_service_id {
        return Err(ValveError::Unauthorized(format!(
            "{policy_id} does not guard {target_service_id}"
        )));
    }

    let target = targets
        .get(target_service_id)
        .ok_or_else(|| ValveError::NotFound(format!("target {target_service_id}")))?;

    check(store, policy_id, owner_id, &batch.caller, now)?;

    let ctx = InvocationContext {
        authority: Authority {
            caller: batch.caller.clone(),
            delegated_by: Some(policy_id.clone()),
        },
        batch,
    };
    target
        .invoke(&ctx, data, refs)
        .map_err(ValveError::TargetCallFailed)
}
