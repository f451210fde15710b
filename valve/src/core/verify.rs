//! Call-chain verification for target services
//!
//! A target guarded by the cooperative pattern must refuse to run unless an
//! admission check for its own policy succeeded immediately before it in the
//! same batch.
//! A target reached through the delegated pattern can instead confirm that
//! the gateway forwarded the call on behalf of its policy.

use super::ValveError;
use super::batch::{AdmissionRecord, BatchContext};
use super::dispatcher::InvocationContext;
use super::policy::{PolicyId, TargetServiceId};

/// Find the admission check that guards the current request
///
/// Succeeds if the request immediately before the one being executed is a
/// check the batch caller passed against the policy of
/// `(target_service_id, endpoint_id)`. Each check therefore guards exactly
/// one call.
///
/// # Errors
///
/// [`ValveError::AdmissionRequired`] when there is no such check, including
/// when the check is placed after the guarded call or already guards an
/// earlier call.
pub fn verify_admission<'a>(
    batch: &'a BatchContext,
    target_service_id: &TargetServiceId,
    endpoint_id: u32,
) -> Result<&'a AdmissionRecord, ValveError> {
    let expected = PolicyId::new(target_service_id.clone(), endpoint_id);
    let previous = batch
        .current_index()
        .checked_sub(1)
        .ok_or(ValveError::AdmissionRequired)?;

    batch
        .admissions()
        .iter()
        .find(|record| {
            record.position == previous
                && record.policy_id == expected
                && record.target_service_id == *target_service_id
                && record.caller == batch.caller
        })
        .ok_or(ValveError::AdmissionRequired)
}

/// Confirm that the gateway forwarded this call under the expected policy
///
/// # Errors
///
/// [`ValveError::AdmissionRequired`] when the call was not delegated, or was
/// delegated under a different policy.
pub fn verify_delegated(
    ctx: &InvocationContext<'_>,
    target_service_id: &TargetServiceId,
    endpoint_id: u32,
) -> Result<(), ValveError> {
    let expected = PolicyId::new(target_service_id.clone(), endpoint_id);
    match &ctx.authority.delegated_by {
        Some(policy_id) if *policy_id == expected => Ok(()),
        _ => Err(ValveError::AdmissionRequired),
    }
}
