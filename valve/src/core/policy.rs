//! Policy records and the write-once policy manager
//!
//! A [`Policy`] protects one `(target service, endpoint)` pair. Its key is
//! derived from those two values alone, so anyone can compute the
//! [`PolicyId`] without a lookup.

use super::{ValveError, store::Store};
use std::fmt;

/// Opaque identifier of a protected target service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetServiceId(String);

impl TargetServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        TargetServiceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetServiceId {
    fn from(id: &str) -> Self {
        TargetServiceId(id.to_string())
    }
}

impl From<String> for TargetServiceId {
    fn from(id: String) -> Self {
        TargetServiceId(id)
    }
}

impl fmt::Display for TargetServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic key of a policy: the protected target and endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyId {
    pub target_service_id: TargetServiceId,
    pub endpoint_id: u32,
}

impl PolicyId {
    pub fn new(target_service_id: impl Into<TargetServiceId>, endpoint_id: u32) -> Self {
        PolicyId {
            target_service_id: target_service_id.into(),
            endpoint_id,
        }
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy:{}:{}", self.target_service_id, self.endpoint_id)
    }
}

/// Quota configuration for one `(target service, endpoint)` pair
///
/// Policies are immutable once created and are never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// The protected service
    pub target_service_id: TargetServiceId,
    /// Endpoint within the protected service
    pub endpoint_id: u32,
    /// Requests allowed per window (at least 1)
    pub max_requests: u32,
    /// Window length in seconds (at least 1)
    pub window_seconds: u32,
}

impl Policy {
    pub fn id(&self) -> PolicyId {
        PolicyId::new(self.target_service_id.clone(), self.endpoint_id)
    }
}

/// Create a new policy
///
/// # Errors
///
/// - [`ValveError::InvalidPolicy`]: `max_requests` or `window_seconds` is zero
/// - [`ValveError::AlreadyExists`]: a policy is already registered for the key
/// - [`ValveError::Internal`]: the store failed
///
/// # Example
///
/// ```
/// use valve::{MemoryStore, PolicyId, create_policy};
///
/// let mut store = MemoryStore::new();
///
/// // 5 requests per minute against endpoint 111 of "svc-a"
/// let id = create_policy(&mut store, "svc-a".into(), 111, 5, 60).unwrap();
/// assert_eq!(id, PolicyId::new("svc-a", 111));
///
/// // Policies are write-once
/// assert!(create_policy(&mut store, "svc-a".into(), 111, 10, 60).is_err());
/// ```
pub fn create_policy<S: Store + ?Sized>(
    store: &mut S,
    target_service_id: TargetServiceId,
    endpoint_id: u32,
    max_requests: u32,
    window_seconds: u32,
) -> Result<PolicyId, ValveError> {
    if max_requests < 1 {
        return Err(ValveError::InvalidPolicy(
            "max_requests must be at least 1".into(),
        ));
    }
    if window_seconds < 1 {
        return Err(ValveError::InvalidPolicy(
            "window_seconds must be at least 1".into(),
        ));
    }

    let policy = Policy {
        target_service_id,
        endpoint_id,
        max_requests,
        window_seconds,
    };
    let id = policy.id();

    let created = store
        .set_policy_if_not_exists(policy)
        .map_err(ValveError::Internal)?;
    if !created {
        return Err(ValveError::AlreadyExists(id.to_string()));
    }

    Ok(id)
}

/// Load a policy, failing with [`ValveError::NotFound`] when it is missing
pub fn get_policy<S: Store + ?Sized>(store: &S, id: &PolicyId) -> Result<Policy, ValveError> {
    store
        .get_policy(id)
        .map_err(ValveError::Internal)?
        .ok_or_else(|| ValveError::NotFound(id.to_string()))
}
