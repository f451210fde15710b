//! Per-caller quota state

use super::policy::PolicyId;
use std::fmt;

/// Identifier of a caller owning buckets
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        OwnerId(id.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        OwnerId(id)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a bucket: one per `(policy, owner)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketId {
    pub policy_id: PolicyId,
    pub owner_id: OwnerId,
}

impl BucketId {
    pub fn new(policy_id: PolicyId, owner_id: OwnerId) -> Self {
        BucketId {
            policy_id,
            owner_id,
        }
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket:{}:{}", self.policy_id, self.owner_id)
    }
}

/// Quota state of one caller under one policy
///
/// `tokens_remaining` stays within `0..=policy.max_requests`. The bucket
/// only refers to its policy by id; the policy is looked up on every
/// admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Policy this bucket is scoped to
    pub policy_id: PolicyId,
    /// Caller this bucket belongs to
    pub owner_id: OwnerId,
    /// Tokens left in the current window
    pub tokens_remaining: u32,
    /// Unix timestamp (seconds) of the last window reset
    pub window_start: i64,
}

impl Bucket {
    pub fn id(&self) -> BucketId {
        BucketId::new(self.policy_id.clone(), self.owner_id.clone())
    }
}
