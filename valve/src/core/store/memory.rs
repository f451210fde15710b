use super::Store;
use crate::core::bucket::{Bucket, BucketId};
use crate::core::policy::{Policy, PolicyId};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
// Policies are few compared to callers
const POLICY_CAPACITY_DIVISOR: usize = 100;

/// In-memory store for policies and buckets
///
/// Records are never evicted: policies are permanent and buckets live as
/// long as their owner may call again.
///
/// # Example
///
/// ```
/// use valve::{MemoryStore, create_policy};
///
/// let mut store = MemoryStore::builder().capacity(10_000).build();
/// create_policy(&mut store, "svc".into(), 1, 5, 60).unwrap();
/// assert_eq!(store.policy_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    policies: HashMap<PolicyId, Policy>,
    buckets: HashMap<BucketId, Bucket>,
}

/// Builder for configuring a MemoryStore
///
/// # Example
///
/// ```
/// use valve::MemoryStore;
///
/// let store = MemoryStore::builder()
///     .capacity(100_000)
///     .build();
/// ```
pub struct MemoryStoreBuilder {
    capacity: usize,
}

impl MemoryStore {
    /// Create a new MemoryStore sized for 1000 buckets
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new MemoryStore with specified capacity
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    ///
    /// # Parameters
    ///
    /// - `capacity`: Expected number of buckets (distinct callers across all policies)
    pub fn with_capacity(capacity: usize) -> Self {
        let buckets = (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize;
        MemoryStore {
            policies: HashMap::with_capacity((buckets / POLICY_CAPACITY_DIVISOR).max(16)),
            buckets: HashMap::with_capacity(buckets),
        }
    }

    /// Create a new builder for configuring a MemoryStore
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Number of registered policies
    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// Number of buckets across all policies
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn get_policy(&self, id: &PolicyId) -> Result<Option<Policy>, String> {
        Ok(self.policies.get(id).cloned())
    }

    fn set_policy_if_not_exists(&mut self, policy: Policy) -> Result<bool, String> {
        let id = policy.id();
        if self.policies.contains_key(&id) {
            return Ok(false);
        }
        self.policies.insert(id, policy);
        Ok(true)
    }

    fn get_bucket(&self, id: &BucketId) -> Result<Option<Bucket>, String> {
        Ok(self.buckets.get(id).cloned())
    }

    fn set_bucket_if_not_exists(&mut self, bucket: Bucket) -> Result<bool, String> {
        let id = bucket.id();
        if self.buckets.contains_key(&id) {
            return Ok(false);
        }
        self.buckets.insert(id, bucket);
        Ok(true)
    }

    fn compare_and_swap_bucket(&mut self, old: &Bucket, new: Bucket) -> Result<bool, String> {
        if old.id() != new.id() {
            return Err(format!("cannot swap {} for {}", old.id(), new.id()));
        }

        match self.buckets.get_mut(&old.id()) {
            Some(current) if current == old => {
                *current = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl MemoryStoreBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected number of buckets
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Build the MemoryStore with the configured settings
    pub fn build(self) -> MemoryStore {
        MemoryStore::with_capacity(self.capacity)
    }
}
