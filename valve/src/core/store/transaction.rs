use super::Store;
use crate::core::bucket::{Bucket, BucketId};
use crate::core::policy::{Policy, PolicyId};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

/// A bucket write waiting for commit, with the base value it replaces
struct StagedBucket {
    original: Option<Bucket>,
    current: Bucket,
}

/// All-or-nothing overlay over another store
///
/// Reads see staged writes first and fall back to the base store. Nothing
/// reaches the base store until [`commit`](Transaction::commit); dropping
/// the transaction discards every staged write.
///
/// # Example
///
/// ```
/// use valve::{MemoryStore, Store, Transaction, create_policy, PolicyId};
///
/// let mut store = MemoryStore::new();
///
/// let mut tx = Transaction::new(&mut store);
/// create_policy(&mut tx, "svc".into(), 7, 5, 60).unwrap();
/// tx.rollback();
/// assert!(store.get_policy(&PolicyId::new("svc", 7)).unwrap().is_none());
///
/// let mut tx = Transaction::new(&mut store);
/// create_policy(&mut tx, "svc".into(), 7, 5, 60).unwrap();
/// tx.commit().unwrap();
/// assert!(store.get_policy(&PolicyId::new("svc", 7)).unwrap().is_some());
/// ```
pub struct Transaction<'a, S: Store + ?Sized> {
    base: &'a mut S,
    policies: HashMap<PolicyId, Policy>,
    buckets: HashMap<BucketId, StagedBucket>,
}

impl<'a, S: Store + ?Sized> Transaction<'a, S> {
    /// Start a transaction on top of `base`
    pub fn new(base: &'a mut S) -> Self {
        Transaction {
            base,
            policies: HashMap::new(),
            buckets: HashMap::new(),
        }
    }

    /// Number of records that a commit would write
    pub fn pending_writes(&self) -> usize {
        self.policies.len() + self.buckets.len()
    }

    /// Apply every staged write to the base store
    ///
    /// All writes are validated against the base store before the first one
    /// is applied, so a conflict leaves the base store untouched.
    pub fn commit(mut self) -> Result<(), String> {
        for id in self.policies.keys() {
            if self.base.get_policy(id)?.is_some() {
                return Err(format!("transaction conflict on {id}"));
            }
        }
        for (id, staged) in &self.buckets {
            if self.base.get_bucket(id)? != staged.original {
                return Err(format!("transaction conflict on {id}"));
            }
        }

        for (_, policy) in self.policies {
            let id = policy.id();
            if !self.base.set_policy_if_not_exists(policy)? {
                return Err(format!("transaction conflict on {id}"));
            }
        }
        for (id, staged) in self.buckets {
            let applied = match staged.original {
                None => self.base.set_bucket_if_not_exists(staged.current)?,
                Some(original) => self
                    .base
                    .compare_and_swap_bucket(&original, staged.current)?,
            };
            if !applied {
                return Err(format!("transaction conflict on {id}"));
            }
        }

        Ok(())
    }

    /// Discard every staged write
    pub fn rollback(self) {}
}

impl<S: Store + ?Sized> Store for Transaction<'_, S> {
    fn get_policy(&self, id: &PolicyId) -> Result<Option<Policy>, String> {
        match self.policies.get(id) {
            Some(policy) => Ok(Some(policy.clone())),
            None => self.base.get_policy(id),
        }
    }

    fn set_policy_if_not_exists(&mut self, policy: Policy) -> Result<bool, String> {
        if self.get_policy(&policy.id())?.is_some() {
            return Ok(false);
        }
        self.policies.insert(policy.id(), policy);
        Ok(true)
    }

    fn get_bucket(&self, id: &BucketId) -> Result<Option<Bucket>, String> {
        match self.buckets.get(id) {
            Some(staged) => Ok(Some(staged.current.clone())),
            None => self.base.get_bucket(id),
        }
    }

    fn set_bucket_if_not_exists(&mut self, bucket: Bucket) -> Result<bool, String> {
        let id = bucket.id();
        if self.get_bucket(&id)?.is_some() {
            return Ok(false);
        }
        self.buckets.insert(
            id,
            StagedBucket {
                original: None,
                current: bucket,
            },
        );
        Ok(true)
    }

    fn compare_and_swap_bucket(&mut self, old: &Bucket, new: Bucket) -> Result<bool, String> {
        let id = old.id();
        if id != new.id() {
            return Err(format!("cannot swap {} for {}", id, new.id()));
        }

        if let Some(staged) = self.buckets.get_mut(&id) {
            if staged.current != *old {
                return Ok(false);
            }
            staged.current = new;
            return Ok(true);
        }

        match self.base.get_bucket(&id)? {
            Some(current) if current == *old => {
                self.buckets.insert(
                    id,
                    StagedBucket {
                        original: Some(current),
                        current: new,
                    },
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
