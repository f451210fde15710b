//! Storage backends for policy and bucket records
//!
//! The admission engine never touches global state: every operation takes
//! a [`Store`] explicitly. [`MemoryStore`] keeps records in hash maps and
//! [`Transaction`] stages writes on top of any other store so a batch can
//! commit or roll back as a unit.

use super::bucket::{Bucket, BucketId};
use super::policy::{Policy, PolicyId};

mod memory;
mod transaction;

pub use memory::{MemoryStore, MemoryStoreBuilder};
pub use transaction::Transaction;

#[cfg(test)]
mod tests;

/// Store trait for policy and bucket records
///
/// Writes are conditional, in the spirit of redis `SET NX` and
/// compare-and-swap: callers never overwrite a record they have not read.
pub trait Store {
    /// Get a policy by key
    fn get_policy(&self, id: &PolicyId) -> Result<Option<Policy>, String>;

    /// Insert a policy unless one exists for the same key
    ///
    /// Returns `false` if the key was already taken.
    fn set_policy_if_not_exists(&mut self, policy: Policy) -> Result<bool, String>;

    /// Get a bucket by key
    fn get_bucket(&self, id: &BucketId) -> Result<Option<Bucket>, String>;

    /// Insert a bucket unless one exists for the same key
    ///
    /// Returns `false` if the key was already taken.
    fn set_bucket_if_not_exists(&mut self, bucket: Bucket) -> Result<bool, String>;

    /// Replace a bucket only if its stored value still equals `old`
    ///
    /// Returns `false` if the bucket is missing or was changed since `old` was read.
    fn compare_and_swap_bucket(&mut self, old: &Bucket, new: Bucket) -> Result<bool, String>;
}
