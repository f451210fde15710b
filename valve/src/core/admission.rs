//! Fixed-window admission engine
//!
//! Each bucket holds up to `max_requests` tokens. The full quota comes back
//! the moment `window_seconds` have passed since the last reset; there is no
//! gradual refill in between and no background task. Refill is computed
//! lazily on the next admission.

use super::bucket::{Bucket, BucketId, OwnerId};
use super::policy::{Policy, PolicyId, get_policy};
use super::{ValveError, store::Store};
use std::time::{SystemTime, UNIX_EPOCH};

// Bounds the compare-and-swap loop when the store is shared
const MAX_RETRIES: u32 = 10;

/// Outcome of a successful admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Policy the check was made against
    pub policy_id: PolicyId,
    /// Owner of the bucket that paid for the call
    pub owner_id: OwnerId,
    /// Tokens left in the current window after this check
    pub tokens_remaining: u32,
    /// Unix timestamp (seconds) of the current window start
    pub window_start: i64,
}

impl From<&Bucket> for Admission {
    fn from(bucket: &Bucket) -> Self {
        Admission {
            policy_id: bucket.policy_id.clone(),
            owner_id: bucket.owner_id.clone(),
            tokens_remaining: bucket.tokens_remaining,
            window_start: bucket.window_start,
        }
    }
}

/// Spend one token from `bucket`
///
/// The caller must hold the only mutable reference to the bucket. `now` is
/// a unix timestamp in seconds.
///
/// 1. If the window has elapsed, the bucket refills to `max_requests` and a
///    new window starts at `now`.
/// 2. If no tokens are left, fails with [`ValveError::QuotaExceeded`] and
///    leaves the bucket unchanged.
/// 3. Otherwise one token is consumed.
///
/// Every successful call spends a token, so retrying a request spends
/// another one.
///
/// # Example
///
/// ```
/// use valve::{Bucket, Policy, PolicyId, ValveError, admit};
///
/// let policy = Policy {
///     target_service_id: "svc".into(),
///     endpoint_id: 1,
///     max_requests: 2,
///     window_seconds: 60,
/// };
/// let mut bucket = Bucket {
///     policy_id: PolicyId::new("svc", 1),
///     owner_id: "alice".into(),
///     tokens_remaining: 2,
///     window_start: 1_000,
/// };
///
/// admit(&policy, &mut bucket, 1_001).unwrap();
/// admit(&policy, &mut bucket, 1_002).unwrap();
/// assert_eq!(
///     admit(&policy, &mut bucket, 1_003),
///     Err(ValveError::QuotaExceeded { retry_after: 57 })
/// );
///
/// // A new window starts 60 seconds after the last reset
/// admit(&policy, &mut bucket, 1_060).unwrap();
/// assert_eq!(bucket.tokens_remaining, 1);
/// ```
pub fn admit(policy: &Policy, bucket: &mut Bucket, now: i64) -> Result<(), ValveError> {
    let window = i64::from(policy.window_seconds);
    let elapsed = now.saturating_sub(bucket.window_start);

    // A clock that went backwards never opens a new window
    if elapsed >= window {
        bucket.tokens_remaining = policy.max_requests;
        bucket.window_start = now;
    }

    if bucket.tokens_remaining == 0 {
        let retry_after = bucket
            .window_start
            .saturating_add(window)
            .saturating_sub(now)
            .max(0) as u64;
        return Err(ValveError::QuotaExceeded { retry_after });
    }

    debug_assert!(
        bucket.tokens_remaining <= policy.max_requests,
        "bucket holds more tokens than its policy allows"
    );
    bucket.tokens_remaining -= 1;
    Ok(())
}

/// Create the bucket of `owner_id` under an existing policy
///
/// The bucket starts full with its window opening at `now`.
///
/// # Errors
///
/// - [`ValveError::NotFound`]: the policy does not exist
/// - [`ValveError::AlreadyExists`]: the owner already has a bucket for this policy
/// - [`ValveError::Internal`]: the store failed or `now` is before the unix epoch
pub fn create_bucket<S: Store + ?Sized>(
    store: &mut S,
    policy_id: &PolicyId,
    owner_id: &OwnerId,
    now: SystemTime,
) -> Result<BucketId, ValveError> {
    let now = unix_seconds(now)?;
    let policy = get_policy(store, policy_id)?;

    let bucket = Bucket {
        policy_id: policy_id.clone(),
        owner_id: owner_id.clone(),
        tokens_remaining: policy.max_requests,
        window_start: now,
    };
    let id = bucket.id();

    let created = store
        .set_bucket_if_not_exists(bucket)
        .map_err(ValveError::Internal)?;
    if !created {
        return Err(ValveError::AlreadyExists(id.to_string()));
    }

    Ok(id)
}

/// Cooperative admission check
///
/// Spends one token from the bucket of `owner_id` under `policy_id` on
/// behalf of `caller`. Nothing else happens: the guarded call is made
/// separately, and the target service looks for this check in the batch.
///
/// # Errors
///
/// - [`ValveError::Unauthorized`]: `caller` does not own the bucket, or the
///   bucket belongs to another policy
/// - [`ValveError::NotFound`]: the policy or bucket does not exist
/// - [`ValveError::QuotaExceeded`]: no tokens left in the current window
/// - [`ValveError::Internal`]: the store failed or kept changing under us
///
/// # Example
///
/// ```
/// use valve::{MemoryStore, check, create_bucket, create_policy};
/// use std::time::SystemTime;
///
/// let mut store = MemoryStore::new();
/// let now = SystemTime::now();
/// let alice = "alice".into();
///
/// let policy = create_policy(&mut store, "svc".into(), 111, 5, 60).unwrap();
/// create_bucket(&mut store, &policy, &alice, now).unwrap();
///
/// let admission = check(&mut store, &policy, &alice, &alice, now).unwrap();
/// assert_eq!(admission.tokens_remaining, 4);
///
/// // Nobody else can spend alice's quota
/// assert!(check(&mut store, &policy, &alice, &"mallory".into(), now).is_err());
/// ```
pub fn check<S: Store + ?Sized>(
    store: &mut S,
    policy_id: &PolicyId,
    owner_id: &OwnerId,
    caller: &OwnerId,
    now: SystemTime,
) -> Result<Admission, ValveError> {
    if owner_id != caller {
        return Err(ValveError::Unauthorized(format!(
            "{caller} cannot spend the quota of {owner_id}"
        )));
    }

    let now = unix_seconds(now)?;
    let policy = get_policy(store, policy_id)?;
    let bucket_id = BucketId::new(policy_id.clone(), owner_id.clone());

    let mut retries = 0;
    loop {
        let current = store
            .get_bucket(&bucket_id)
            .map_err(ValveError::Internal)?
            .ok_or_else(|| ValveError::NotFound(bucket_id.to_string()))?;

        if current.owner_id != *caller || current.policy_id != *policy_id {
            return Err(ValveError::Unauthorized(format!(
                "{bucket_id} does not belong to {caller}"
            )));
        }

        let mut next = current.clone();
        admit(&policy, &mut next, now)?;
        let admission = Admission::from(&next);

        let swapped = store
            .compare_and_swap_bucket(&current, next)
            .map_err(ValveError::Internal)?;
        if swapped {
            return Ok(admission);
        }

        // Someone else updated the bucket - retry with limit
        retries += 1;
        if retries >= MAX_RETRIES {
            return Err(ValveError::Internal("Max retries exceeded".into()));
        }
    }
}

/// Convert a timestamp to whole unix seconds
pub(crate) fn unix_seconds(now: SystemTime) -> Result<i64, ValveError> {
    now.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .map_err(|e| ValveError::Internal(format!("System time error: {e}")))
}
