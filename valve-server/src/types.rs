//! JSON wire types for the HTTP interface
//!
//! Requests are parsed into these types by the transport and converted
//! into [`valve::Batch`] values before they reach the gateway actor.
//! Responses are built from the gateway's receipts and errors.
//!
//! Requests carry no time: the server reads its own clock when it hands a
//! batch to the gateway. Timestamps in responses are unix seconds. Payloads
//! (`data`) are arrays of bytes.

use serde::{Deserialize, Serialize};
use valve::{
    Batch, BatchError, BatchReceipt, Bucket, Outcome, OwnerId, Policy, PolicyId, Request,
    ValveError,
};

/// One request inside a batch
///
/// `owner_id` defaults to the batch caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    CreatePolicy {
        target_service_id: String,
        endpoint_id: u32,
        max_requests: u32,
        window_seconds: u32,
    },
    CreateBucket {
        target_service_id: String,
        endpoint_id: u32,
        #[serde(default)]
        owner_id: Option<String>,
    },
    Check {
        target_service_id: String,
        endpoint_id: u32,
        #[serde(default)]
        owner_id: Option<String>,
    },
    Call {
        target_service_id: String,
        endpoint_id: u32,
        #[serde(default)]
        owner_id: Option<String>,
        /// Service to forward to, defaults to the policy's target
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        data: Vec<u8>,
        #[serde(default)]
        refs: Vec<String>,
    },
    Invoke {
        target_service_id: String,
        #[serde(default)]
        data: Vec<u8>,
        #[serde(default)]
        refs: Vec<String>,
    },
}

impl RequestBody {
    pub fn into_request(self, caller: &OwnerId) -> Request {
        let owner = |owner_id: Option<String>| {
            owner_id
                .map(OwnerId::from)
                .unwrap_or_else(|| caller.clone())
        };

        match self {
            RequestBody::CreatePolicy {
                target_service_id,
                endpoint_id,
                max_requests,
                window_seconds,
            } => Request::CreatePolicy {
                target_service_id: target_service_id.into(),
                endpoint_id,
                max_requests,
                window_seconds,
            },
            RequestBody::CreateBucket {
                target_service_id,
                endpoint_id,
                owner_id,
            } => Request::CreateBucket {
                policy_id: PolicyId::new(target_service_id, endpoint_id),
                owner_id: owner(owner_id),
            },
            RequestBody::Check {
                target_service_id,
                endpoint_id,
                owner_id,
            } => Request::Check {
                policy_id: PolicyId::new(target_service_id, endpoint_id),
                owner_id: owner(owner_id),
            },
            RequestBody::Call {
                target_service_id,
                endpoint_id,
                owner_id,
                target,
                data,
                refs,
            } => {
                let target = target.unwrap_or_else(|| target_service_id.clone());
                Request::Call {
                    policy_id: PolicyId::new(target_service_id, endpoint_id),
                    owner_id: owner(owner_id),
                    target_service_id: target.into(),
                    data,
                    refs,
                }
            }
            RequestBody::Invoke {
                target_service_id,
                data,
                refs,
            } => Request::Invoke {
                target_service_id: target_service_id.into(),
                data,
                refs,
            },
        }
    }
}

/// Body of `POST /batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Submitter of the batch
    pub caller: String,
    pub requests: Vec<RequestBody>,
}

impl BatchRequest {
    pub fn into_batch(self) -> Batch {
        let caller = OwnerId::from(self.caller);
        let requests = self
            .requests
            .into_iter()
            .map(|body| body.into_request(&caller))
            .collect();
        Batch { caller, requests }
    }
}

/// Body of `POST /policies`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub target_service_id: String,
    pub endpoint_id: u32,
    pub max_requests: u32,
    pub window_seconds: u32,
}

/// Body of `POST /buckets` and `POST /check`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRequest {
    pub caller: String,
    pub target_service_id: String,
    pub endpoint_id: u32,
}

impl OwnerRequest {
    pub fn policy_id(&self) -> PolicyId {
        PolicyId::new(self.target_service_id.as_str(), self.endpoint_id)
    }
}

/// Result of one request in a committed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeBody {
    PolicyCreated {
        target_service_id: String,
        endpoint_id: u32,
    },
    BucketCreated {
        target_service_id: String,
        endpoint_id: u32,
        owner_id: String,
    },
    Admitted {
        target_service_id: String,
        endpoint_id: u32,
        owner_id: String,
        tokens_remaining: u32,
        window_start: i64,
    },
    Returned {
        data: Vec<u8>,
    },
}

impl From<Outcome> for OutcomeBody {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::PolicyCreated(id) => OutcomeBody::PolicyCreated {
                target_service_id: id.target_service_id.to_string(),
                endpoint_id: id.endpoint_id,
            },
            Outcome::BucketCreated(id) => OutcomeBody::BucketCreated {
                target_service_id: id.policy_id.target_service_id.to_string(),
                endpoint_id: id.policy_id.endpoint_id,
                owner_id: id.owner_id.to_string(),
            },
            Outcome::Admitted(admission) => OutcomeBody::Admitted {
                target_service_id: admission.policy_id.target_service_id.to_string(),
                endpoint_id: admission.policy_id.endpoint_id,
                owner_id: admission.owner_id.to_string(),
                tokens_remaining: admission.tokens_remaining,
                window_start: admission.window_start,
            },
            Outcome::Returned(data) => OutcomeBody::Returned { data },
        }
    }
}

/// Response of `POST /batch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub outcomes: Vec<OutcomeBody>,
}

impl From<BatchReceipt> for BatchResponse {
    fn from(receipt: BatchReceipt) -> Self {
        BatchResponse {
            outcomes: receipt.outcomes.into_iter().map(OutcomeBody::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyBody {
    pub target_service_id: String,
    pub endpoint_id: u32,
    pub max_requests: u32,
    pub window_seconds: u32,
}

impl From<Policy> for PolicyBody {
    fn from(policy: Policy) -> Self {
        PolicyBody {
            target_service_id: policy.target_service_id.to_string(),
            endpoint_id: policy.endpoint_id,
            max_requests: policy.max_requests,
            window_seconds: policy.window_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBody {
    pub target_service_id: String,
    pub endpoint_id: u32,
    pub owner_id: String,
    pub tokens_remaining: u32,
    /// Unix timestamp in seconds of the current window start
    pub window_start: i64,
}

impl From<Bucket> for BucketBody {
    fn from(bucket: Bucket) -> Self {
        BucketBody {
            target_service_id: bucket.policy_id.target_service_id.to_string(),
            endpoint_id: bucket.policy_id.endpoint_id,
            owner_id: bucket.owner_id.to_string(),
            tokens_remaining: bucket.tokens_remaining,
            window_start: bucket.window_start,
        }
    }
}

/// Error response format
///
/// ```json
/// {
///   "error": "request 0 failed: rate limit exceeded, retry after 42s",
///   "kind": "quota_exceeded",
///   "index": 0,
///   "retry_after": 42
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    /// Index of the failing request, for batch errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Seconds until the quota refills, for `quota_exceeded`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&ValveError> for ErrorBody {
    fn from(error: &ValveError) -> Self {
        let retry_after = match error {
            ValveError::QuotaExceeded { retry_after } => Some(*retry_after),
            _ => None,
        };
        ErrorBody {
            error: error.to_string(),
            kind: error.kind().to_string(),
            index: None,
            retry_after,
        }
    }
}

impl From<&BatchError> for ErrorBody {
    fn from(error: &BatchError) -> Self {
        ErrorBody {
            error: error.to_string(),
            index: Some(error.index),
            ..ErrorBody::from(&error.error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_request_defaults_owner_to_caller() {
        let json = r#"{
            "caller": "alice",
            "requests": [
                {"type": "check", "target_service_id": "svc-a", "endpoint_id": 111},
                {"type": "invoke", "target_service_id": "svc-a", "data": [1, 2]}
            ]
        }"#;

        let request: BatchRequest = serde_json::from_str(json).unwrap();
        let batch = request.into_batch();
        assert_eq!(batch.caller, OwnerId::from("alice"));
        assert_eq!(
            batch.requests[0],
            Request::Check {
                policy_id: PolicyId::new("svc-a", 111),
                owner_id: "alice".into(),
            }
        );
        assert_eq!(
            batch.requests[1],
            Request::Invoke {
                target_service_id: "svc-a".into(),
                data: vec![1, 2],
                refs: vec![],
            }
        );
    }

    #[test]
    fn test_call_targets_policy_service_by_default() {
        let json = r#"{"type": "call", "target_service_id": "svc-a", "endpoint_id": 7, "owner_id": "bob"}"#;
        let body: RequestBody = serde_json::from_str(json).unwrap();

        match body.into_request(&"alice".into()) {
            Request::Call {
                owner_id,
                target_service_id,
                ..
            } => {
                assert_eq!(owner_id, OwnerId::from("bob"));
                assert_eq!(target_service_id.as_str(), "svc-a");
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_request_type_is_rejected() {
        let json = r#"{"type": "drain", "target_service_id": "svc-a"}"#;
        assert!(serde_json::from_str::<RequestBody>(json).is_err());
    }

    #[test]
    fn test_quota_error_body() {
        let error = BatchError {
            index: 2,
            error: ValveError::QuotaExceeded { retry_after: 42 },
        };

        let body = ErrorBody::from(&error);
        assert_eq!(body.kind, "quota_exceeded");
        assert_eq!(body.index, Some(2));
        assert_eq!(body.retry_after, Some(42));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["retry_after"], 42);
    }

    #[test]
    fn test_error_body_omits_empty_fields() {
        let body = ErrorBody::from(&ValveError::NotFound("policy:svc:1".into()));
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("index"));
        assert!(!json.contains("retry_after"));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = OutcomeBody::from(Outcome::PolicyCreated(PolicyId::new("svc-a", 111)));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "policy_created");
        assert_eq!(json["target_service_id"], "svc-a");
        assert_eq!(json["endpoint_id"], 111);
    }

    #[test]
    fn test_client_supplied_time_is_dropped() {
        let json = r#"{"caller": "alice", "timestamp": 4000000000, "requests": []}"#;
        let request: BatchRequest = serde_json::from_str(json).unwrap();

        let echoed = serde_json::to_value(&request).unwrap();
        assert!(echoed.get("timestamp").is_none());
        assert!(request.into_batch().requests.is_empty());
    }
}
