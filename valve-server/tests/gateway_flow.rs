use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};
use tower::ServiceExt;
use valve_server::config::{Config, HttpConfig, PolicySpec, StoreConfig, TransportConfig};
use valve_server::gateway::create_gateway;
use valve_server::metrics::Metrics;
use valve_server::targets::{ExampleTarget, METHOD_TEST_CPI};
use valve_server::transport::http::router_with_clock;
use valve_server::types::{BatchResponse, ErrorBody, OutcomeBody};

fn config() -> Config {
    Config {
        transports: TransportConfig {
            http: Some(HttpConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            }),
        },
        store: StoreConfig { capacity: 1_000 },
        buffer_size: 64,
        log_level: "info".to_string(),
        policies: vec![PolicySpec::from_str("example:111:2:60").unwrap()],
        example_target: Some("example".to_string()),
    }
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_configured_gateway_serves_delegated_calls() {
    let config = config();
    assert!(config.validate().is_ok());

    let handle = create_gateway(&config).unwrap();
    let now = Arc::new(AtomicU64::new(5000));
    let clock = now.clone();
    let app = router_with_clock(
        handle,
        Arc::new(Metrics::new()),
        Arc::new(move || UNIX_EPOCH + Duration::from_secs(clock.load(Ordering::SeqCst))),
    );

    // Policies from the configuration exist; only the bucket is missing
    let (status, _) = post(
        &app,
        "/buckets",
        json!({"caller": "alice", "target_service_id": "example", "endpoint_id": 111}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let call = || {
        json!({
            "caller": "alice",
            "requests": [{
                "type": "call",
                "target_service_id": "example",
                "endpoint_id": 111,
                "data": ExampleTarget::encode(METHOD_TEST_CPI, 1, 1)
            }]
        })
    };

    now.store(5001, Ordering::SeqCst);
    for _ in 0..2 {
        let (status, body) = post(&app, "/batch", call()).await;
        assert_eq!(status, StatusCode::OK);
        let response: BatchResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            response.outcomes,
            vec![OutcomeBody::Returned {
                data: 2u64.to_le_bytes().to_vec()
            }]
        );
    }

    now.store(5002, Ordering::SeqCst);
    let (status, body) = post(&app, "/batch", call()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let error: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.retry_after, Some(58));

    now.store(5060, Ordering::SeqCst);
    let (status, _) = post(&app, "/batch", call()).await;
    assert_eq!(status, StatusCode::OK);
}
