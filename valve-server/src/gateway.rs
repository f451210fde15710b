//! Gateway factory
//!
//! Builds the in-memory gateway from configuration, registers the targets
//! this server hosts, creates the configured policies and hands the result
//! to a freshly spawned actor.

use crate::actor::{GatewayActor, GatewayHandle};
use crate::config::{Config, PolicySpec};
use crate::targets::ExampleTarget;
use anyhow::{Result, anyhow};
use std::time::SystemTime;
use valve::{Batch, Gateway, MemoryStore, Request};

/// Caller used for policies created by the server itself
pub const ADMIN_CALLER: &str = "admin";

/// Build the gateway described by `config`
///
/// Startup policies are created in a single batch: if one of them is
/// rejected, none are created.
pub fn build_gateway(config: &Config, now: SystemTime) -> Result<Gateway<MemoryStore>> {
    let store = MemoryStore::builder().capacity(config.store.capacity).build();
    let mut gateway = Gateway::new(store);

    if let Some(id) = &config.example_target {
        gateway.register_target(id.as_str(), ExampleTarget::new(id.as_str()));
        tracing::info!("Registered example target '{}'", id);
    }

    if !config.policies.is_empty() {
        let batch = config
            .policies
            .iter()
            .fold(Batch::new(ADMIN_CALLER), |batch, spec| {
                batch.with(policy_request(spec))
            });
        gateway
            .submit(batch, now)
            .map_err(|e| anyhow!("Failed to create startup policies: {e}"))?;

        for spec in &config.policies {
            tracing::info!(
                "Created policy {}:{} ({} requests per {}s)",
                spec.target_service_id,
                spec.endpoint_id,
                spec.max_requests,
                spec.window_seconds
            );
        }
    }

    Ok(gateway)
}

/// Build the gateway and spawn the actor that owns it
pub fn create_gateway(config: &Config) -> Result<GatewayHandle> {
    let gateway = build_gateway(config, SystemTime::now())?;
    Ok(GatewayActor::spawn(config.buffer_size, gateway))
}

fn policy_request(spec: &PolicySpec) -> Request {
    Request::CreatePolicy {
        target_service_id: spec.target_service_id.as_str().into(),
        endpoint_id: spec.endpoint_id,
        max_requests: spec.max_requests,
        window_seconds: spec.window_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, StoreConfig, TransportConfig};
    use std::str::FromStr;
    use valve::PolicyId;

    fn config(policies: &[&str]) -> Config {
        Config {
            transports: TransportConfig {
                http: Some(HttpConfig {
                    host: "127.0.0.1".to_string(),
                    port: 0,
                }),
            },
            store: StoreConfig { capacity: 100 },
            buffer_size: 16,
            log_level: "info".to_string(),
            policies: policies
                .iter()
                .map(|s| PolicySpec::from_str(s).unwrap())
                .collect(),
            example_target: Some("example".to_string()),
        }
    }

    #[test]
    fn test_build_gateway_creates_policies() {
        let gateway =
            build_gateway(&config(&["example:111:5:60", "other:1:1:1"]), SystemTime::now())
                .unwrap();

        let policy = gateway
            .policy(&PolicyId::new("example", 111))
            .unwrap()
            .unwrap();
        assert_eq!(policy.max_requests, 5);
        assert_eq!(gateway.store().policy_count(), 2);
        assert!(gateway.targets().contains(&"example".into()));
    }

    #[test]
    fn test_build_gateway_rejects_invalid_policy() {
        // Zero window passes parsing but not policy creation
        let result = build_gateway(&config(&["example:111:5:0"]), SystemTime::now());
        assert!(result.is_err());
    }
}
