//! # Valve Server
//!
//! A standalone admission-control gateway with an HTTP/JSON interface.
//!
//! ## Purpose
//!
//! Valve Server keeps per-caller quotas for protected target services and
//! runs batches of requests against them atomically. A caller either checks
//! its quota and then calls the target in the same batch, or lets the
//! gateway call the target on its behalf. Either way, a failure anywhere in
//! the batch gives the spent quota back.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! valve --help
//!
//! # Serve the example target, 5 calls per minute per caller
//! valve --http --http-port 8080 --example-target --policy example:111:5:60
//!
//! # List all available environment variables
//! valve --list-env-vars
//! ```
//!
//! ## Configuration
//!
//! Configure via CLI arguments or environment variables (CLI takes precedence):
//!
//! - **Transport**: `--http`, `--http-host`, `--http-port`
//! - **Store**: `--store-capacity 100000`
//! - **Policies**: `--policy target:endpoint:max_requests:window_seconds` (repeatable)
//! - **Example target**: `--example-target`, `--example-target-id example`
//! - **Log Level**: `--log-level error|warn|info|debug|trace`
//!
//! ## How It Works
//!
//! Quotas use a fixed window:
//! - Each `(policy, caller)` pair gets a bucket holding `max_requests` tokens
//! - Every admission check spends one token
//! - Once `window_seconds` have passed since the window opened, the next
//!   check refills the bucket before spending
//! - Denied checks receive `retry_after`, the seconds until the refill
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────┐
//!                    │    HTTP     │
//!                    │  Transport  │
//!                    └──────┬──────┘
//!                           │
//!                     ┌─────▼─────┐
//!                     │   Actor   │
//!                     │  (Owns    │
//!                     │  Gateway) │
//!                     └─────┬─────┘
//!                           │
//!              ┌────────────┴────────────┐
//!        ┌─────▼─────┐             ┌─────▼─────┐
//!        │   Store   │             │  Targets  │
//!        └───────────┘             └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Create a policy and a bucket
//! curl -X POST http://localhost:8080/policies \
//!   -H "Content-Type: application/json" \
//!   -d '{"target_service_id": "example", "endpoint_id": 111, "max_requests": 5, "window_seconds": 60}'
//! curl -X POST http://localhost:8080/buckets \
//!   -H "Content-Type: application/json" \
//!   -d '{"caller": "alice", "target_service_id": "example", "endpoint_id": 111}'
//!
//! # Delegated call: example target adds 2 + 3
//! curl -X POST http://localhost:8080/batch \
//!   -H "Content-Type: application/json" \
//!   -d '{"caller": "alice", "requests": [{"type": "call", "target_service_id": "example",
//!        "endpoint_id": 111, "data": [1, 2, 0, 0, 0, 3, 0, 0, 0]}]}'
//! ```

pub mod actor;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod targets;
pub mod transport;
pub mod types;

#[cfg(test)]
mod actor_tests;
