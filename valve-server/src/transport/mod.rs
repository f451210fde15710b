//! Transport layer for the gateway server
//!
//! Transports accept client connections, turn requests into batches and
//! forward them to the gateway actor. All transports share the same
//! gateway state through a [`GatewayHandle`].
//!
//! # Available Transports
//!
//! - [`http`]: REST API with JSON payloads

pub mod http;


use crate::actor::GatewayHandle;
use anyhow::Result;
use async_trait::async_trait;

/// Common interface for all transport implementations
#[async_trait]
pub trait Transport {
    /// Start the transport server
    ///
    /// Binds to the configured address and serves requests until an error
    /// occurs or the server shuts down.
    async fn start(self, gateway: GatewayHandle) -> Result<()>;
}
