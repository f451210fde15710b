use anyhow::Result;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot};
use valve::{
    Batch, BatchError, BatchReceipt, Bucket, BucketId, Gateway, Policy, PolicyId, Store,
    ValveError,
};

/// Reply to a submitted batch
pub type BatchReply = Result<BatchReceipt, BatchError>;

/// Message types for the gateway actor
pub enum GatewayMessage {
    Submit {
        batch: Batch,
        timestamp: SystemTime,
        response_tx: oneshot::Sender<BatchReply>,
    },
    GetPolicy {
        id: PolicyId,
        response_tx: oneshot::Sender<Result<Option<Policy>, ValveError>>,
    },
    GetBucket {
        id: BucketId,
        response_tx: oneshot::Sender<Result<Option<Bucket>, ValveError>>,
    },
}

/// Handle to communicate with the gateway actor
///
/// The outer `Result` reports a dead actor; the inner one is the
/// gateway's own answer.
#[derive(Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<GatewayMessage>,
}

impl GatewayHandle {
    /// Run a batch atomically
    pub async fn submit(&self, batch: Batch, timestamp: SystemTime) -> Result<BatchReply> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(GatewayMessage::Submit {
            batch,
            timestamp,
            response_tx,
        })
        .await?;
        receive(response_rx).await
    }

    pub async fn policy(&self, id: PolicyId) -> Result<Result<Option<Policy>, ValveError>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(GatewayMessage::GetPolicy { id, response_tx })
            .await?;
        receive(response_rx).await
    }

    pub async fn bucket(&self, id: BucketId) -> Result<Result<Option<Bucket>, ValveError>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(GatewayMessage::GetBucket { id, response_tx })
            .await?;
        receive(response_rx).await
    }

    async fn send(&self, msg: GatewayMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("Gateway actor has shut down"))
    }
}

async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T> {
    rx.await
        .map_err(|_| anyhow::anyhow!("Gateway actor dropped response channel"))
}

/// The gateway actor
///
/// Owns the gateway and serves one message at a time, so batches touching
/// the same bucket never interleave.
pub struct GatewayActor;

impl GatewayActor {
    pub fn spawn<S>(buffer_size: usize, gateway: Gateway<S>) -> GatewayHandle
    where
        S: Store + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer_size);

        tokio::spawn(async move {
            run_actor(rx, gateway).await;
        });

        GatewayHandle { tx }
    }
}

async fn run_actor<S: Store>(mut rx: mpsc::Receiver<GatewayMessage>, mut gateway: Gateway<S>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            GatewayMessage::Submit {
                batch,
                timestamp,
                response_tx,
            } => {
                let reply = handle_submit(&mut gateway, batch, timestamp);
                // Ignore send errors - receiver may have timed out
                let _ = response_tx.send(reply);
            }
            GatewayMessage::GetPolicy { id, response_tx } => {
                let _ = response_tx.send(gateway.policy(&id));
            }
            GatewayMessage::GetBucket { id, response_tx } => {
                let _ = response_tx.send(gateway.bucket(&id));
            }
        }
    }

    tracing::info!("Gateway actor shutting down");
}

fn handle_submit<S: Store>(
    gateway: &mut Gateway<S>,
    batch: Batch,
    timestamp: SystemTime,
) -> BatchReply {
    let caller = batch.caller.clone();
    let size = batch.requests.len();

    let reply = gateway.submit(batch, timestamp);
    match &reply {
        Ok(_) => tracing::debug!("Committed batch of {} from {}", size, caller),
        Err(e) => match &e.error {
            ValveError::Internal(_) => tracing::error!("Batch from {} failed: {}", caller, e),
            ValveError::QuotaExceeded { .. }
            | ValveError::Unauthorized(_)
            | ValveError::AdmissionRequired => {
                tracing::warn!("Batch from {} denied: {}", caller, e)
            }
            _ => tracing::debug!("Batch from {} rejected: {}", caller, e),
        },
    }
    reply
}
