//! Queue drain against the backend

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::format;
use super::{OrderSyncResult, SyncError, SyncReport};
use crate::core::context::CoreContext;
use crate::queue::{OfflineOrderQueue, OrderStatus, QueueError};

const ORDER_MODEL: &str = "orders";

/// 同步协调器
///
/// Reconciles locally queued orders with the backend. Submission is
/// serialized behind a lock so two drains can never interleave order
/// creation within one session.
pub struct SyncCoordinator {
    ctx: Arc<CoreContext>,
    queue: OfflineOrderQueue,
    submit_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(ctx: Arc<CoreContext>, queue: OfflineOrderQueue) -> Self {
        Self {
            ctx,
            queue,
            submit_lock: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &OfflineOrderQueue {
        &self.queue
    }

    /// Submit one order.
    ///
    /// Already-Synced orders are a no-op returning the recorded server id,
    /// with no remote call: this protects against duplicate creation when a
    /// retry fires after a success whose acknowledgement was lost. On
    /// failure the order moves to Failed (still retry-eligible) and the
    /// error is returned, never thrown through the batch.
    pub async fn sync_one(&self, local_id: &str) -> Result<i64, SyncError> {
        let order = match self.queue.by_local_id(local_id) {
            Ok(order) => order,
            Err(QueueError::NotFound(id)) => return Err(SyncError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };

        if order.status == OrderStatus::Synced {
            tracing::debug!(local_id, "order already synced, skipping");
            return order.server_id.ok_or_else(|| {
                SyncError::Payload("synced order carries no server id".into())
            });
        }

        let _guard = self.submit_lock.lock().await;

        let wire = match format::to_wire(&order) {
            Ok(wire) => wire,
            Err(e) => {
                self.record_failure(local_id, &e).await?;
                return Err(e);
            }
        };

        match self
            .ctx
            .rpc
            .call(ORDER_MODEL, "create", json!([wire]), json!({}))
            .await
        {
            Ok(result) => match parse_server_id(&result) {
                Some(server_id) => {
                    self.queue
                        .set_status(local_id, OrderStatus::Synced, Some(server_id))?;
                    tracing::info!(local_id, server_id, "order synced");
                    Ok(server_id)
                }
                None => {
                    let e =
                        SyncError::Rejected(format!("create returned no order id: {result}"));
                    self.record_failure(local_id, &e).await?;
                    Err(e)
                }
            },
            Err(rpc_error) => {
                let e = SyncError::from(rpc_error);
                self.record_failure(local_id, &e).await?;
                Err(e)
            }
        }
    }

    /// Drain the queue sequentially. Per-order failures are captured in the
    /// report; the batch always runs to the end.
    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        let pending = self.queue.pending()?;
        let total = pending.len();
        let mut results = Vec::with_capacity(total);
        let mut synced = 0;

        for order in &pending {
            match self.sync_one(&order.local_id).await {
                Ok(server_id) => {
                    synced += 1;
                    results.push(OrderSyncResult {
                        local_id: order.local_id.clone(),
                        server_id: Some(server_id),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(local_id = %order.local_id, error = %e, "order sync failed");
                    results.push(OrderSyncResult {
                        local_id: order.local_id.clone(),
                        server_id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if total > 0 {
            tracing::info!(synced, total, "queue drain finished");
        }
        Ok(SyncReport {
            synced,
            total,
            results,
        })
    }

    async fn record_failure(&self, local_id: &str, error: &SyncError) -> Result<(), SyncError> {
        self.queue.mark_attempt(local_id, &error.to_string())?;
        self.queue.set_status(local_id, OrderStatus::Failed, None)?;
        Ok(())
    }
}

/// Server acknowledgement: a bare id or an object carrying one
fn parse_server_id(result: &Value) -> Option<i64> {
    result
        .as_i64()
        .or_else(|| result.get("id").and_then(Value::as_i64))
}
