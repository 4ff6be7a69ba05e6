//! 离线订单队列
//!
//! Durable queue of locally created orders, one blob per order in the
//! `offline_orders` partition keyed by the locally generated id. Orders are
//! never silently dropped: a failed sync keeps the order retry-eligible,
//! and only an explicit purge removes records (already Synced ones, for
//! housekeeping). The order record itself is retained after a successful
//! sync, marked Synced, for audit read-back.
//!
//! Ownership: this queue is the only writer of order records. The sync
//! engine mutates `status`/`server_id` through [`OfflineOrderQueue::set_status`],
//! never through the store directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::schema::PARTITION_OFFLINE_ORDERS;
use crate::store::{Store, StoreError};
use crate::util::now_millis;

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Captured locally, not yet acknowledged by the backend
    Pending,
    /// Acknowledged by the backend; carries the server id
    Synced,
    /// Last attempt failed; still retry-eligible
    Failed,
}

/// 本地捕获的订单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineOrder {
    /// Locally generated id, never server-assigned
    pub local_id: String,
    /// Backend id, set on acknowledged sync
    pub server_id: Option<i64>,
    /// Order payload as captured at checkout (flat JSON map)
    pub payload: Value,
    pub status: OrderStatus,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// 队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("order not found: {0}")]
    NotFound(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Per-status queue counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
}

/// 离线订单队列
#[derive(Clone)]
pub struct OfflineOrderQueue {
    store: Store,
}

impl OfflineOrderQueue {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Capture an order locally. Status starts Pending; the id is generated
    /// here and never reassigned.
    pub fn enqueue(&self, payload: Value) -> QueueResult<OfflineOrder> {
        let order = OfflineOrder {
            local_id: uuid::Uuid::new_v4().to_string(),
            server_id: None,
            payload,
            status: OrderStatus::Pending,
            created_at: now_millis(),
            last_attempt_at: None,
            attempts: 0,
            last_error: None,
        };
        self.write(&order)?;
        tracing::info!(local_id = %order.local_id, "order captured offline");
        Ok(order)
    }

    /// Transition an order's status; `server_id` is recorded when given
    pub fn set_status(
        &self,
        local_id: &str,
        status: OrderStatus,
        server_id: Option<i64>,
    ) -> QueueResult<()> {
        let mut order = self.by_local_id(local_id)?;
        order.status = status;
        if server_id.is_some() {
            order.server_id = server_id;
        }
        self.write(&order)?;
        Ok(())
    }

    /// Record a failed sync attempt (attempt counter, timestamp, last error)
    pub fn mark_attempt(&self, local_id: &str, error: &str) -> QueueResult<()> {
        let mut order = self.by_local_id(local_id)?;
        order.attempts += 1;
        order.last_attempt_at = Some(now_millis());
        order.last_error = Some(error.to_string());
        self.write(&order)?;
        Ok(())
    }

    /// Orders still awaiting reconciliation: Pending and Failed are both
    /// retry-eligible. Ordered by capture time.
    pub fn pending(&self) -> QueueResult<Vec<OfflineOrder>> {
        let mut orders: Vec<OfflineOrder> = self
            .all()?
            .into_iter()
            .filter(|o| o.status != OrderStatus::Synced)
            .collect();
        // Capture order, with the id as a deterministic tie-break
        orders.sort_by(|a, b| {
            (a.created_at, &a.local_id).cmp(&(b.created_at, &b.local_id))
        });
        Ok(orders)
    }

    /// Look up one order
    pub fn by_local_id(&self, local_id: &str) -> QueueResult<OfflineOrder> {
        match self.store.get(PARTITION_OFFLINE_ORDERS, local_id)? {
            Some(blob) => Ok(serde_json::from_slice(&blob)?),
            None => Err(QueueError::NotFound(local_id.to_string())),
        }
    }

    /// Every order in the queue, synced ones included
    pub fn all(&self) -> QueueResult<Vec<OfflineOrder>> {
        let mut orders = Vec::new();
        for blob in self.store.get_all(PARTITION_OFFLINE_ORDERS)? {
            orders.push(serde_json::from_slice(&blob)?);
        }
        Ok(orders)
    }

    /// Per-status counts
    pub fn stats(&self) -> QueueResult<QueueStats> {
        let mut stats = QueueStats::default();
        for order in self.all()? {
            match order.status {
                OrderStatus::Pending => stats.pending += 1,
                OrderStatus::Synced => stats.synced += 1,
                OrderStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// Explicit cleanup: remove Synced orders captured before the cutoff.
    /// Returns how many were removed. Never touches Pending/Failed orders.
    pub fn purge_synced(&self, older_than_millis: i64) -> QueueResult<usize> {
        let mut removed = 0;
        for order in self.all()? {
            if order.status == OrderStatus::Synced && order.created_at < older_than_millis {
                self.store
                    .delete(PARTITION_OFFLINE_ORDERS, Some(&order.local_id))?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "purged synced order history");
        }
        Ok(removed)
    }

    fn write(&self, order: &OfflineOrder) -> QueueResult<()> {
        let blob = serde_json::to_vec(order)?;
        self.store
            .put(PARTITION_OFFLINE_ORDERS, &order.local_id, &blob)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::SchemaManager;
    use serde_json::json;

    fn test_queue() -> OfflineOrderQueue {
        OfflineOrderQueue::new(SchemaManager::ensure_in_memory().unwrap())
    }

    fn order_payload() -> Value {
        json!({
            "lines": [{"product_id": 7, "qty": 2, "price_unit": 10}],
            "amount_total": 20,
        })
    }

    #[test]
    fn test_enqueue_starts_pending() {
        let queue = test_queue();
        let order = queue.enqueue(order_payload()).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.server_id.is_none());
        assert_eq!(order.attempts, 0);

        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, order.local_id);
        assert_eq!(pending[0].payload["amount_total"], 20);
    }

    #[test]
    fn test_status_transitions() {
        let queue = test_queue();
        let order = queue.enqueue(order_payload()).unwrap();

        queue
            .set_status(&order.local_id, OrderStatus::Synced, Some(555))
            .unwrap();
        let synced = queue.by_local_id(&order.local_id).unwrap();
        assert_eq!(synced.status, OrderStatus::Synced);
        assert_eq!(synced.server_id, Some(555));

        // A later transition without a server id keeps the recorded one
        queue
            .set_status(&order.local_id, OrderStatus::Synced, None)
            .unwrap();
        assert_eq!(queue.by_local_id(&order.local_id).unwrap().server_id, Some(555));
    }

    #[test]
    fn test_failed_orders_stay_retry_eligible() {
        let queue = test_queue();
        let a = queue.enqueue(order_payload()).unwrap();
        let b = queue.enqueue(order_payload()).unwrap();
        let c = queue.enqueue(order_payload()).unwrap();

        queue.set_status(&a.local_id, OrderStatus::Synced, Some(1)).unwrap();
        queue.set_status(&b.local_id, OrderStatus::Failed, None).unwrap();

        let pending = queue.pending().unwrap();
        let ids: Vec<&str> = pending.iter().map(|o| o.local_id.as_str()).collect();
        assert_eq!(pending.len(), 2);
        assert!(ids.contains(&b.local_id.as_str()));
        assert!(ids.contains(&c.local_id.as_str()));
    }

    #[test]
    fn test_attempt_bookkeeping() {
        let queue = test_queue();
        let order = queue.enqueue(order_payload()).unwrap();

        queue.mark_attempt(&order.local_id, "connection refused").unwrap();
        queue.mark_attempt(&order.local_id, "timeout").unwrap();

        let order = queue.by_local_id(&order.local_id).unwrap();
        assert_eq!(order.attempts, 2);
        assert_eq!(order.last_error.as_deref(), Some("timeout"));
        assert!(order.last_attempt_at.is_some());
    }

    #[test]
    fn test_not_found() {
        let queue = test_queue();
        assert!(matches!(
            queue.by_local_id("missing"),
            Err(QueueError::NotFound(_))
        ));
        assert!(matches!(
            queue.set_status("missing", OrderStatus::Failed, None),
            Err(QueueError::NotFound(_))
        ));
    }

    #[test]
    fn test_stats_and_purge() {
        let queue = test_queue();
        let a = queue.enqueue(order_payload()).unwrap();
        let _b = queue.enqueue(order_payload()).unwrap();
        queue.set_status(&a.local_id, OrderStatus::Synced, Some(9)).unwrap();

        assert_eq!(
            queue.stats().unwrap(),
            QueueStats { pending: 1, synced: 1, failed: 0 }
        );

        // Purge only touches synced history behind the cutoff
        let removed = queue.purge_synced(now_millis() + 1).unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(queue.by_local_id(&a.local_id), Err(QueueError::NotFound(_))));
        assert_eq!(queue.pending().unwrap().len(), 1);

        // Synced record is retained for read-back until explicitly purged
        let c = queue.enqueue(order_payload()).unwrap();
        queue.set_status(&c.local_id, OrderStatus::Synced, Some(10)).unwrap();
        let removed = queue.purge_synced(c.created_at).unwrap();
        assert_eq!(removed, 0);
        assert!(queue.by_local_id(&c.local_id).is_ok());
    }
}
