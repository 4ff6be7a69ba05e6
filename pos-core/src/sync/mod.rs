//! 订单同步引擎
//!
//! Drains the offline order queue against the backend, one order at a time.
//! Submission is strictly sequential per session: parallel order creation
//! would race the server-side order numbering.
//!
//! # Guarantees
//!
//! - An order is marked Synced only on a confirmed server acknowledgement
//! - Re-syncing an already-Synced order performs zero remote calls
//! - A failure on one order never aborts the batch

mod coordinator;
mod format;
mod worker;

pub use coordinator::SyncCoordinator;
pub use worker::SyncWorker;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::QueueError;
use crate::rpc::RpcError;

/// 同步错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("authorization rejected: {0}")]
    Auth(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server rejected order: {0}")]
    Rejected(String),

    #[error("malformed order payload: {0}")]
    Payload(String),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<RpcError> for SyncError {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Auth(detail) => SyncError::Auth(detail),
            RpcError::Transport(detail) => SyncError::Transport(detail),
            RpcError::Protocol(detail) => SyncError::Transport(detail),
            RpcError::Server { code, message } => {
                SyncError::Rejected(format!("{code}: {message}"))
            }
        }
    }
}

/// Outcome of one order inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSyncResult {
    pub local_id: String,
    pub server_id: Option<i64>,
    pub error: Option<String>,
}

/// Aggregate result of a queue drain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced: usize,
    pub total: usize,
    pub results: Vec<OrderSyncResult>,
}

impl SyncReport {
    pub fn fully_synced(&self) -> bool {
        self.synced == self.total
    }
}
