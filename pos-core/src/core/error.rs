//! 核心错误类型
//!
//! Each subsystem carries its own `thiserror` enum; `CoreError` is the
//! crate-level umbrella the public entry points return.

use thiserror::Error;

use crate::queue::QueueError;
use crate::rpc::RpcError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::store::schema::SchemaError;
use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// 核心操作的 Result 类型别名
pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether this error is the destructive-reset signal: the store was
    /// recreated and the caller must retry initialization.
    pub fn needs_reload(&self) -> bool {
        matches!(self, CoreError::Schema(SchemaError::NeedsReload))
    }

    /// Whether the remote rejected us for authorization reasons. Not
    /// retryable by this core; re-authentication is the host's job.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            CoreError::Rpc(RpcError::Auth(_)) => true,
            CoreError::Sync(SyncError::Auth(_)) => true,
            CoreError::Session(SessionError::Rpc(RpcError::Auth(_))) => true,
            _ => false,
        }
    }
}
