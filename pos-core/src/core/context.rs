//! CoreContext - 核心组件共享的上下文
//!
//! One explicitly constructed context object (config + store + RPC
//! transport) handed to every component. All persistence goes through the
//! injected [`Store`]; there are no ambient global handles.

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::CoreResult;
use crate::rpc::{HttpRpcClient, RpcTransport};
use crate::store::Store;
use crate::store::schema::{SchemaError, SchemaManager};

/// 核心上下文
pub struct CoreContext {
    /// 只读配置
    pub config: Config,
    /// 本地分区存储
    pub store: Store,
    /// 远端 RPC 传输层
    pub rpc: Arc<dyn RpcTransport>,
}

impl CoreContext {
    /// Initialize the context: prepare the work directory, open the local
    /// store at the current schema version and build the HTTP transport.
    ///
    /// If the store had structural drift, [`SchemaManager::ensure`] performs
    /// a destructive reset and signals `NeedsReload`; initialization is then
    /// retried exactly once against the freshly recreated store.
    pub fn init(config: Config) -> CoreResult<Arc<Self>> {
        std::fs::create_dir_all(&config.work_dir).map_err(SchemaError::from)?;

        let path = config.store_path();
        let store = match SchemaManager::ensure_current(&path) {
            Ok(store) => store,
            Err(SchemaError::NeedsReload) => {
                tracing::warn!(
                    path = %path.display(),
                    "store was reset, retrying initialization once"
                );
                SchemaManager::ensure_current(&path)?
            }
            Err(e) => return Err(e.into()),
        };

        let rpc = Arc::new(HttpRpcClient::new(&config)?);
        Ok(Arc::new(Self { config, store, rpc }))
    }

    /// Assemble a context from pre-built parts (tests, custom transports)
    pub fn with_parts(config: Config, store: Store, rpc: Arc<dyn RpcTransport>) -> Arc<Self> {
        Arc::new(Self { config, store, rpc })
    }
}
