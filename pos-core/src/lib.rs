//! pos-core - 离线优先收银客户端核心
//!
//! Offline-first core of a point-of-sale client. Keeps reference data
//! (products, taxes, payment methods, sessions) in a local store with
//! freshness control, and queues locally created orders for exactly-once
//! reconciliation with the remote backend.
//!
//! # 架构概述
//!
//! - **本地存储** (`store`): named partitions on an embedded redb database,
//!   plus schema versioning with additive migrations
//! - **数据规范化** (`records`): heterogeneous remote payload shapes folded
//!   into one canonical `RecordSet`
//! - **数据缓存** (`cache`): TTL + session-identity freshness control over
//!   the reference data partitions
//! - **离线订单** (`queue`): durable queue of locally captured orders
//! - **同步引擎** (`sync`): sequential queue drain against the backend,
//!   idempotent per order
//! - **会话生命周期** (`session`): POS session state machine with an
//!   ownership guard
//!
//! # 模块结构
//!
//! ```text
//! pos-core/src/
//! ├── core/          # 配置、上下文、错误
//! ├── store/         # 本地分区存储 + schema 管理
//! ├── records/       # RecordSet 规范化
//! ├── cache/         # 参考数据缓存
//! ├── queue/         # 离线订单队列
//! ├── sync/          # 订单同步引擎
//! ├── session/       # POS 会话生命周期
//! ├── rpc/           # 远端 RPC 客户端
//! └── util/          # 工具函数
//! ```

pub mod cache;
pub mod core;
pub mod queue;
pub mod records;
pub mod rpc;
pub mod session;
pub mod store;
pub mod sync;
pub mod util;

// Re-export 公共类型
pub use crate::core::{Config, CoreContext, CoreError, CoreResult};
pub use cache::{CacheMetadata, DataCache};
pub use queue::{OfflineOrder, OfflineOrderQueue, OrderStatus, QueueError};
pub use records::{Record, RecordSet, normalize};
pub use rpc::{HttpRpcClient, RpcError, RpcTransport};
pub use session::{PosSession, SessionError, SessionLifecycle, SessionState};
pub use store::schema::{CURRENT_SCHEMA_VERSION, PartitionCatalog, SchemaError, SchemaManager};
pub use store::{Store, StoreError};
pub use sync::{SyncCoordinator, SyncError, SyncReport, SyncWorker};

// Re-export logger functions
pub use util::logger::{init_logger, init_logger_with_file};
