use std::path::PathBuf;

/// 客户端核心配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | POS_BASE_URL | http://localhost:3000 | 后端 API 地址 |
/// | POS_DATABASE | pos | 租户/数据库标识 |
/// | WORK_DIR | /var/lib/pos-core | 工作目录（本地存储文件） |
/// | RPC_TIMEOUT_MS | 30000 | RPC 请求超时(毫秒) |
/// | SYNC_INTERVAL_SECS | 60 | 后台同步扫描间隔(秒) |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// POS_BASE_URL=https://backend:8443 WORK_DIR=/data/pos cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 后端 API 基础地址
    pub base_url: String,
    /// 租户/数据库标识，随每个 RPC 请求发送
    pub database: String,
    /// 工作目录，存放本地存储文件与日志
    pub work_dir: String,
    /// RPC 请求超时 (毫秒)
    pub rpc_timeout_ms: u64,
    /// 后台同步扫描间隔 (秒)
    pub sync_interval_secs: u64,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("POS_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            database: std::env::var("POS_DATABASE").unwrap_or_else(|_| "pos".into()),
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/pos-core".into()),
            rpc_timeout_ms: std::env::var("RPC_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30000),
            sync_interval_secs: std::env::var("SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.base_url = base_url.into();
        config.database = database.into();
        config
    }

    /// 本地存储文件路径
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("pos-core.redb")
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
