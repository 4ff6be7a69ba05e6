//! 工具模块 - 通用工具函数
//!
//! - [`time::now_millis`] - 当前 Unix 时间戳（毫秒）
//! - [`logger`] - tracing 日志初始化

pub mod logger;
pub mod time;

pub use time::now_millis;
