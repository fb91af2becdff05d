//! 配置管理
//!
//! 配置分为五个部分：
//!
//! - **database**: SQLite 连接池
//! - **api**: HTTP 监听地址、CORS 与认证
//! - **cache**: 任务目录缓存的过期时间
//! - **engine**: 引擎操作超时与积分写入重试次数
//! - **observability**: 日志级别与格式
//!
//! 加载顺序为 默认值 → TOML 文件 → `CADET_` 前缀的环境变量，
//! 嵌套字段以 `__` 分隔，例如 `CADET_ENGINE__SCORE_RETRY_LIMIT=3`。

pub mod models;

pub use models::*;

#[cfg(test)]
mod tests;
