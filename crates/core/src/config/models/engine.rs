use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 积分引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 单个引擎操作（含其全部存储调用）的超时时间
    pub request_timeout_ms: u64,
    /// 积分聚合乐观并发写入的最大尝试次数
    pub score_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            score_retry_limit: 5,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        if self.score_retry_limit == 0 {
            return Err(anyhow::anyhow!("积分写入重试次数必须大于0"));
        }

        Ok(())
    }
}

/// 任务目录缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub task_list_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            task_list_ttl_seconds: 60,
        }
    }
}

impl CacheConfig {
    pub fn task_list_ttl(&self) -> Duration {
        Duration::from_secs(self.task_list_ttl_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_list_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("缓存过期时间必须大于0"));
        }

        Ok(())
    }
}
