//! 存储调用的超时控制
//!
//! 超时只施加在单个存储调用上，不包住整个引擎操作：存储层的每个条件操作
//! 要么整体生效要么完全不生效，因此在两次调用之间不会留下半完成的状态。
//! 超时视为存储不可用，调用方应整体重试该操作。
//!
//! 已经产生持久写入的后续步骤（罚分后的释放、审核后的计分）通过 `run_to_completion`
//! 放到独立任务里执行，调用方的 future 被丢弃也不会打断它们。

use std::future::Future;
use std::time::Duration;

use cadet_core::{config::EngineConfig, CadetError, CadetResult};
use tokio::time::timeout;
use tracing::{error, instrument, warn, Instrument};

/// 超时配置
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// 单个存储调用的超时时间
    pub request_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for TimeoutConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutHandler {
    config: TimeoutConfig,
}

impl TimeoutHandler {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(TimeoutConfig::default())
    }

    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    /// 在请求超时内执行一次存储调用
    #[instrument(level = "debug", skip(self, operation))]
    pub async fn store_operation<F, T>(
        &self,
        operation: F,
        operation_name: &str,
    ) -> CadetResult<T>
    where
        F: Future<Output = CadetResult<T>>,
    {
        self.execute_with_timeout(operation, self.config.request_timeout, operation_name)
            .await
    }

    #[instrument(skip(self, operation))]
    pub async fn custom_timeout_operation<F, T>(
        &self,
        operation: F,
        timeout_duration: Duration,
        operation_name: &str,
    ) -> CadetResult<T>
    where
        F: Future<Output = CadetResult<T>>,
    {
        self.execute_with_timeout(operation, timeout_duration, operation_name)
            .await
    }

    async fn execute_with_timeout<F, T>(
        &self,
        operation: F,
        timeout_duration: Duration,
        operation_name: &str,
    ) -> CadetResult<T>
    where
        F: Future<Output = CadetResult<T>>,
    {
        match timeout(timeout_duration, operation).await {
            Ok(result) => result,
            Err(_) => {
                let error_msg =
                    format!("操作 '{operation_name}' 超时 (超时时间: {timeout_duration:?})");
                error!("{}", error_msg);
                Err(CadetError::store_unavailable(error_msg))
            }
        }
    }
}

/// 在独立任务中把已开始写入的步骤执行到底
///
/// 调用方被取消时任务照常运行；其中每个存储调用各自有超时，因此任务总会结束。
/// 任务沿用调用方当前的 span。
pub async fn run_to_completion<F, T>(operation: F, operation_name: &str) -> CadetResult<T>
where
    F: Future<Output = CadetResult<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(operation.in_current_span()).await {
        Ok(result) => result,
        Err(join_error) => {
            warn!(operation = operation_name, error = %join_error, "后台步骤异常结束");
            Err(CadetError::Internal(format!(
                "操作 '{operation_name}' 的后续步骤异常结束: {join_error}"
            )))
        }
    }
}
