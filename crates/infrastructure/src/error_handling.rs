//! 仓储操作的错误上下文
//!
//! 把 sqlx 错误转换为 `CadetError`，同时记录是在对哪个实体做什么操作时出错。
//! 连接池超时、连接池关闭与 I/O 错误视为存储不可用，调用方可以整体重试；
//! 唯一约束冲突视为并发冲突。

use cadet_core::CadetError;
use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use std::fmt;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Operation context for repository operations
#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Delete,
    Query,
    ConditionalUpdate,
    ConditionalDelete,
    Migrate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::ConditionalUpdate => write!(f, "条件更新"),
            RepositoryOperation::ConditionalDelete => write!(f, "条件删除"),
            RepositoryOperation::Migrate => write!(f, "迁移"),
        }
    }
}

/// 被操作的实体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryEntity {
    Task,
    Submission,
    ScoreHistory,
    Scores,
    Cadet,
    Schema,
}

impl RepositoryEntity {
    fn label(&self) -> &'static str {
        match self {
            RepositoryEntity::Task => "任务",
            RepositoryEntity::Submission => "提交记录",
            RepositoryEntity::ScoreHistory => "积分流水",
            RepositoryEntity::Scores => "积分",
            RepositoryEntity::Cadet => "学员",
            RepositoryEntity::Schema => "数据库结构",
        }
    }
}

/// Context information for repository operations
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: RepositoryOperation,
    pub entity: RepositoryEntity,
    pub entity_id: Option<String>,
    pub task_id: Option<i64>,
    pub cadet_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub additional_info: Option<String>,
}

impl OperationContext {
    pub fn new(operation: RepositoryOperation, entity: RepositoryEntity) -> Self {
        Self {
            operation,
            entity,
            entity_id: None,
            task_id: None,
            cadet_id: None,
            timestamp: Utc::now(),
            additional_info: None,
        }
    }

    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_task_id(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_cadet_id(mut self, cadet_id: Uuid) -> Self {
        self.cadet_id = Some(cadet_id);
        self
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    pub fn entity_description(&self) -> String {
        let label = self.entity.label();
        let mut parts = Vec::new();
        if let Some(id) = &self.entity_id {
            parts.push(format!("ID: {id}"));
        }
        if let Some(task_id) = self.task_id {
            parts.push(format!("任务ID: {task_id}"));
        }
        if let Some(cadet_id) = self.cadet_id {
            parts.push(format!("学员: {cadet_id}"));
        }
        if parts.is_empty() {
            label.to_string()
        } else {
            format!("{label} ({})", parts.join(", "))
        }
    }
}

/// Enhanced error helpers for repository operations
pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 把 sqlx 错误转换为带上下文的 `CadetError`
    #[instrument(skip_all, fields(
        operation = %context.operation,
        task_id = ?context.task_id,
        cadet_id = ?context.cadet_id,
        timestamp = %context.timestamp,
    ))]
    pub fn database_error(context: OperationContext, error: SqlxError) -> CadetError {
        let entity_desc = context.entity_description();
        let operation_desc = context.operation.to_string();

        let result = match &error {
            SqlxError::Database(db_error) if db_error.is_unique_violation() => {
                CadetError::Conflict(format!(
                    "{operation_desc}{entity_desc}时发生唯一约束冲突: {db_error}"
                ))
            }
            SqlxError::Database(db_error) => CadetError::StoreUnavailable(format!(
                "{operation_desc}{entity_desc}时发生数据库错误: {db_error}"
            )),
            SqlxError::PoolClosed => CadetError::StoreUnavailable(format!(
                "{operation_desc}{entity_desc}时数据库连接池已关闭"
            )),
            SqlxError::PoolTimedOut => CadetError::StoreUnavailable(format!(
                "{operation_desc}{entity_desc}时数据库连接池超时"
            )),
            SqlxError::Io(io_error) => CadetError::StoreUnavailable(format!(
                "{operation_desc}{entity_desc}时发生I/O错误: {io_error}"
            )),
            SqlxError::ColumnDecode { .. } | SqlxError::Decode(_) | SqlxError::ColumnNotFound(_) => {
                CadetError::Internal(format!(
                    "{operation_desc}{entity_desc}时数据映射失败: {error}"
                ))
            }
            _ => CadetError::StoreUnavailable(format!(
                "{operation_desc}{entity_desc}时发生未知数据库错误: {error}"
            )),
        };

        match &context.additional_info {
            Some(info) => error!(error = %error, additional_info = %info, "{}", result),
            None => error!(error = %error, "{}", result),
        }
        result
    }

    /// Log successful repository operation
    pub fn log_operation_success(
        context: &OperationContext,
        entity_desc: &str,
        additional_info: Option<&str>,
    ) {
        let operation_desc = context.operation.to_string();
        let base_msg = format!("{operation_desc}{entity_desc}成功");

        if let Some(info) = additional_info {
            info!("{}: {}", base_msg, info);
        } else {
            info!("{}", base_msg);
        }
    }
}
