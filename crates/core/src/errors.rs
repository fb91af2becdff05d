use thiserror::Error;
use uuid::Uuid;

use crate::models::SubmissionStatus;

/// 积分引擎错误类型定义
///
/// 每个对外操作（领取、提交、放弃、审核、加减分）只会返回这里列出的错误，
/// 调用方可以对其做穷尽匹配并渲染用户提示。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CadetError {
    #[error("{entity}不存在: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("任务已关闭，无法领取: task_id={task_id}")]
    Inactive { task_id: i64 },

    #[error("任务已被该学员领取: task_id={task_id}, cadet_id={cadet_id}")]
    AlreadyClaimed { task_id: i64, cadet_id: Uuid },

    #[error("任务名额已满: task_id={task_id}, max_participants={max_participants}")]
    CapacityExceeded { task_id: i64, max_participants: i32 },

    #[error("没有处于领取状态的提交: task_id={task_id}, cadet_id={cadet_id}")]
    NotClaimed { task_id: i64, cadet_id: Uuid },

    #[error("提交状态不允许该操作: submission_id={submission_id}, status={status}")]
    InvalidState {
        submission_id: i64,
        status: SubmissionStatus,
    },

    #[error("权限不足: 需要 {capability}")]
    Forbidden { capability: String },

    #[error("并发修改冲突: {0}")]
    Conflict(String),

    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type CadetResult<T> = std::result::Result<T, CadetError>;

impl CadetError {
    pub fn task_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "任务",
            id: id.to_string(),
        }
    }

    pub fn submission_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "提交记录",
            id: id.to_string(),
        }
    }

    pub fn cadet_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "学员",
            id: id.to_string(),
        }
    }

    pub fn forbidden<S: Into<String>>(capability: S) -> Self {
        Self::Forbidden {
            capability: capability.into(),
        }
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// 瞬时故障，调用方可以整体重试该操作
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CadetError::StoreUnavailable(_) | CadetError::Conflict(_)
        )
    }

    /// 稳定的机器可读错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CadetError::NotFound { .. } => "NOT_FOUND",
            CadetError::Inactive { .. } => "TASK_INACTIVE",
            CadetError::AlreadyClaimed { .. } => "ALREADY_CLAIMED",
            CadetError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            CadetError::NotClaimed { .. } => "NOT_CLAIMED",
            CadetError::InvalidState { .. } => "INVALID_STATE",
            CadetError::Forbidden { .. } => "FORBIDDEN",
            CadetError::Conflict(_) => "CONFLICT",
            CadetError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            CadetError::Validation(_) => "VALIDATION_ERROR",
            CadetError::Configuration(_) => "CONFIGURATION_ERROR",
            CadetError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            CadetError::NotFound { .. } => "请求的记录不存在",
            CadetError::Inactive { .. } => "该任务已关闭，暂不接受领取",
            CadetError::AlreadyClaimed { .. } => "您已经领取过该任务",
            CadetError::CapacityExceeded { .. } => "该任务名额已满",
            CadetError::NotClaimed { .. } => "您没有可提交或放弃的进行中任务",
            CadetError::InvalidState { .. } => "该提交当前状态不允许此操作",
            CadetError::Forbidden { .. } => "您没有执行此操作的权限",
            CadetError::Conflict(_) => "数据已被其他操作修改，请刷新后重试",
            CadetError::StoreUnavailable(_) => "系统繁忙，请稍后重试",
            CadetError::Validation(_) => "输入数据验证失败",
            _ => "系统内部错误，请联系管理员",
        }
    }
}

impl From<serde_json::Error> for CadetError {
    fn from(err: serde_json::Error) -> Self {
        CadetError::Internal(format!("序列化错误: {err}"))
    }
}

impl From<sqlx::Error> for CadetError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => {
                CadetError::Internal(format!("数据映射失败: {err}"))
            }
            _ => CadetError::StoreUnavailable(err.to_string()),
        }
    }
}
