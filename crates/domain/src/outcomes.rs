//! 各操作的结果类型
//!
//! 放弃罚分与审核计分允许 "主操作成功、附带的积分写入失败"，
//! 这种情况不作为错误返回，而是体现在结果里供调用方和运维处理。

use cadet_core::models::{LedgerUpdate, ReviewDecision, Submission};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 放弃时的罚分结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PenaltyOutcome {
    /// 任务没有设置放弃罚分
    NotApplicable,
    Applied(LedgerUpdate),
    /// 罚分写入失败，放弃本身已完成，需要人工对账
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AbandonOutcome {
    pub submission_id: i64,
    pub task_id: i64,
    pub cadet_id: Uuid,
    pub penalty: PenaltyOutcome,
}

/// 审核通过后的计分结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoringOutcome {
    /// 驳回，或通过但给分为 0
    Skipped,
    Applied(LedgerUpdate),
    /// 审核已落库，计分失败，需要人工对账
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub submission: Submission,
    pub scoring: ScoringOutcome,
}

/// 审核请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewRequest {
    pub submission_id: i64,
    pub decision: ReviewDecision,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub points_awarded: i32,
}

impl ReviewRequest {
    pub fn completed(submission_id: i64, points_awarded: i32) -> Self {
        Self {
            submission_id,
            decision: ReviewDecision::Completed,
            feedback: None,
            points_awarded,
        }
    }

    pub fn rejected(submission_id: i64) -> Self {
        Self {
            submission_id,
            decision: ReviewDecision::Rejected,
            feedback: None,
            points_awarded: 0,
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}
