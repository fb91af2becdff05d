//! 数据仓储层接口定义
//!
//! 积分引擎只依赖这里列出的存储原语：
//! - `TaskRepository` - 任务目录的读写
//! - `SubmissionRepository` - 领取与放弃（连同名额计数）、条件流转
//! - `ScoreRepository` - 积分流水追加与带版本号的积分聚合写入
//! - `CadetRepository` - 学员记录
//!
//! ## 原子性约定
//!
//! 引擎的跨表一致性完全依赖以下条件操作，每个实现都必须保证它们是单条原子语句
//! （或单个事务）：
//!
//! - `claim_submission` - 无记录且未满时插入 `taken` 行并加一，二者同时生效或同时不生效
//! - `release_submission` - 仅当记录仍为 `taken` 时删除并减一
//! - `transition_submission` - 仅当当前状态等于预期状态时更新
//! - `update_task` - 新上限不低于当前领取人数时才更新
//! - `save_scores` - 仅当版本号未变化时写入，并同步学员总分
//!
//! 调用方在任意 await 点放弃 future 时，上述操作要么完整生效，要么完全没有生效。
//!
//! 方法名在各接口之间互不重名，因此 `LedgerStore` 可以作为单一 trait object 使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::CadetResult;
use crate::models::{
    Cadet, ClaimAttempt, NewScoreHistory, NewSubmission, ScoreHistoryEntry, Scores, Standing,
    Submission, SubmissionFilter, SubmissionTransition, Task, TaskDraft, TaskFilter,
};

/// 任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create_task(&self, draft: &TaskDraft, now: DateTime<Utc>) -> CadetResult<Task>;

    async fn get_task(&self, id: i64) -> CadetResult<Option<Task>>;

    /// 整体更新任务定义，不触碰 `current_participants`
    ///
    /// 任务不存在，或 `max_participants > 0` 且低于当前领取人数时不更新并返回 None。
    async fn update_task(
        &self,
        id: i64,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> CadetResult<Option<Task>>;

    /// 删除任务及其全部提交记录
    async fn delete_task(&self, id: i64) -> CadetResult<bool>;

    async fn list_tasks(&self, filter: &TaskFilter) -> CadetResult<Vec<Task>>;
}

/// 提交记录仓储接口
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// 领取：插入 `taken` 行，并在 `max_participants = 0 OR current_participants < max_participants`
    /// 时把领取人数加一
    ///
    /// 两步在同一个事务内完成，加一失败时插入随之回滚。
    async fn claim_submission(&self, submission: &NewSubmission) -> CadetResult<ClaimAttempt>;

    async fn get_submission(&self, id: i64) -> CadetResult<Option<Submission>>;

    async fn find_submission(
        &self,
        task_id: i64,
        cadet_id: Uuid,
    ) -> CadetResult<Option<Submission>>;

    /// 当前状态等于 `transition.source_status()` 时应用变更，返回更新后的记录
    async fn transition_submission(
        &self,
        id: i64,
        transition: &SubmissionTransition,
    ) -> CadetResult<Option<Submission>>;

    /// 放弃：记录仍为 `taken` 时删除，并把所属任务的领取人数减一（最低为 0）
    ///
    /// 记录不存在或状态已变化时返回 false，不做任何写入。
    async fn release_submission(&self, id: i64) -> CadetResult<bool>;

    /// 按创建顺序返回
    async fn list_submissions(&self, filter: &SubmissionFilter) -> CadetResult<Vec<Submission>>;
}

/// 积分仓储接口
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    async fn append_history(&self, entry: &NewScoreHistory) -> CadetResult<ScoreHistoryEntry>;

    async fn get_scores(&self, cadet_id: Uuid) -> CadetResult<Option<Scores>>;

    /// 乐观并发写入
    ///
    /// 仅当存储中的版本号等于 `scores.version`（行不存在视为 0）时写入，
    /// 新版本号为 `scores.version + 1`，同时把学员的 `total_score` 设为三项之和。
    /// 版本号不匹配时返回 None。
    async fn save_scores(&self, scores: &Scores) -> CadetResult<Option<Scores>>;

    /// 按时间倒序返回
    async fn history_for(&self, cadet_id: Uuid, limit: i64) -> CadetResult<Vec<ScoreHistoryEntry>>;

    /// 所有学员的积分，`rank` 字段未填充
    async fn standings(&self) -> CadetResult<Vec<Standing>>;
}

/// 学员仓储接口
#[async_trait]
pub trait CadetRepository: Send + Sync {
    async fn create_cadet(&self, cadet: &Cadet) -> CadetResult<Cadet>;

    async fn get_cadet(&self, id: Uuid) -> CadetResult<Option<Cadet>>;
}

/// 积分引擎使用的完整存储
pub trait LedgerStore: TaskRepository + SubmissionRepository + ScoreRepository + CadetRepository {}

impl<T> LedgerStore for T where
    T: TaskRepository + SubmissionRepository + ScoreRepository + CadetRepository
{
}
