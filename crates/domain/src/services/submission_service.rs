use std::sync::Arc;

use cadet_core::{
    config::EngineConfig,
    models::{
        Capability, ClaimAttempt, NewSubmission, Principal, ReviewDecision, Submission,
        SubmissionFilter, SubmissionStatus, SubmissionTransition, Task,
    },
    traits::{CachePrefix, CacheService, Clock, LedgerStore},
    CadetError, CadetResult,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::outcomes::{AbandonOutcome, PenaltyOutcome, ReviewOutcome, ReviewRequest, ScoringOutcome};
use crate::permission_gate::PermissionGate;
use crate::services::scoring_ledger::ScoringLedger;
use crate::timeout_handler::{run_to_completion, TimeoutConfig, TimeoutHandler};

const MAX_SUBMISSION_CHARS: usize = 10_000;
const MAX_FEEDBACK_CHARS: usize = 2_000;
const DEFAULT_QUEUE_LIMIT: i64 = 100;

/// 提交状态机
///
/// ```text
/// claim     : (无记录) → taken          名额计数 +1
/// submit    : taken → submitted
/// abandon   : taken → (删除记录)        名额计数 -1，可能扣分
/// review    : submitted → completed | rejected，通过且给分时计分
/// ```
///
/// 跨表一致性依赖存储层的条件操作，服务本身不持有任何锁。
/// 第一次持久写入之后的步骤交给 `LifecycleSteps` 在独立任务中执行到底。
pub struct SubmissionService {
    store: Arc<dyn LedgerStore>,
    gate: PermissionGate,
    clock: Arc<dyn Clock>,
    timeout: TimeoutHandler,
    steps: LifecycleSteps,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<ScoringLedger>,
        gate: PermissionGate,
        cache: Arc<dyn CacheService>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let timeout = TimeoutHandler::new(TimeoutConfig::from(config));
        Self {
            steps: LifecycleSteps {
                store: store.clone(),
                ledger,
                cache,
                timeout: timeout.clone(),
            },
            store,
            gate,
            clock,
            timeout,
        }
    }

    /// 领取任务
    ///
    /// 名额先做一次预检以便尽早失败，真正的裁决是存储层的 `claim_submission`：
    /// 插入记录与名额加一在同一个原子操作里完成。
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn claim(
        &self,
        principal: &Principal,
        task_id: i64,
        cadet_id: Uuid,
    ) -> CadetResult<Submission> {
        self.gate
            .require_self_or(principal, cadet_id, Capability::ManageTasks)
            .await?;

        let task = self.steps.load_task(task_id).await?;
        if !task.is_open() {
            return Err(CadetError::Inactive { task_id });
        }
        let cadet = self
            .timeout
            .store_operation(self.store.get_cadet(cadet_id), "get_cadet")
            .await?;
        if cadet.is_none() {
            return Err(CadetError::cadet_not_found(cadet_id));
        }
        if self.find_submission(task_id, cadet_id).await?.is_some() {
            return Err(CadetError::AlreadyClaimed { task_id, cadet_id });
        }
        if !task.has_capacity() {
            return Err(capacity_exceeded(&task));
        }

        let new_submission = NewSubmission {
            task_id,
            cadet_id,
            created_at: self.clock.now(),
        };
        let attempt = self
            .timeout
            .store_operation(self.store.claim_submission(&new_submission), "claim_submission")
            .await?;
        let submission = match attempt {
            ClaimAttempt::Claimed(submission) => submission,
            ClaimAttempt::AlreadyClaimed => {
                return Err(CadetError::AlreadyClaimed { task_id, cadet_id })
            }
            ClaimAttempt::Full => {
                debug!("预检之后名额被占满");
                return Err(capacity_exceeded(&task));
            }
        };

        self.steps.invalidate_tasks().await?;
        info!(submission_id = submission.id, "任务已领取");
        Ok(submission)
    }

    /// 提交作业
    #[instrument(skip(self, principal, text), fields(user_id = %principal.user_id))]
    pub async fn submit(
        &self,
        principal: &Principal,
        task_id: i64,
        cadet_id: Uuid,
        text: &str,
    ) -> CadetResult<Submission> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CadetError::validation("提交内容不能为空"));
        }
        if text.chars().count() > MAX_SUBMISSION_CHARS {
            return Err(CadetError::validation(format!(
                "提交内容不能超过{MAX_SUBMISSION_CHARS}个字符"
            )));
        }

        self.gate
            .require_self_or(principal, cadet_id, Capability::ManageTasks)
            .await?;

        let not_claimed = || CadetError::NotClaimed { task_id, cadet_id };
        let current = self
            .find_submission(task_id, cadet_id)
            .await?
            .filter(|s| s.status == SubmissionStatus::Taken)
            .ok_or_else(not_claimed)?;

        let transition = SubmissionTransition::Submit {
            text: text.to_string(),
            submitted_at: self.clock.now(),
        };
        let submission = self
            .timeout
            .store_operation(
                self.store.transition_submission(current.id, &transition),
                "transition_submission",
            )
            .await?
            .ok_or_else(not_claimed)?;

        info!(submission_id = submission.id, "作业已提交");
        Ok(submission)
    }

    /// 放弃任务
    ///
    /// 罚分在释放记录之前写入；罚分失败只记录日志，不阻止放弃。
    /// 如果释放时记录已不是 `taken`（例如同时被提交），追加一笔冲正流水并返回 `Conflict`。
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn abandon(
        &self,
        principal: &Principal,
        task_id: i64,
        cadet_id: Uuid,
    ) -> CadetResult<AbandonOutcome> {
        self.gate
            .require_self_or(principal, cadet_id, Capability::ManageTasks)
            .await?;

        let submission = self
            .find_submission(task_id, cadet_id)
            .await?
            .filter(|s| s.status == SubmissionStatus::Taken)
            .ok_or(CadetError::NotClaimed { task_id, cadet_id })?;
        let task = self.steps.load_task(task_id).await?;

        let steps = self.steps.clone();
        run_to_completion(steps.abandon(task, submission), "abandon").await
    }

    /// 审核提交
    ///
    /// 状态更新落库后才计分；计分失败不回滚审核，结果中标记为 `Failed`。
    #[instrument(
        skip(self, principal, request),
        fields(
            user_id = %principal.user_id,
            submission_id = request.submission_id,
            decision = ?request.decision
        )
    )]
    pub async fn review(
        &self,
        principal: &Principal,
        request: &ReviewRequest,
    ) -> CadetResult<ReviewOutcome> {
        validate_review(request)?;
        self.gate.require(principal, Capability::ManageTasks).await?;

        let submission_id = request.submission_id;
        let transition = SubmissionTransition::Review {
            decision: request.decision,
            feedback: request
                .feedback
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
            points_awarded: request.points_awarded,
            reviewed_by: principal.user_id,
            reviewed_at: self.clock.now(),
        };

        let reviewed = self
            .timeout
            .store_operation(
                self.store.transition_submission(submission_id, &transition),
                "transition_submission",
            )
            .await?;
        let submission = match reviewed {
            Some(submission) => submission,
            None => {
                let existing = self
                    .timeout
                    .store_operation(self.store.get_submission(submission_id), "get_submission")
                    .await?;
                return Err(match existing {
                    None => CadetError::submission_not_found(submission_id),
                    Some(existing) => CadetError::InvalidState {
                        submission_id,
                        status: existing.status,
                    },
                });
            }
        };
        info!(status = %submission.status, "审核已落库");

        let scoring = if request.decision == ReviewDecision::Completed
            && request.points_awarded > 0
        {
            let steps = self.steps.clone();
            let reviewed = submission.clone();
            let reviewer = principal.user_id;
            run_to_completion(
                async move { Ok(steps.score_review(&reviewed, reviewer).await) },
                "review_scoring",
            )
            .await
            .unwrap_or_else(|e| {
                error!(
                    submission_id,
                    error = %e,
                    reconciliation = "review_scoring",
                    "审核计分任务异常结束，审核结果保留"
                );
                ScoringOutcome::Failed {
                    reason: e.to_string(),
                }
            })
        } else {
            ScoringOutcome::Skipped
        };

        Ok(ReviewOutcome {
            submission,
            scoring,
        })
    }

    /// 待审核队列，默认列出 `submitted`
    pub async fn review_queue(
        &self,
        principal: &Principal,
        status: Option<SubmissionStatus>,
        limit: Option<i64>,
    ) -> CadetResult<Vec<Submission>> {
        let filter = SubmissionFilter {
            status: Some(status.unwrap_or(SubmissionStatus::Submitted)),
            limit: Some(limit.unwrap_or(DEFAULT_QUEUE_LIMIT)),
            ..Default::default()
        };

        self.gate.require(principal, Capability::ManageTasks).await?;
        self.timeout
            .store_operation(self.store.list_submissions(&filter), "list_submissions")
            .await
    }

    /// 学员自己的全部提交记录
    pub async fn submissions_for_cadet(
        &self,
        principal: &Principal,
        cadet_id: Uuid,
    ) -> CadetResult<Vec<Submission>> {
        let filter = SubmissionFilter {
            cadet_id: Some(cadet_id),
            ..Default::default()
        };

        self.gate
            .require_self_or(principal, cadet_id, Capability::ManageTasks)
            .await?;
        self.timeout
            .store_operation(self.store.list_submissions(&filter), "list_submissions")
            .await
    }

    async fn find_submission(
        &self,
        task_id: i64,
        cadet_id: Uuid,
    ) -> CadetResult<Option<Submission>> {
        self.timeout
            .store_operation(self.store.find_submission(task_id, cadet_id), "find_submission")
            .await
    }
}

/// 第一次持久写入之后必须执行到底的步骤
///
/// 持有的都是共享句柄，克隆后整体移入独立任务。
#[derive(Clone)]
struct LifecycleSteps {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<ScoringLedger>,
    cache: Arc<dyn CacheService>,
    timeout: TimeoutHandler,
}

impl LifecycleSteps {
    async fn load_task(&self, task_id: i64) -> CadetResult<Task> {
        self.timeout
            .store_operation(self.store.get_task(task_id), "get_task")
            .await?
            .ok_or_else(|| CadetError::task_not_found(task_id))
    }

    async fn abandon(self, task: Task, submission: Submission) -> CadetResult<AbandonOutcome> {
        let cadet_id = submission.cadet_id;
        let penalty = self.apply_abandon_penalty(&task, cadet_id).await;

        let released = self
            .timeout
            .store_operation(
                self.store.release_submission(submission.id),
                "release_submission",
            )
            .await;
        match released {
            Ok(true) => {}
            Ok(false) => {
                warn!(submission_id = submission.id, "放弃期间提交记录已发生变化");
                self.reverse_penalty(&task, cadet_id, &penalty).await;
                return Err(CadetError::conflict(format!(
                    "提交记录 {} 已不再处于领取状态",
                    submission.id
                )));
            }
            Err(e) => {
                self.reverse_penalty(&task, cadet_id, &penalty).await;
                return Err(e);
            }
        }

        self.invalidate_tasks().await?;
        info!(submission_id = submission.id, "任务已放弃");
        Ok(AbandonOutcome {
            submission_id: submission.id,
            task_id: task.id,
            cadet_id,
            penalty,
        })
    }

    async fn apply_abandon_penalty(&self, task: &Task, cadet_id: Uuid) -> PenaltyOutcome {
        if task.abandon_penalty <= 0 {
            return PenaltyOutcome::NotApplicable;
        }

        let description = format!("放弃任务「{}」", task.title);
        match self
            .ledger
            .apply_delta(
                cadet_id,
                task.category,
                -task.abandon_penalty,
                &description,
                None,
            )
            .await
        {
            Ok(update) => PenaltyOutcome::Applied(update),
            Err(e) => {
                error!(
                    task_id = task.id,
                    %cadet_id,
                    penalty = task.abandon_penalty,
                    error = %e,
                    reconciliation = "abandon_penalty",
                    "放弃罚分写入失败，放弃继续进行"
                );
                PenaltyOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// 按实际扣除的分值冲正，保证聚合回到罚分前
    async fn reverse_penalty(&self, task: &Task, cadet_id: Uuid, penalty: &PenaltyOutcome) {
        let PenaltyOutcome::Applied(update) = penalty else {
            return;
        };
        let amount = -update.applied_delta;
        if amount <= 0 {
            return;
        }

        let description = format!("撤销放弃任务「{}」的扣分", task.title);
        if let Err(e) = self
            .ledger
            .apply_delta(cadet_id, task.category, amount, &description, None)
            .await
        {
            error!(
                task_id = task.id,
                %cadet_id,
                amount,
                error = %e,
                reconciliation = "abandon_penalty_reversal",
                "放弃罚分冲正失败"
            );
        }
    }

    async fn score_review(&self, submission: &Submission, reviewer: Uuid) -> ScoringOutcome {
        let result = async {
            let task = self.load_task(submission.task_id).await?;
            let description = format!("完成任务「{}」", task.title);
            self.ledger
                .apply_delta(
                    submission.cadet_id,
                    task.category,
                    submission.points_awarded,
                    &description,
                    Some(reviewer),
                )
                .await
        }
        .await;

        match result {
            Ok(update) => ScoringOutcome::Applied(update),
            Err(e) => {
                error!(
                    submission_id = submission.id,
                    cadet_id = %submission.cadet_id,
                    points = submission.points_awarded,
                    error = %e,
                    reconciliation = "review_scoring",
                    "审核计分失败，审核结果保留"
                );
                ScoringOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn invalidate_tasks(&self) -> CadetResult<()> {
        self.cache
            .invalidate_prefix(&CachePrefix::Tasks.collection())
            .await?;
        Ok(())
    }
}

fn capacity_exceeded(task: &Task) -> CadetError {
    CadetError::CapacityExceeded {
        task_id: task.id,
        max_participants: task.max_participants,
    }
}

fn validate_review(request: &ReviewRequest) -> CadetResult<()> {
    if request.points_awarded < 0 {
        return Err(CadetError::validation("给分不能为负数"));
    }
    if request.decision == ReviewDecision::Rejected && request.points_awarded > 0 {
        return Err(CadetError::validation("驳回时不能给分"));
    }
    if let Some(feedback) = &request.feedback {
        if feedback.chars().count() > MAX_FEEDBACK_CHARS {
            return Err(CadetError::validation(format!(
                "审核意见不能超过{MAX_FEEDBACK_CHARS}个字符"
            )));
        }
    }
    Ok(())
}
