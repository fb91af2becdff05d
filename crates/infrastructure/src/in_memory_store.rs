use async_trait::async_trait;
use cadet_core::{
    models::{
        Cadet, ClaimAttempt, NewScoreHistory, NewSubmission, ScoreHistoryEntry, Scores, Standing,
        Submission, SubmissionFilter, SubmissionStatus, SubmissionTransition, Task, TaskDraft,
        TaskFilter,
    },
    traits::{CadetRepository, ScoreRepository, SubmissionRepository, TaskRepository},
    CadetError, CadetResult,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// 内存存储中的全部数据
///
/// 字段公开，便于测试通过 `inject_hook` 在某个操作执行前直接改写数据，
/// 模拟并发请求的干扰。
#[derive(Debug, Default)]
pub struct StoreState {
    pub tasks: BTreeMap<i64, Task>,
    pub submissions: BTreeMap<i64, Submission>,
    pub history: Vec<ScoreHistoryEntry>,
    pub scores: HashMap<Uuid, Scores>,
    pub cadets: HashMap<Uuid, Cadet>,
    next_task_id: i64,
    next_submission_id: i64,
    next_history_id: i64,
}

/// 可注入故障的存储操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    CreateTask,
    GetTask,
    UpdateTask,
    DeleteTask,
    ListTasks,
    ClaimSubmission,
    GetSubmission,
    FindSubmission,
    TransitionSubmission,
    ReleaseSubmission,
    ListSubmissions,
    AppendHistory,
    GetScores,
    SaveScores,
    HistoryFor,
    Standings,
    CreateCadet,
    GetCadet,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

type Hook = Box<dyn FnOnce(&mut StoreState) + Send>;

#[derive(Default)]
struct Injection {
    failures: usize,
    delay: Option<Duration>,
    hooks: Vec<Hook>,
}

/// 内存账本存储
///
/// 与 SQLite 实现语义一致：所有条件操作都在同一把写锁内完成。
/// 额外提供故障注入，用于验证引擎在存储失败、超时和并发干扰下的行为。
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    injections: Mutex<HashMap<StoreOperation, Injection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来 `times` 次 `operation` 调用返回 `StoreUnavailable`
    pub fn inject_failure(&self, operation: StoreOperation, times: usize) {
        let mut injections = self.injections.lock().unwrap_or_else(|e| e.into_inner());
        injections.entry(operation).or_default().failures += times;
    }

    /// 让之后每次 `operation` 调用先等待 `delay`
    pub fn inject_delay(&self, operation: StoreOperation, delay: Duration) {
        let mut injections = self.injections.lock().unwrap_or_else(|e| e.into_inner());
        injections.entry(operation).or_default().delay = Some(delay);
    }

    /// 在下一次 `operation` 执行前对数据做一次改写
    pub fn inject_hook(
        &self,
        operation: StoreOperation,
        hook: impl FnOnce(&mut StoreState) + Send + 'static,
    ) {
        let mut injections = self.injections.lock().unwrap_or_else(|e| e.into_inner());
        injections
            .entry(operation)
            .or_default()
            .hooks
            .push(Box::new(hook));
    }

    pub fn clear_injections(&self) {
        self.injections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// 直接读取数据快照，供测试断言
    pub async fn inspect<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.state.read().await;
        f(&*state)
    }

    async fn before(&self, operation: StoreOperation) -> CadetResult<()> {
        let (delay, hooks, fail) = {
            let mut injections = self.injections.lock().unwrap_or_else(|e| e.into_inner());
            match injections.get_mut(&operation) {
                Some(injection) => {
                    let fail = injection.failures > 0;
                    if fail {
                        injection.failures -= 1;
                    }
                    (
                        injection.delay,
                        std::mem::take(&mut injection.hooks),
                        fail,
                    )
                }
                None => (None, Vec::new(), false),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !hooks.is_empty() {
            let mut state = self.state.write().await;
            for hook in hooks {
                hook(&mut *state);
            }
        }
        if fail {
            warn!(%operation, "注入的存储故障");
            return Err(CadetError::store_unavailable(format!(
                "注入的存储故障: {operation}"
            )));
        }
        Ok(())
    }
}

impl StoreState {
    /// 直接插入任务，跳过校验，供测试构造特殊数据
    pub fn insert_task(&mut self, draft: &TaskDraft, now: DateTime<Utc>) -> Task {
        self.next_task_id += 1;
        let task = Task {
            id: self.next_task_id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            category: draft.category,
            difficulty: draft.difficulty,
            points: draft.points,
            deadline: draft.deadline,
            max_participants: draft.max_participants,
            abandon_penalty: draft.abandon_penalty,
            status: draft.status,
            is_active: draft.is_active,
            current_participants: 0,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id, task.clone());
        task
    }

    pub fn history_for(&self, cadet_id: Uuid) -> Vec<&ScoreHistoryEntry> {
        self.history
            .iter()
            .filter(|entry| entry.cadet_id == cadet_id)
            .collect()
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn create_task(&self, draft: &TaskDraft, now: DateTime<Utc>) -> CadetResult<Task> {
        self.before(StoreOperation::CreateTask).await?;
        let mut state = self.state.write().await;
        Ok(state.insert_task(draft, now))
    }

    async fn get_task(&self, id: i64) -> CadetResult<Option<Task>> {
        self.before(StoreOperation::GetTask).await?;
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn update_task(
        &self,
        id: i64,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> CadetResult<Option<Task>> {
        self.before(StoreOperation::UpdateTask).await?;
        let mut state = self.state.write().await;
        let Some(task) = state.tasks.get_mut(&id) else {
            return Ok(None);
        };
        if draft.max_participants > 0 && draft.max_participants < task.current_participants {
            debug!(task_id = id, "新的名额上限低于当前领取人数，跳过更新");
            return Ok(None);
        }
        task.title = draft.title.clone();
        task.description = draft.description.clone();
        task.category = draft.category;
        task.difficulty = draft.difficulty;
        task.points = draft.points;
        task.deadline = draft.deadline;
        task.max_participants = draft.max_participants;
        task.abandon_penalty = draft.abandon_penalty;
        task.status = draft.status;
        task.is_active = draft.is_active;
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, id: i64) -> CadetResult<bool> {
        self.before(StoreOperation::DeleteTask).await?;
        let mut state = self.state.write().await;
        let deleted = state.tasks.remove(&id).is_some();
        if deleted {
            state.submissions.retain(|_, submission| submission.task_id != id);
        }
        Ok(deleted)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> CadetResult<Vec<Task>> {
        self.before(StoreOperation::ListTasks).await?;
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.deadline.cmp(&b.deadline).then(a.id.cmp(&b.id)));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(tasks.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryStore {
    async fn claim_submission(&self, submission: &NewSubmission) -> CadetResult<ClaimAttempt> {
        self.before(StoreOperation::ClaimSubmission).await?;
        let mut state = self.state.write().await;
        let exists = state.submissions.values().any(|existing| {
            existing.task_id == submission.task_id && existing.cadet_id == submission.cadet_id
        });
        if exists {
            debug!(task_id = submission.task_id, "提交记录已存在，跳过领取");
            return Ok(ClaimAttempt::AlreadyClaimed);
        }

        match state.tasks.get_mut(&submission.task_id) {
            Some(task) if task.has_capacity() => task.current_participants += 1,
            _ => return Ok(ClaimAttempt::Full),
        }

        state.next_submission_id += 1;
        let created = Submission {
            id: state.next_submission_id,
            task_id: submission.task_id,
            cadet_id: submission.cadet_id,
            status: SubmissionStatus::Taken,
            submission_text: String::new(),
            submitted_at: None,
            reviewed_at: None,
            reviewed_by: None,
            feedback: None,
            points_awarded: 0,
            created_at: submission.created_at,
        };
        state.submissions.insert(created.id, created.clone());
        Ok(ClaimAttempt::Claimed(created))
    }

    async fn get_submission(&self, id: i64) -> CadetResult<Option<Submission>> {
        self.before(StoreOperation::GetSubmission).await?;
        Ok(self.state.read().await.submissions.get(&id).cloned())
    }

    async fn find_submission(
        &self,
        task_id: i64,
        cadet_id: Uuid,
    ) -> CadetResult<Option<Submission>> {
        self.before(StoreOperation::FindSubmission).await?;
        let state = self.state.read().await;
        Ok(state
            .submissions
            .values()
            .find(|submission| submission.task_id == task_id && submission.cadet_id == cadet_id)
            .cloned())
    }

    async fn transition_submission(
        &self,
        id: i64,
        transition: &SubmissionTransition,
    ) -> CadetResult<Option<Submission>> {
        self.before(StoreOperation::TransitionSubmission).await?;
        let mut state = self.state.write().await;
        match state.submissions.get_mut(&id) {
            Some(submission) if submission.status == transition.source_status() => {
                transition.apply_to(submission);
                Ok(Some(submission.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_submission(&self, id: i64) -> CadetResult<bool> {
        self.before(StoreOperation::ReleaseSubmission).await?;
        let mut state = self.state.write().await;
        let task_id = match state.submissions.get(&id) {
            Some(submission) if submission.status == SubmissionStatus::Taken => submission.task_id,
            _ => return Ok(false),
        };

        state.submissions.remove(&id);
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.current_participants = (task.current_participants - 1).max(0);
        }
        Ok(true)
    }

    async fn list_submissions(&self, filter: &SubmissionFilter) -> CadetResult<Vec<Submission>> {
        self.before(StoreOperation::ListSubmissions).await?;
        let state = self.state.read().await;
        let limit = filter.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(state
            .submissions
            .values()
            .filter(|submission| filter.matches(submission))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScoreRepository for InMemoryStore {
    async fn append_history(&self, entry: &NewScoreHistory) -> CadetResult<ScoreHistoryEntry> {
        self.before(StoreOperation::AppendHistory).await?;
        let mut state = self.state.write().await;
        state.next_history_id += 1;
        let created = ScoreHistoryEntry {
            id: state.next_history_id,
            cadet_id: entry.cadet_id,
            category: entry.category,
            points: entry.points,
            description: entry.description.clone(),
            awarded_by: entry.awarded_by,
            created_at: entry.created_at,
        };
        state.history.push(created.clone());
        Ok(created)
    }

    async fn get_scores(&self, cadet_id: Uuid) -> CadetResult<Option<Scores>> {
        self.before(StoreOperation::GetScores).await?;
        Ok(self.state.read().await.scores.get(&cadet_id).cloned())
    }

    async fn save_scores(&self, scores: &Scores) -> CadetResult<Option<Scores>> {
        self.before(StoreOperation::SaveScores).await?;
        let mut state = self.state.write().await;
        let current_version = state
            .scores
            .get(&scores.cadet_id)
            .map(|existing| existing.version)
            .unwrap_or(0);
        if current_version != scores.version {
            return Ok(None);
        }

        let saved = Scores {
            version: scores.version + 1,
            ..scores.clone()
        };
        state.scores.insert(saved.cadet_id, saved.clone());
        if let Some(cadet) = state.cadets.get_mut(&saved.cadet_id) {
            cadet.total_score = saved.total();
        }
        Ok(Some(saved))
    }

    async fn history_for(&self, cadet_id: Uuid, limit: i64) -> CadetResult<Vec<ScoreHistoryEntry>> {
        self.before(StoreOperation::HistoryFor).await?;
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|entry| entry.cadet_id == cadet_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn standings(&self) -> CadetResult<Vec<Standing>> {
        self.before(StoreOperation::Standings).await?;
        let state = self.state.read().await;
        let mut standings: Vec<Standing> = state
            .cadets
            .values()
            .map(|cadet| {
                let scores = state
                    .scores
                    .get(&cadet.id)
                    .cloned()
                    .unwrap_or_else(|| Scores::zero(cadet.id));
                Standing {
                    rank: 0,
                    cadet_id: cadet.id,
                    full_name: cadet.full_name.clone(),
                    study_score: scores.study_score,
                    discipline_score: scores.discipline_score,
                    events_score: scores.events_score,
                    total_score: cadet.total_score,
                }
            })
            .collect();
        standings.sort_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then_with(|| a.full_name.cmp(&b.full_name))
        });
        Ok(standings)
    }
}

#[async_trait]
impl CadetRepository for InMemoryStore {
    async fn create_cadet(&self, cadet: &Cadet) -> CadetResult<Cadet> {
        self.before(StoreOperation::CreateCadet).await?;
        let mut state = self.state.write().await;
        if state.cadets.contains_key(&cadet.id) {
            return Err(CadetError::conflict(format!("学员已存在: {}", cadet.id)));
        }
        state.cadets.insert(cadet.id, cadet.clone());
        Ok(cadet.clone())
    }

    async fn get_cadet(&self, id: Uuid) -> CadetResult<Option<Cadet>> {
        self.before(StoreOperation::GetCadet).await?;
        Ok(self.state.read().await.cadets.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadet_core::models::{Category, Difficulty};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn draft(capacity: i32) -> TaskDraft {
        TaskDraft::new(
            "Write an essay",
            Category::Study,
            Difficulty::Medium,
            10,
            NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        )
        .with_capacity(capacity)
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let store = InMemoryStore::new();
        store.inject_failure(StoreOperation::GetTask, 1);

        let err = store.get_task(1).await.unwrap_err();
        assert!(matches!(err, CadetError::StoreUnavailable(_)));
        assert!(store.get_task(1).await.unwrap().is_none());
    }

    fn new_claim(task_id: i64) -> NewSubmission {
        NewSubmission {
            task_id,
            cadet_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_hook_runs_before_operation() {
        let store = InMemoryStore::new();
        let task_id = store.create_task(&draft(1), Utc::now()).await.unwrap().id;

        store.inject_hook(StoreOperation::ClaimSubmission, move |state| {
            if let Some(task) = state.tasks.get_mut(&task_id) {
                task.current_participants = 1;
            }
        });
        assert_eq!(
            store.claim_submission(&new_claim(task_id)).await.unwrap(),
            ClaimAttempt::Full
        );
        assert!(store.inspect(|state| state.submissions.is_empty()).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_exceed_capacity() {
        let store = Arc::new(InMemoryStore::new());
        let task = store.create_task(&draft(3), Utc::now()).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim_submission(&new_claim(task.id)).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), ClaimAttempt::Claimed(_)) {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        let current = store.get_task(task.id).await.unwrap().unwrap().current_participants;
        assert_eq!(current, 3);
        assert_eq!(store.inspect(|state| state.submissions.len()).await, 3);
    }

    #[tokio::test]
    async fn test_delayed_claim_dropped_before_writing() {
        let store = InMemoryStore::new();
        let task_id = store.create_task(&draft(1), Utc::now()).await.unwrap().id;
        store.inject_delay(StoreOperation::ClaimSubmission, Duration::from_millis(200));

        let dropped =
            tokio::time::timeout(Duration::from_millis(20), store.claim_submission(&new_claim(task_id)))
                .await;
        assert!(dropped.is_err());

        let (rows, current) = store
            .inspect(|state| (state.submissions.len(), state.tasks[&task_id].current_participants))
            .await;
        assert_eq!((rows, current), (0, 0));
    }

    #[tokio::test]
    async fn test_release_only_taken_rows() {
        let store = InMemoryStore::new();
        let task_id = store.create_task(&draft(2), Utc::now()).await.unwrap().id;
        let ClaimAttempt::Claimed(first) = store.claim_submission(&new_claim(task_id)).await.unwrap()
        else {
            panic!("expected claim");
        };
        let ClaimAttempt::Claimed(second) =
            store.claim_submission(&new_claim(task_id)).await.unwrap()
        else {
            panic!("expected claim");
        };
        store
            .transition_submission(
                second.id,
                &SubmissionTransition::Submit {
                    text: "done".to_string(),
                    submitted_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        assert!(!store.release_submission(second.id).await.unwrap());
        assert!(store.release_submission(first.id).await.unwrap());
        assert!(!store.release_submission(first.id).await.unwrap());
        assert_eq!(store.get_task(task_id).await.unwrap().unwrap().current_participants, 1);
    }

    #[tokio::test]
    async fn test_update_refuses_capacity_below_participants() {
        let store = InMemoryStore::new();
        let task_id = store.create_task(&draft(3), Utc::now()).await.unwrap().id;
        store.claim_submission(&new_claim(task_id)).await.unwrap();
        store.claim_submission(&new_claim(task_id)).await.unwrap();

        assert!(store.update_task(task_id, &draft(1), Utc::now()).await.unwrap().is_none());
        assert_eq!(store.get_task(task_id).await.unwrap().unwrap().max_participants, 3);

        let updated = store.update_task(task_id, &draft(0), Utc::now()).await.unwrap().unwrap();
        assert_eq!(updated.max_participants, 0);
        assert_eq!(updated.current_participants, 2);
    }

    #[tokio::test]
    async fn test_save_scores_version_check() {
        let store = InMemoryStore::new();
        let cadet = store.create_cadet(&Cadet::new("Cadet C")).await.unwrap();

        let saved = store
            .save_scores(&Scores::zero(cadet.id).with_delta(Category::Study, 8))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.version, 1);
        assert!(store
            .save_scores(&Scores::zero(cadet.id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.get_cadet(cadet.id).await.unwrap().unwrap().total_score, 8);
    }
}
