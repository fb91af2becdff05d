use async_trait::async_trait;
use cadet_core::{
    models::{
        ClaimAttempt, NewSubmission, Submission, SubmissionFilter, SubmissionStatus,
        SubmissionTransition,
    },
    traits::SubmissionRepository,
    CadetResult,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::SqliteStore;
use crate::error_handling::{
    OperationContext, RepositoryEntity, RepositoryErrorHelpers, RepositoryOperation,
};

const SUBMISSION_COLUMNS: &str = "id, task_id, cadet_id, status, submission_text, submitted_at, \
     reviewed_at, reviewed_by, feedback, points_awarded, created_at";

fn submission_context(operation: RepositoryOperation) -> OperationContext {
    OperationContext::new(operation, RepositoryEntity::Submission)
}

impl SqliteStore {
    fn row_to_submission(row: &sqlx::sqlite::SqliteRow) -> CadetResult<Submission> {
        Ok(Submission {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            cadet_id: row.try_get("cadet_id")?,
            status: row.try_get("status")?,
            submission_text: row.try_get("submission_text")?,
            submitted_at: row.try_get("submitted_at")?,
            reviewed_at: row.try_get("reviewed_at")?,
            reviewed_by: row.try_get("reviewed_by")?,
            feedback: row.try_get("feedback")?,
            points_awarded: row.try_get("points_awarded")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl SubmissionRepository for SqliteStore {
    #[instrument(skip(self, submission), fields(
        task_id = %submission.task_id,
        cadet_id = %submission.cadet_id,
    ))]
    async fn claim_submission(&self, submission: &NewSubmission) -> CadetResult<ClaimAttempt> {
        let context = submission_context(RepositoryOperation::Create)
            .with_task_id(submission.task_id)
            .with_cadet_id(submission.cadet_id);
        let map_err = |e: sqlx::Error| RepositoryErrorHelpers::database_error(context.clone(), e);

        // 事务未提交就被丢弃时 sqlx 会自动回滚
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO submissions (task_id, cadet_id, status, submission_text, points_awarded, created_at)
            VALUES (?, ?, 'taken', '', 0, ?)
            ON CONFLICT (task_id, cadet_id) DO NOTHING
            RETURNING {SUBMISSION_COLUMNS}
            "#
        ))
        .bind(submission.task_id)
        .bind(submission.cadet_id)
        .bind(submission.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?;

        let Some(row) = row else {
            debug!("提交记录已存在，跳过领取");
            tx.rollback().await.map_err(map_err)?;
            return Ok(ClaimAttempt::AlreadyClaimed);
        };
        let created = Self::row_to_submission(&row)?;

        let incremented = sqlx::query(
            r#"
            UPDATE tasks
            SET current_participants = current_participants + 1
            WHERE id = ?
              AND (max_participants = 0 OR current_participants < max_participants)
            "#,
        )
        .bind(submission.task_id)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if incremented.rows_affected() != 1 {
            debug!("名额已满，撤销插入");
            tx.rollback().await.map_err(map_err)?;
            return Ok(ClaimAttempt::Full);
        }

        tx.commit().await.map_err(map_err)?;
        RepositoryErrorHelpers::log_operation_success(&context, &created.entity_description(), None);
        Ok(ClaimAttempt::Claimed(created))
    }

    #[instrument(skip(self), fields(submission_id = %id))]
    async fn get_submission(&self, id: i64) -> CadetResult<Option<Submission>> {
        let context = submission_context(RepositoryOperation::Read).with_id(id);

        let row = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        row.as_ref().map(Self::row_to_submission).transpose()
    }

    #[instrument(skip(self), fields(task_id = %task_id, cadet_id = %cadet_id))]
    async fn find_submission(
        &self,
        task_id: i64,
        cadet_id: Uuid,
    ) -> CadetResult<Option<Submission>> {
        let context = submission_context(RepositoryOperation::Read)
            .with_task_id(task_id)
            .with_cadet_id(cadet_id);

        let row = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE task_id = ? AND cadet_id = ?"
        ))
        .bind(task_id)
        .bind(cadet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        row.as_ref().map(Self::row_to_submission).transpose()
    }

    #[instrument(skip(self, transition), fields(
        submission_id = %id,
        from = %transition.source_status(),
        to = %transition.target_status(),
    ))]
    async fn transition_submission(
        &self,
        id: i64,
        transition: &SubmissionTransition,
    ) -> CadetResult<Option<Submission>> {
        let context = submission_context(RepositoryOperation::ConditionalUpdate).with_id(id);

        let query = match transition {
            SubmissionTransition::Submit { text, submitted_at } => sqlx::query(&format!(
                r#"
                UPDATE submissions
                SET status = ?, submission_text = ?, submitted_at = ?
                WHERE id = ? AND status = ?
                RETURNING {SUBMISSION_COLUMNS}
                "#
            ))
            .bind(transition.target_status())
            .bind(text)
            .bind(*submitted_at)
            .bind(id)
            .bind(transition.source_status())
            .fetch_optional(&self.pool)
            .await,
            SubmissionTransition::Review {
                feedback,
                points_awarded,
                reviewed_by,
                reviewed_at,
                ..
            } => sqlx::query(&format!(
                r#"
                UPDATE submissions
                SET status = ?, feedback = ?, points_awarded = ?, reviewed_by = ?, reviewed_at = ?
                WHERE id = ? AND status = ?
                RETURNING {SUBMISSION_COLUMNS}
                "#
            ))
            .bind(transition.target_status())
            .bind(feedback)
            .bind(*points_awarded)
            .bind(*reviewed_by)
            .bind(*reviewed_at)
            .bind(id)
            .bind(transition.source_status())
            .fetch_optional(&self.pool)
            .await,
        };

        let row = query.map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        match row {
            Some(row) => {
                let updated = Self::row_to_submission(&row)?;
                RepositoryErrorHelpers::log_operation_success(
                    &context,
                    &updated.entity_description(),
                    Some(&format!("状态: {}", updated.status)),
                );
                Ok(Some(updated))
            }
            None => {
                debug!("提交记录不存在或状态已变化，未更新");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(submission_id = %id))]
    async fn release_submission(&self, id: i64) -> CadetResult<bool> {
        let context = submission_context(RepositoryOperation::ConditionalDelete).with_id(id);
        let map_err = |e: sqlx::Error| RepositoryErrorHelpers::database_error(context.clone(), e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let deleted = sqlx::query("DELETE FROM submissions WHERE id = ? AND status = ? RETURNING task_id")
            .bind(id)
            .bind(SubmissionStatus::Taken)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;

        let Some(row) = deleted else {
            debug!("提交记录不存在或已不是领取状态，未删除");
            tx.rollback().await.map_err(map_err)?;
            return Ok(false);
        };
        let task_id: i64 = row.try_get("task_id")?;

        sqlx::query(
            "UPDATE tasks SET current_participants = MAX(current_participants - 1, 0) WHERE id = ?",
        )
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        RepositoryErrorHelpers::log_operation_success(
            &context,
            &context.entity_description(),
            Some(&format!("任务ID: {task_id}")),
        );
        Ok(true)
    }

    #[instrument(skip(self, filter))]
    async fn list_submissions(&self, filter: &SubmissionFilter) -> CadetResult<Vec<Submission>> {
        let context = submission_context(RepositoryOperation::Query);

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE 1 = 1"
        ));
        if let Some(task_id) = filter.task_id {
            query.push(" AND task_id = ").push_bind(task_id);
        }
        if let Some(cadet_id) = filter.cadet_id {
            query.push(" AND cadet_id = ").push_bind(cadet_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY id ASC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        rows.iter().map(Self::row_to_submission).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::test_support::memory_store;
    use cadet_core::models::{Cadet, Category, Difficulty, ReviewDecision, TaskDraft};
    use cadet_core::traits::{CadetRepository, TaskRepository};
    use chrono::{NaiveDate, Utc};

    async fn seed(store: &SqliteStore, capacity: i32) -> (i64, Uuid) {
        let draft = TaskDraft::new(
            "Drill",
            Category::Discipline,
            Difficulty::Easy,
            5,
            NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        )
        .with_capacity(capacity);
        let task = store.create_task(&draft, Utc::now()).await.unwrap();
        let cadet = store.create_cadet(&Cadet::new("Cadet C")).await.unwrap();
        (task.id, cadet.id)
    }

    fn claim(task_id: i64, cadet_id: Uuid) -> NewSubmission {
        NewSubmission {
            task_id,
            cadet_id,
            created_at: Utc::now(),
        }
    }

    async fn claimed(store: &SqliteStore, task_id: i64, cadet_id: Uuid) -> Submission {
        match store.claim_submission(&claim(task_id, cadet_id)).await.unwrap() {
            ClaimAttempt::Claimed(submission) => submission,
            other => panic!("unexpected claim result: {other:?}"),
        }
    }

    async fn participants(store: &SqliteStore, task_id: i64) -> i32 {
        store.get_task(task_id).await.unwrap().unwrap().current_participants
    }

    #[tokio::test]
    async fn test_claim_is_unique_per_pair() {
        let store = memory_store().await;
        let (task_id, cadet_id) = seed(&store, 0).await;

        let first = claimed(&store, task_id, cadet_id).await;
        assert_eq!(first.status, SubmissionStatus::Taken);
        assert_eq!(first.submission_text, "");

        let second = store.claim_submission(&claim(task_id, cadet_id)).await.unwrap();
        assert_eq!(second, ClaimAttempt::AlreadyClaimed);
        assert_eq!(participants(&store, task_id).await, 1);

        let found = store.find_submission(task_id, cadet_id).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.cadet_id, cadet_id);
    }

    #[tokio::test]
    async fn test_full_task_rolls_back_insert() {
        let store = memory_store().await;
        let (task_id, cadet_id) = seed(&store, 1).await;
        let other = store.create_cadet(&Cadet::new("Cadet D")).await.unwrap();

        claimed(&store, task_id, cadet_id).await;
        let refused = store.claim_submission(&claim(task_id, other.id)).await.unwrap();
        assert_eq!(refused, ClaimAttempt::Full);

        assert!(store.find_submission(task_id, other.id).await.unwrap().is_none());
        assert_eq!(participants(&store, task_id).await, 1);
    }

    #[tokio::test]
    async fn test_conditional_transitions() {
        let store = memory_store().await;
        let (task_id, cadet_id) = seed(&store, 0).await;
        let created = claimed(&store, task_id, cadet_id).await;

        let review = SubmissionTransition::Review {
            decision: ReviewDecision::Completed,
            feedback: None,
            points_awarded: 5,
            reviewed_by: Uuid::new_v4(),
            reviewed_at: Utc::now(),
        };
        // 尚未提交时审核不生效
        assert!(store
            .transition_submission(created.id, &review)
            .await
            .unwrap()
            .is_none());

        let submit = SubmissionTransition::Submit {
            text: "done".to_string(),
            submitted_at: Utc::now(),
        };
        let submitted = store
            .transition_submission(created.id, &submit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(submitted.status, SubmissionStatus::Submitted);
        assert_eq!(submitted.submission_text, "done");
        assert!(submitted.submitted_at.is_some());

        let reviewed = store
            .transition_submission(created.id, &review)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reviewed.status, SubmissionStatus::Completed);
        assert_eq!(reviewed.points_awarded, 5);

        // 终态之后再次审核不生效
        assert!(store
            .transition_submission(created.id, &review)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_release_frees_slot() {
        let store = memory_store().await;
        let (task_id, cadet_id) = seed(&store, 1).await;
        let created = claimed(&store, task_id, cadet_id).await;

        assert!(store.release_submission(created.id).await.unwrap());
        assert!(!store.release_submission(created.id).await.unwrap());
        assert!(store.get_submission(created.id).await.unwrap().is_none());
        assert_eq!(participants(&store, task_id).await, 0);

        // 释放后同一组合可以重新领取
        claimed(&store, task_id, cadet_id).await;
        assert_eq!(participants(&store, task_id).await, 1);
    }

    #[tokio::test]
    async fn test_release_skips_submitted_rows() {
        let store = memory_store().await;
        let (task_id, cadet_id) = seed(&store, 0).await;
        let created = claimed(&store, task_id, cadet_id).await;
        store
            .transition_submission(
                created.id,
                &SubmissionTransition::Submit {
                    text: "ok".to_string(),
                    submitted_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        assert!(!store.release_submission(created.id).await.unwrap());
        assert!(store.get_submission(created.id).await.unwrap().is_some());
        assert_eq!(participants(&store, task_id).await, 1);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = memory_store().await;
        let (task_id, cadet_id) = seed(&store, 0).await;
        let other = store.create_cadet(&Cadet::new("Cadet D")).await.unwrap();

        let first = claimed(&store, task_id, cadet_id).await;
        claimed(&store, task_id, other.id).await;
        store
            .transition_submission(
                first.id,
                &SubmissionTransition::Submit {
                    text: "ok".to_string(),
                    submitted_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let queue = store
            .list_submissions(&SubmissionFilter {
                status: Some(SubmissionStatus::Submitted),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, first.id);

        let by_cadet = store
            .list_submissions(&SubmissionFilter {
                cadet_id: Some(other.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_cadet.len(), 1);
        assert_eq!(by_cadet[0].status, SubmissionStatus::Taken);
    }
}
