use async_trait::async_trait;
use cadet_core::{
    models::{Task, TaskDraft, TaskFilter},
    traits::TaskRepository,
    CadetResult,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, instrument};

use super::SqliteStore;
use crate::error_handling::{
    OperationContext, RepositoryEntity, RepositoryErrorHelpers, RepositoryOperation,
};

const TASK_COLUMNS: &str = "id, title, description, category, difficulty, points, deadline, \
     max_participants, abandon_penalty, status, is_active, current_participants, created_at, updated_at";

fn task_context(operation: RepositoryOperation) -> OperationContext {
    OperationContext::new(operation, RepositoryEntity::Task)
}

impl SqliteStore {
    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> CadetResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            category: row.try_get("category")?,
            difficulty: row.try_get("difficulty")?,
            points: row.try_get("points")?,
            deadline: row.try_get("deadline")?,
            max_participants: row.try_get("max_participants")?,
            abandon_penalty: row.try_get("abandon_penalty")?,
            status: row.try_get("status")?,
            is_active: row.try_get("is_active")?,
            current_participants: row.try_get("current_participants")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteStore {
    #[instrument(skip(self, draft), fields(title = %draft.title, category = %draft.category))]
    async fn create_task(&self, draft: &TaskDraft, now: DateTime<Utc>) -> CadetResult<Task> {
        let context = task_context(RepositoryOperation::Create);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (title, description, category, difficulty, points, deadline,
                               max_participants, abandon_penalty, status, is_active,
                               current_participants, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.category)
        .bind(draft.difficulty)
        .bind(draft.points)
        .bind(draft.deadline)
        .bind(draft.max_participants)
        .bind(draft.abandon_penalty)
        .bind(draft.status)
        .bind(draft.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let task = Self::row_to_task(&row)?;
        RepositoryErrorHelpers::log_operation_success(
            &context,
            &task.entity_description(),
            Some(&format!("分类: {}, 分值: {}", task.category, task.points)),
        );
        Ok(task)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn get_task(&self, id: i64) -> CadetResult<Option<Task>> {
        let context = task_context(RepositoryOperation::Read).with_id(id);

        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => {
                debug!("查询任务不存在: ID {}", id);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, draft), fields(task_id = %id))]
    async fn update_task(
        &self,
        id: i64,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> CadetResult<Option<Task>> {
        let context = task_context(RepositoryOperation::Update).with_id(id);

        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, category = ?, difficulty = ?, points = ?,
                deadline = ?, max_participants = ?, abandon_penalty = ?, status = ?,
                is_active = ?, updated_at = ?
            WHERE id = ?
              AND (? = 0 OR current_participants <= ?)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.category)
        .bind(draft.difficulty)
        .bind(draft.points)
        .bind(draft.deadline)
        .bind(draft.max_participants)
        .bind(draft.abandon_penalty)
        .bind(draft.status)
        .bind(draft.is_active)
        .bind(now)
        .bind(id)
        .bind(draft.max_participants)
        .bind(draft.max_participants)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        match row {
            Some(row) => {
                let task = Self::row_to_task(&row)?;
                RepositoryErrorHelpers::log_operation_success(
                    &context,
                    &task.entity_description(),
                    None,
                );
                Ok(Some(task))
            }
            None => {
                debug!("任务不存在或新上限低于当前领取人数，未更新");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn delete_task(&self, id: i64) -> CadetResult<bool> {
        let context = task_context(RepositoryOperation::Delete).with_id(id);

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            RepositoryErrorHelpers::log_operation_success(
                &context,
                &context.entity_description(),
                None,
            );
        }
        Ok(deleted)
    }

    #[instrument(skip(self, filter))]
    async fn list_tasks(&self, filter: &TaskFilter) -> CadetResult<Vec<Task>> {
        let context = task_context(RepositoryOperation::Query);

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1"));
        if let Some(category) = filter.category {
            query.push(" AND category = ").push_bind(category);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if filter.open_only {
            query.push(" AND status = 'active' AND is_active = 1");
        }
        query.push(" ORDER BY deadline ASC, id ASC");
        // SQLite 要求 OFFSET 之前必须有 LIMIT，-1 表示不限
        query
            .push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        let tasks = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<CadetResult<Vec<_>>>()?;
        debug!("查询到 {} 个任务", tasks.len());
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::test_support::memory_store;
    use cadet_core::models::{Category, Difficulty, TaskStatus};
    use chrono::NaiveDate;

    fn draft(title: &str, capacity: i32) -> TaskDraft {
        TaskDraft::new(
            title,
            Category::Study,
            Difficulty::Medium,
            10,
            NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        )
        .with_capacity(capacity)
        .with_abandon_penalty(5)
    }

    #[tokio::test]
    async fn test_task_crud() {
        let store = memory_store().await;
        let now = Utc::now();

        let task = store.create_task(&draft("Write an essay", 1), now).await.unwrap();
        assert!(task.id > 0);
        assert_eq!(task.category, Category::Study);
        assert_eq!(task.current_participants, 0);
        assert!(task.is_open());

        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Write an essay");
        assert_eq!(fetched.deadline, task.deadline);

        let mut changed = draft("Write two essays", 2);
        changed.status = TaskStatus::Inactive;
        let updated = store.update_task(task.id, &changed, now).await.unwrap().unwrap();
        assert_eq!(updated.title, "Write two essays");
        assert_eq!(updated.max_participants, 2);
        assert!(!updated.is_open());

        assert!(store.update_task(999, &changed, now).await.unwrap().is_none());

        assert!(store.delete_task(task.id).await.unwrap());
        assert!(!store.delete_task(task.id).await.unwrap());
        assert!(store.get_task(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = memory_store().await;
        let now = Utc::now();

        store.create_task(&draft("a", 0), now).await.unwrap();
        let mut closed = draft("b", 0);
        closed.is_active = false;
        store.create_task(&closed, now).await.unwrap();
        let mut events = draft("c", 0);
        events.category = Category::Events;
        store.create_task(&events, now).await.unwrap();

        assert_eq!(store.list_tasks(&TaskFilter::default()).await.unwrap().len(), 3);
        assert_eq!(store.list_tasks(&TaskFilter::open()).await.unwrap().len(), 2);

        let filter = TaskFilter {
            category: Some(Category::Events),
            ..Default::default()
        };
        let tasks = store.list_tasks(&filter).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "c");

        let page = TaskFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        assert_eq!(store.list_tasks(&page).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_capacity_above_participants() {
        let store = memory_store().await;
        let now = Utc::now();
        let task = store.create_task(&draft("limited", 3), now).await.unwrap();
        sqlx::query("UPDATE tasks SET current_participants = 2 WHERE id = ?")
            .bind(task.id)
            .execute(store.pool())
            .await
            .unwrap();

        assert!(store.update_task(task.id, &draft("limited", 1), now).await.unwrap().is_none());
        let unchanged = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(unchanged.max_participants, 3);

        let at_count = store.update_task(task.id, &draft("limited", 2), now).await.unwrap().unwrap();
        assert_eq!(at_count.max_participants, 2);

        let unlimited = store.update_task(task.id, &draft("open", 0), now).await.unwrap().unwrap();
        assert_eq!(unlimited.max_participants, 0);
        assert_eq!(unlimited.current_participants, 2);
    }
}
