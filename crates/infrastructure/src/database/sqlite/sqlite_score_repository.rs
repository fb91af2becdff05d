use async_trait::async_trait;
use cadet_core::{
    models::{NewScoreHistory, ScoreHistoryEntry, Scores, Standing},
    traits::ScoreRepository,
    CadetResult,
};
use sqlx::Row;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::SqliteStore;
use crate::error_handling::{
    OperationContext, RepositoryEntity, RepositoryErrorHelpers, RepositoryOperation,
};

const HISTORY_COLUMNS: &str = "id, cadet_id, category, points, description, awarded_by, created_at";

impl SqliteStore {
    fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> CadetResult<ScoreHistoryEntry> {
        Ok(ScoreHistoryEntry {
            id: row.try_get("id")?,
            cadet_id: row.try_get("cadet_id")?,
            category: row.try_get("category")?,
            points: row.try_get("points")?,
            description: row.try_get("description")?,
            awarded_by: row.try_get("awarded_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_scores(row: &sqlx::sqlite::SqliteRow) -> CadetResult<Scores> {
        Ok(Scores {
            cadet_id: row.try_get("cadet_id")?,
            study_score: row.try_get("study_score")?,
            discipline_score: row.try_get("discipline_score")?,
            events_score: row.try_get("events_score")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl ScoreRepository for SqliteStore {
    #[instrument(skip(self, entry), fields(
        cadet_id = %entry.cadet_id,
        category = %entry.category,
        points = entry.points,
    ))]
    async fn append_history(&self, entry: &NewScoreHistory) -> CadetResult<ScoreHistoryEntry> {
        let context = OperationContext::new(RepositoryOperation::Create, RepositoryEntity::ScoreHistory)
            .with_cadet_id(entry.cadet_id);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO score_history (cadet_id, category, points, description, awarded_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {HISTORY_COLUMNS}
            "#
        ))
        .bind(entry.cadet_id)
        .bind(entry.category)
        .bind(entry.points)
        .bind(&entry.description)
        .bind(entry.awarded_by)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        Self::row_to_history(&row)
    }

    #[instrument(skip(self), fields(cadet_id = %cadet_id))]
    async fn get_scores(&self, cadet_id: Uuid) -> CadetResult<Option<Scores>> {
        let context = OperationContext::new(RepositoryOperation::Read, RepositoryEntity::Scores)
            .with_cadet_id(cadet_id);

        let row = sqlx::query(
            "SELECT cadet_id, study_score, discipline_score, events_score, version FROM scores WHERE cadet_id = ?",
        )
        .bind(cadet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        row.as_ref().map(Self::row_to_scores).transpose()
    }

    #[instrument(skip(self, scores), fields(cadet_id = %scores.cadet_id, version = scores.version))]
    async fn save_scores(&self, scores: &Scores) -> CadetResult<Option<Scores>> {
        let context = OperationContext::new(RepositoryOperation::ConditionalUpdate, RepositoryEntity::Scores)
            .with_cadet_id(scores.cadet_id);
        let map_err = |e: sqlx::Error| RepositoryErrorHelpers::database_error(context.clone(), e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let written = if scores.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO scores (cadet_id, study_score, discipline_score, events_score, version)
                VALUES (?, ?, ?, ?, 1)
                ON CONFLICT (cadet_id) DO NOTHING
                "#,
            )
            .bind(scores.cadet_id)
            .bind(scores.study_score)
            .bind(scores.discipline_score)
            .bind(scores.events_score)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
        } else {
            sqlx::query(
                r#"
                UPDATE scores
                SET study_score = ?, discipline_score = ?, events_score = ?, version = version + 1
                WHERE cadet_id = ? AND version = ?
                "#,
            )
            .bind(scores.study_score)
            .bind(scores.discipline_score)
            .bind(scores.events_score)
            .bind(scores.cadet_id)
            .bind(scores.version)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
        };

        if written.rows_affected() != 1 {
            debug!("积分版本号已变化，放弃本次写入");
            tx.rollback().await.map_err(map_err)?;
            return Ok(None);
        }

        sqlx::query("UPDATE cadets SET total_score = ? WHERE id = ?")
            .bind(scores.total())
            .bind(scores.cadet_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;

        Ok(Some(Scores {
            version: scores.version + 1,
            ..scores.clone()
        }))
    }

    #[instrument(skip(self), fields(cadet_id = %cadet_id))]
    async fn history_for(&self, cadet_id: Uuid, limit: i64) -> CadetResult<Vec<ScoreHistoryEntry>> {
        let context = OperationContext::new(RepositoryOperation::Query, RepositoryEntity::ScoreHistory)
            .with_cadet_id(cadet_id);

        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM score_history WHERE cadet_id = ? ORDER BY id DESC LIMIT ?"
        ))
        .bind(cadet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        rows.iter().map(Self::row_to_history).collect()
    }

    #[instrument(skip(self))]
    async fn standings(&self) -> CadetResult<Vec<Standing>> {
        let context = OperationContext::new(RepositoryOperation::Query, RepositoryEntity::Scores);

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.full_name, c.total_score,
                   COALESCE(s.study_score, 0) AS study_score,
                   COALESCE(s.discipline_score, 0) AS discipline_score,
                   COALESCE(s.events_score, 0) AS events_score
            FROM cadets c
            LEFT JOIN scores s ON s.cadet_id = c.id
            ORDER BY c.total_score DESC, c.full_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        rows.iter()
            .map(|row| -> CadetResult<Standing> {
                Ok(Standing {
                    rank: 0,
                    cadet_id: row.try_get("id")?,
                    full_name: row.try_get("full_name")?,
                    study_score: row.try_get("study_score")?,
                    discipline_score: row.try_get("discipline_score")?,
                    events_score: row.try_get("events_score")?,
                    total_score: row.try_get("total_score")?,
                })
            })
            .collect()
    }
}
