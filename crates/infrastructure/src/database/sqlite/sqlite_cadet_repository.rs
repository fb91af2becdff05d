use async_trait::async_trait;
use cadet_core::{models::Cadet, traits::CadetRepository, CadetResult};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use super::SqliteStore;
use crate::error_handling::{
    OperationContext, RepositoryEntity, RepositoryErrorHelpers, RepositoryOperation,
};

impl SqliteStore {
    fn row_to_cadet(row: &sqlx::sqlite::SqliteRow) -> CadetResult<Cadet> {
        Ok(Cadet {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            total_score: row.try_get("total_score")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl CadetRepository for SqliteStore {
    #[instrument(skip(self, cadet), fields(cadet_id = %cadet.id))]
    async fn create_cadet(&self, cadet: &Cadet) -> CadetResult<Cadet> {
        let context = OperationContext::new(RepositoryOperation::Create, RepositoryEntity::Cadet)
            .with_cadet_id(cadet.id);

        let row = sqlx::query(
            r#"
            INSERT INTO cadets (id, full_name, total_score, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, full_name, total_score, created_at
            "#,
        )
        .bind(cadet.id)
        .bind(&cadet.full_name)
        .bind(cadet.total_score)
        .bind(cadet.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let created = Self::row_to_cadet(&row)?;
        RepositoryErrorHelpers::log_operation_success(&context, &created.entity_description(), None);
        Ok(created)
    }

    #[instrument(skip(self), fields(cadet_id = %id))]
    async fn get_cadet(&self, id: Uuid) -> CadetResult<Option<Cadet>> {
        let context = OperationContext::new(RepositoryOperation::Read, RepositoryEntity::Cadet)
            .with_cadet_id(id);

        let row = sqlx::query("SELECT id, full_name, total_score, created_at FROM cadets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        row.as_ref().map(Self::row_to_cadet).transpose()
    }
}
