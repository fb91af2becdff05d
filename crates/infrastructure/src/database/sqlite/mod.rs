pub mod sqlite_cadet_repository;
pub mod sqlite_score_repository;
pub mod sqlite_submission_repository;
pub mod sqlite_task_repository;

use std::str::FromStr;
use std::time::Duration;

use cadet_core::{config::DatabaseConfig, CadetResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::error_handling::{
    OperationContext, RepositoryEntity, RepositoryErrorHelpers, RepositoryOperation,
};

/// 基于 SQLite 的账本存储
///
/// 同时实现任务、提交记录、积分与学员四个仓储接口。条件更新是单条语句；
/// 领取（插入并加一）、放弃（删除并减一）和积分写入（聚合并同步总分）各自在一个事务中完成。
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 按配置创建连接池并运行迁移
    ///
    /// 内存数据库每个连接都是独立的库，因此强制使用单连接。
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn connect(config: &DatabaseConfig) -> CadetResult<Self> {
        let in_memory = config.url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let max_connections = if in_memory { 1 } else { config.max_connections };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(config.min_connections.min(max_connections))
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect_with(connect_options)
            .await?;

        let store = Self::new(pool);
        store.run_migrations().await?;
        info!(max_connections, "SQLite存储已就绪");
        Ok(store)
    }

    /// 运行数据库迁移
    pub async fn run_migrations(&self) -> CadetResult<()> {
        debug!("Running SQLite database migrations");
        let context = OperationContext::new(RepositoryOperation::Migrate, RepositoryEntity::Schema);

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        }

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    pub async fn health_check(&self) -> CadetResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const SCHEMA: [&str; 10] = [
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL,
        difficulty TEXT NOT NULL,
        points INTEGER NOT NULL CHECK (points >= 0),
        deadline TEXT NOT NULL,
        max_participants INTEGER NOT NULL DEFAULT 0 CHECK (max_participants >= 0),
        abandon_penalty INTEGER NOT NULL DEFAULT 0 CHECK (abandon_penalty >= 0),
        status TEXT NOT NULL DEFAULT 'active',
        is_active INTEGER NOT NULL DEFAULT 1,
        current_participants INTEGER NOT NULL DEFAULT 0 CHECK (current_participants >= 0),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cadets (
        id BLOB PRIMARY KEY,
        full_name TEXT NOT NULL,
        total_score INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        cadet_id BLOB NOT NULL REFERENCES cadets(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'taken',
        submission_text TEXT NOT NULL DEFAULT '',
        submitted_at TEXT,
        reviewed_at TEXT,
        reviewed_by BLOB,
        feedback TEXT,
        points_awarded INTEGER NOT NULL DEFAULT 0 CHECK (points_awarded >= 0),
        created_at TEXT NOT NULL,
        UNIQUE (task_id, cadet_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS score_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cadet_id BLOB NOT NULL REFERENCES cadets(id) ON DELETE CASCADE,
        category TEXT NOT NULL,
        points INTEGER NOT NULL,
        description TEXT NOT NULL,
        awarded_by BLOB,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scores (
        cadet_id BLOB PRIMARY KEY REFERENCES cadets(id) ON DELETE CASCADE,
        study_score INTEGER NOT NULL DEFAULT 0 CHECK (study_score >= 0),
        discipline_score INTEGER NOT NULL DEFAULT 0 CHECK (discipline_score >= 0),
        events_score INTEGER NOT NULL DEFAULT 0 CHECK (events_score >= 0),
        version INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(category)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, is_active)",
    "CREATE INDEX IF NOT EXISTS idx_submissions_cadet_id ON submissions(cadet_id)",
    "CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status)",
    "CREATE INDEX IF NOT EXISTS idx_score_history_cadet_id ON score_history(cadet_id)",
];

#[cfg(test)]
pub(crate) mod test_support {
    use super::SqliteStore;
    use sqlx::sqlite::SqlitePoolOptions;

    /// 单连接内存库，所有查询共享同一个数据库
    pub async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStore::new(pool);
        store.run_migrations().await.unwrap();
        store
    }
}
