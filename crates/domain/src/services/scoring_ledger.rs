use std::sync::Arc;

use cadet_core::{
    config::EngineConfig,
    models::{
        Capability, Category, LedgerUpdate, NewScoreHistory, Principal, ScoreHistoryEntry, Scores,
        Standing,
    },
    traits::{Clock, LedgerStore},
    CadetError, CadetResult,
};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::permission_gate::PermissionGate;
use crate::timeout_handler::{TimeoutConfig, TimeoutHandler};

const MAX_DESCRIPTION_CHARS: usize = 500;
const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// 积分账本
///
/// 所有积分变更（审核计分、放弃罚分、人工加减分）都只能经过 `apply_delta`：
/// 先追加不可变的流水，再以乐观并发方式更新分类聚合和学员总分。
pub struct ScoringLedger {
    store: Arc<dyn LedgerStore>,
    gate: PermissionGate,
    clock: Arc<dyn Clock>,
    timeout: TimeoutHandler,
    retry_limit: u32,
}

impl ScoringLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gate: PermissionGate,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            gate,
            clock,
            timeout: TimeoutHandler::new(TimeoutConfig::from(config)),
            retry_limit: config.score_retry_limit.max(1),
        }
    }

    /// 对学员某个分类应用带符号的增量
    ///
    /// 流水总是先于聚合写入。聚合在零处截断，流水保留原始分值。
    /// 版本冲突时重新读取并重算，超过重试次数返回 `Conflict`，此时流水已存在。
    #[instrument(skip(self, description), fields(cadet_id = %cadet_id, category = %category))]
    pub async fn apply_delta(
        &self,
        cadet_id: Uuid,
        category: Category,
        delta: i32,
        description: &str,
        awarded_by: Option<Uuid>,
    ) -> CadetResult<LedgerUpdate> {
        validate_description(description)?;
        self.ensure_cadet(cadet_id).await?;

        let entry = NewScoreHistory {
            cadet_id,
            category,
            points: delta,
            description: description.trim().to_string(),
            awarded_by,
            created_at: self.clock.now(),
        };
        let history = self
            .timeout
            .store_operation(self.store.append_history(&entry), "append_history")
            .await?;

        match self.write_aggregate(cadet_id, category, delta).await {
            Ok((scores, applied_delta)) => {
                info!(
                    history_id = history.id,
                    delta,
                    applied_delta,
                    total_score = scores.total(),
                    "积分已更新"
                );
                Ok(LedgerUpdate {
                    total_score: scores.total(),
                    history,
                    scores,
                    applied_delta,
                })
            }
            Err(e) => {
                error!(
                    history_id = history.id,
                    delta,
                    error = %e,
                    reconciliation = "score_aggregate",
                    "流水已追加但聚合未更新"
                );
                Err(e)
            }
        }
    }

    /// 读取、截断、按版本号写回，返回写入后的积分和实际生效的增量
    async fn write_aggregate(
        &self,
        cadet_id: Uuid,
        category: Category,
        delta: i32,
    ) -> CadetResult<(Scores, i32)> {
        for attempt in 1..=self.retry_limit {
            let current = self
                .timeout
                .store_operation(self.store.get_scores(cadet_id), "get_scores")
                .await?
                .unwrap_or_else(|| Scores::zero(cadet_id));
            let next = current.with_delta(category, delta);

            let saved = self
                .timeout
                .store_operation(self.store.save_scores(&next), "save_scores")
                .await?;
            if let Some(saved) = saved {
                let applied_delta = saved.get(category) - current.get(category);
                return Ok((saved, applied_delta));
            }

            debug!(attempt, "积分聚合版本冲突，重新读取");
        }

        Err(CadetError::conflict(format!(
            "学员 {cadet_id} 的积分在 {} 次尝试内未能写入",
            self.retry_limit
        )))
    }

    /// 人工加分或扣分，需要对应分类的积分管理权限
    #[instrument(skip(self, principal, description), fields(user_id = %principal.user_id))]
    pub async fn award(
        &self,
        principal: &Principal,
        cadet_id: Uuid,
        category: Category,
        delta: i32,
        description: &str,
    ) -> CadetResult<LedgerUpdate> {
        if delta == 0 {
            return Err(CadetError::validation("分值不能为0"));
        }
        validate_description(description)?;

        self.gate
            .require(principal, Capability::ManageScores(category))
            .await?;
        self.apply_delta(
            cadet_id,
            category,
            delta,
            description,
            Some(principal.user_id),
        )
        .await
    }

    /// 学员当前的分类积分，学员没有任何积分记录时全部为 0
    pub async fn scores(&self, principal: &Principal, cadet_id: Uuid) -> CadetResult<Scores> {
        self.gate
            .require_self_or(principal, cadet_id, Capability::ManageTasks)
            .await?;
        self.ensure_cadet(cadet_id).await?;
        Ok(self
            .timeout
            .store_operation(self.store.get_scores(cadet_id), "get_scores")
            .await?
            .unwrap_or_else(|| Scores::zero(cadet_id)))
    }

    /// 学员的积分流水，按时间倒序
    pub async fn history(
        &self,
        principal: &Principal,
        cadet_id: Uuid,
        limit: Option<i64>,
    ) -> CadetResult<Vec<ScoreHistoryEntry>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if limit <= 0 {
            return Err(CadetError::validation("limit 必须大于0"));
        }

        self.gate
            .require_self_or(principal, cadet_id, Capability::ManageTasks)
            .await?;
        self.timeout
            .store_operation(self.store.history_for(cadet_id, limit), "history_for")
            .await
    }

    /// 排行榜，`category` 为空时按总分排序
    pub async fn leaderboard(
        &self,
        category: Option<Category>,
        limit: Option<usize>,
    ) -> CadetResult<Vec<Standing>> {
        let standings = self
            .timeout
            .store_operation(self.store.standings(), "standings")
            .await?;

        let mut ranked = rank_standings(standings, category);
        if let Some(limit) = limit {
            ranked.truncate(limit);
        }
        Ok(ranked)
    }

    async fn ensure_cadet(&self, cadet_id: Uuid) -> CadetResult<()> {
        let cadet = self
            .timeout
            .store_operation(self.store.get_cadet(cadet_id), "get_cadet")
            .await?;
        if cadet.is_none() {
            return Err(CadetError::cadet_not_found(cadet_id));
        }
        Ok(())
    }
}

fn validate_description(description: &str) -> CadetResult<()> {
    if description.trim().is_empty() {
        return Err(CadetError::validation("积分说明不能为空"));
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(CadetError::validation(format!(
            "积分说明不能超过{MAX_DESCRIPTION_CHARS}个字符"
        )));
    }
    Ok(())
}

/// 竞赛排名：分数相同名次相同，下一名次跳过（1, 1, 3）
///
/// 同分时按姓名再按 ID 排序，保证输出稳定。
pub fn rank_standings(mut standings: Vec<Standing>, category: Option<Category>) -> Vec<Standing> {
    standings.sort_by(|a, b| {
        b.sort_key(category)
            .cmp(&a.sort_key(category))
            .then_with(|| a.full_name.cmp(&b.full_name))
            .then_with(|| a.cadet_id.cmp(&b.cadet_id))
    });

    let mut previous: Option<(i32, u32)> = None;
    for (index, standing) in standings.iter_mut().enumerate() {
        let key = standing.sort_key(category);
        let rank = match previous {
            Some((prev_key, prev_rank)) if prev_key == key => prev_rank,
            _ => index as u32 + 1,
        };
        standing.rank = rank;
        previous = Some((key, rank));
    }
    standings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(name: &str, study: i32, discipline: i32) -> Standing {
        Standing {
            rank: 0,
            cadet_id: Uuid::new_v4(),
            full_name: name.to_string(),
            study_score: study,
            discipline_score: discipline,
            events_score: 0,
            total_score: study + discipline,
        }
    }

    #[test]
    fn test_competition_ranking() {
        let ranked = rank_standings(
            vec![
                standing("Carol", 3, 0),
                standing("Alice", 5, 5),
                standing("Bob", 10, 0),
                standing("Dave", 0, 0),
            ],
            None,
        );

        let summary: Vec<(&str, u32)> = ranked
            .iter()
            .map(|s| (s.full_name.as_str(), s.rank))
            .collect();
        assert_eq!(
            summary,
            vec![("Alice", 1), ("Bob", 1), ("Carol", 3), ("Dave", 4)]
        );
    }

    #[test]
    fn test_category_ranking() {
        let ranked = rank_standings(
            vec![standing("Alice", 5, 5), standing("Bob", 10, 0)],
            Some(Category::Discipline),
        );
        assert_eq!(ranked[0].full_name, "Alice");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_description_rules() {
        assert!(validate_description("完成任务").is_ok());
        assert!(validate_description("  ").is_err());
        assert!(validate_description(&"x".repeat(MAX_DESCRIPTION_CHARS + 1)).is_err());
    }
}
