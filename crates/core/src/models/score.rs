use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Category;

/// 积分流水，只追加，永不修改或删除
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreHistoryEntry {
    pub id: i64,
    pub cadet_id: Uuid,
    pub category: Category,
    /// 带符号的分值，罚分为负数
    pub points: i32,
    pub description: String,
    /// 系统自动产生的罚分为 None
    pub awarded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的积分流水
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScoreHistory {
    pub cadet_id: Uuid,
    pub category: Category,
    pub points: i32,
    pub description: String,
    pub awarded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 学员分类积分聚合
///
/// 每个学员一行，各分类为非负整数。`version` 用于乐观并发控制，
/// 每次成功写入加一，尚未落库的行为 0。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scores {
    pub cadet_id: Uuid,
    pub study_score: i32,
    pub discipline_score: i32,
    pub events_score: i32,
    pub version: i64,
}

impl Scores {
    pub fn zero(cadet_id: Uuid) -> Self {
        Self {
            cadet_id,
            study_score: 0,
            discipline_score: 0,
            events_score: 0,
            version: 0,
        }
    }

    pub fn get(&self, category: Category) -> i32 {
        match category {
            Category::Study => self.study_score,
            Category::Discipline => self.discipline_score,
            Category::Events => self.events_score,
        }
    }

    pub fn total(&self) -> i32 {
        self.study_score + self.discipline_score + self.events_score
    }

    /// 应用带符号的增量，结果在零处截断；版本号不变，由存储层在写入时推进
    pub fn with_delta(&self, category: Category, delta: i32) -> Self {
        let updated = self.get(category).saturating_add(delta).max(0);
        let mut next = self.clone();
        match category {
            Category::Study => next.study_score = updated,
            Category::Discipline => next.discipline_score = updated,
            Category::Events => next.events_score = updated,
        }
        next
    }
}

/// 一次账本变更的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub history: ScoreHistoryEntry,
    pub scores: Scores,
    pub total_score: i32,
    /// 截断后该分类实际变化的分值，可能小于流水中的 `points`
    pub applied_delta: i32,
}

/// 排行榜中的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Standing {
    /// 并列名次相同，下一名次跳过（1, 1, 3）
    pub rank: u32,
    pub cadet_id: Uuid,
    pub full_name: String,
    pub study_score: i32,
    pub discipline_score: i32,
    pub events_score: i32,
    pub total_score: i32,
}

impl Standing {
    pub fn sort_key(&self, category: Option<Category>) -> i32 {
        match category {
            Some(Category::Study) => self.study_score,
            Some(Category::Discipline) => self.discipline_score,
            Some(Category::Events) => self.events_score,
            None => self.total_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_clamps_at_zero() {
        let scores = Scores::zero(Uuid::new_v4()).with_delta(Category::Study, 3);
        assert_eq!(scores.study_score, 3);

        let clamped = scores.with_delta(Category::Study, -5);
        assert_eq!(clamped.study_score, 0);
        assert_eq!(clamped.total(), 0);
    }

    #[test]
    fn test_delta_touches_single_category() {
        let scores = Scores {
            cadet_id: Uuid::new_v4(),
            study_score: 4,
            discipline_score: 6,
            events_score: 1,
            version: 2,
        };

        let next = scores.with_delta(Category::Events, 9);
        assert_eq!(next.events_score, 10);
        assert_eq!(next.study_score, 4);
        assert_eq!(next.discipline_score, 6);
        assert_eq!(next.total(), 20);
        assert_eq!(next.version, 2);
    }
}
