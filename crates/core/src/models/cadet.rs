use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 学员
///
/// `total_score` 由积分账本维护，等于三个分类积分之和。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cadet {
    pub id: Uuid,
    pub full_name: String,
    pub total_score: i32,
    pub created_at: DateTime<Utc>,
}

impl Cadet {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            total_score: 0,
            created_at: Utc::now(),
        }
    }

    pub fn entity_description(&self) -> String {
        format!("学员 '{}' (ID: {})", self.full_name, self.id)
    }
}
