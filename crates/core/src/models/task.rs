use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CadetError;

/// 任务定义
///
/// 由管理端维护的任务目录条目。积分引擎只读取它，唯一的例外是
/// `current_participants`，它由领取/放弃操作通过存储层的原子条件更新维护。
///
/// # 字段说明
///
/// - `category`: 积分归属分类，审核通过和放弃罚分都记在该分类下
/// - `points`: 任务标称分值，审核人实际给分可以不同
/// - `max_participants`: 名额上限，0 表示不限
/// - `abandon_penalty`: 放弃时扣除的分数，0 表示不扣分
/// - `status` / `is_active`: 两者同时满足才允许领取
/// - `current_participants`: 当前领取人数（缓存计数）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub points: i32,
    pub deadline: NaiveDate,
    pub max_participants: i32,
    pub abandon_penalty: i32,
    pub status: TaskStatus,
    pub is_active: bool,
    pub current_participants: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 任务是否接受新的领取
    pub fn is_open(&self) -> bool {
        self.status == TaskStatus::Active && self.is_active
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_participants == 0
    }

    /// 仍有空余名额
    pub fn has_capacity(&self) -> bool {
        self.is_unlimited() || self.current_participants < self.max_participants
    }

    pub fn entity_description(&self) -> String {
        format!("任务 '{}' (ID: {})", self.title, self.id)
    }
}

/// 创建或整体更新任务时的输入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub points: i32,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub max_participants: i32,
    #[serde(default)]
    pub abandon_penalty: i32,
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_task_status() -> TaskStatus {
    TaskStatus::Active
}

fn default_is_active() -> bool {
    true
}

impl TaskDraft {
    pub fn new(
        title: impl Into<String>,
        category: Category,
        difficulty: Difficulty,
        points: i32,
        deadline: NaiveDate,
    ) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category,
            difficulty,
            points,
            deadline,
            max_participants: 0,
            abandon_penalty: 0,
            status: TaskStatus::Active,
            is_active: true,
        }
    }

    pub fn with_capacity(mut self, max_participants: i32) -> Self {
        self.max_participants = max_participants;
        self
    }

    pub fn with_abandon_penalty(mut self, penalty: i32) -> Self {
        self.abandon_penalty = penalty;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 字段校验，在访问存储之前执行
    pub fn validate(&self) -> Result<(), CadetError> {
        if self.title.trim().is_empty() {
            return Err(CadetError::validation("任务标题不能为空"));
        }
        if self.title.chars().count() > 200 {
            return Err(CadetError::validation("任务标题不能超过200个字符"));
        }
        if self.points < 0 {
            return Err(CadetError::validation("任务分值不能为负数"));
        }
        if self.max_participants < 0 {
            return Err(CadetError::validation("名额上限不能为负数"));
        }
        if self.abandon_penalty < 0 {
            return Err(CadetError::validation("放弃罚分不能为负数"));
        }
        Ok(())
    }
}

/// 积分分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Study,
    Discipline,
    Events,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Study, Category::Discipline, Category::Events];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Study => "study",
            Category::Discipline => "discipline",
            Category::Events => "events",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CadetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "study" => Ok(Category::Study),
            "discipline" => Ok(Category::Discipline),
            "events" => Ok(Category::Events),
            _ => Err(CadetError::validation(format!("未知的积分分类: {s}"))),
        }
    }
}

super::sqlite_text_enum!(Category);

/// 任务难度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = CadetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(CadetError::validation(format!("未知的任务难度: {s}"))),
        }
    }
}

super::sqlite_text_enum!(Difficulty);

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Inactive,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = CadetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "inactive" => Ok(TaskStatus::Inactive),
            _ => Err(CadetError::validation(format!("未知的任务状态: {s}"))),
        }
    }
}

super::sqlite_text_enum!(TaskStatus);

/// 任务过滤器
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub category: Option<Category>,
    pub status: Option<TaskStatus>,
    /// 只返回可领取的任务（status = active 且 is_active）
    pub open_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TaskFilter {
    pub fn open() -> Self {
        Self {
            open_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(category) = self.category {
            if task.category != category {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        !self.open_only || task.is_open()
    }
}
