use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CadetError;

/// 提交记录
///
/// 跟踪某个学员对某个任务的领取与完成情况，(task_id, cadet_id) 至多一条。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    pub id: i64,
    pub task_id: i64,
    pub cadet_id: Uuid,
    pub status: SubmissionStatus,
    pub submission_text: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub feedback: Option<String>,
    pub points_awarded: i32,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn entity_description(&self) -> String {
        format!(
            "提交记录 (ID: {}, 任务ID: {}, 学员: {})",
            self.id, self.task_id, self.cadet_id
        )
    }
}

/// 新领取时插入的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub task_id: i64,
    pub cadet_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// 领取的存储层裁决
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimAttempt {
    /// 记录已插入，领取人数已加一
    Claimed(Submission),
    /// 该组合已有记录，未做任何写入
    AlreadyClaimed,
    /// 名额已满或任务不存在，未做任何写入
    Full,
}

/// 提交状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Taken,
    Submitted,
    Completed,
    Rejected,
    Abandoned,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Taken => "taken",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Abandoned => "abandoned",
        }
    }

    /// 终态之后不再允许任何流转
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Completed | SubmissionStatus::Rejected | SubmissionStatus::Abandoned
        )
    }

    /// 合法流转表
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (SubmissionStatus::Taken, SubmissionStatus::Submitted)
                | (SubmissionStatus::Taken, SubmissionStatus::Abandoned)
                | (SubmissionStatus::Submitted, SubmissionStatus::Completed)
                | (SubmissionStatus::Submitted, SubmissionStatus::Rejected)
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = CadetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "taken" => Ok(SubmissionStatus::Taken),
            "submitted" => Ok(SubmissionStatus::Submitted),
            "completed" => Ok(SubmissionStatus::Completed),
            "rejected" => Ok(SubmissionStatus::Rejected),
            "abandoned" => Ok(SubmissionStatus::Abandoned),
            _ => Err(CadetError::validation(format!("未知的提交状态: {s}"))),
        }
    }
}

super::sqlite_text_enum!(SubmissionStatus);

/// 审核结论
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Completed,
    Rejected,
}

impl ReviewDecision {
    pub fn target_status(&self) -> SubmissionStatus {
        match self {
            ReviewDecision::Completed => SubmissionStatus::Completed,
            ReviewDecision::Rejected => SubmissionStatus::Rejected,
        }
    }
}

/// 提交记录的状态变更，由存储层以 "当前状态等于预期" 为条件原子写入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionTransition {
    Submit {
        text: String,
        submitted_at: DateTime<Utc>,
    },
    Review {
        decision: ReviewDecision,
        feedback: Option<String>,
        points_awarded: i32,
        reviewed_by: Uuid,
        reviewed_at: DateTime<Utc>,
    },
}

impl SubmissionTransition {
    pub fn source_status(&self) -> SubmissionStatus {
        match self {
            SubmissionTransition::Submit { .. } => SubmissionStatus::Taken,
            SubmissionTransition::Review { .. } => SubmissionStatus::Submitted,
        }
    }

    pub fn target_status(&self) -> SubmissionStatus {
        match self {
            SubmissionTransition::Submit { .. } => SubmissionStatus::Submitted,
            SubmissionTransition::Review { decision, .. } => decision.target_status(),
        }
    }

    /// 把变更应用到内存中的记录上
    pub fn apply_to(&self, submission: &mut Submission) {
        submission.status = self.target_status();
        match self {
            SubmissionTransition::Submit { text, submitted_at } => {
                submission.submission_text = text.clone();
                submission.submitted_at = Some(*submitted_at);
            }
            SubmissionTransition::Review {
                feedback,
                points_awarded,
                reviewed_by,
                reviewed_at,
                ..
            } => {
                submission.feedback = feedback.clone();
                submission.points_awarded = *points_awarded;
                submission.reviewed_by = Some(*reviewed_by);
                submission.reviewed_at = Some(*reviewed_at);
            }
        }
    }
}

/// 提交记录过滤器
#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub task_id: Option<i64>,
    pub cadet_id: Option<Uuid>,
    pub status: Option<SubmissionStatus>,
    pub limit: Option<i64>,
}

impl SubmissionFilter {
    pub fn matches(&self, submission: &Submission) -> bool {
        self.task_id.map_or(true, |id| submission.task_id == id)
            && self.cadet_id.map_or(true, |id| submission.cadet_id == id)
            && self.status.map_or(true, |status| submission.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use SubmissionStatus::*;

        assert!(Taken.can_transition_to(Submitted));
        assert!(Taken.can_transition_to(Abandoned));
        assert!(Submitted.can_transition_to(Completed));
        assert!(Submitted.can_transition_to(Rejected));

        assert!(!Taken.can_transition_to(Completed));
        assert!(!Submitted.can_transition_to(Abandoned));
        assert!(!Submitted.can_transition_to(Taken));
        for terminal in [Completed, Rejected, Abandoned] {
            assert!(terminal.is_terminal());
            for next in [Taken, Submitted, Completed, Rejected, Abandoned] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_apply_review_transition() {
        let now = Utc::now();
        let reviewer = Uuid::new_v4();
        let mut submission = Submission {
            id: 3,
            task_id: 1,
            cadet_id: Uuid::new_v4(),
            status: SubmissionStatus::Submitted,
            submission_text: "done".to_string(),
            submitted_at: Some(now),
            reviewed_at: None,
            reviewed_by: None,
            feedback: None,
            points_awarded: 0,
            created_at: now,
        };

        let transition = SubmissionTransition::Review {
            decision: ReviewDecision::Completed,
            feedback: Some("good".to_string()),
            points_awarded: 8,
            reviewed_by: reviewer,
            reviewed_at: now,
        };
        assert_eq!(transition.source_status(), SubmissionStatus::Submitted);
        transition.apply_to(&mut submission);

        assert_eq!(submission.status, SubmissionStatus::Completed);
        assert_eq!(submission.points_awarded, 8);
        assert_eq!(submission.reviewed_by, Some(reviewer));
        assert_eq!(submission.feedback.as_deref(), Some("good"));
    }

    #[test]
    fn test_status_round_trip_text() {
        assert_eq!("submitted".parse::<SubmissionStatus>().unwrap(), SubmissionStatus::Submitted);
        assert!("pending".parse::<SubmissionStatus>().is_err());
    }
}
