use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Category;
use crate::errors::CadetError;

/// 已认证的调用主体
///
/// 由外部认证层构造后传入引擎。`cadet_id` 仅在主体本身是学员时存在。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub cadet_id: Option<Uuid>,
    pub role: UserRole,
    #[serde(default)]
    pub permissions: Vec<Capability>,
}

impl Principal {
    pub fn cadet(cadet_id: Uuid) -> Self {
        Self {
            user_id: cadet_id,
            cadet_id: Some(cadet_id),
            role: UserRole::Cadet,
            permissions: Vec::new(),
        }
    }

    pub fn staff(user_id: Uuid, permissions: Vec<Capability>) -> Self {
        Self {
            user_id,
            cadet_id: None,
            role: UserRole::Staff,
            permissions,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            cadet_id: None,
            role: UserRole::Admin,
            permissions: Vec::new(),
        }
    }

    /// 主体是否就是该学员本人
    pub fn acts_as(&self, cadet_id: Uuid) -> bool {
        self.cadet_id == Some(cadet_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Staff,
    Cadet,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Staff => "staff",
            UserRole::Cadet => "cadet",
        }
    }
}

impl FromStr for UserRole {
    type Err = CadetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "staff" => Ok(UserRole::Staff),
            "cadet" => Ok(UserRole::Cadet),
            _ => Err(CadetError::validation(format!("未知的角色: {s}"))),
        }
    }
}

/// 权限能力，对外以固定字符串表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ManageTasks,
    ManageScores(Category),
    AwardAchievements,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageTasks => "manage_tasks",
            Capability::ManageScores(Category::Study) => "manage_scores_study",
            Capability::ManageScores(Category::Discipline) => "manage_scores_discipline",
            Capability::ManageScores(Category::Events) => "manage_scores_events",
            Capability::AwardAchievements => "award_achievements",
        }
    }

    pub fn all() -> Vec<Capability> {
        let mut all = vec![Capability::ManageTasks];
        all.extend(Category::ALL.into_iter().map(Capability::ManageScores));
        all.push(Capability::AwardAchievements);
        all
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CadetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manage_tasks" => Ok(Capability::ManageTasks),
            "manage_scores_study" => Ok(Capability::ManageScores(Category::Study)),
            "manage_scores_discipline" => Ok(Capability::ManageScores(Category::Discipline)),
            "manage_scores_events" => Ok(Capability::ManageScores(Category::Events)),
            "award_achievements" => Ok(Capability::AwardAchievements),
            _ => Err(CadetError::validation(format!("未知的权限: {s}"))),
        }
    }
}

impl Serialize for Capability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_names() {
        for capability in Capability::all() {
            assert_eq!(capability.as_str().parse::<Capability>().unwrap(), capability);
        }
        assert_eq!(
            Capability::ManageScores(Category::Discipline).to_string(),
            "manage_scores_discipline"
        );
        assert!("manage_everything".parse::<Capability>().is_err());
    }

    #[test]
    fn test_principal_serde() {
        let principal = Principal::staff(Uuid::new_v4(), vec![Capability::ManageTasks]);
        let json = serde_json::to_value(&principal).unwrap();
        assert_eq!(json["role"], "staff");
        assert_eq!(json["permissions"][0], "manage_tasks");

        let back: Principal = serde_json::from_value(json).unwrap();
        assert_eq!(back, principal);
    }

    #[test]
    fn test_acts_as() {
        let cadet_id = Uuid::new_v4();
        assert!(Principal::cadet(cadet_id).acts_as(cadet_id));
        assert!(!Principal::cadet(cadet_id).acts_as(Uuid::new_v4()));
        assert!(!Principal::admin(cadet_id).acts_as(cadet_id));
    }
}
