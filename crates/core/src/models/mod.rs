//! # 数据模型
//!
//! 学员门户积分引擎的核心数据结构：任务、提交记录、积分账本、学员与调用主体。
//!
//! ## 提交状态流转
//! ```text
//! Taken → Submitted → Completed
//!   ↓         ↓
//! Abandoned  Rejected
//! ```
//!
//! `Completed`、`Rejected` 为终态；`Abandoned` 不落库，对应记录直接删除。
//!
//! ## 数据库映射
//!
//! - `tasks` - 任务目录，`current_participants` 为缓存的领取人数
//! - `submissions` - 提交记录，(task_id, cadet_id) 唯一
//! - `score_history` - 只追加的积分流水
//! - `scores` - 每个学员一行的分类积分聚合
//! - `cadets` - 学员及其 `total_score`
//!
//! 状态类枚举统一以小写文本存储。

/// 为以文本存储的枚举实现 SQLite 编解码，依赖 `as_str` 与 `FromStr`
macro_rules! sqlite_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $ty {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $ty {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(s.parse::<$ty>()?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub(crate) use sqlite_text_enum;

pub mod cadet;
pub mod principal;
pub mod score;
pub mod submission;
pub mod task;

pub use cadet::*;
pub use principal::*;
pub use score::*;
pub use submission::*;
pub use task::*;
