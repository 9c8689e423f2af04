use sea_orm::entity::prelude::*;

/// Entry is live and spendable.
pub const LIVE: i32 = 0;
/// Entry passed its expire date, or is a consumption (negative) entry.
pub const EXPIRED: i32 = 1;
/// Credit fully consumed by later spending.
pub const EXHAUSTED: i32 = 100;

/// One signed point transaction. Append-only except for `use_point` and
/// `expired`, which advance in place; rows are deleted only by the reversal
/// path.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "points")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub member_id: String,
    pub created_at: DateTime,
    pub content: String,
    /// Signed delta. Positive = credit, negative = debit.
    pub point: i64,
    /// How much of a credit has been consumed so far.
    pub use_point: i64,
    /// Running balance of the member at insertion time.
    pub member_point: i64,
    /// One of LIVE / EXPIRED / EXHAUSTED.
    pub expired: i32,
    /// None = never expires.
    pub expire_date: Option<DateTime>,
    // Idempotency triple. At most one non-deleted entry may exist per
    // (member_id, rel_table, rel_id, rel_action).
    pub rel_table: String,
    pub rel_id: String,
    pub rel_action: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::members::Entity",
        from = "Column::MemberId",
        to = "super::members::Column::Id"
    )]
    Members,
}

impl Related<super::members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Unspent remainder of a credit entry.
    pub fn remaining(&self) -> i64 {
        self.point - self.use_point
    }
}
