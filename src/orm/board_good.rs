use sea_orm::entity::prelude::*;

/// One good/nogood vote on a post.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "board_good")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub board_id: String,
    pub write_id: i32,
    pub member_id: String,
    /// "good" or "nogood".
    pub flag: String,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::boards::Entity",
        from = "Column::BoardId",
        to = "super::boards::Column::Id"
    )]
    Boards,
}

impl Related<super::boards::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Boards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
