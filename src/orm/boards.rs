use sea_orm::entity::prelude::*;

/// Board configuration. The id doubles as the suffix of the board's dynamic
/// write table (`write_{id}`), so it must stay filesystem- and SQL-safe.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "boards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub subject: String,
    pub skin: String,
    /// Per-board administrator. Empty means none.
    pub admin_id: Option<String>,
    pub list_level: i32,
    pub read_level: i32,
    pub write_level: i32,
    pub reply_level: i32,
    pub comment_level: i32,
    pub download_level: i32,
    pub upload_level: i32,
    pub link_level: i32,
    /// Point deltas. Negative = cost, positive = reward, zero = no event.
    pub read_point: i64,
    pub write_point: i64,
    pub comment_point: i64,
    pub download_point: i64,
    pub use_secret: bool,
    /// Comma-joined write ids pinned as notices.
    pub notice_ids: String,
    /// Editing a post is refused once it has this many comments. Zero = off.
    pub count_modify: i32,
    pub count_delete: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id"
    )]
    Groups,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn notice_ids(&self) -> Vec<i32> {
        self.notice_ids
            .split(',')
            .filter_map(|v| v.trim().parse().ok())
            .collect()
    }

    pub fn is_notice(&self, write_id: i32) -> bool {
        self.notice_ids().contains(&write_id)
    }
}
