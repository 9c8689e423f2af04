//! Per-board storage shapes.
//!
//! Every board shares one canonical row layout; only the table and index
//! names are parameterized by board id. Shapes are derived lazily, created
//! idempotently at the store (`CREATE TABLE IF NOT EXISTS`), and cached
//! in-process. The cache is per worker: concurrent first-touch from two
//! workers is resolved by the store-level idempotent create, not here.

use crate::error::Result;
use dashmap::DashMap;
use sea_orm::sea_query::{Alias, ColumnDef, Iden, Index, Table};
use sea_orm::ConnectionTrait;
use std::sync::Arc;

/// Columns of the canonical write (post/comment) shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCol {
    Id,
    Num,
    Reply,
    Parent,
    IsComment,
    Comment,
    CommentReply,
    Category,
    Options,
    Subject,
    Content,
    Link1,
    Link2,
    Link1Hit,
    Link2Hit,
    Hit,
    Good,
    Nogood,
    MemberId,
    Password,
    Name,
    FileCount,
    CreatedAt,
    LastAt,
}

impl WriteCol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Num => "num",
            Self::Reply => "reply",
            Self::Parent => "parent",
            Self::IsComment => "is_comment",
            Self::Comment => "comment",
            Self::CommentReply => "comment_reply",
            Self::Category => "category",
            Self::Options => "options",
            Self::Subject => "subject",
            Self::Content => "content",
            Self::Link1 => "link1",
            Self::Link2 => "link2",
            Self::Link1Hit => "link1_hit",
            Self::Link2Hit => "link2_hit",
            Self::Hit => "hit",
            Self::Good => "good",
            Self::Nogood => "nogood",
            Self::MemberId => "member_id",
            Self::Password => "password",
            Self::Name => "name",
            Self::FileCount => "file_count",
            Self::CreatedAt => "created_at",
            Self::LastAt => "last_at",
        }
    }
}

impl Iden for WriteCol {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        s.write_str(self.as_str()).unwrap();
    }
}

/// The resolved storage shape of one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteShape {
    board_id: String,
    table_name: String,
}

impl WriteShape {
    fn new(board_id: &str) -> Self {
        Self {
            board_id: board_id.to_owned(),
            table_name: format!("write_{}", board_id),
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn table(&self) -> Alias {
        Alias::new(&self.table_name)
    }

    /// Issues the idempotent create for the table and its two required
    /// secondary indexes: `(num, reply)` for thread ordering and
    /// `(is_comment)` for list/comment partitioning.
    pub async fn create<C: ConnectionTrait>(&self, db: &C) -> Result<()> {
        let backend = db.get_database_backend();

        let mut table = Table::create();
        table
            .table(self.table())
            .if_not_exists()
            // Ids are allocated by the engine, not the store, so that a
            // fresh root row can carry parent == id in one insert.
            .col(ColumnDef::new(WriteCol::Id).integer().not_null().primary_key())
            .col(ColumnDef::new(WriteCol::Num).integer().not_null().default(0))
            .col(
                ColumnDef::new(WriteCol::Reply)
                    .string_len(10)
                    .not_null()
                    .default(""),
            )
            .col(ColumnDef::new(WriteCol::Parent).integer().not_null().default(0))
            .col(
                ColumnDef::new(WriteCol::IsComment)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(ColumnDef::new(WriteCol::Comment).integer().not_null().default(0))
            .col(
                ColumnDef::new(WriteCol::CommentReply)
                    .string_len(5)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(WriteCol::Category)
                    .string_len(255)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(WriteCol::Options)
                    .string_len(40)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(WriteCol::Subject)
                    .string_len(255)
                    .not_null()
                    .default(""),
            )
            .col(ColumnDef::new(WriteCol::Content).text().not_null())
            .col(ColumnDef::new(WriteCol::Link1).text().not_null())
            .col(ColumnDef::new(WriteCol::Link2).text().not_null())
            .col(
                ColumnDef::new(WriteCol::Link1Hit)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(WriteCol::Link2Hit)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(ColumnDef::new(WriteCol::Hit).integer().not_null().default(0))
            .col(ColumnDef::new(WriteCol::Good).integer().not_null().default(0))
            .col(ColumnDef::new(WriteCol::Nogood).integer().not_null().default(0))
            .col(
                ColumnDef::new(WriteCol::MemberId)
                    .string_len(20)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(WriteCol::Password)
                    .string_len(255)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(WriteCol::Name)
                    .string_len(255)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(WriteCol::FileCount)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(ColumnDef::new(WriteCol::CreatedAt).date_time().not_null())
            .col(ColumnDef::new(WriteCol::LastAt).date_time().not_null());
        db.execute(backend.build(&table)).await?;

        let mut num_reply = Index::create();
        num_reply
            .if_not_exists()
            .name(&format!("idx_num_reply_{}", self.board_id))
            .table(self.table())
            .col(WriteCol::Num)
            .col(WriteCol::Reply);
        db.execute(backend.build(&num_reply)).await?;

        let mut is_comment = Index::create();
        is_comment
            .if_not_exists()
            .name(&format!("idx_is_comment_{}", self.board_id))
            .table(self.table())
            .col(WriteCol::IsComment);
        db.execute(backend.build(&is_comment)).await?;

        Ok(())
    }
}

/// In-process registry of board shapes, owned by the service instance and
/// injected wherever a shape is needed.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    shapes: DashMap<String, Arc<WriteShape>>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached shape for a board, if this worker has touched it before.
    pub fn get(&self, board_id: &str) -> Option<Arc<WriteShape>> {
        self.shapes.get(board_id).map(|s| s.clone())
    }

    /// Derives (or returns the cached) shape without touching the store.
    pub fn get_or_insert(&self, board_id: &str) -> Arc<WriteShape> {
        self.shapes
            .entry(board_id.to_owned())
            .or_insert_with(|| Arc::new(WriteShape::new(board_id)))
            .clone()
    }

    /// Resolves the shape for `board_id`, creating the backing table when
    /// `create_if_missing` is set. A store failure during creation leaves
    /// nothing cached so the next call retries from scratch.
    pub async fn get_or_create<C: ConnectionTrait>(
        &self,
        db: &C,
        board_id: &str,
        create_if_missing: bool,
    ) -> Result<Arc<WriteShape>> {
        if let Some(shape) = self.get(board_id) {
            return Ok(shape);
        }

        let shape = Arc::new(WriteShape::new(board_id));
        if create_if_missing {
            if let Err(e) = shape.create(db).await {
                log::error!("get_or_create: shape creation for '{}' failed: {}", board_id, e);
                return Err(e);
            }
        }
        self.shapes.insert(board_id.to_owned(), shape.clone());
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_is_parameterized_by_board() {
        let shape = WriteShape::new("free");
        assert_eq!(shape.table_name(), "write_free");
        assert_eq!(shape.board_id(), "free");
    }

    #[test]
    fn registry_returns_the_same_shape_twice() {
        let registry = ShapeRegistry::new();
        let a = registry.get_or_insert("gallery");
        let b = registry.get_or_insert("gallery");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.table_name(), "write_gallery");
        assert!(registry.get("unknown").is_none());
    }
}
