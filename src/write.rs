//! The uniform post/comment row and its mutations.
//!
//! Every board stores posts and comments in one dynamically-named table of
//! identical layout (see [`crate::schema`]); rows are reached through
//! `sea_query` statements instead of a derive entity because the table name
//! is only known at runtime. A row is a comment iff `is_comment` is set;
//! comments point their `parent` at the root post, while posts are
//! self-parented from the moment they are inserted.

use crate::cache::FragmentCache;
use crate::config::Config;
use crate::error::{DeniedReason, Error, Result};
use crate::files::FileStore;
use crate::mail::{self, Mailer};
use crate::orm::board_new;
use crate::schema::{WriteCol, WriteShape};
use crate::{point, thread};
use chrono::prelude::Utc;
use sea_orm::sea_query::{Alias, Expr, Order, Query};
use sea_orm::{
    entity::*, query::*, ConnectionTrait, DatabaseConnection, FromQueryResult, TransactionTrait,
};
use std::fmt;

/// Option flags stored as a comma-joined set, e.g. `"html1,secret"`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub html: bool,
    pub secret: bool,
    pub mail: bool,
}

impl WriteOptions {
    pub fn parse(raw: &str) -> Self {
        let mut options = Self::default();
        for flag in raw.split(',') {
            match flag.trim() {
                "html1" | "html2" => options.html = true,
                "secret" => options.secret = true,
                "mail" => options.mail = true,
                _ => {}
            }
        }
        options
    }
}

impl fmt::Display for WriteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::with_capacity(3);
        if self.html {
            flags.push("html1");
        }
        if self.secret {
            flags.push("secret");
        }
        if self.mail {
            flags.push("mail");
        }
        f.write_str(&flags.join(","))
    }
}

/// A fully materialized row of a board's write table.
#[derive(Debug, Clone, FromQueryResult)]
pub struct WriteRow {
    pub id: i32,
    pub num: i32,
    pub reply: String,
    pub parent: i32,
    pub is_comment: i32,
    /// Comment ordinal on comment rows; comment count on post rows.
    pub comment: i32,
    pub comment_reply: String,
    pub category: String,
    pub options: String,
    pub subject: String,
    pub content: String,
    pub link1: String,
    pub link2: String,
    pub link1_hit: i32,
    pub link2_hit: i32,
    pub hit: i32,
    pub good: i32,
    pub nogood: i32,
    pub member_id: String,
    pub password: String,
    pub name: String,
    pub file_count: i32,
    pub created_at: chrono::NaiveDateTime,
    pub last_at: chrono::NaiveDateTime,
}

impl WriteRow {
    pub fn is_comment_row(&self) -> bool {
        self.is_comment != 0
    }

    pub fn option_set(&self) -> WriteOptions {
        WriteOptions::parse(&self.options)
    }

    pub fn is_secret(&self) -> bool {
        self.option_set().secret
    }

    /// Anonymous rows have no author id and are guarded by `password`.
    pub fn is_anonymous(&self) -> bool {
        self.member_id.is_empty()
    }
}

/// Field subset a caller can actually supply for a new post or comment.
#[derive(Debug, Default, Clone)]
pub struct NewWrite {
    pub subject: String,
    pub content: String,
    pub member_id: String,
    pub name: String,
    pub password: String,
    pub category: String,
    pub options: WriteOptions,
    pub link1: String,
    pub link2: String,
}

const ALL_COLS: [WriteCol; 24] = [
    WriteCol::Id,
    WriteCol::Num,
    WriteCol::Reply,
    WriteCol::Parent,
    WriteCol::IsComment,
    WriteCol::Comment,
    WriteCol::CommentReply,
    WriteCol::Category,
    WriteCol::Options,
    WriteCol::Subject,
    WriteCol::Content,
    WriteCol::Link1,
    WriteCol::Link2,
    WriteCol::Link1Hit,
    WriteCol::Link2Hit,
    WriteCol::Hit,
    WriteCol::Good,
    WriteCol::Nogood,
    WriteCol::MemberId,
    WriteCol::Password,
    WriteCol::Name,
    WriteCol::FileCount,
    WriteCol::CreatedAt,
    WriteCol::LastAt,
];

fn select_rows(shape: &WriteShape) -> sea_orm::sea_query::SelectStatement {
    let mut query = Query::select();
    query.from(shape.table()).columns(ALL_COLS);
    query
}

pub async fn find_write<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    id: i32,
) -> Result<Option<WriteRow>> {
    let mut query = select_rows(shape);
    query.and_where(Expr::col(WriteCol::Id).eq(id));
    let row = db
        .query_one(db.get_database_backend().build(&query))
        .await?;
    Ok(row
        .map(|r| WriteRow::from_query_result(&r, ""))
        .transpose()?)
}

pub async fn get_write<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    id: i32,
) -> Result<WriteRow> {
    find_write(db, shape, id).await?.ok_or(Error::NotFound {
        kind: "write",
        id: id.to_string(),
    })
}

/// The root post of a thread: shares `num` with the reply, empty reply code.
pub async fn find_thread_root<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    num: i32,
) -> Result<Option<WriteRow>> {
    let mut query = select_rows(shape);
    query
        .and_where(Expr::col(WriteCol::Num).eq(num))
        .and_where(Expr::col(WriteCol::Reply).eq(""))
        .and_where(Expr::col(WriteCol::IsComment).eq(0));
    let row = db
        .query_one(db.get_database_backend().build(&query))
        .await?;
    Ok(row
        .map(|r| WriteRow::from_query_result(&r, ""))
        .transpose()?)
}

/// All posts of a thread in depth-first order (`reply` string order).
pub async fn thread_rows<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    num: i32,
) -> Result<Vec<WriteRow>> {
    let mut query = select_rows(shape);
    query
        .and_where(Expr::col(WriteCol::Num).eq(num))
        .and_where(Expr::col(WriteCol::IsComment).eq(0))
        .order_by(WriteCol::Reply, Order::Asc);
    collect_rows(db, &query).await
}

/// Comments of a post, ordered by ordinal then nesting code.
pub async fn comment_rows<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    post_id: i32,
) -> Result<Vec<WriteRow>> {
    let mut query = select_rows(shape);
    query
        .and_where(Expr::col(WriteCol::Parent).eq(post_id))
        .and_where(Expr::col(WriteCol::IsComment).eq(1))
        .order_by(WriteCol::Comment, Order::Asc)
        .order_by(WriteCol::CommentReply, Order::Asc);
    collect_rows(db, &query).await
}

/// Newest post rows for the latest-posts fragment.
pub async fn latest_rows<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    rows: u64,
) -> Result<Vec<WriteRow>> {
    let mut query = select_rows(shape);
    query
        .and_where(Expr::col(WriteCol::IsComment).eq(0))
        .order_by(WriteCol::Num, Order::Desc)
        .order_by(WriteCol::Reply, Order::Asc)
        .limit(rows);
    collect_rows(db, &query).await
}

async fn collect_rows<C: ConnectionTrait>(
    db: &C,
    query: &sea_orm::sea_query::SelectStatement,
) -> Result<Vec<WriteRow>> {
    let rows = db.query_all(db.get_database_backend().build(query)).await?;
    rows.iter()
        .map(|r| WriteRow::from_query_result(r, "").map_err(Into::into))
        .collect()
}

/// Allocates the next row identity. Runs inside the caller's transaction so
/// the id can also serve as the self-referential `parent` of a new post.
///
/// Two concurrent creates on one board can pick the same id; the loser's
/// insert hits the primary key and the whole transaction fails with
/// `Store`, which the request boundary treats as retryable. There is one
/// store session per request, so the window is a single round-trip.
pub async fn next_write_id<C: ConnectionTrait>(db: &C, shape: &WriteShape) -> Result<i32> {
    let mut query = Query::select();
    query
        .expr_as(Expr::col(WriteCol::Id).max(), Alias::new("max_id"))
        .from(shape.table());
    let row = db
        .query_one(db.get_database_backend().build(&query))
        .await?;
    let max: Option<i32> = match row {
        Some(row) => row.try_get("", "max_id")?,
        None => None,
    };
    Ok(max.unwrap_or(0) + 1)
}

/// Raw column values for one insert. Kept together so creation and
/// relocation build rows through the same funnel.
pub(crate) struct RowValues {
    pub id: i32,
    pub num: i32,
    pub reply: String,
    pub parent: i32,
    pub is_comment: i32,
    pub comment: i32,
    pub comment_reply: String,
    pub category: String,
    pub options: String,
    pub subject: String,
    pub content: String,
    pub link1: String,
    pub link2: String,
    pub link1_hit: i32,
    pub link2_hit: i32,
    pub hit: i32,
    pub good: i32,
    pub nogood: i32,
    pub member_id: String,
    pub password: String,
    pub name: String,
    pub file_count: i32,
    pub created_at: chrono::NaiveDateTime,
    pub last_at: chrono::NaiveDateTime,
}

pub(crate) async fn insert_row<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    row: RowValues,
) -> Result<()> {
    let mut stmt = Query::insert();
    stmt.into_table(shape.table())
        .columns(ALL_COLS)
        .values_panic([
            row.id.into(),
            row.num.into(),
            row.reply.into(),
            row.parent.into(),
            row.is_comment.into(),
            row.comment.into(),
            row.comment_reply.into(),
            row.category.into(),
            row.options.into(),
            row.subject.into(),
            row.content.into(),
            row.link1.into(),
            row.link2.into(),
            row.link1_hit.into(),
            row.link2_hit.into(),
            row.hit.into(),
            row.good.into(),
            row.nogood.into(),
            row.member_id.into(),
            row.password.into(),
            row.name.into(),
            row.file_count.into(),
            row.created_at.into(),
            row.last_at.into(),
        ]);
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}

/// Creates a root post or a reply post.
///
/// Sequencing per row: identity allocation, thread/reply encoding, content
/// insert, new-post index entry, then the point award, admin notification
/// and cache invalidation after commit. The new row is self-parented
/// (`parent == id`).
pub async fn create_post(
    db: &DatabaseConnection,
    config: &Config,
    shape: &WriteShape,
    cache: &FragmentCache,
    board: &crate::orm::boards::Model,
    mailer: Option<&dyn Mailer>,
    reply_to: Option<&WriteRow>,
    new: NewWrite,
) -> Result<WriteRow> {
    let txn = db.begin().await?;
    let now = Utc::now().naive_utc();

    let id = next_write_id(&txn, shape).await?;
    let (num, reply) = match reply_to {
        Some(parent) => (
            parent.num,
            thread::next_reply_code(&txn, shape, parent).await?,
        ),
        None => (thread::next_thread_num(&txn, shape).await?, String::new()),
    };

    insert_row(
        &txn,
        shape,
        RowValues {
            id,
            num,
            reply: reply.clone(),
            parent: id,
            is_comment: 0,
            comment: 0,
            comment_reply: String::new(),
            category: new.category.clone(),
            options: new.options.to_string(),
            subject: new.subject.clone(),
            content: new.content.clone(),
            link1: new.link1.clone(),
            link2: new.link2.clone(),
            link1_hit: 0,
            link2_hit: 0,
            hit: 0,
            good: 0,
            nogood: 0,
            member_id: new.member_id.clone(),
            password: new.password.clone(),
            name: new.name.clone(),
            file_count: 0,
            created_at: now,
            last_at: now,
        },
    )
    .await?;

    insert_board_new(&txn, shape.board_id(), id, id, &new.member_id).await?;
    txn.commit().await?;

    award_points(db, config, board, &new.member_id, id, "write", board.write_point).await?;
    cache.invalidate_prefix(shape.board_id());

    let row = WriteRow {
        id,
        num,
        reply,
        parent: id,
        is_comment: 0,
        comment: 0,
        comment_reply: String::new(),
        category: new.category,
        options: new.options.to_string(),
        subject: new.subject,
        content: new.content,
        link1: new.link1,
        link2: new.link2,
        link1_hit: 0,
        link2_hit: 0,
        hit: 0,
        good: 0,
        nogood: 0,
        member_id: new.member_id,
        password: new.password,
        name: new.name,
        file_count: 0,
        created_at: now,
        last_at: now,
    };
    if let Some(mailer) = mailer {
        mail::notify_write(mailer, config.admin_email.as_deref(), board, &row);
    }
    Ok(row)
}

/// Creates a comment under `root`, optionally nested under another comment.
/// Bumps the root post's comment count in the same transaction.
pub async fn create_comment(
    db: &DatabaseConnection,
    config: &Config,
    shape: &WriteShape,
    cache: &FragmentCache,
    board: &crate::orm::boards::Model,
    mailer: Option<&dyn Mailer>,
    root: &WriteRow,
    reply_to: Option<&WriteRow>,
    new: NewWrite,
) -> Result<WriteRow> {
    let txn = db.begin().await?;
    let now = Utc::now().naive_utc();

    let id = next_write_id(&txn, shape).await?;
    let (ordinal, comment_reply) = thread::next_comment_code(&txn, shape, root, reply_to).await?;

    insert_row(
        &txn,
        shape,
        RowValues {
            id,
            num: root.num,
            reply: String::new(),
            parent: root.id,
            is_comment: 1,
            comment: ordinal,
            comment_reply: comment_reply.clone(),
            category: String::new(),
            options: new.options.to_string(),
            subject: String::new(),
            content: new.content.clone(),
            link1: String::new(),
            link2: String::new(),
            link1_hit: 0,
            link2_hit: 0,
            hit: 0,
            good: 0,
            nogood: 0,
            member_id: new.member_id.clone(),
            password: new.password.clone(),
            name: new.name.clone(),
            file_count: 0,
            created_at: now,
            last_at: now,
        },
    )
    .await?;

    let mut bump = Query::update();
    bump.table(shape.table())
        .value(WriteCol::Comment, Expr::col(WriteCol::Comment).add(1))
        .value(WriteCol::LastAt, now)
        .and_where(Expr::col(WriteCol::Id).eq(root.id));
    txn.execute(txn.get_database_backend().build(&bump)).await?;

    insert_board_new(&txn, shape.board_id(), id, root.id, &new.member_id).await?;
    txn.commit().await?;

    award_points(db, config, board, &new.member_id, id, "comment", board.comment_point).await?;
    cache.invalidate_prefix(shape.board_id());

    let row = WriteRow {
        id,
        num: root.num,
        reply: String::new(),
        parent: root.id,
        is_comment: 1,
        comment: ordinal,
        comment_reply,
        category: String::new(),
        options: new.options.to_string(),
        subject: String::new(),
        content: new.content,
        link1: String::new(),
        link2: String::new(),
        link1_hit: 0,
        link2_hit: 0,
        hit: 0,
        good: 0,
        nogood: 0,
        member_id: new.member_id,
        password: new.password,
        name: new.name,
        file_count: 0,
        created_at: now,
        last_at: now,
    };
    if let Some(mailer) = mailer {
        mail::notify_write(mailer, config.admin_email.as_deref(), board, &row);
    }
    Ok(row)
}

/// Edits subject/content/options in place. Refused once the post has
/// gathered `count_modify` comments (board policy).
pub async fn update_content(
    db: &DatabaseConnection,
    shape: &WriteShape,
    cache: &FragmentCache,
    board: &crate::orm::boards::Model,
    id: i32,
    subject: &str,
    content: &str,
    options: WriteOptions,
) -> Result<()> {
    let row = get_write(db, shape, id).await?;
    if !row.is_comment_row() && board.count_modify > 0 && row.comment >= board.count_modify {
        return Err(DeniedReason::CommentLocked {
            comments: row.comment,
        }
        .into());
    }

    let mut stmt = Query::update();
    stmt.table(shape.table())
        .value(WriteCol::Subject, subject)
        .value(WriteCol::Content, content)
        .value(WriteCol::Options, options.to_string())
        .value(WriteCol::LastAt, Utc::now().naive_utc())
        .and_where(Expr::col(WriteCol::Id).eq(id));
    db.execute(db.get_database_backend().build(&stmt)).await?;

    cache.invalidate_prefix(shape.board_id());
    Ok(())
}

/// Deletes a post together with its comments (or a single comment), drops
/// the new-post index rows, reverses the economic side effects, removes the
/// attachment sets, and invalidates the board's fragments.
pub async fn delete_write(
    db: &DatabaseConnection,
    config: &Config,
    shape: &WriteShape,
    cache: &FragmentCache,
    files: &dyn FileStore,
    board: &crate::orm::boards::Model,
    id: i32,
) -> Result<()> {
    let row = get_write(db, shape, id).await?;
    if !row.is_comment_row() && board.count_delete > 0 && row.comment >= board.count_delete {
        return Err(DeniedReason::CommentLocked {
            comments: row.comment,
        }
        .into());
    }

    let mut doomed = vec![row.clone()];
    if !row.is_comment_row() {
        doomed.extend(comment_rows(db, shape, row.id).await?);
    }

    let txn = db.begin().await?;
    let ids: Vec<i32> = doomed.iter().map(|w| w.id).collect();

    let mut stmt = Query::delete();
    stmt.from_table(shape.table())
        .and_where(Expr::col(WriteCol::Id).is_in(ids.clone()));
    txn.execute(txn.get_database_backend().build(&stmt)).await?;

    if row.is_comment_row() {
        // Keep the parent post's comment count honest.
        let mut bump = Query::update();
        bump.table(shape.table())
            .value(WriteCol::Comment, Expr::col(WriteCol::Comment).sub(1))
            .and_where(Expr::col(WriteCol::Id).eq(row.parent));
        txn.execute(txn.get_database_backend().build(&bump)).await?;
    }

    board_new::Entity::delete_many()
        .filter(board_new::Column::BoardId.eq(shape.board_id()))
        .filter(board_new::Column::WriteId.is_in(ids))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    // Give back (or claw back) the points earned by the deleted rows.
    for doomed_row in &doomed {
        if doomed_row.is_anonymous() {
            continue;
        }
        let action = if doomed_row.is_comment_row() {
            "comment"
        } else {
            "write"
        };
        point::reverse(
            db,
            config,
            &doomed_row.member_id,
            &point::RelKey::board(shape.board_id(), doomed_row.id, action),
        )
        .await?;
    }

    // Attachment removal runs after the commit, like relocation's file
    // step. A failure is logged rather than reported: the rows are gone
    // and the orphaned set can be removed out of band.
    for doomed_row in &doomed {
        if let Err(e) = files.delete(shape.board_id(), doomed_row.id) {
            log::warn!(
                "delete_write: attachments for {}/{}: {}",
                shape.board_id(),
                doomed_row.id,
                e
            );
        }
    }

    cache.invalidate_prefix(shape.board_id());
    Ok(())
}

/// Awards the board's write/comment points, keyed so a later deletion can
/// reverse exactly this entry. Anonymous authors earn nothing.
async fn award_points(
    db: &DatabaseConnection,
    config: &Config,
    board: &crate::orm::boards::Model,
    member_id: &str,
    write_id: i32,
    action: &str,
    delta: i64,
) -> Result<()> {
    if member_id.is_empty() || delta == 0 {
        return Ok(());
    }
    let content = format!("{} {} {}", board.subject, write_id, action);
    point::grant(
        db,
        config,
        member_id,
        delta,
        &content,
        Some(&point::RelKey::board(board.id.as_str(), write_id, action)),
        None,
    )
    .await?;
    Ok(())
}

/// Registers a write in the sitewide new-post index.
pub async fn insert_board_new<C: ConnectionTrait>(
    db: &C,
    board_id: &str,
    write_id: i32,
    parent_id: i32,
    member_id: &str,
) -> Result<()> {
    board_new::ActiveModel {
        board_id: Set(board_id.to_owned()),
        write_id: Set(write_id),
        parent_id: Set(parent_id),
        member_id: Set(member_id.to_owned()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Bumps the hit counter. Charged-once semantics live in
/// [`crate::access::enforce_read`]; this is the raw increment.
pub async fn increment_hit<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    id: i32,
) -> Result<()> {
    let mut stmt = Query::update();
    stmt.table(shape.table())
        .value(WriteCol::Hit, Expr::col(WriteCol::Hit).add(1))
        .and_where(Expr::col(WriteCol::Id).eq(id));
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}
