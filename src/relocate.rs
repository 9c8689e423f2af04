//! Bulk move/copy of posts across boards.
//!
//! Each (destination, post) pair is one transactional unit: identity
//! allocation in the destination shape, the column copy, dependent-row
//! migration and the origin delete commit or roll back together. File
//! relocation runs after the commit and is idempotent, so a failure there
//! surfaces as a retryable entry in the report instead of undoing the row.

use crate::cache::FragmentCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::files::FileStore;
use crate::orm::{board_good, board_new, boards, scraps};
use crate::schema::ShapeRegistry;
use crate::thread;
use crate::write::{self, RowValues, WriteRow};
use chrono::Utc;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateMode {
    Move,
    Copy,
}

impl RelocateMode {
    fn verb(&self) -> &'static str {
        match self {
            Self::Move => "moved",
            Self::Copy => "copied",
        }
    }
}

/// One successfully relocated row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RelocatedRow {
    pub destination: String,
    pub old_id: i32,
    pub new_id: i32,
}

/// A (destination, post) unit that did not finish. `retryable` marks file
/// relocation failures whose row changes already committed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RelocationFailure {
    pub destination: String,
    pub write_id: i32,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct RelocationReport {
    pub relocated: Vec<RelocatedRow>,
    pub failures: Vec<RelocationFailure>,
}

impl RelocationReport {
    /// Collapses the report into an error when any unit failed.
    pub fn require_complete(self) -> Result<Vec<RelocatedRow>> {
        if self.failures.is_empty() {
            Ok(self.relocated)
        } else {
            Err(Error::PartialRelocation(self.failures))
        }
    }
}

/// Moves or copies the selected posts from `origin_board_id` into each of
/// `destinations`.
///
/// A move with several destinations lands the dependent rows and files on
/// the first destination; later destinations receive plain copies, because
/// the migration and the file relocation are idempotent no-ops once the
/// origin side is gone. Cache prefixes for the origin and every destination
/// are invalidated exactly once, after all row mutations.
pub async fn relocate(
    db: &DatabaseConnection,
    config: &Config,
    registry: &ShapeRegistry,
    cache: &FragmentCache,
    files: &dyn FileStore,
    actor_nick: &str,
    origin_board_id: &str,
    write_ids: &[i32],
    destinations: &[String],
    mode: RelocateMode,
) -> Result<RelocationReport> {
    let origin_board = boards::Entity::find_by_id(origin_board_id.to_owned())
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            kind: "board",
            id: origin_board_id.to_owned(),
        })?;
    let origin_shape = registry.get_or_create(db, origin_board_id, false).await?;

    // Read the rows up front; a move deletes them as it goes.
    let mut rows = Vec::with_capacity(write_ids.len());
    for &id in write_ids {
        rows.push(write::get_write(db, &origin_shape, id).await?);
    }

    let mut report = RelocationReport::default();
    let mut touched: BTreeSet<String> = BTreeSet::new();

    for destination in destinations {
        let dest_shape = registry.get_or_create(db, destination, true).await?;
        for row in &rows {
            let unit = relocate_one(
                db,
                config,
                &origin_board,
                &origin_shape,
                destination,
                &dest_shape,
                actor_nick,
                row,
                mode,
            )
            .await;
            let new_id = match unit {
                Ok(new_id) => new_id,
                Err(e) => {
                    log::error!(
                        "relocate: {} of {}/{} to {}: {}",
                        mode.verb(),
                        origin_board_id,
                        row.id,
                        destination,
                        e
                    );
                    report.failures.push(RelocationFailure {
                        destination: destination.clone(),
                        write_id: row.id,
                        reason: e.to_string(),
                        retryable: false,
                    });
                    continue;
                }
            };
            touched.insert(destination.clone());

            let file_result = match mode {
                RelocateMode::Move => {
                    files.relocate(origin_board_id, row.id, destination, new_id)
                }
                RelocateMode::Copy => files.copy(origin_board_id, row.id, destination, new_id),
            };
            match file_result {
                Ok(()) => report.relocated.push(RelocatedRow {
                    destination: destination.clone(),
                    old_id: row.id,
                    new_id,
                }),
                Err(e) => {
                    log::error!(
                        "relocate: files for {}/{} -> {}/{}: {}",
                        origin_board_id,
                        row.id,
                        destination,
                        new_id,
                        e
                    );
                    report.failures.push(RelocationFailure {
                        destination: destination.clone(),
                        write_id: row.id,
                        reason: e.to_string(),
                        retryable: true,
                    });
                }
            }
        }
    }

    touched.insert(origin_board_id.to_owned());
    for board_id in &touched {
        cache.invalidate_prefix(board_id);
    }

    Ok(report)
}

/// The transactional unit for one (destination, post) pair. Returns the new
/// row id in the destination shape.
async fn relocate_one(
    db: &DatabaseConnection,
    config: &Config,
    origin_board: &boards::Model,
    origin_shape: &crate::schema::WriteShape,
    destination: &str,
    dest_shape: &crate::schema::WriteShape,
    actor_nick: &str,
    row: &WriteRow,
    mode: RelocateMode,
) -> Result<i32> {
    let txn = db.begin().await?;

    let new_id = write::next_write_id(&txn, dest_shape).await?;
    let num = thread::next_thread_num(&txn, dest_shape).await?;

    let content = if config.use_copy_log && !row.is_comment_row() {
        with_provenance_note(row, &origin_board.subject, actor_nick, mode)
    } else {
        row.content.clone()
    };
    let reset = mode == RelocateMode::Copy;

    write::insert_row(
        &txn,
        dest_shape,
        RowValues {
            id: new_id,
            num,
            reply: String::new(),
            parent: new_id,
            is_comment: row.is_comment,
            comment: row.comment,
            comment_reply: row.comment_reply.clone(),
            category: row.category.clone(),
            options: row.options.clone(),
            subject: row.subject.clone(),
            content,
            link1: row.link1.clone(),
            link2: row.link2.clone(),
            link1_hit: if reset { 0 } else { row.link1_hit },
            link2_hit: if reset { 0 } else { row.link2_hit },
            hit: if reset { 0 } else { row.hit },
            good: if reset { 0 } else { row.good },
            nogood: if reset { 0 } else { row.nogood },
            member_id: row.member_id.clone(),
            password: row.password.clone(),
            name: row.name.clone(),
            file_count: row.file_count,
            created_at: row.created_at,
            last_at: Utc::now().naive_utc(),
        },
    )
    .await?;

    if mode == RelocateMode::Move {
        migrate_dependents(&txn, &origin_board.id, row.id, destination, new_id).await?;
        delete_origin_row(&txn, origin_shape, row.id).await?;
    }

    txn.commit().await?;
    Ok(new_id)
}

/// Repoints new-post index, vote and bookmark rows at the destination.
/// Matches on the origin board and the old id.
async fn migrate_dependents<C: ConnectionTrait>(
    db: &C,
    origin_board_id: &str,
    old_id: i32,
    destination: &str,
    new_id: i32,
) -> Result<()> {
    board_new::Entity::update_many()
        .col_expr(board_new::Column::BoardId, Expr::value(destination))
        .col_expr(board_new::Column::WriteId, Expr::value(new_id))
        .col_expr(board_new::Column::ParentId, Expr::value(new_id))
        .filter(board_new::Column::BoardId.eq(origin_board_id))
        .filter(board_new::Column::WriteId.eq(old_id))
        .exec(db)
        .await?;

    board_good::Entity::update_many()
        .col_expr(board_good::Column::BoardId, Expr::value(destination))
        .col_expr(board_good::Column::WriteId, Expr::value(new_id))
        .filter(board_good::Column::BoardId.eq(origin_board_id))
        .filter(board_good::Column::WriteId.eq(old_id))
        .exec(db)
        .await?;

    scraps::Entity::update_many()
        .col_expr(scraps::Column::BoardId, Expr::value(destination))
        .col_expr(scraps::Column::WriteId, Expr::value(new_id))
        .filter(scraps::Column::BoardId.eq(origin_board_id))
        .filter(scraps::Column::WriteId.eq(old_id))
        .exec(db)
        .await?;

    Ok(())
}

async fn delete_origin_row<C: ConnectionTrait>(
    db: &C,
    shape: &crate::schema::WriteShape,
    id: i32,
) -> Result<()> {
    use crate::schema::WriteCol;
    let mut stmt = Query::delete();
    stmt.from_table(shape.table())
        .and_where(Expr::col(WriteCol::Id).eq(id));
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}

/// Appends the human-readable provenance note the original row carries into
/// its new home. HTML bodies get a block element, plain bodies a blank line.
fn with_provenance_note(
    row: &WriteRow,
    origin_subject: &str,
    actor_nick: &str,
    mode: RelocateMode,
) -> String {
    let stamp = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S");
    let note = format!(
        "[This post was {} from {} by {} at {}]",
        mode.verb(),
        origin_subject,
        actor_nick,
        stamp
    );
    if row.option_set().html {
        format!(
            "{}\n<div class=\"relocation_note\">{}</div>",
            row.content, note
        )
    } else {
        format!("{}\n\n{}", row.content, note)
    }
}
