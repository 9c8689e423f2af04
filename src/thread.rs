//! Ordering identities for posts and comments.
//!
//! A thread is the set of rows sharing one `num`. Reply order within the
//! thread is a sortable base-36 code whose length encodes nesting depth:
//! sorting `(num DESC, reply ASC)` lists threads newest-first with replies
//! in depth-first order, with no recursive queries. Nested comments reuse
//! the same counter through `comment_reply`.

use crate::counter;
use crate::error::Result;
use crate::schema::{WriteCol, WriteShape};
use crate::write::WriteRow;
use sea_orm::sea_query::{Alias, Expr, Func, Query};
use sea_orm::ConnectionTrait;

/// Nested comments stop at this code length, as deep chains stop rendering
/// legibly long before the alphabet runs out.
const COMMENT_DEPTH_LIMIT: usize = 5;

/// Allocates the next thread number for a board: a board-scoped,
/// monotonically increasing integer independent of reply codes.
pub async fn next_thread_num<C: ConnectionTrait>(db: &C, shape: &WriteShape) -> Result<i32> {
    let mut query = Query::select();
    query
        .expr_as(Expr::col(WriteCol::Num).max(), Alias::new("max_num"))
        .from(shape.table())
        .and_where(Expr::col(WriteCol::IsComment).eq(0));
    let row = db
        .query_one(db.get_database_backend().build(&query))
        .await?;
    let max: Option<i32> = match row {
        Some(row) => row.try_get("", "max_num")?,
        None => None,
    };
    Ok(max.unwrap_or(0) + 1)
}

/// Produces the reply code for a new reply under `parent`.
///
/// Reads the greatest sibling code one character longer than the parent's
/// within the same thread and asks the shared counter for the next one.
/// The 37th sibling at one level fails with `CapacityExceeded`.
pub async fn next_reply_code<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    parent: &WriteRow,
) -> Result<String> {
    let mut query = Query::select();
    query
        .expr_as(Expr::col(WriteCol::Reply).max(), Alias::new("last_code"))
        .from(shape.table())
        .and_where(Expr::col(WriteCol::Num).eq(parent.num))
        .and_where(Expr::col(WriteCol::IsComment).eq(0))
        .and_where(
            Expr::expr(Func::char_length(Expr::col(WriteCol::Reply)))
                .eq((parent.reply.len() + 1) as i32),
        );
    if !parent.reply.is_empty() {
        query.and_where(Expr::col(WriteCol::Reply).like(format!("{}%", parent.reply)));
    }

    let row = db
        .query_one(db.get_database_backend().build(&query))
        .await?;
    let last: Option<String> = match row {
        Some(row) => row.try_get("", "last_code")?,
        None => None,
    };

    Ok(counter::child_code(&parent.reply, last.as_deref())?)
}

/// Ordering identity for a new comment under `root`: the comment ordinal
/// plus, for nested comments, a code under the parent comment's code.
pub async fn next_comment_code<C: ConnectionTrait>(
    db: &C,
    shape: &WriteShape,
    root: &WriteRow,
    reply_to: Option<&WriteRow>,
) -> Result<(i32, String)> {
    match reply_to {
        None => {
            let mut query = Query::select();
            query
                .expr_as(Expr::col(WriteCol::Comment).max(), Alias::new("max_ord"))
                .from(shape.table())
                .and_where(Expr::col(WriteCol::Parent).eq(root.id))
                .and_where(Expr::col(WriteCol::IsComment).eq(1));
            let row = db
                .query_one(db.get_database_backend().build(&query))
                .await?;
            let max: Option<i32> = match row {
                Some(row) => row.try_get("", "max_ord")?,
                None => None,
            };
            Ok((max.unwrap_or(0) + 1, String::new()))
        }
        Some(parent) => {
            if parent.comment_reply.len() >= COMMENT_DEPTH_LIMIT {
                return Err(crate::error::Error::CapacityExceeded);
            }

            let mut query = Query::select();
            query
                .expr_as(
                    Expr::col(WriteCol::CommentReply).max(),
                    Alias::new("last_code"),
                )
                .from(shape.table())
                .and_where(Expr::col(WriteCol::Parent).eq(root.id))
                .and_where(Expr::col(WriteCol::IsComment).eq(1))
                .and_where(Expr::col(WriteCol::Comment).eq(parent.comment))
                .and_where(
                    Expr::expr(Func::char_length(Expr::col(WriteCol::CommentReply)))
                        .eq((parent.comment_reply.len() + 1) as i32),
                );
            if !parent.comment_reply.is_empty() {
                query.and_where(
                    Expr::col(WriteCol::CommentReply)
                        .like(format!("{}%", parent.comment_reply)),
                );
            }

            let row = db
                .query_one(db.get_database_backend().build(&query))
                .await?;
            let last: Option<String> = match row {
                Some(row) => row.try_get("", "last_code")?,
                None => None,
            };

            Ok((
                parent.comment,
                counter::child_code(&parent.comment_reply, last.as_deref())?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::counter::child_code;

    // The DB round-trips above reduce to child_code over the greatest
    // sibling; the ordering laws are checked here on the pure core.

    #[test]
    fn reply_depth_first_order_is_string_order() {
        // Simulated thread: root "", replies built level by level.
        let a = child_code("", None).unwrap(); // "0"
        let b = child_code("", Some(&a)).unwrap(); // "1"
        let aa = child_code(&a, None).unwrap(); // "00"
        let ab = child_code(&a, Some(&aa)).unwrap(); // "01"
        let aba = child_code(&ab, None).unwrap(); // "010"

        let mut codes = vec![
            b.clone(),
            aba.clone(),
            a.clone(),
            ab.clone(),
            aa.clone(),
            String::new(),
        ];
        codes.sort();
        assert_eq!(codes, vec![String::new(), a, aa, ab, aba, b]);
    }

    #[test]
    fn code_length_tracks_depth() {
        let mut parent = String::new();
        for depth in 1..=6 {
            parent = child_code(&parent, None).unwrap();
            assert_eq!(parent.len(), depth);
        }
    }
}
