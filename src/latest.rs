//! Cached "latest posts" fragments for the front page.
//!
//! Rendering is delegated to a [`Renderer`] chosen by the host application;
//! this module owns loading the rows, shaping the template context and the
//! cache-aside dance around [`FragmentCache`].

use crate::cache::FragmentCache;
use crate::error::{Error, Result};
use crate::orm::boards;
use crate::schema::ShapeRegistry;
use crate::write::{self, WriteRow};
use sea_orm::{entity::*, DatabaseConnection};
use serde_json::json;

/// Turns a skin name and a JSON context into markup. Implementations decide
/// the template language; the engine only caches what comes back.
pub trait Renderer: Send + Sync {
    fn render(&self, skin: &str, context: &serde_json::Value) -> Result<String>;
}

/// Renders (or serves from cache) a board's latest posts.
///
/// The fragment key covers every render parameter, so boards rendered with
/// different skins or row counts never serve each other's markup. Fresh
/// renders are written back best-effort: a cache write failure is logged
/// and the markup is still returned.
pub async fn render_latest_posts(
    db: &DatabaseConnection,
    registry: &ShapeRegistry,
    cache: &FragmentCache,
    renderer: &dyn Renderer,
    board_id: &str,
    skin: &str,
    rows: u64,
    subject_len: usize,
) -> Result<String> {
    let key = cache.latest_key(board_id, skin, rows, subject_len);
    if let Some(html) = cache.get(&key) {
        return Ok(html);
    }

    let board = boards::Entity::find_by_id(board_id.to_owned())
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            kind: "board",
            id: board_id.to_owned(),
        })?;
    let shape = registry.get_or_create(db, board_id, false).await?;
    let posts = write::latest_rows(db, &shape, rows).await?;

    let context = latest_context(&board, &posts, subject_len);
    let html = renderer.render(skin, &context)?;
    if let Err(e) = cache.put(&key, &html) {
        log::warn!("render_latest_posts: cache write for {}: {}", key, e);
    }
    Ok(html)
}

fn latest_context(
    board: &boards::Model,
    posts: &[WriteRow],
    subject_len: usize,
) -> serde_json::Value {
    let posts: Vec<serde_json::Value> = posts
        .iter()
        .map(|row| {
            json!({
                "id": row.id,
                "subject": truncate_chars(&row.subject, subject_len),
                "name": row.name,
                "member_id": row.member_id,
                "hit": row.hit,
                "good": row.good,
                "comments": row.comment,
                "secret": row.is_secret(),
                "notice": board.is_notice(row.id),
                "created_at": row.created_at.format("%Y-%m-%d %H:%M").to_string(),
            })
        })
        .collect();
    json!({
        "board_id": board.id,
        "board_subject": board.subject,
        "posts": posts,
    })
}

/// Truncates on character boundaries and marks the cut with an ellipsis.
fn truncate_chars(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push('\u{2026}');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 0), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello\u{2026}");
        // Multibyte subjects must not split inside a character.
        assert_eq!(truncate_chars("안녕하세요 여러분", 5), "안녕하세요\u{2026}");
    }

    #[test]
    fn context_flags_notices_and_secrets() {
        let board = boards::Model {
            id: "free".to_owned(),
            group_id: "community".to_owned(),
            subject: "Free Board".to_owned(),
            skin: "basic".to_owned(),
            admin_id: None,
            list_level: 1,
            read_level: 1,
            write_level: 1,
            reply_level: 1,
            comment_level: 1,
            download_level: 1,
            upload_level: 1,
            link_level: 1,
            read_point: 0,
            write_point: 0,
            comment_point: 0,
            download_point: 0,
            use_secret: false,
            notice_ids: "10".to_owned(),
            count_modify: 0,
            count_delete: 0,
        };
        let row = crate::write::tests::sample_row();
        let context = latest_context(&board, std::slice::from_ref(&row), 40);

        let posts = context["posts"].as_array().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["id"], 10);
        assert_eq!(posts[0]["notice"], true);
        assert_eq!(posts[0]["secret"], true);
        assert_eq!(context["board_id"], "free");
    }
}
