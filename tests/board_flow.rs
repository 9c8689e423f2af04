//! Post lifecycle against a real (in-memory) store: creation side effects
//! and full cleanup on deletion.

mod common;

use common::{config, ledger_entries, member_total, memory_store, seed_board, seed_member};
use rubbs::cache::FragmentCache;
use rubbs::error::Result;
use rubbs::files::LocalFileStore;
use rubbs::mail::Mailer;
use rubbs::schema::ShapeRegistry;
use rubbs::write::{self, NewWrite, WriteOptions};
use std::fs;
use std::sync::Mutex;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl Mailer for RecordingMailer {
    fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_owned(), subject.to_owned()));
        Ok(())
    }
}

fn post_by(member_id: &str) -> NewWrite {
    NewWrite {
        subject: "hello".to_owned(),
        content: "world".to_owned(),
        member_id: member_id.to_owned(),
        name: member_id.to_owned(),
        password: String::new(),
        category: String::new(),
        options: WriteOptions::default(),
        link1: String::new(),
        link2: String::new(),
    }
}

#[tokio::test]
async fn deleting_a_post_removes_rows_points_and_attachments() {
    let db = memory_store().await;
    let config = config();
    let cache_dir = tempfile::tempdir().unwrap();
    let files_dir = tempfile::tempdir().unwrap();
    let cache = FragmentCache::new(cache_dir.path()).unwrap();
    let files = LocalFileStore::new(files_dir.path()).unwrap();
    let registry = ShapeRegistry::new();

    seed_member(&db, "alice").await;
    let board = seed_board(&db, "free", 5).await;
    let shape = registry.get_or_create(&db, "free", true).await.unwrap();

    let post = write::create_post(
        &db,
        &config,
        &shape,
        &cache,
        &board,
        None,
        None,
        post_by("alice"),
    )
    .await
    .unwrap();

    // The write was rewarded, and an attachment set exists.
    assert_eq!(member_total(&db, "alice").await, 5);
    let attachments = files_dir.path().join("free").join(post.id.to_string());
    fs::create_dir_all(&attachments).unwrap();
    fs::write(attachments.join("a.jpg"), "jpeg").unwrap();

    write::delete_write(&db, &config, &shape, &cache, &files, &board, post.id)
        .await
        .unwrap();

    // Row, reward, and files are all gone.
    assert!(write::find_write(&db, &shape, post.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(member_total(&db, "alice").await, 0);
    assert!(ledger_entries(&db, "alice").await.is_empty());
    assert!(!attachments.exists());
}

#[tokio::test]
async fn new_posts_notify_the_admin_address() {
    let db = memory_store().await;
    let mut config = config();
    config.admin_email = Some("admin@example.com".to_owned());
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = FragmentCache::new(cache_dir.path()).unwrap();
    let registry = ShapeRegistry::new();
    let mailer = RecordingMailer::default();

    let board = seed_board(&db, "free", 0).await;
    let shape = registry.get_or_create(&db, "free", true).await.unwrap();

    write::create_post(
        &db,
        &config,
        &shape,
        &cache,
        &board,
        Some(&mailer),
        None,
        post_by(""),
    )
    .await
    .unwrap();

    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "admin@example.com");
    assert!(sent[0].1.contains("new post"));
}
