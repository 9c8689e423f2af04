//! Shared in-memory store harness for the integration tests.

use rubbs::config::Config;
use rubbs::orm::{board_good, board_new, boards, group_members, groups, members, points, scraps};
use sea_orm::{entity::*, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::PathBuf;

/// Fresh in-memory store with every fixed table created. One connection,
/// so the whole test sees the same memory database.
pub async fn memory_store() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1);
    let db = Database::connect(opt).await.expect("in-memory store");
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = [
        schema.create_table_from_entity(members::Entity),
        schema.create_table_from_entity(points::Entity),
        schema.create_table_from_entity(groups::Entity),
        schema.create_table_from_entity(group_members::Entity),
        schema.create_table_from_entity(boards::Entity),
        schema.create_table_from_entity(board_new::Entity),
        schema.create_table_from_entity(board_good::Entity),
        schema.create_table_from_entity(scraps::Entity),
    ];
    for stmt in &statements {
        db.execute(backend.build(stmt)).await.expect("create table");
    }
    db
}

pub fn config() -> Config {
    Config {
        admin_id: "root".to_owned(),
        admin_email: None,
        use_point: true,
        point_term: 0,
        use_copy_log: true,
        cache_dir: PathBuf::from("data/cache"),
    }
}

pub async fn seed_member(db: &DatabaseConnection, id: &str) {
    members::ActiveModel {
        id: Set(id.to_owned()),
        nick: Set(id.to_owned()),
        level: Set(2),
        point: Set(0),
    }
    .insert(db)
    .await
    .expect("seed member");
}

pub async fn seed_board(db: &DatabaseConnection, id: &str, write_point: i64) -> boards::Model {
    if groups::Entity::find_by_id("community")
        .one(db)
        .await
        .expect("group query")
        .is_none()
    {
        groups::ActiveModel {
            id: Set("community".to_owned()),
            subject: Set("Community".to_owned()),
            admin_id: Set(None),
            use_access: Set(false),
        }
        .insert(db)
        .await
        .expect("seed group");
    }
    boards::ActiveModel {
        id: Set(id.to_owned()),
        group_id: Set("community".to_owned()),
        subject: Set(format!("{} board", id)),
        skin: Set("basic".to_owned()),
        admin_id: Set(None),
        list_level: Set(1),
        read_level: Set(1),
        write_level: Set(1),
        reply_level: Set(1),
        comment_level: Set(1),
        download_level: Set(1),
        upload_level: Set(1),
        link_level: Set(1),
        read_point: Set(0),
        write_point: Set(write_point),
        comment_point: Set(0),
        download_point: Set(0),
        use_secret: Set(false),
        notice_ids: Set(String::new()),
        count_modify: Set(0),
        count_delete: Set(0),
    }
    .insert(db)
    .await
    .expect("seed board")
}

pub async fn member_total(db: &DatabaseConnection, id: &str) -> i64 {
    members::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("member query")
        .expect("member exists")
        .point
}

pub async fn ledger_entries(db: &DatabaseConnection, member_id: &str) -> Vec<points::Model> {
    use sea_orm::query::*;
    points::Entity::find()
        .filter(points::Column::MemberId.eq(member_id))
        .order_by_asc(points::Column::Id)
        .all(db)
        .await
        .expect("ledger query")
}
