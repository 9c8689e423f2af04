//! Authority, level and visibility resolution.
//!
//! Authority is layered: the system administrator outranks a group
//! administrator, who outranks a board administrator. Any authority tier
//! bypasses the per-action level gates. Secret posts additionally require
//! ownership, a thread-root ownership exception, or a session grant earned
//! through the external password check.

use crate::config::Config;
use crate::error::{DeniedReason, Result};
use crate::orm::{boards, group_members, groups, members};
use crate::point::{self, GrantOutcome, RelKey};
use crate::schema::WriteShape;
use crate::session::{self, SessionBag};
use crate::write::{self, WriteRow};
use sea_orm::{entity::*, query::*, DatabaseConnection};
use std::fmt;

/// Level a viewer has before logging in.
pub const ANONYMOUS_LEVEL: i32 = 1;

/// Board actions gated by a minimum member level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    List,
    Read,
    Write,
    Reply,
    Comment,
    Download,
    Upload,
    Link,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Read => "read",
            Self::Write => "write",
            Self::Reply => "reply",
            Self::Comment => "comment",
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved administrative tier. `None` (the absence of a tier) means an
/// ordinary member subject to level checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Super,
    Group,
    Board,
}

/// Resolves the viewer's authority over a board, most specific last.
pub fn authority(
    config: &Config,
    member_id: Option<&str>,
    group: Option<&groups::Model>,
    board: Option<&boards::Model>,
) -> Option<Authority> {
    let member_id = member_id.filter(|id| !id.is_empty())?;

    if config.admin_id == member_id {
        Some(Authority::Super)
    } else if group.and_then(|g| g.admin_id.as_deref()) == Some(member_id) {
        Some(Authority::Group)
    } else if board.and_then(|b| b.admin_id.as_deref()) == Some(member_id) {
        Some(Authority::Board)
    } else {
        None
    }
}

/// The board's configured minimum level for an action.
pub fn required_level(board: &boards::Model, action: Action) -> i32 {
    match action {
        Action::List => board.list_level,
        Action::Read => board.read_level,
        Action::Write => board.write_level,
        Action::Reply => board.reply_level,
        Action::Comment => board.comment_level,
        Action::Download => board.download_level,
        Action::Upload => board.upload_level,
        Action::Link => board.link_level,
    }
}

/// Level gate for one action. Any authority tier passes outright.
pub fn can(
    config: &Config,
    member: Option<&members::Model>,
    group: Option<&groups::Model>,
    board: &boards::Model,
    action: Action,
) -> Result<(), DeniedReason> {
    if authority(config, member.map(|m| m.id.as_str()), group, Some(board)).is_some() {
        return Ok(());
    }

    let actual = member.map(|m| m.level).unwrap_or(ANONYMOUS_LEVEL);
    let required = required_level(board, action);
    if actual >= required {
        Ok(())
    } else {
        Err(DeniedReason::InsufficientLevel {
            action,
            required,
            actual,
        })
    }
}

/// Denies all reads on access-restricted groups unless the viewer is a
/// recorded group member (or carries super/group authority).
pub async fn check_group_access(
    db: &DatabaseConnection,
    config: &Config,
    member: Option<&members::Model>,
    group: &groups::Model,
) -> Result<()> {
    if !group.use_access {
        return Ok(());
    }

    let member = member.ok_or_else(|| DeniedReason::GroupMembershipRequired {
        group_id: group.id.clone(),
    })?;

    match authority(config, Some(&member.id), Some(group), None) {
        Some(Authority::Super) | Some(Authority::Group) => return Ok(()),
        _ => {}
    }

    let enrolled = group_members::Entity::find()
        .filter(group_members::Column::GroupId.eq(group.id.as_str()))
        .filter(group_members::Column::MemberId.eq(member.id.as_str()))
        .one(db)
        .await?
        .is_some();
    if enrolled {
        Ok(())
    } else {
        Err(DeniedReason::GroupMembershipRequired {
            group_id: group.id.clone(),
        }
        .into())
    }
}

/// Whether the viewer may see a secret row's body.
///
/// Admitted: any authority tier, the author, a viewer holding the session
/// grant for this exact row, and (for replies) the author of the thread
/// root.
pub fn secret_visibility(
    config: &Config,
    member: Option<&members::Model>,
    group: Option<&groups::Model>,
    board: &boards::Model,
    row: &WriteRow,
    thread_root_author: Option<&str>,
    session: &dyn SessionBag,
) -> Result<(), DeniedReason> {
    if !row.is_secret() {
        return Ok(());
    }

    let viewer = member.map(|m| m.id.as_str());
    if authority(config, viewer, group, Some(board)).is_some() {
        return Ok(());
    }
    if let Some(viewer) = viewer {
        if !row.member_id.is_empty() && row.member_id == viewer {
            return Ok(());
        }
        if thread_root_author.filter(|a| !a.is_empty()) == Some(viewer) {
            return Ok(());
        }
    }
    if session.has_flag(&session::secret_key(&board.id, row.id)) {
        return Ok(());
    }

    Err(DeniedReason::SecretLocked {
        board_id: board.id.clone(),
        write_id: row.id,
    })
}

/// Records a successful password or ownership check for one row. The grant
/// lives only as long as the session.
pub fn grant_secret_access(session: &dyn SessionBag, board_id: &str, write_id: i32) {
    session.set_flag(&session::secret_key(board_id, write_id));
}

/// Charges the read cost and counts the hit, at most once per session and
/// row. The author of a row is never charged for reading it.
pub async fn charge_read(
    db: &DatabaseConnection,
    config: &Config,
    session: &dyn SessionBag,
    member: Option<&members::Model>,
    board: &boards::Model,
    shape: &WriteShape,
    row: &WriteRow,
) -> Result<()> {
    let viewer = member.map(|m| m.id.as_str()).unwrap_or("");
    if !row.member_id.is_empty() && row.member_id == viewer {
        return Ok(());
    }

    let key = session::view_key(&board.id, row.id);
    if session.has_flag(&key) {
        return Ok(());
    }

    charge_action(db, config, member, board.read_point, board, row, "read").await?;
    write::increment_hit(db, shape, row.id).await?;
    session.set_flag(&key);
    Ok(())
}

/// Charges the download cost, at most once per session and row.
pub async fn charge_download(
    db: &DatabaseConnection,
    config: &Config,
    session: &dyn SessionBag,
    member: Option<&members::Model>,
    board: &boards::Model,
    row: &WriteRow,
) -> Result<()> {
    let viewer = member.map(|m| m.id.as_str()).unwrap_or("");
    if !row.member_id.is_empty() && row.member_id == viewer {
        return Ok(());
    }

    let key = session::download_key(&board.id, row.id);
    if session.has_flag(&key) {
        return Ok(());
    }

    charge_action(db, config, member, board.download_point, board, row, "download").await?;
    session.set_flag(&key);
    Ok(())
}

async fn charge_action(
    db: &DatabaseConnection,
    config: &Config,
    member: Option<&members::Model>,
    delta: i64,
    board: &boards::Model,
    row: &WriteRow,
    action: &str,
) -> Result<()> {
    if !config.use_point || delta == 0 {
        return Ok(());
    }

    if delta < 0 {
        let balance = member.map(|m| m.point).unwrap_or(0);
        if balance + delta < 0 {
            return Err(DeniedReason::InsufficientPoints {
                required: delta.abs(),
                balance,
            }
            .into());
        }
    }

    let member_id = member.map(|m| m.id.as_str()).unwrap_or("");
    let content = format!("{} {} {}", board.subject, row.id, action);
    let outcome = point::grant(
        db,
        config,
        member_id,
        delta,
        &content,
        Some(&RelKey::board(&board.id, row.id, action)),
        None,
    )
    .await?;
    if let GrantOutcome::AlreadyGranted = outcome {
        log::debug!("charge_action: {} already charged for {}", action, row.id);
    }
    Ok(())
}

/// The composed read gate: group restriction, level, secrecy, then the
/// charge-at-most-once bookkeeping.
pub async fn enforce_read(
    db: &DatabaseConnection,
    config: &Config,
    session: &dyn SessionBag,
    member: Option<&members::Model>,
    group: &groups::Model,
    board: &boards::Model,
    shape: &WriteShape,
    row: &WriteRow,
    thread_root_author: Option<&str>,
) -> Result<()> {
    check_group_access(db, config, member, group).await?;
    can(config, member, Some(group), board, Action::Read)?;
    secret_visibility(config, member, Some(group), board, row, thread_root_author, session)?;
    charge_read(db, config, session, member, board, shape, row).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;

    fn config() -> Config {
        Config {
            admin_id: "root".to_owned(),
            admin_email: None,
            use_point: true,
            point_term: 0,
            use_copy_log: true,
            cache_dir: "data/cache".into(),
        }
    }

    fn board(admin: Option<&str>) -> boards::Model {
        boards::Model {
            id: "free".to_owned(),
            group_id: "community".to_owned(),
            subject: "Free Board".to_owned(),
            skin: "basic".to_owned(),
            admin_id: admin.map(str::to_owned),
            list_level: 1,
            read_level: 1,
            write_level: 2,
            reply_level: 1,
            comment_level: 1,
            download_level: 1,
            upload_level: 1,
            link_level: 1,
            read_point: -1,
            write_point: 5,
            comment_point: 1,
            download_point: -20,
            use_secret: false,
            notice_ids: String::new(),
            count_modify: 0,
            count_delete: 0,
        }
    }

    fn group(admin: Option<&str>) -> groups::Model {
        groups::Model {
            id: "community".to_owned(),
            subject: "Community".to_owned(),
            admin_id: admin.map(str::to_owned),
            use_access: false,
        }
    }

    fn member(id: &str, level: i32) -> members::Model {
        members::Model {
            id: id.to_owned(),
            nick: id.to_owned(),
            level,
            point: 0,
        }
    }

    #[test]
    fn authority_tiers_resolve_in_order() {
        let config = config();
        let group = group(Some("gadmin"));
        let board = board(Some("badmin"));

        assert_eq!(
            authority(&config, Some("root"), Some(&group), Some(&board)),
            Some(Authority::Super)
        );
        assert_eq!(
            authority(&config, Some("gadmin"), Some(&group), Some(&board)),
            Some(Authority::Group)
        );
        assert_eq!(
            authority(&config, Some("badmin"), Some(&group), Some(&board)),
            Some(Authority::Board)
        );
        assert_eq!(
            authority(&config, Some("alice"), Some(&group), Some(&board)),
            None
        );
        assert_eq!(authority(&config, None, Some(&group), Some(&board)), None);
        assert_eq!(authority(&config, Some(""), Some(&group), Some(&board)), None);
    }

    #[test]
    fn level_gate_blocks_low_levels() {
        // Board "free" requires level 2 to write; a level-1 poster is out.
        let config = config();
        let board = board(None);
        let poster = member("alice", 1);

        let denied = can(&config, Some(&poster), None, &board, Action::Write).unwrap_err();
        assert_eq!(
            denied,
            DeniedReason::InsufficientLevel {
                action: Action::Write,
                required: 2,
                actual: 1
            }
        );

        // Anonymous viewers sit at level 1 and fail the same gate.
        assert!(can(&config, None, None, &board, Action::Write).is_err());
        assert!(can(&config, None, None, &board, Action::Read).is_ok());
    }

    #[test]
    fn authority_bypasses_level_gate() {
        let config = config();
        let board = board(Some("badmin"));
        let admin = member("badmin", 1);
        assert!(can(&config, Some(&admin), None, &board, Action::Write).is_ok());
    }

    #[test]
    fn secret_posts_hide_until_granted() {
        let config = config();
        let board = board(None);
        let group = group(None);
        let session = MemorySession::new();
        let row = crate::write::tests::sample_row();
        assert!(row.is_secret());

        // Anonymous viewer, no grant: locked.
        let denied = secret_visibility(&config, None, Some(&group), &board, &row, None, &session)
            .unwrap_err();
        assert!(matches!(denied, DeniedReason::SecretLocked { write_id: 10, .. }));

        // Visible immediately after the session grant for this exact post.
        grant_secret_access(&session, &board.id, row.id);
        assert!(
            secret_visibility(&config, None, Some(&group), &board, &row, None, &session).is_ok()
        );

        // The grant does not leak onto other posts.
        let mut other = crate::write::tests::sample_row();
        other.id = 11;
        assert!(
            secret_visibility(&config, None, Some(&group), &board, &other, None, &session)
                .is_err()
        );
    }

    #[test]
    fn thread_root_author_sees_secret_replies() {
        let config = config();
        let board = board(None);
        let session = MemorySession::new();
        let viewer = member("alice", 1);

        let mut reply = crate::write::tests::sample_row();
        reply.member_id = "bob".to_owned();
        reply.reply = "0".to_owned();

        assert!(secret_visibility(
            &config,
            Some(&viewer),
            None,
            &board,
            &reply,
            Some("alice"),
            &session
        )
        .is_ok());
        assert!(secret_visibility(
            &config,
            Some(&viewer),
            None,
            &board,
            &reply,
            Some("carol"),
            &session
        )
        .is_err());
    }

    #[test]
    fn authors_always_see_their_own_secrets() {
        let config = config();
        let board = board(None);
        let session = MemorySession::new();
        let viewer = member("bob", 1);
        let mut row = crate::write::tests::sample_row();
        row.member_id = "bob".to_owned();
        assert!(
            secret_visibility(&config, Some(&viewer), None, &board, &row, None, &session).is_ok()
        );
    }
}
