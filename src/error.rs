use crate::access::Action;
use thiserror::Error;

/// Engine-wide error taxonomy.
///
/// Validation and permission failures are meant to be recovered at the
/// request boundary and turned into user-facing messages; `Store` and `Io`
/// propagate up and are logged with enough context to reproduce.
#[derive(Debug, Error)]
pub enum Error {
    /// Board, post or member absent. Surfaced as a user message, never silent.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(#[from] DeniedReason),

    /// Reply-code alphabet overflow under one parent. Fatal to the single
    /// write that requested it.
    #[error("no reply slots left under this parent (36 per level)")]
    CapacityExceeded,

    #[error("store unavailable: {0}")]
    Store(#[from] sea_orm::DbErr),

    #[error("filesystem failure: {0}")]
    Io(#[from] std::io::Error),

    /// A subset of a bulk move/copy failed. Carries the per-item failures so
    /// the caller can retry file relocation, which is idempotent.
    #[error("relocation finished with {} failure(s)", .0.len())]
    PartialRelocation(Vec<crate::relocate::RelocationFailure>),
}

/// The specific reason a viewer was turned away. Carries rendering context
/// but never the password itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeniedReason {
    #[error("level {required} required to {action}, member has level {actual}")]
    InsufficientLevel {
        action: Action,
        required: i32,
        actual: i32,
    },

    #[error("{required} point(s) required, member holds {balance}")]
    InsufficientPoints { required: i64, balance: i64 },

    #[error("group '{group_id}' requires explicit membership")]
    GroupMembershipRequired { group_id: String },

    #[error("post {write_id} on board '{board_id}' is secret")]
    SecretLocked { board_id: String, write_id: i32 },

    #[error("post already has {comments} comment(s) and can no longer be changed")]
    CommentLocked { comments: i32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
