//! Write notifications behind a trait. Delivery is the host's problem;
//! the engine only decides who gets told about a new post or comment.

use crate::error::Result;
use crate::orm::boards;
use crate::write::WriteRow;

pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Notifies the board and system administrators about a new write.
///
/// Delivery failures are logged and swallowed: a dead mail relay must never
/// fail the post that triggered it.
pub fn notify_write(
    mailer: &dyn Mailer,
    admin_email: Option<&str>,
    board: &boards::Model,
    row: &WriteRow,
) {
    let what = if row.is_comment_row() { "comment" } else { "post" };
    let subject = format!("[{}] new {}: {}", board.subject, what, row.subject);
    let body = format!("{} wrote on '{}':\n\n{}", row.name, board.subject, row.content);

    for to in admin_email.iter().filter(|to| !to.is_empty()) {
        if let Err(e) = mailer.send(to, &subject, &body) {
            log::warn!("notify_write: delivery to {} failed: {}", to, e);
        }
    }
}
