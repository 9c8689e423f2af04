//! Session-scoped access grants.
//!
//! The engine never persists these: a flag lives exactly as long as the
//! caller's session does. The transport (cookie session, token store, ...)
//! implements [`SessionBag`]; [`MemorySession`] backs tests and CLI tools.

use std::collections::HashSet;
use std::sync::RwLock;

pub trait SessionBag: Send + Sync {
    fn has_flag(&self, key: &str) -> bool;
    fn set_flag(&self, key: &str);
}

/// Flag granted after a successful secret-post password or ownership check.
pub fn secret_key(board_id: &str, write_id: i32) -> String {
    format!("ss_secret_{}_{}", board_id, write_id)
}

/// Flag marking that read cost + hit count were already charged once.
pub fn view_key(board_id: &str, write_id: i32) -> String {
    format!("ss_view_{}_{}", board_id, write_id)
}

/// Flag marking a paid download, so retries never double-charge.
pub fn download_key(board_id: &str, write_id: i32) -> String {
    format!("ss_down_{}_{}", board_id, write_id)
}

#[derive(Debug, Default)]
pub struct MemorySession {
    flags: RwLock<HashSet<String>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBag for MemorySession {
    fn has_flag(&self, key: &str) -> bool {
        self.flags.read().unwrap().contains(key)
    }

    fn set_flag(&self, key: &str) {
        self.flags.write().unwrap().insert(key.to_owned());
    }
}
