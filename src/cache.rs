//! Rendered-fragment file cache with prefix invalidation.
//!
//! Fragments are flat files under one directory, keyed by board, skin and
//! render parameters plus a short per-deployment salt so two installs
//! sharing a volume never collide. No locking: a reader racing an
//! invalidation may see a stale-but-valid fragment, which is acceptable
//! because every fragment is re-derivable from the store.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FragmentCache {
    dir: PathBuf,
    salt: String,
}

impl FragmentCache {
    /// Opens (and creates, if needed) the cache directory.
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        fs::DirBuilder::new().recursive(true).create(dir)?;
        Ok(Self {
            dir: dir.to_owned(),
            salt: deployment_salt(dir),
        })
    }

    /// Cache key for a board's latest-posts fragment.
    pub fn latest_key(&self, board_id: &str, skin: &str, rows: u64, subject_len: usize) -> String {
        format!(
            "{}-{}-{}-{}-{}.html",
            board_prefix(board_id),
            sanitize(skin),
            rows,
            subject_len,
            self.salt
        )
    }

    pub fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.dir.join(key)).ok()
    }

    pub fn put(&self, key: &str, content: &str) -> std::io::Result<()> {
        fs::write(self.dir.join(key), content)
    }

    /// Deletes every fragment belonging to `board_id`. Must run after any
    /// commit that mutates the board's posts or comments.
    pub fn invalidate_prefix(&self, board_id: &str) {
        let prefix = board_prefix(board_id);
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("invalidate_prefix: cannot list cache dir: {}", e);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    log::warn!("invalidate_prefix: {}: {}", name.to_string_lossy(), e);
                }
            }
        }
    }
}

fn board_prefix(board_id: &str) -> String {
    format!("latest-{}-", sanitize(board_id))
}

/// Keys must be filesystem-safe regardless of what the caller feeds in.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Six hex characters derived from the host identity, so fragments from
/// different deployments never collide on a shared filesystem.
fn deployment_salt(dir: &Path) -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(host.as_bytes());
    hasher.update(dir.to_string_lossy().as_bytes());
    hasher.finalize().to_hex()[..6].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, FragmentCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn round_trips_a_fragment() {
        let (_dir, cache) = cache();
        let key = cache.latest_key("free", "basic", 10, 40);
        assert!(cache.get(&key).is_none());
        cache.put(&key, "<ul></ul>").unwrap();
        assert_eq!(cache.get(&key).as_deref(), Some("<ul></ul>"));
    }

    #[test]
    fn prefix_invalidation_only_hits_one_board() {
        let (_dir, cache) = cache();
        let free = cache.latest_key("free", "basic", 10, 40);
        let free_wide = cache.latest_key("free", "wide", 5, 20);
        let gallery = cache.latest_key("gallery", "basic", 10, 40);
        cache.put(&free, "a").unwrap();
        cache.put(&free_wide, "b").unwrap();
        cache.put(&gallery, "c").unwrap();

        cache.invalidate_prefix("free");
        assert!(cache.get(&free).is_none());
        assert!(cache.get(&free_wide).is_none());
        assert_eq!(cache.get(&gallery).as_deref(), Some("c"));
    }

    #[test]
    fn board_prefixes_cannot_shadow_each_other() {
        // "free" must not invalidate "free2"'s fragments.
        let (_dir, cache) = cache();
        let free2 = cache.latest_key("free2", "basic", 10, 40);
        cache.put(&free2, "x").unwrap();
        cache.invalidate_prefix("free");
        assert_eq!(cache.get(&free2).as_deref(), Some("x"));
    }

    #[test]
    fn keys_are_filesystem_safe() {
        let (_dir, cache) = cache();
        let key = cache.latest_key("../etc", "sk/in", 3, 9);
        assert!(!key.contains('/'));
        assert!(!key.contains(".."));
        cache.put(&key, "ok").unwrap();
        assert_eq!(cache.get(&key).as_deref(), Some("ok"));
    }
}
