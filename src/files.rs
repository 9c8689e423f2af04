//! Attachment storage behind a trait, so the engine never touches paths
//! directly and tests can run against a temp directory.
//!
//! Attachments live at a deterministic location derived from the board and
//! write id, which is what makes relocation after a move or copy idempotent:
//! re-running it converges on the same final layout.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Storage operations the engine needs for a write's attachment set.
pub trait FileStore: Send + Sync {
    /// Moves the attachment set to another board and id. A missing source
    /// is a no-op so retries converge.
    fn relocate(&self, from_board: &str, from_id: i32, to_board: &str, to_id: i32) -> Result<()>;

    /// Copies the attachment set, leaving the source in place.
    fn copy(&self, from_board: &str, from_id: i32, to_board: &str, to_id: i32) -> Result<()>;

    /// Removes the attachment set. Missing files are fine.
    fn delete(&self, board_id: &str, write_id: i32) -> Result<()>;
}

/// Local-disk store laying attachments out as `{root}/{board}/{write_id}/`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: &Path) -> std::io::Result<Self> {
        fs::DirBuilder::new().recursive(true).create(root)?;
        Ok(Self {
            root: root.to_owned(),
        })
    }

    fn dir_for(&self, board_id: &str, write_id: i32) -> PathBuf {
        self.root.join(sanitize(board_id)).join(write_id.to_string())
    }
}

impl FileStore for LocalFileStore {
    fn relocate(&self, from_board: &str, from_id: i32, to_board: &str, to_id: i32) -> Result<()> {
        let from = self.dir_for(from_board, from_id);
        if !from.exists() {
            return Ok(());
        }
        let to = self.dir_for(to_board, to_id);
        if let Some(parent) = to.parent() {
            fs::DirBuilder::new().recursive(true).create(parent)?;
        }
        match fs::rename(&from, &to) {
            Ok(()) => Ok(()),
            // Cross-device rename fails; fall back to copy then remove.
            Err(_) => {
                copy_dir(&from, &to)?;
                fs::remove_dir_all(&from)?;
                Ok(())
            }
        }
    }

    fn copy(&self, from_board: &str, from_id: i32, to_board: &str, to_id: i32) -> Result<()> {
        let from = self.dir_for(from_board, from_id);
        if !from.exists() {
            return Ok(());
        }
        copy_dir(&from, &self.dir_for(to_board, to_id))?;
        Ok(())
    }

    fn delete(&self, board_id: &str, write_id: i32) -> Result<()> {
        let dir = self.dir_for(board_id, write_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::DirBuilder::new().recursive(true).create(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn seed(store: &LocalFileStore, board: &str, id: i32, name: &str, body: &str) {
        let dir = store.dir_for(board, id);
        fs::DirBuilder::new().recursive(true).create(&dir).unwrap();
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn relocate_moves_the_whole_set() {
        let (_dir, store) = store();
        seed(&store, "free", 7, "a.jpg", "jpeg");
        store.relocate("free", 7, "notice", 31).unwrap();

        assert!(!store.dir_for("free", 7).exists());
        let moved = store.dir_for("notice", 31).join("a.jpg");
        assert_eq!(fs::read_to_string(moved).unwrap(), "jpeg");

        // Retrying after success is a no-op, not an error.
        store.relocate("free", 7, "notice", 31).unwrap();
    }

    #[test]
    fn copy_leaves_the_source_alone() {
        let (_dir, store) = store();
        seed(&store, "free", 7, "a.jpg", "jpeg");
        store.copy("free", 7, "notice", 31).unwrap();
        assert!(store.dir_for("free", 7).join("a.jpg").exists());
        assert!(store.dir_for("notice", 31).join("a.jpg").exists());
    }

    #[test]
    fn delete_tolerates_missing_sets() {
        let (_dir, store) = store();
        store.delete("free", 99).unwrap();
        seed(&store, "free", 7, "a.jpg", "jpeg");
        store.delete("free", 7).unwrap();
        assert!(!store.dir_for("free", 7).exists());
    }
}
