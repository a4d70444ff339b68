//! Script Store
//!
//! Materializes generated scripts under a category directory such as
//! `db/Sales/Tables`. Every object owns exactly one `<name>.csl` file in the
//! category subtree: before writing, any same-named file elsewhere in the
//! subtree is removed, so an object that moved folders leaves no stale copy.
//! Files that do not collide with a written object are left untouched.

use crate::error::{write_error, AppError, AppResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Script file extension
pub const SCRIPT_EXTENSION: &str = "csl";

/// One object to materialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub name: String,
    /// Logical folder, `/` or `\` separated; `None` places the file at the category root
    pub folder: Option<String>,
    pub content: String,
}

impl ScriptFile {
    pub fn new(name: impl Into<String>, folder: Option<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folder,
            content: content.into(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, SCRIPT_EXTENSION)
    }
}

/// Outcome of materializing a batch of files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub written: usize,
    pub stale_removed: usize,
}

impl StoreStats {
    pub fn merge(&mut self, other: StoreStats) {
        self.written += other.written;
        self.stale_removed += other.stale_removed;
    }
}

/// Writes script files beneath one category root
pub struct ScriptStore {
    root: PathBuf,
}

impl ScriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Destination path of `file`
    ///
    /// Empty, `.` and `..` folder segments are dropped so a folder can never
    /// escape the category root.
    pub fn path_for(&self, file: &ScriptFile) -> PathBuf {
        let mut path = self.root.clone();
        if let Some(ref folder) = file.folder {
            for segment in folder.split(['/', '\\']) {
                if !matches!(segment, "" | "." | "..") {
                    path.push(segment);
                }
            }
        }
        path.push(file.file_name());
        path
    }

    /// Materialize every file, checking for cancellation before each write
    pub async fn write_all(&self, files: &[ScriptFile], cancel: &CancellationToken) -> AppResult<StoreStats> {
        let mut stats = StoreStats::default();
        for file in files {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            stats.merge(self.write(file).await?);
        }
        Ok(stats)
    }

    /// Materialize one file, removing any same-named copy elsewhere in the subtree
    pub async fn write(&self, file: &ScriptFile) -> AppResult<StoreStats> {
        let destination = self.path_for(file);
        let stale_removed = self.remove_existing(&file.file_name(), &destination).await;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(parent, e))?;
        }
        fs::write(&destination, file.content.as_bytes())
            .await
            .map_err(|e| write_error(&destination, e))?;

        debug!("Wrote {}", destination.display());

        Ok(StoreStats {
            written: 1,
            stale_removed,
        })
    }

    /// Delete every file named `file_name` under the root
    ///
    /// Failures are logged and skipped. Returns how many files other than
    /// `destination` were removed.
    async fn remove_existing(&self, file_name: &str, destination: &Path) -> usize {
        let mut removed = 0;
        for path in self.find(file_name).await {
            match fs::remove_file(&path).await {
                Ok(()) if path == destination => {}
                Ok(()) => {
                    info!("Removed stale script {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove stale script {}: {}", path.display(), e),
            }
        }
        removed
    }

    async fn find(&self, file_name: &str) -> Vec<PathBuf> {
        let mut matches = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Failed to scan {}: {}", dir.display(), e);
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to scan {}: {}", dir.display(), e);
                        break;
                    }
                };
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        warn!("Failed to inspect {}: {}", entry.path().display(), e);
                        continue;
                    }
                };

                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if entry.file_name() == file_name {
                    matches.push(entry.path());
                }
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn file(name: &str, folder: Option<&str>, content: &str) -> ScriptFile {
        ScriptFile::new(name, folder.map(str::to_string), content)
    }

    #[test]
    fn test_path_for_splits_folders() {
        let store = ScriptStore::new("/out/db/Sales/Tables");

        assert_eq!(
            store.path_for(&file("T", None, "")),
            PathBuf::from("/out/db/Sales/Tables/T.csl")
        );
        assert_eq!(
            store.path_for(&file("T", Some(r"Core\Raw/Ingest"), "")),
            PathBuf::from("/out/db/Sales/Tables/Core/Raw/Ingest/T.csl")
        );
        assert_eq!(
            store.path_for(&file("T", Some("../../etc/./x"), "")),
            PathBuf::from("/out/db/Sales/Tables/etc/x/T.csl")
        );
    }

    #[tokio::test]
    async fn test_write_creates_folders() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path().join("Functions"));

        let stats = store.write(&file("F", Some("A/B"), "body")).await.unwrap();

        let written = dir.path().join("Functions/A/B/F.csl");
        assert_eq!(stdfs::read_to_string(written).unwrap(), "body");
        assert_eq!(stats, StoreStats { written: 1, stale_removed: 0 });
    }

    #[tokio::test]
    async fn test_write_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path());

        store.write(&file("T", None, "a much longer first version")).await.unwrap();
        let stats = store.write(&file("T", None, "v2")).await.unwrap();

        assert_eq!(stdfs::read_to_string(dir.path().join("T.csl")).unwrap(), "v2");
        assert_eq!(stats.stale_removed, 0);
    }

    #[tokio::test]
    async fn test_moved_object_leaves_no_stale_copy() {
        let dir = TempDir::new().unwrap();
        let tables = dir.path().join("Tables");
        stdfs::create_dir_all(tables.join("OldFolder")).unwrap();
        stdfs::write(tables.join("OldFolder/Foo.csl"), "old").unwrap();
        stdfs::write(tables.join("OldFolder/Unrelated.csl"), "keep").unwrap();
        stdfs::write(tables.join("OldFolder/Foo.txt"), "keep").unwrap();

        let store = ScriptStore::new(&tables);
        let stats = store.write(&file("Foo", Some("NewFolder"), "new")).await.unwrap();

        assert!(!tables.join("OldFolder/Foo.csl").exists());
        assert_eq!(stdfs::read_to_string(tables.join("NewFolder/Foo.csl")).unwrap(), "new");
        assert_eq!(stdfs::read_to_string(tables.join("OldFolder/Unrelated.csl")).unwrap(), "keep");
        assert!(tables.join("OldFolder/Foo.txt").exists());
        assert_eq!(stats.stale_removed, 1);
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_category_root() {
        let dir = TempDir::new().unwrap();
        stdfs::create_dir_all(dir.path().join("Functions")).unwrap();
        stdfs::write(dir.path().join("Functions/Foo.csl"), "function").unwrap();

        let store = ScriptStore::new(dir.path().join("Tables"));
        store.write(&file("Foo", None, "table")).await.unwrap();

        assert_eq!(stdfs::read_to_string(dir.path().join("Functions/Foo.csl")).unwrap(), "function");
        assert_eq!(stdfs::read_to_string(dir.path().join("Tables/Foo.csl")).unwrap(), "table");
    }

    #[tokio::test]
    async fn test_write_all_stops_when_cancelled() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = store.write_all(&[file("A", None, "a")], &cancel).await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(!dir.path().join("A.csl").exists());
    }

    #[tokio::test]
    async fn test_cancel_between_writes_keeps_written_files() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path());
        let cancel = CancellationToken::new();

        let first = store.write_all(&[file("A", None, "a")], &cancel).await.unwrap();
        cancel.cancel();
        let second = store
            .write_all(&[file("B", None, "b"), file("C", None, "c")], &cancel)
            .await;

        assert_eq!(first.written, 1);
        assert!(matches!(second, Err(AppError::Cancelled)));
        assert_eq!(stdfs::read_to_string(dir.path().join("A.csl")).unwrap(), "a");
        assert!(!dir.path().join("B.csl").exists());
        assert!(!dir.path().join("C.csl").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_undeletable_stale_copy_does_not_fail_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tables = dir.path().join("Tables");
        let locked = tables.join("Locked");
        stdfs::create_dir_all(&locked).unwrap();
        stdfs::write(locked.join("Foo.csl"), "old").unwrap();
        stdfs::set_permissions(&locked, stdfs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits do not bind a privileged user
        if stdfs::write(locked.join("writable"), "").is_ok() {
            stdfs::set_permissions(&locked, stdfs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = ScriptStore::new(&tables);
        let result = store.write(&file("Foo", Some("NewFolder"), "new")).await;

        stdfs::set_permissions(&locked, stdfs::Permissions::from_mode(0o755)).unwrap();

        let stats = result.unwrap();
        assert_eq!(stats, StoreStats { written: 1, stale_removed: 0 });
        assert_eq!(stdfs::read_to_string(tables.join("NewFolder/Foo.csl")).unwrap(), "new");
        assert_eq!(stdfs::read_to_string(locked.join("Foo.csl")).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_write_all_counts_files() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path());
        let files = vec![file("A", None, "a"), file("B", Some("X"), "b")];

        let stats = store.write_all(&files, &CancellationToken::new()).await.unwrap();

        assert_eq!(stats.written, 2);
        assert!(dir.path().join("X/B.csl").exists());
    }

    #[tokio::test]
    async fn test_write_error_reports_path() {
        let dir = TempDir::new().unwrap();
        stdfs::write(dir.path().join("blocker"), "file, not a directory").unwrap();
        let store = ScriptStore::new(dir.path().join("blocker"));

        let result = store.write(&file("T", None, "x")).await;

        assert!(matches!(result, Err(AppError::Write { .. })));
    }
}
