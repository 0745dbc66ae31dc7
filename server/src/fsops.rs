//! File operation engine.
//!
//! Translates client-supplied relative paths into paths under the storage
//! root and executes mutations only when they are safe: every path is
//! canonicalized and prefix-checked against the canonical root, and
//! destructive operations on individual files probe a non-blocking
//! exclusive advisory lock so a file mid-transfer is refused as busy
//! rather than deleted out from under the reader.

use std::{
    fs::{self, File},
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};

use fs2::FileExt;

/// Reserved prefix of group-namespaced top-level folders.
pub const GROUP_DIR_PREFIX: &str = "Group_";

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("Access denied")]
    AccessDenied,

    #[error("File or folder not found")]
    NotFound,

    #[error("Folder not found")]
    FolderNotFound,

    #[error("Destination already exists")]
    AlreadyExists,

    #[error("File is busy")]
    Busy,

    #[error("Target is a folder, not a file")]
    NotAFile,

    #[error("Invalid name")]
    InvalidName,

    #[error("Cannot move or copy a folder into itself")]
    IntoItself,

    #[error("File operation failed: {0}")]
    Io(#[from] io::Error),
}

/// Owns the canonical storage root; all client-visible paths resolve
/// under it or the operation is refused.
pub struct FileEngine {
    root: PathBuf,
}

impl FileEngine {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The group id of a group-scoped path (leading `Group_<id>` segment).
    pub fn group_scope(rel: &str) -> Option<i64> {
        let first = Path::new(rel).components().next()?;
        let Component::Normal(seg) = first else {
            return None;
        };
        seg.to_str()?.strip_prefix(GROUP_DIR_PREFIX)?.parse().ok()
    }

    /// First gate: refuse absolute paths and any parent-directory segment
    /// before touching the filesystem. Canonicalization afterwards is the
    /// real containment check; this only rejects the obvious attempts
    /// early.
    fn sanitize(rel: &str) -> Result<&Path, FsError> {
        let path = Path::new(rel);
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(FsError::AccessDenied),
            }
        }
        Ok(path)
    }

    /// Resolves a path that must already exist: canonicalize, then verify
    /// it still lies within the canonical root.
    fn resolve_existing(&self, rel: &str) -> Result<PathBuf, FsError> {
        let rel = Self::sanitize(rel)?;
        let joined = self.root.join(rel);
        let canon = joined.canonicalize().map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound,
            _ => FsError::Io(e),
        })?;
        if !canon.starts_with(&self.root) {
            return Err(FsError::AccessDenied);
        }
        Ok(canon)
    }

    /// Resolves a path being created: its parent must exist and be inside
    /// the root; the final segment is taken literally.
    fn resolve_new(&self, rel: &str) -> Result<PathBuf, FsError> {
        let rel = Self::sanitize(rel)?;
        let name = rel.file_name().ok_or(FsError::InvalidName)?;
        let joined = self.root.join(rel);
        let parent = joined.parent().ok_or(FsError::InvalidName)?;
        let canon_parent = parent.canonicalize().map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::FolderNotFound,
            _ => FsError::Io(e),
        })?;
        if !canon_parent.starts_with(&self.root) {
            return Err(FsError::AccessDenied);
        }
        Ok(canon_parent.join(name))
    }

    /// Probes a non-blocking exclusive lock on a file. Failure to acquire
    /// means some other operation currently holds the file; the caller
    /// refuses its operation instead of racing the holder.
    fn probe_exclusive(path: &Path) -> Result<File, FsError> {
        let file = File::open(path)?;
        // Trait-qualified: std has since grown same-named inherent lock
        // methods on File with a different error type.
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                FsError::Busy
            } else {
                FsError::Io(e)
            }
        })?;
        Ok(file)
    }

    /// Enumerates the immediate children of a directory. Directories carry
    /// a trailing `/` marker; an empty directory yields `(empty)`.
    pub fn list(&self, rel: &str) -> Result<String, FsError> {
        let dir = if rel.trim().is_empty() {
            self.root.clone()
        } else {
            self.resolve_existing(rel).map_err(|e| match e {
                FsError::NotFound => FsError::FolderNotFound,
                other => other,
            })?
        };
        if !dir.is_dir() {
            return Err(FsError::FolderNotFound);
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        if names.is_empty() {
            return Ok("(empty)".to_string());
        }
        Ok(names.join("\n"))
    }

    /// Creates a single directory level. Fails if it already exists.
    pub fn create_folder(&self, rel: &str) -> Result<(), FsError> {
        let path = self.resolve_new(rel)?;
        if path.exists() {
            return Err(FsError::AlreadyExists);
        }
        fs::create_dir(&path)?;
        Ok(())
    }

    /// Provisions the storage directory for a newly created group.
    pub fn provision_group_dir(&self, group_id: i64) -> Result<(), FsError> {
        let path = self.root.join(format!("{GROUP_DIR_PREFIX}{group_id}"));
        fs::create_dir_all(&path)?;
        Ok(())
    }

    /// Best-effort removal of a deleted group's storage directory.
    pub fn remove_group_dir(&self, group_id: i64) -> Result<(), FsError> {
        let path = self.root.join(format!("{GROUP_DIR_PREFIX}{group_id}"));
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        Ok(())
    }

    /// Deletes a file or a directory tree. Directories are removed
    /// depth-first; a regular file held by another operation is refused
    /// as busy.
    pub fn delete(&self, rel: &str) -> Result<(), FsError> {
        let path = self.resolve_existing(rel)?;
        if path == self.root {
            return Err(FsError::AccessDenied);
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            let _lock = Self::probe_exclusive(&path)?;
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Same-directory identity change. No silent overwrite, and a busy
    /// source file is refused.
    pub fn rename(&self, old_rel: &str, new_name: &str) -> Result<(), FsError> {
        let src = self.resolve_existing(old_rel)?;
        if src == self.root {
            return Err(FsError::AccessDenied);
        }

        // The new name stays in the source's directory.
        let new_name = Path::new(new_name);
        if new_name.components().count() != 1
            || !matches!(new_name.components().next(), Some(Component::Normal(_)))
        {
            return Err(FsError::InvalidName);
        }
        let dest = src
            .parent()
            .ok_or(FsError::InvalidName)?
            .join(new_name);
        if dest.exists() {
            return Err(FsError::AlreadyExists);
        }

        if src.is_file() {
            let _lock = Self::probe_exclusive(&src)?;
            fs::rename(&src, &dest)?;
        } else {
            fs::rename(&src, &dest)?;
        }
        Ok(())
    }

    /// Relocates the source under an existing destination directory,
    /// preserving its base name.
    pub fn move_item(&self, src_rel: &str, dst_rel: &str) -> Result<(), FsError> {
        let src = self.resolve_existing(src_rel)?;
        if src == self.root {
            return Err(FsError::AccessDenied);
        }
        let dst_dir = self.resolve_existing(dst_rel).map_err(|e| match e {
            FsError::NotFound => FsError::FolderNotFound,
            other => other,
        })?;
        if !dst_dir.is_dir() {
            return Err(FsError::FolderNotFound);
        }
        if src.is_dir() && dst_dir.starts_with(&src) {
            return Err(FsError::IntoItself);
        }

        let name = src.file_name().ok_or(FsError::InvalidName)?;
        let target = dst_dir.join(name);
        if target.exists() {
            return Err(FsError::AlreadyExists);
        }

        if src.is_file() {
            let _lock = Self::probe_exclusive(&src)?;
            fs::rename(&src, &target)?;
        } else {
            fs::rename(&src, &target)?;
        }
        Ok(())
    }

    /// Recursive depth-first duplication. When the destination resolves to
    /// an existing directory the source is copied inside it under its own
    /// base name; otherwise the destination path is the literal new name.
    /// Partial copies are not rolled back on mid-copy I/O failure.
    pub fn copy_item(&self, src_rel: &str, dst_rel: &str) -> Result<(), FsError> {
        let src = self.resolve_existing(src_rel)?;
        if src == self.root {
            return Err(FsError::AccessDenied);
        }

        let target = match self.resolve_existing(dst_rel) {
            Ok(existing) if existing.is_dir() => {
                let name = src.file_name().ok_or(FsError::InvalidName)?;
                existing.join(name)
            }
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => self.resolve_new(dst_rel)?,
            Err(other) => return Err(other),
        };

        if target.exists() {
            return Err(FsError::AlreadyExists);
        }
        if src.is_dir() && target.starts_with(&src) {
            return Err(FsError::IntoItself);
        }

        copy_tree(&src, &target)?;
        Ok(())
    }

    /// Creates the destination file for an upload and holds an exclusive
    /// advisory lock on it for the duration of the receive loop, so a
    /// concurrent delete of a half-written file is refused as busy.
    pub fn create_upload(&self, rel: &str) -> Result<File, FsError> {
        let path = self.resolve_new(rel)?;
        if path.is_dir() {
            return Err(FsError::AlreadyExists);
        }
        if path.exists() {
            // Refuse to truncate a file another operation holds.
            let _probe = Self::probe_exclusive(&path)?;
        }

        let file = File::create(&path)?;
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                FsError::Busy
            } else {
                FsError::Io(e)
            }
        })?;
        Ok(file)
    }

    /// Opens a regular file for download under a shared advisory lock and
    /// returns it with its byte length. Directories fail explicitly.
    pub fn open_download(&self, rel: &str) -> Result<(File, u64), FsError> {
        let path = self.resolve_existing(rel)?;
        if path.is_dir() {
            return Err(FsError::NotAFile);
        }

        let file = File::open(&path)?;
        FileExt::try_lock_shared(&file).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                FsError::Busy
            } else {
                FsError::Io(e)
            }
        })?;
        let len = file.metadata()?.len();
        Ok((file, len))
    }
}

/// Depth-first copy: the parent directory is created before its children.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        fs::create_dir(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> FileEngine {
        FileEngine::new(dir.path().join("files")).unwrap()
    }

    fn write_file(engine: &FileEngine, rel: &str, contents: &[u8]) {
        let mut f = File::create(engine.root().join(rel)).unwrap();
        f.write_all(contents).unwrap();
    }

    #[test]
    fn group_scope_parses_reserved_prefix() {
        assert_eq!(FileEngine::group_scope("Group_7/notes.txt"), Some(7));
        assert_eq!(FileEngine::group_scope("Group_12"), Some(12));
        assert_eq!(FileEngine::group_scope("docs/readme.md"), None);
        assert_eq!(FileEngine::group_scope("Group_x/file"), None);
        assert_eq!(FileEngine::group_scope(""), None);
    }

    #[test]
    fn parent_segments_are_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        assert!(matches!(
            engine.list("../"),
            Err(FsError::AccessDenied)
        ));
        assert!(matches!(
            engine.create_folder("a/../../escape"),
            Err(FsError::AccessDenied)
        ));
        assert!(matches!(
            engine.delete("../../etc/passwd"),
            Err(FsError::AccessDenied)
        ));
    }

    #[test]
    fn absolute_paths_are_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        assert!(matches!(
            engine.list("/etc"),
            Err(FsError::AccessDenied)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_caught_by_canonicalization() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, engine.root().join("link")).unwrap();

        assert!(matches!(engine.list("link"), Err(FsError::AccessDenied)));
        assert!(matches!(engine.delete("link"), Err(FsError::AccessDenied)));
    }

    #[test]
    fn list_marks_directories_and_empty() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        assert_eq!(engine.list("").unwrap(), "(empty)");

        engine.create_folder("docs").unwrap();
        write_file(&engine, "a.txt", b"hello");

        let listing = engine.list("").unwrap();
        assert_eq!(listing, "a.txt\ndocs/");
        assert_eq!(engine.list("docs").unwrap(), "(empty)");

        assert!(matches!(
            engine.list("missing"),
            Err(FsError::FolderNotFound)
        ));
        assert!(matches!(
            engine.list("a.txt"),
            Err(FsError::FolderNotFound)
        ));
    }

    #[test]
    fn create_folder_refuses_duplicates() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_folder("docs").unwrap();
        assert!(matches!(
            engine.create_folder("docs"),
            Err(FsError::AlreadyExists)
        ));
        assert!(matches!(
            engine.create_folder("nope/docs"),
            Err(FsError::FolderNotFound)
        ));
    }

    #[test]
    fn delete_removes_directory_recursively() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_folder("tree").unwrap();
        engine.create_folder("tree/sub").unwrap();
        write_file(&engine, "tree/sub/leaf.txt", b"x");

        engine.delete("tree").unwrap();
        assert_eq!(engine.list("").unwrap(), "(empty)");
        assert!(matches!(engine.delete("tree"), Err(FsError::NotFound)));
    }

    #[test]
    fn delete_of_locked_file_is_busy() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        write_file(&engine, "held.txt", b"data");

        let (held, _) = engine.open_download("held.txt").unwrap();
        assert!(matches!(engine.delete("held.txt"), Err(FsError::Busy)));
        drop(held);
        engine.delete("held.txt").unwrap();
    }

    #[test]
    fn rename_refuses_collision_and_keeps_both() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        write_file(&engine, "a.txt", b"aaa");
        write_file(&engine, "b.txt", b"bbb");

        assert!(matches!(
            engine.rename("a.txt", "b.txt"),
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(fs::read(engine.root().join("a.txt")).unwrap(), b"aaa");
        assert_eq!(fs::read(engine.root().join("b.txt")).unwrap(), b"bbb");

        engine.rename("a.txt", "c.txt").unwrap();
        assert!(engine.root().join("c.txt").exists());
        assert!(!engine.root().join("a.txt").exists());

        assert!(matches!(
            engine.rename("c.txt", "sub/d.txt"),
            Err(FsError::InvalidName)
        ));
        assert!(matches!(
            engine.rename("missing", "x"),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn move_preserves_base_name_and_checks_descent() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_folder("dst").unwrap();
        engine.create_folder("tree").unwrap();
        engine.create_folder("tree/inner").unwrap();
        write_file(&engine, "f.txt", b"f");

        engine.move_item("f.txt", "dst").unwrap();
        assert!(engine.root().join("dst/f.txt").exists());

        assert!(matches!(
            engine.move_item("tree", "tree/inner"),
            Err(FsError::IntoItself)
        ));
        assert!(matches!(
            engine.move_item("tree", "missing"),
            Err(FsError::FolderNotFound)
        ));

        write_file(&engine, "dst/g.txt", b"old");
        write_file(&engine, "g.txt", b"new");
        assert!(matches!(
            engine.move_item("g.txt", "dst"),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn copy_duplicates_tree_contents() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_folder("tree").unwrap();
        engine.create_folder("tree/sub").unwrap();
        write_file(&engine, "tree/root.txt", b"root");
        write_file(&engine, "tree/sub/leaf.txt", b"leaf");

        engine.copy_item("tree", "tree2").unwrap();
        assert_eq!(fs::read(engine.root().join("tree2/root.txt")).unwrap(), b"root");
        assert_eq!(
            fs::read(engine.root().join("tree2/sub/leaf.txt")).unwrap(),
            b"leaf"
        );

        // Copy followed by delete-of-source leaves the duplicate intact.
        engine.delete("tree").unwrap();
        assert_eq!(
            fs::read(engine.root().join("tree2/sub/leaf.txt")).unwrap(),
            b"leaf"
        );
    }

    #[test]
    fn copy_into_existing_directory_keeps_base_name() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_folder("dst").unwrap();
        write_file(&engine, "a.txt", b"a");

        engine.copy_item("a.txt", "dst").unwrap();
        assert_eq!(fs::read(engine.root().join("dst/a.txt")).unwrap(), b"a");

        assert!(matches!(
            engine.copy_item("a.txt", "dst"),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn copy_into_own_subtree_is_refused() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_folder("tree").unwrap();
        engine.create_folder("tree/sub").unwrap();

        assert!(matches!(
            engine.copy_item("tree", "tree/sub"),
            Err(FsError::IntoItself)
        ));
    }

    #[test]
    fn download_of_directory_fails_explicitly() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_folder("docs").unwrap();

        assert!(matches!(
            engine.open_download("docs"),
            Err(FsError::NotAFile)
        ));
        assert!(matches!(
            engine.open_download("missing.txt"),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn upload_lock_blocks_concurrent_delete() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let upload = engine.create_upload("incoming.txt").unwrap();
        assert!(matches!(engine.delete("incoming.txt"), Err(FsError::Busy)));
        drop(upload);
        engine.delete("incoming.txt").unwrap();
    }

    #[test]
    fn download_len_matches_contents() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        write_file(&engine, "data.bin", &[7u8; 1234]);

        let (_file, len) = engine.open_download("data.bin").unwrap();
        assert_eq!(len, 1234);
    }
}
