use super::{EntryKind, FileInfo, FileMeta, Storage};
use crate::error::{Result, SyncError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 本地文件系统存储
pub struct LocalStorage {
    name: String,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }

    fn kind_of(file_type: fs::FileType) -> EntryKind {
        if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for LocalStorage {
    fn list_dir(&self, path: &Path) -> Result<Vec<FileInfo>> {
        let entries = fs::read_dir(path).map_err(|e| SyncError::io("read_dir", path, e))?;

        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::io("read_dir", path, e))?;
            // DirEntry::file_type 不跟随符号链接
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(SyncError::io("file_type", entry.path(), e)),
            };
            let kind = Self::kind_of(file_type);
            let size = if kind == EntryKind::File {
                match entry.metadata() {
                    Ok(m) => m.len(),
                    // 列表与 stat 之间文件被删除
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(SyncError::io("stat", entry.path(), e)),
                }
            } else {
                0
            };

            infos.push(FileInfo {
                name: entry.file_name(),
                kind,
                size,
            });
        }

        Ok(infos)
    }

    fn stat(&self, path: &Path) -> Result<Option<FileMeta>> {
        match fs::symlink_metadata(path) {
            Ok(metadata) => {
                let kind = Self::kind_of(metadata.file_type());
                Ok(Some(FileMeta {
                    size: if kind == EntryKind::File { metadata.len() } else { 0 },
                    kind,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io("stat", path, e)),
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64> {
        fs::copy(from, to).map_err(|e| SyncError::io("copy", from, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| SyncError::io("rename", from, e))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir(path).map_err(|e| SyncError::io("create_dir", path, e))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| SyncError::io("create_dir_all", path, e))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).map_err(|e| SyncError::io("canonicalize", path, e))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_dir_reports_kinds_and_sizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let storage = LocalStorage::new();
        let mut entries = storage.list_dir(dir.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 10);
        assert_eq!(entries[1].name, "sub");
        assert_eq!(entries[1].kind, EntryKind::Dir);
    }

    #[test]
    fn stat_missing_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        assert!(storage.stat(&dir.path().join("nope")).unwrap().is_none());
        assert!(!storage.exists(&dir.path().join("nope")));
    }

    #[test]
    fn copy_file_overwrites_and_keeps_not_found_kind() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        fs::write(&src, b"abc").unwrap();
        fs::write(&dst, b"longer content").unwrap();

        let storage = LocalStorage::new();
        assert_eq!(storage.copy_file(&src, &dst).unwrap(), 3);
        assert_eq!(fs::read(&dst).unwrap(), b"abc");

        let err = storage
            .copy_file(&dir.path().join("gone"), &dst)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn create_dir_fails_when_exists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let sub = dir.path().join("sub");
        storage.create_dir(&sub).unwrap();
        assert_eq!(
            storage.create_dir(&sub).unwrap_err().io_kind(),
            Some(io::ErrorKind::AlreadyExists)
        );
    }
}
