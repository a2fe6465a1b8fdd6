//! 目录/文件实体 - 构造时对文件系统做一次快照
//!
//! 快照只在构造时读取一次，之后不会刷新。文件系统发生变化后，
//! 调用方需要重新构造实体才能看到新状态。

use crate::core::filter::IgnoreRules;
use crate::error::{Result, SyncError};
use crate::storage::{EntryKind, Storage, Trash, TrashOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 规范化用户输入的路径
///
/// Windows 上统一为 `\`，混用 `/` 与 `\` 视为无效输入。
pub fn normalize_path(raw: &str) -> Result<PathBuf> {
    // 首尾空格可能是名称的一部分，原样保留
    if raw.trim().is_empty() {
        return Err(SyncError::InvalidPath("路径为空".to_string()));
    }

    if cfg!(windows) {
        if raw.contains('/') && raw.contains('\\') {
            return Err(SyncError::InvalidPath(format!("混用了路径分隔符: {raw}")));
        }
        return Ok(PathBuf::from(raw.replace('/', "\\")));
    }

    Ok(PathBuf::from(raw))
}

/// 文件实体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: PathBuf,
    size: u64,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// 对单个路径做一次 stat，不存在或不是普通文件时返回 None
    pub fn stat(storage: &dyn Storage, path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();
        Ok(storage
            .stat(&path)?
            .filter(|meta| meta.kind == EntryKind::File)
            .map(|meta| Self::new(path, meta.size)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// 快照时的字节数
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 移入回收站；文件已不存在时为空操作
    pub fn delete(&self, trash: &dyn Trash) -> Result<TrashOutcome> {
        trash.trash(&self.path)
    }
}

/// 目录实体
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
    subdirs: BTreeSet<OsString>,
    files: BTreeMap<OsString, u64>,
}

impl Directory {
    /// 列出目录一次并记录直接子目录与文件
    ///
    /// 列表失败（权限不足、目录已消失）时得到空快照，不视为错误。
    pub fn snapshot(storage: &dyn Storage, path: impl Into<PathBuf>, rules: &IgnoreRules) -> Self {
        let path = path.into();
        let mut subdirs = BTreeSet::new();
        let mut files = BTreeMap::new();

        match storage.list_dir(&path) {
            Ok(entries) => {
                for entry in entries {
                    if rules.is_ignored(&entry.name) {
                        continue;
                    }
                    match entry.kind {
                        EntryKind::Dir => {
                            subdirs.insert(entry.name);
                        }
                        EntryKind::File => {
                            files.insert(entry.name, entry.size);
                        }
                        EntryKind::Other => {
                            debug!("跳过非普通条目: {}", path.join(&entry.name).display());
                        }
                    }
                }
            }
            Err(e) => {
                debug!("目录不可读，视为空目录: {} - {}", path.display(), e);
            }
        }

        Self {
            path,
            subdirs,
            files,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 子目录名称（有序）
    pub fn subdir_names(&self) -> impl Iterator<Item = &OsStr> + '_ {
        self.subdirs.iter().map(OsString::as_os_str)
    }

    /// 子目录完整路径（有序）
    pub fn subdir_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.subdirs.iter().map(|name| self.path.join(name))
    }

    pub fn subdir(&self, name: &OsStr) -> PathBuf {
        self.path.join(name)
    }

    pub fn has_subdir(&self, name: &OsStr) -> bool {
        self.subdirs.contains(name)
    }

    pub fn num_of_subdirs(&self) -> usize {
        self.subdirs.len()
    }

    pub fn has_subdirs(&self) -> bool {
        !self.subdirs.is_empty()
    }

    /// 文件名称（有序）
    pub fn file_names(&self) -> impl Iterator<Item = &OsStr> + '_ {
        self.files.keys().map(OsString::as_os_str)
    }

    /// 文件完整路径（有序）
    pub fn file_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files.keys().map(|name| self.path.join(name))
    }

    pub fn has_file(&self, name: &OsStr) -> bool {
        self.files.contains_key(name)
    }

    pub fn num_of_files(&self) -> usize {
        self.files.len()
    }

    /// 快照中记录的文件大小
    pub fn file_size(&self, name: &OsStr) -> Option<u64> {
        self.files.get(name).copied()
    }

    pub fn file(&self, name: &OsStr) -> Option<FileEntry> {
        self.files
            .get(name)
            .map(|size| FileEntry::new(self.path.join(name), *size))
    }

    pub fn files(&self) -> impl Iterator<Item = FileEntry> + '_ {
        self.files
            .iter()
            .map(|(name, size)| FileEntry::new(self.path.join(name), *size))
    }

    /// 将整个目录移入回收站；目录已不存在时为空操作
    pub fn delete(&self, trash: &dyn Trash) -> Result<TrashOutcome> {
        trash.trash(&self.path)
    }
}
