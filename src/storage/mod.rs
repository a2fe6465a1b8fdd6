pub mod local;
pub mod trash;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub use local::LocalStorage;
pub use trash::{FreedesktopTrash, Trash, TrashOutcome};

/// 目录条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// 符号链接、设备文件等，不参与同步
    Other,
}

/// 目录列表中的单个条目
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: OsString,
    pub kind: EntryKind,
    /// 目录和其他类型固定为 0
    pub size: u64,
}

/// 文件元数据（用于快速检查）
#[derive(Debug, Clone, Copy)]
pub struct FileMeta {
    pub size: u64,
    pub kind: EntryKind,
}

/// 存储抽象接口
///
/// 所有路径均为绝对路径。错误统一包装为 [`crate::error::SyncError::Io`]，
/// 保留原始 `io::ErrorKind`，调用方据此区分权限、消失等单条目错误。
pub trait Storage: Send + Sync {
    /// 列出目录的直接子项（不递归）
    fn list_dir(&self, path: &Path) -> Result<Vec<FileInfo>>;

    /// 获取元数据，路径不存在时返回 None（不跟随符号链接）
    fn stat(&self, path: &Path) -> Result<Option<FileMeta>>;

    /// 按字节复制文件，目标存在时覆盖，返回写入的字节数
    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64>;

    /// 同一文件系统内移动/重命名
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// 创建单级目录，父目录必须已存在
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// 递归创建目录（仅用于目标根目录）
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// 解析为规范的绝对路径（跟随符号链接）
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// 检查路径是否存在
    fn exists(&self, path: &Path) -> bool {
        matches!(self.stat(path), Ok(Some(_)))
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}
